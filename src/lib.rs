//! # credchain
//!
//! Layered credential resolution and refresh engine for AWS-style API
//! clients.
//!
//! A [`CredentialResolver`] walks an ordered chain of providers
//! (environment variables, shared config/credentials profiles, external
//! credential processes, container and instance metadata, role-assumption
//! chains) and returns the first source that applies. Short-lived
//! credentials refresh themselves lazily behind a single-flight lock, and
//! role-assumption results persist in a pluggable cache.
//!
//! The engine stays away from wire protocols: the identity API, the
//! metadata endpoints, and process spawning are consumed through narrow
//! traits ([`StsClient`], [`InstanceMetadataFetcher`],
//! [`ContainerMetadataFetcher`], [`CommandRunner`]) that callers can
//! implement with whatever transport they already have.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use credchain::{
//!     AssumeRoleRequest, ConfigSnapshot, FrozenCredentials, ResolverBuilder, StsClient,
//!     StsCredentials,
//! };
//!
//! struct MySts;
//!
//! #[async_trait::async_trait]
//! impl StsClient for MySts {
//!     async fn assume_role(
//!         &self,
//!         _source_credentials: &FrozenCredentials,
//!         _request: &AssumeRoleRequest,
//!     ) -> credchain::Result<StsCredentials> {
//!         todo!("call the identity API with your transport of choice")
//!     }
//!
//!     async fn assume_role_with_web_identity(
//!         &self,
//!         _request: &AssumeRoleRequest,
//!         _web_identity_token: &str,
//!     ) -> credchain::Result<StsCredentials> {
//!         todo!()
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> credchain::Result<()> {
//!     let config = ConfigSnapshot::builder()
//!         .profile(
//!             "ci",
//!             [
//!                 ("role_arn", "arn:aws:iam::123456789012:role/ci"),
//!                 ("source_profile", "base"),
//!             ],
//!         )
//!         .profile(
//!             "base",
//!             [
//!                 ("aws_access_key_id", "AKIDEXAMPLE"),
//!                 ("aws_secret_access_key", "wJalrXUtnFEMI"),
//!             ],
//!         )
//!         .active_profile("ci")
//!         .build();
//!
//!     let resolver = ResolverBuilder::new(config, Arc::new(MySts)).build()?;
//!     if let Some(credentials) = resolver.load_credentials().await? {
//!         let frozen = credentials.get_frozen_credentials().await?;
//!         println!("signing as {}", frozen.access_key_id());
//!     }
//!     Ok(())
//! }
//! ```

#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod cache;
pub mod config;
pub mod credentials;
pub mod fetcher;
pub mod metadata;
pub mod provider;
pub mod providers;
pub mod refresh;
pub mod resolver;
pub mod sourcer;
pub mod sts;
pub mod time;

// Re-exports for convenience
pub use cache::{CachedCredentials, CredentialCache, FileCredentialCache, InMemoryCache};
pub use config::{ConfigSnapshot, ConfigSnapshotBuilder, Env, Profile};
pub use credentials::{CredentialMetadata, Credentials, FrozenCredentials, StaticCredentials};
pub use fetcher::{
    AssumeRoleFetcher, FileTokenLoader, MfaSerialRefresher, WebIdentityFetcher,
    WebIdentityTokenLoader,
};
pub use metadata::{
    ContainerMetadataFetcher, EcsHttpFetcher, ImdsCredentials, ImdsHttpFetcher,
    InstanceMetadataFetcher,
};
pub use provider::{ProvideCredentials, ProviderKind};
pub use providers::{
    AssumeRoleProvider, AssumeRoleWithWebIdentityProvider, BotoConfigProvider, CommandRunner,
    ContainerProvider, Ec2CredentialsFileProvider, EnvironmentProvider, InstanceMetadataProvider,
    ProcessOutput, ProcessProvider, SharedConfigProvider, SharedCredentialsProvider,
    ShellCommandRunner,
};
pub use refresh::{FetchCredentials, RefreshableCredentials};
pub use resolver::{CredentialResolver, ProfileProviderBuilder, ResolverBuilder};
pub use sourcer::CanonicalNameCredentialSourcer;
pub use sts::{AssumeRoleRequest, StsClient, StsCredentials};
pub use time::TimeSource;

/// Error type for credential resolution and refresh.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Transport, process, or API failure while fetching raw credentials.
    #[error("Error when retrieving credentials from {provider}: {message}")]
    CredentialRetrieval { provider: String, message: String },

    /// A required static-credential field is missing from a profile or the
    /// environment.
    #[error("Partial credentials found in {provider}, missing: {cred_var}")]
    PartialCredentials { provider: String, cred_var: String },

    /// Provider or role-assumption configuration is malformed or
    /// contradictory.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No provider is registered under the referenced canonical name.
    #[error("Credential named {name} not found")]
    UnknownCredential { name: String },

    /// The metadata endpoint could not be reached or answered with a
    /// malformed payload.
    #[error("Error retrieving metadata: {0}")]
    MetadataRetrieval(String),

    /// Refreshing would require re-prompting for a one-time MFA code.
    #[error("Cannot refresh credentials: MFA token is required")]
    RefreshWithMfaUnsupported,

    /// A refresh succeeded but the returned credentials were already
    /// expired - clock skew or a misbehaving provider.
    #[error("Credentials were refreshed, but the refreshed credentials are still expired")]
    RefreshStillExpired,

    /// File system operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization or deserialization failed.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn retrieval(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Error::CredentialRetrieval {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn partial(provider: impl Into<String>, cred_var: impl Into<String>) -> Self {
        Error::PartialCredentials {
            provider: provider.into(),
            cred_var: cred_var.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Error::InvalidConfig(message.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
