//! Credential value types.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};

use crate::provider::ProviderKind;
use crate::refresh::RefreshableCredentials;
use crate::Result;

/// A read-only credential snapshot, safe to hand to a request signer.
///
/// Frozen credentials carry no refresh behavior; obtain a fresh snapshot
/// through [`Credentials::get_frozen_credentials`] whenever one is needed.
#[derive(Clone)]
pub struct FrozenCredentials {
    access_key_id: String,
    secret_access_key: SecretString,
    session_token: Option<SecretString>,
}

impl FrozenCredentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: SecretString::from(secret_access_key.into()),
            session_token: session_token.map(SecretString::from),
        }
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub fn secret_access_key(&self) -> &str {
        self.secret_access_key.expose_secret()
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_ref().map(|t| t.expose_secret())
    }
}

impl fmt::Debug for FrozenCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrozenCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[redacted]")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

/// Credentials obtained once and never refreshed, e.g. static keys from a
/// profile or environment variables without an expiration.
#[derive(Clone, Debug)]
pub struct StaticCredentials {
    frozen: FrozenCredentials,
    method: ProviderKind,
}

impl StaticCredentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
        method: ProviderKind,
    ) -> Self {
        Self {
            frozen: FrozenCredentials::new(access_key_id, secret_access_key, session_token),
            method,
        }
    }

    pub fn access_key_id(&self) -> &str {
        self.frozen.access_key_id()
    }

    pub fn secret_access_key(&self) -> &str {
        self.frozen.secret_access_key()
    }

    pub fn session_token(&self) -> Option<&str> {
        self.frozen.session_token()
    }

    /// The provider that produced these credentials.
    pub fn method(&self) -> ProviderKind {
        self.method
    }

    pub fn frozen(&self) -> FrozenCredentials {
        self.frozen.clone()
    }
}

/// Normalized credential material, the common currency every fetcher and
/// provider converts its source-specific response into.
#[derive(Clone)]
pub struct CredentialMetadata {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    pub expiration: Option<DateTime<Utc>>,
}

impl CredentialMetadata {
    pub fn to_frozen(&self) -> FrozenCredentials {
        FrozenCredentials::new(
            self.access_key_id.clone(),
            self.secret_access_key.clone(),
            self.session_token.clone(),
        )
    }
}

impl fmt::Debug for CredentialMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialMetadata")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[redacted]")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "[redacted]"),
            )
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// A resolved credential source.
///
/// Consumers never read key material off this type directly; the single
/// accessor [`get_frozen_credentials`](Credentials::get_frozen_credentials)
/// runs the refresh protocol for refreshable variants and returns an
/// immutable snapshot.
#[derive(Clone, Debug)]
pub enum Credentials {
    Static(StaticCredentials),
    Refreshable(Arc<RefreshableCredentials>),
}

impl Credentials {
    /// The provider that produced these credentials.
    pub fn method(&self) -> ProviderKind {
        match self {
            Credentials::Static(creds) => creds.method(),
            Credentials::Refreshable(creds) => creds.method(),
        }
    }

    /// Return a snapshot guaranteed not to be past its mandatory expiry
    /// window, refreshing first if needed.
    pub async fn get_frozen_credentials(&self) -> Result<FrozenCredentials> {
        match self {
            Credentials::Static(creds) => Ok(creds.frozen()),
            Credentials::Refreshable(creds) => creds.get_frozen_credentials().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frozen_accessors() {
        let frozen = FrozenCredentials::new("AKID", "secret", Some("token".to_string()));
        assert_eq!(frozen.access_key_id(), "AKID");
        assert_eq!(frozen.secret_access_key(), "secret");
        assert_eq!(frozen.session_token(), Some("token"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let frozen = FrozenCredentials::new("AKID", "sk-hunter2", Some("tok-hunter2".to_string()));
        let debug = format!("{:?}", frozen);
        assert!(debug.contains("AKID"));
        assert!(debug.contains("[redacted]"));
        assert!(!debug.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_static_credentials_freeze_without_refresh() {
        let creds = Credentials::Static(StaticCredentials::new(
            "AKID",
            "secret",
            None,
            ProviderKind::Environment,
        ));
        let frozen = creds.get_frozen_credentials().await.unwrap();
        assert_eq!(frozen.access_key_id(), "AKID");
        assert_eq!(frozen.session_token(), None);
        assert_eq!(creds.method(), ProviderKind::Environment);
    }
}
