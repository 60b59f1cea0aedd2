//! Cached credential fetchers for role assumption.
//!
//! Fetchers are the refresh functions handed to deferred credentials. Each
//! consults the shared credential cache under a key derived from its own
//! configuration before calling the identity API, and writes fresh results
//! back so other processes sharing the cache can reuse them.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use sha1::{Digest, Sha1};

use crate::cache::{CachedCredentials, CredentialCache};
use crate::credentials::{CredentialMetadata, Credentials};
use crate::refresh::FetchCredentials;
use crate::sts::{AssumeRoleRequest, StsClient, StsCredentials};
use crate::time::TimeSource;
use crate::{Error, Result};

/// Cache entries closer than this to expiry are treated as absent.
const CACHE_EXPIRY_WINDOW_SECS: i64 = 15 * 60;

/// Best-effort cache access shared by the role-assumption fetchers. Cache
/// failures degrade to a fetch instead of failing the caller.
struct CacheLayer {
    cache: Arc<dyn CredentialCache>,
    key: String,
    time_source: TimeSource,
}

impl CacheLayer {
    async fn load(&self) -> Option<CachedCredentials> {
        match self.cache.load(&self.key).await {
            Ok(Some(record)) => {
                let remaining = (record.expiration - self.time_source.now()).num_seconds();
                if remaining >= CACHE_EXPIRY_WINDOW_SECS {
                    Some(record)
                } else {
                    None
                }
            }
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(error = %err, "failed to read the credential cache");
                None
            }
        }
    }

    async fn store(&self, record: CachedCredentials) {
        if let Err(err) = self.cache.store(&self.key, record).await {
            tracing::warn!(error = %err, "failed to write the credential cache");
        }
    }
}

/// Deterministic cache key over the role-assumption arguments.
///
/// A session name the engine generated itself is excluded so that restarts
/// (which generate a new name) still hit the cache.
fn cache_key(request: &AssumeRoleRequest, using_default_session_name: bool) -> String {
    let mut args: BTreeMap<&str, serde_json::Value> = BTreeMap::new();
    args.insert("RoleArn", request.role_arn.clone().into());
    if !using_default_session_name
        && let Some(name) = &request.role_session_name
    {
        args.insert("RoleSessionName", name.clone().into());
    }
    if let Some(external_id) = &request.external_id {
        args.insert("ExternalId", external_id.clone().into());
    }
    if let Some(serial) = &request.serial_number {
        args.insert("SerialNumber", serial.clone().into());
    }
    if let Some(duration) = request.duration_seconds {
        args.insert("DurationSeconds", duration.into());
    }

    let canonical =
        serde_json::to_string(&args).expect("role-assumption arguments serialize to JSON");
    let mut hasher = Sha1::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn default_session_name(time_source: &TimeSource) -> String {
    format!("credchain-session-{}", time_source.now().timestamp())
}

fn to_record(creds: StsCredentials) -> CachedCredentials {
    CachedCredentials {
        access_key_id: creds.access_key_id,
        secret_access_key: creds.secret_access_key,
        session_token: Some(creds.session_token),
        expiration: creds.expiration,
    }
}

/// Fetches role credentials by calling `assume_role` with a resolved source
/// credential as the signer.
pub struct AssumeRoleFetcher {
    client: Arc<dyn StsClient>,
    source_credentials: Credentials,
    request: AssumeRoleRequest,
    cache: CacheLayer,
}

impl AssumeRoleFetcher {
    pub fn new(
        client: Arc<dyn StsClient>,
        source_credentials: Credentials,
        mut request: AssumeRoleRequest,
        cache: Arc<dyn CredentialCache>,
        time_source: TimeSource,
    ) -> Self {
        let using_default_session_name = request.role_session_name.is_none();
        if using_default_session_name {
            request.role_session_name = Some(default_session_name(&time_source));
        }
        let key = cache_key(&request, using_default_session_name);
        Self {
            client,
            source_credentials,
            request,
            cache: CacheLayer {
                cache,
                key,
                time_source,
            },
        }
    }

    /// The derived cache key for this fetcher's configuration.
    pub fn cache_key(&self) -> &str {
        &self.cache.key
    }
}

#[async_trait]
impl FetchCredentials for AssumeRoleFetcher {
    async fn fetch_credentials(&self) -> Result<CredentialMetadata> {
        if let Some(record) = self.cache.load().await {
            tracing::debug!(role_arn = %self.request.role_arn, "credentials for role retrieved from cache");
            return Ok(record.to_metadata());
        }
        let source = self.source_credentials.get_frozen_credentials().await?;
        let fresh = self.client.assume_role(&source, &self.request).await?;
        let record = to_record(fresh);
        self.cache.store(record.clone()).await;
        Ok(record.to_metadata())
    }
}

/// Supplies the bearer token for a web-identity exchange.
#[async_trait]
pub trait WebIdentityTokenLoader: Send + Sync {
    async fn load_token(&self) -> Result<String>;
}

/// Loads the token from a file, the usual arrangement for workload
/// identities where an agent rotates the token on disk.
#[derive(Debug)]
pub struct FileTokenLoader {
    path: PathBuf,
}

impl FileTokenLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl WebIdentityTokenLoader for FileTokenLoader {
    async fn load_token(&self) -> Result<String> {
        let token = tokio::fs::read_to_string(&self.path).await.map_err(|err| {
            Error::retrieval(
                "assume-role-with-web-identity",
                format!(
                    "failed to read web identity token file {}: {err}",
                    self.path.display()
                ),
            )
        })?;
        Ok(token.trim().to_string())
    }
}

/// Fetches role credentials through the unsigned web-identity exchange.
pub struct WebIdentityFetcher {
    client: Arc<dyn StsClient>,
    token_loader: Arc<dyn WebIdentityTokenLoader>,
    request: AssumeRoleRequest,
    cache: CacheLayer,
}

impl WebIdentityFetcher {
    pub fn new(
        client: Arc<dyn StsClient>,
        token_loader: Arc<dyn WebIdentityTokenLoader>,
        mut request: AssumeRoleRequest,
        cache: Arc<dyn CredentialCache>,
        time_source: TimeSource,
    ) -> Self {
        let using_default_session_name = request.role_session_name.is_none();
        if using_default_session_name {
            request.role_session_name = Some(default_session_name(&time_source));
        }
        let key = cache_key(&request, using_default_session_name);
        Self {
            client,
            token_loader,
            request,
            cache: CacheLayer {
                cache,
                key,
                time_source,
            },
        }
    }
}

#[async_trait]
impl FetchCredentials for WebIdentityFetcher {
    async fn fetch_credentials(&self) -> Result<CredentialMetadata> {
        if let Some(record) = self.cache.load().await {
            tracing::debug!(role_arn = %self.request.role_arn, "credentials for role retrieved from cache");
            return Ok(record.to_metadata());
        }
        let token = self.token_loader.load_token().await?;
        let fresh = self
            .client
            .assume_role_with_web_identity(&self.request, &token)
            .await?;
        let record = to_record(fresh);
        self.cache.store(record.clone()).await;
        Ok(record.to_metadata())
    }
}

/// Allows a fetch that consumed a one-time MFA code to run at most once.
///
/// Re-prompting for a fresh code is unsupported, so a second refresh after
/// the temporary credentials expire fails deterministically instead of
/// silently reusing a stale code.
pub struct MfaSerialRefresher {
    inner: Arc<dyn FetchCredentials>,
    has_been_called: AtomicBool,
}

impl MfaSerialRefresher {
    pub fn new(inner: Arc<dyn FetchCredentials>) -> Self {
        Self {
            inner,
            has_been_called: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl FetchCredentials for MfaSerialRefresher {
    async fn fetch_credentials(&self) -> Result<CredentialMetadata> {
        if self.has_been_called.swap(true, Ordering::SeqCst) {
            return Err(Error::RefreshWithMfaUnsupported);
        }
        self.inner.fetch_credentials().await
    }
}
