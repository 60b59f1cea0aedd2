//! Credential cache backends.
//!
//! The cache maps deterministic keys derived from fetcher configuration to
//! persisted credential records. One cache handle may be shared by every
//! role-assumption fetcher within a resolver; concurrent writers racing on
//! the same key are benign because both derive the same record from the
//! same configuration (last write wins).

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::credentials::CredentialMetadata;
use crate::{Error, Result};

/// A persisted credential record with an ISO-8601 expiry.
///
/// Field names mirror the identity API response so cache files stay
/// compatible with other tooling that shares the cache directory.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CachedCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    pub expiration: DateTime<Utc>,
}

impl CachedCredentials {
    pub fn to_metadata(&self) -> CredentialMetadata {
        CredentialMetadata {
            access_key_id: self.access_key_id.clone(),
            secret_access_key: self.secret_access_key.clone(),
            session_token: self.session_token.clone(),
            expiration: Some(self.expiration),
        }
    }
}

impl fmt::Debug for CachedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedCredentials")
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

/// Key-value store for credential records.
///
/// Expiry interpretation is the caller's concern; a cache returns whatever
/// record it holds. Callers treat load/store failures as misses rather than
/// hard errors - a broken cache degrades to an extra fetch.
#[async_trait]
pub trait CredentialCache: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<CachedCredentials>>;
    async fn store(&self, key: &str, value: CachedCredentials) -> Result<()>;
}

/// Process-local cache; the default when nothing is configured.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: DashMap<String, CachedCredentials>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialCache for InMemoryCache {
    async fn load(&self, key: &str) -> Result<Option<CachedCredentials>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn store(&self, key: &str, value: CachedCredentials) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }
}

/// Disk-backed cache storing one pretty-printed `<key>.json` per record,
/// in the same layout the AWS CLI uses for its role-credential cache.
#[derive(Debug)]
pub struct FileCredentialCache {
    cache_dir: PathBuf,
}

impl FileCredentialCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Cache under `~/.aws/cli/cache`, interoperable with the AWS CLI.
    pub fn in_default_dir() -> Result<Self> {
        let dirs = BaseDirs::new().ok_or_else(|| {
            Error::InvalidConfig("could not determine a home directory for the cache".to_string())
        })?;
        Ok(Self::new(
            dirs.home_dir().join(".aws").join("cli").join("cache"),
        ))
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{key}.json"))
    }
}

#[async_trait]
impl CredentialCache for FileCredentialCache {
    async fn load(&self, key: &str) -> Result<Option<CachedCredentials>> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let contents = tokio::fs::read_to_string(&path).await?;
        let record = serde_json::from_str(&contents)?;
        Ok(Some(record))
    }

    async fn store(&self, key: &str, value: CachedCredentials) -> Result<()> {
        tokio::fs::create_dir_all(&self.cache_dir).await?;
        let json = serde_json::to_string_pretty(&value)?;
        tokio::fs::write(self.entry_path(key), json).await?;
        Ok(())
    }
}
