//! Refresh protocol for short-lived credentials.
//!
//! A [`RefreshableCredentials`] tracks an expiry time and two windows before
//! it:
//!
//! - **advisory** (15 minutes): refresh is desirable; a failure here is
//!   tolerated and the stale-but-valid snapshot keeps being served.
//! - **mandatory** (10 minutes): refresh is required; a failure here
//!   propagates to the caller.
//!
//! Refreshes are single-flight per credential object. Callers that only need
//! advisory freshness never wait on an in-flight refresh; callers past the
//! mandatory window block until it completes.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use crate::credentials::{CredentialMetadata, FrozenCredentials};
use crate::provider::ProviderKind;
use crate::time::TimeSource;
use crate::{Error, Result};

const ADVISORY_REFRESH_TIMEOUT_SECS: i64 = 15 * 60;
const MANDATORY_REFRESH_TIMEOUT_SECS: i64 = 10 * 60;

/// Capability to produce fresh credential material.
///
/// Implemented by the role-assumption fetchers, the metadata-endpoint
/// refreshers, and the external-process refresher. Errors propagate
/// unchanged; retry belongs to the underlying transport.
#[async_trait]
pub trait FetchCredentials: Send + Sync {
    async fn fetch_credentials(&self) -> Result<CredentialMetadata>;
}

enum CredentialState {
    /// No real credential has ever been fetched; the first access must
    /// perform real work regardless of window math.
    Unfetched,
    Fetched {
        frozen: FrozenCredentials,
        expiry_time: DateTime<Utc>,
    },
}

/// Credentials that refresh themselves before expiry.
pub struct RefreshableCredentials {
    state: RwLock<CredentialState>,
    refresh_lock: Mutex<()>,
    refresh_using: Arc<dyn FetchCredentials>,
    method: ProviderKind,
    time_source: TimeSource,
}

impl RefreshableCredentials {
    /// Build from already-fetched metadata. The metadata must carry an
    /// expiration.
    pub fn new(
        metadata: CredentialMetadata,
        refresh_using: Arc<dyn FetchCredentials>,
        method: ProviderKind,
        time_source: TimeSource,
    ) -> Result<Self> {
        let expiry_time = metadata.expiration.ok_or_else(|| {
            Error::retrieval(method.method(), "credential metadata is missing an expiration")
        })?;
        Ok(Self {
            state: RwLock::new(CredentialState::Fetched {
                frozen: metadata.to_frozen(),
                expiry_time,
            }),
            refresh_lock: Mutex::new(()),
            refresh_using,
            method,
            time_source,
        })
    }

    /// Build in the unfetched state, so the first access performs the real
    /// fetch. Role-assumption and web-identity exchanges use this to defer
    /// the remote call until credentials are actually needed.
    pub fn deferred(
        refresh_using: Arc<dyn FetchCredentials>,
        method: ProviderKind,
        time_source: TimeSource,
    ) -> Self {
        Self {
            state: RwLock::new(CredentialState::Unfetched),
            refresh_lock: Mutex::new(()),
            refresh_using,
            method,
            time_source,
        }
    }

    /// The provider that produced these credentials.
    pub fn method(&self) -> ProviderKind {
        self.method
    }

    /// Return a snapshot guaranteed not to be past the mandatory window,
    /// refreshing first if needed.
    pub async fn get_frozen_credentials(&self) -> Result<FrozenCredentials> {
        self.refresh().await?;
        let state = self.state.read().await;
        match &*state {
            CredentialState::Fetched { frozen, .. } => Ok(frozen.clone()),
            CredentialState::Unfetched => Err(Error::retrieval(
                self.method.method(),
                "credentials are unavailable after refresh",
            )),
        }
    }

    async fn refresh_needed(&self, refresh_in_secs: i64) -> bool {
        let state = self.state.read().await;
        match &*state {
            CredentialState::Unfetched => true,
            CredentialState::Fetched { expiry_time, .. } => {
                let remaining = (*expiry_time - self.time_source.now()).num_seconds();
                remaining < refresh_in_secs
            }
        }
    }

    async fn refresh(&self) -> Result<()> {
        if !self.refresh_needed(ADVISORY_REFRESH_TIMEOUT_SECS).await {
            return Ok(());
        }

        match self.refresh_lock.try_lock() {
            Ok(_guard) => {
                // Another caller may have refreshed between the check and
                // the lock acquisition.
                if !self.refresh_needed(ADVISORY_REFRESH_TIMEOUT_SECS).await {
                    return Ok(());
                }
                let is_mandatory = self.refresh_needed(MANDATORY_REFRESH_TIMEOUT_SECS).await;
                self.protected_refresh(is_mandatory).await
            }
            Err(_) => {
                // A refresh is in flight. Only wait for it when the
                // credentials are truly unusable; advisory staleness is
                // served as-is rather than blocking the caller.
                if !self.refresh_needed(MANDATORY_REFRESH_TIMEOUT_SECS).await {
                    return Ok(());
                }
                let _guard = self.refresh_lock.lock().await;
                if !self.refresh_needed(MANDATORY_REFRESH_TIMEOUT_SECS).await {
                    return Ok(());
                }
                self.protected_refresh(true).await
            }
        }
    }

    async fn protected_refresh(&self, is_mandatory: bool) -> Result<()> {
        let metadata = match self.refresh_using.fetch_credentials().await {
            Ok(metadata) => metadata,
            Err(err) => {
                let period = if is_mandatory { "mandatory" } else { "advisory" };
                tracing::warn!(
                    error = %err,
                    "refreshing temporary credentials failed during {period} refresh period"
                );
                if is_mandatory {
                    return Err(err);
                }
                return Ok(());
            }
        };

        let expiry_time = metadata.expiration.ok_or_else(|| {
            Error::retrieval(
                self.method.method(),
                "refreshed credentials are missing an expiration",
            )
        })?;

        {
            let mut state = self.state.write().await;
            *state = CredentialState::Fetched {
                frozen: metadata.to_frozen(),
                expiry_time,
            };
        }

        if (expiry_time - self.time_source.now()).num_seconds() <= 0 {
            tracing::warn!("credentials were refreshed, but the refreshed credentials are still expired");
            return Err(Error::RefreshStillExpired);
        }
        Ok(())
    }
}

impl std::fmt::Debug for RefreshableCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshableCredentials")
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    fn metadata(key: &str, expires_in_secs: i64) -> CredentialMetadata {
        CredentialMetadata {
            access_key_id: key.to_string(),
            secret_access_key: "secret".to_string(),
            session_token: Some("token".to_string()),
            expiration: Some(fixed_now() + chrono::Duration::seconds(expires_in_secs)),
        }
    }

    struct StubFetcher {
        calls: AtomicUsize,
        started: std::sync::atomic::AtomicBool,
        result_key: Option<&'static str>,
        expires_in_secs: i64,
        delay: Option<Duration>,
    }

    impl StubFetcher {
        fn succeeding(key: &'static str, expires_in_secs: i64) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                started: std::sync::atomic::AtomicBool::new(false),
                result_key: Some(key),
                expires_in_secs,
                delay: None,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                started: std::sync::atomic::AtomicBool::new(false),
                result_key: None,
                expires_in_secs: 0,
                delay: None,
            }
        }

        async fn wait_until_fetching(&self) {
            while !self.started.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FetchCredentials for StubFetcher {
        async fn fetch_credentials(&self) -> Result<CredentialMetadata> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.started.store(true, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match self.result_key {
                Some(key) => Ok(metadata(key, self.expires_in_secs)),
                None => Err(Error::retrieval("stub", "refresh failed")),
            }
        }
    }

    fn refreshable(
        initial: CredentialMetadata,
        fetcher: Arc<StubFetcher>,
    ) -> RefreshableCredentials {
        RefreshableCredentials::new(
            initial,
            fetcher,
            ProviderKind::AssumeRole,
            TimeSource::fixed(fixed_now()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_fresh_credentials_skip_refresh() {
        let fetcher = Arc::new(StubFetcher::succeeding("NEW", 3600));
        let creds = refreshable(metadata("ORIGINAL", 3600), fetcher.clone());

        for _ in 0..3 {
            let frozen = creds.get_frozen_credentials().await.unwrap();
            assert_eq!(frozen.access_key_id(), "ORIGINAL");
        }
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_mandatory_window_triggers_refresh() {
        let fetcher = Arc::new(StubFetcher::succeeding("NEW", 3600));
        // 5 minutes remaining puts us inside the mandatory window.
        let creds = refreshable(metadata("ORIGINAL", 5 * 60), fetcher.clone());

        let frozen = creds.get_frozen_credentials().await.unwrap();
        assert_eq!(frozen.access_key_id(), "NEW");
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_advisory_window_refreshes_opportunistically() {
        let fetcher = Arc::new(StubFetcher::succeeding("NEW", 3600));
        // 12 minutes remaining: advisory but not mandatory.
        let creds = refreshable(metadata("ORIGINAL", 12 * 60), fetcher.clone());

        let frozen = creds.get_frozen_credentials().await.unwrap();
        assert_eq!(frozen.access_key_id(), "NEW");
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_advisory_failure_serves_stale_credentials() {
        let fetcher = Arc::new(StubFetcher::failing());
        let creds = refreshable(metadata("ORIGINAL", 12 * 60), fetcher.clone());

        let frozen = creds.get_frozen_credentials().await.unwrap();
        assert_eq!(frozen.access_key_id(), "ORIGINAL");
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mandatory_failure_propagates() {
        let fetcher = Arc::new(StubFetcher::failing());
        let creds = refreshable(metadata("ORIGINAL", 5 * 60), fetcher.clone());

        let err = creds.get_frozen_credentials().await.unwrap_err();
        assert!(matches!(err, Error::CredentialRetrieval { .. }));
    }

    #[tokio::test]
    async fn test_refresh_yielding_expired_credentials_is_fatal() {
        let fetcher = Arc::new(StubFetcher::succeeding("NEW", -60));
        let creds = refreshable(metadata("ORIGINAL", 60), fetcher.clone());

        let err = creds.get_frozen_credentials().await.unwrap_err();
        assert!(matches!(err, Error::RefreshStillExpired));
    }

    #[tokio::test]
    async fn test_deferred_fetches_on_first_access_only() {
        let fetcher = Arc::new(StubFetcher::succeeding("DEFERRED", 3600));
        let creds = RefreshableCredentials::deferred(
            fetcher.clone(),
            ProviderKind::AssumeRole,
            TimeSource::fixed(fixed_now()),
        );

        let frozen = creds.get_frozen_credentials().await.unwrap();
        assert_eq!(frozen.access_key_id(), "DEFERRED");
        let frozen = creds.get_frozen_credentials().await.unwrap();
        assert_eq!(frozen.access_key_id(), "DEFERRED");
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let fetcher = Arc::new(
            StubFetcher::succeeding("SHARED", 3600).with_delay(Duration::from_millis(50)),
        );
        let creds = Arc::new(RefreshableCredentials::deferred(
            fetcher.clone(),
            ProviderKind::AssumeRole,
            TimeSource::fixed(fixed_now()),
        ));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let creds = creds.clone();
                tokio::spawn(async move { creds.get_frozen_credentials().await })
            })
            .collect();
        for task in futures::future::join_all(tasks).await {
            let frozen = task.unwrap().unwrap();
            assert_eq!(frozen.access_key_id(), "SHARED");
        }
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_advisory_caller_does_not_wait_on_inflight_refresh() {
        let fetcher = Arc::new(
            StubFetcher::succeeding("NEW", 3600).with_delay(Duration::from_millis(500)),
        );
        let creds = Arc::new(refreshable(metadata("ORIGINAL", 12 * 60), fetcher.clone()));

        let background = {
            let creds = creds.clone();
            tokio::spawn(async move { creds.get_frozen_credentials().await })
        };
        fetcher.wait_until_fetching().await;

        // The slow refresh is in flight; an advisory-only caller gets the
        // stale snapshot immediately instead of blocking.
        let frozen = creds.get_frozen_credentials().await.unwrap();
        assert_eq!(frozen.access_key_id(), "ORIGINAL");

        let refreshed = background.await.unwrap().unwrap();
        assert_eq!(refreshed.access_key_id(), "NEW");
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_refresh_without_expiration_is_an_error() {
        struct NoExpiry;
        #[async_trait]
        impl FetchCredentials for NoExpiry {
            async fn fetch_credentials(&self) -> Result<CredentialMetadata> {
                Ok(CredentialMetadata {
                    access_key_id: "AKID".to_string(),
                    secret_access_key: "secret".to_string(),
                    session_token: None,
                    expiration: None,
                })
            }
        }

        let creds = RefreshableCredentials::deferred(
            Arc::new(NoExpiry),
            ProviderKind::AssumeRole,
            TimeSource::fixed(fixed_now()),
        );
        let err = creds.get_frozen_credentials().await.unwrap_err();
        assert!(matches!(err, Error::CredentialRetrieval { .. }));
    }
}
