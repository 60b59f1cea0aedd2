//! Instance metadata (IAM role) credential provider.

use std::sync::Arc;

use async_trait::async_trait;

use crate::credentials::{CredentialMetadata, Credentials};
use crate::metadata::InstanceMetadataFetcher;
use crate::provider::{ProvideCredentials, ProviderKind};
use crate::refresh::{FetchCredentials, RefreshableCredentials};
use crate::time::TimeSource;
use crate::{Error, Result};

/// Credentials for the IAM role attached to the instance.
pub struct InstanceMetadataProvider {
    fetcher: Arc<dyn InstanceMetadataFetcher>,
    time_source: TimeSource,
}

impl InstanceMetadataProvider {
    pub fn new(fetcher: Arc<dyn InstanceMetadataFetcher>) -> Self {
        Self {
            fetcher,
            time_source: TimeSource::system(),
        }
    }

    pub fn with_time_source(mut self, time_source: TimeSource) -> Self {
        self.time_source = time_source;
        self
    }
}

struct ImdsRefresher {
    fetcher: Arc<dyn InstanceMetadataFetcher>,
}

#[async_trait]
impl FetchCredentials for ImdsRefresher {
    async fn fetch_credentials(&self) -> Result<CredentialMetadata> {
        match self.fetcher.retrieve_role_credentials().await? {
            Some(role_credentials) => Ok(role_credentials.metadata),
            None => Err(Error::retrieval(
                ProviderKind::InstanceMetadata.method(),
                "no credentials available from instance metadata",
            )),
        }
    }
}

#[async_trait]
impl ProvideCredentials for InstanceMetadataProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::InstanceMetadata
    }

    async fn load(&self) -> Result<Option<Credentials>> {
        let Some(role_credentials) = self.fetcher.retrieve_role_credentials().await? else {
            return Ok(None);
        };
        tracing::debug!(role = %role_credentials.role_name, "found credentials from IAM role");

        let credentials = RefreshableCredentials::new(
            role_credentials.metadata,
            Arc::new(ImdsRefresher {
                fetcher: self.fetcher.clone(),
            }),
            self.kind(),
            self.time_source.clone(),
        )?;
        Ok(Some(Credentials::Refreshable(Arc::new(credentials))))
    }
}
