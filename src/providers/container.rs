//! Container (ECS task) credential provider.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Env;
use crate::credentials::{CredentialMetadata, Credentials};
use crate::metadata::ContainerMetadataFetcher;
use crate::provider::{ProvideCredentials, ProviderKind};
use crate::refresh::{FetchCredentials, RefreshableCredentials};
use crate::time::TimeSource;
use crate::{Error, Result};

const ENV_RELATIVE_URI: &str = "AWS_CONTAINER_CREDENTIALS_RELATIVE_URI";
const ENV_FULL_URI: &str = "AWS_CONTAINER_CREDENTIALS_FULL_URI";
const ENV_AUTH_TOKEN: &str = "AWS_CONTAINER_AUTHORIZATION_TOKEN";

/// Credentials served by the container orchestrator's credential endpoint.
///
/// Applicable when either container URI variable is set; the relative form
/// wins and is resolved against the well-known endpoint base.
pub struct ContainerProvider {
    env: Env,
    fetcher: Arc<dyn ContainerMetadataFetcher>,
    time_source: TimeSource,
}

impl ContainerProvider {
    pub fn new(env: Env, fetcher: Arc<dyn ContainerMetadataFetcher>) -> Self {
        Self {
            env,
            fetcher,
            time_source: TimeSource::system(),
        }
    }

    pub fn with_time_source(mut self, time_source: TimeSource) -> Self {
        self.time_source = time_source;
        self
    }
}

struct ContainerRefresher {
    fetcher: Arc<dyn ContainerMetadataFetcher>,
    url: String,
    headers: HashMap<String, String>,
}

#[async_trait]
impl FetchCredentials for ContainerRefresher {
    async fn fetch_credentials(&self) -> Result<CredentialMetadata> {
        self.fetcher
            .retrieve_full_uri(&self.url, &self.headers)
            .await
            .map_err(|err| match err {
                Error::MetadataRetrieval(message) => {
                    tracing::debug!(error = %message, "error retrieving container metadata");
                    Error::retrieval(ProviderKind::ContainerMetadata.method(), message)
                }
                other => other,
            })
    }
}

#[async_trait]
impl ProvideCredentials for ContainerProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::ContainerMetadata
    }

    async fn load(&self) -> Result<Option<Credentials>> {
        let url = match (self.env.get(ENV_RELATIVE_URI), self.env.get(ENV_FULL_URI)) {
            (Some(relative), _) => self.fetcher.full_url(relative),
            (None, Some(full)) => full.to_string(),
            (None, None) => return Ok(None),
        };

        let mut headers = HashMap::new();
        if let Some(token) = self.env.get(ENV_AUTH_TOKEN) {
            headers.insert("Authorization".to_string(), token.to_string());
        }

        let refresher = ContainerRefresher {
            fetcher: self.fetcher.clone(),
            url,
            headers,
        };
        let metadata = refresher.fetch_credentials().await?;
        let credentials = RefreshableCredentials::new(
            metadata,
            Arc::new(refresher),
            self.kind(),
            self.time_source.clone(),
        )?;
        Ok(Some(Credentials::Refreshable(Arc::new(credentials))))
    }
}
