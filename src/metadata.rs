//! Metadata-endpoint interfaces and the bundled HTTP fetchers.
//!
//! Providers only ever see the two traits; the reqwest-backed
//! implementations are thin by design. Transport policy (retries, backoff)
//! stays with the transport - failures surface as
//! [`Error::MetadataRetrieval`] and propagate unchanged.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::credentials::CredentialMetadata;
use crate::{Error, Result};

const DEFAULT_IMDS_ENDPOINT: &str = "http://169.254.169.254";
const DEFAULT_ECS_ENDPOINT: &str = "http://169.254.170.2";

const IMDS_TOKEN_PATH: &str = "/latest/api/token";
const IMDS_CREDENTIALS_PATH: &str = "/latest/meta-data/iam/security-credentials/";
const IMDS_TOKEN_TTL_HEADER: &str = "x-aws-ec2-metadata-token-ttl-seconds";
const IMDS_TOKEN_HEADER: &str = "x-aws-ec2-metadata-token";
const IMDS_TOKEN_TTL_SECS: u32 = 21_600;

/// Role credentials served by the instance metadata endpoint.
#[derive(Clone, Debug)]
pub struct ImdsCredentials {
    pub role_name: String,
    pub metadata: CredentialMetadata,
}

/// Interface to the instance metadata service.
#[async_trait]
pub trait InstanceMetadataFetcher: Send + Sync {
    /// `Ok(None)` when the instance has no role attached.
    async fn retrieve_role_credentials(&self) -> Result<Option<ImdsCredentials>>;
}

/// Interface to the container credential endpoint.
#[async_trait]
pub trait ContainerMetadataFetcher: Send + Sync {
    /// Resolve a relative credentials URI against the endpoint base.
    fn full_url(&self, relative_uri: &str) -> String;

    async fn retrieve_full_uri(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<CredentialMetadata>;
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SecurityCredentialsDocument {
    code: Option<String>,
    access_key_id: String,
    secret_access_key: String,
    token: Option<String>,
    expiration: DateTime<Utc>,
}

impl SecurityCredentialsDocument {
    fn into_metadata(self) -> CredentialMetadata {
        CredentialMetadata {
            access_key_id: self.access_key_id,
            secret_access_key: self.secret_access_key,
            session_token: self.token,
            expiration: Some(self.expiration),
        }
    }
}

fn transport_error(err: reqwest::Error) -> Error {
    Error::MetadataRetrieval(err.to_string())
}

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(1))
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(transport_error)
}

/// Instance metadata fetcher speaking IMDSv2, with a fallback to
/// unauthenticated requests when the token handshake is unavailable.
#[derive(Clone, Debug)]
pub struct ImdsHttpFetcher {
    client: reqwest::Client,
    endpoint: String,
}

impl ImdsHttpFetcher {
    pub fn new() -> Result<Self> {
        Self::with_endpoint(DEFAULT_IMDS_ENDPOINT)
    }

    /// Point the fetcher at a non-default endpoint; primarily for tests.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_api_token(&self) -> Option<String> {
        let response = self
            .client
            .put(format!("{}{IMDS_TOKEN_PATH}", self.endpoint))
            .header(IMDS_TOKEN_TTL_HEADER, IMDS_TOKEN_TTL_SECS)
            .send()
            .await;
        match response {
            Ok(response) if response.status().is_success() => response.text().await.ok(),
            Ok(response) => {
                tracing::debug!(status = %response.status(), "metadata token handshake refused, falling back");
                None
            }
            Err(err) => {
                tracing::debug!(error = %err, "metadata token handshake failed, falling back");
                None
            }
        }
    }

    async fn get(&self, path: &str, token: Option<&str>) -> Result<reqwest::Response> {
        let mut request = self.client.get(format!("{}{path}", self.endpoint));
        if let Some(token) = token {
            request = request.header(IMDS_TOKEN_HEADER, token);
        }
        request.send().await.map_err(transport_error)
    }
}

#[async_trait]
impl InstanceMetadataFetcher for ImdsHttpFetcher {
    async fn retrieve_role_credentials(&self) -> Result<Option<ImdsCredentials>> {
        let token = self.fetch_api_token().await;

        let listing = self.get(IMDS_CREDENTIALS_PATH, token.as_deref()).await?;
        if listing.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !listing.status().is_success() {
            return Err(Error::MetadataRetrieval(format!(
                "role listing returned HTTP {}",
                listing.status()
            )));
        }
        let body = listing.text().await.map_err(transport_error)?;
        let Some(role_name) = body.lines().next().map(str::trim).filter(|l| !l.is_empty()) else {
            return Ok(None);
        };

        let document = self
            .get(&format!("{IMDS_CREDENTIALS_PATH}{role_name}"), token.as_deref())
            .await?;
        if !document.status().is_success() {
            return Err(Error::MetadataRetrieval(format!(
                "role credentials for {role_name} returned HTTP {}",
                document.status()
            )));
        }
        let document: SecurityCredentialsDocument =
            document.json().await.map_err(transport_error)?;
        if let Some(code) = &document.code
            && code != "Success"
        {
            return Err(Error::MetadataRetrieval(format!(
                "instance metadata returned code {code}"
            )));
        }

        Ok(Some(ImdsCredentials {
            role_name: role_name.to_string(),
            metadata: document.into_metadata(),
        }))
    }
}

/// Container credential fetcher for the ECS/task endpoint.
#[derive(Clone, Debug)]
pub struct EcsHttpFetcher {
    client: reqwest::Client,
    base: String,
}

impl EcsHttpFetcher {
    pub fn new() -> Result<Self> {
        Self::with_base(DEFAULT_ECS_ENDPOINT)
    }

    /// Point the fetcher at a non-default base URL; primarily for tests.
    pub fn with_base(base: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base: base.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ContainerMetadataFetcher for EcsHttpFetcher {
    fn full_url(&self, relative_uri: &str) -> String {
        format!("{}{relative_uri}", self.base)
    }

    async fn retrieve_full_uri(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<CredentialMetadata> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let response = request.send().await.map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(Error::MetadataRetrieval(format!(
                "container endpoint returned HTTP {}",
                response.status()
            )));
        }
        let document: SecurityCredentialsDocument =
            response.json().await.map_err(transport_error)?;
        Ok(document.into_metadata())
    }
}
