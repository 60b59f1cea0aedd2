//! Environment variable credential provider.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::Env;
use crate::credentials::{CredentialMetadata, Credentials, StaticCredentials};
use crate::provider::{ProvideCredentials, ProviderKind};
use crate::refresh::{FetchCredentials, RefreshableCredentials};
use crate::time::TimeSource;
use crate::{Error, Result};

const ENV_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
const ENV_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
const ENV_SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";
const ENV_CREDENTIAL_EXPIRATION: &str = "AWS_CREDENTIAL_EXPIRATION";

/// Reads credentials from the captured environment.
///
/// When `AWS_CREDENTIAL_EXPIRATION` is set the credentials are treated as
/// short-lived and re-read from the environment snapshot on refresh.
pub struct EnvironmentProvider {
    env: Env,
    time_source: TimeSource,
}

impl EnvironmentProvider {
    pub fn new(env: Env) -> Self {
        Self {
            env,
            time_source: TimeSource::system(),
        }
    }

    pub fn with_time_source(mut self, time_source: TimeSource) -> Self {
        self.time_source = time_source;
        self
    }
}

fn parse_expiration(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| {
            Error::invalid_config(format!("invalid {ENV_CREDENTIAL_EXPIRATION}: {err}"))
        })
}

fn read_credentials(env: &Env) -> Result<CredentialMetadata> {
    let method = ProviderKind::Environment.method();
    let access_key_id = env
        .get(ENV_ACCESS_KEY_ID)
        .ok_or_else(|| Error::partial(method, ENV_ACCESS_KEY_ID))?;
    let secret_access_key = env
        .get(ENV_SECRET_ACCESS_KEY)
        .ok_or_else(|| Error::partial(method, ENV_SECRET_ACCESS_KEY))?;
    let expiration = env.get(ENV_CREDENTIAL_EXPIRATION).map(parse_expiration).transpose()?;
    Ok(CredentialMetadata {
        access_key_id: access_key_id.to_string(),
        secret_access_key: secret_access_key.to_string(),
        session_token: env.get(ENV_SESSION_TOKEN).map(str::to_string),
        expiration,
    })
}

struct EnvRefresher {
    env: Env,
}

#[async_trait]
impl FetchCredentials for EnvRefresher {
    async fn fetch_credentials(&self) -> Result<CredentialMetadata> {
        let metadata = read_credentials(&self.env)?;
        if metadata.expiration.is_none() {
            return Err(Error::partial(
                ProviderKind::Environment.method(),
                ENV_CREDENTIAL_EXPIRATION,
            ));
        }
        Ok(metadata)
    }
}

#[async_trait]
impl ProvideCredentials for EnvironmentProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Environment
    }

    async fn load(&self) -> Result<Option<Credentials>> {
        if self.env.get(ENV_ACCESS_KEY_ID).is_none() {
            return Ok(None);
        }
        let metadata = read_credentials(&self.env)?;

        if metadata.expiration.is_some() {
            let refresher = Arc::new(EnvRefresher {
                env: self.env.clone(),
            });
            let credentials = RefreshableCredentials::new(
                metadata,
                refresher,
                ProviderKind::Environment,
                self.time_source.clone(),
            )?;
            return Ok(Some(Credentials::Refreshable(Arc::new(credentials))));
        }

        Ok(Some(Credentials::Static(StaticCredentials::new(
            metadata.access_key_id,
            metadata.secret_access_key,
            metadata.session_token,
            ProviderKind::Environment,
        ))))
    }
}
