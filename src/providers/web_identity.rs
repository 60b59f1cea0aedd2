//! Web-identity role assumption provider.
//!
//! Configuration comes from the profile or, unless disabled, from the
//! `AWS_WEB_IDENTITY_TOKEN_FILE` family of environment variables. The token
//! exchange itself is unsigned and deferred until credentials are first
//! used.

use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::CredentialCache;
use crate::config::{ConfigSnapshot, Env};
use crate::credentials::Credentials;
use crate::fetcher::{FileTokenLoader, WebIdentityFetcher, WebIdentityTokenLoader};
use crate::provider::{ProvideCredentials, ProviderKind};
use crate::refresh::{FetchCredentials, RefreshableCredentials};
use crate::sts::{AssumeRoleRequest, StsClient};
use crate::time::TimeSource;
use crate::{Error, Result};

const KEY_TOKEN_FILE: &str = "web_identity_token_file";
const KEY_ROLE_ARN: &str = "role_arn";
const KEY_ROLE_SESSION_NAME: &str = "role_session_name";

const ENV_TOKEN_FILE: &str = "AWS_WEB_IDENTITY_TOKEN_FILE";
const ENV_ROLE_ARN: &str = "AWS_ROLE_ARN";
const ENV_ROLE_SESSION_NAME: &str = "AWS_ROLE_SESSION_NAME";

pub struct AssumeRoleWithWebIdentityProvider {
    config: Arc<ConfigSnapshot>,
    env: Env,
    sts: Arc<dyn StsClient>,
    cache: Arc<dyn CredentialCache>,
    profile_name: String,
    disable_env_vars: bool,
    token_loader: Option<Arc<dyn WebIdentityTokenLoader>>,
    time_source: TimeSource,
}

impl AssumeRoleWithWebIdentityProvider {
    pub fn new(
        config: Arc<ConfigSnapshot>,
        env: Env,
        sts: Arc<dyn StsClient>,
        cache: Arc<dyn CredentialCache>,
        profile_name: impl Into<String>,
        disable_env_vars: bool,
        time_source: TimeSource,
    ) -> Self {
        Self {
            config,
            env,
            sts,
            cache,
            profile_name: profile_name.into(),
            disable_env_vars,
            token_loader: None,
            time_source,
        }
    }

    /// Override how the bearer token is loaded; primarily for tests.
    pub fn with_token_loader(mut self, loader: Arc<dyn WebIdentityTokenLoader>) -> Self {
        self.token_loader = Some(loader);
        self
    }

    fn get_config(&self, env_var: &str, profile_key: &str) -> Option<String> {
        if !self.disable_env_vars
            && let Some(value) = self.env.get(env_var)
        {
            return Some(value.to_string());
        }
        self.config
            .profile(&self.profile_name)
            .and_then(|profile| profile.get(profile_key))
            .cloned()
    }
}

#[async_trait]
impl ProvideCredentials for AssumeRoleWithWebIdentityProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::AssumeRoleWithWebIdentity
    }

    async fn load(&self) -> Result<Option<Credentials>> {
        let Some(token_path) = self.get_config(ENV_TOKEN_FILE, KEY_TOKEN_FILE) else {
            return Ok(None);
        };
        let Some(role_arn) = self.get_config(ENV_ROLE_ARN, KEY_ROLE_ARN) else {
            return Err(Error::invalid_config(
                "configured to assume role with web identity but no role ARN was found; \
                 set the profile's role_arn or the AWS_ROLE_ARN environment variable",
            ));
        };

        let token_loader = self
            .token_loader
            .clone()
            .unwrap_or_else(|| Arc::new(FileTokenLoader::new(&token_path)));

        let request = AssumeRoleRequest {
            role_session_name: self.get_config(ENV_ROLE_SESSION_NAME, KEY_ROLE_SESSION_NAME),
            ..AssumeRoleRequest::new(role_arn)
        };
        let fetcher: Arc<dyn FetchCredentials> = Arc::new(WebIdentityFetcher::new(
            self.sts.clone(),
            token_loader,
            request,
            self.cache.clone(),
            self.time_source.clone(),
        ));

        Ok(Some(Credentials::Refreshable(Arc::new(
            RefreshableCredentials::deferred(fetcher, self.kind(), self.time_source.clone()),
        ))))
    }
}
