//! Profile-based role assumption.
//!
//! A profile carrying `role_arn` plus a credential source is resolved in
//! two steps: the source credentials are resolved eagerly (recursively, for
//! chained `source_profile` hops), then the role exchange itself is wrapped
//! in deferred refreshable credentials so the remote call only happens when
//! the credentials are first used.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::CredentialCache;
use crate::config::{ConfigSnapshot, Profile};
use crate::credentials::Credentials;
use crate::fetcher::{AssumeRoleFetcher, MfaSerialRefresher};
use crate::provider::{ProvideCredentials, ProviderKind};
use crate::refresh::{FetchCredentials, RefreshableCredentials};
use crate::resolver::{CredentialResolver, ProfileProviderBuilder};
use crate::sourcer::CanonicalNameCredentialSourcer;
use crate::sts::{AssumeRoleRequest, StsClient};
use crate::time::TimeSource;
use crate::{Error, Result};

use super::profile::{KEY_ACCESS_KEY_ID, KEY_SECRET_ACCESS_KEY};

const KEY_ROLE_ARN: &str = "role_arn";
const KEY_SOURCE_PROFILE: &str = "source_profile";
const KEY_CREDENTIAL_SOURCE: &str = "credential_source";
const KEY_WEB_IDENTITY_TOKEN_FILE: &str = "web_identity_token_file";
const KEY_ROLE_SESSION_NAME: &str = "role_session_name";
const KEY_EXTERNAL_ID: &str = "external_id";
const KEY_MFA_SERIAL: &str = "mfa_serial";
const KEY_DURATION_SECONDS: &str = "duration_seconds";

/// Whether a profile is configured for (non-web-identity) role assumption.
pub(crate) fn has_role_config(profile: &Profile) -> bool {
    profile.contains_key(KEY_ROLE_ARN)
        && (profile.contains_key(KEY_SOURCE_PROFILE)
            || profile.contains_key(KEY_CREDENTIAL_SOURCE))
        && !profile.contains_key(KEY_WEB_IDENTITY_TOKEN_FILE)
}

fn has_static_credentials(profile: &Profile) -> bool {
    profile.contains_key(KEY_ACCESS_KEY_ID) || profile.contains_key(KEY_SECRET_ACCESS_KEY)
}

struct RoleConfig {
    role_arn: String,
    source_profile: Option<String>,
    credential_source: Option<String>,
    role_session_name: Option<String>,
    external_id: Option<String>,
    mfa_serial: Option<String>,
    duration_seconds: Option<i64>,
}

/// Resolves role-assumption configuration for the active profile.
pub struct AssumeRoleProvider {
    config: Arc<ConfigSnapshot>,
    sts: Arc<dyn StsClient>,
    cache: Arc<dyn CredentialCache>,
    profile_name: String,
    credential_sourcer: CanonicalNameCredentialSourcer,
    profile_provider_builder: Option<ProfileProviderBuilder>,
    time_source: TimeSource,
}

impl AssumeRoleProvider {
    pub fn new(
        config: Arc<ConfigSnapshot>,
        sts: Arc<dyn StsClient>,
        cache: Arc<dyn CredentialCache>,
        profile_name: impl Into<String>,
        credential_sourcer: CanonicalNameCredentialSourcer,
        profile_provider_builder: Option<ProfileProviderBuilder>,
        time_source: TimeSource,
    ) -> Self {
        Self {
            config,
            sts,
            cache,
            profile_name: profile_name.into(),
            credential_sourcer,
            profile_provider_builder,
            time_source,
        }
    }

    fn role_config(&self, profile_name: &str) -> Result<RoleConfig> {
        let profile = self.config.profile(profile_name).ok_or_else(|| {
            Error::invalid_config(format!("profile \"{profile_name}\" does not exist"))
        })?;
        let role_arn = profile.get(KEY_ROLE_ARN).cloned().ok_or_else(|| {
            Error::invalid_config(format!(
                "profile \"{profile_name}\" is configured to assume a role but has no role_arn"
            ))
        })?;

        let source_profile = profile.get(KEY_SOURCE_PROFILE).cloned();
        let credential_source = profile.get(KEY_CREDENTIAL_SOURCE).cloned();
        match (&source_profile, &credential_source) {
            (Some(_), Some(_)) => {
                return Err(Error::invalid_config(format!(
                    "profile \"{profile_name}\" contains both source_profile and credential_source"
                )));
            }
            (None, None) => {
                return Err(Error::invalid_config(format!(
                    "profile \"{profile_name}\" requires either source_profile or credential_source"
                )));
            }
            _ => {}
        }
        if let Some(source) = &source_profile
            && self.config.profile(source).is_none()
        {
            return Err(Error::invalid_config(format!(
                "the source_profile \"{source}\" referenced in profile \"{profile_name}\" does not exist"
            )));
        }

        let duration_seconds = profile
            .get(KEY_DURATION_SECONDS)
            .map(|raw| {
                raw.parse::<i64>().map_err(|_| {
                    Error::invalid_config(format!(
                        "invalid duration_seconds in profile \"{profile_name}\": {raw}"
                    ))
                })
            })
            .transpose()?;

        Ok(RoleConfig {
            role_arn,
            source_profile,
            credential_source,
            role_session_name: profile.get(KEY_ROLE_SESSION_NAME).cloned(),
            external_id: profile.get(KEY_EXTERNAL_ID).cloned(),
            mfa_serial: profile.get(KEY_MFA_SERIAL).cloned(),
            duration_seconds,
        })
    }

    fn load_creds_via_assume_role<'a>(
        &'a self,
        profile_name: String,
        visited: &'a mut Vec<String>,
    ) -> Pin<Box<dyn Future<Output = Result<Credentials>> + Send + 'a>> {
        Box::pin(async move {
            let role_config = self.role_config(&profile_name)?;
            let source_credentials = self
                .resolve_source_credentials(&role_config, &profile_name, visited)
                .await?;

            let request = AssumeRoleRequest {
                role_arn: role_config.role_arn.clone(),
                role_session_name: role_config.role_session_name.clone(),
                external_id: role_config.external_id.clone(),
                serial_number: role_config.mfa_serial.clone(),
                duration_seconds: role_config.duration_seconds,
            };
            let fetcher = AssumeRoleFetcher::new(
                self.sts.clone(),
                source_credentials,
                request,
                self.cache.clone(),
                self.time_source.clone(),
            );
            let refresher: Arc<dyn FetchCredentials> = if role_config.mfa_serial.is_some() {
                Arc::new(MfaSerialRefresher::new(Arc::new(fetcher)))
            } else {
                Arc::new(fetcher)
            };

            // The role exchange is deferred until the credentials are
            // actually used.
            Ok(Credentials::Refreshable(Arc::new(
                RefreshableCredentials::deferred(
                    refresher,
                    ProviderKind::AssumeRole,
                    self.time_source.clone(),
                ),
            )))
        })
    }

    async fn resolve_source_credentials(
        &self,
        role_config: &RoleConfig,
        profile_name: &str,
        visited: &mut Vec<String>,
    ) -> Result<Credentials> {
        if let Some(credential_source) = &role_config.credential_source {
            return self
                .resolve_credentials_from_source(credential_source, profile_name)
                .await;
        }

        let source_profile = role_config.source_profile.clone().ok_or_else(|| {
            Error::invalid_config(format!(
                "profile \"{profile_name}\" requires either source_profile or credential_source"
            ))
        })?;
        if visited.contains(&source_profile) {
            return Err(Error::invalid_config(format!(
                "circular reference detected in credential profiles: {} -> {source_profile}",
                visited.join(" -> ")
            )));
        }
        visited.push(source_profile.clone());
        self.resolve_credentials_from_profile(source_profile, visited)
            .await
    }

    async fn resolve_credentials_from_profile(
        &self,
        profile_name: String,
        visited: &mut Vec<String>,
    ) -> Result<Credentials> {
        let profile = self.config.profile(&profile_name).ok_or_else(|| {
            Error::invalid_config(format!("profile \"{profile_name}\" does not exist"))
        })?;

        // Plain static keys resolve directly when no other provider
        // machinery is configured.
        if has_static_credentials(profile) && self.profile_provider_builder.is_none() {
            return static_source_credentials(profile);
        }

        if has_static_credentials(profile) || !has_role_config(profile) {
            let Some(builder) = &self.profile_provider_builder else {
                return Err(Error::invalid_config(format!(
                    "the source profile \"{profile_name}\" must have credentials"
                )));
            };
            let chain = CredentialResolver::new(builder.providers(&profile_name, true));
            let credentials = chain.load_credentials().await?;
            return credentials.ok_or_else(|| {
                Error::invalid_config(format!(
                    "the source profile \"{profile_name}\" must have credentials"
                ))
            });
        }

        self.load_creds_via_assume_role(profile_name, visited).await
    }

    async fn resolve_credentials_from_source(
        &self,
        credential_source: &str,
        profile_name: &str,
    ) -> Result<Credentials> {
        let credentials = self
            .credential_sourcer
            .source_credentials(credential_source)
            .await?;
        credentials.ok_or_else(|| {
            Error::retrieval(
                credential_source,
                format!("No credentials found in credential_source referenced in profile {profile_name}"),
            )
        })
    }
}

fn static_source_credentials(profile: &Profile) -> Result<Credentials> {
    let method = ProviderKind::AssumeRole.method();
    let access_key_id = profile
        .get(KEY_ACCESS_KEY_ID)
        .ok_or_else(|| Error::partial(method, KEY_ACCESS_KEY_ID))?;
    let secret_access_key = profile
        .get(KEY_SECRET_ACCESS_KEY)
        .ok_or_else(|| Error::partial(method, KEY_SECRET_ACCESS_KEY))?;
    Ok(Credentials::Static(crate::credentials::StaticCredentials::new(
        access_key_id,
        secret_access_key,
        profile.get(super::profile::KEY_SESSION_TOKEN).cloned(),
        ProviderKind::SharedConfigFile,
    )))
}

#[async_trait]
impl ProvideCredentials for AssumeRoleProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::AssumeRole
    }

    async fn load(&self) -> Result<Option<Credentials>> {
        let Some(profile) = self.config.profile(&self.profile_name) else {
            return Ok(None);
        };
        if !has_role_config(profile) {
            return Ok(None);
        }
        let mut visited = vec![self.profile_name.clone()];
        self.load_creds_via_assume_role(self.profile_name.clone(), &mut visited)
            .await
            .map(Some)
    }
}
