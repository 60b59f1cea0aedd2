//! Static credentials from the shared credentials and config files.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{ConfigSnapshot, Profile};
use crate::credentials::{Credentials, StaticCredentials};
use crate::provider::{ProvideCredentials, ProviderKind};
use crate::{Error, Result};

pub(crate) const KEY_ACCESS_KEY_ID: &str = "aws_access_key_id";
pub(crate) const KEY_SECRET_ACCESS_KEY: &str = "aws_secret_access_key";
pub(crate) const KEY_SESSION_TOKEN: &str = "aws_session_token";

pub(crate) fn static_credentials_from_profile(
    profile: &Profile,
    method: ProviderKind,
) -> Result<Option<Credentials>> {
    let Some(access_key_id) = profile.get(KEY_ACCESS_KEY_ID) else {
        return Ok(None);
    };
    let secret_access_key = profile
        .get(KEY_SECRET_ACCESS_KEY)
        .ok_or_else(|| Error::partial(method.method(), KEY_SECRET_ACCESS_KEY))?;
    Ok(Some(Credentials::Static(StaticCredentials::new(
        access_key_id,
        secret_access_key,
        profile.get(KEY_SESSION_TOKEN).cloned(),
        method,
    ))))
}

/// Static keys from the shared credentials file (`~/.aws/credentials`).
pub struct SharedCredentialsProvider {
    config: Arc<ConfigSnapshot>,
    profile_name: String,
}

impl SharedCredentialsProvider {
    pub fn new(config: Arc<ConfigSnapshot>, profile_name: impl Into<String>) -> Self {
        Self {
            config,
            profile_name: profile_name.into(),
        }
    }
}

#[async_trait]
impl ProvideCredentials for SharedCredentialsProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::SharedCredentialsFile
    }

    async fn load(&self) -> Result<Option<Credentials>> {
        match self.config.credentials_profile(&self.profile_name) {
            Some(profile) => static_credentials_from_profile(profile, self.kind()),
            None => Ok(None),
        }
    }
}

/// Static keys from the shared config file (`~/.aws/config`).
pub struct SharedConfigProvider {
    config: Arc<ConfigSnapshot>,
    profile_name: String,
}

impl SharedConfigProvider {
    pub fn new(config: Arc<ConfigSnapshot>, profile_name: impl Into<String>) -> Self {
        Self {
            config,
            profile_name: profile_name.into(),
        }
    }
}

#[async_trait]
impl ProvideCredentials for SharedConfigProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::SharedConfigFile
    }

    async fn load(&self) -> Result<Option<Credentials>> {
        match self.config.profile(&self.profile_name) {
            Some(profile) => static_credentials_from_profile(profile, self.kind()),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_credentials_file_profile() {
        let config = Arc::new(
            ConfigSnapshot::builder()
                .credentials_profile(
                    "dev",
                    [
                        (KEY_ACCESS_KEY_ID, "FILE_AK"),
                        (KEY_SECRET_ACCESS_KEY, "FILE_SK"),
                        (KEY_SESSION_TOKEN, "FILE_TOKEN"),
                    ],
                )
                .build(),
        );
        let provider = SharedCredentialsProvider::new(config, "dev");
        let credentials = provider.load().await.unwrap().unwrap();
        let frozen = credentials.get_frozen_credentials().await.unwrap();
        assert_eq!(frozen.access_key_id(), "FILE_AK");
        assert_eq!(frozen.session_token(), Some("FILE_TOKEN"));
        assert_eq!(credentials.method(), ProviderKind::SharedCredentialsFile);
    }

    #[tokio::test]
    async fn test_missing_profile_is_not_applicable() {
        let provider =
            SharedCredentialsProvider::new(Arc::new(ConfigSnapshot::default()), "absent");
        assert!(provider.load().await.unwrap().is_none());

        let provider = SharedConfigProvider::new(Arc::new(ConfigSnapshot::default()), "absent");
        assert!(provider.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_profile_without_keys_is_not_applicable() {
        let config = Arc::new(
            ConfigSnapshot::builder()
                .profile("dev", [("region", "eu-west-1")])
                .build(),
        );
        let provider = SharedConfigProvider::new(config, "dev");
        assert!(provider.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_partial_keys_are_an_error() {
        let config = Arc::new(
            ConfigSnapshot::builder()
                .profile("dev", [(KEY_ACCESS_KEY_ID, "FILE_AK")])
                .build(),
        );
        let provider = SharedConfigProvider::new(config, "dev");
        let err = provider.load().await.unwrap_err();
        assert!(matches!(err, Error::PartialCredentials { .. }));
    }
}
