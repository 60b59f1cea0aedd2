//! Legacy credential sources kept for compatibility: the EC2 credential
//! file and the global boto config. Both consume pre-parsed maps from the
//! configuration snapshot; neither supports session tokens or refresh.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ConfigSnapshot;
use crate::credentials::{Credentials, StaticCredentials};
use crate::provider::{ProvideCredentials, ProviderKind};
use crate::Result;

use super::profile::{KEY_ACCESS_KEY_ID, KEY_SECRET_ACCESS_KEY};

const EC2_ACCESS_KEY: &str = "AWSAccessKeyId";
const EC2_SECRET_KEY: &str = "AWSSecretKey";
const BOTO_CREDENTIALS_SECTION: &str = "Credentials";

/// Keys from the file named by `AWS_CREDENTIAL_FILE` in the original EC2
/// tooling.
pub struct Ec2CredentialsFileProvider {
    config: Arc<ConfigSnapshot>,
}

impl Ec2CredentialsFileProvider {
    pub fn new(config: Arc<ConfigSnapshot>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ProvideCredentials for Ec2CredentialsFileProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ec2CredentialsFile
    }

    async fn load(&self) -> Result<Option<Credentials>> {
        let file = self.config.ec2_credential_file();
        match (file.get(EC2_ACCESS_KEY), file.get(EC2_SECRET_KEY)) {
            (Some(access_key_id), Some(secret_access_key)) => {
                Ok(Some(Credentials::Static(StaticCredentials::new(
                    access_key_id,
                    secret_access_key,
                    None,
                    self.kind(),
                ))))
            }
            _ => Ok(None),
        }
    }
}

/// Keys from the `[Credentials]` section of the boto config.
pub struct BotoConfigProvider {
    config: Arc<ConfigSnapshot>,
}

impl BotoConfigProvider {
    pub fn new(config: Arc<ConfigSnapshot>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ProvideCredentials for BotoConfigProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::BotoConfig
    }

    async fn load(&self) -> Result<Option<Credentials>> {
        let Some(section) = self.config.boto_config_section(BOTO_CREDENTIALS_SECTION) else {
            return Ok(None);
        };
        match (section.get(KEY_ACCESS_KEY_ID), section.get(KEY_SECRET_ACCESS_KEY)) {
            (Some(access_key_id), Some(secret_access_key)) => {
                Ok(Some(Credentials::Static(StaticCredentials::new(
                    access_key_id,
                    secret_access_key,
                    None,
                    self.kind(),
                ))))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ec2_credential_file() {
        let config = Arc::new(
            ConfigSnapshot::builder()
                .ec2_credential_file([(EC2_ACCESS_KEY, "EC2_AK"), (EC2_SECRET_KEY, "EC2_SK")])
                .build(),
        );
        let provider = Ec2CredentialsFileProvider::new(config);
        let credentials = provider.load().await.unwrap().unwrap();
        let frozen = credentials.get_frozen_credentials().await.unwrap();
        assert_eq!(frozen.access_key_id(), "EC2_AK");

        let empty = Ec2CredentialsFileProvider::new(Arc::new(ConfigSnapshot::default()));
        assert!(empty.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_boto_config() {
        let config = Arc::new(
            ConfigSnapshot::builder()
                .boto_config_section(
                    BOTO_CREDENTIALS_SECTION,
                    [
                        (KEY_ACCESS_KEY_ID, "BOTO_AK"),
                        (KEY_SECRET_ACCESS_KEY, "BOTO_SK"),
                    ],
                )
                .build(),
        );
        let provider = BotoConfigProvider::new(config);
        let credentials = provider.load().await.unwrap().unwrap();
        assert_eq!(credentials.method(), ProviderKind::BotoConfig);

        let empty = BotoConfigProvider::new(Arc::new(ConfigSnapshot::default()));
        assert!(empty.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_incomplete_sections_are_not_applicable() {
        let config = Arc::new(
            ConfigSnapshot::builder()
                .ec2_credential_file([(EC2_ACCESS_KEY, "EC2_AK")])
                .boto_config_section(BOTO_CREDENTIALS_SECTION, [(KEY_ACCESS_KEY_ID, "BOTO_AK")])
                .build(),
        );
        assert!(Ec2CredentialsFileProvider::new(config.clone())
            .load()
            .await
            .unwrap()
            .is_none());
        assert!(BotoConfigProvider::new(config).load().await.unwrap().is_none());
    }
}
