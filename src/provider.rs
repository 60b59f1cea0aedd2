//! The provider capability and the closed set of provider variants.

use std::fmt;

use async_trait::async_trait;

use crate::credentials::Credentials;
use crate::Result;

/// Every credential source the default chain knows about.
///
/// `method()` is the stable diagnostic name attached to resolved
/// credentials; `canonical_name()` is the identifier role configuration may
/// reference through `credential_source`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Environment,
    AssumeRole,
    AssumeRoleWithWebIdentity,
    Process,
    SharedCredentialsFile,
    SharedConfigFile,
    InstanceMetadata,
    ContainerMetadata,
    Ec2CredentialsFile,
    BotoConfig,
}

impl ProviderKind {
    pub fn method(&self) -> &'static str {
        match self {
            ProviderKind::Environment => "env",
            ProviderKind::AssumeRole => "assume-role",
            ProviderKind::AssumeRoleWithWebIdentity => "assume-role-with-web-identity",
            ProviderKind::Process => "custom-process",
            ProviderKind::SharedCredentialsFile => "shared-credentials-file",
            ProviderKind::SharedConfigFile => "config-file",
            ProviderKind::InstanceMetadata => "iam-role",
            ProviderKind::ContainerMetadata => "container-role",
            ProviderKind::Ec2CredentialsFile => "ec2-credentials-file",
            ProviderKind::BotoConfig => "boto-config",
        }
    }

    pub fn canonical_name(&self) -> Option<&'static str> {
        match self {
            ProviderKind::Environment => Some("Environment"),
            ProviderKind::SharedCredentialsFile => Some("SharedCredentials"),
            ProviderKind::SharedConfigFile => Some("SharedConfig"),
            ProviderKind::InstanceMetadata => Some("Ec2InstanceMetadata"),
            ProviderKind::ContainerMetadata => Some("EcsContainer"),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method())
    }
}

/// Capability to load credentials from one source.
///
/// `Ok(None)` means "this provider does not apply here" and is a normal
/// outcome, never an error; the resolver moves on to the next provider.
#[async_trait]
pub trait ProvideCredentials: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn load(&self) -> Result<Option<Credentials>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_names() {
        assert_eq!(
            ProviderKind::InstanceMetadata.canonical_name(),
            Some("Ec2InstanceMetadata")
        );
        assert_eq!(ProviderKind::AssumeRole.canonical_name(), None);
    }

    #[test]
    fn test_display_uses_method() {
        assert_eq!(ProviderKind::AssumeRole.to_string(), "assume-role");
        assert_eq!(ProviderKind::Process.to_string(), "custom-process");
    }
}
