//! Canonical-name lookup of credential sources.
//!
//! Role configuration can reference a non-profile source by a stable name
//! (`credential_source = Ec2InstanceMetadata`); the sourcer maps that name
//! back to a registered provider.

use std::sync::Arc;

use crate::credentials::Credentials;
use crate::provider::{ProvideCredentials, ProviderKind};
use crate::resolver::CredentialResolver;
use crate::{Error, Result};

enum Source {
    Provider(Arc<dyn ProvideCredentials>),
    Resolver(CredentialResolver),
}

/// Resolves `credential_source` names to loaded credentials.
pub struct CanonicalNameCredentialSourcer {
    providers: Vec<Arc<dyn ProvideCredentials>>,
}

impl CanonicalNameCredentialSourcer {
    pub fn new(providers: Vec<Arc<dyn ProvideCredentials>>) -> Self {
        Self { providers }
    }

    /// Load credentials from the provider registered under `name`.
    ///
    /// `Ok(None)` means the source exists but currently supplies nothing;
    /// an unregistered name is [`Error::UnknownCredential`].
    pub async fn source_credentials(&self, name: &str) -> Result<Option<Credentials>> {
        match self.lookup(name)? {
            Source::Provider(provider) => provider.load().await,
            Source::Resolver(resolver) => resolver.load_credentials().await,
        }
    }

    fn lookup(&self, name: &str) -> Result<Source> {
        let by_canonical_name = self.providers.iter().find(|provider| {
            provider
                .kind()
                .canonical_name()
                .is_some_and(|canonical| canonical.eq_ignore_ascii_case(name))
        });

        // The assume-role provider is historically intertwined with the two
        // shared-file providers: profiles resolved through either file may
        // carry role configuration. Looking up those names therefore folds
        // in the assume-role provider when one is registered.
        if name.eq_ignore_ascii_case("SharedConfig") || name.eq_ignore_ascii_case("SharedCredentials")
        {
            let assume_role = self
                .providers
                .iter()
                .find(|provider| provider.kind() == ProviderKind::AssumeRole);
            match (by_canonical_name, assume_role) {
                (Some(provider), Some(assume_role)) => {
                    return Ok(Source::Resolver(CredentialResolver::new(vec![
                        assume_role.clone(),
                        provider.clone(),
                    ])));
                }
                (None, Some(assume_role)) => return Ok(Source::Provider(assume_role.clone())),
                _ => {}
            }
        }

        by_canonical_name
            .cloned()
            .map(Source::Provider)
            .ok_or_else(|| Error::UnknownCredential {
                name: name.to_string(),
            })
    }
}
