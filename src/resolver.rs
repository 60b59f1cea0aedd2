//! Provider chain resolution and default chain construction.

use std::sync::Arc;

use crate::cache::{CredentialCache, InMemoryCache};
use crate::config::{ConfigSnapshot, Env};
use crate::credentials::Credentials;
use crate::metadata::{
    ContainerMetadataFetcher, EcsHttpFetcher, ImdsHttpFetcher, InstanceMetadataFetcher,
};
use crate::provider::{ProvideCredentials, ProviderKind};
use crate::providers::{
    AssumeRoleProvider, AssumeRoleWithWebIdentityProvider, BotoConfigProvider, CommandRunner,
    ContainerProvider, Ec2CredentialsFileProvider, EnvironmentProvider, InstanceMetadataProvider,
    ProcessProvider, SharedConfigProvider, SharedCredentialsProvider, ShellCommandRunner,
};
use crate::sourcer::CanonicalNameCredentialSourcer;
use crate::sts::StsClient;
use crate::time::TimeSource;
use crate::Result;

/// An ordered sequence of providers; first non-empty answer wins.
pub struct CredentialResolver {
    providers: Vec<Arc<dyn ProvideCredentials>>,
}

impl CredentialResolver {
    pub fn new(providers: Vec<Arc<dyn ProvideCredentials>>) -> Self {
        Self { providers }
    }

    /// The providers in resolution order.
    pub fn providers(&self) -> &[Arc<dyn ProvideCredentials>] {
        &self.providers
    }

    /// Walk the chain strictly in order and return the first credentials
    /// found.
    ///
    /// `Ok(None)` means no provider applied. Historically absence is not an
    /// error at this layer; callers decide whether it is fatal.
    pub async fn load_credentials(&self) -> Result<Option<Credentials>> {
        for provider in &self.providers {
            tracing::debug!(provider = %provider.kind(), "looking for credentials");
            if let Some(credentials) = provider.load().await? {
                return Ok(Some(credentials));
            }
        }
        Ok(None)
    }
}

impl std::fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<_> = self.providers.iter().map(|p| p.kind()).collect();
        f.debug_struct("CredentialResolver")
            .field("providers", &kinds)
            .finish()
    }
}

/// Builds the profile-aware provider sub-chain for a given profile, in
/// priority order: external process, shared credentials file, shared config
/// file, web-identity role assumption.
#[derive(Clone)]
pub struct ProfileProviderBuilder {
    config: Arc<ConfigSnapshot>,
    env: Env,
    cache: Arc<dyn CredentialCache>,
    sts: Arc<dyn StsClient>,
    runner: Arc<dyn CommandRunner>,
    time_source: TimeSource,
}

impl ProfileProviderBuilder {
    pub fn new(
        config: Arc<ConfigSnapshot>,
        env: Env,
        cache: Arc<dyn CredentialCache>,
        sts: Arc<dyn StsClient>,
        runner: Arc<dyn CommandRunner>,
        time_source: TimeSource,
    ) -> Self {
        Self {
            config,
            env,
            cache,
            sts,
            runner,
            time_source,
        }
    }

    pub fn providers(
        &self,
        profile_name: &str,
        disable_env_vars: bool,
    ) -> Vec<Arc<dyn ProvideCredentials>> {
        vec![
            Arc::new(ProcessProvider::new(
                self.config.clone(),
                profile_name,
                self.runner.clone(),
                self.time_source.clone(),
            )),
            Arc::new(SharedCredentialsProvider::new(
                self.config.clone(),
                profile_name,
            )),
            Arc::new(SharedConfigProvider::new(self.config.clone(), profile_name)),
            Arc::new(AssumeRoleWithWebIdentityProvider::new(
                self.config.clone(),
                self.env.clone(),
                self.sts.clone(),
                self.cache.clone(),
                profile_name,
                disable_env_vars,
                self.time_source.clone(),
            )),
        ]
    }
}

/// Assembles the default chain for a configuration snapshot.
///
/// Resolution order: environment variables, profile role assumption, the
/// profile sub-chain, then the legacy and metadata providers. Explicitly
/// selecting a profile removes the environment provider - an explicit
/// choice must not be silently overridden by ambient credentials. A profile
/// name that merely came from `AWS_PROFILE` leaves it in place, so
/// environment credentials still win unless absent.
pub struct ResolverBuilder {
    config: Arc<ConfigSnapshot>,
    sts: Arc<dyn StsClient>,
    env: Option<Env>,
    cache: Option<Arc<dyn CredentialCache>>,
    instance_metadata: Option<Arc<dyn InstanceMetadataFetcher>>,
    container_metadata: Option<Arc<dyn ContainerMetadataFetcher>>,
    command_runner: Option<Arc<dyn CommandRunner>>,
    time_source: TimeSource,
}

impl ResolverBuilder {
    pub fn new(config: ConfigSnapshot, sts: Arc<dyn StsClient>) -> Self {
        Self {
            config: Arc::new(config),
            sts,
            env: None,
            cache: None,
            instance_metadata: None,
            container_metadata: None,
            command_runner: None,
            time_source: TimeSource::system(),
        }
    }

    /// Override the environment; defaults to capturing the process
    /// environment.
    pub fn env(mut self, env: Env) -> Self {
        self.env = Some(env);
        self
    }

    /// Share a credential cache; defaults to a process-local map.
    pub fn cache(mut self, cache: Arc<dyn CredentialCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn instance_metadata(mut self, fetcher: Arc<dyn InstanceMetadataFetcher>) -> Self {
        self.instance_metadata = Some(fetcher);
        self
    }

    pub fn container_metadata(mut self, fetcher: Arc<dyn ContainerMetadataFetcher>) -> Self {
        self.container_metadata = Some(fetcher);
        self
    }

    pub fn command_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.command_runner = Some(runner);
        self
    }

    pub fn time_source(mut self, time_source: TimeSource) -> Self {
        self.time_source = time_source;
        self
    }

    pub fn build(self) -> Result<CredentialResolver> {
        let env = self.env.unwrap_or_else(Env::capture);
        let cache: Arc<dyn CredentialCache> = match self.cache {
            Some(cache) => cache,
            None => Arc::new(InMemoryCache::new()),
        };
        let instance_metadata: Arc<dyn InstanceMetadataFetcher> = match self.instance_metadata {
            Some(fetcher) => fetcher,
            None => Arc::new(ImdsHttpFetcher::new()?),
        };
        let container_metadata: Arc<dyn ContainerMetadataFetcher> = match self.container_metadata {
            Some(fetcher) => fetcher,
            None => Arc::new(EcsHttpFetcher::new()?),
        };
        let runner: Arc<dyn CommandRunner> = match self.command_runner {
            Some(runner) => runner,
            None => Arc::new(ShellCommandRunner),
        };

        let profile_name = self.config.profile_name().to_string();
        let disable_env_vars = self.config.profile_is_explicit();

        let env_provider = Arc::new(
            EnvironmentProvider::new(env.clone()).with_time_source(self.time_source.clone()),
        );
        let container_provider = Arc::new(
            ContainerProvider::new(env.clone(), container_metadata)
                .with_time_source(self.time_source.clone()),
        );
        let instance_metadata_provider = Arc::new(
            InstanceMetadataProvider::new(instance_metadata)
                .with_time_source(self.time_source.clone()),
        );

        let profile_provider_builder = ProfileProviderBuilder::new(
            self.config.clone(),
            env,
            cache.clone(),
            self.sts.clone(),
            runner,
            self.time_source.clone(),
        );
        let credential_sourcer = CanonicalNameCredentialSourcer::new(vec![
            env_provider.clone(),
            container_provider.clone(),
            instance_metadata_provider.clone(),
        ]);
        let assume_role_provider = Arc::new(AssumeRoleProvider::new(
            self.config.clone(),
            self.sts,
            cache,
            profile_name.clone(),
            credential_sourcer,
            Some(profile_provider_builder.clone()),
            self.time_source,
        ));

        let mut providers: Vec<Arc<dyn ProvideCredentials>> =
            vec![env_provider, assume_role_provider];
        providers.extend(profile_provider_builder.providers(&profile_name, disable_env_vars));
        providers.push(Arc::new(Ec2CredentialsFileProvider::new(self.config.clone())));
        providers.push(Arc::new(BotoConfigProvider::new(self.config.clone())));
        providers.push(container_provider);
        providers.push(instance_metadata_provider);

        if disable_env_vars {
            tracing::debug!(
                "skipping environment variable credential check because profile name was explicitly set"
            );
            providers.retain(|provider| provider.kind() != ProviderKind::Environment);
        }

        Ok(CredentialResolver::new(providers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::credentials::StaticCredentials;
    use crate::sts::{AssumeRoleRequest, StsCredentials};
    use crate::{Error, Result};

    struct CountingProvider {
        kind: ProviderKind,
        key: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl CountingProvider {
        fn new(kind: ProviderKind, key: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                kind,
                key,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ProvideCredentials for CountingProvider {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        async fn load(&self) -> Result<Option<Credentials>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.key.map(|key| {
                Credentials::Static(StaticCredentials::new(key, "secret", None, self.kind))
            }))
        }
    }

    struct NoSts;

    #[async_trait]
    impl StsClient for NoSts {
        async fn assume_role(
            &self,
            _source_credentials: &crate::credentials::FrozenCredentials,
            _request: &AssumeRoleRequest,
        ) -> Result<StsCredentials> {
            Err(Error::retrieval("sts", "unavailable in tests"))
        }

        async fn assume_role_with_web_identity(
            &self,
            _request: &AssumeRoleRequest,
            _web_identity_token: &str,
        ) -> Result<StsCredentials> {
            Err(Error::retrieval("sts", "unavailable in tests"))
        }
    }

    fn kinds(resolver: &CredentialResolver) -> Vec<ProviderKind> {
        resolver.providers().iter().map(|p| p.kind()).collect()
    }

    #[tokio::test]
    async fn test_first_provider_wins_and_later_ones_are_not_invoked() {
        let first = CountingProvider::new(ProviderKind::Environment, None);
        let second = CountingProvider::new(ProviderKind::SharedCredentialsFile, Some("WINNER"));
        let third = CountingProvider::new(ProviderKind::SharedConfigFile, Some("LOSER"));
        let resolver = CredentialResolver::new(vec![first.clone(), second.clone(), third.clone()]);

        let credentials = resolver.load_credentials().await.unwrap().unwrap();
        let frozen = credentials.get_frozen_credentials().await.unwrap();
        assert_eq!(frozen.access_key_id(), "WINNER");

        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
        assert_eq!(third.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_exhausted_chain_is_none_not_an_error() {
        let resolver = CredentialResolver::new(vec![
            CountingProvider::new(ProviderKind::Environment, None),
            CountingProvider::new(ProviderKind::SharedConfigFile, None),
        ]);
        assert!(resolver.load_credentials().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_provider_errors_propagate() {
        struct FailingProvider;
        #[async_trait]
        impl ProvideCredentials for FailingProvider {
            fn kind(&self) -> ProviderKind {
                ProviderKind::SharedConfigFile
            }

            async fn load(&self) -> Result<Option<Credentials>> {
                Err(Error::invalid_config("broken profile"))
            }
        }

        let resolver = CredentialResolver::new(vec![Arc::new(FailingProvider)]);
        assert!(resolver.load_credentials().await.is_err());
    }

    #[test]
    fn test_default_chain_order() {
        let resolver = ResolverBuilder::new(ConfigSnapshot::default(), Arc::new(NoSts))
            .env(Env::from_slice(&[]))
            .build()
            .unwrap();
        assert_eq!(
            kinds(&resolver),
            vec![
                ProviderKind::Environment,
                ProviderKind::AssumeRole,
                ProviderKind::Process,
                ProviderKind::SharedCredentialsFile,
                ProviderKind::SharedConfigFile,
                ProviderKind::AssumeRoleWithWebIdentity,
                ProviderKind::Ec2CredentialsFile,
                ProviderKind::BotoConfig,
                ProviderKind::ContainerMetadata,
                ProviderKind::InstanceMetadata,
            ]
        );
    }

    #[test]
    fn test_explicit_profile_removes_environment_provider() {
        let config = ConfigSnapshot::builder().active_profile("dev").build();
        let resolver = ResolverBuilder::new(config, Arc::new(NoSts))
            .env(Env::from_slice(&[]))
            .build()
            .unwrap();
        assert!(!kinds(&resolver).contains(&ProviderKind::Environment));

        let config = ConfigSnapshot::builder().active_profile_from_env("dev").build();
        let resolver = ResolverBuilder::new(config, Arc::new(NoSts))
            .env(Env::from_slice(&[]))
            .build()
            .unwrap();
        assert!(kinds(&resolver).contains(&ProviderKind::Environment));
    }

    #[tokio::test]
    async fn test_environment_wins_over_profile_when_not_explicit() {
        let config = ConfigSnapshot::builder()
            .profile(
                "default",
                [
                    ("aws_access_key_id", "PROFILE_AK"),
                    ("aws_secret_access_key", "PROFILE_SK"),
                ],
            )
            .build();
        let resolver = ResolverBuilder::new(config, Arc::new(NoSts))
            .env(Env::from_slice(&[
                ("AWS_ACCESS_KEY_ID", "ENV_AK"),
                ("AWS_SECRET_ACCESS_KEY", "ENV_SK"),
            ]))
            .build()
            .unwrap();

        let credentials = resolver.load_credentials().await.unwrap().unwrap();
        let frozen = credentials.get_frozen_credentials().await.unwrap();
        assert_eq!(frozen.access_key_id(), "ENV_AK");
    }
}
