//! Immutable configuration inputs.
//!
//! File parsing is an external concern: the snapshot is handed in already
//! parsed, as nested maps of profile name to settings. No ambient global
//! state is consulted anywhere in the crate - providers see exactly what
//! the snapshot and the captured [`Env`] contain.

use std::collections::HashMap;

/// Settings of a single profile, keyed by setting name
/// (`role_arn`, `aws_access_key_id`, `credential_process`, ...).
pub type Profile = HashMap<String, String>;

/// An immutable snapshot of the layered configuration.
#[derive(Clone, Debug)]
pub struct ConfigSnapshot {
    profiles: HashMap<String, Profile>,
    credentials_profiles: HashMap<String, Profile>,
    profile_name: String,
    profile_is_explicit: bool,
    ec2_credential_file: Profile,
    boto_config: HashMap<String, Profile>,
}

impl ConfigSnapshot {
    pub fn builder() -> ConfigSnapshotBuilder {
        ConfigSnapshotBuilder::default()
    }

    /// Profile settings from the shared config file.
    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    /// Profile settings from the shared credentials file.
    pub fn credentials_profile(&self, name: &str) -> Option<&Profile> {
        self.credentials_profiles.get(name)
    }

    /// The active profile name.
    pub fn profile_name(&self) -> &str {
        &self.profile_name
    }

    /// Whether the active profile was selected explicitly by the caller
    /// rather than through the ambient environment.
    pub fn profile_is_explicit(&self) -> bool {
        self.profile_is_explicit
    }

    /// Pre-parsed contents of the legacy EC2 credential file, if any.
    pub fn ec2_credential_file(&self) -> &Profile {
        &self.ec2_credential_file
    }

    /// A section of the legacy boto config, if present.
    pub fn boto_config_section(&self, name: &str) -> Option<&Profile> {
        self.boto_config.get(name)
    }
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`ConfigSnapshot`].
#[derive(Debug, Default)]
pub struct ConfigSnapshotBuilder {
    profiles: HashMap<String, Profile>,
    credentials_profiles: HashMap<String, Profile>,
    profile_name: Option<String>,
    profile_is_explicit: bool,
    ec2_credential_file: Profile,
    boto_config: HashMap<String, Profile>,
}

impl ConfigSnapshotBuilder {
    /// Add a profile from the shared config file.
    pub fn profile<I, K, V>(mut self, name: impl Into<String>, settings: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.profiles.insert(name.into(), collect(settings));
        self
    }

    /// Add a profile from the shared credentials file.
    pub fn credentials_profile<I, K, V>(mut self, name: impl Into<String>, settings: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.credentials_profiles.insert(name.into(), collect(settings));
        self
    }

    /// Select the active profile explicitly. Explicit selection removes the
    /// environment-variable provider from the default chain.
    pub fn active_profile(mut self, name: impl Into<String>) -> Self {
        self.profile_name = Some(name.into());
        self.profile_is_explicit = true;
        self
    }

    /// Record a profile name that came from the ambient environment
    /// (`AWS_PROFILE`); environment credentials keep their priority.
    pub fn active_profile_from_env(mut self, name: impl Into<String>) -> Self {
        self.profile_name = Some(name.into());
        self.profile_is_explicit = false;
        self
    }

    /// Pre-parsed legacy EC2 credential file contents.
    pub fn ec2_credential_file<I, K, V>(mut self, settings: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.ec2_credential_file = collect(settings);
        self
    }

    /// Pre-parsed legacy boto config section.
    pub fn boto_config_section<I, K, V>(mut self, name: impl Into<String>, settings: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.boto_config.insert(name.into(), collect(settings));
        self
    }

    pub fn build(self) -> ConfigSnapshot {
        ConfigSnapshot {
            profiles: self.profiles,
            credentials_profiles: self.credentials_profiles,
            profile_name: self.profile_name.unwrap_or_else(|| "default".to_string()),
            profile_is_explicit: self.profile_is_explicit,
            ec2_credential_file: self.ec2_credential_file,
            boto_config: self.boto_config,
        }
    }
}

fn collect<I, K, V>(settings: I) -> Profile
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    settings
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// A captured snapshot of environment variables.
#[derive(Clone, Debug, Default)]
pub struct Env {
    vars: HashMap<String, String>,
}

impl Env {
    /// Capture the current process environment.
    pub fn capture() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Build an environment from key/value pairs; primarily for tests.
    pub fn from_slice(vars: &[(&str, &str)]) -> Self {
        Self {
            vars: vars
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = ConfigSnapshot::default();
        assert_eq!(config.profile_name(), "default");
        assert!(!config.profile_is_explicit());
        assert!(config.profile("default").is_none());
    }

    #[test]
    fn test_explicit_profile_selection() {
        let config = ConfigSnapshot::builder()
            .profile("dev", [("aws_access_key_id", "AKID")])
            .active_profile("dev")
            .build();
        assert_eq!(config.profile_name(), "dev");
        assert!(config.profile_is_explicit());
        assert_eq!(
            config.profile("dev").unwrap().get("aws_access_key_id"),
            Some(&"AKID".to_string())
        );
    }

    #[test]
    fn test_env_lookup() {
        let env = Env::from_slice(&[("AWS_ACCESS_KEY_ID", "AKID")]);
        assert_eq!(env.get("AWS_ACCESS_KEY_ID"), Some("AKID"));
        assert_eq!(env.get("AWS_SECRET_ACCESS_KEY"), None);
    }
}
