//! The credential providers that make up the default chain.

mod assume_role;
mod container;
mod env;
mod imds;
mod legacy;
mod process;
mod profile;
mod web_identity;

pub use assume_role::AssumeRoleProvider;
pub use container::ContainerProvider;
pub use env::EnvironmentProvider;
pub use imds::InstanceMetadataProvider;
pub use legacy::{BotoConfigProvider, Ec2CredentialsFileProvider};
pub use process::{CommandRunner, ProcessOutput, ProcessProvider, ShellCommandRunner};
pub use profile::{SharedConfigProvider, SharedCredentialsProvider};
pub use web_identity::AssumeRoleWithWebIdentityProvider;
