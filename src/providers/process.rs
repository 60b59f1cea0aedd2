//! External credential process provider.
//!
//! A profile may name a helper program through `credential_process`. The
//! program must exit zero and print a JSON object with `Version: 1`,
//! `AccessKeyId` and `SecretAccessKey`, plus optional `SessionToken` and
//! `Expiration`. When an expiration is present the credentials refresh by
//! re-running the program.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::process::Command;

use crate::config::ConfigSnapshot;
use crate::credentials::{CredentialMetadata, Credentials, StaticCredentials};
use crate::provider::{ProvideCredentials, ProviderKind};
use crate::refresh::{FetchCredentials, RefreshableCredentials};
use crate::time::TimeSource;
use crate::{Error, Result};

const KEY_CREDENTIAL_PROCESS: &str = "credential_process";
const SUPPORTED_VERSION: i64 = 1;

/// Captured output of a finished credential process.
#[derive(Clone, Debug)]
pub struct ProcessOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Spawns the credential helper program and captures its output.
///
/// The mechanics live behind this seam so tests (and embedders with their
/// own process management) can swap them out.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str) -> Result<ProcessOutput>;
}

/// Runs the command line through `sh -c`, giving it full shell word
/// splitting and quoting semantics.
#[derive(Clone, Copy, Debug, Default)]
pub struct ShellCommandRunner;

#[async_trait]
impl CommandRunner for ShellCommandRunner {
    async fn run(&self, command: &str) -> Result<ProcessOutput> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;
        Ok(ProcessOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

fn parse_process_output(output: &ProcessOutput) -> Result<CredentialMetadata> {
    let method = ProviderKind::Process.method();
    if !output.success {
        return Err(Error::retrieval(method, output.stderr.trim()));
    }

    let parsed: serde_json::Value = serde_json::from_str(&output.stdout)
        .map_err(|err| Error::retrieval(method, format!("invalid JSON from credential process: {err}")))?;

    let version = parsed.get("Version").and_then(serde_json::Value::as_i64);
    if version != Some(SUPPORTED_VERSION) {
        let reported = parsed
            .get("Version")
            .map(|v| v.to_string())
            .unwrap_or_else(|| "<Version key not provided>".to_string());
        return Err(Error::retrieval(
            method,
            format!(
                "unsupported version '{reported}' for credential process provider, supported versions: {SUPPORTED_VERSION}"
            ),
        ));
    }

    let required = |key: &str| -> Result<String> {
        parsed
            .get(key)
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::retrieval(method, format!("missing required key in response: {key}")))
    };

    let expiration = parsed
        .get("Expiration")
        .and_then(serde_json::Value::as_str)
        .map(|raw| -> Result<DateTime<Utc>> {
            DateTime::parse_from_rfc3339(raw)
                .map(|parsed| parsed.with_timezone(&Utc))
                .map_err(|err| Error::retrieval(method, format!("invalid Expiration in response: {err}")))
        })
        .transpose()?;

    Ok(CredentialMetadata {
        access_key_id: required("AccessKeyId")?,
        secret_access_key: required("SecretAccessKey")?,
        session_token: parsed
            .get("SessionToken")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string),
        expiration,
    })
}

struct ProcessRefresher {
    runner: Arc<dyn CommandRunner>,
    command: String,
}

#[async_trait]
impl FetchCredentials for ProcessRefresher {
    async fn fetch_credentials(&self) -> Result<CredentialMetadata> {
        let output = self.runner.run(&self.command).await?;
        parse_process_output(&output)
    }
}

/// Provider for profiles configured with `credential_process`.
pub struct ProcessProvider {
    config: Arc<ConfigSnapshot>,
    profile_name: String,
    runner: Arc<dyn CommandRunner>,
    time_source: TimeSource,
}

impl ProcessProvider {
    pub fn new(
        config: Arc<ConfigSnapshot>,
        profile_name: impl Into<String>,
        runner: Arc<dyn CommandRunner>,
        time_source: TimeSource,
    ) -> Self {
        Self {
            config,
            profile_name: profile_name.into(),
            runner,
            time_source,
        }
    }
}

#[async_trait]
impl ProvideCredentials for ProcessProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Process
    }

    async fn load(&self) -> Result<Option<Credentials>> {
        let Some(command) = self
            .config
            .profile(&self.profile_name)
            .and_then(|profile| profile.get(KEY_CREDENTIAL_PROCESS))
        else {
            return Ok(None);
        };

        let refresher = ProcessRefresher {
            runner: self.runner.clone(),
            command: command.clone(),
        };
        let metadata = refresher.fetch_credentials().await?;

        if metadata.expiration.is_some() {
            let credentials = RefreshableCredentials::new(
                metadata,
                Arc::new(refresher),
                self.kind(),
                self.time_source.clone(),
            )?;
            return Ok(Some(Credentials::Refreshable(Arc::new(credentials))));
        }

        Ok(Some(Credentials::Static(StaticCredentials::new(
            metadata.access_key_id,
            metadata.secret_access_key,
            metadata.session_token,
            self.kind(),
        ))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubRunner {
        output: ProcessOutput,
    }

    #[async_trait]
    impl CommandRunner for StubRunner {
        async fn run(&self, _command: &str) -> Result<ProcessOutput> {
            Ok(self.output.clone())
        }
    }

    fn provider(output: ProcessOutput) -> ProcessProvider {
        let config = Arc::new(
            ConfigSnapshot::builder()
                .profile("default", [(KEY_CREDENTIAL_PROCESS, "get-creds")])
                .active_profile_from_env("default")
                .build(),
        );
        ProcessProvider::new(
            config,
            "default",
            Arc::new(StubRunner { output }),
            TimeSource::system(),
        )
    }

    fn success(stdout: &str) -> ProcessOutput {
        ProcessOutput {
            success: true,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    #[tokio::test]
    async fn test_not_applicable_without_credential_process() {
        let provider = ProcessProvider::new(
            Arc::new(ConfigSnapshot::default()),
            "default",
            Arc::new(ShellCommandRunner),
            TimeSource::system(),
        );
        assert!(provider.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_static_credentials_without_expiration() {
        let provider = provider(success(
            r#"{"Version": 1, "AccessKeyId": "AK", "SecretAccessKey": "SK"}"#,
        ));
        let credentials = provider.load().await.unwrap().unwrap();
        assert!(matches!(credentials, Credentials::Static(_)));
        let frozen = credentials.get_frozen_credentials().await.unwrap();
        assert_eq!(frozen.access_key_id(), "AK");
    }

    #[tokio::test]
    async fn test_expiration_yields_refreshable_credentials() {
        let provider = provider(success(
            r#"{"Version": 1, "AccessKeyId": "AK", "SecretAccessKey": "SK",
                "SessionToken": "TK", "Expiration": "2099-01-01T00:00:00Z"}"#,
        ));
        let credentials = provider.load().await.unwrap().unwrap();
        assert!(matches!(credentials, Credentials::Refreshable(_)));
        let frozen = credentials.get_frozen_credentials().await.unwrap();
        assert_eq!(frozen.access_key_id(), "AK");
        assert_eq!(frozen.session_token(), Some("TK"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_a_retrieval_error() {
        let provider = provider(ProcessOutput {
            success: false,
            stdout: String::new(),
            stderr: "token expired\n".to_string(),
        });
        let err = provider.load().await.unwrap_err();
        assert!(matches!(err, Error::CredentialRetrieval { .. }));
        assert!(err.to_string().contains("token expired"));
    }

    #[tokio::test]
    async fn test_unsupported_version_is_a_retrieval_error() {
        let provider = provider(success(
            r#"{"Version": 2, "AccessKeyId": "AK", "SecretAccessKey": "SK"}"#,
        ));
        let err = provider.load().await.unwrap_err();
        assert!(err.to_string().contains("supported versions: 1"));
    }

    #[tokio::test]
    async fn test_missing_required_key_is_a_retrieval_error() {
        let provider = provider(success(r#"{"Version": 1, "AccessKeyId": "AK"}"#));
        let err = provider.load().await.unwrap_err();
        assert!(err.to_string().contains("SecretAccessKey"));
    }

    #[tokio::test]
    async fn test_shell_runner_captures_output() {
        let runner = ShellCommandRunner;
        let output = runner.run("echo '{\"ok\": true}'").await.unwrap();
        assert!(output.success);
        assert_eq!(output.stdout.trim(), "{\"ok\": true}");

        let output = runner.run("echo oops >&2; exit 3").await.unwrap();
        assert!(!output.success);
        assert_eq!(output.stderr.trim(), "oops");
    }
}
