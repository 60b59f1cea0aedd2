//! Black-box interface to the identity API's role-assumption calls.
//!
//! The engine never speaks the wire protocol itself; callers hand in an
//! implementation of [`StsClient`] (an SDK client, a test double, ...) and
//! the fetchers treat it as an opaque function returning key material.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::credentials::FrozenCredentials;
use crate::Result;

/// Arguments for a role-assumption call. Optional fields are only sent when
/// the role configuration supplies them.
#[derive(Clone, Debug, Default)]
pub struct AssumeRoleRequest {
    pub role_arn: String,
    pub role_session_name: Option<String>,
    pub external_id: Option<String>,
    pub serial_number: Option<String>,
    pub duration_seconds: Option<i64>,
}

impl AssumeRoleRequest {
    pub fn new(role_arn: impl Into<String>) -> Self {
        Self {
            role_arn: role_arn.into(),
            ..Self::default()
        }
    }
}

/// Temporary credentials returned by a role-assumption call.
#[derive(Clone)]
pub struct StsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: DateTime<Utc>,
}

impl fmt::Debug for StsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[redacted]")
            .field("session_token", &"[redacted]")
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// The two role-assumption entry points of the identity API.
///
/// `assume_role` signs the call with the resolved source credentials;
/// `assume_role_with_web_identity` takes no credentials because that
/// exchange is unsigned - the bearer token is the proof of identity.
#[async_trait]
pub trait StsClient: Send + Sync {
    async fn assume_role(
        &self,
        source_credentials: &FrozenCredentials,
        request: &AssumeRoleRequest,
    ) -> Result<StsCredentials>;

    async fn assume_role_with_web_identity(
        &self,
        request: &AssumeRoleRequest,
        web_identity_token: &str,
    ) -> Result<StsCredentials>;
}
