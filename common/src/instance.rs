use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type InstanceId = u64;

/// Type reference of an instance, drives which clients can be built for it
#[derive(Serialize, Deserialize, Eq, PartialEq, Hash, Clone, Copy, Debug, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Kubernetes,
    Elasticsearch,
    /// Any type this console has no client for
    #[serde(other)]
    Other,
}
impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::Kubernetes => "kubernetes",
            BackendKind::Elasticsearch => "elasticsearch",
            BackendKind::Other => "other",
        })
    }
}

impl BackendKind {
    /// Whether an `AuthType::None` credential still produces a client
    pub fn accepts_anonymous(&self) -> bool {
        matches!(self, BackendKind::Elasticsearch)
    }
}

#[derive(Serialize, Deserialize, Eq, PartialEq, Clone, Copy, Debug, Default)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    #[default]
    Active,
    Inactive,
    Error,
}

/// A remote cluster or endpoint registered by an operator
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    #[serde(default)]
    pub id: InstanceId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: BackendKind,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub status: InstanceStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}
impl Instance {
    #[must_use]
    pub fn new(id: InstanceId, name: &str, kind: BackendKind, address: &str) -> Instance {
        Instance {
            id,
            name: name.to_string(),
            kind,
            address: address.to_string(),
            status: InstanceStatus::Active,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == InstanceStatus::Active
    }

    /// Whether these rows call for a registered client bundle
    pub fn wants_clients(&self, auth: &AuthConfig) -> bool {
        self.is_active()
            && self.kind != BackendKind::Other
            && (auth.auth_type != AuthType::None || self.kind.accepts_anonymous())
    }
}

#[derive(Serialize, Deserialize, Eq, PartialEq, Clone, Copy, Debug, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    Kubeconfig,
    Basic,
    ApiKey,
    Token,
    Certificate,
    AwsIam,
    #[default]
    None,
}
impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuthType::Kubeconfig => "kubeconfig",
            AuthType::Basic => "basic",
            AuthType::ApiKey => "api_key",
            AuthType::Token => "token",
            AuthType::Certificate => "certificate",
            AuthType::AwsIam => "aws_iam",
            AuthType::None => "none",
        })
    }
}

/// Stored credential of one instance, `config_value` is opaque until decoded
#[derive(Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    #[serde(default)]
    pub instance_id: InstanceId,
    pub auth_type: AuthType,
    #[serde(default)]
    pub config_value: String,
}
impl AuthConfig {
    #[must_use]
    pub fn new(instance_id: InstanceId, auth_type: AuthType, config_value: &str) -> AuthConfig {
        AuthConfig {
            instance_id,
            auth_type,
            config_value: config_value.to_string(),
        }
    }
}
// config_value holds secrets, keep it out of logs
impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("instance_id", &self.instance_id)
            .field("auth_type", &self.auth_type)
            .field("config_value", &"<redacted>")
            .finish()
    }
}
