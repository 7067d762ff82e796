//! Turns a stored [`AuthConfig`] into backend specific connection parameters.
//!
//! Decoding never touches the network or any shared state, so it is safe to
//! run concurrently and repeatedly for the same instance.
use crate::{AuthConfig, AuthType, BackendKind, Error, Instance, Result};
use kube::config::Kubeconfig;
use serde::Deserialize;
use serde_json::{Value, json};
use std::fmt;
use url::Url;

/// Field holding the kubeconfig text when the credential is a JSON envelope
pub const KUBECONFIG_ENVELOPE_FIELD: &str = "kubeconfigContent";

#[derive(Clone, Debug)]
pub enum ConnectionParams {
    Kubernetes { kubeconfig: Kubeconfig },
    Elasticsearch { url: Url, auth: SearchAuth },
}
impl ConnectionParams {
    pub fn kind(&self) -> BackendKind {
        match self {
            ConnectionParams::Kubernetes { .. } => BackendKind::Kubernetes,
            ConnectionParams::Elasticsearch { .. } => BackendKind::Elasticsearch,
        }
    }
}

#[derive(Clone, PartialEq)]
pub enum SearchAuth {
    None,
    Basic { username: String, password: String },
    ApiKey(String),
    Bearer(String),
}
impl fmt::Debug for SearchAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchAuth::None => f.write_str("None"),
            SearchAuth::Basic { username, .. } => write!(f, "Basic({username}:<redacted>)"),
            SearchAuth::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
            SearchAuth::Bearer(_) => f.write_str("Bearer(<redacted>)"),
        }
    }
}

/// Decode the credential of `instance` for the backend its type refers to
pub fn decode(instance: &Instance, auth: &AuthConfig) -> Result<ConnectionParams> {
    if auth.instance_id != instance.id {
        return Err(Error::DecodeError(format!(
            "auth config belongs to instance {}, not {}",
            auth.instance_id, instance.id
        )));
    }
    match instance.kind {
        BackendKind::Kubernetes => decode_kubernetes(instance, auth),
        BackendKind::Elasticsearch => decode_elasticsearch(instance, auth),
        BackendKind::Other => Err(Error::UnsupportedBackend(instance.kind)),
    }
}

fn decode_kubernetes(instance: &Instance, auth: &AuthConfig) -> Result<ConnectionParams> {
    let kubeconfig = match auth.auth_type {
        AuthType::Kubeconfig => parse_kubeconfig(&kubeconfig_text(&auth.config_value)?)?,
        AuthType::Token => token_kubeconfig(&instance.address, &auth.config_value)?,
        other => return Err(Error::UnsupportedAuthType(other, BackendKind::Kubernetes)),
    };
    Ok(ConnectionParams::Kubernetes { kubeconfig })
}

/// Extract kubeconfig text, either verbatim or from a `{"kubeconfigContent": ...}` envelope
pub fn kubeconfig_text(config_value: &str) -> Result<String> {
    let text = if config_value.trim_start().starts_with('{') {
        let envelope: Value = serde_json::from_str(config_value)
            .map_err(|e| Error::DecodeError(format!("malformed credential envelope: {e}")))?;
        envelope
            .get(KUBECONFIG_ENVELOPE_FIELD)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::DecodeError(format!("credential envelope has no string `{KUBECONFIG_ENVELOPE_FIELD}`"))
            })?
            .to_string()
    } else {
        config_value.to_string()
    };
    if text.trim().is_empty() {
        return Err(Error::DecodeError("kubeconfig is empty".to_string()));
    }
    Ok(text)
}

/// Parse and structurally validate kubeconfig text
pub fn parse_kubeconfig(text: &str) -> Result<Kubeconfig> {
    let kubeconfig = Kubeconfig::from_yaml(text).map_err(Error::KubeconfigError)?;
    if !kubeconfig
        .clusters
        .iter()
        .any(|c| c.cluster.as_ref().and_then(|c| c.server.as_ref()).is_some())
    {
        return Err(Error::DecodeError("kubeconfig declares no cluster server".to_string()));
    }
    if kubeconfig.contexts.is_empty() {
        return Err(Error::DecodeError("kubeconfig declares no context".to_string()));
    }
    if let Some(current) = &kubeconfig.current_context {
        if !kubeconfig.contexts.iter().any(|c| &c.name == current) {
            return Err(Error::DecodeError(format!(
                "current-context `{current}` is not declared"
            )));
        }
    }
    Ok(kubeconfig)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenCredential {
    token: String,
    #[serde(default)]
    certificate_authority_data: Option<String>,
    #[serde(default)]
    insecure_skip_tls_verify: bool,
}

fn token_kubeconfig(address: &str, config_value: &str) -> Result<Kubeconfig> {
    let cred = if config_value.trim_start().starts_with('{') {
        serde_json::from_str::<TokenCredential>(config_value)
            .map_err(|e| Error::DecodeError(format!("malformed token credential: {e}")))?
    } else {
        TokenCredential {
            token: config_value.trim().to_string(),
            certificate_authority_data: None,
            insecure_skip_tls_verify: false,
        }
    };
    if cred.token.trim().is_empty() {
        return Err(Error::DecodeError("token is empty".to_string()));
    }
    if address.trim().is_empty() {
        return Err(Error::DecodeError("instance has no API server address".to_string()));
    }
    let mut cluster = json!({ "server": address.trim() });
    if let Some(ca) = cred.certificate_authority_data {
        cluster["certificate-authority-data"] = Value::String(ca);
    }
    if cred.insecure_skip_tls_verify {
        cluster["insecure-skip-tls-verify"] = Value::Bool(true);
    }
    let doc = json!({
        "apiVersion": "v1",
        "kind": "Config",
        "clusters": [{ "name": "instance", "cluster": cluster }],
        "users": [{ "name": "instance", "user": { "token": cred.token } }],
        "contexts": [{ "name": "instance", "context": { "cluster": "instance", "user": "instance" } }],
        "current-context": "instance",
    });
    // JSON is a YAML subset
    parse_kubeconfig(&serde_json::to_string(&doc)?)
}

#[derive(Deserialize)]
struct BasicCredential {
    username: String,
    password: String,
}

fn field_or_raw(config_value: &str, field: &str) -> Result<String> {
    let value = if config_value.trim_start().starts_with('{') {
        let v: Value = serde_json::from_str(config_value)
            .map_err(|e| Error::DecodeError(format!("malformed credential: {e}")))?;
        v.get(field)
            .and_then(Value::as_str)
            .ok_or_else(|| Error::DecodeError(format!("credential has no string `{field}`")))?
            .to_string()
    } else {
        config_value.trim().to_string()
    };
    if value.is_empty() {
        return Err(Error::DecodeError(format!("{field} is empty")));
    }
    Ok(value)
}

fn decode_elasticsearch(instance: &Instance, auth: &AuthConfig) -> Result<ConnectionParams> {
    let url = Url::parse(instance.address.trim())
        .map_err(|e| Error::DecodeError(format!("invalid address `{}`: {e}", instance.address)))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(Error::DecodeError(format!("unsupported scheme `{}`", url.scheme())));
    }
    let auth = match auth.auth_type {
        AuthType::None => SearchAuth::None,
        AuthType::Basic => {
            if auth.config_value.trim_start().starts_with('{') {
                let cred: BasicCredential = serde_json::from_str(&auth.config_value)
                    .map_err(|e| Error::DecodeError(format!("malformed basic credential: {e}")))?;
                SearchAuth::Basic {
                    username: cred.username,
                    password: cred.password,
                }
            } else {
                let (username, password) = auth
                    .config_value
                    .trim()
                    .split_once(':')
                    .ok_or_else(|| Error::DecodeError("basic credential is not `user:password`".to_string()))?;
                SearchAuth::Basic {
                    username: username.to_string(),
                    password: password.to_string(),
                }
            }
        }
        AuthType::ApiKey => SearchAuth::ApiKey(field_or_raw(&auth.config_value, "apiKey")?),
        AuthType::Token => SearchAuth::Bearer(field_or_raw(&auth.config_value, "token")?),
        other => return Err(Error::UnsupportedAuthType(other, BackendKind::Elasticsearch)),
    };
    if let SearchAuth::Basic { username, .. } = &auth {
        if username.is_empty() {
            return Err(Error::DecodeError("username is empty".to_string()));
        }
    }
    Ok(ConnectionParams::Elasticsearch { url, auth })
}
