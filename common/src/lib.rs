use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid credential: {0}")]
    DecodeError(String),

    #[error("Invalid kubeconfig: {0}")]
    KubeconfigError(#[source] kube::config::KubeconfigError),

    #[error("No auth config stored for instance {0}")]
    MissingAuthConfig(InstanceId),

    #[error("Auth type `{0}` is not supported for {1} instances")]
    UnsupportedAuthType(AuthType, BackendKind),

    #[error("Instance type `{0}` cannot produce a client")]
    UnsupportedBackend(BackendKind),

    #[error("REST config error: {0}")]
    RestConfigError(#[source] kube::config::KubeconfigError),

    #[error("Client build error: {0}")]
    BuildError(#[source] kube::Error),

    #[error("Search client build error: {0}")]
    SearchBuildError(#[source] reqwest::Error),

    #[error("Client build for instance {0} timed out")]
    BuildTimeout(InstanceId),

    #[error("{1} client for instance {0} not initialized")]
    NotInitialized(InstanceId, BackendKind),

    #[error("Instance {0} not found")]
    InstanceNotFound(InstanceId),

    #[error("K8s error: {0}")]
    KubeError(#[source] kube::Error),

    #[error("Unknown resource kind: {0}")]
    UnknownResource(String),

    #[error("Reqwest error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("{0} query failed: {1}: {2}")]
    MethodFailed(String, u16, String),

    #[error("Raw HTTP request error: {0}")]
    RawHTTP(#[from] http::Error),

    #[error("SerializationError: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("YamlError: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Elapsed wait error: {0}")]
    Elapsed(#[from] tokio::time::error::Elapsed),

    #[error("Stdio error {0}")]
    Stdio(#[from] std::io::Error),

    #[error("Base64 decode error {0}")]
    Base64DecodeError(#[from] base64::DecodeError),

    #[error("Error: {0}")]
    Other(String),
}
impl Error {
    pub fn metric_label(&self) -> String {
        let label = format!("{self:?}");
        label
            .split(['(', ' ', '{'])
            .next()
            .unwrap_or_default()
            .to_lowercase()
    }

    /// Errors the operator can fix by editing the stored credential
    pub fn is_credential_error(&self) -> bool {
        matches!(
            self,
            Error::DecodeError(_)
                | Error::KubeconfigError(_)
                | Error::MissingAuthConfig(_)
                | Error::UnsupportedAuthType(_, _)
                | Error::UnsupportedBackend(_)
        )
    }

    /// Errors raised while turning valid parameters into live clients
    pub fn is_build_error(&self) -> bool {
        matches!(
            self,
            Error::RestConfigError(_)
                | Error::BuildError(_)
                | Error::SearchBuildError(_)
                | Error::BuildTimeout(_)
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub mod credentials;
pub mod factory;
pub mod helm;
pub mod instance;
pub mod kubeclient;
pub mod metrics;
pub mod registry;
pub mod searchclient;
pub mod store;
mod tools;

pub use credentials::{decode, ConnectionParams, SearchAuth};
pub use factory::{ClientBundle, ClientFactory, SdkClientFactory};
pub use instance::{AuthConfig, AuthType, BackendKind, Instance, InstanceId, InstanceStatus};
pub use kubeclient::KubeClients;
pub use registry::{ClientRegistry, InitReport, RegistryConfig};
pub use searchclient::SearchClient;
pub use store::{InstanceStore, MemoryStore};

#[cfg(test)]
pub(crate) mod testdata {
    /// A kubeconfig that builds offline: token auth, TLS verification off,
    /// server on a port nothing listens on.
    pub fn kubeconfig(server: &str) -> String {
        format!(
            r#"apiVersion: v1
kind: Config
clusters:
- name: test
  cluster:
    server: {server}
    insecure-skip-tls-verify: true
users:
- name: admin
  user:
    token: secret-token
contexts:
- name: test
  context:
    cluster: test
    user: admin
    namespace: default
current-context: test
"#
        )
    }

    pub const SERVER_A: &str = "https://127.0.0.1:1";
    pub const SERVER_B: &str = "https://127.0.0.2:1";
}
