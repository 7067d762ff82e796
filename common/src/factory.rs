use crate::{BackendKind, InstanceId, KubeClients, Result, SearchClient, credentials::ConnectionParams};
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};

/// Live clients of one instance, swapped in the registry as a whole
#[derive(Clone, Debug)]
pub enum ClientBundle {
    Kubernetes(Arc<KubeClients>),
    Elasticsearch(Arc<SearchClient>),
}

impl ClientBundle {
    pub fn kind(&self) -> BackendKind {
        match self {
            ClientBundle::Kubernetes(_) => BackendKind::Kubernetes,
            ClientBundle::Elasticsearch(_) => BackendKind::Elasticsearch,
        }
    }

    pub fn kubernetes(&self) -> Option<&Arc<KubeClients>> {
        match self {
            ClientBundle::Kubernetes(k) => Some(k),
            _ => None,
        }
    }

    pub fn elasticsearch(&self) -> Option<&Arc<SearchClient>> {
        match self {
            ClientBundle::Elasticsearch(s) => Some(s),
            _ => None,
        }
    }

    /// Whether both handles point at the very same built clients
    pub fn same(&self, other: &ClientBundle) -> bool {
        match (self, other) {
            (ClientBundle::Kubernetes(a), ClientBundle::Kubernetes(b)) => Arc::ptr_eq(a, b),
            (ClientBundle::Elasticsearch(a), ClientBundle::Elasticsearch(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BuildOptions {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Upper bound of any network probe made while building
    pub probe_timeout: Duration,
}
impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(3),
        }
    }
}

/// Turns decoded connection parameters into live clients
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn build(&self, id: InstanceId, params: ConnectionParams) -> Result<ClientBundle>;
}

/// Factory backed by the kube and reqwest clients
#[derive(Clone, Debug, Default)]
pub struct SdkClientFactory {
    pub options: BuildOptions,
}

impl SdkClientFactory {
    #[must_use]
    pub fn new(options: BuildOptions) -> SdkClientFactory {
        SdkClientFactory { options }
    }
}

#[async_trait]
impl ClientFactory for SdkClientFactory {
    async fn build(&self, id: InstanceId, params: ConnectionParams) -> Result<ClientBundle> {
        tracing::debug!("building {} clients for instance {id}", params.kind());
        match params {
            ConnectionParams::Kubernetes { kubeconfig } => Ok(ClientBundle::Kubernetes(Arc::new(
                KubeClients::build(kubeconfig, &self.options).await?,
            ))),
            ConnectionParams::Elasticsearch { url, auth } => Ok(ClientBundle::Elasticsearch(Arc::new(
                SearchClient::build(url, &auth, &self.options)?,
            ))),
        }
    }
}
