use crate::{Error, Result, factory::BuildOptions, helm::HelmClient};
use k8s_openapi::{
    api::core::v1::Namespace,
    apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition,
    apimachinery::pkg::version::Info,
};
use kube::{
    Client, Config,
    api::{Api, DynamicObject, ListParams, ObjectList},
    config::{KubeConfigOptions, Kubeconfig},
    discovery::{ApiCapabilities, ApiResource, Discovery, Scope},
};
use std::{fmt, sync::Arc, time::Duration};
use tokio::sync::RwLock;

pub const METRICS_API: &str = "/apis/metrics.k8s.io/v1beta1";

/// Every client built for one Kubernetes instance
pub struct KubeClients {
    /// Transport configuration, needed again by exec/log streaming
    pub config: Config,
    /// Typed client
    pub client: Client,
    pub dynamic: DynamicClient,
    pub extensions: Api<CustomResourceDefinition>,
    /// None when the cluster runs no metrics-server
    pub metrics: Option<MetricsClient>,
    pub helm: HelmClient,
}

impl fmt::Debug for KubeClients {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeClients")
            .field("cluster_url", &self.config.cluster_url.to_string())
            .field("default_namespace", &self.config.default_namespace)
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

impl KubeClients {
    pub async fn build(kubeconfig: Kubeconfig, opts: &BuildOptions) -> Result<KubeClients> {
        let mut config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(Error::RestConfigError)?;
        config.connect_timeout = Some(opts.connect_timeout);
        config.read_timeout = Some(opts.read_timeout);
        let client = Client::try_from(config.clone()).map_err(Error::BuildError)?;
        let metrics = MetricsClient::probe(client.clone(), opts.probe_timeout).await;
        if metrics.is_none() {
            tracing::debug!("no metrics API on {}", config.cluster_url);
        }
        Ok(KubeClients {
            dynamic: DynamicClient::new(client.clone(), opts.probe_timeout),
            extensions: Api::all(client.clone()),
            helm: HelmClient::new(client.clone()),
            metrics,
            client,
            config,
        })
    }

    pub async fn version(&self) -> Result<Info> {
        self.client.apiserver_version().await.map_err(Error::KubeError)
    }

    pub async fn namespaces(&self) -> Result<Vec<String>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await.map_err(Error::KubeError)?;
        Ok(list.items.into_iter().filter_map(|ns| ns.metadata.name).collect())
    }

    pub async fn crds(&self) -> Result<Vec<String>> {
        let list = self
            .extensions
            .list(&ListParams::default())
            .await
            .map_err(Error::KubeError)?;
        Ok(list.items.into_iter().filter_map(|crd| crd.metadata.name).collect())
    }
}

/// Client for arbitrary kinds, resolved through a discovery cache
///
/// The cache is filled on first use rather than at build time so an
/// unreachable cluster does not slow down registration.
#[derive(Clone)]
pub struct DynamicClient {
    client: Client,
    cache: Arc<RwLock<Option<Arc<Discovery>>>>,
    timeout: Duration,
}

impl DynamicClient {
    #[must_use]
    pub fn new(client: Client, timeout: Duration) -> DynamicClient {
        DynamicClient {
            client,
            cache: Arc::new(RwLock::new(None)),
            timeout,
        }
    }

    pub async fn refresh(&self) -> Result<Arc<Discovery>> {
        let discovery = tokio::time::timeout(self.timeout, Discovery::new(self.client.clone()).run())
            .await?
            .map_err(Error::KubeError)?;
        let discovery = Arc::new(discovery);
        *self.cache.write().await = Some(discovery.clone());
        Ok(discovery)
    }

    async fn discovery(&self) -> Result<Arc<Discovery>> {
        if let Some(d) = self.cache.read().await.clone() {
            return Ok(d);
        }
        self.refresh().await
    }

    /// Find the api for a kind or plural name, case insensitive
    pub async fn api(&self, name: &str, ns: Option<&str>) -> Result<(Api<DynamicObject>, Scope)> {
        let discovery = self.discovery().await?;
        let (res, cap) = discovery
            .groups()
            .flat_map(|group| {
                group
                    .resources_by_stability()
                    .into_iter()
                    .map(move |res: (ApiResource, ApiCapabilities)| (group, res))
            })
            .filter(|(_, (res, _))| name.eq_ignore_ascii_case(&res.kind) || name.eq_ignore_ascii_case(&res.plural))
            .min_by_key(|(group, _res)| group.name())
            .map(|(_, res)| res)
            .ok_or_else(|| Error::UnknownResource(name.to_string()))?;
        let api = match ns {
            Some(namespace) if cap.scope == Scope::Namespaced => {
                Api::namespaced_with(self.client.clone(), namespace, &res)
            }
            _ => Api::all_with(self.client.clone(), &res),
        };
        Ok((api, cap.scope))
    }

    pub async fn list(&self, name: &str, ns: Option<&str>) -> Result<ObjectList<DynamicObject>> {
        let (api, _) = self.api(name, ns).await?;
        api.list(&ListParams::default()).await.map_err(Error::KubeError)
    }
}

/// Raw access to the metrics.k8s.io API
#[derive(Clone)]
pub struct MetricsClient {
    client: Client,
}

impl MetricsClient {
    /// Returns a client only when the metrics API answers within `timeout`
    pub async fn probe(client: Client, timeout: Duration) -> Option<MetricsClient> {
        let metrics = MetricsClient { client };
        match tokio::time::timeout(timeout, metrics.get_url(METRICS_API)).await {
            Ok(Ok(_)) => Some(metrics),
            Ok(Err(e)) => {
                tracing::debug!("metrics API probe failed: {e}");
                None
            }
            Err(_) => {
                tracing::debug!("metrics API probe timed out");
                None
            }
        }
    }

    async fn get_url(&self, url: &str) -> Result<serde_json::Value> {
        let req = http::Request::get(url)
            .body(Default::default())
            .map_err(Error::RawHTTP)?;
        self.client
            .request::<serde_json::Value>(req)
            .await
            .map_err(Error::KubeError)
    }

    pub async fn node_metrics(&self) -> Result<serde_json::Value> {
        self.get_url(&format!("{METRICS_API}/nodes")).await
    }

    pub async fn pod_metrics(&self, ns: Option<&str>) -> Result<serde_json::Value> {
        match ns {
            Some(ns) => self.get_url(&format!("{METRICS_API}/namespaces/{ns}/pods")).await,
            None => self.get_url(&format!("{METRICS_API}/pods")).await,
        }
    }
}
