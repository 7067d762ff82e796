//! Concurrency-safe map of instance id to live client bundle.
//!
//! Decoding and building happen outside the lock; writers only hold it for
//! the map insert or remove, readers only to clone the `Arc`s out. An entry
//! is always replaced as a whole, so a reader sees either the old bundle or
//! the new one.
//!
//! Entries never expire: a bundle stays until it is replaced or removed,
//! even if the remote side rotated or revoked the credential meanwhile.
//!
//! `add` does not know about deletions: an `add` still building when the
//! instance is removed inserts its bundle afterwards. Callers deleting an
//! instance drop its rows before calling `remove`, and callers of `add`
//! check the rows still exist once it returns.
use crate::{
    AuthConfig, BackendKind, Error, Instance, InstanceId, InstanceStatus, InstanceStore, KubeClients,
    Result, SearchClient,
    credentials::decode,
    factory::{BuildOptions, ClientBundle, ClientFactory, SdkClientFactory},
    metrics::RegistryMetrics,
};
use futures::{StreamExt, stream};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Clone, Debug)]
pub struct RegistryConfig {
    pub build: BuildOptions,
    /// Upper bound of a whole decode and build for one instance
    pub build_timeout: Duration,
    /// How many instances `init_all` builds at once
    pub init_concurrency: usize,
    /// Instance types registered by `init_all`
    pub bootstrap_kinds: Vec<BackendKind>,
}
impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            build: BuildOptions::default(),
            build_timeout: Duration::from_secs(20),
            init_concurrency: 8,
            bootstrap_kinds: vec![BackendKind::Kubernetes],
        }
    }
}

/// Outcome of a bootstrap
#[derive(Debug, Default)]
pub struct InitReport {
    pub ready: Vec<InstanceId>,
    pub failures: Vec<(InstanceId, Error)>,
}

pub struct ClientRegistry {
    entries: RwLock<HashMap<InstanceId, ClientBundle>>,
    factory: Arc<dyn ClientFactory>,
    config: RegistryConfig,
    metrics: RegistryMetrics,
}

impl ClientRegistry {
    #[must_use]
    pub fn new(factory: Arc<dyn ClientFactory>, config: RegistryConfig) -> ClientRegistry {
        ClientRegistry {
            entries: RwLock::new(HashMap::new()),
            factory,
            config,
            metrics: RegistryMetrics::default(),
        }
    }

    /// Registry building real SDK clients
    #[must_use]
    pub fn with_defaults(config: RegistryConfig) -> ClientRegistry {
        let factory = Arc::new(SdkClientFactory::new(config.build.clone()));
        Self::new(factory, config)
    }

    pub fn metrics(&self) -> &RegistryMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Register every active instance of the bootstrap kinds found in `store`
    ///
    /// A failing instance never aborts the batch, it is logged and reported.
    /// Only failing to enumerate the store is an error.
    pub async fn init_all(&self, store: &dyn InstanceStore) -> Result<InitReport> {
        let mut instances = Vec::new();
        for kind in &self.config.bootstrap_kinds {
            instances.extend(store.list_instances(Some(*kind), Some(InstanceStatus::Active)).await?);
        }
        info!("initializing clients for {} instances", instances.len());
        let results: Vec<(InstanceId, Result<ClientBundle>)> = stream::iter(instances)
            .map(|inst| async move {
                let res = self.bootstrap(store, &inst).await;
                (inst.id, res)
            })
            .buffer_unordered(self.config.init_concurrency.max(1))
            .collect()
            .await;
        let mut report = InitReport::default();
        for (id, res) in results {
            match res {
                Ok(_) => report.ready.push(id),
                Err(e) => {
                    warn!("instance {id}: client initialization failed: {e}");
                    report.failures.push((id, e));
                }
            }
        }
        report.ready.sort_unstable();
        report.failures.sort_by_key(|(id, _)| *id);
        info!(
            "client initialization done: {} ready, {} failed",
            report.ready.len(),
            report.failures.len()
        );
        Ok(report)
    }

    async fn bootstrap(&self, store: &dyn InstanceStore, instance: &Instance) -> Result<ClientBundle> {
        let auth = store
            .get_auth_config(instance.id)
            .await?
            .ok_or(Error::MissingAuthConfig(instance.id))?;
        self.add(instance, &auth).await
    }

    /// Build the clients of `instance` and register them, replacing any previous bundle
    ///
    /// On error the previous bundle, if any, is left in place.
    pub async fn add(&self, instance: &Instance, auth: &AuthConfig) -> Result<ClientBundle> {
        let bundle = match self.build(instance, auth).await {
            Ok(b) => b,
            Err(e) => {
                self.metrics.build_failure(instance.kind, &e);
                return Err(e);
            }
        };
        let (replaced, count) = {
            let mut entries = self.entries.write().await;
            let replaced = entries.insert(instance.id, bundle.clone()).is_some();
            (replaced, entries.len())
        };
        self.metrics.instances.set(count as i64);
        if replaced {
            info!("instance {}: {} clients replaced", instance.id, instance.kind);
        } else {
            info!("instance {}: {} clients registered", instance.id, instance.kind);
        }
        Ok(bundle)
    }

    async fn build(&self, instance: &Instance, auth: &AuthConfig) -> Result<ClientBundle> {
        let _mes = self.metrics.count_and_measure(instance.kind);
        let params = decode(instance, auth)?;
        tokio::time::timeout(self.config.build_timeout, self.factory.build(instance.id, params))
            .await
            .map_err(|_| Error::BuildTimeout(instance.id))?
    }

    /// Forget the clients of an instance, returns whether there were any
    pub async fn remove(&self, id: InstanceId) -> bool {
        let (removed, count) = {
            let mut entries = self.entries.write().await;
            let removed = entries.remove(&id).is_some();
            (removed, entries.len())
        };
        if removed {
            self.metrics.removals.inc();
            self.metrics.instances.set(count as i64);
            info!("instance {id}: clients removed");
        }
        removed
    }

    /// Lookup only, never builds
    pub async fn get(&self, id: InstanceId) -> Option<ClientBundle> {
        self.entries.read().await.get(&id).cloned()
    }

    pub async fn kubernetes(&self, id: InstanceId) -> Result<Arc<KubeClients>> {
        self.get(id)
            .await
            .and_then(|b| b.kubernetes().cloned())
            .ok_or(Error::NotInitialized(id, BackendKind::Kubernetes))
    }

    pub async fn elasticsearch(&self, id: InstanceId) -> Result<Arc<SearchClient>> {
        self.get(id)
            .await
            .and_then(|b| b.elasticsearch().cloned())
            .ok_or(Error::NotInitialized(id, BackendKind::Elasticsearch))
    }

    pub async fn contains(&self, id: InstanceId) -> bool {
        self.entries.read().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn instance_ids(&self) -> Vec<InstanceId> {
        let mut ids: Vec<InstanceId> = self.entries.read().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Teardown: drop every bundle
    pub async fn clear(&self) {
        let count = {
            let mut entries = self.entries.write().await;
            let count = entries.len();
            entries.clear();
            count
        };
        self.metrics.instances.set(0);
        info!("client registry cleared ({count} bundles dropped)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        AuthType, MemoryStore,
        credentials::ConnectionParams,
        testdata::{SERVER_A, SERVER_B, kubeconfig},
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Real SDK factory that counts builds
    struct CountingFactory {
        inner: SdkClientFactory,
        builds: AtomicUsize,
    }

    #[async_trait]
    impl ClientFactory for CountingFactory {
        async fn build(&self, id: InstanceId, params: ConnectionParams) -> Result<ClientBundle> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            self.inner.build(id, params).await
        }
    }

    /// Factory that never answers
    struct HangingFactory;

    #[async_trait]
    impl ClientFactory for HangingFactory {
        async fn build(&self, _id: InstanceId, _params: ConnectionParams) -> Result<ClientBundle> {
            futures::future::pending().await
        }
    }

    fn test_config() -> RegistryConfig {
        RegistryConfig {
            build: BuildOptions {
                connect_timeout: Duration::from_millis(200),
                read_timeout: Duration::from_millis(200),
                probe_timeout: Duration::from_millis(300),
            },
            build_timeout: Duration::from_secs(5),
            ..RegistryConfig::default()
        }
    }

    fn counting() -> (Arc<CountingFactory>, ClientRegistry) {
        let factory = Arc::new(CountingFactory {
            inner: SdkClientFactory::new(test_config().build),
            builds: AtomicUsize::new(0),
        });
        let registry = ClientRegistry::new(factory.clone(), test_config());
        (factory, registry)
    }

    fn kube(id: InstanceId) -> Instance {
        Instance::new(id, &format!("cluster-{id}"), BackendKind::Kubernetes, "")
    }

    fn kubeconfig_auth(id: InstanceId, server: &str) -> AuthConfig {
        AuthConfig::new(id, AuthType::Kubeconfig, &kubeconfig(server))
    }

    fn cluster_url(bundle: &ClientBundle) -> String {
        bundle.kubernetes().unwrap().config.cluster_url.to_string()
    }

    #[tokio::test]
    async fn test_get_absent_never_builds() {
        let (factory, registry) = counting();
        assert!(registry.get(42).await.is_none());
        assert!(matches!(
            registry.kubernetes(42).await,
            Err(Error::NotInitialized(42, BackendKind::Kubernetes))
        ));
        assert_eq!(factory.builds.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_add_then_get_returns_new_bundle() {
        let (_, registry) = counting();
        let added = registry.add(&kube(1), &kubeconfig_auth(1, SERVER_A)).await.unwrap();
        let got = registry.get(1).await.unwrap();
        assert!(got.same(&added));
        let rotated = registry.add(&kube(1), &kubeconfig_auth(1, SERVER_B)).await.unwrap();
        let got = registry.get(1).await.unwrap();
        assert!(got.same(&rotated));
        assert!(!got.same(&added));
        assert!(cluster_url(&got).starts_with(SERVER_B));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_failed_rotation_keeps_previous_bundle() {
        let (_, registry) = counting();
        let original = registry.add(&kube(1), &kubeconfig_auth(1, SERVER_A)).await.unwrap();
        let malformed = AuthConfig::new(1, AuthType::Kubeconfig, r#"{"kubeconfigContent": ""}"#);
        let err = registry.add(&kube(1), &malformed).await.unwrap_err();
        assert!(err.is_credential_error());
        let got = registry.get(1).await.unwrap();
        assert!(got.same(&original));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let (_, registry) = counting();
        assert!(!registry.remove(7).await);
        registry.add(&kube(7), &kubeconfig_auth(7, SERVER_A)).await.unwrap();
        assert!(registry.remove(7).await);
        assert!(!registry.remove(7).await);
        assert!(registry.get(7).await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_init_all_isolates_failures() {
        let store = MemoryStore::new();
        let good = store.create_instance(kube(0)).await.unwrap();
        let empty = store.create_instance(kube(0)).await.unwrap();
        let basic = store.create_instance(kube(0)).await.unwrap();
        let mut inactive = kube(0);
        inactive.status = InstanceStatus::Inactive;
        let inactive = store.create_instance(inactive).await.unwrap();
        let missing = store.create_instance(kube(0)).await.unwrap();
        let search = store
            .create_instance(Instance::new(0, "logs", BackendKind::Elasticsearch, "http://es:9200"))
            .await
            .unwrap();
        store.save_auth_config(kubeconfig_auth(good.id, SERVER_A)).await.unwrap();
        store
            .save_auth_config(AuthConfig::new(empty.id, AuthType::Kubeconfig, ""))
            .await
            .unwrap();
        store
            .save_auth_config(AuthConfig::new(basic.id, AuthType::Basic, "user:pass"))
            .await
            .unwrap();
        store.save_auth_config(kubeconfig_auth(inactive.id, SERVER_A)).await.unwrap();
        store
            .save_auth_config(AuthConfig::new(search.id, AuthType::None, ""))
            .await
            .unwrap();

        let (_, registry) = counting();
        let report = registry.init_all(&store).await.unwrap();
        assert_eq!(report.ready, vec![good.id]);
        let failed: Vec<InstanceId> = report.failures.iter().map(|(id, _)| *id).collect();
        assert_eq!(failed, vec![empty.id, basic.id, missing.id]);
        assert!(matches!(report.failures[0].1, Error::DecodeError(_)));
        assert!(matches!(report.failures[1].1, Error::UnsupportedAuthType(AuthType::Basic, _)));
        assert!(matches!(report.failures[2].1, Error::MissingAuthConfig(_)));
        assert_eq!(registry.instance_ids().await, vec![good.id]);
        assert!(registry.get(inactive.id).await.is_none());
        assert!(registry.get(search.id).await.is_none());
    }

    #[tokio::test]
    async fn test_init_all_with_search_kind() {
        let store = MemoryStore::new();
        let search = store
            .create_instance(Instance::new(0, "logs", BackendKind::Elasticsearch, "http://es:9200"))
            .await
            .unwrap();
        store
            .save_auth_config(AuthConfig::new(search.id, AuthType::ApiKey, "key"))
            .await
            .unwrap();
        let config = RegistryConfig {
            bootstrap_kinds: vec![BackendKind::Kubernetes, BackendKind::Elasticsearch],
            ..test_config()
        };
        let registry = ClientRegistry::with_defaults(config);
        let report = registry.init_all(&store).await.unwrap();
        assert_eq!(report.ready, vec![search.id]);
        assert!(registry.elasticsearch(search.id).await.is_ok());
        assert!(matches!(
            registry.kubernetes(search.id).await,
            Err(Error::NotInitialized(_, BackendKind::Kubernetes))
        ));
    }

    #[tokio::test]
    async fn test_build_timeout_leaves_instance_absent() {
        let config = RegistryConfig {
            build_timeout: Duration::from_millis(50),
            ..test_config()
        };
        let registry = ClientRegistry::new(Arc::new(HangingFactory), config);
        let err = registry.add(&kube(3), &kubeconfig_auth(3, SERVER_A)).await.unwrap_err();
        assert!(matches!(err, Error::BuildTimeout(3)));
        assert!(err.is_build_error());
        assert!(registry.get(3).await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reads_see_whole_bundles() {
        let (_, registry) = counting();
        let registry = Arc::new(registry);
        registry.add(&kube(1), &kubeconfig_auth(1, SERVER_A)).await.unwrap();
        let readers: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    for _ in 0..200 {
                        let bundle = registry.get(1).await.expect("instance stays registered");
                        let clients = bundle.kubernetes().unwrap();
                        let url = clients.config.cluster_url.to_string();
                        assert!(url.starts_with(SERVER_A) || url.starts_with(SERVER_B));
                        assert!(clients.metrics.is_none());
                        assert_eq!(clients.config.default_namespace, "default");
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();
        for i in 0..6 {
            let server = if i % 2 == 0 { SERVER_B } else { SERVER_A };
            registry.add(&kube(1), &kubeconfig_auth(1, server)).await.unwrap();
        }
        for r in readers {
            r.await.unwrap();
        }
        assert!(cluster_url(&registry.get(1).await.unwrap()).starts_with(SERVER_A));
    }

    #[tokio::test]
    async fn test_clear_drops_everything() {
        let (_, registry) = counting();
        registry.add(&kube(1), &kubeconfig_auth(1, SERVER_A)).await.unwrap();
        registry.add(&kube(2), &kubeconfig_auth(2, SERVER_B)).await.unwrap();
        assert_eq!(registry.instance_ids().await, vec![1, 2]);
        registry.clear().await;
        assert!(registry.is_empty().await);
    }
}
