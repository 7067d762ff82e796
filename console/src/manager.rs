use crate::{Error, Result};
use chrono::{DateTime, Utc};
use common::{AuthConfig, ClientRegistry, InitReport, Instance, InstanceId, InstanceStore, RegistryConfig};
use prometheus_client::{encoding::text::encode, registry::Registry};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapFailure {
    pub instance: InstanceId,
    pub error: String,
}

/// Diagnostics to be exposed by the web server
#[derive(Clone, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub last_event: DateTime<Utc>,
    pub bootstrapped_at: Option<DateTime<Utc>>,
    pub bootstrap_ready: Vec<InstanceId>,
    pub bootstrap_failures: Vec<BootstrapFailure>,
    pub registered: usize,
}
impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            last_event: Utc::now(),
            bootstrapped_at: None,
            bootstrap_ready: Vec::new(),
            bootstrap_failures: Vec::new(),
            registered: 0,
        }
    }
}

/// Data owned by the Manager
#[derive(Clone)]
pub struct Manager {
    pub store: Arc<dyn InstanceStore>,
    pub registry: Arc<ClientRegistry>,
    /// Diagnostics populated by the admin handlers
    diagnostics: Arc<RwLock<Diagnostics>>,
    /// Prometheus metrics
    metrics: Arc<Registry>,
}

impl Manager {
    /// Lifecycle initialization interface for app
    ///
    /// Builds the client registry and bootstraps it from every active
    /// instance in `store`. Instances failing to initialize are reported in
    /// the diagnostics, only an unreadable store fails the start.
    pub async fn new(store: Arc<dyn InstanceStore>, config: RegistryConfig) -> Result<Self> {
        let registry = Arc::new(ClientRegistry::with_defaults(config));
        let mut metrics = Registry::default();
        registry.metrics().clone().register(&mut metrics);
        let manager = Manager {
            store,
            registry,
            diagnostics: Arc::new(RwLock::new(Diagnostics::default())),
            metrics: Arc::new(metrics),
        };
        let report = manager.registry.init_all(manager.store.as_ref()).await?;
        manager.record_bootstrap(&report).await;
        Ok(manager)
    }

    async fn record_bootstrap(&self, report: &InitReport) {
        let mut diag = self.diagnostics.write().await;
        diag.bootstrapped_at = Some(Utc::now());
        diag.bootstrap_ready = report.ready.clone();
        diag.bootstrap_failures = report
            .failures
            .iter()
            .map(|(instance, e)| BootstrapFailure {
                instance: *instance,
                error: e.to_string(),
            })
            .collect();
    }

    /// Bring the registry in line with the rows of one instance
    ///
    /// Rows that call for clients get a freshly built bundle, any other
    /// state removes it. A failed build keeps the previous bundle and is
    /// returned so the admin action can be refused. An instance deleted
    /// while its bundle was building is unregistered again.
    pub async fn sync_instance(&self, instance: &Instance, auth: Option<&AuthConfig>) -> Result<()> {
        self.diagnostics.write().await.last_event = Utc::now();
        match auth {
            Some(auth) if instance.wants_clients(auth) => {
                self.registry.add(instance, auth).await?;
                if self.store.get_instance(instance.id).await?.is_none() {
                    tracing::warn!("instance {} deleted during client build", instance.id);
                    self.registry.remove(instance.id).await;
                    return Err(Error::NotFound(instance.id));
                }
            }
            _ => {
                self.registry.remove(instance.id).await;
            }
        }
        Ok(())
    }

    /// Metrics getter
    pub fn metrics(&self) -> Result<String> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.metrics)?;
        Ok(buffer)
    }

    /// State getter
    pub async fn diagnostics(&self) -> Diagnostics {
        let mut diag = self.diagnostics.read().await.clone();
        diag.registered = self.registry.len().await;
        diag
    }

    /// Teardown, drops every client
    pub async fn shutdown(&self) {
        self.registry.clear().await;
    }
}
