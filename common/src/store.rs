use crate::{AuthConfig, BackendKind, Error, Instance, InstanceId, InstanceStatus, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path};
use tokio::sync::RwLock;

/// Read and write access to instance and auth-config rows
#[async_trait]
pub trait InstanceStore: Send + Sync {
    async fn list_instances(
        &self,
        kind: Option<BackendKind>,
        status: Option<InstanceStatus>,
    ) -> Result<Vec<Instance>>;
    async fn get_instance(&self, id: InstanceId) -> Result<Option<Instance>>;
    async fn get_auth_config(&self, id: InstanceId) -> Result<Option<AuthConfig>>;
    /// Stores a new instance and returns it with its assigned id
    async fn create_instance(&self, instance: Instance) -> Result<Instance>;
    async fn update_instance(&self, instance: Instance) -> Result<Instance>;
    async fn delete_instance(&self, id: InstanceId) -> Result<bool>;
    async fn save_auth_config(&self, auth: AuthConfig) -> Result<()>;
    async fn delete_auth_config(&self, id: InstanceId) -> Result<bool>;
}

/// Seed file layout
#[derive(Serialize, Deserialize, Default, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    #[serde(default)]
    pub instances: Vec<Instance>,
    #[serde(default)]
    pub auth_configs: Vec<AuthConfig>,
}

#[derive(Default)]
struct Tables {
    instances: BTreeMap<InstanceId, Instance>,
    auth_configs: BTreeMap<InstanceId, AuthConfig>,
    next_id: InstanceId,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> MemoryStore {
        Self::default()
    }

    pub fn from_inventory(inventory: Inventory) -> Result<MemoryStore> {
        let mut tables = Tables::default();
        for inst in inventory.instances {
            if inst.id == 0 {
                return Err(Error::Other(format!("instance `{}` has no id", inst.name)));
            }
            if tables.instances.insert(inst.id, inst.clone()).is_some() {
                return Err(Error::Other(format!("duplicated instance id {}", inst.id)));
            }
        }
        for auth in inventory.auth_configs {
            if !tables.instances.contains_key(&auth.instance_id) {
                return Err(Error::InstanceNotFound(auth.instance_id));
            }
            tables.auth_configs.insert(auth.instance_id, auth);
        }
        tables.next_id = tables.instances.keys().max().copied().unwrap_or(0) + 1;
        Ok(MemoryStore {
            tables: RwLock::new(tables),
        })
    }

    pub fn from_yaml(text: &str) -> Result<MemoryStore> {
        Self::from_inventory(serde_yaml::from_str(text)?)
    }

    pub async fn load(path: &Path) -> Result<MemoryStore> {
        let text = tokio::fs::read_to_string(path).await?;
        Self::from_yaml(&text)
    }
}

#[async_trait]
impl InstanceStore for MemoryStore {
    async fn list_instances(
        &self,
        kind: Option<BackendKind>,
        status: Option<InstanceStatus>,
    ) -> Result<Vec<Instance>> {
        Ok(self
            .tables
            .read()
            .await
            .instances
            .values()
            .filter(|i| kind.map_or(true, |k| i.kind == k))
            .filter(|i| status.map_or(true, |s| i.status == s))
            .cloned()
            .collect())
    }

    async fn get_instance(&self, id: InstanceId) -> Result<Option<Instance>> {
        Ok(self.tables.read().await.instances.get(&id).cloned())
    }

    async fn get_auth_config(&self, id: InstanceId) -> Result<Option<AuthConfig>> {
        Ok(self.tables.read().await.auth_configs.get(&id).cloned())
    }

    async fn create_instance(&self, mut instance: Instance) -> Result<Instance> {
        let mut tables = self.tables.write().await;
        tables.next_id = tables.next_id.max(1);
        instance.id = tables.next_id;
        tables.next_id += 1;
        let now = Utc::now();
        instance.created_at = Some(now);
        instance.updated_at = Some(now);
        tables.instances.insert(instance.id, instance.clone());
        Ok(instance)
    }

    async fn update_instance(&self, mut instance: Instance) -> Result<Instance> {
        let mut tables = self.tables.write().await;
        let Some(current) = tables.instances.get(&instance.id) else {
            return Err(Error::InstanceNotFound(instance.id));
        };
        instance.created_at = current.created_at;
        instance.updated_at = Some(Utc::now());
        tables.instances.insert(instance.id, instance.clone());
        Ok(instance)
    }

    async fn delete_instance(&self, id: InstanceId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        tables.auth_configs.remove(&id);
        Ok(tables.instances.remove(&id).is_some())
    }

    async fn save_auth_config(&self, auth: AuthConfig) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.instances.contains_key(&auth.instance_id) {
            return Err(Error::InstanceNotFound(auth.instance_id));
        }
        tables.auth_configs.insert(auth.instance_id, auth);
        Ok(())
    }

    async fn delete_auth_config(&self, id: InstanceId) -> Result<bool> {
        Ok(self.tables.write().await.auth_configs.remove(&id).is_some())
    }
}
