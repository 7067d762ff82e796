//! Admin API over instances and their credentials.
//!
//! Every mutation goes through [`Manager::sync_instance`]. Credential
//! changes are registered before they are persisted, so a credential that
//! cannot produce a client is refused and the working one stays in place.
use crate::{Error, Manager, Result};
use actix_web::{
    delete, get, post, put,
    web::{Data, Json, Path},
    HttpResponse, Responder,
};
use common::{AuthConfig, AuthType, BackendKind, Instance, InstanceId, InstanceStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
    pub auth_type: AuthType,
    #[serde(default)]
    pub config_value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInstanceRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: BackendKind,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub status: InstanceStatus,
    pub auth: Option<AuthRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInstanceRequest {
    pub name: Option<String>,
    pub address: Option<String>,
    pub status: Option<InstanceStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceResponse {
    #[serde(flatten)]
    pub instance: Instance,
    pub auth_type: Option<AuthType>,
    pub initialized: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InstancesResponse {
    pub instances: Vec<InstanceResponse>,
}

async fn describe(m: &Manager, instance: Instance) -> Result<InstanceResponse> {
    let auth_type = m.store.get_auth_config(instance.id).await?.map(|a| a.auth_type);
    let initialized = m.registry.contains(instance.id).await;
    Ok(InstanceResponse {
        instance,
        auth_type,
        initialized,
    })
}

async fn load(m: &Manager, id: InstanceId) -> Result<Instance> {
    m.store.get_instance(id).await?.ok_or(Error::NotFound(id))
}

#[get("/api/instances")]
pub async fn list_instances(m: Data<Manager>) -> Result<impl Responder> {
    let mut instances = Vec::new();
    for inst in m.store.list_instances(None, None).await? {
        instances.push(describe(&m, inst).await?);
    }
    Ok(Json(InstancesResponse { instances }))
}

#[get("/api/instances/{id}")]
pub async fn read_instance(m: Data<Manager>, id: Path<InstanceId>) -> Result<impl Responder> {
    let instance = load(&m, id.into_inner()).await?;
    Ok(Json(describe(&m, instance).await?))
}

#[post("/api/instances")]
pub async fn create_instance(m: Data<Manager>, req: Json<CreateInstanceRequest>) -> Result<impl Responder> {
    let req = req.into_inner();
    if req.name.trim().is_empty() {
        return Err(Error::BadRequest("name is required".to_string()));
    }
    let mut draft = Instance::new(0, req.name.trim(), req.kind, req.address.trim());
    draft.status = req.status;
    let instance = m.store.create_instance(draft).await?;
    if let Some(auth) = req.auth {
        let auth = AuthConfig::new(instance.id, auth.auth_type, &auth.config_value);
        if let Err(e) = m.sync_instance(&instance, Some(&auth)).await {
            tracing::warn!("instance {}: refusing creation: {e}", instance.id);
            m.store.delete_instance(instance.id).await?;
            return Err(e);
        }
        if auth.auth_type != AuthType::None || instance.kind.accepts_anonymous() {
            m.store.save_auth_config(auth).await?;
        }
    }
    tracing::info!("instance {} ({}) created", instance.id, instance.name);
    Ok(HttpResponse::Created().json(describe(&m, instance).await?))
}

#[put("/api/instances/{id}")]
pub async fn update_instance(
    m: Data<Manager>,
    id: Path<InstanceId>,
    req: Json<UpdateInstanceRequest>,
) -> Result<impl Responder> {
    let mut instance = load(&m, id.into_inner()).await?;
    let req = req.into_inner();
    if let Some(name) = req.name {
        if name.trim().is_empty() {
            return Err(Error::BadRequest("name is required".to_string()));
        }
        instance.name = name.trim().to_string();
    }
    if let Some(address) = req.address {
        instance.address = address.trim().to_string();
    }
    if let Some(status) = req.status {
        instance.status = status;
    }
    let auth = m.store.get_auth_config(instance.id).await?;
    m.sync_instance(&instance, auth.as_ref()).await?;
    let instance = m.store.update_instance(instance).await?;
    Ok(Json(describe(&m, instance).await?))
}

#[delete("/api/instances/{id}")]
pub async fn delete_instance(m: Data<Manager>, id: Path<InstanceId>) -> Result<impl Responder> {
    let id = id.into_inner();
    // must precede the registry remove, see Manager::sync_instance
    let deleted = m.store.delete_instance(id).await?;
    m.registry.remove(id).await;
    if !deleted {
        return Err(Error::NotFound(id));
    }
    tracing::info!("instance {id} deleted");
    Ok(HttpResponse::NoContent().finish())
}

#[put("/api/instances/{id}/auth")]
pub async fn update_auth(m: Data<Manager>, id: Path<InstanceId>, req: Json<AuthRequest>) -> Result<impl Responder> {
    let instance = load(&m, id.into_inner()).await?;
    let req = req.into_inner();
    let auth = AuthConfig::new(instance.id, req.auth_type, &req.config_value);
    m.sync_instance(&instance, Some(&auth)).await?;
    if auth.auth_type == AuthType::None && !instance.kind.accepts_anonymous() {
        m.store.delete_auth_config(instance.id).await?;
    } else {
        m.store.save_auth_config(auth).await?;
    }
    tracing::info!("instance {}: credentials updated", instance.id);
    Ok(Json(describe(&m, instance).await?))
}

#[delete("/api/instances/{id}/auth")]
pub async fn delete_auth(m: Data<Manager>, id: Path<InstanceId>) -> Result<impl Responder> {
    let instance = load(&m, id.into_inner()).await?;
    m.sync_instance(&instance, None).await?;
    m.store.delete_auth_config(instance.id).await?;
    Ok(HttpResponse::NoContent().finish())
}
