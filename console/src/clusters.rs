//! Read-only views over the registered clusters.
//!
//! Handlers only ever look clients up; an instance without a bundle
//! answers 503 and nothing is built on the request path.
use crate::{Manager, Result};
use actix_web::{
    get,
    web::{Data, Json, Path, Query},
    Responder,
};
use common::InstanceId;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct NamespaceQuery {
    pub namespace: Option<String>,
}

#[get("/api/kubernetes/{id}/version")]
pub async fn kubernetes_version(m: Data<Manager>, id: Path<InstanceId>) -> Result<impl Responder> {
    let kube = m.registry.kubernetes(id.into_inner()).await?;
    Ok(Json(kube.version().await?))
}

#[get("/api/kubernetes/{id}/namespaces")]
pub async fn kubernetes_namespaces(m: Data<Manager>, id: Path<InstanceId>) -> Result<impl Responder> {
    let kube = m.registry.kubernetes(id.into_inner()).await?;
    Ok(Json(json!({ "namespaces": kube.namespaces().await? })))
}

#[get("/api/kubernetes/{id}/crds")]
pub async fn kubernetes_crds(m: Data<Manager>, id: Path<InstanceId>) -> Result<impl Responder> {
    let kube = m.registry.kubernetes(id.into_inner()).await?;
    Ok(Json(json!({ "crds": kube.crds().await? })))
}

#[get("/api/kubernetes/{id}/resources/{kind}")]
pub async fn kubernetes_resources(
    m: Data<Manager>,
    path: Path<(InstanceId, String)>,
    query: Query<NamespaceQuery>,
) -> Result<impl Responder> {
    let (id, kind) = path.into_inner();
    let kube = m.registry.kubernetes(id).await?;
    let list = kube.dynamic.list(&kind, query.namespace.as_deref()).await?;
    Ok(Json(json!({ "kind": kind, "items": list.items })))
}

#[get("/api/kubernetes/{id}/metrics/nodes")]
pub async fn kubernetes_node_metrics(m: Data<Manager>, id: Path<InstanceId>) -> Result<impl Responder> {
    let kube = m.registry.kubernetes(id.into_inner()).await?;
    match &kube.metrics {
        Some(metrics) => Ok(Json(json!({ "available": true, "nodes": metrics.node_metrics().await? }))),
        None => Ok(Json(json!({ "available": false }))),
    }
}

#[get("/api/kubernetes/{id}/metrics/pods")]
pub async fn kubernetes_pod_metrics(
    m: Data<Manager>,
    id: Path<InstanceId>,
    query: Query<NamespaceQuery>,
) -> Result<impl Responder> {
    let kube = m.registry.kubernetes(id.into_inner()).await?;
    match &kube.metrics {
        Some(metrics) => Ok(Json(
            json!({ "available": true, "pods": metrics.pod_metrics(query.namespace.as_deref()).await? }),
        )),
        None => Ok(Json(json!({ "available": false }))),
    }
}

#[get("/api/kubernetes/{id}/helm/releases")]
pub async fn helm_releases(
    m: Data<Manager>,
    id: Path<InstanceId>,
    query: Query<NamespaceQuery>,
) -> Result<impl Responder> {
    let kube = m.registry.kubernetes(id.into_inner()).await?;
    let releases = kube.helm.list_releases(query.namespace.as_deref()).await?;
    Ok(Json(json!({ "releases": releases })))
}

#[get("/api/elasticsearch/{id}/health")]
pub async fn elasticsearch_health(m: Data<Manager>, id: Path<InstanceId>) -> Result<impl Responder> {
    let search = m.registry.elasticsearch(id.into_inner()).await?;
    Ok(Json(search.cluster_health().await?))
}

#[cfg(test)]
mod tests {
    use crate::{routes, testdata, ErrorMessage};
    use actix_web::{http::StatusCode, test, web::Data, App};
    use common::{AuthConfig, AuthType, BackendKind, Instance};

    #[actix_web::test]
    async fn test_uninitialized_instances_answer_503() {
        let manager = testdata::manager().await;
        let app = test::init_service(App::new().app_data(Data::new(manager)).configure(routes)).await;
        for uri in [
            "/api/kubernetes/42/version",
            "/api/kubernetes/42/namespaces",
            "/api/kubernetes/42/resources/pods?namespace=default",
            "/api/kubernetes/42/metrics/nodes",
            "/api/kubernetes/42/metrics/pods?namespace=kube-system",
            "/api/kubernetes/42/helm/releases",
            "/api/elasticsearch/42/health",
        ] {
            let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
            assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE, "{uri}");
            let msg: ErrorMessage = test::read_body_json(resp).await;
            assert_eq!(msg.error, "client for instance 42 not initialized");
        }
    }

    #[actix_web::test]
    async fn test_wrong_backend_is_not_initialized() {
        let manager = testdata::manager().await;
        let inst = manager
            .store
            .create_instance(Instance::new(0, "logs", BackendKind::Elasticsearch, "http://es.local:9200"))
            .await
            .unwrap();
        let auth = AuthConfig::new(inst.id, AuthType::ApiKey, "k1");
        manager.sync_instance(&inst, Some(&auth)).await.unwrap();
        let app = test::init_service(App::new().app_data(Data::new(manager)).configure(routes)).await;
        let uri = format!("/api/kubernetes/{}/version", inst.id);
        let resp = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_web::test]
    async fn test_node_metrics_without_metrics_server() {
        let manager = testdata::manager().await;
        let inst = manager
            .store
            .create_instance(Instance::new(0, "prod", BackendKind::Kubernetes, ""))
            .await
            .unwrap();
        let auth = AuthConfig::new(inst.id, AuthType::Kubeconfig, &testdata::kubeconfig("https://127.0.0.1:1"));
        manager.sync_instance(&inst, Some(&auth)).await.unwrap();
        let app = test::init_service(App::new().app_data(Data::new(manager)).configure(routes)).await;
        let uri = format!("/api/kubernetes/{}/metrics/nodes", inst.id);
        let body: serde_json::Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri(&uri).to_request()).await;
        assert_eq!(body["available"], false);
    }
}
