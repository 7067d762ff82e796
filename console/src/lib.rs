use actix_web::{
    http::{header::ContentType, StatusCode},
    web, HttpResponse, ResponseError,
};
use common::InstanceId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] common::Error),

    #[error("Instance {0} not found")]
    NotFound(InstanceId),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Metrics encoding error: {0}")]
    MetricsError(#[from] std::fmt::Error),

    #[error("Stdio error {0}")]
    Stdio(#[from] std::io::Error),

    #[error("Setup error: {0}")]
    Setup(String),
}
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub error: String,
}

impl Error {
    pub fn to_message(&self) -> String {
        match self {
            Error::Core(common::Error::NotInitialized(id, _)) => {
                format!("client for instance {id} not initialized")
            }
            Error::Core(common::Error::InstanceNotFound(id)) => format!("Instance {id} not found"),
            Error::Core(e) if e.is_credential_error() || e.is_build_error() => e.to_string(),
            Error::Core(
                e @ (common::Error::KubeError(_)
                | common::Error::ReqwestError(_)
                | common::Error::MethodFailed(..)
                | common::Error::UnknownResource(_)
                | common::Error::Elapsed(_)),
            ) => e.to_string(),
            // Do not expose internal details in error messages
            Error::Core(_) | Error::MetricsError(_) | Error::Stdio(_) | Error::Setup(_) => {
                "internal server error".to_string()
            }
            e => e.to_string(),
        }
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Core(e) => match e {
                common::Error::NotInitialized(..) => StatusCode::SERVICE_UNAVAILABLE,
                common::Error::InstanceNotFound(_) | common::Error::UnknownResource(_) => StatusCode::NOT_FOUND,
                e if e.is_credential_error() => StatusCode::UNPROCESSABLE_ENTITY,
                e if e.is_build_error() => StatusCode::BAD_GATEWAY,
                common::Error::KubeError(_)
                | common::Error::ReqwestError(_)
                | common::Error::MethodFailed(..)
                | common::Error::Elapsed(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::MetricsError(_) | Error::Stdio(_) | Error::Setup(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            tracing::warn!("request failed: {self}");
        }
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .json(ErrorMessage {
                error: self.to_message(),
            })
    }
}

pub mod admin;
pub mod clusters;
pub mod config;
pub mod ops;

/// State shared by the handlers
pub mod manager;
pub use manager::Manager;

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(ops::index)
        .service(ops::health)
        .service(ops::metrics)
        .service(admin::list_instances)
        .service(admin::create_instance)
        .service(admin::read_instance)
        .service(admin::update_instance)
        .service(admin::delete_instance)
        .service(admin::update_auth)
        .service(admin::delete_auth)
        .service(clusters::kubernetes_version)
        .service(clusters::kubernetes_namespaces)
        .service(clusters::kubernetes_crds)
        .service(clusters::kubernetes_resources)
        .service(clusters::kubernetes_node_metrics)
        .service(clusters::kubernetes_pod_metrics)
        .service(clusters::helm_releases)
        .service(clusters::elasticsearch_health);
}
