use crate::{Manager, Result};
use actix_web::{get, web::Data, HttpRequest, HttpResponse, Responder};

#[get("/metrics")]
pub async fn metrics(c: Data<Manager>, _req: HttpRequest) -> Result<impl Responder> {
    let metrics = c.metrics()?;
    Ok(HttpResponse::Ok()
        .content_type("application/openmetrics-text; version=1.0.0; charset=utf-8")
        .body(metrics))
}

#[get("/health")]
pub async fn health(_: HttpRequest) -> impl Responder {
    HttpResponse::Ok().json("healthy")
}

#[get("/")]
pub async fn index(c: Data<Manager>, _req: HttpRequest) -> impl Responder {
    let d = c.diagnostics().await;
    HttpResponse::Ok().json(&d)
}
