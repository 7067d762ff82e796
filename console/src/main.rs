use actix_web::{middleware, web::Data, App, HttpServer};
use clap::Parser;
use common::{InstanceStore, MemoryStore};
use console::{config::Parameters, Error, Manager, Result};
use std::sync::Arc;
use tracing_subscriber::{prelude::*, EnvFilter, Layer, Registry};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Parameters::parse();

    // Setup tracing layers
    let logger = if args.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| Error::Setup(e.to_string()))?;
    let collector = Registry::default().with(logger).with(env_filter);
    tracing::subscriber::set_global_default(collector).map_err(|e| Error::Setup(e.to_string()))?;

    let store: Arc<dyn InstanceStore> = match &args.inventory {
        Some(path) => {
            tracing::info!("loading inventory from {}", path.display());
            Arc::new(MemoryStore::load(path).await?)
        }
        None => Arc::new(MemoryStore::new()),
    };
    let manager = Manager::new(store, args.registry_config()).await?;
    let diag = manager.diagnostics().await;
    tracing::info!(
        "{} instance(s) registered, {} failed to initialize",
        diag.registered,
        diag.bootstrap_failures.len()
    );

    // Start web server
    let data = manager.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(Data::new(data.clone()))
            .wrap(middleware::Logger::default().exclude("/health"))
            .configure(console::routes)
    })
    .bind(&args.bind)?
    .shutdown_timeout(5);

    server.run().await?;
    tracing::info!("actix exited");
    manager.shutdown().await;
    Ok(())
}
