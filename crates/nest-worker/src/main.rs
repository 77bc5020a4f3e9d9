use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing::error;
use tracing_subscriber::EnvFilter;

use nest_worker::http_object_store::HttpObjectStore;
use nest_worker::pg_store::PgStore;
use nest_worker::{Worker, WorkerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match WorkerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load worker configuration");
            std::process::exit(1);
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;

    let store = Arc::new(PgStore::new(pool));
    let objects = Arc::new(HttpObjectStore::new(
        config.object_store_base_url.clone(),
        config.storage_bucket.clone(),
        config.object_store_token.clone(),
    ));

    let worker = Worker::new(store.clone(), store, objects, config);
    worker.run().await;
}
