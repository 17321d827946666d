//! IMS API server binary.
//!
//! Reads configuration from `IMS_*` environment variables, connects to
//! Postgres when `DATABASE_URL` is set (hydrating the in-memory stores),
//! and serves the API.

use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

use ims_api::state::{AppConfig, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env();
    let port = config.port;

    let pool = ims_api::db::init_pool().await?;
    let state = AppState::with_config(config, pool.clone());
    if let Some(pool) = &pool {
        ims_api::db::hydrate(&state, pool).await?;
    }

    let app = ims_api::app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("ims-api listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
