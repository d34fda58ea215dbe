//! EcoLink backend — entry point.
//!
//! Wires the SQLite pool, the hosted-checkout payment client, and the Axum
//! REST API together.  Configuration comes from the environment (see
//! `config.rs`); `RUST_LOG` controls verbosity.

use std::sync::Arc;

use reqwest::Client;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ecolink::api::{self, ApiState};
use ecolink::config::Config;
use ecolink::db;
use ecolink::payments::HostedCheckout;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    // Load config from environment.
    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url).await?;

    // Outbound HTTP client for the payment provider.
    let client = Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;
    let gateway = Arc::new(HostedCheckout::new(
        client,
        config.payment_api_url.clone(),
        config.payment_api_key.clone(),
    ));

    let state = Arc::new(ApiState {
        pool,
        gateway,
        config: config.clone(),
    });

    let app = api::router(state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
