use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{AppState, router};
use summary_core::SummaryConfig;
use summary_llm::{HttpLlmClient, LlmSettings};
use summary_warehouse::{ENV_WAREHOUSE_DIR, SqliteWarehouse, warehouse_dir_from_env_value};

const ENV_REST_ADDR: &str = "SUMMARY_REST_ADDR";

/// Main entry point for the patient summary service.
///
/// Reads configuration once from the environment (and `.env`), builds the warehouse and LLM
/// clients, and serves the REST API until interrupted.
///
/// # Environment Variables
/// - `SUMMARY_REST_ADDR`: REST server address (default: "0.0.0.0:8000")
/// - `SUMMARY_WAREHOUSE_DIR`: directory of `<database>.db` files (default: "warehouse")
/// - `LLM_BASE_URL` / `LLM_API_KEY`: OpenAI-compatible completions endpoint
/// - `SUMMARY_*`: pipeline settings, see `summary_core::config`
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("summary_run=info".parse()?)
                .add_directive("api_rest=info".parse()?)
                .add_directive("summary_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var(ENV_REST_ADDR).unwrap_or_else(|_| "0.0.0.0:8000".into());

    let cfg = Arc::new(SummaryConfig::from_lookup(|k| std::env::var(k).ok())?);

    let warehouse_dir = warehouse_dir_from_env_value(std::env::var(ENV_WAREHOUSE_DIR).ok());
    let warehouse = Arc::new(SqliteWarehouse::new(&warehouse_dir)?);

    let llm_settings = LlmSettings::from_lookup(|k| std::env::var(k).ok());
    tracing::info!("++ Using completions endpoint {}", llm_settings.base_url);
    let llm = Arc::new(HttpLlmClient::new(llm_settings)?);

    let app = router(AppState::new(cfg, warehouse.clone(), warehouse, llm));

    tracing::info!("++ Serving warehouse {}", warehouse_dir.display());
    tracing::info!("++ Starting summary REST API on {}", rest_addr);

    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {:?}", e);
    }
    tracing::info!("-- Shutting down");
}
