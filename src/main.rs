use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use krishi_gateway::api::{cors_layer, gateway_router, start_gateway_server, ApiContext};
use krishi_gateway::config::{self, GatewayConfig};
use krishi_gateway::db::Database;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = GatewayConfig::from_env()?;
    let db = Database::open(&config.database_path)?;
    tracing::info!(path = %config.database_path.display(), "Database ready");

    let ctx = ApiContext::from_config(&config, db)?;
    let app = gateway_router(ctx, cors_layer(&config.cors_origin)?);

    let server = start_gateway_server(app, config.bind_addr).await?;
    tracing::info!(
        addr = %server.session.server_addr,
        ai_service = %config.ai_service_url,
        "Gateway listening"
    );

    tokio::signal::ctrl_c().await?;
    server.stop().await;
    Ok(())
}
