use std::sync::Arc;

use skirmish::{ServerAuth, ServerConfig, ServerStore, SkirmishError, SkirmishServerBuilder};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), SkirmishError> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    tracing::info!("Skirmish server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::from_env();
    let auth = ServerAuth::from_config(&config)?;
    let store = Arc::new(ServerStore::from_config(&config).await?);

    let server = SkirmishServerBuilder::from_config(&config)?
        .build(auth, store)
        .await?;
    tracing::info!(
        addr = %config.bind_addr,
        recovered = server.recovery().recovered.len(),
        "ready"
    );

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "could not listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await
}
