//! `harbor serve` — Start the HTTP gateway.

use std::path::Path;
use std::sync::Arc;

use harbor_gateway::GatewayState;

use super::bootstrap;

pub async fn run(config_path: Option<&Path>, port: Option<u16>) -> anyhow::Result<()> {
    let mut config = bootstrap::load_config(config_path)?;
    if let Some(port) = port {
        config.gateway.port = port;
    }

    let runtime = bootstrap::build_runtime(&config).await?;

    println!(
        "⚓ Harbor gateway listening on http://{}:{}",
        config.gateway.host, config.gateway.port
    );
    let state = GatewayState::new(config.gateway, Arc::new(runtime.query_loop)).with_store(runtime.store);
    harbor_gateway::start(state).await?;
    Ok(())
}
