//! Serve command handler.

use anyhow::{anyhow, Result};

use riskmeter::api::{start_server, AppState};
use riskmeter::config::Config;
use riskmeter::RiskMeter;

/// Run the HTTP server until Ctrl-C.
pub(crate) async fn cmd_serve(
    mut config: Config,
    bind: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let meter = RiskMeter::from_config(&config)?;
    start_server(&config.server, AppState::new(meter))
        .await
        .map_err(|e| anyhow!("Server error: {}", e))
}
