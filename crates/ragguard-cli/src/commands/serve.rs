//! Serve command

use crate::app::ServeArgs;
use anyhow::{Context, Result};
use ragguard_core::{Config, QueryOrchestrator};
use std::net::SocketAddr;
use std::sync::Arc;

pub async fn run(args: ServeArgs, mut config: Config) -> Result<()> {
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    let orchestrator = Arc::new(QueryOrchestrator::from_config(&config).await?);
    tracing::info!(
        rate_limit_per_window = config.orchestrator.rate_limit_per_window,
        rate_limit_window_secs = config.orchestrator.rate_limit_window_secs,
        breaker_failure_threshold = config.orchestrator.breaker_failure_threshold,
        audit_sink = ?config.audit.sink,
        "starting ragguard"
    );

    ragguard_server::serve(orchestrator, addr, config.orchestrator.rate_limit_idle()).await
}
