use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use drip_core::DripConfig;
use drip_gateway::{app, instances::InstanceRouter};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "drip-gateway", about = "Rate-limited outbound HTTP batch engine")]
struct Cli {
    /// Path to drip.toml (default: ~/.drip/drip.toml)
    #[arg(long)]
    config: Option<String>,
    /// Override the configured bind address
    #[arg(long)]
    bind: Option<String>,
    /// Override the configured listen port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "drip_gateway=info,drip_engine=info,tower_http=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = DripConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        DripConfig::default()
    });
    if let Some(bind) = cli.bind {
        config.gateway.bind = bind;
    }
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;

    // one watch channel stops every instance's timer loop on shutdown
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let instances = InstanceRouter::new(&config, shutdown_rx)?;
    info!(dir = %config.database.dir, "activating persisted instances");
    // interrupted drains resume here, before the first client request
    instances.recover_all()?;

    let state = Arc::new(app::AppState::new(config, instances));
    let router = app::build_router(Arc::clone(&state));

    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("drip gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    // signal instance watch loops to stop
    let _ = shutdown_tx.send(true);
    Ok(())
}
