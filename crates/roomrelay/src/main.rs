use std::time::Duration;

use clap::Parser;
use roomrelay::{RelayConfig, RelayServer};
use tracing_subscriber::EnvFilter;

/// Session and room relay server.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// WebSocket listen address
    #[clap(long, default_value = roomrelay::config::DEFAULT_BIND)]
    bind: String,
    /// Stats listen address
    #[clap(long, default_value = roomrelay::config::DEFAULT_STATS_BIND)]
    stats_bind: String,
    /// Disable the stats endpoint
    #[clap(long)]
    no_stats: bool,
    /// Shared key clients must present
    #[clap(long, default_value = roomrelay::config::DEFAULT_SERVER_KEY)]
    server_key: String,
    /// Substring every game key must contain
    #[clap(long)]
    game_namespace: Option<String>,
    /// Datagram transport poll rate (ticks per second)
    #[clap(long, default_value = "30")]
    tick_rate: u32,
    /// Seconds an empty room waits for a rejoin
    #[clap(long, default_value = "30")]
    idle_life_secs: u64,
}

impl From<Args> for RelayConfig {
    fn from(args: Args) -> Self {
        Self {
            bind: args.bind,
            stats_bind: (!args.no_stats).then_some(args.stats_bind),
            server_key: args.server_key,
            game_namespace: args.game_namespace,
            tick_rate: args.tick_rate,
            idle_life: Duration::from_secs(args.idle_life_secs),
            ..RelayConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = RelayConfig::from(Args::parse());
    let server = RelayServer::builder().config(config).build().await?;
    tracing::info!(addr = %server.local_addr()?, "relay listening");

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.shutdown();
        }
    });

    server.run().await?;
    Ok(())
}
