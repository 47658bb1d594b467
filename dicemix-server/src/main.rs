use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use dicemix::{Hub, HubConfig, HubRunner};
use dicemix_server::{ServerConfig, ServerError};

/// Coordinates DiceMix-Light sessions of peers connected via WebSocket
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Address to listen at
    #[arg(long, default_value = "0.0.0.0:8082")]
    addr: SocketAddr,
    /// Path serving WebSocket upgrade
    #[arg(long, default_value = "/ws")]
    path: String,

    /// Number of peers with announced long-term keys required to start a run
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u64).range(2..))]
    min_peers: u64,
    /// Upper bound on number of messages in a run
    #[arg(long, default_value_t = 256)]
    max_total_messages: u32,
    /// Time given to peers to submit in every round
    #[arg(long, default_value_t = 5)]
    response_wait_secs: u64,
    /// Pause before every broadcast
    #[arg(long, default_value_t = 1000)]
    broadcast_delay_ms: u64,

    #[arg(long, default_value_t = 54)]
    ping_period_secs: u64,
    /// Connection is dropped if the peer stays silent for that long
    #[arg(long, default_value_t = 60)]
    pong_wait_secs: u64,
    #[arg(long, default_value_t = 10)]
    write_wait_secs: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run(Args::parse()).await {
        error!(%err, "server failed");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), ServerError> {
    let mut hub_config = HubConfig::default();
    hub_config.set_min_peers(args.min_peers as usize);
    hub_config.set_max_total_messages(args.max_total_messages);
    hub_config.set_response_wait(Duration::from_secs(args.response_wait_secs));
    hub_config.set_broadcast_delay(Duration::from_millis(args.broadcast_delay_ms));

    let config = ServerConfig {
        path: args.path,
        ping_period: Duration::from_secs(args.ping_period_secs),
        pong_wait: Duration::from_secs(args.pong_wait_secs),
        write_wait: Duration::from_secs(args.write_wait_secs),
    };

    let listener = TcpListener::bind(args.addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: args.addr,
            source,
        })?;
    info!(addr = %args.addr, path = %config.path, "listening");

    let hub: Hub = Hub::new(hub_config, ChaCha20Rng::from_entropy());
    let (runner, handle) = HubRunner::new(hub);
    let runner = tokio::spawn(async move {
        runner.run().await;
    });

    tokio::select! {
        _ = dicemix_server::serve(listener, handle, config) => (),
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }
    runner.abort();
    Ok(())
}
