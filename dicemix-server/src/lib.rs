//! WebSocket server coordinating DiceMix-Light sessions
//!
//! Every WebSocket connection is a peer. Frames received from the peer are submitted to
//! [`HubRunner`](dicemix::HubRunner), frames the hub addresses to the peer are written back as
//! binary messages. The connection is kept alive by pings, and is closed when the peer stays
//! silent for longer than [`pong_wait`](ServerConfig::pong_wait).

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use dicemix::HubHandle;

mod connection;
pub mod dev;

pub use self::connection::ConnectionError;

/// Transport parameters
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Path WebSocket upgrade is served at, other paths are rejected with 404
    pub path: String,
    /// Interval between pings
    pub ping_period: Duration,
    /// Connection is dropped if nothing is received from the peer within this period. Must be
    /// greater than `ping_period`.
    pub pong_wait: Duration,
    /// Time allowed to write a message
    pub write_wait: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            path: "/ws".to_owned(),
            ping_period: Duration::from_secs(54),
            pong_wait: Duration::from_secs(60),
            write_wait: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("couldn't bind {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Accepts connections forever, serving each of them in a separate task
pub async fn serve(listener: TcpListener, hub: HubHandle, config: ServerConfig) {
    let config = Arc::new(config);
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!(%err, "couldn't accept connection");
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }
        };
        debug!(%addr, "accepted tcp connection");

        let hub = hub.clone();
        let config = config.clone();
        tokio::spawn(async move {
            match connection::serve_connection(stream, hub, &config).await {
                Ok(()) => debug!(%addr, "connection finished"),
                Err(err) => info!(%addr, %err, "connection dropped"),
            }
        });
    }
}
