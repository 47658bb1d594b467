use std::io;
use std::net::SocketAddr;

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use dicemix::{Hub, HubConfig, HubRunner};

use crate::ServerConfig;

/// DiceMix server for tests
pub struct TestServer {
    addr: SocketAddr,
    path: String,
    runner: JoinHandle<()>,
    server: JoinHandle<()>,
}

impl TestServer {
    /// Launches server in the background with default parameters, except broadcasts are not
    /// delayed
    ///
    /// Server takes random available TCP port, so several `TestServer`s may co-exist
    /// simultaneously. Retrieve server address via [`.address()`](Self::address) method.
    pub async fn launch() -> io::Result<Self> {
        let mut config = HubConfig::default();
        config.set_broadcast_delay(std::time::Duration::ZERO);
        Self::launch_with(config, ServerConfig::default()).await
    }

    /// Launches server in the background
    ///
    /// This function returns when server is ready to accept clients requests.
    pub async fn launch_with(hub_config: HubConfig, config: ServerConfig) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let path = config.path.clone();

        let hub: Hub = Hub::new(hub_config, ChaCha20Rng::from_entropy());
        let (runner, handle) = HubRunner::new(hub);
        let runner = tokio::spawn(async move {
            runner.run().await;
        });
        let server = tokio::spawn(crate::serve(listener, handle, config));

        Ok(Self {
            addr,
            path,
            runner,
            server,
        })
    }

    /// Returns WebSocket URL the server listens at
    pub fn address(&self) -> String {
        format!("ws://{}{}", self.addr, self.path)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server.abort();
        self.runner.abort();
    }
}
