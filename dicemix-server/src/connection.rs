use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, trace};

use dicemix::hub::HubError;
use dicemix::HubHandle;

use crate::ServerConfig;

type Sink = SplitSink<WebSocketStream<TcpStream>, Message>;
type Stream = SplitStream<WebSocketStream<TcpStream>>;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("websocket handshake failed")]
    Handshake(#[source] tungstenite::Error),
    #[error("websocket transport")]
    Transport(#[source] tungstenite::Error),
    #[error("peer is silent for too long")]
    ReadTimeout,
    #[error("write timed out")]
    WriteTimeout,
    #[error(transparent)]
    Hub(#[from] HubError),
}

/// Upgrades the connection and relays frames between the peer and the hub until either side
/// closes it
pub async fn serve_connection(
    stream: TcpStream,
    hub: HubHandle,
    config: &ServerConfig,
) -> Result<(), ConnectionError> {
    let path = config.path.clone();
    let websocket = tokio_tungstenite::accept_hdr_async(
        stream,
        move |request: &Request, response: Response| {
            if request.uri().path() == path {
                Ok(response)
            } else {
                let mut rejection = ErrorResponse::new(Some("not found".to_owned()));
                *rejection.status_mut() = StatusCode::NOT_FOUND;
                Err(rejection)
            }
        },
    )
    .await
    .map_err(ConnectionError::Handshake)?;

    let (id, outgoing) = hub.register().await?;
    info!(peer = id, "websocket connection established");

    let (sink, stream) = websocket.split();
    let result = tokio::select! {
        result = write_pump(sink, outgoing, config) => result,
        result = read_pump(stream, &hub, config) => result,
    };

    hub.unregister(id).await?;
    debug!(peer = id, "connection closed");
    result
}

async fn write_pump(
    mut sink: Sink,
    mut outgoing: mpsc::Receiver<Vec<u8>>,
    config: &ServerConfig,
) -> Result<(), ConnectionError> {
    let mut ping = time::interval_at(Instant::now() + config.ping_period, config.ping_period);
    loop {
        let message = tokio::select! {
            frame = outgoing.recv() => match frame {
                Some(frame) => Message::Binary(frame),
                None => {
                    // hub dropped the connection
                    let _ = time::timeout(config.write_wait, sink.send(Message::Close(None))).await;
                    return Ok(());
                }
            },
            _ = ping.tick() => Message::Ping(vec![]),
        };
        trace!(len = message.len(), "writing message");
        time::timeout(config.write_wait, sink.send(message))
            .await
            .map_err(|_| ConnectionError::WriteTimeout)?
            .map_err(ConnectionError::Transport)?;
    }
}

async fn read_pump(
    mut stream: Stream,
    hub: &HubHandle,
    config: &ServerConfig,
) -> Result<(), ConnectionError> {
    loop {
        let message = match time::timeout(config.pong_wait, stream.next()).await {
            Err(_) => return Err(ConnectionError::ReadTimeout),
            Ok(None) => return Ok(()),
            Ok(Some(message)) => message.map_err(ConnectionError::Transport)?,
        };
        match message {
            Message::Binary(frame) => hub.submit(frame).await?,
            Message::Text(text) => hub.submit(text.into_bytes()).await?,
            Message::Close(_) => return Ok(()),
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => (),
        }
    }
}
