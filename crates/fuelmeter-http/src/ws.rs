use std::net::SocketAddr;

use axum::{
    extract::{
        ConnectInfo, State,
        ws::{Message, WebSocket, WebSocketUpgrade, close_code},
    },
    response::Response,
};
use fuelmeter_core::TransportError;
use fuelmeter_tokio::Transport;
use tracing::{debug, error, info};

use crate::routes::AppState;

/// A client connection upgraded to WebSocket.
pub struct WsTransport(WebSocket);

impl Transport for WsTransport {
    async fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        loop {
            let Some(msg) = self.0.recv().await else {
                return Err(TransportError::Closed);
            };
            let msg = msg.map_err(|e| TransportError::Io(e.to_string()))?;
            if let Some(received) = payload(msg) {
                return received;
            }
        }
    }

    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.0
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn close(&mut self) {
        if let Err(e) = self.0.send(Message::Close(None)).await {
            debug!("close frame not sent: {e}");
        }
    }
}

/// Maps a WebSocket message to a frame for the session, `None` for control
/// messages that are skipped. Close codes 1000 and 1001 are graceful.
fn payload(msg: Message) -> Option<Result<Vec<u8>, TransportError>> {
    match msg {
        Message::Text(text) => Some(Ok(text.as_str().as_bytes().to_vec())),
        Message::Binary(bytes) => Some(Ok(bytes.to_vec())),
        Message::Ping(_) | Message::Pong(_) => None,
        Message::Close(None) => Some(Err(TransportError::Closed)),
        Message::Close(Some(frame)) => Some(match frame.code {
            close_code::NORMAL | close_code::AWAY => Err(TransportError::Closed),
            code => Err(TransportError::Io(format!(
                "closed with code {code}: {}",
                frame.reason.as_str()
            ))),
        }),
    }
}

/// `GET /ws`
pub async fn upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        info!("client connected from {remote_addr}");
        let handle = state
            .server
            .serve(WsTransport(socket), Some(remote_addr))
            .await;
        match handle.await {
            Ok(final_state) => info!("client {remote_addr} disconnected in {final_state:?}"),
            Err(e) => error!("session task for {remote_addr} failed: {e}"),
        }
    })
}
