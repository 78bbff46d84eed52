use fuelmeter_core::TransportError;
use tokio::sync::mpsc::{
    Receiver, Sender, UnboundedReceiver, UnboundedSender, channel, unbounded_channel,
};

use crate::Transport;

pub type Inbound = Result<Vec<u8>, TransportError>;

/// Transport fed from a channel; the client "closes" by dropping the sender.
pub struct ChannelTransport {
    inbound: Receiver<Inbound>,
    outbound: UnboundedSender<String>,
}

impl ChannelTransport {
    pub fn pair() -> (Self, Sender<Inbound>, UnboundedReceiver<String>) {
        let (in_tx, inbound) = channel(64);
        let (outbound, out_rx) = unbounded_channel();
        (Self { inbound, outbound }, in_tx, out_rx)
    }
}

impl Transport for ChannelTransport {
    async fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        self.inbound.recv().await.unwrap_or(Err(TransportError::Closed))
    }

    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.outbound
            .send(frame)
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn close(&mut self) {}
}

pub fn frame(signal: &str, (lat, lon): (f64, f64)) -> Vec<u8> {
    format!(
        r#"{{"message":"{signal}","timestamp":"2023-10-10T10:00:00Z","latitude":{lat},"longitude":{lon},"traceId":"client-made-up"}}"#
    )
    .into_bytes()
}
