//! Outbound line delivery.

use tokio::sync::mpsc;
use tracing::warn;

/// Fire-and-forget delivery of protocol lines on behalf of a service.
pub trait Transport {
    fn send_line(&mut self, source: &str, text: &str);
}

/// Queues `:<source> <text>` lines for the uplink writer task.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelTransport {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self { tx }
    }
}

impl Transport for ChannelTransport {
    fn send_line(&mut self, source: &str, text: &str) {
        if self.tx.send(format!(":{source} {text}")).is_err() {
            warn!(%source, "uplink writer gone; line dropped");
        }
    }
}
