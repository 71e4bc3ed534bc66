use crate::{ClientMessage, Result};

mod identity;
pub mod message;
mod websocket;

pub use identity::RelayReqId;
pub use websocket::WebsocketTransport;

use message::RelayMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayStatus {
    Connected,
    Connecting,
    Disconnected,
}

/// Everything a transport can hand back to its owner
#[derive(Debug)]
pub enum TransportEvent {
    Opened,
    Closed,
    Error(String),
    Message(RelayMessage),
}

/// The primitive connection to one relay. Implementations only move frames;
/// subscription bookkeeping belongs to whoever owns the transport.
pub trait RelayTransport {
    /// Begin a handshake. Success is reported later as [`TransportEvent::Opened`].
    fn connect(&mut self, url: &str) -> Result<()>;

    /// Drop the connection. No [`TransportEvent::Closed`] is required afterwards.
    fn close(&mut self);

    fn send(&mut self, msg: &ClientMessage) -> Result<()>;

    /// Poll the next inbound event without blocking
    fn try_recv(&mut self) -> Option<TransportEvent>;
}

/// Called by transports whenever there is something to receive, so that an
/// owner parked on other work knows to poll again.
pub trait Wakeup: Send + Sync + Clone + 'static {
    fn wake(&self);
}
