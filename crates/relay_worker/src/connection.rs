use enostr::{ClientMessage, RelayInfo, RelayStatus, RelayTransport, TransportEvent};
use tracing::debug;

/// A transport plus what the worker knows about the link it carries
#[derive(Debug)]
pub struct Connection<T> {
    url: String,
    status: RelayStatus,
    transport: T,
    /// The relay's NIP-11 document, once fetched. Kept across reconnects.
    capability_info: Option<RelayInfo>,
}

impl<T: RelayTransport> Connection<T> {
    pub fn new(url: impl Into<String>, transport: T) -> Self {
        Self {
            url: url.into(),
            status: RelayStatus::Disconnected,
            transport,
            capability_info: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> RelayStatus {
        self.status
    }

    pub fn is_open(&self) -> bool {
        self.status == RelayStatus::Connected
    }

    pub fn capability_info(&self) -> Option<&RelayInfo> {
        self.capability_info.as_ref()
    }

    pub fn set_capability_info(&mut self, info: RelayInfo) {
        self.capability_info = Some(info);
    }

    /// Start the handshake. On error the connection stays disconnected.
    pub fn begin_connect(&mut self) -> enostr::Result<()> {
        self.status = RelayStatus::Connecting;
        if let Err(err) = self.transport.connect(&self.url) {
            self.status = RelayStatus::Disconnected;
            return Err(err);
        }
        Ok(())
    }

    pub fn mark_open(&mut self) {
        self.status = RelayStatus::Connected;
    }

    /// The remote side went away
    pub fn mark_closed(&mut self) {
        self.transport.close();
        self.status = RelayStatus::Disconnected;
    }

    /// Close from our side. Returns `false` when there was nothing to close.
    pub fn close(&mut self) -> bool {
        if self.status == RelayStatus::Disconnected {
            return false;
        }
        debug!("{}: closing connection", self.url);
        self.transport.close();
        self.status = RelayStatus::Disconnected;
        true
    }

    pub fn send(&mut self, msg: &ClientMessage) -> enostr::Result<()> {
        if !self.is_open() {
            return Err(enostr::Error::NotConnected);
        }
        self.transport.send(msg)
    }

    pub fn try_recv(&mut self) -> Option<TransportEvent> {
        self.transport.try_recv()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
