use crate::{
    relay::{message::RelayMessage, RelayStatus, RelayTransport, TransportEvent, Wakeup},
    ClientMessage, Error, Result,
};

use std::fmt;

use ewebsock::{Options, WsEvent, WsMessage, WsReceiver, WsSender};
use tracing::{debug, error, trace};

pub struct WebsocketConn {
    pub url: String,
    pub status: RelayStatus,
    pub sender: WsSender,
    pub receiver: WsReceiver,
}

impl fmt::Debug for WebsocketConn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebsocketConn")
            .field("url", &self.url)
            .field("status", &self.status)
            .finish()
    }
}

/// [`RelayTransport`] over an ewebsock connection. ewebsock runs its own
/// reader, so incoming frames are buffered until [`RelayTransport::try_recv`]
/// is called; `wakeup` fires for every frame.
pub struct WebsocketTransport<W: Wakeup> {
    conn: Option<WebsocketConn>,
    wakeup: W,
}

impl<W: Wakeup> WebsocketTransport<W> {
    pub fn new(wakeup: W) -> Self {
        Self { conn: None, wakeup }
    }

    pub fn status(&self) -> RelayStatus {
        self.conn
            .as_ref()
            .map_or(RelayStatus::Disconnected, |c| c.status)
    }
}

impl<W: Wakeup> RelayTransport for WebsocketTransport<W> {
    fn connect(&mut self, url: &str) -> Result<()> {
        let wakeup = self.wakeup.clone();
        let (sender, receiver) =
            ewebsock::connect_with_wakeup(url, Options::default(), move || wakeup.wake())?;

        self.conn = Some(WebsocketConn {
            url: url.to_owned(),
            status: RelayStatus::Connecting,
            sender,
            receiver,
        });
        Ok(())
    }

    fn close(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        debug!("closing websocket to {}", conn.url);
        conn.sender.close();
    }

    fn send(&mut self, msg: &ClientMessage) -> Result<()> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(Error::NotConnected);
        };

        let json = match msg.to_json() {
            Ok(json) => {
                debug!("sending {} to {}", json, conn.url);
                json
            }
            Err(e) => {
                error!("error serializing json for {}: {e}", conn.url);
                return Err(e);
            }
        };

        conn.sender.send(WsMessage::Text(json));
        Ok(())
    }

    #[profiling::function]
    fn try_recv(&mut self) -> Option<TransportEvent> {
        loop {
            let conn = self.conn.as_mut()?;
            let event = conn.receiver.try_recv()?;

            match event {
                WsEvent::Opened => {
                    conn.status = RelayStatus::Connected;
                    return Some(TransportEvent::Opened);
                }
                WsEvent::Closed => {
                    conn.status = RelayStatus::Disconnected;
                    return Some(TransportEvent::Closed);
                }
                WsEvent::Error(err) => {
                    error!("relay {} error: {:?}", conn.url, err);
                    conn.status = RelayStatus::Disconnected;
                    return Some(TransportEvent::Error(err));
                }
                WsEvent::Message(WsMessage::Text(text)) => {
                    trace!("relay {} received text: {}", conn.url, text);
                    match RelayMessage::from_json(&text) {
                        Ok(msg) => return Some(TransportEvent::Message(msg)),
                        Err(err) => {
                            error!("relay {} message decode error: {:?}", conn.url, err);
                        }
                    }
                }
                // let's just handle pongs here.
                // We only need to do this natively.
                #[cfg(not(target_arch = "wasm32"))]
                WsEvent::Message(WsMessage::Ping(bs)) => {
                    debug!("pong {}", conn.url);
                    conn.sender.send(WsMessage::Pong(bs));
                }
                WsEvent::Message(_) => {}
            }
        }
    }
}
