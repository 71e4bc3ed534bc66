mod client;
mod error;
mod filter;
mod note;
mod relay;
pub mod relay_info;

pub use client::ClientMessage;
pub use error::Error;
pub use ewebsock;
pub use filter::{Filter, FilterBuilder};
pub use note::{kinds, Note};
pub use relay::message::{CommandResult, RelayMessage};
pub use relay::{
    RelayReqId, RelayStatus, RelayTransport, TransportEvent, WebsocketTransport, Wakeup,
};
pub use relay_info::{RelayInfo, RelayInfoError};

pub type Result<T> = std::result::Result<T, error::Error>;
