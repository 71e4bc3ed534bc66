use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("message is empty")]
    Empty,

    #[error("decoding failed: {0}")]
    DecodeFailed(String),

    #[error("invalid relay url")]
    InvalidRelayUrl,

    #[error("relay is not connected")]
    NotConnected,

    #[error("websocket error: {0}")]
    Websocket(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Generic(String),
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Websocket(s)
    }
}

impl From<url::ParseError> for Error {
    fn from(_e: url::ParseError) -> Self {
        Error::InvalidRelayUrl
    }
}
