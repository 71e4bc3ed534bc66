//! NIP-11 Relay Information Document support
//!
//! Fetches the capability document a relay serves over plain HTTP(S) on the
//! same host as its websocket endpoint.

use http_body_util::{BodyExt, Empty, Limited};
use hyper::{
    body::Bytes,
    header::{self, HeaderValue},
    Request, Uri,
};
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::{client::legacy::Client, rt::TokioExecutor};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::Error;

/// Maximum body size for NIP-11 response
const MAX_BODY_BYTES: usize = 64 * 1024; // 64KB should be plenty for relay info

/// NIP-11 Relay Information Document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelayInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubkey: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supported_nips: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub software: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub limitation: RelayLimitation,
    /// Everything else the relay advertises, kept so it can be forwarded as is
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Server limitations from NIP-11
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelayLimitation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_message_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_subscriptions: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_subid_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_required: Option<bool>,
}

impl RelayInfo {
    pub fn supports_nip(&self, nip: u32) -> bool {
        self.supported_nips
            .as_ref()
            .is_some_and(|nips| nips.contains(&nip))
    }
}

/// Convert a websocket relay URL into the HTTP URL its NIP-11 document is
/// served from. Only the host and port survive.
pub fn info_url(relay_url: &str) -> Result<String, Error> {
    let url = Url::parse(relay_url)?;

    let scheme = match url.scheme() {
        "ws" => "http",
        "wss" => "https",
        _ => return Err(Error::InvalidRelayUrl),
    };

    let host = url.host_str().ok_or(Error::InvalidRelayUrl)?;

    Ok(match url.port() {
        Some(port) => format!("{scheme}://{host}:{port}"),
        None => format!("{scheme}://{host}"),
    })
}

/// Fetch NIP-11 relay information document
pub async fn fetch_relay_info(relay_url: &str) -> Result<RelayInfo, RelayInfoError> {
    let http_url = info_url(relay_url).map_err(|_| RelayInfoError::InvalidUrl)?;
    let uri: Uri = http_url.parse().map_err(|_| RelayInfoError::InvalidUrl)?;

    let https = {
        let builder = HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|_| RelayInfoError::TlsError)?;
        builder.https_or_http().enable_http1().build()
    };

    let client: Client<_, Empty<Bytes>> = Client::builder(TokioExecutor::new()).build(https);

    let authority = uri.authority().ok_or(RelayInfoError::InvalidUrl)?.clone();

    let req = Request::builder()
        .uri(&uri)
        .header(header::HOST, authority.as_str())
        .header(
            header::ACCEPT,
            HeaderValue::from_static("application/nostr+json"),
        )
        .body(Empty::<Bytes>::new())
        .map_err(|e| RelayInfoError::Http(e.to_string()))?;

    debug!("Fetching NIP-11 from {}", http_url);

    let res = client
        .request(req)
        .await
        .map_err(|e| RelayInfoError::Http(e.to_string()))?;

    if !res.status().is_success() {
        return Err(RelayInfoError::HttpStatus(res.status().as_u16()));
    }

    let content_type = res
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !content_type.contains("application/nostr+json")
        && !content_type.contains("application/json")
    {
        warn!(
            "Relay {} returned unexpected content type: {}",
            relay_url, content_type
        );
    }

    let limited_body = Limited::new(res.into_body(), MAX_BODY_BYTES);
    let collected = BodyExt::collect(limited_body)
        .await
        .map_err(|e| RelayInfoError::Http(e.to_string()))?;
    let bytes = collected.to_bytes();

    let info: RelayInfo =
        serde_json::from_slice(&bytes).map_err(|e| RelayInfoError::Parse(e.to_string()))?;

    debug!(
        "Got NIP-11 for {}: supported_nips={:?}",
        relay_url, info.supported_nips
    );

    Ok(info)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayInfoError {
    #[error("Invalid relay URL")]
    InvalidUrl,
    #[error("TLS initialization error")]
    TlsError,
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("HTTP status: {0}")]
    HttpStatus(u16),
    #[error("Parse error: {0}")]
    Parse(String),
}
