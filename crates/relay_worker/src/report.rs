//! Messages a worker hands back to its host. Serialized they look like
//! `{"url":"wss://...","type":"event","data":{...},"subscription":"feed"}`.

use std::collections::VecDeque;

use enostr::{Filter, Note, RelayInfo};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::job::Category;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayResponse {
    pub url: String,
    #[serde(flatten)]
    pub body: ResponseBody,
}

impl RelayResponse {
    pub fn json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ResponseBody {
    /// `1` once open, `0` once closed
    Status { data: u8 },
    Event {
        data: Note,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subscription: Option<String>,
    },
    Notice { data: String },
    Timeout { data: TimeoutData },
    Error { error: String },
    Failure { data: String },
    Terminated,
    Info { data: InfoData },
    Skipped { data: SkippedPublish },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeoutData {
    /// A batched lookup cycle
    Lookup {
        #[serde(rename = "type")]
        category: Category,
        identifier: Vec<String>,
    },
    /// A one-off download
    Download {
        #[serde(rename = "type")]
        label: String,
        filters: Vec<Filter>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InfoData {
    Failed { error: String },
    Document(RelayInfo),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedPublish {
    pub event_id: String,
    pub reason: String,
}

/// Outbound report queue for one relay. Every report is logged as it is
/// queued, prefixed with the relay url.
#[derive(Debug)]
pub struct Reporter {
    url: String,
    pending: VecDeque<RelayResponse>,
}

impl Reporter {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pending: VecDeque::new(),
        }
    }

    fn push(&mut self, body: ResponseBody) {
        self.pending.push_back(RelayResponse {
            url: self.url.clone(),
            body,
        });
    }

    pub fn status(&mut self, open: bool) {
        debug!("{}: reporting status {}", self.url, u8::from(open));
        self.push(ResponseBody::Status {
            data: u8::from(open),
        });
    }

    pub fn event(&mut self, note: Note, subscription: Option<String>) {
        self.push(ResponseBody::Event {
            data: note,
            subscription,
        });
    }

    pub fn notice(&mut self, message: String) {
        info!("{}: NOTICE {}", self.url, message);
        self.push(ResponseBody::Notice { data: message });
    }

    pub fn timeout(&mut self, category: Category, identifier: Vec<String>) {
        warn!(
            "{}: {} lookup of {} identifiers timed out",
            self.url,
            category,
            identifier.len()
        );
        self.push(ResponseBody::Timeout {
            data: TimeoutData::Lookup {
                category,
                identifier,
            },
        });
    }

    pub fn download_timeout(&mut self, label: String, filters: Vec<Filter>) {
        warn!("{}: {} download timed out", self.url, label);
        self.push(ResponseBody::Timeout {
            data: TimeoutData::Download { label, filters },
        });
    }

    pub fn error(&mut self, error: String) {
        error!("{}: {}", self.url, error);
        self.push(ResponseBody::Error { error });
    }

    pub fn failure(&mut self, reason: String) {
        warn!("{}: publish failed: {}", self.url, reason);
        self.push(ResponseBody::Failure { data: reason });
    }

    pub fn terminated(&mut self) {
        debug!("{}: terminated", self.url);
        self.push(ResponseBody::Terminated);
    }

    pub fn info(&mut self, document: RelayInfo) {
        self.push(ResponseBody::Info {
            data: InfoData::Document(document),
        });
    }

    pub fn info_error(&mut self, error: String) {
        warn!("{}: {}", self.url, error);
        self.push(ResponseBody::Info {
            data: InfoData::Failed { error },
        });
    }

    pub fn skipped(&mut self, event_id: String, reason: String) {
        info!("{}: not publishing {}: {}", self.url, event_id, reason);
        self.push(ResponseBody::Skipped {
            data: SkippedPublish { event_id, reason },
        });
    }

    pub fn pop(&mut self) -> Option<RelayResponse> {
        self.pending.pop_front()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = RelayResponse> + '_ {
        self.pending.drain(..)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
