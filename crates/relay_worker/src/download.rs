//! One-off downloads: a subscription that closes itself on `EOSE` and
//! reports a timeout with its filters when the relay never finishes.

use std::time::{Duration, Instant};

use enostr::{ClientMessage, Filter, RelayReqId, RelayTransport};
use hashbrown::HashMap;
use tracing::{debug, error, warn};

use crate::{
    timers::TimerKey,
    worker::{RelayWorker, Route},
};

#[derive(Debug, Clone, PartialEq)]
pub struct Download {
    pub sub_id: RelayReqId,
    /// Echoed back in the timeout report so the host knows what was asked
    pub label: String,
    pub filters: Vec<Filter>,
}

/// Downloads in progress keyed by the host's id
#[derive(Debug, Default)]
pub struct Downloads {
    active: HashMap<String, Download>,
}

impl Downloads {
    pub fn contains(&self, id: &str) -> bool {
        self.active.contains_key(id)
    }

    pub fn insert(&mut self, id: String, download: Download) -> Option<Download> {
        self.active.insert(id, download)
    }

    pub fn remove(&mut self, id: &str) -> Option<Download> {
        self.active.remove(id)
    }

    pub fn clear(&mut self) -> usize {
        let count = self.active.len();
        self.active.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

impl<T: RelayTransport> RelayWorker<T> {
    /// Fetch whatever matches `filters` once. Events are reported tagged with
    /// `id`. Unlike [`RelayWorker::subscribe`] nothing is queued while the
    /// connection is down; the request is dropped with a warning.
    pub fn download(
        &mut self,
        filters: Vec<Filter>,
        id: impl Into<String>,
        label: impl Into<String>,
        timeout: Duration,
        now: Instant,
    ) {
        let id = id.into();

        if !self.conn.is_open() {
            warn!(
                "{}: not connected, download {id} cannot be executed at this time",
                self.url()
            );
            return;
        }

        if let Some(previous) = self.downloads.remove(&id) {
            debug!("{}: download {id} restarted", self.url());
            self.close_download(&id, previous.sub_id);
        }

        let sub_id = RelayReqId::default();
        if let Err(err) = self
            .conn
            .send(&ClientMessage::req(sub_id.clone(), filters.clone()))
        {
            error!("{}: failed to start download {id}: {err}", self.url());
            return;
        }

        debug!("{}: download {id} opened as {sub_id}", self.url());
        self.routes.insert(sub_id.clone(), Route::Download(id.clone()));
        self.timers.set_after(TimerKey::Download(id.clone()), now, timeout);
        self.downloads.insert(
            id,
            Download {
                sub_id,
                label: label.into(),
                filters,
            },
        );
    }

    pub fn is_downloading(&self, id: &str) -> bool {
        self.downloads.contains(id)
    }

    /// The relay sent everything it has for download `id`
    pub(crate) fn download_finished(&mut self, id: &str) {
        let Some(download) = self.downloads.remove(id) else {
            return;
        };
        debug!("{}: download {id} complete", self.url());
        self.close_download(id, download.sub_id);
    }

    pub(crate) fn download_timed_out(&mut self, id: &str) {
        let Some(download) = self.downloads.remove(id) else {
            return;
        };
        self.close_download(id, download.sub_id);
        self.reporter.download_timeout(download.label, download.filters);
    }

    /// The relay closed download `id` on its own; nothing goes back
    pub(crate) fn download_closed_by_relay(&mut self, id: &str, reason: &str) {
        let Some(download) = self.downloads.remove(id) else {
            return;
        };
        warn!("{}: download {id} closed by relay: {reason}", self.url());
        self.routes.remove(download.sub_id.as_str());
        self.timers.cancel(&TimerKey::Download(id.to_owned()));
    }

    fn close_download(&mut self, id: &str, sub_id: RelayReqId) {
        self.routes.remove(sub_id.as_str());
        self.timers.cancel(&TimerKey::Download(id.to_owned()));
        if let Err(err) = self.conn.send(&ClientMessage::close(sub_id)) {
            debug!("{}: could not close download {id}: {err}", self.url());
        }
    }
}
