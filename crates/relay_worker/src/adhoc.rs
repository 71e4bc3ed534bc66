use enostr::{ClientMessage, Filter, RelayReqId, RelayTransport};
use hashbrown::HashMap;
use tracing::{debug, error, info, warn};

use crate::{
    job::Category,
    worker::{RelayWorker, Route},
};

/// A host-requested subscription that stays open until unsubscribed
#[derive(Debug, Clone, PartialEq)]
pub struct AdHocSubscription {
    pub sub_id: RelayReqId,
    pub filters: Vec<Filter>,
}

/// Open ad-hoc subscriptions keyed by the host's id
#[derive(Debug, Default)]
pub struct AdHocSubscriptions {
    subs: HashMap<String, AdHocSubscription>,
}

impl AdHocSubscriptions {
    pub fn contains(&self, id: &str) -> bool {
        self.subs.contains_key(id)
    }

    pub fn insert(&mut self, id: String, sub: AdHocSubscription) {
        self.subs.insert(id, sub);
    }

    pub fn remove(&mut self, id: &str) -> Option<AdHocSubscription> {
        self.subs.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&AdHocSubscription> {
        self.subs.get(id)
    }

    /// Forget everything, returning how many were open
    pub fn clear(&mut self) -> usize {
        let count = self.subs.len();
        self.subs.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.subs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subs.is_empty()
    }
}

impl<T: RelayTransport> RelayWorker<T> {
    /// Open a long-lived subscription. Events on it are reported tagged
    /// with `id`. While the connection is not open the request is queued
    /// and replayed once it is.
    pub fn subscribe(&mut self, filters: Vec<Filter>, id: impl Into<String>) {
        let id = id.into();

        if !self.conn.is_open() {
            warn!(
                "{}: not connected, scheduling subscription {id} for later",
                self.url()
            );
            self.queues.enqueue_subscription(id, filters);
            return;
        }

        if self.adhoc.contains(&id) {
            info!("{}: subscription {id} already added", self.url());
            return;
        }

        let sub_id = RelayReqId::default();
        if let Err(err) = self
            .conn
            .send(&ClientMessage::req(sub_id.clone(), filters.clone()))
        {
            error!("{}: failed to subscribe {id}: {err}", self.url());
            self.queues.enqueue_subscription(id, filters);
            return;
        }

        debug!("{}: subscription {id} opened as {sub_id}", self.url());
        self.routes.insert(sub_id.clone(), Route::AdHoc(id.clone()));
        self.adhoc.insert(id, AdHocSubscription { sub_id, filters });
    }

    /// Close subscription `id`, including any copy still waiting in the queue
    pub fn unsubscribe(&mut self, id: &str) {
        let queued = self
            .queues
            .get_mut(Category::AdHocSubscription)
            .remove(id);

        let Some(sub) = self.adhoc.remove(id) else {
            if queued == 0 {
                debug!("{}: unsubscribe of unknown subscription {id}", self.url());
            }
            return;
        };

        self.routes.remove(sub.sub_id.as_str());
        if let Err(err) = self.conn.send(&ClientMessage::close(sub.sub_id)) {
            debug!("{}: could not close {id}: {err}", self.url());
        }
        info!("{}: unsubscribed {id}", self.url());
    }

    pub fn is_subscribed(&self, id: &str) -> bool {
        self.adhoc.contains(id)
    }

    /// Replay subscriptions requested while the connection was down
    pub(crate) fn replay_subscriptions(&mut self) {
        let jobs = self
            .queues
            .get_mut(Category::AdHocSubscription)
            .take_all();

        for job in jobs {
            self.subscribe(job.filters.unwrap_or_default(), job.identifier);
        }
    }
}
