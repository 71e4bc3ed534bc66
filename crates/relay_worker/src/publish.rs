use std::time::Instant;

use enostr::{kinds, ClientMessage, CommandResult, Note, RelayTransport};
use hashbrown::HashSet;
use tracing::{debug, error, info, warn};

use crate::{timers::TimerKey, worker::RelayWorker};

/// Kinds only sent to relays that advertise parameterized replaceable events
const RESTRICTED_KINDS: [u64; 3] = [
    kinds::LONG_FORM,
    kinds::PROFILE_BADGES,
    kinds::BADGE_DEFINITION,
];

const PARAMETERIZED_REPLACEABLE_NIP: u32 = 33;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Sent, waiting for the relay's `OK`
    Sent,
    /// The relay can't store this kind
    Skipped,
    Failed,
}

/// Events sent and not yet acknowledged
#[derive(Debug, Default)]
pub struct PendingPublishes {
    pending: HashSet<String>,
}

impl PendingPublishes {
    pub fn insert(&mut self, event_id: String) {
        self.pending.insert(event_id);
    }

    pub fn remove(&mut self, event_id: &str) -> bool {
        self.pending.remove(event_id)
    }

    pub fn contains(&self, event_id: &str) -> bool {
        self.pending.contains(event_id)
    }

    pub fn drain(&mut self) -> Vec<String> {
        let mut ids: Vec<String> = self.pending.drain().collect();
        ids.sort();
        ids
    }
}

/// A connection opened only to publish one event
#[derive(Debug, Clone)]
pub struct OneShot {
    /// Taken once the connection opens
    note: Option<Note>,
    event_id: String,
}

impl OneShot {
    pub fn new(note: Note) -> Self {
        Self {
            event_id: note.id.clone(),
            note: Some(note),
        }
    }

    pub fn take_note(&mut self) -> Option<Note> {
        self.note.take()
    }
}

impl<T: RelayTransport> RelayWorker<T> {
    /// Send `note` to the relay. Long-form and badge events are skipped
    /// unless the relay's NIP-11 document lists NIP-33.
    pub fn publish(&mut self, note: Note, now: Instant) -> PublishOutcome {
        if let Some(reason) = self.publish_restriction(&note) {
            self.reporter.skipped(note.id, reason);
            return PublishOutcome::Skipped;
        }

        let event_id = note.id.clone();
        if let Err(err) = self.conn.send(&ClientMessage::event(note)) {
            error!("{}: failed to publish {event_id}: {err}", self.url());
            self.reporter.failure(err.to_string());
            return PublishOutcome::Failed;
        }

        debug!("{}: published {event_id}, waiting for OK", self.url());
        self.timers.set_after(
            TimerKey::Publish(event_id.clone()),
            now,
            self.config.publish_timeout,
        );
        self.publishes.insert(event_id);
        PublishOutcome::Sent
    }

    fn publish_restriction(&self, note: &Note) -> Option<String> {
        if !RESTRICTED_KINDS.contains(&note.kind) {
            return None;
        }

        match self.conn.capability_info() {
            None => Some(
                "This relay does not return NIP-11 metadata. Article/Badge will not be published here."
                    .to_owned(),
            ),
            Some(info) if !info.supports_nip(PARAMETERIZED_REPLACEABLE_NIP) => Some(
                "This relay does not support NIP-33. Article/Badge will not be published here."
                    .to_owned(),
            ),
            Some(_) => {
                debug!("{}: supports NIP-33, publishing kind {}", self.url(), note.kind);
                None
            }
        }
    }

    pub fn is_publish_pending(&self, event_id: &str) -> bool {
        self.publishes.contains(event_id)
    }

    pub(crate) fn publish_acknowledged(&mut self, result: CommandResult) {
        if !self.publishes.remove(&result.event_id) {
            debug!("{}: OK for unknown event {}", self.url(), result.event_id);
            return;
        }
        self.timers.cancel(&TimerKey::Publish(result.event_id.clone()));

        if result.accepted {
            info!("{} has accepted our event {}", self.url(), result.event_id);
        } else {
            self.reporter.failure(result.message);
        }

        self.finish_one_shot_if(&result.event_id);
    }

    pub(crate) fn publish_timed_out(&mut self, event_id: &str) {
        if !self.publishes.remove(event_id) {
            return;
        }
        warn!("{}: no OK for {event_id}", self.url());
        self.reporter.failure("publish timed out".to_owned());
        self.finish_one_shot_if(event_id);
    }

    pub(crate) fn start_one_shot(&mut self, note: Note, now: Instant) {
        match self.publish(note, now) {
            PublishOutcome::Sent => {}
            PublishOutcome::Skipped | PublishOutcome::Failed => self.finish_one_shot(),
        }
    }

    fn finish_one_shot_if(&mut self, event_id: &str) {
        let ours = self
            .one_shot
            .as_ref()
            .is_some_and(|one_shot| one_shot.event_id == event_id);
        if ours {
            self.finish_one_shot();
        }
    }

    /// Close the one-shot connection. Teardown reports `terminated`.
    fn finish_one_shot(&mut self) {
        debug!("{}: one-shot publish finished", self.url());
        self.disconnect();
    }
}
