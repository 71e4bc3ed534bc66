#![cfg(test)]

use std::collections::VecDeque;
use std::time::Instant;

use enostr::{
    ClientMessage, Error, Filter, Note, RelayMessage, RelayReqId, RelayTransport, TransportEvent,
};

use crate::{RelayWorker, WorkerConfig};

pub const URL: &str = "wss://relay.example.com";

/// Records everything sent and replays scripted inbound events
#[derive(Debug, Default)]
pub struct MockTransport {
    pub connects: Vec<String>,
    pub sent: Vec<ClientMessage>,
    pub inbound: VecDeque<TransportEvent>,
    pub closes: usize,
    pub fail_connect: bool,
    pub fail_send: bool,
}

impl MockTransport {
    pub fn push(&mut self, event: TransportEvent) {
        self.inbound.push_back(event);
    }

    pub fn push_message(&mut self, msg: RelayMessage) {
        self.push(TransportEvent::Message(msg));
    }

    pub fn reqs(&self) -> Vec<(RelayReqId, Vec<Filter>)> {
        self.sent
            .iter()
            .filter_map(|msg| match msg {
                ClientMessage::Req { sub_id, filters } => Some((sub_id.clone(), filters.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn closes_sent(&self) -> Vec<RelayReqId> {
        self.sent
            .iter()
            .filter_map(|msg| match msg {
                ClientMessage::Close { sub_id } => Some(sub_id.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn events_sent(&self) -> Vec<Note> {
        self.sent
            .iter()
            .filter_map(|msg| match msg {
                ClientMessage::Event(note) => Some(note.clone()),
                _ => None,
            })
            .collect()
    }
}

impl RelayTransport for MockTransport {
    fn connect(&mut self, url: &str) -> enostr::Result<()> {
        if self.fail_connect {
            return Err(Error::InvalidRelayUrl);
        }
        self.connects.push(url.to_owned());
        Ok(())
    }

    fn close(&mut self) {
        self.closes += 1;
    }

    fn send(&mut self, msg: &ClientMessage) -> enostr::Result<()> {
        if self.fail_send {
            return Err(Error::Websocket("send failed".into()));
        }
        self.sent.push(msg.clone());
        Ok(())
    }

    fn try_recv(&mut self) -> Option<TransportEvent> {
        self.inbound.pop_front()
    }
}

pub fn note(id: &str, kind: u64) -> Note {
    Note {
        id: id.to_owned(),
        pubkey: "pk".to_owned(),
        created_at: 1_700_000_000,
        kind,
        tags: vec![],
        content: String::new(),
        sig: "sig".to_owned(),
    }
}

/// A worker whose connection is already open, with the open status report
/// consumed
pub fn open_worker(config: WorkerConfig) -> (RelayWorker<MockTransport>, Instant) {
    let now = Instant::now();
    let mut worker = RelayWorker::new(URL, MockTransport::default(), config);

    worker.connect(None);
    worker.transport_mut().push(TransportEvent::Opened);
    worker.poll_transport(now);
    worker.drain_responses();

    (worker, now)
}
