use std::time::{Duration, Instant};

use enostr::{
    Filter, Note, RelayInfo, RelayInfoError, RelayMessage, RelayReqId, RelayStatus,
    RelayTransport, TransportEvent,
};
use hashbrown::HashMap;
use tracing::{debug, error, info, trace, warn};

use crate::{
    adhoc::AdHocSubscriptions,
    connection::Connection,
    cycle::{Cycles, Resolution},
    download::Downloads,
    job::{Category, Job},
    policy::Completion,
    publish::{OneShot, PendingPublishes},
    queue::QueueSet,
    report::{RelayResponse, Reporter},
    timers::{TimerKey, Timers},
    Error, WorkerConfig,
};

/// Who an inbound subscription id belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Route {
    Cycle(Category),
    AdHoc(String),
    Download(String),
}

/// Everything a host can ask of a worker
#[derive(Debug, Clone)]
pub enum WorkerCommand {
    /// Open the connection. With `publish` set the worker publishes that one
    /// event, closes and reports `terminated` instead of draining queues.
    Connect { publish: Option<Note> },
    Disconnect,
    Enqueue(Job),
    Subscribe { id: String, filters: Vec<Filter> },
    Unsubscribe { id: String },
    /// Fetch once and close on `EOSE`. `timeout` falls back to
    /// [`WorkerConfig::download_timeout`].
    Download {
        id: String,
        label: String,
        filters: Vec<Filter>,
        timeout: Option<Duration>,
    },
    Publish(Note),
    FetchCapabilityInfo,
}

/// Returned when the host should fetch the relay's NIP-11 document and hand
/// the result to [`RelayWorker::capability_info_fetched`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityRequest {
    pub relay_url: String,
}

/// All the state for one relay connection.
///
/// The worker never sleeps or spawns. Time comes in through `now`
/// arguments, transport events through [`RelayWorker::poll_transport`], and
/// reports go out through [`RelayWorker::next_response`].
pub struct RelayWorker<T> {
    pub(crate) conn: Connection<T>,
    pub(crate) config: WorkerConfig,
    pub(crate) queues: QueueSet,
    pub(crate) cycles: Cycles,
    pub(crate) adhoc: AdHocSubscriptions,
    pub(crate) downloads: Downloads,
    pub(crate) routes: HashMap<RelayReqId, Route>,
    pub(crate) timers: Timers,
    pub(crate) publishes: PendingPublishes,
    pub(crate) one_shot: Option<OneShot>,
    pub(crate) reporter: Reporter,
}

impl<T: RelayTransport> RelayWorker<T> {
    pub fn new(url: impl Into<String>, transport: T, config: WorkerConfig) -> Self {
        let url = url.into();
        Self {
            reporter: Reporter::new(url.clone()),
            conn: Connection::new(url, transport),
            config,
            queues: QueueSet::default(),
            cycles: Cycles::default(),
            adhoc: AdHocSubscriptions::default(),
            downloads: Downloads::default(),
            routes: HashMap::new(),
            timers: Timers::default(),
            publishes: PendingPublishes::default(),
            one_shot: None,
        }
    }

    pub fn url(&self) -> &str {
        self.conn.url()
    }

    pub fn status(&self) -> RelayStatus {
        self.conn.status()
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_open()
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn capability_info(&self) -> Option<&RelayInfo> {
        self.conn.capability_info()
    }

    pub fn queued(&self, category: Category) -> usize {
        self.queues.get(category).len()
    }

    pub fn in_flight(&self, category: Category) -> bool {
        self.cycles.in_flight(category)
    }

    /// The batch `category` currently has on the wire
    pub fn in_flight_batch(&self, category: Category) -> Option<&[String]> {
        self.cycles
            .get(category)
            .handle()
            .map(|handle| handle.batch.as_slice())
    }

    pub fn transport(&self) -> &T {
        self.conn.transport()
    }

    pub fn transport_mut(&mut self) -> &mut T {
        self.conn.transport_mut()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    pub fn next_response(&mut self) -> Option<RelayResponse> {
        self.reporter.pop()
    }

    pub fn drain_responses(&mut self) -> Vec<RelayResponse> {
        self.reporter.drain().collect()
    }

    pub fn handle_command(
        &mut self,
        cmd: WorkerCommand,
        now: Instant,
    ) -> Option<CapabilityRequest> {
        match cmd {
            WorkerCommand::Connect { publish } => self.connect(publish),
            WorkerCommand::Disconnect => self.disconnect(),
            WorkerCommand::Enqueue(job) => {
                if let Err(err) = self.enqueue(job, now) {
                    error!("{}: {err}", self.url());
                }
            }
            WorkerCommand::Subscribe { id, filters } => self.subscribe(filters, id),
            WorkerCommand::Unsubscribe { id } => self.unsubscribe(&id),
            WorkerCommand::Download {
                id,
                label,
                filters,
                timeout,
            } => {
                let timeout = timeout.unwrap_or(self.config.download_timeout);
                self.download(filters, id, label, timeout, now);
            }
            WorkerCommand::Publish(note) => {
                self.publish(note, now);
            }
            WorkerCommand::FetchCapabilityInfo => return self.fetch_capability_info(),
        }
        None
    }

    pub fn connect(&mut self, publish: Option<Note>) {
        if self.conn.status() != RelayStatus::Disconnected {
            warn!(
                "{}: connect requested while {:?}, ignoring",
                self.url(),
                self.conn.status()
            );
            return;
        }

        self.one_shot = publish.map(OneShot::new);
        info!("{}: connecting", self.url());

        if let Err(err) = self.conn.begin_connect() {
            self.connect_failed(&err.to_string());
        }
    }

    fn connect_failed(&mut self, reason: &str) {
        self.one_shot = None;
        self.reporter.error(format!("Unable to connect. {reason}"));
    }

    /// Close the connection from our side. Queued jobs survive for the next
    /// connect; everything tied to the wire is dropped.
    pub fn disconnect(&mut self) {
        let was_open = self.conn.is_open();
        if !self.conn.close() {
            debug!("{}: already closed", self.url());
            return;
        }
        info!("{}: closed", self.url());
        self.teardown(was_open);
    }

    fn connection_lost(&mut self, reason: &str) {
        self.conn.mark_closed();
        info!("{}: DISCONNECTED! {reason}", self.url());
        self.teardown(true);
    }

    /// `was_open` is false when the handshake never finished, in which case
    /// no closed status is reported since no open status ever was.
    fn teardown(&mut self, was_open: bool) {
        for handle in self.cycles.take_all() {
            debug!(
                "{}: dropping in-flight {} batch of {}",
                self.url(),
                handle.category,
                handle.batch.len()
            );
        }

        let dropped = self.adhoc.clear();
        if dropped > 0 {
            debug!("{}: dropped {dropped} ad-hoc subscriptions", self.url());
        }
        let dropped = self.downloads.clear();
        if dropped > 0 {
            debug!("{}: dropped {dropped} downloads", self.url());
        }

        self.routes.clear();
        self.timers.clear();

        for event_id in self.publishes.drain() {
            self.reporter.failure(format!(
                "connection closed before {event_id} was acknowledged"
            ));
        }

        if was_open {
            self.reporter.status(false);
        }

        if self.one_shot.take().is_some() {
            self.reporter.terminated();
        }
    }

    /// Queue a batched lookup. The queues drain after the debounce delay;
    /// further enqueues before then ride along in the same drain.
    pub fn enqueue(&mut self, job: Job, now: Instant) -> Result<(), Error> {
        if !job.category.is_batched() {
            return Err(Error::unsupported(job.category));
        }

        trace!(
            "{}: {} job enqueued: {}",
            self.url(),
            job.category,
            job.identifier
        );
        self.queues.enqueue(job);
        self.timers.arm_after(TimerKey::Drain, now, self.config.drain_debounce);
        Ok(())
    }

    pub fn fetch_capability_info(&mut self) -> Option<CapabilityRequest> {
        match enostr::relay_info::info_url(self.url()) {
            Ok(http_url) => {
                debug!("{}: requesting NIP-11 document from {http_url}", self.url());
                Some(CapabilityRequest {
                    relay_url: self.url().to_owned(),
                })
            }
            Err(err) => {
                self.reporter
                    .info_error(format!("Unable to get NIP-11 data. Status: {err}"));
                None
            }
        }
    }

    pub fn capability_info_fetched(&mut self, result: Result<RelayInfo, RelayInfoError>) {
        match result {
            Ok(info) => {
                info!(
                    "{}: NIP-11 supported_nips={:?}",
                    self.url(),
                    info.supported_nips
                );
                self.conn.set_capability_info(info.clone());
                self.reporter.info(info);
            }
            Err(err) => {
                self.reporter
                    .info_error(format!("Unable to get NIP-11 data. Status: {err}"));
            }
        }
    }

    /// Process everything the transport has buffered
    #[profiling::function]
    pub fn poll_transport(&mut self, now: Instant) {
        while let Some(event) = self.conn.try_recv() {
            self.handle_transport_event(event, now);
        }
    }

    pub fn handle_transport_event(&mut self, event: TransportEvent, now: Instant) {
        match event {
            TransportEvent::Opened => self.opened(now),
            TransportEvent::Closed => self.link_failed("connection closed"),
            TransportEvent::Error(err) => self.link_failed(&err),
            TransportEvent::Message(msg) => {
                if self.conn.is_open() {
                    self.handle_relay_message(msg, now);
                } else {
                    trace!("{}: dropping message while not open", self.url());
                }
            }
        }
    }

    fn opened(&mut self, now: Instant) {
        if self.conn.status() != RelayStatus::Connecting {
            debug!("{}: stray open event while {:?}", self.url(), self.conn.status());
            return;
        }

        self.conn.mark_open();
        info!("{}: connected", self.url());
        self.reporter.status(true);

        match self.one_shot.as_mut().and_then(OneShot::take_note) {
            Some(note) => self.start_one_shot(note, now),
            None => self.drain_all(now),
        }
    }

    fn link_failed(&mut self, reason: &str) {
        match self.conn.status() {
            RelayStatus::Connecting => {
                self.conn.mark_closed();
                self.connect_failed(reason);
            }
            RelayStatus::Connected => self.connection_lost(reason),
            RelayStatus::Disconnected => {
                trace!("{}: {reason} while already closed", self.url());
            }
        }
    }

    #[profiling::function]
    fn handle_relay_message(&mut self, msg: RelayMessage, now: Instant) {
        match msg {
            RelayMessage::Event(sub_id, note) => match self.routes.get(sub_id.as_str()).cloned() {
                Some(Route::Cycle(category)) => {
                    self.reporter.event(note, None);
                    if completion(category) == Some(Completion::FirstEvent) {
                        let expected = Some(sub_id.as_str());
                        self.resolve(category, expected, Resolution::FirstEvent, now);
                    }
                }
                Some(Route::AdHoc(id)) | Some(Route::Download(id)) => {
                    self.reporter.event(note, Some(id))
                }
                None => trace!("{}: event for unknown subscription {sub_id}", self.url()),
            },

            RelayMessage::Eose(sub_id) => match self.routes.get(sub_id.as_str()).cloned() {
                Some(Route::Cycle(category)) => {
                    if completion(category) == Some(Completion::EndOfStoredEvents) {
                        let expected = Some(sub_id.as_str());
                        self.resolve(category, expected, Resolution::EndOfStoredEvents, now);
                    } else {
                        trace!("{}: ignoring EOSE for {category}", self.url());
                    }
                }
                Some(Route::AdHoc(id)) => debug!("{}: EOSE on subscription {id}", self.url()),
                Some(Route::Download(id)) => self.download_finished(&id),
                None => trace!("{}: EOSE for unknown subscription {sub_id}", self.url()),
            },

            RelayMessage::Closed(sub_id, reason) => {
                match self.routes.get(sub_id.as_str()).cloned() {
                    Some(Route::Cycle(category)) => {
                        let resolution = Resolution::ClosedByRelay(reason);
                        self.resolve(category, Some(sub_id.as_str()), resolution, now);
                    }
                    Some(Route::AdHoc(id)) => {
                        warn!("{}: subscription {id} closed by relay: {reason}", self.url());
                        self.routes.remove(sub_id.as_str());
                        self.adhoc.remove(&id);
                    }
                    Some(Route::Download(id)) => self.download_closed_by_relay(&id, &reason),
                    None => trace!("{}: CLOSED for unknown subscription {sub_id}", self.url()),
                }
            }

            RelayMessage::Notice(msg) => self.reporter.notice(msg),

            RelayMessage::Ok(result) => self.publish_acknowledged(result),
        }
    }

    /// Fire every timer due at `now`
    pub fn tick(&mut self, now: Instant) {
        while let Some(key) = self.timers.pop_expired(now) {
            match key {
                TimerKey::Drain => self.drain_all(now),
                TimerKey::Cycle(category) => self.resolve(category, None, Resolution::Timeout, now),
                TimerKey::Publish(event_id) => self.publish_timed_out(&event_id),
                TimerKey::Download(id) => self.download_timed_out(&id),
            }
        }
    }
}

fn completion(category: Category) -> Option<Completion> {
    category.policy().map(|policy| policy.completion)
}
