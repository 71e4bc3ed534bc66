//! Drives a [`RelayWorker`] on tokio: host commands come in over a channel,
//! reports go out over another, and the worker's timers and transport are
//! polled whenever any of them might have something to do.

use std::sync::Arc;
use std::time::{Duration, Instant};

use enostr::{
    relay_info::fetch_relay_info, Filter, Note, RelayInfo, RelayInfoError, RelayTransport,
    WebsocketTransport, Wakeup,
};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{
    job::Job,
    report::RelayResponse,
    worker::{RelayWorker, WorkerCommand},
    Error, WorkerConfig,
};

/// Upper bound on how long the loop parks without polling the transport
const IDLE_POLL: Duration = Duration::from_secs(1);

/// Wakes the driver loop when the websocket has frames buffered
#[derive(Clone, Default)]
pub struct NotifyWakeup(Arc<Notify>);

impl NotifyWakeup {
    pub fn notify(&self) -> Arc<Notify> {
        self.0.clone()
    }
}

impl Wakeup for NotifyWakeup {
    fn wake(&self) {
        self.0.notify_one();
    }
}

/// The host's side of a running worker. Dropping every handle disconnects
/// the worker and ends its task.
#[derive(Clone)]
pub struct WorkerHandle {
    url: String,
    commands: mpsc::UnboundedSender<WorkerCommand>,
}

impl WorkerHandle {
    pub fn url(&self) -> &str {
        &self.url
    }

    fn send(&self, cmd: WorkerCommand) -> Result<(), Error> {
        self.commands.send(cmd).map_err(|_| Error::WorkerGone)
    }

    pub fn connect(&self) -> Result<(), Error> {
        self.send(WorkerCommand::Connect { publish: None })
    }

    /// Connect, publish `note`, close, then report `terminated`
    pub fn connect_and_publish(&self, note: Note) -> Result<(), Error> {
        self.send(WorkerCommand::Connect {
            publish: Some(note),
        })
    }

    pub fn disconnect(&self) -> Result<(), Error> {
        self.send(WorkerCommand::Disconnect)
    }

    pub fn enqueue(&self, job: Job) -> Result<(), Error> {
        if !job.category.is_batched() {
            return Err(Error::unsupported(job.category));
        }
        self.send(WorkerCommand::Enqueue(job))
    }

    pub fn subscribe(&self, filters: Vec<Filter>, id: impl Into<String>) -> Result<(), Error> {
        self.send(WorkerCommand::Subscribe {
            id: id.into(),
            filters,
        })
    }

    pub fn unsubscribe(&self, id: impl Into<String>) -> Result<(), Error> {
        self.send(WorkerCommand::Unsubscribe { id: id.into() })
    }

    /// One-off fetch of `filters`, closed on `EOSE`. `label` comes back in
    /// the timeout report.
    pub fn download(
        &self,
        filters: Vec<Filter>,
        id: impl Into<String>,
        label: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<(), Error> {
        self.send(WorkerCommand::Download {
            id: id.into(),
            label: label.into(),
            filters,
            timeout,
        })
    }

    pub fn publish(&self, note: Note) -> Result<(), Error> {
        self.send(WorkerCommand::Publish(note))
    }

    pub fn fetch_capability_info(&self) -> Result<(), Error> {
        self.send(WorkerCommand::FetchCapabilityInfo)
    }
}

pub type Responses = mpsc::UnboundedReceiver<RelayResponse>;

/// Spawn a websocket-backed worker for `url` on the current runtime
pub fn spawn_worker(
    url: impl Into<String>,
    config: WorkerConfig,
) -> (WorkerHandle, Responses, JoinHandle<()>) {
    let wakeup = NotifyWakeup::default();
    let notify = wakeup.notify();
    let worker = RelayWorker::new(url, WebsocketTransport::new(wakeup), config);
    spawn_with(worker, notify)
}

/// Spawn an already built worker. `notify` must be signalled by the
/// transport whenever it has events to receive.
pub fn spawn_with<T>(
    worker: RelayWorker<T>,
    notify: Arc<Notify>,
) -> (WorkerHandle, Responses, JoinHandle<()>)
where
    T: RelayTransport + Send + 'static,
{
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (resp_tx, resp_rx) = mpsc::unbounded_channel();
    let handle = WorkerHandle {
        url: worker.url().to_owned(),
        commands: cmd_tx,
    };

    let task = tokio::spawn(run(worker, cmd_rx, resp_tx, notify));
    (handle, resp_rx, task)
}

async fn run<T: RelayTransport>(
    mut worker: RelayWorker<T>,
    mut commands: mpsc::UnboundedReceiver<WorkerCommand>,
    responses: mpsc::UnboundedSender<RelayResponse>,
    notify: Arc<Notify>,
) {
    let (info_tx, mut info_rx) =
        mpsc::unbounded_channel::<Result<RelayInfo, RelayInfoError>>();

    loop {
        let now = Instant::now();
        worker.poll_transport(now);
        worker.tick(now);
        flush(&mut worker, &responses);

        let wake_at = worker
            .next_deadline()
            .map_or(now + IDLE_POLL, |deadline| deadline.min(now + IDLE_POLL));

        tokio::select! {
            cmd = commands.recv() => {
                let Some(cmd) = cmd else {
                    debug!("{}: every handle dropped, shutting down", worker.url());
                    worker.disconnect();
                    flush(&mut worker, &responses);
                    return;
                };

                if let Some(request) = worker.handle_command(cmd, Instant::now()) {
                    let info_tx = info_tx.clone();
                    tokio::spawn(async move {
                        let result = fetch_relay_info(&request.relay_url).await;
                        if info_tx.send(result).is_err() {
                            debug!("{}: worker gone before NIP-11 arrived", request.relay_url);
                        }
                    });
                }
            }

            Some(result) = info_rx.recv() => worker.capability_info_fetched(result),

            _ = notify.notified() => {}

            _ = tokio::time::sleep_until(wake_at.into()) => {}
        }
    }
}

fn flush<T: RelayTransport>(
    worker: &mut RelayWorker<T>,
    responses: &mpsc::UnboundedSender<RelayResponse>,
) {
    for response in worker.drain_responses() {
        if responses.send(response).is_err() {
            warn!("{}: host stopped listening, dropping reports", worker.url());
            return;
        }
    }
}
