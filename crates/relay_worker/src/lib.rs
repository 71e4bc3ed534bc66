mod adhoc;
pub mod args;
mod config;
mod connection;
mod cycle;
mod download;
mod error;
mod job;
pub mod policy;
mod publish;
mod queue;
pub mod report;
mod runner;
mod scheduler;
mod timers;
mod worker;

#[cfg(test)]
mod test_utils;

pub use adhoc::{AdHocSubscription, AdHocSubscriptions};
pub use args::Args;
pub use config::WorkerConfig;
pub use connection::Connection;
pub use cycle::{CycleState, Cycles, Resolution, SubscriptionHandle};
pub use download::{Download, Downloads};
pub use error::Error;
pub use job::{Category, Job};
pub use publish::PublishOutcome;
pub use queue::{CategoryQueue, QueueSet};
pub use report::{RelayResponse, Reporter, ResponseBody};
pub use runner::{spawn_with, spawn_worker, NotifyWakeup, Responses, WorkerHandle};
pub use timers::{TimerKey, Timers};
pub use worker::{CapabilityRequest, RelayWorker, WorkerCommand};

pub type Result<T> = std::result::Result<T, error::Error>;
