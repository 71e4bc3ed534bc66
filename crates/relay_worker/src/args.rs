use std::collections::BTreeSet;
use std::time::Duration;

use enostr::{Filter, Note};
use tracing::error;

use crate::{job::Job, WorkerConfig};

/// Command line for the standalone worker binary
#[derive(Debug, Default)]
pub struct Args {
    pub relay: Option<String>,
    pub jobs: Vec<Job>,
    pub subscriptions: Vec<(String, Vec<Filter>)>,
    pub publish: Option<Note>,
    pub fetch_info: bool,
    pub config: WorkerConfig,
    pub run_for: Option<Duration>,
}

impl Args {
    // parse arguments, return set of unrecognized args
    pub fn parse(args: &[String]) -> (Self, BTreeSet<String>) {
        let mut unrecognized_args = BTreeSet::new();
        let mut res = Args::default();

        let mut i = 0;
        let len = args.len();
        while i < len {
            let arg = &args[i];

            if arg == "-r" || arg == "--relay" {
                i += 1;
                let Some(relay) = args.get(i) else {
                    error!("relay argument missing?");
                    continue;
                };
                res.relay = Some(relay.clone());
            } else if arg == "--profile"
                || arg == "--contacts"
                || arg == "--event"
                || arg == "--article"
                || arg == "--badge"
            {
                i += 1;
                let Some(identifier) = args.get(i) else {
                    error!("{arg} argument missing?");
                    continue;
                };
                res.jobs.push(match arg.as_str() {
                    "--profile" => Job::profile(identifier.as_str()),
                    "--contacts" => Job::contacts(identifier.as_str()),
                    "--event" => Job::event(identifier.as_str()),
                    "--article" => Job::article(identifier.as_str()),
                    _ => Job::badge_definition(identifier.as_str()),
                });
            } else if arg == "--subscribe" {
                let (Some(id), Some(filter)) = (args.get(i + 1), args.get(i + 2)) else {
                    error!("--subscribe needs <id> <filter-json>");
                    i += 3;
                    continue;
                };
                i += 2;
                match parse_filters(filter) {
                    Ok(filters) => res.subscriptions.push((id.clone(), filters)),
                    Err(err) => error!("failed to parse filter for subscription {id}: {err}"),
                }
            } else if arg == "--publish" {
                i += 1;
                let Some(json) = args.get(i) else {
                    error!("publish argument missing?");
                    continue;
                };
                match Note::from_json(json) {
                    Ok(note) => res.publish = Some(note),
                    Err(err) => error!("failed to parse event to publish: {err}"),
                }
            } else if arg == "--info" {
                res.fetch_info = true;
            } else if arg == "--debounce-ms" {
                i += 1;
                if let Some(ms) = parse_number(args.get(i), arg) {
                    res.config = res.config.with_drain_debounce(Duration::from_millis(ms));
                }
            } else if arg == "--batch-size" {
                i += 1;
                if let Some(size) = parse_number(args.get(i), arg) {
                    res.config = res.config.with_max_batch_size(size as usize);
                }
            } else if arg == "--contacts-timeout" {
                i += 1;
                if let Some(secs) = parse_number(args.get(i), arg) {
                    res.config = res.config.with_contacts_timeout(Duration::from_secs(secs));
                }
            } else if arg == "--run-for" {
                i += 1;
                if let Some(secs) = parse_number(args.get(i), arg) {
                    res.run_for = Some(Duration::from_secs(secs));
                }
            } else {
                unrecognized_args.insert(arg.clone());
            }

            i += 1;
        }

        (res, unrecognized_args)
    }
}

/// A single filter object or an array of them
fn parse_filters(json: &str) -> Result<Vec<Filter>, serde_json::Error> {
    if json.trim_start().starts_with('[') {
        serde_json::from_str(json)
    } else {
        serde_json::from_str(json).map(|filter| vec![filter])
    }
}

fn parse_number(value: Option<&String>, arg: &str) -> Option<u64> {
    let Some(value) = value else {
        error!("{arg} argument missing?");
        return None;
    };

    match value.parse() {
        Ok(n) => Some(n),
        Err(err) => {
            error!("failed to parse {arg} value '{value}': {err}");
            None
        }
    }
}
