use std::time::Duration;

use relay_worker::{spawn_worker, Args, ResponseBody, WorkerHandle};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn setup_logging() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("relay_worker=info"));

    // stdout carries the reports, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn submit(handle: &WorkerHandle, args: Args) -> relay_worker::Result<()> {
    if let Some(note) = args.publish {
        handle.connect_and_publish(note)?;
    } else {
        for job in args.jobs {
            handle.enqueue(job)?;
        }
        for (id, filters) in args.subscriptions {
            handle.subscribe(filters, id)?;
        }
        handle.connect()?;
    }

    if args.fetch_info {
        handle.fetch_capability_info()?;
    }

    Ok(())
}

async fn sleep_or_forever(run_for: Option<Duration>) {
    match run_for {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}

#[tokio::main]
async fn main() {
    setup_logging();

    let raw: Vec<String> = std::env::args().skip(1).collect();
    let (args, unrecognized) = Args::parse(&raw);
    for arg in &unrecognized {
        warn!("unrecognized argument: {arg}");
    }

    let Some(relay) = args.relay.clone() else {
        error!("usage: relay_worker -r <wss://relay> [--profile <pubkey>] [--event <id>] ...");
        std::process::exit(1);
    };

    let run_for = args.run_for;
    let (handle, mut responses, task) = spawn_worker(relay, args.config.clone());

    if let Err(err) = submit(&handle, args) {
        error!("{err}");
        std::process::exit(1);
    }

    let deadline = sleep_or_forever(run_for);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            response = responses.recv() => {
                let Some(response) = response else { break };
                match response.json() {
                    Ok(json) => println!("{json}"),
                    Err(err) => error!("failed to serialize response: {err}"),
                }
                if response.body == ResponseBody::Terminated {
                    break;
                }
            }
            _ = &mut deadline => {
                info!("run time elapsed, shutting down");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                break;
            }
        }
    }

    drop(handle);
    while let Some(response) = responses.recv().await {
        if let Ok(json) = response.json() {
            println!("{json}");
        }
    }
    if let Err(err) = task.await {
        error!("worker task failed: {err}");
    }
}
