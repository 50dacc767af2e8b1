#![deny(clippy::all)]

mod cli_options;

use cli_options::{print_cli_help, print_cli_info, Command, Options, VERSION};
use log::{debug, error, info, trace, warn};
use partasklib::{batch, Callbacks, Row, RunEvent, WorkerManager};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

type Manager = WorkerManager<i64, i64>;

fn make_task(options: &Options) -> impl Fn(&Row<'_, i64>) -> Result<i64, String> + Send + Sync {
    let fail_on = options.fail_on;
    let delay = options.delay;
    move |row: &Row<'_, i64>| {
        let value = row["value"];
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if Some(value) == fail_on {
            return Err(format!("refusing to double {value}"));
        }
        Ok(value * 2)
    }
}

/// Prints events until the run ends. Returns false if it was cancelled.
async fn report(mut events: tokio::sync::broadcast::Receiver<RunEvent<i64, i64>>) -> bool {
    loop {
        match events.recv().await {
            Ok(RunEvent::Started {
                run,
                partitions,
                tasks,
            }) => println!("run {run}: {tasks} tasks in {partitions} partitions"),
            Ok(RunEvent::Progress(percent)) => println!("{percent:.1}%"),
            Ok(RunEvent::ThreadException { inputs, error }) => {
                println!("partition failed: {error}");
                println!("  lost inputs: {:?}", &inputs["value"]);
            }
            Ok(RunEvent::Finished {
                results,
                failed_results,
            }) => {
                for (row, result) in results.pairs() {
                    println!("{} -> {result}", row["value"]);
                }
                if !failed_results.is_empty() {
                    println!("failed: {:?}", &failed_results["value"]);
                }
                return true;
            }
            Ok(RunEvent::Cancelled) => {
                println!("cancelled");
                return false;
            }
            Err(RecvError::Lagged(missed)) => warn!("Missed {missed} events"),
            Err(RecvError::Closed) => {
                error!("Manager went away before the run ended");
                return false;
            }
        }
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    partasklib::ensure_initialized();
    trace!("\n>>>>>>>>>>>>>>>>>>>>\nStarting partask {VERSION}\n>>>>>>>>>>>>>>>>>>>>\n");

    let options = Options::new(std::env::args());
    debug!("Options: {options:#?}");
    match options.cmd {
        Command::Help => {
            print_cli_help();
            return Ok(());
        }
        Command::Version => {
            print_cli_info();
            return Ok(());
        }
        Command::Run => {}
    }

    let batch = batch! { "value" => 1..=options.count }.map_err(std::io::Error::other)?;
    let manager = Arc::new(Manager::new());
    let events = manager.subscribe();
    manager
        .start(make_task(&options), options.workers, batch, Callbacks::new())
        .map_err(std::io::Error::other)?;

    if let Some(cancel_after) = options.cancel_after {
        let manager = manager.clone();
        tokio::spawn(async move {
            tokio::time::sleep(cancel_after).await;
            info!("Cancelling after {cancel_after:?}");
            // Cancelling waits for the workers to stop.
            if let Err(err) = tokio::task::spawn_blocking(move || manager.cancel()).await {
                error!("Cancelling failed: {err}");
            }
        });
    }

    let finished = report(events).await;
    println!("{}", manager.status().stats);
    if !finished {
        std::process::exit(1);
    }
    Ok(())
}
