use partasklib::{
    batch, Batch, BatchError, Callbacks, ManagerOptions, Row, RunEvent, RunOutcome, WorkerManager,
};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
enum Arg {
    Name(String),
    Size(u32),
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn describe(row: &Row<'_, Arg>) -> Result<String, String> {
    match (row.get("name"), row.get("size")) {
        (Some(Arg::Name(name)), Some(Arg::Size(size))) => Ok(format!("{name}:{size}")),
        other => Err(format!("unexpected arguments {other:?}")),
    }
}

fn files(count: u32) -> Result<Batch<Arg>, BatchError> {
    batch! {
        "name" => (0..count).map(|i| Arg::Name(format!("file{i}"))),
        "size" => (0..count).map(|i| Arg::Size(i * 10)),
    }
}

#[test]
fn every_column_reaches_the_task_function() -> Result<(), BatchError> {
    init_logging();
    let manager = WorkerManager::new();
    manager
        .start(describe, 3, files(10)?, Callbacks::new())
        .expect("Should start");
    let Some(RunOutcome::Finished {
        results,
        failed_results,
    }) = manager.wait()
    else {
        panic!("Run should finish");
    };
    assert!(failed_results.is_empty());

    let by_name: BTreeMap<String, String> = results
        .pairs()
        .map(|(row, result)| (format!("{:?}", row["name"]), result.clone()))
        .collect();
    assert_eq!(by_name.len(), 10);
    for i in 0..10 {
        assert_eq!(
            by_name[&format!("{:?}", Arg::Name(format!("file{i}")))],
            format!("file{i}:{}", i * 10)
        );
    }
    Ok(())
}

#[test]
fn managers_do_not_share_runs() -> Result<(), BatchError> {
    init_logging();
    let slow = WorkerManager::with_options(
        ManagerOptions::default().with_thread_name_prefix("slow"),
    );
    let fast = WorkerManager::with_options(
        ManagerOptions::default().with_thread_name_prefix("fast"),
    );

    let slow_count = |row: &Row<'_, u64>| {
        std::thread::sleep(Duration::from_millis(30));
        Ok::<_, String>(row["n"] + 1)
    };
    slow.start(slow_count, 2, batch! { "n" => 0..10u64 }?, Callbacks::new())
        .expect("Should start");
    fast.start(
        |row: &Row<'_, u64>| Ok::<_, String>(row["n"] * 3),
        4,
        batch! { "n" => 0..100u64 }?,
        Callbacks::new(),
    )
    .expect("Should start while another manager is busy");

    let fast_outcome = fast.wait().expect("Fast run should end");
    assert!(slow.is_running(), "The slow run should still be going");
    assert_eq!(fast_outcome.results().map(|results| results.len()), Some(100));

    let slow_outcome = slow.wait().expect("Slow run should end");
    let mut slow_results = slow_outcome.results().expect("Slow run should finish").results.clone();
    slow_results.sort_unstable();
    assert_eq!(slow_results, (1..=10).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn worker_threads_are_named_after_their_partition() -> Result<(), BatchError> {
    init_logging();
    let manager = WorkerManager::with_options(
        ManagerOptions::default().with_thread_name_prefix("named"),
    );
    let names = Arc::new(Mutex::new(Vec::new()));
    let seen = names.clone();
    let record_thread = move |row: &Row<'_, i32>| {
        let name = std::thread::current().name().unwrap_or_default().to_string();
        seen.lock().expect("names").push(name);
        Ok::<_, String>(row["x"])
    };
    manager
        .start(record_thread, 2, batch! { "x" => 0..4 }?, Callbacks::new())
        .expect("Should start");
    manager.wait();

    let mut names = names.lock().expect("names").clone();
    names.sort();
    names.dedup();
    assert_eq!(names, vec!["named-worker-0", "named-worker-1"]);
    Ok(())
}

#[tokio::test]
async fn async_subscribers_get_the_outcome() -> Result<(), BatchError> {
    init_logging();
    let manager = WorkerManager::new();
    let mut events = manager.subscribe();
    manager
        .start(
            |row: &Row<'_, i32>| {
                if row["x"] % 5 == 0 {
                    Err(format!("{} is a multiple of five", row["x"]))
                } else {
                    Ok(row["x"])
                }
            },
            5,
            batch! { "x" => 1..=20 }?,
            Callbacks::new(),
        )
        .expect("Should start");

    let mut exceptions = 0;
    let finished = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match events.recv().await {
                Ok(RunEvent::ThreadException { inputs, error }) => {
                    exceptions += 1;
                    assert_eq!(&inputs["x"], &[5, 10, 15, 20]);
                    assert_eq!(error.partition, 4);
                    assert_eq!(error.row, 4);
                }
                Ok(RunEvent::Finished {
                    results,
                    failed_results,
                }) => return Some((results, failed_results)),
                Ok(RunEvent::Cancelled) => return None,
                Ok(_) => {}
                Err(err) => panic!("Subscriber failed: {err}"),
            }
        }
    })
    .await
    .expect("Run should end in time");

    let (results, failed_results) = finished.expect("Run should finish, not cancel");
    assert_eq!(exceptions, 1);
    assert_eq!(results.len(), 16);
    assert_eq!(failed_results.len(), 4);
    Ok(())
}
