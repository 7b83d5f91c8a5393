//! Change flow tests
//!
//! A modification on disk must reach the context aggregator and every
//! subscriber exactly once, in order, with ignored paths filtered out.

use crate::common::{
    assert_event, assert_file_changed, drain_outbox, outbox_until, start_daemon, TestRepo,
};

fn is_file_changed(value: &serde_json::Value, filename: &str) -> bool {
    value["event"] == "file_changed" && value["filename"] == filename
}

#[tokio::test]
async fn test_modification_reaches_aggregator_and_subscribers() {
    let repo = TestRepo::with_sample_project();
    let (daemon, aggregator) = start_daemon();
    let state = daemon.state();
    let (_id, mut outbox) = state.subscribers().register(None);

    state.watch_project(repo.path().to_path_buf()).await.unwrap();
    repo.append_to("a.txt", "more\n");

    let seen = outbox_until(&mut outbox, |v| is_file_changed(v, "a.txt")).await;
    assert_event(&seen[0], "project_added");
    let changed = seen.last().unwrap();
    assert_file_changed(changed, "a.txt");
    let expected_path = repo.canonical_path().join("a.txt");
    assert_eq!(changed["path"], &*expected_path.to_string_lossy());
    assert_eq!(changed["project"], &*repo.canonical_path().to_string_lossy());

    // Nothing else trails behind it
    let rest = drain_outbox(&mut outbox).await;
    assert!(
        rest.iter().all(|v| !is_file_changed(v, "a.txt")),
        "Duplicate change records: {:?}",
        rest
    );

    let records = aggregator.records();
    assert_eq!(records.len(), 1, "Aggregator saw {:?}", records);
    assert_eq!(records[0].path, expected_path);

    let metrics = state.metrics().snapshot();
    assert_eq!(metrics.changes_detected, 1);
    assert_eq!(metrics.last_activity, Some(records[0].timestamp));

    daemon.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_ignored_directories_produce_no_records() {
    let repo = TestRepo::with_sample_project();
    let (daemon, aggregator) = start_daemon();
    let state = daemon.state();
    let (_id, mut outbox) = state.subscribers().register(None);

    state.watch_project(repo.path().to_path_buf()).await.unwrap();
    repo.append_to("node_modules/pkg/index.js", "// touched\n");
    repo.append_to(".git/HEAD", "\n");
    repo.append_to("target/debug/app", "more\n");
    // Same source, so this arrives after anything the writes above produced
    repo.append_to("src/main.rs", "// edit\n");

    let seen = outbox_until(&mut outbox, |v| is_file_changed(v, "main.rs")).await;
    let changed: Vec<_> = seen
        .iter()
        .filter(|v| v["event"] == "file_changed")
        .collect();
    assert_eq!(changed.len(), 1, "Unexpected records: {:?}", changed);
    assert_eq!(aggregator.filenames(), vec!["main.rs".to_string()]);

    daemon.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_changes_keep_their_order() {
    let repo = TestRepo::new();
    for n in 0..5 {
        repo.add_file(&format!("f{n}.txt"), "x");
    }
    let (daemon, aggregator) = start_daemon();
    let state = daemon.state();
    let (_id, mut outbox) = state.subscribers().register(None);
    state.watch_project(repo.path().to_path_buf()).await.unwrap();

    for n in 0..5 {
        repo.append_to(&format!("f{n}.txt"), "y");
    }

    let seen = outbox_until(&mut outbox, |v| is_file_changed(v, "f4.txt")).await;
    let names: Vec<&str> = seen
        .iter()
        .filter(|v| v["event"] == "file_changed")
        .filter_map(|v| v["filename"].as_str())
        .collect();
    assert_eq!(names, vec!["f0.txt", "f1.txt", "f2.txt", "f3.txt", "f4.txt"]);
    assert_eq!(aggregator.filenames(), names);

    daemon.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_broken_subscriber_does_not_block_healthy_one() {
    let repo = TestRepo::with_sample_project();
    let (daemon, _aggregator) = start_daemon();
    let state = daemon.state();
    let (broken, broken_outbox) = state.subscribers().register(None);
    let (healthy, mut healthy_outbox) = state.subscribers().register(None);
    drop(broken_outbox);

    state.watch_project(repo.path().to_path_buf()).await.unwrap();
    repo.append_to("a.txt", "again\n");

    outbox_until(&mut healthy_outbox, |v| is_file_changed(v, "a.txt")).await;
    assert!(!state.subscribers().contains(&broken));
    assert!(state.subscribers().contains(&healthy));

    daemon.shutdown().await.unwrap();
}
