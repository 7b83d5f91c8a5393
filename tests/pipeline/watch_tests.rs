//! Watch registry tests through the daemon entry points

use ghostwatch::error::DaemonError;
use ghostwatch::server::{UnwatchOutcome, WatchOutcome};

use crate::common::{drain_outbox, outbox_until, start_daemon, TestRepo};

#[tokio::test]
async fn test_file_count_skips_ignored_directories() {
    let repo = TestRepo::with_sample_project();
    let (daemon, _aggregator) = start_daemon();
    let state = daemon.state();

    let outcome = state.watch_project(repo.path().to_path_buf()).await.unwrap();
    assert_eq!(
        outcome,
        WatchOutcome::Watching {
            path: repo.canonical_path(),
            files: 3,
        }
    );
    assert_eq!(state.metrics().snapshot().files_watched, 3);

    let projects = state.list_projects();
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].path, repo.canonical_path());
    assert_eq!(projects[0].files, 3);

    daemon.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_double_watch_emits_each_change_once() {
    let repo = TestRepo::with_sample_project();
    let (daemon, aggregator) = start_daemon();
    let state = daemon.state();
    let (_id, mut outbox) = state.subscribers().register(None);

    state.watch_project(repo.path().to_path_buf()).await.unwrap();
    let again = state
        .watch_project(repo.path().join("src").join(".."))
        .await
        .unwrap();
    assert!(matches!(again, WatchOutcome::AlreadyWatching { .. }));
    assert_eq!(state.watches().len(), 1);

    repo.append_to("a.txt", "once\n");
    outbox_until(&mut outbox, |v| v["event"] == "file_changed").await;
    let rest = drain_outbox(&mut outbox).await;
    assert!(
        rest.iter().all(|v| v["event"] != "file_changed"),
        "Duplicate change records: {:?}",
        rest
    );
    assert_eq!(aggregator.records().len(), 1);

    daemon.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unwatch_stops_records() {
    let repo = TestRepo::with_sample_project();
    let (daemon, aggregator) = start_daemon();
    let state = daemon.state();
    let (_id, mut outbox) = state.subscribers().register(None);

    state.watch_project(repo.path().to_path_buf()).await.unwrap();
    let outcome = state.unwatch_project(repo.path().to_path_buf()).await.unwrap();
    assert_eq!(
        outcome,
        UnwatchOutcome::Unwatched {
            path: repo.canonical_path()
        }
    );

    repo.append_to("a.txt", "after unwatch\n");
    let seen = drain_outbox(&mut outbox).await;
    assert!(
        seen.iter().all(|v| v["event"] != "file_changed"),
        "Record after unwatch: {:?}",
        seen
    );
    assert!(aggregator.records().is_empty());

    daemon.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unwatch_unknown_project() {
    let watched = TestRepo::new();
    let other = TestRepo::new();
    let (daemon, _aggregator) = start_daemon();
    let state = daemon.state();

    state.watch_project(watched.path().to_path_buf()).await.unwrap();
    let before = state.watches().projects();

    let outcome = state.unwatch_project(other.path().to_path_buf()).await.unwrap();
    assert!(matches!(outcome, UnwatchOutcome::NotWatching { .. }));
    assert_eq!(state.watches().projects(), before);

    daemon.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_watch_missing_path_is_reported() {
    let repo = TestRepo::new();
    let (daemon, _aggregator) = start_daemon();
    let state = daemon.state();

    let err = state
        .watch_project(repo.path().join("does-not-exist"))
        .await
        .unwrap_err();
    assert!(matches!(err, DaemonError::InvalidPath { .. }));
    assert_eq!(err.error_code(), "invalid_path");
    assert!(state.watches().is_empty());
    assert_eq!(state.metrics().snapshot().files_watched, 0);

    daemon.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_counters_never_decrease() {
    let first = TestRepo::with_sample_project();
    let second = TestRepo::new();
    second.add_file("one.txt", "1");
    let (daemon, _aggregator) = start_daemon();
    let state = daemon.state();
    let (_id, mut outbox) = state.subscribers().register(None);

    state.watch_project(first.path().to_path_buf()).await.unwrap();
    let after_first = state.metrics().snapshot();

    state.watch_project(second.path().to_path_buf()).await.unwrap();
    second.append_to("one.txt", "2");
    outbox_until(&mut outbox, |v| v["event"] == "file_changed").await;
    let after_change = state.metrics().snapshot();

    state.unwatch_project(first.path().to_path_buf()).await.unwrap();
    let after_unwatch = state.metrics().snapshot();

    assert!(after_change.files_watched >= after_first.files_watched);
    assert!(after_change.changes_detected > after_first.changes_detected);
    assert!(after_change.last_activity.is_some());
    assert_eq!(after_unwatch.files_watched, after_change.files_watched);
    assert_eq!(after_unwatch.changes_detected, after_change.changes_detected);

    daemon.shutdown().await.unwrap();
}
