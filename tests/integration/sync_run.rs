//! End-to-end runs of the sync orchestrator over a fake source

use super::support::*;
use std::collections::BTreeSet;
use std::time::Duration;
use tap_applovin::fetcher::FetcherError;
use tap_applovin::output::Message;
use tap_applovin::resume::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore, StateDocument};
use tap_applovin::shutdown::ShutdownCoordinator;
use tap_applovin::sync::{FailureKind, SyncOutcome, SyncPhase};
use tap_applovin::window::ExtractionWindow;
use tap_applovin::REPORTS_STREAM;
use tempfile::TempDir;

fn window(start: (i32, u32, u32), end: (i32, u32, u32)) -> ExtractionWindow {
    ExtractionWindow::new(date(start.0, start.1, start.2), date(end.0, end.1, end.2)).unwrap()
}

#[tokio::test]
async fn test_fresh_run_fetches_three_daily_windows_and_commits_today() {
    let source = FakeSource::new();
    let mut orch = orchestrator(
        planner(3, 0),
        source.clone(),
        MemoryCheckpointStore::default(),
        date(2024, 1, 10),
    );

    let summary = orch.run().await.unwrap();

    let windows: Vec<_> = source.requests().iter().map(|r| r.window).collect();
    assert_eq!(
        windows,
        vec![
            window((2024, 1, 7), (2024, 1, 8)),
            window((2024, 1, 8), (2024, 1, 9)),
            window((2024, 1, 9), (2024, 1, 10)),
        ]
    );
    assert_eq!(summary.windows_planned, 3);
    assert_eq!(summary.windows_committed, 3);
    assert_eq!(summary.records_emitted, 3);
    assert_eq!(summary.bookmark, Some(date(2024, 1, 10)));
    assert_eq!(
        summary.outcome,
        SyncOutcome::Complete {
            synced_through: date(2024, 1, 9)
        }
    );
    assert!(summary.is_success());
    assert_eq!(orch.phase(), SyncPhase::Done);

    let (store, writer) = orch.into_parts();
    assert_eq!(
        store.load(REPORTS_STREAM).unwrap().unwrap().replication_key,
        date(2024, 1, 10)
    );
    assert_eq!(
        message_kinds(&writer),
        vec!["SCHEMA", "RECORD", "STATE", "RECORD", "STATE", "RECORD", "STATE"]
    );
    assert_eq!(writer.flushed().len(), writer.messages().len());
}

#[tokio::test]
async fn test_resume_with_overlap_refetches_margin_in_single_window() {
    let source = FakeSource::new();
    let store = MemoryCheckpointStore::with_bookmark(REPORTS_STREAM, date(2024, 1, 9));
    let mut orch = orchestrator(planner(30, 1), source.clone(), store, date(2024, 1, 10));

    let summary = orch.run().await.unwrap();

    let windows: Vec<_> = source.requests().iter().map(|r| r.window).collect();
    assert_eq!(windows, vec![window((2024, 1, 8), (2024, 1, 10))]);
    assert_eq!(summary.records_emitted, 2);
    assert_eq!(summary.bookmark, Some(date(2024, 1, 10)));
}

#[tokio::test]
async fn test_up_to_date_run_emits_only_schema() {
    let source = FakeSource::new();
    let store = MemoryCheckpointStore::with_bookmark(REPORTS_STREAM, date(2024, 1, 10));
    let mut orch = orchestrator(planner(3, 0), source.clone(), store, date(2024, 1, 10));

    let summary = orch.run().await.unwrap();

    assert_eq!(summary.outcome, SyncOutcome::UpToDate);
    assert!(summary.is_success());
    assert!(source.requests().is_empty());
    let (_, writer) = orch.into_parts();
    assert_eq!(message_kinds(&writer), vec!["SCHEMA"]);
}

#[tokio::test]
async fn test_malformed_second_window_stops_with_first_window_committed() {
    let source = FakeSource::new().fail_always(
        date(2024, 1, 8),
        FetcherError::MalformedResponse("missing 'results' array".into()),
    );
    let mut orch = orchestrator(
        planner(3, 0),
        source.clone(),
        MemoryCheckpointStore::default(),
        date(2024, 1, 10),
    )
    .with_continue_on_malformed(false);

    let summary = orch.run().await.unwrap();

    // Data-integrity failures are not retried
    assert_eq!(source.attempts_for(date(2024, 1, 8)), 1);
    assert_eq!(source.attempts_for(date(2024, 1, 9)), 0);
    assert_eq!(summary.bookmark, Some(date(2024, 1, 8)));
    assert_eq!(summary.windows_committed, 1);
    assert!(!summary.is_success());
    match &summary.outcome {
        SyncOutcome::Stopped { at, kind, .. } => {
            assert_eq!(*at, window((2024, 1, 8), (2024, 1, 9)));
            assert_eq!(*kind, FailureKind::Malformed);
        }
        other => panic!("expected Stopped, got {other:?}"),
    }
    assert_eq!(orch.phase(), SyncPhase::Failed);

    let (_, writer) = orch.into_parts();
    let records = emitted_records(&writer);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].hour.date_naive(), date(2024, 1, 7));
    assert_eq!(message_kinds(&writer), vec!["SCHEMA", "RECORD", "STATE"]);
}

#[tokio::test]
async fn test_malformed_window_freezes_bookmark_but_later_windows_still_emit() {
    let source = FakeSource::new().fail_always(
        date(2024, 1, 8),
        FetcherError::MalformedResponse("row 3: invalid day".into()),
    );
    let mut orch = orchestrator(
        planner(3, 0),
        source.clone(),
        MemoryCheckpointStore::default(),
        date(2024, 1, 10),
    );

    let summary = orch.run().await.unwrap();

    assert_eq!(source.attempts_for(date(2024, 1, 9)), 1);
    assert_eq!(summary.windows_emitted, 2);
    assert_eq!(summary.windows_committed, 1);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.bookmark, Some(date(2024, 1, 8)));
    assert!(matches!(
        summary.outcome,
        SyncOutcome::Stopped {
            kind: FailureKind::Malformed,
            ..
        }
    ));

    let (store, writer) = orch.into_parts();
    assert_eq!(
        store.load(REPORTS_STREAM).unwrap().unwrap().replication_key,
        date(2024, 1, 8)
    );
    // No STATE after the gap
    assert_eq!(
        message_kinds(&writer),
        vec!["SCHEMA", "RECORD", "STATE", "RECORD"]
    );
}

#[tokio::test]
async fn test_auth_failure_aborts_without_committing() {
    let source = FakeSource::new().fail_always(
        date(2024, 1, 7),
        FetcherError::Auth("invalid api key".into()),
    );
    let mut orch = orchestrator(
        planner(3, 0),
        source.clone(),
        MemoryCheckpointStore::default(),
        date(2024, 1, 10),
    );

    let summary = orch.run().await.unwrap();

    assert_eq!(source.requests().len(), 1);
    assert_eq!(summary.bookmark, None);
    assert_eq!(summary.records_emitted, 0);
    assert!(matches!(
        summary.outcome,
        SyncOutcome::Stopped {
            kind: FailureKind::Auth,
            ..
        }
    ));
    let (_, writer) = orch.into_parts();
    assert_eq!(message_kinds(&writer), vec!["SCHEMA"]);
}

#[tokio::test]
async fn test_transient_failures_recover_within_budget() {
    let source = FakeSource::new().fail_times(
        date(2024, 1, 8),
        vec![
            FetcherError::TransientNetwork("connection reset".into()),
            FetcherError::RateLimited {
                retry_after: Some(Duration::from_millis(2)),
            },
        ],
    );
    let mut orch = orchestrator(
        planner(3, 0),
        source.clone(),
        MemoryCheckpointStore::default(),
        date(2024, 1, 10),
    );

    let summary = orch.run().await.unwrap();

    assert_eq!(source.attempts_for(date(2024, 1, 8)), 3);
    assert!(summary.is_success());
    assert_eq!(summary.records_emitted, 3);
}

#[tokio::test]
async fn test_all_pages_of_a_window_are_emitted_before_its_state() {
    let source = FakeSource::new().with_pages(3);
    let mut orch = orchestrator(
        planner(2, 0),
        source.clone(),
        MemoryCheckpointStore::default(),
        date(2024, 1, 10),
    );

    let summary = orch.run().await.unwrap();

    assert_eq!(source.requests().len(), 6);
    assert_eq!(summary.records_emitted, 6);
    let (_, writer) = orch.into_parts();
    assert_eq!(
        message_kinds(&writer),
        vec!["SCHEMA", "RECORD", "RECORD", "RECORD", "STATE", "RECORD", "RECORD", "RECORD", "STATE"]
    );
}

#[tokio::test]
async fn test_crash_after_commit_resumes_at_next_window() {
    let dir = TempDir::new().unwrap();
    let state_path = dir.path().join("state.json");

    // First run: window 2 exhausts its retries after window 1 committed
    let failing = FakeSource::new().fail_always(
        date(2024, 1, 8),
        FetcherError::TransientNetwork("timed out".into()),
    );
    let mut first = orchestrator(
        planner(3, 0),
        failing.clone(),
        FileCheckpointStore::open(&state_path).unwrap(),
        date(2024, 1, 10),
    );
    let summary = first.run().await.unwrap();
    assert!(matches!(
        summary.outcome,
        SyncOutcome::Stopped {
            kind: FailureKind::RetryExhausted,
            ..
        }
    ));
    assert_eq!(failing.attempts_for(date(2024, 1, 8)), 3);
    drop(first);

    let persisted = StateDocument::load(&state_path).unwrap();
    assert_eq!(
        persisted.bookmark(REPORTS_STREAM).unwrap().replication_key,
        date(2024, 1, 8)
    );

    // Second run picks up exactly at window 2
    let healthy = FakeSource::new();
    let mut second = orchestrator(
        planner(3, 0),
        healthy.clone(),
        FileCheckpointStore::open(&state_path).unwrap(),
        date(2024, 1, 10),
    );
    let summary = second.run().await.unwrap();

    let windows: Vec<_> = healthy.requests().iter().map(|r| r.window).collect();
    assert_eq!(
        windows,
        vec![
            window((2024, 1, 8), (2024, 1, 9)),
            window((2024, 1, 9), (2024, 1, 10)),
        ]
    );
    assert!(summary.is_success());
    let persisted = StateDocument::load(&state_path).unwrap();
    assert_eq!(
        persisted.bookmark(REPORTS_STREAM).unwrap().replication_key,
        date(2024, 1, 10)
    );
}

#[tokio::test]
async fn test_repeated_runs_without_bookmark_yield_same_records() {
    let mut keys = Vec::new();
    for _ in 0..2 {
        let mut orch = orchestrator(
            planner(3, 0),
            FakeSource::new(),
            MemoryCheckpointStore::default(),
            date(2024, 1, 10),
        );
        orch.run().await.unwrap();
        let (_, writer) = orch.into_parts();
        let run_keys: BTreeSet<_> = emitted_records(&writer).iter().map(|r| r.key()).collect();
        assert_eq!(run_keys.len(), emitted_records(&writer).len());
        keys.push(run_keys);
    }
    assert_eq!(keys[0], keys[1]);
}

#[tokio::test]
async fn test_shutdown_before_run_stops_at_first_window() {
    let shutdown = ShutdownCoordinator::shared();
    shutdown.request_shutdown();

    let source = FakeSource::new();
    let mut orch = orchestrator(
        planner(3, 0),
        source.clone(),
        MemoryCheckpointStore::default(),
        date(2024, 1, 10),
    )
    .with_shutdown(shutdown);

    let summary = orch.run().await.unwrap();

    assert!(source.requests().is_empty());
    assert_eq!(
        summary.outcome,
        SyncOutcome::Cancelled {
            at: date(2024, 1, 7)
        }
    );
    assert_eq!(orch.phase(), SyncPhase::Done);
}

#[tokio::test]
async fn test_state_message_feeds_back_as_initial_state() {
    let mut orch = orchestrator(
        planner(3, 0),
        FakeSource::new(),
        MemoryCheckpointStore::default(),
        date(2024, 1, 9),
    );
    orch.run().await.unwrap();
    let (_, writer) = orch.into_parts();

    let last_state = writer
        .messages()
        .iter()
        .rev()
        .find_map(|m| match m {
            Message::State { value } => Some(value.clone()),
            _ => None,
        })
        .unwrap();
    let json = serde_json::to_string(&last_state).unwrap();
    let restored = StateDocument::from_json(&json).unwrap();

    let source = FakeSource::new();
    let mut next = orchestrator(
        planner(3, 0),
        source.clone(),
        MemoryCheckpointStore::with_document(restored),
        date(2024, 1, 10),
    );
    next.run().await.unwrap();

    let windows: Vec<_> = source.requests().iter().map(|r| r.window).collect();
    assert_eq!(windows, vec![window((2024, 1, 9), (2024, 1, 10))]);
}
