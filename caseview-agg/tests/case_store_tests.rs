//! Integration tests for the per-user case store

mod helpers;

use caseview_agg::client::{MockCaseSource, MockOp};
use caseview_agg::services::{CaseError, StoreError};
use caseview_common::events::CaseEvent;
use caseview_common::ObjectId;
use helpers::*;
use serde_json::{json, Value};
use std::sync::Arc;

#[tokio::test]
async fn test_first_request_builds_then_serves_cache() {
    let mock = MockCaseSource::new();
    mock.add_report(USER, report(REPORT_1, "draft", Value::Null)).await;
    let h = harness(&mock);

    let first = h.store.get_cases_for_user(USER).await.unwrap();
    let second = h.store.get_cases_for_user(USER).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(mock.call_count(MockOp::Reports, USER).await, 1);
}

#[tokio::test]
async fn test_refresh_replaces_snapshot() {
    let mock = MockCaseSource::new();
    mock.add_report(USER, report(REPORT_1, "draft", Value::Null)).await;
    let h = harness(&mock);

    let before = h.store.get_cases_for_user(USER).await.unwrap();
    assert_eq!(before.cases.len(), 1);

    mock.add_report(USER, report(REPORT_2, "submitted", Value::Null)).await;
    let after = h.store.refresh(USER).await.unwrap();

    assert_eq!(after.cases.len(), 2);
    let cached = h.store.cached(&ObjectId::parse(USER).unwrap()).await.unwrap();
    assert!(Arc::ptr_eq(&after, &cached));
    // The earlier snapshot is untouched
    assert_eq!(before.cases.len(), 1);
}

#[tokio::test]
async fn test_failed_refresh_keeps_previous_cases() {
    let mock = MockCaseSource::new();
    mock.add_report(USER, report(REPORT_1, "approved", json!(INCIDENT_1))).await;
    let h = harness(&mock);
    let mut rx = h.event_bus.subscribe();

    let good = h.store.refresh(USER).await.unwrap();
    assert!(good.error.is_none());

    mock.fail(MockOp::Reports, USER).await;
    let failed = h.store.refresh(USER).await.unwrap();

    assert!(failed.error.as_deref().unwrap().contains("503"));
    assert_eq!(failed.cases.len(), 1);
    assert_eq!(failed.built_at, good.built_at);

    // The stored snapshot is still the good one
    let cached = h.store.cached(&ObjectId::parse(USER).unwrap()).await.unwrap();
    assert!(Arc::ptr_eq(&cached, &good));

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        kinds.push(event.event_type().to_string());
    }
    assert!(kinds.contains(&"CasesRefreshed".to_string()));
    assert!(kinds.contains(&"CaseAggregationFailed".to_string()));
}

#[tokio::test]
async fn test_failed_first_pass_returns_error_without_cases() {
    let mock = MockCaseSource::new();
    mock.fail(MockOp::Reports, USER).await;
    let h = harness(&mock);

    let set = h.store.get_cases_for_user(USER).await.unwrap();
    assert!(set.cases.is_empty());
    assert!(set.error.is_some());
    assert!(h.store.cached(&ObjectId::parse(USER).unwrap()).await.is_none());
}

#[tokio::test]
async fn test_invalid_user_id() {
    let h = harness(&MockCaseSource::new());
    let err = h.store.refresh("nobody").await.unwrap_err();
    assert!(matches!(err, StoreError::Case(CaseError::InvalidUserId(_))));
}

#[tokio::test]
async fn test_newer_refresh_supersedes_in_flight_refresh() {
    let mock = MockCaseSource::new();
    mock.add_report(USER, report(REPORT_1, "draft", Value::Null)).await;
    let gate = mock.hold_reports(USER).await;
    let h = harness(&mock);

    let store = h.store.clone();
    let first = tokio::spawn(async move { store.refresh(USER).await });
    wait_for_calls(&mock, MockOp::Reports, USER, 1).await;

    let store = h.store.clone();
    let second = tokio::spawn(async move { store.refresh(USER).await });
    wait_for_calls(&mock, MockOp::Reports, USER, 2).await;
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    gate.notify_one();

    match first.await.unwrap() {
        Err(StoreError::Superseded(user)) => assert_eq!(user, USER),
        other => panic!("expected superseded refresh, got {:?}", other.map(|s| s.cases.len())),
    }
    let second = second.await.unwrap().unwrap();
    assert_eq!(second.cases.len(), 1);

    let cached = h.store.cached(&ObjectId::parse(USER).unwrap()).await.unwrap();
    assert!(Arc::ptr_eq(&cached, &second));
}

#[tokio::test]
async fn test_refresh_event_carries_counts() {
    let mock = MockCaseSource::new();
    mock.add_report(USER, report(REPORT_1, "draft", json!(INCIDENT_1))).await;
    mock.add_user(user(USER, "Officer Reyes")).await;
    let h = harness(&mock);
    let mut rx = h.event_bus.subscribe();

    h.store.refresh(USER).await.unwrap();

    match rx.try_recv().unwrap() {
        CaseEvent::CasesRefreshed { user_id, case_count, warning_count, .. } => {
            assert_eq!(user_id, USER);
            assert_eq!(case_count, 1);
            // Incident lookup for INCIDENT_1 answers NotFound
            assert_eq!(warning_count, 1);
        }
        other => panic!("unexpected event {}", other.event_type()),
    }
}

async fn wait_for_calls(mock: &MockCaseSource, op: MockOp, id: &str, count: usize) {
    for _ in 0..200 {
        if mock.call_count(op, id).await >= count {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("expected {} {:?} calls for {}", count, op, id);
}

#[tokio::test]
async fn test_concurrent_first_reads_share_one_pass() {
    let mock = MockCaseSource::new();
    mock.add_report(USER, report(REPORT_1, "draft", Value::Null)).await;
    let gate = mock.hold_reports(USER).await;
    let h = harness(&mock);

    let store = h.store.clone();
    let first = tokio::spawn(async move { store.get_cases_for_user(USER).await });
    wait_for_calls(&mock, MockOp::Reports, USER, 1).await;

    let store = h.store.clone();
    let second = tokio::spawn(async move { store.get_cases_for_user(USER).await });
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    gate.notify_one();

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.cases.len(), 1);
    assert_eq!(mock.call_count(MockOp::Reports, USER).await, 1);
}

#[tokio::test]
async fn test_first_read_follows_explicit_refresh() {
    let mock = MockCaseSource::new();
    mock.add_report(USER, report(REPORT_1, "submitted", Value::Null)).await;
    let gate = mock.hold_reports(USER).await;
    let h = harness(&mock);

    let store = h.store.clone();
    let reader = tokio::spawn(async move { store.get_cases_for_user(USER).await });
    wait_for_calls(&mock, MockOp::Reports, USER, 1).await;

    // The refresh cancels the reader's pass; the reader waits on the refresh
    let store = h.store.clone();
    let refresh = tokio::spawn(async move { store.refresh(USER).await });
    wait_for_calls(&mock, MockOp::Reports, USER, 2).await;
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    gate.notify_one();

    let refreshed = refresh.await.unwrap().unwrap();
    let read = reader.await.unwrap().unwrap();

    assert!(Arc::ptr_eq(&refreshed, &read));
    assert_eq!(read.cases.len(), 1);
}
