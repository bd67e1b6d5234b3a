//! Test Helper Utilities
//!
//! Fixture builders and wiring shared by the caseview-agg integration tests.

#![allow(dead_code)]

use caseview_agg::client::{CaseSource, MockCaseSource};
use caseview_agg::services::{AnalysisTracker, CaseAggregator, CaseStore, Fetcher};
use caseview_agg::AppState;
use caseview_common::events::EventBus;
use caseview_common::resources::{AiAnalysisResult, AnalysisProgress, Evidence, Incident, Report, User};
use caseview_common::IdNormalizer;
use serde_json::{json, Value};
use std::sync::Arc;

pub const USER: &str = "65f000000000000000000001";
pub const OTHER_USER: &str = "65f000000000000000000002";

pub const REPORT_1: &str = "65f0000000000000000000b1";
pub const REPORT_2: &str = "65f0000000000000000000b2";
pub const REPORT_3: &str = "65f0000000000000000000b3";

pub const INCIDENT_1: &str = "65f0000000000000000000a1";
pub const INCIDENT_2: &str = "65f0000000000000000000a2";

pub const EVIDENCE_1: &str = "65f0000000000000000000e1";
pub const EVIDENCE_2: &str = "65f0000000000000000000e2";
pub const EVIDENCE_3: &str = "65f0000000000000000000e3";

/// Report assigned to `USER` referencing `incident` (any encoding)
pub fn report(id: &str, status: &str, incident: Value) -> Report {
    serde_json::from_value(json!({
        "_id": id,
        "title": format!("Report {}", id),
        "status": status,
        "incident": incident,
        "assignedTo": { "_id": USER },
    }))
    .expect("report fixture")
}

pub fn incident(id: Value, severity: &str, evidence: &[&str]) -> Incident {
    serde_json::from_value(json!({
        "_id": id,
        "type": "collision",
        "severity": severity,
        "evidence": evidence,
    }))
    .expect("incident fixture")
}

pub fn evidence(id: &str, incident: &str) -> Evidence {
    serde_json::from_value(json!({
        "_id": id,
        "incident": incident,
        "type": "photo",
        "fileName": format!("{}.jpg", id),
    }))
    .expect("evidence fixture")
}

pub fn ai_result(evidence: &str, confidence: Option<f64>) -> AiAnalysisResult {
    let mut value = json!({ "evidence": evidence });
    if let Some(c) = confidence {
        value["confidence"] = json!(c);
    }
    serde_json::from_value(value).expect("ai result fixture")
}

pub fn user(id: &str, name: &str) -> User {
    serde_json::from_value(json!({
        "_id": id,
        "name": name,
        "role": "investigator",
    }))
    .expect("user fixture")
}

pub fn progress(status: &str, progress: f64, processed: u32, total: u32) -> AnalysisProgress {
    serde_json::from_value(json!({
        "status": status,
        "progress": progress,
        "processedEvidence": processed,
        "totalEvidence": total,
    }))
    .expect("progress fixture")
}

/// Tracker, aggregator and store over a shared mock
pub struct Harness {
    pub mock: MockCaseSource,
    pub event_bus: EventBus,
    pub tracker: Arc<AnalysisTracker>,
    pub aggregator: Arc<CaseAggregator>,
    pub store: Arc<CaseStore>,
}

pub fn harness(mock: &MockCaseSource) -> Harness {
    let source: Arc<dyn CaseSource> = Arc::new(mock.clone());
    let normalizer = IdNormalizer::default();
    let event_bus = EventBus::new(64);
    let tracker = Arc::new(AnalysisTracker::new(source.clone(), normalizer, event_bus.clone()));
    let aggregator = Arc::new(CaseAggregator::new(
        source,
        tracker.clone(),
        normalizer,
        Fetcher::new(4),
    ));
    let store = Arc::new(CaseStore::new(aggregator.clone(), normalizer, event_bus.clone()));

    Harness {
        mock: mock.clone(),
        event_bus,
        tracker,
        aggregator,
        store,
    }
}

/// Application state over a mock
pub fn test_state(mock: &MockCaseSource) -> AppState {
    AppState::new(
        Arc::new(mock.clone()),
        IdNormalizer::default(),
        Fetcher::default(),
        EventBus::new(64),
    )
}
