//! In-memory [`CaseSource`] for tests and local demos.

use super::{CaseSource, ClientError, ClientResult};
use async_trait::async_trait;
use caseview_common::resources::{
    AiAnalysisResult, AnalysisFindings, AnalysisProgress, AnalyzeRequest, Evidence, EvidenceType,
    Incident, RemoteJobStatus, Report, ReportStatus, Severity, User, UserRole,
};
use caseview_common::ObjectId;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Notify, RwLock};

/// Upstream operation, used to inject failures and count calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Reports,
    Incident,
    EvidenceByReport,
    EvidenceByIncident,
    AiResults,
    Progress,
    Analyze,
    User,
}

#[derive(Default)]
struct MockData {
    reports: HashMap<String, Vec<Report>>,
    incidents: HashMap<String, Incident>,
    evidence_by_report: HashMap<String, Vec<Evidence>>,
    evidence_by_incident: HashMap<String, Vec<Evidence>>,
    ai_results: HashMap<String, Vec<AiAnalysisResult>>,
    progress: HashMap<String, AnalysisProgress>,
    analyze_results: HashMap<String, Vec<AiAnalysisResult>>,
    users: HashMap<String, User>,
}

/// Mock reporting API
///
/// Missing list resources answer with an empty list; missing single
/// resources answer `NotFound`. Clones share state.
#[derive(Clone, Default)]
pub struct MockCaseSource {
    data: Arc<RwLock<MockData>>,
    failures: Arc<RwLock<HashSet<(MockOp, String)>>>,
    calls: Arc<RwLock<Vec<(MockOp, String)>>>,
    gates: Arc<RwLock<HashMap<(MockOp, String), Arc<Notify>>>>,
}

fn key(id: &str) -> String {
    id.trim().to_lowercase()
}

impl MockCaseSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mock populated with one investigator and three cases
    ///
    /// Investigator `65f000000000000000000001`. The collision report is
    /// approved with two scored analyses, the hit-and-run report is submitted
    /// with no incident reachable, the draft has a `$oid` incident reference.
    pub async fn with_sample_data() -> Self {
        let mock = Self::new();
        let now = Utc::now();
        let investigator = "65f000000000000000000001";

        mock.add_user(User {
            id: json!(investigator),
            name: "Officer Dana Reyes".to_string(),
            email: Some("d.reyes@example.org".to_string()),
            role: UserRole::Investigator,
            badge_number: Some("TR-1142".to_string()),
        })
        .await;

        let collision = "65f0000000000000000000a1";
        let parking = "65f0000000000000000000a3";
        let photo = "65f0000000000000000000e1";
        let statement = "65f0000000000000000000e2";

        mock.add_incident(Incident {
            id: json!({ "$oid": collision }),
            location: Some("Main St & 5th Ave".to_string()),
            incident_type: Some("collision".to_string()),
            severity: Severity::Critical,
            timestamp: Some(now - Duration::days(2)),
            casualties: 2,
            evidence: vec![json!(photo), json!({ "_id": statement })],
            vehicles: Vec::new(),
        })
        .await;
        mock.add_incident(Incident {
            id: json!(parking),
            location: Some("Harbor Rd lot B".to_string()),
            incident_type: Some("parking".to_string()),
            severity: Severity::Minor,
            timestamp: Some(now - Duration::hours(5)),
            casualties: 0,
            evidence: Vec::new(),
            vehicles: Vec::new(),
        })
        .await;

        let evidence = vec![
            sample_evidence(photo, collision, EvidenceType::Photo, "skid-marks.jpg"),
            sample_evidence(statement, collision, EvidenceType::Statement, "witness-1.pdf"),
        ];
        mock.set_evidence_for_incident(collision, evidence).await;

        let reports = [
            ("65f0000000000000000000b1", "Collision at Main St", ReportStatus::Approved, json!(collision)),
            ("65f0000000000000000000b2", "Hit and run, Elm St", ReportStatus::Submitted, json!("65f0000000000000000000a2")),
            ("65f0000000000000000000b3", "Parking lot scrape", ReportStatus::Draft, json!({ "$oid": parking })),
        ];
        for (id, title, status, incident) in reports {
            mock.add_report(
                investigator,
                Report {
                    id: json!(id),
                    title: title.to_string(),
                    status,
                    incident,
                    assigned_to: json!({ "_id": investigator }),
                    created_at: Some(now - Duration::days(1)),
                    submitted_at: None,
                    ai_contribution: None,
                },
            )
            .await;
        }

        let scored = |evidence: &str, confidence: f64| AiAnalysisResult {
            id: Value::Null,
            evidence: json!(evidence),
            report: json!("65f0000000000000000000b1"),
            incident: json!(collision),
            confidence: Some(confidence),
            findings: AnalysisFindings::default(),
        };
        mock.set_ai_results(
            "65f0000000000000000000b1",
            vec![scored(photo, 0.91), scored(statement, 0.83)],
        )
        .await;
        mock.set_analyze_results("65f0000000000000000000b3", Vec::new()).await;

        mock
    }

    pub async fn add_report(&self, user_id: &str, report: Report) {
        self.data
            .write()
            .await
            .reports
            .entry(key(user_id))
            .or_default()
            .push(report);
    }

    pub async fn add_incident(&self, incident: Incident) {
        let id = match caseview_common::normalize_value(&incident.id) {
            Ok(id) => id.to_string(),
            Err(_) => incident.id.to_string(),
        };
        self.data.write().await.incidents.insert(id, incident);
    }

    /// Register an incident under an explicit key, regardless of its own id
    pub async fn add_incident_at(&self, incident_id: &str, incident: Incident) {
        self.data.write().await.incidents.insert(key(incident_id), incident);
    }

    pub async fn set_evidence_for_report(&self, report_id: &str, evidence: Vec<Evidence>) {
        self.data.write().await.evidence_by_report.insert(key(report_id), evidence);
    }

    pub async fn set_evidence_for_incident(&self, incident_id: &str, evidence: Vec<Evidence>) {
        self.data.write().await.evidence_by_incident.insert(key(incident_id), evidence);
    }

    pub async fn set_ai_results(&self, report_id: &str, results: Vec<AiAnalysisResult>) {
        self.data.write().await.ai_results.insert(key(report_id), results);
    }

    pub async fn set_progress(&self, report_id: &str, progress: AnalysisProgress) {
        self.data.write().await.progress.insert(key(report_id), progress);
    }

    /// Results returned by a completed `analyze` call
    pub async fn set_analyze_results(&self, report_id: &str, results: Vec<AiAnalysisResult>) {
        self.data.write().await.analyze_results.insert(key(report_id), results);
    }

    pub async fn add_user(&self, user: User) {
        let id = match caseview_common::normalize_value(&user.id) {
            Ok(id) => id.to_string(),
            Err(_) => user.id.to_string(),
        };
        self.data.write().await.users.insert(id, user);
    }

    /// Make every call of `op` for `id` fail with a 503
    pub async fn fail(&self, op: MockOp, id: &str) {
        self.failures.write().await.insert((op, key(id)));
    }

    pub async fn recover(&self, op: MockOp, id: &str) {
        self.failures.write().await.remove(&(op, key(id)));
    }

    /// Hold `analyze` for `report_id` until the returned gate is notified
    pub async fn hold_analysis(&self, report_id: &str) -> Arc<Notify> {
        self.hold(MockOp::Analyze, report_id).await
    }

    /// Hold the reports lookup for `user_id` until the returned gate is notified
    ///
    /// Each notification releases one waiting call.
    pub async fn hold_reports(&self, user_id: &str) -> Arc<Notify> {
        self.hold(MockOp::Reports, user_id).await
    }

    async fn hold(&self, op: MockOp, id: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.write().await.insert((op, key(id)), gate.clone());
        gate
    }

    async fn wait_at_gate(&self, op: MockOp, id: &ObjectId) -> bool {
        let gate = self.gates.read().await.get(&(op, id.to_string())).cloned();
        match gate {
            Some(gate) => {
                gate.notified().await;
                true
            }
            None => false,
        }
    }

    /// Number of calls made for `op` with `id`
    pub async fn call_count(&self, op: MockOp, id: &str) -> usize {
        let id = key(id);
        self.calls
            .read()
            .await
            .iter()
            .filter(|(o, k)| *o == op && *k == id)
            .count()
    }

    /// Total calls made for `op`
    pub async fn total_calls(&self, op: MockOp) -> usize {
        self.calls.read().await.iter().filter(|(o, _)| *o == op).count()
    }

    async fn enter(&self, op: MockOp, id: &ObjectId) -> ClientResult<()> {
        let id = id.to_string();
        self.calls.write().await.push((op, id.clone()));
        if self.failures.read().await.contains(&(op, id.clone())) {
            return Err(ClientError::Api(503, format!("mock failure: {:?} {}", op, id)));
        }
        Ok(())
    }
}

fn sample_evidence(id: &str, incident: &str, evidence_type: EvidenceType, file: &str) -> Evidence {
    Evidence {
        id: json!(id),
        incident: json!(incident),
        report: Value::Null,
        evidence_type,
        file_name: Some(file.to_string()),
        uploaded_at: Some(Utc::now()),
    }
}

#[async_trait]
impl CaseSource for MockCaseSource {
    async fn reports_for_user(&self, user_id: &ObjectId) -> ClientResult<Vec<Report>> {
        self.enter(MockOp::Reports, user_id).await?;
        self.wait_at_gate(MockOp::Reports, user_id).await;
        Ok(self
            .data
            .read()
            .await
            .reports
            .get(user_id.as_str())
            .cloned()
            .unwrap_or_default())
    }

    async fn incident(&self, incident_id: &ObjectId) -> ClientResult<Incident> {
        self.enter(MockOp::Incident, incident_id).await?;
        self.data
            .read()
            .await
            .incidents
            .get(incident_id.as_str())
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("incidents/{}", incident_id)))
    }

    async fn evidence_for_report(&self, report_id: &ObjectId) -> ClientResult<Vec<Evidence>> {
        self.enter(MockOp::EvidenceByReport, report_id).await?;
        Ok(self
            .data
            .read()
            .await
            .evidence_by_report
            .get(report_id.as_str())
            .cloned()
            .unwrap_or_default())
    }

    async fn evidence_for_incident(&self, incident_id: &ObjectId) -> ClientResult<Vec<Evidence>> {
        self.enter(MockOp::EvidenceByIncident, incident_id).await?;
        Ok(self
            .data
            .read()
            .await
            .evidence_by_incident
            .get(incident_id.as_str())
            .cloned()
            .unwrap_or_default())
    }

    async fn ai_results_for_report(
        &self,
        report_id: &ObjectId,
    ) -> ClientResult<Vec<AiAnalysisResult>> {
        self.enter(MockOp::AiResults, report_id).await?;
        Ok(self
            .data
            .read()
            .await
            .ai_results
            .get(report_id.as_str())
            .cloned()
            .unwrap_or_default())
    }

    async fn analysis_progress(&self, report_id: &ObjectId) -> ClientResult<AnalysisProgress> {
        self.enter(MockOp::Progress, report_id).await?;
        self.data
            .read()
            .await
            .progress
            .get(report_id.as_str())
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("ai-analysis/report/{}/progress", report_id)))
    }

    async fn analyze_report(
        &self,
        report_id: &ObjectId,
        _request: &AnalyzeRequest,
    ) -> ClientResult<Vec<AiAnalysisResult>> {
        self.enter(MockOp::Analyze, report_id).await?;

        if self.wait_at_gate(MockOp::Analyze, report_id).await {
            // Failures injected while the call was held still apply
            if self
                .failures
                .read()
                .await
                .contains(&(MockOp::Analyze, report_id.to_string()))
            {
                return Err(ClientError::Api(503, format!("mock failure: Analyze {}", report_id)));
            }
        }

        let mut data = self.data.write().await;
        let results = data
            .analyze_results
            .get(report_id.as_str())
            .cloned()
            .unwrap_or_default();
        let total = results.len() as u32;
        data.progress.insert(
            report_id.to_string(),
            AnalysisProgress {
                status: RemoteJobStatus::Completed,
                progress: 100.0,
                processed_evidence: total,
                total_evidence: total,
                current_evidence: None,
                error: None,
            },
        );
        data.ai_results.insert(report_id.to_string(), results.clone());
        Ok(results)
    }

    async fn user(&self, user_id: &ObjectId) -> ClientResult<User> {
        self.enter(MockOp::User, user_id).await?;
        self.data
            .read()
            .await
            .users
            .get(user_id.as_str())
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("users/{}", user_id)))
    }
}
