//! Upstream resource types
//!
//! Records returned by the remote reporting API. Identifier fields are kept as
//! raw [`serde_json::Value`] because their encoding depends on the transport
//! path; they are normalized with [`crate::ids::IdNormalizer`] at join points.
//!
//! Unknown enum strings deserialize to a catch-all variant so one unexpected
//! value never discards an otherwise usable record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ========================================
// Incident
// ========================================

/// Incident severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Minor,
    Moderate,
    Major,
    Critical,
    #[default]
    #[serde(other)]
    Unknown,
}

/// A real-world event under investigation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "IncidentWire")]
pub struct Incident {
    /// Raw identifier as sent upstream
    #[serde(rename = "_id")]
    pub id: Value,
    pub location: Option<String>,
    /// Incident type (collision, hit-and-run, ...)
    #[serde(rename = "type")]
    pub incident_type: Option<String>,
    pub severity: Severity,
    pub timestamp: Option<DateTime<Utc>>,
    pub casualties: u32,
    /// Raw evidence identifiers
    pub evidence: Vec<Value>,
    /// Raw vehicle identifiers
    pub vehicles: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IncidentWire {
    #[serde(default, rename = "_id")]
    mongo_id: Value,
    #[serde(default)]
    id: Value,
    #[serde(default)]
    location: Option<String>,
    #[serde(default, rename = "type")]
    incident_type: Option<String>,
    #[serde(default)]
    severity: Severity,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    date: Option<DateTime<Utc>>,
    #[serde(default)]
    casualties: Option<u32>,
    #[serde(default)]
    casualty_count: Option<u32>,
    #[serde(default)]
    evidence: Option<Vec<Value>>,
    #[serde(default)]
    evidence_ids: Option<Vec<Value>>,
    #[serde(default)]
    vehicles: Option<Vec<Value>>,
    #[serde(default)]
    vehicle_ids: Option<Vec<Value>>,
}

impl From<IncidentWire> for Incident {
    fn from(wire: IncidentWire) -> Self {
        Self {
            id: either(wire.mongo_id, wire.id),
            location: wire.location,
            incident_type: wire.incident_type,
            severity: wire.severity,
            timestamp: wire.timestamp.or(wire.date),
            casualties: wire.casualties.or(wire.casualty_count).unwrap_or(0),
            evidence: wire.evidence.or(wire.evidence_ids).unwrap_or_default(),
            vehicles: wire.vehicles.or(wire.vehicle_ids).unwrap_or_default(),
        }
    }
}

// ========================================
// Report
// ========================================

/// Report lifecycle status
///
/// draft → submitted → {approved | rejected} → (approved) → published
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Draft,
    Submitted,
    Approved,
    Rejected,
    Published,
    #[default]
    #[serde(other)]
    Other,
}

/// Investigative write-up for one incident
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "ReportWire")]
pub struct Report {
    #[serde(rename = "_id")]
    pub id: Value,
    pub title: String,
    pub status: ReportStatus,
    /// Raw incident reference; may be an id, a populated incident, or absent
    pub incident: Value,
    /// Raw reference to the assigned investigator
    pub assigned_to: Value,
    pub created_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    /// Fraction of the report contributed by AI analysis (0.0-1.0)
    pub ai_contribution: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportWire {
    #[serde(default, rename = "_id")]
    mongo_id: Value,
    #[serde(default)]
    id: Value,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    status: ReportStatus,
    #[serde(default)]
    incident: Value,
    #[serde(default)]
    incident_id: Value,
    #[serde(default)]
    assigned_to: Value,
    #[serde(default)]
    investigator: Value,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    ai_contribution: Option<f64>,
}

impl From<ReportWire> for Report {
    fn from(wire: ReportWire) -> Self {
        Self {
            id: either(wire.mongo_id, wire.id),
            title: wire.title.unwrap_or_default(),
            status: wire.status,
            incident: either(wire.incident, wire.incident_id),
            assigned_to: either(wire.assigned_to, wire.investigator),
            created_at: wire.created_at,
            submitted_at: wire.submitted_at,
            ai_contribution: wire.ai_contribution,
        }
    }
}

impl Report {
    /// Incident reference, if the report carries one
    pub fn incident_ref(&self) -> Option<&Value> {
        non_null(&self.incident)
    }

    /// Investigator reference, if the report carries one
    pub fn assignee_ref(&self) -> Option<&Value> {
        non_null(&self.assigned_to)
    }
}

// ========================================
// Evidence
// ========================================

/// Evidence kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceType {
    Photo,
    Video,
    Document,
    Audio,
    Statement,
    #[default]
    #[serde(other)]
    Other,
}

/// File or statement attached to an incident
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "EvidenceWire")]
pub struct Evidence {
    #[serde(rename = "_id")]
    pub id: Value,
    /// Raw reference to the owning incident
    pub incident: Value,
    /// Raw reference to a report, when linked directly
    pub report: Value,
    #[serde(rename = "type")]
    pub evidence_type: EvidenceType,
    pub file_name: Option<String>,
    pub uploaded_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EvidenceWire {
    #[serde(default, rename = "_id")]
    mongo_id: Value,
    #[serde(default)]
    id: Value,
    #[serde(default)]
    incident: Value,
    #[serde(default)]
    incident_id: Value,
    #[serde(default)]
    report: Value,
    #[serde(default)]
    report_id: Value,
    #[serde(default, rename = "type")]
    evidence_type: EvidenceType,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    uploaded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl From<EvidenceWire> for Evidence {
    fn from(wire: EvidenceWire) -> Self {
        Self {
            id: either(wire.mongo_id, wire.id),
            incident: either(wire.incident, wire.incident_id),
            report: either(wire.report, wire.report_id),
            evidence_type: wire.evidence_type,
            file_name: wire.file_name,
            uploaded_at: wire.uploaded_at.or(wire.created_at),
        }
    }
}

impl Evidence {
    /// Owning incident reference, if present
    pub fn incident_ref(&self) -> Option<&Value> {
        non_null(&self.incident)
    }
}

// ========================================
// AI analysis
// ========================================

/// Structured findings of one analysis
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisFindings {
    #[serde(default)]
    pub vehicles: Vec<Value>,
    #[serde(default)]
    pub persons: Vec<Value>,
    #[serde(default)]
    pub scene: Option<Value>,
    #[serde(default)]
    pub damage: Option<Value>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

/// One scored analysis of one evidence item
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "AiAnalysisResultWire")]
pub struct AiAnalysisResult {
    #[serde(rename = "_id")]
    pub id: Value,
    /// Raw reference to the analyzed evidence
    pub evidence: Value,
    pub report: Value,
    pub incident: Value,
    /// Confidence score (0.0-1.0); absent when the analysis produced none
    pub confidence: Option<f64>,
    pub findings: AnalysisFindings,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AiAnalysisResultWire {
    #[serde(default, rename = "_id")]
    mongo_id: Value,
    #[serde(default)]
    id: Value,
    #[serde(default)]
    evidence: Value,
    #[serde(default)]
    evidence_id: Value,
    #[serde(default)]
    report: Value,
    #[serde(default)]
    report_id: Value,
    #[serde(default)]
    incident: Value,
    #[serde(default)]
    incident_id: Value,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    confidence_score: Option<f64>,
    #[serde(default)]
    findings: Option<AnalysisFindings>,
}

impl From<AiAnalysisResultWire> for AiAnalysisResult {
    fn from(wire: AiAnalysisResultWire) -> Self {
        Self {
            id: either(wire.mongo_id, wire.id),
            evidence: either(wire.evidence, wire.evidence_id),
            report: either(wire.report, wire.report_id),
            incident: either(wire.incident, wire.incident_id),
            confidence: wire.confidence.or(wire.confidence_score),
            findings: wire.findings.unwrap_or_default(),
        }
    }
}

/// Remote job status as reported by the progress endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteJobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Progress snapshot returned by `GET ai-analysis/report/{id}/progress`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "AnalysisProgressWire")]
pub struct AnalysisProgress {
    pub status: RemoteJobStatus,
    /// Percentage complete (0-100)
    pub progress: f64,
    pub processed_evidence: u32,
    pub total_evidence: u32,
    pub current_evidence: Option<String>,
    pub error: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalysisProgressWire {
    #[serde(default)]
    status: RemoteJobStatus,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    processed_evidence: Option<u32>,
    #[serde(default)]
    processed_evidence_count: Option<u32>,
    #[serde(default)]
    total_evidence: Option<u32>,
    #[serde(default)]
    total_evidence_count: Option<u32>,
    #[serde(default)]
    current_evidence: Option<String>,
    #[serde(default)]
    current_evidence_label: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl From<AnalysisProgressWire> for AnalysisProgress {
    fn from(wire: AnalysisProgressWire) -> Self {
        Self {
            status: wire.status,
            progress: wire.progress.unwrap_or(0.0),
            processed_evidence: wire
                .processed_evidence
                .or(wire.processed_evidence_count)
                .unwrap_or(0),
            total_evidence: wire.total_evidence.or(wire.total_evidence_count).unwrap_or(0),
            current_evidence: wire.current_evidence.or(wire.current_evidence_label),
            error: wire.error,
        }
    }
}

/// Body of `POST ai-analysis/report/{id}/analyze`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_prompt: Option<String>,
}

// ========================================
// User
// ========================================

/// Dashboard role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Traffic,
    Investigator,
    Chief,
    Admin,
    #[default]
    #[serde(other)]
    Other,
}

/// Dashboard user
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "UserWire")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: Value,
    pub name: String,
    pub email: Option<String>,
    pub role: UserRole,
    pub badge_number: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserWire {
    #[serde(default, rename = "_id")]
    mongo_id: Value,
    #[serde(default)]
    id: Value,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    role: UserRole,
    #[serde(default)]
    badge_number: Option<String>,
}

impl From<UserWire> for User {
    fn from(wire: UserWire) -> Self {
        Self {
            id: either(wire.mongo_id, wire.id),
            name: wire.name.unwrap_or_default(),
            email: wire.email,
            role: wire.role,
            badge_number: wire.badge_number,
        }
    }
}

/// First present of two spellings of the same field (`_id` over `id`)
fn either(preferred: Value, fallback: Value) -> Value {
    match non_null(&preferred) {
        Some(_) => preferred,
        None => fallback,
    }
}

fn non_null(value: &Value) -> Option<&Value> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        other => Some(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_report_accepts_alias_fields_and_unknown_status() {
        let report: Report = serde_json::from_value(json!({
            "_id": { "$oid": "65a1f0c2e4b0a1b2c3d4e5f6" },
            "title": "Collision at Main St",
            "status": "archived",
            "incidentId": "65a1f0c2e4b0a1b2c3d4e5aa",
            "assignedTo": { "_id": "65a1f0c2e4b0a1b2c3d4e5bb", "name": "Officer K" },
            "createdAt": "2024-03-01T10:15:00Z",
            "aiContribution": 0.4
        }))
        .unwrap();

        assert_eq!(report.status, ReportStatus::Other);
        assert!(report.incident_ref().is_some());
        assert!(report.assignee_ref().is_some());
        assert!(report.created_at.is_some());
        assert!(report.submitted_at.is_none());
    }

    #[test]
    fn test_report_without_incident_reference() {
        let report: Report = serde_json::from_value(json!({
            "_id": "65a1f0c2e4b0a1b2c3d4e5f6",
            "status": "draft",
            "incident": ""
        }))
        .unwrap();

        assert!(report.incident_ref().is_none());
        assert!(report.assignee_ref().is_none());
    }

    #[test]
    fn test_incident_unknown_severity() {
        let incident: Incident = serde_json::from_value(json!({
            "_id": "65a1f0c2e4b0a1b2c3d4e5aa",
            "type": "collision",
            "severity": "catastrophic",
            "evidence": ["65a1f0c2e4b0a1b2c3d4e501"]
        }))
        .unwrap();

        assert_eq!(incident.severity, Severity::Unknown);
        assert_eq!(incident.evidence.len(), 1);
        assert_eq!(incident.casualties, 0);
    }

    #[test]
    fn test_records_with_both_id_spellings_and_missing_fields_are_kept() {
        let reports: Vec<Report> = serde_json::from_value(json!([
            {
                "_id": "65a1f0c2e4b0a1b2c3d4e5f6",
                "id": "65a1f0c2e4b0a1b2c3d4e5f6",
                "status": "draft",
                "incident": { "_id": "65a1f0c2e4b0a1b2c3d4e5aa" },
                "incidentId": "65a1f0c2e4b0a1b2c3d4e5aa"
            },
            { "_id": "65a1f0c2e4b0a1b2c3d4e5f7" },
            { "id": "65a1f0c2e4b0a1b2c3d4e5f8", "status": "approved" }
        ]))
        .unwrap();

        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].id, json!("65a1f0c2e4b0a1b2c3d4e5f6"));
        assert_eq!(reports[0].incident, json!({ "_id": "65a1f0c2e4b0a1b2c3d4e5aa" }));
        assert_eq!(reports[1].status, ReportStatus::Other);
        assert_eq!(reports[2].id, json!("65a1f0c2e4b0a1b2c3d4e5f8"));
        assert_eq!(reports[2].status, ReportStatus::Approved);
    }

    #[test]
    fn test_evidence_and_user_without_kind_are_kept() {
        let evidence: Vec<Evidence> = serde_json::from_value(json!([
            { "_id": "65a1f0c2e4b0a1b2c3d4e501", "incidentId": "65a1f0c2e4b0a1b2c3d4e5aa", "type": "photo" },
            { "_id": "65a1f0c2e4b0a1b2c3d4e502", "id": "65a1f0c2e4b0a1b2c3d4e502", "incident": "65a1f0c2e4b0a1b2c3d4e5aa" }
        ]))
        .unwrap();
        assert_eq!(evidence.len(), 2);
        assert_eq!(evidence[0].incident, json!("65a1f0c2e4b0a1b2c3d4e5aa"));
        assert_eq!(evidence[1].evidence_type, EvidenceType::Other);

        let user: User = serde_json::from_value(json!({
            "_id": "65a1f0c2e4b0a1b2c3d4e5bb",
            "id": "65a1f0c2e4b0a1b2c3d4e5bb",
            "name": "Officer K"
        }))
        .unwrap();
        assert_eq!(user.role, UserRole::Other);
        assert_eq!(user.name, "Officer K");
    }

    #[test]
    fn test_serialized_report_reads_back() {
        let report: Report = serde_json::from_value(json!({
            "id": "65a1f0c2e4b0a1b2c3d4e5f6",
            "status": "submitted",
            "investigator": "65a1f0c2e4b0a1b2c3d4e5bb"
        }))
        .unwrap();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["_id"], "65a1f0c2e4b0a1b2c3d4e5f6");
        assert_eq!(json["assignedTo"], "65a1f0c2e4b0a1b2c3d4e5bb");

        let again: Report = serde_json::from_value(json).unwrap();
        assert_eq!(again.status, ReportStatus::Submitted);
        assert!(again.assignee_ref().is_some());
    }

    #[test]
    fn test_analyze_request_omits_missing_prompt() {
        let body = serde_json::to_value(AnalyzeRequest::default()).unwrap();
        assert_eq!(body, json!({}));

        let body = serde_json::to_value(AnalyzeRequest {
            custom_prompt: Some("focus on skid marks".into()),
        })
        .unwrap();
        assert_eq!(body, json!({ "customPrompt": "focus on skid marks" }));
    }
}
