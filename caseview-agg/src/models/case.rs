//! Case model
//!
//! A Case is the joined, dashboard-facing view of one Report: its Incident,
//! Evidence, AI results and investigator, plus values derived from them.
//! Cases are built fresh on every aggregation pass.

use super::AnalysisJob;
use crate::services::confidence::ConfidenceBand;
use caseview_common::resources::{
    AiAnalysisResult, Evidence, Incident, Report, ReportStatus, Severity, User,
};
use caseview_common::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Derived case workflow status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaseStatus {
    InProgress,
    Review,
    Completed,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::InProgress => "in-progress",
            CaseStatus::Review => "review",
            CaseStatus::Completed => "completed",
        }
    }
}

/// Derived case priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CasePriority {
    High,
    Medium,
    Low,
}

/// Progress percentage and case status for a report status
///
/// | Report status | Progress | Case status |
/// |---------------|----------|-------------|
/// | draft         | 25       | in-progress |
/// | submitted     | 75       | review      |
/// | approved      | 100      | completed   |
/// | anything else | 50       | in-progress |
pub fn derive_progress(status: ReportStatus) -> (u8, CaseStatus) {
    match status {
        ReportStatus::Draft => (25, CaseStatus::InProgress),
        ReportStatus::Submitted => (75, CaseStatus::Review),
        ReportStatus::Approved => (100, CaseStatus::Completed),
        ReportStatus::Rejected | ReportStatus::Published | ReportStatus::Other => {
            (50, CaseStatus::InProgress)
        }
    }
}

/// Case priority from incident severity; no incident means medium
pub fn derive_priority(severity: Option<Severity>) -> CasePriority {
    match severity {
        Some(Severity::Critical) | Some(Severity::Major) => CasePriority::High,
        Some(Severity::Moderate) => CasePriority::Medium,
        Some(Severity::Minor) => CasePriority::Low,
        Some(Severity::Unknown) | None => CasePriority::Medium,
    }
}

/// Lookup branch of an aggregation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Branch {
    Reports,
    Incident,
    EvidenceByReport,
    EvidenceByIncident,
    AiResults,
    Investigator,
}

impl Branch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Branch::Reports => "reports",
            Branch::Incident => "incident",
            Branch::EvidenceByReport => "evidence-by-report",
            Branch::EvidenceByIncident => "evidence-by-incident",
            Branch::AiResults => "ai-results",
            Branch::Investigator => "investigator",
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A degraded join recorded during a pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationWarning {
    pub branch: Branch,
    /// Id (or raw value) the lookup was keyed on
    pub key: String,
    pub message: String,
}

impl CorrelationWarning {
    pub fn new(branch: Branch, key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            branch,
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Joined view of one report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Case {
    /// Canonical report id, when the report's own id normalizes
    pub report_id: Option<ObjectId>,
    pub report: Report,
    /// Incident whose id equals the report's normalized incident reference
    pub incident: Option<Incident>,
    pub evidence: Vec<Evidence>,
    pub ai_results: Vec<AiAnalysisResult>,
    pub investigator: Option<User>,
    pub derived_progress: u8,
    pub derived_status: CaseStatus,
    pub derived_priority: CasePriority,
    pub case_confidence: Option<f64>,
    pub confidence_band: Option<ConfidenceBand>,
    pub analysis_job: Option<AnalysisJob>,
}

/// Result of one aggregation pass for one user
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseSet {
    pub user_id: String,
    pub cases: Vec<Case>,
    pub warnings: Vec<CorrelationWarning>,
    /// Pass-level failure; `cases` then holds the previous snapshot, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub built_at: DateTime<Utc>,
}

impl CaseSet {
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_table() {
        assert_eq!(derive_progress(ReportStatus::Draft), (25, CaseStatus::InProgress));
        assert_eq!(derive_progress(ReportStatus::Submitted), (75, CaseStatus::Review));
        assert_eq!(derive_progress(ReportStatus::Approved), (100, CaseStatus::Completed));
        assert_eq!(derive_progress(ReportStatus::Rejected), (50, CaseStatus::InProgress));
        assert_eq!(derive_progress(ReportStatus::Published), (50, CaseStatus::InProgress));
        assert_eq!(derive_progress(ReportStatus::Other), (50, CaseStatus::InProgress));
    }

    #[test]
    fn test_priority_table() {
        assert_eq!(derive_priority(Some(Severity::Critical)), CasePriority::High);
        assert_eq!(derive_priority(Some(Severity::Major)), CasePriority::High);
        assert_eq!(derive_priority(Some(Severity::Moderate)), CasePriority::Medium);
        assert_eq!(derive_priority(Some(Severity::Minor)), CasePriority::Low);
        assert_eq!(derive_priority(Some(Severity::Unknown)), CasePriority::Medium);
        assert_eq!(derive_priority(None), CasePriority::Medium);
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(
            serde_json::to_value(CaseStatus::InProgress).unwrap(),
            serde_json::json!("in-progress")
        );
        assert_eq!(
            serde_json::to_value(Branch::EvidenceByIncident).unwrap(),
            serde_json::json!("evidence-by-incident")
        );
        assert_eq!(CaseStatus::Review.as_str(), "review");
    }
}
