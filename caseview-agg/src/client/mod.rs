//! Upstream reporting API client
//!
//! [`CaseSource`] is the typed boundary to the remote REST API. Everything
//! above this module (aggregator, tracker, store) talks to a `dyn CaseSource`,
//! so the HTTP implementation and the in-memory mock are interchangeable.

pub mod http;
pub mod mock;

pub use http::{HttpCaseSource, HttpSourceConfig};
pub use mock::{MockCaseSource, MockOp};

use async_trait::async_trait;
use caseview_common::resources::{
    AiAnalysisResult, AnalysisProgress, AnalyzeRequest, Evidence, Incident, Report, User,
};
use caseview_common::ObjectId;
use serde::Deserialize;
use thiserror::Error;

/// Upstream client errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Client configuration error: {0}")]
    Config(String),
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Read access to the remote reporting API plus the analysis trigger
///
/// All identifiers passed in are canonical; implementations never see raw ids.
#[async_trait]
pub trait CaseSource: Send + Sync {
    /// `GET reports?assignedTo={user_id}`
    async fn reports_for_user(&self, user_id: &ObjectId) -> ClientResult<Vec<Report>>;

    /// `GET incidents/{id}`
    async fn incident(&self, incident_id: &ObjectId) -> ClientResult<Incident>;

    /// `GET evidence/report/{id}`
    async fn evidence_for_report(&self, report_id: &ObjectId) -> ClientResult<Vec<Evidence>>;

    /// `GET evidence/incident/{id}`
    async fn evidence_for_incident(&self, incident_id: &ObjectId) -> ClientResult<Vec<Evidence>>;

    /// `GET ai-analysis/report/{id}/results`
    async fn ai_results_for_report(
        &self,
        report_id: &ObjectId,
    ) -> ClientResult<Vec<AiAnalysisResult>>;

    /// `GET ai-analysis/report/{id}/progress`
    async fn analysis_progress(&self, report_id: &ObjectId) -> ClientResult<AnalysisProgress>;

    /// `POST ai-analysis/report/{id}/analyze`
    ///
    /// Resolves once the remote analysis has finished.
    async fn analyze_report(
        &self,
        report_id: &ObjectId,
        request: &AnalyzeRequest,
    ) -> ClientResult<Vec<AiAnalysisResult>>;

    /// `GET users/{id}`
    async fn user(&self, user_id: &ObjectId) -> ClientResult<User>;
}

/// Response body that is either bare or wrapped as `{ "data": ... }`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    pub(crate) fn into_inner(self) -> T {
        match self {
            Envelope::Wrapped { data } => data,
            Envelope::Bare(value) => value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_accepts_wrapped_and_bare() {
        let wrapped: Envelope<Vec<Report>> = serde_json::from_value(json!({
            "data": [{ "_id": "65a1f0c2e4b0a1b2c3d4e5f6", "status": "draft" }]
        }))
        .unwrap();
        assert_eq!(wrapped.into_inner().len(), 1);

        let bare: Envelope<Vec<Report>> = serde_json::from_value(json!([
            { "_id": "65a1f0c2e4b0a1b2c3d4e5f6", "status": "draft" },
            { "_id": "65a1f0c2e4b0a1b2c3d4e5f7", "status": "approved" }
        ]))
        .unwrap();
        assert_eq!(bare.into_inner().len(), 2);

        let empty: Envelope<Vec<Report>> = serde_json::from_value(json!([])).unwrap();
        assert!(empty.into_inner().is_empty());
    }

    #[test]
    fn test_envelope_keeps_reports_with_duplicate_id_keys_or_no_status() {
        let reports: Envelope<Vec<Report>> = serde_json::from_value(json!({
            "data": [
                {
                    "_id": "65a1f0c2e4b0a1b2c3d4e5f6",
                    "id": "65a1f0c2e4b0a1b2c3d4e5f6",
                    "status": "draft",
                    "incident": "65a1f0c2e4b0a1b2c3d4e5aa",
                    "incidentId": "65a1f0c2e4b0a1b2c3d4e5aa"
                },
                { "_id": "65a1f0c2e4b0a1b2c3d4e5f7" }
            ]
        }))
        .unwrap();

        let reports = reports.into_inner();
        assert_eq!(reports.len(), 2);
        assert_eq!(
            reports[1].status,
            caseview_common::resources::ReportStatus::Other
        );
    }

    #[test]
    fn test_envelope_single_object() {
        let incident: Envelope<Incident> = serde_json::from_value(json!({
            "data": { "_id": "65a1f0c2e4b0a1b2c3d4e5aa", "severity": "major" }
        }))
        .unwrap();
        assert_eq!(
            incident.into_inner().severity,
            caseview_common::resources::Severity::Major
        );
    }
}
