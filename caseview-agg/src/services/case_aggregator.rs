//! Case Aggregator
//!
//! Builds the case list for one user:
//!
//! 1. Reports assigned to the user (the only fatal lookup)
//! 2. In parallel: each distinct incident once, evidence by report, AI results
//!    per report, each distinct investigator once
//! 3. Evidence by incident for every resolved incident, pooled
//! 4. Join and derive (progress, status, priority, confidence)
//!
//! Every identifier is normalized at the join point. A lookup that fails or an
//! identifier that does not normalize degrades only its own branch and is
//! recorded as a [`CorrelationWarning`]. One case is produced per report, in
//! report order.

use super::analysis_tracker::AnalysisTracker;
use super::confidence::ConfidenceAggregator;
use super::fetcher::{FetchRequest, Fetcher};
use crate::client::{CaseSource, ClientError};
use crate::models::{
    derive_priority, derive_progress, Branch, Case, CaseSet, CorrelationWarning,
};
use caseview_common::resources::{Evidence, Incident, Report, User};
use caseview_common::{IdError, IdNormalizer, ObjectId};
use chrono::Utc;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// Aggregation errors
#[derive(Debug, Error)]
pub enum CaseError {
    /// The user id does not normalize; no lookups are attempted
    #[error("Invalid user id: {0}")]
    InvalidUserId(#[from] IdError),

    /// The reports lookup failed; there is nothing to aggregate
    #[error("Failed to fetch reports for user {user_id}: {source}")]
    PrimaryFetchFailed {
        user_id: String,
        #[source]
        source: ClientError,
    },
}

/// Per-report identifiers resolved before the fan-out
struct ReportKeys {
    report_id: Option<ObjectId>,
    incident_id: Option<ObjectId>,
    assignee_id: Option<ObjectId>,
}

/// Case Aggregator
pub struct CaseAggregator {
    source: Arc<dyn CaseSource>,
    tracker: Arc<AnalysisTracker>,
    normalizer: IdNormalizer,
    fetcher: Fetcher,
    confidence: ConfidenceAggregator,
}

impl CaseAggregator {
    pub fn new(
        source: Arc<dyn CaseSource>,
        tracker: Arc<AnalysisTracker>,
        normalizer: IdNormalizer,
        fetcher: Fetcher,
    ) -> Self {
        Self {
            source,
            tracker,
            normalizer,
            fetcher,
            confidence: ConfidenceAggregator::new(),
        }
    }

    /// Build the case list for a user
    ///
    /// # Arguments
    /// * `user_id` - user id as received (trimmed, any case)
    ///
    /// # Returns
    /// One case per assigned report, in upstream report order, with the
    /// warnings collected along the way.
    ///
    /// # Errors
    /// `InvalidUserId` for a malformed id, `PrimaryFetchFailed` when the
    /// reports lookup fails.
    pub async fn build_cases(&self, user_id: &str) -> Result<CaseSet, CaseError> {
        let user = self.normalizer.text(user_id).map_err(|e| {
            warn!(user_id = %user_id, error = %e, "Rejecting malformed user id");
            CaseError::InvalidUserId(e)
        })?;

        let reports = self.source.reports_for_user(&user).await.map_err(|source| {
            error!(user_id = %user, error = %source, "Primary reports fetch failed");
            CaseError::PrimaryFetchFailed {
                user_id: user.to_string(),
                source,
            }
        })?;

        info!(user_id = %user, reports = reports.len(), "Aggregating cases");

        let mut warnings = Vec::new();
        let keys: Vec<ReportKeys> = reports
            .iter()
            .map(|report| self.resolve_keys(report, &mut warnings))
            .collect();

        let incident_ids = distinct(keys.iter().filter_map(|k| k.incident_id.as_ref()));
        let report_ids: Vec<ObjectId> = keys.iter().filter_map(|k| k.report_id.clone()).collect();
        let assignee_ids = distinct(keys.iter().filter_map(|k| k.assignee_id.as_ref()));

        let source = &self.source;
        let (incident_outcomes, evidence_outcomes, ai_outcomes, user_outcomes) = tokio::join!(
            self.fetcher.fetch_many(
                incident_ids
                    .iter()
                    .map(|id| FetchRequest::new(Branch::Incident, id.as_str(), source.incident(id)))
                    .collect(),
            ),
            self.fetcher.fetch_many(
                report_ids
                    .iter()
                    .map(|id| {
                        FetchRequest::new(Branch::EvidenceByReport, id.as_str(), source.evidence_for_report(id))
                    })
                    .collect(),
            ),
            self.fetcher.fetch_many(
                report_ids
                    .iter()
                    .map(|id| {
                        FetchRequest::new(Branch::AiResults, id.as_str(), source.ai_results_for_report(id))
                    })
                    .collect(),
            ),
            self.fetcher.fetch_many(
                assignee_ids
                    .iter()
                    .map(|id| FetchRequest::new(Branch::Investigator, id.as_str(), source.user(id)))
                    .collect(),
            ),
        );

        let mut incidents: HashMap<ObjectId, Incident> = HashMap::new();
        for (requested, outcome) in incident_ids.iter().zip(incident_outcomes) {
            match outcome {
                Ok(incident) => match self.normalizer.value(&incident.id) {
                    Ok(actual) if &actual == requested => {
                        incidents.insert(requested.clone(), incident);
                    }
                    Ok(actual) => {
                        warn!(
                            branch = %Branch::Incident,
                            requested = %requested,
                            actual = %actual,
                            "Incident id does not match the requested id"
                        );
                        warnings.push(CorrelationWarning::new(
                            Branch::Incident,
                            requested.as_str(),
                            format!("returned incident has id {}", actual),
                        ));
                    }
                    Err(e) => {
                        self.invalid_identifier(Branch::Incident, &incident.id, &e, &mut warnings);
                    }
                },
                Err(failure) => warnings.push(failure.to_warning()),
            }
        }

        // Evidence pool: depends on the resolved incidents
        let resolved: Vec<ObjectId> = incident_ids
            .iter()
            .filter(|id| incidents.contains_key(*id))
            .cloned()
            .collect();
        let pool_outcomes = self
            .fetcher
            .fetch_many(
                resolved
                    .iter()
                    .map(|id| {
                        FetchRequest::new(Branch::EvidenceByIncident, id.as_str(), source.evidence_for_incident(id))
                    })
                    .collect(),
            )
            .await;

        let mut pool: Vec<Evidence> = Vec::new();
        for outcome in pool_outcomes {
            match outcome {
                Ok(items) => pool.extend(items),
                Err(failure) => warnings.push(failure.to_warning()),
            }
        }

        let mut evidence_by_report: HashMap<ObjectId, Vec<Evidence>> = HashMap::new();
        for (id, outcome) in report_ids.iter().zip(evidence_outcomes) {
            match outcome {
                Ok(items) => {
                    evidence_by_report.insert(id.clone(), items);
                }
                Err(failure) => warnings.push(failure.to_warning()),
            }
        }

        let mut ai_results = HashMap::new();
        for (id, outcome) in report_ids.iter().zip(ai_outcomes) {
            match outcome {
                Ok(results) => {
                    ai_results.insert(id.clone(), results);
                }
                Err(failure) => warnings.push(failure.to_warning()),
            }
        }

        let mut investigators: HashMap<ObjectId, User> = HashMap::new();
        for (id, outcome) in assignee_ids.iter().zip(user_outcomes) {
            match outcome {
                Ok(user) => {
                    investigators.insert(id.clone(), user);
                }
                Err(failure) => warnings.push(failure.to_warning()),
            }
        }

        let jobs = self.tracker.snapshots(report_ids.iter()).await;

        let cases: Vec<Case> = reports
            .into_iter()
            .zip(keys)
            .map(|(report, keys)| {
                let incident = keys
                    .incident_id
                    .as_ref()
                    .and_then(|id| incidents.get(id).cloned());

                let by_report = keys
                    .report_id
                    .as_ref()
                    .and_then(|id| evidence_by_report.get(id));
                let evidence = self.pair_evidence(
                    by_report,
                    keys.incident_id.as_ref().zip(incident.as_ref()),
                    &pool,
                );

                let results = keys
                    .report_id
                    .as_ref()
                    .and_then(|id| ai_results.get(id).cloned())
                    .unwrap_or_default();

                let (derived_progress, derived_status) = derive_progress(report.status);
                let derived_priority = derive_priority(incident.as_ref().map(|i| i.severity));
                let case_confidence = self.confidence.aggregate(&results);

                Case {
                    investigator: keys
                        .assignee_id
                        .as_ref()
                        .and_then(|id| investigators.get(id).cloned()),
                    analysis_job: keys.report_id.as_ref().and_then(|id| jobs.get(id).cloned()),
                    report_id: keys.report_id,
                    report,
                    incident,
                    evidence,
                    ai_results: results,
                    derived_progress,
                    derived_status,
                    derived_priority,
                    case_confidence,
                    confidence_band: case_confidence.map(|c| self.confidence.band(c)),
                }
            })
            .collect();

        info!(
            user_id = %user,
            cases = cases.len(),
            incidents = incidents.len(),
            warnings = warnings.len(),
            "Case aggregation complete"
        );

        Ok(CaseSet {
            user_id: user.to_string(),
            cases,
            warnings,
            error: None,
            built_at: Utc::now(),
        })
    }

    fn resolve_keys(&self, report: &Report, warnings: &mut Vec<CorrelationWarning>) -> ReportKeys {
        let report_id = match self.normalizer.value(&report.id) {
            Ok(id) => Some(id),
            Err(e) => {
                self.invalid_identifier(Branch::Reports, &report.id, &e, warnings);
                None
            }
        };

        let incident_id = report.incident_ref().and_then(|raw| match self.normalizer.value(raw) {
            Ok(id) => Some(id),
            Err(e) => {
                self.invalid_identifier(Branch::Incident, raw, &e, warnings);
                None
            }
        });

        let assignee_id = report.assignee_ref().and_then(|raw| match self.normalizer.value(raw) {
            Ok(id) => Some(id),
            Err(e) => {
                self.invalid_identifier(Branch::Investigator, raw, &e, warnings);
                None
            }
        });

        ReportKeys {
            report_id,
            incident_id,
            assignee_id,
        }
    }

    /// Evidence for one case
    ///
    /// Evidence looked up by report, plus pool items listed in the incident's
    /// evidence ids or owned by the incident. Deduplicated by canonical id,
    /// first occurrence wins.
    fn pair_evidence(
        &self,
        by_report: Option<&Vec<Evidence>>,
        incident: Option<(&ObjectId, &Incident)>,
        pool: &[Evidence],
    ) -> Vec<Evidence> {
        let mut seen = HashSet::new();
        let mut paired = Vec::new();

        for item in by_report.into_iter().flatten() {
            if seen.insert(self.evidence_key(item)) {
                paired.push(item.clone());
            }
        }

        if let Some((incident_id, incident)) = incident {
            let listed: HashSet<ObjectId> = incident
                .evidence
                .iter()
                .filter_map(|raw| self.normalizer.value(raw).ok())
                .collect();

            for item in pool {
                let in_list = self
                    .normalizer
                    .value(&item.id)
                    .map(|id| listed.contains(&id))
                    .unwrap_or(false);
                let owned = item
                    .incident_ref()
                    .and_then(|raw| self.normalizer.value(raw).ok())
                    .map(|owner| &owner == incident_id)
                    .unwrap_or(false);

                if (in_list || owned) && seen.insert(self.evidence_key(item)) {
                    paired.push(item.clone());
                }
            }
        }

        paired
    }

    fn evidence_key(&self, item: &Evidence) -> String {
        match self.normalizer.value(&item.id) {
            Ok(id) => id.to_string(),
            Err(_) => item.id.to_string(),
        }
    }

    fn invalid_identifier(
        &self,
        branch: Branch,
        raw: &Value,
        error: &IdError,
        warnings: &mut Vec<CorrelationWarning>,
    ) {
        warn!(branch = %branch, value = %raw, error = %error, "Invalid identifier at join point");
        warnings.push(CorrelationWarning::new(branch, raw.to_string(), error.to_string()));
    }
}

/// Distinct ids in first-seen order
fn distinct<'a, I>(ids: I) -> Vec<ObjectId>
where
    I: IntoIterator<Item = &'a ObjectId>,
{
    let mut seen = HashSet::new();
    ids.into_iter()
        .filter(|id| seen.insert((*id).clone()))
        .cloned()
        .collect()
}
