//! Analysis Job Tracker
//!
//! Owns the per-report [`AnalysisJob`] map. At most one active job per report;
//! terminal states come only from the local analyze call, remote progress
//! snapshots only ever move a job forward. Every change is broadcast as a
//! `CaseEvent::AnalysisJobUpdated`.

use crate::client::{CaseSource, ClientError};
use crate::models::{AnalysisJob, JobStatus};
use caseview_common::events::EventBus;
use caseview_common::resources::AnalyzeRequest;
use caseview_common::{IdError, IdNormalizer, ObjectId};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Tracker errors
#[derive(Debug, Error)]
pub enum TrackerError {
    /// A pending or processing job already exists for the report
    #[error("Analysis already active for report {report_id}")]
    JobAlreadyActive { report_id: String, job: Box<AnalysisJob> },

    /// The remote analyze call failed; the job is recorded as failed
    #[error("Analysis failed for report {report_id}: {message}")]
    JobFailed { report_id: String, message: String },

    /// No local job and the remote has none either
    #[error("No analysis job for report {0}")]
    NotTracked(String),

    #[error("Invalid report id: {0}")]
    InvalidReportId(#[from] IdError),

    /// Progress could not be fetched and there is no local snapshot
    #[error("Upstream error: {0}")]
    Upstream(#[from] ClientError),
}

pub type TrackerResult<T> = Result<T, TrackerError>;

#[derive(Debug, Clone)]
struct TrackedJob {
    job: AnalysisJob,
    /// A local analyze call for this job is in flight
    running: bool,
}

/// Per-report analysis job store
pub struct AnalysisTracker {
    source: Arc<dyn CaseSource>,
    normalizer: IdNormalizer,
    jobs: Arc<RwLock<HashMap<ObjectId, TrackedJob>>>,
    event_bus: EventBus,
}

impl AnalysisTracker {
    pub fn new(source: Arc<dyn CaseSource>, normalizer: IdNormalizer, event_bus: EventBus) -> Self {
        Self {
            source,
            normalizer,
            jobs: Arc::new(RwLock::new(HashMap::new())),
            event_bus,
        }
    }

    /// Normalize a report id as received from a caller
    pub fn report_id(&self, raw: &str) -> TrackerResult<ObjectId> {
        self.normalizer.text(raw).map_err(|e| {
            warn!(report_id = %raw, error = %e, "Rejecting malformed report id");
            TrackerError::InvalidReportId(e)
        })
    }

    /// Current job for a report, if any
    pub async fn snapshot(&self, report_id: &ObjectId) -> Option<AnalysisJob> {
        self.jobs.read().await.get(report_id).map(|t| t.job.clone())
    }

    /// Snapshots for many reports under one lock
    pub async fn snapshots<'a, I>(&self, report_ids: I) -> HashMap<ObjectId, AnalysisJob>
    where
        I: IntoIterator<Item = &'a ObjectId>,
    {
        let jobs = self.jobs.read().await;
        report_ids
            .into_iter()
            .filter_map(|id| jobs.get(id).map(|t| (id.clone(), t.job.clone())))
            .collect()
    }

    /// Number of pending or processing jobs
    pub async fn active_count(&self) -> usize {
        self.jobs
            .read()
            .await
            .values()
            .filter(|t| t.job.status.is_active())
            .count()
    }

    /// Register a new pending job
    ///
    /// # Errors
    /// `JobAlreadyActive` if the report has a pending or processing job; that
    /// job is left untouched.
    pub async fn begin(&self, report_id: &str) -> TrackerResult<AnalysisJob> {
        let report_id = self.report_id(report_id)?;

        let job = {
            let mut jobs = self.jobs.write().await;
            if let Some(existing) = jobs.get(&report_id) {
                if existing.job.status.is_active() {
                    info!(
                        report_id = %report_id,
                        job_id = %existing.job.job_id,
                        status = existing.job.status.as_str(),
                        "Analysis already active, rejecting start"
                    );
                    return Err(TrackerError::JobAlreadyActive {
                        report_id: report_id.to_string(),
                        job: Box::new(existing.job.clone()),
                    });
                }
            }

            let job = AnalysisJob::new(report_id.clone());
            jobs.insert(
                report_id.clone(),
                TrackedJob {
                    job: job.clone(),
                    running: true,
                },
            );
            job
        };

        info!(report_id = %report_id, job_id = %job.job_id, "Analysis job created");
        self.event_bus.emit_lossy(job.to_event());
        Ok(job)
    }

    /// Issue the remote analyze call for a job created by [`begin`](Self::begin)
    ///
    /// # Returns
    /// The completed job.
    ///
    /// # Errors
    /// `JobFailed` if the remote call fails; the job is recorded as failed.
    pub async fn run(&self, job: AnalysisJob, custom_prompt: Option<String>) -> TrackerResult<AnalysisJob> {
        let report_id = job.report_id.clone();

        let processing = job.transition_to(JobStatus::Processing);
        self.replace_if_current(&processing, true).await;

        let request = AnalyzeRequest { custom_prompt };
        let outcome = self.source.analyze_report(&report_id, &request).await;

        // Polls may have advanced the counts while the call was in flight
        let base = self
            .snapshot(&report_id)
            .await
            .filter(|current| current.job_id == job.job_id)
            .unwrap_or(processing);

        match outcome {
            Ok(results) => {
                let processed = (results.len() as u32).max(base.processed_evidence_count);
                let completed = base.completed(processed, base.total_evidence_count);
                info!(
                    report_id = %report_id,
                    job_id = %job.job_id,
                    results = processed,
                    "Analysis completed"
                );
                self.replace_if_current(&completed, false).await;
                Ok(completed)
            }
            Err(e) => {
                let message = e.to_string();
                error!(report_id = %report_id, job_id = %job.job_id, error = %e, "Analysis failed");
                self.replace_if_current(&base.failed(message.clone()), false)
                    .await;
                Err(TrackerError::JobFailed {
                    report_id: report_id.to_string(),
                    message,
                })
            }
        }
    }

    /// Create a job and run it to completion
    pub async fn start(&self, report_id: &str, custom_prompt: Option<String>) -> TrackerResult<AnalysisJob> {
        let job = self.begin(report_id).await?;
        self.run(job, custom_prompt).await
    }

    /// Fetch remote progress and fold it into the tracked job
    ///
    /// Terminal jobs are returned without contacting the remote. An untracked
    /// report adopts the remote snapshot. If the remote cannot be reached the
    /// current snapshot is returned.
    ///
    /// # Errors
    /// `NotTracked` when neither side knows a job; `Upstream` when the remote
    /// fails and there is no local snapshot.
    pub async fn poll(&self, report_id: &str) -> TrackerResult<AnalysisJob> {
        let report_id = self.report_id(report_id)?;

        if let Some(current) = self.snapshot(&report_id).await {
            if current.status.is_terminal() {
                debug!(report_id = %report_id, status = current.status.as_str(), "Poll on terminal job");
                return Ok(current);
            }
        }

        let remote = match self.source.analysis_progress(&report_id).await {
            Ok(remote) => remote,
            Err(e) => {
                return match self.snapshot(&report_id).await {
                    Some(current) => {
                        warn!(
                            report_id = %report_id,
                            error = %e,
                            "Progress fetch failed, returning last snapshot"
                        );
                        Ok(current)
                    }
                    None => match e {
                        ClientError::NotFound(_) => Err(TrackerError::NotTracked(report_id.to_string())),
                        other => Err(TrackerError::Upstream(other)),
                    },
                };
            }
        };

        let (job, changed) = {
            let mut jobs = self.jobs.write().await;
            match jobs.get(&report_id) {
                Some(tracked) => {
                    let merged = tracked.job.merge_remote(&remote, !tracked.running);
                    let changed = merged != tracked.job;
                    if changed {
                        let running = tracked.running && merged.status.is_active();
                        jobs.insert(
                            report_id.clone(),
                            TrackedJob {
                                job: merged.clone(),
                                running,
                            },
                        );
                    }
                    (merged, changed)
                }
                None => {
                    let adopted = AnalysisJob::from_remote(report_id.clone(), &remote);
                    info!(
                        report_id = %report_id,
                        status = adopted.status.as_str(),
                        "Adopting remote analysis job"
                    );
                    jobs.insert(
                        report_id.clone(),
                        TrackedJob {
                            job: adopted.clone(),
                            running: false,
                        },
                    );
                    (adopted, true)
                }
            }
        };

        if changed {
            self.event_bus.emit_lossy(job.to_event());
        }
        Ok(job)
    }

    /// Replace the tracked entry if it still belongs to `job.job_id`
    async fn replace_if_current(&self, job: &AnalysisJob, running: bool) -> bool {
        let replaced = {
            let mut jobs = self.jobs.write().await;
            match jobs.get(&job.report_id) {
                Some(current) if current.job.job_id == job.job_id && !current.job.status.is_terminal() => {
                    // Keep progress already reported by polls while processing
                    let job = if job.status.is_active() {
                        let mut next = job.clone();
                        next.progress = next.progress.max(current.job.progress);
                        next.processed_evidence_count =
                            next.processed_evidence_count.max(current.job.processed_evidence_count);
                        next.total_evidence_count =
                            next.total_evidence_count.max(current.job.total_evidence_count);
                        next
                    } else {
                        job.clone()
                    };
                    jobs.insert(job.report_id.clone(), TrackedJob { job: job.clone(), running });
                    Some(job)
                }
                _ => None,
            }
        };

        match replaced {
            Some(job) => {
                self.event_bus.emit_lossy(job.to_event());
                true
            }
            None => {
                info!(
                    report_id = %job.report_id,
                    job_id = %job.job_id,
                    status = job.status.as_str(),
                    "Discarding update for superseded analysis job"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{MockCaseSource, MockOp};
    use caseview_common::events::CaseEvent;

    const REPORT: &str = "65f0000000000000000000b1";

    fn tracker(mock: &MockCaseSource) -> AnalysisTracker {
        AnalysisTracker::new(Arc::new(mock.clone()), IdNormalizer::default(), EventBus::new(32))
    }

    #[tokio::test]
    async fn test_start_completes_job() {
        let mock = MockCaseSource::new();
        let tracker = tracker(&mock);

        let job = tracker.start(REPORT, None).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);

        let snapshot = tracker.snapshot(&ObjectId::parse(REPORT).unwrap()).await.unwrap();
        assert_eq!(snapshot, job);
    }

    #[tokio::test]
    async fn test_remote_failure_records_failed_job() {
        let mock = MockCaseSource::new();
        mock.fail(MockOp::Analyze, REPORT).await;
        let tracker = tracker(&mock);

        let err = tracker.start(REPORT, None).await.unwrap_err();
        assert!(matches!(err, TrackerError::JobFailed { .. }));

        let snapshot = tracker.snapshot(&ObjectId::parse(REPORT).unwrap()).await.unwrap();
        assert_eq!(snapshot.status, JobStatus::Failed);
        assert!(snapshot.error.unwrap().contains("503"));

        // A failed job can be restarted
        mock.recover(MockOp::Analyze, REPORT).await;
        let job = tracker.start(REPORT, None).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_invalid_report_id() {
        let tracker = tracker(&MockCaseSource::new());
        let err = tracker.begin("not-an-id").await.unwrap_err();
        assert!(matches!(err, TrackerError::InvalidReportId(_)));
    }

    #[tokio::test]
    async fn test_superseded_completion_is_discarded() {
        let mock = MockCaseSource::new();
        let tracker = tracker(&mock);

        let first = tracker.begin(REPORT).await.unwrap();
        tracker.run(first.clone(), None).await.unwrap();

        let second = tracker.begin(REPORT).await.unwrap();
        assert_ne!(first.job_id, second.job_id);

        // A stale handle to the first job finishing again must not touch the second
        tracker.run(first, None).await.unwrap();
        let snapshot = tracker.snapshot(&second.report_id).await.unwrap();
        assert_eq!(snapshot.job_id, second.job_id);
        assert_eq!(snapshot.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_transitions_are_broadcast() {
        let mock = MockCaseSource::new();
        let tracker = tracker(&mock);
        let mut rx = tracker.event_bus.subscribe();

        tracker.start(REPORT, None).await.unwrap();

        let mut statuses = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let CaseEvent::AnalysisJobUpdated { status, .. } = event {
                statuses.push(status);
            }
        }
        assert_eq!(statuses, vec!["pending", "processing", "completed"]);
    }
}
