//! Analysis job state machine
//!
//! pending → processing → {completed | failed}
//!
//! Jobs are values: every transition builds a new `AnalysisJob` that replaces
//! the tracked entry, so readers never observe a half-updated job.

use caseview_common::events::CaseEvent;
use caseview_common::resources::{AnalysisProgress, RemoteJobStatus};
use caseview_common::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Analysis job state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Accepted locally, remote call not yet issued
    Pending,
    /// Remote analysis running
    Processing,
    /// Remote analysis finished successfully
    Completed,
    /// Remote analysis failed
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Pending or processing
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    fn rank(&self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Processing => 1,
            JobStatus::Completed | JobStatus::Failed => 2,
        }
    }
}

/// One analysis job for one report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisJob {
    /// Job instance identifier
    pub job_id: Uuid,
    pub report_id: ObjectId,
    pub status: JobStatus,
    /// Percentage complete (0-100)
    pub progress: u8,
    pub processed_evidence_count: u32,
    pub total_evidence_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_evidence_label: Option<String>,
    /// Failure message (failed jobs only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl AnalysisJob {
    /// New pending job
    pub fn new(report_id: ObjectId) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4(),
            report_id,
            status: JobStatus::Pending,
            progress: 0,
            processed_evidence_count: 0,
            total_evidence_count: 0,
            current_evidence_label: None,
            error: None,
            started_at: now,
            updated_at: now,
            ended_at: None,
        }
    }

    /// Job for a remote snapshot this process did not start
    pub fn from_remote(report_id: ObjectId, remote: &AnalysisProgress) -> Self {
        let status = match remote.status {
            RemoteJobStatus::Processing => JobStatus::Processing,
            RemoteJobStatus::Completed => JobStatus::Completed,
            RemoteJobStatus::Failed => JobStatus::Failed,
            RemoteJobStatus::Pending | RemoteJobStatus::Unknown => JobStatus::Pending,
        };

        let mut job = Self::new(report_id);
        job.status = status;
        job.progress = match status {
            JobStatus::Completed => 100,
            _ => percent(remote.progress),
        };
        job.processed_evidence_count = remote.processed_evidence;
        job.total_evidence_count = remote.total_evidence;
        job.current_evidence_label = remote.current_evidence.clone();
        if status == JobStatus::Failed {
            job.error = Some(
                remote
                    .error
                    .clone()
                    .unwrap_or_else(|| "analysis failed".to_string()),
            );
        }
        if status.is_terminal() {
            job.ended_at = Some(job.updated_at);
        }
        job
    }

    /// Copy of this job in a new non-terminal state
    pub fn transition_to(&self, status: JobStatus) -> Self {
        let mut next = self.clone();
        next.status = status;
        next.updated_at = Utc::now();
        if status.is_terminal() {
            next.ended_at = Some(next.updated_at);
        }
        next
    }

    /// Copy of this job marked completed
    pub fn completed(&self, processed: u32, total: u32) -> Self {
        let mut next = self.transition_to(JobStatus::Completed);
        next.progress = 100;
        next.processed_evidence_count = processed;
        next.total_evidence_count = total.max(processed);
        next.current_evidence_label = None;
        next.error = None;
        next
    }

    /// Copy of this job marked failed
    pub fn failed(&self, error: impl Into<String>) -> Self {
        let mut next = self.transition_to(JobStatus::Failed);
        next.current_evidence_label = None;
        next.error = Some(error.into());
        next
    }

    /// Fold a remote progress snapshot into this job
    ///
    /// State and progress never move backwards. When `allow_terminal` is false
    /// a remote completed/failed is held at processing; the terminal
    /// transition then comes from the local analyze call. Terminal jobs are
    /// returned unchanged.
    pub fn merge_remote(&self, remote: &AnalysisProgress, allow_terminal: bool) -> Self {
        if self.status.is_terminal() {
            return self.clone();
        }

        let remote_status = match remote.status {
            RemoteJobStatus::Pending => Some(JobStatus::Pending),
            RemoteJobStatus::Processing => Some(JobStatus::Processing),
            RemoteJobStatus::Completed if allow_terminal => Some(JobStatus::Completed),
            RemoteJobStatus::Failed if allow_terminal => Some(JobStatus::Failed),
            RemoteJobStatus::Completed | RemoteJobStatus::Failed => Some(JobStatus::Processing),
            RemoteJobStatus::Unknown => None,
        };

        let status = match remote_status {
            Some(s) if s.rank() > self.status.rank() => s,
            _ => self.status,
        };

        let mut progress = self.progress.max(percent(remote.progress));
        match status {
            JobStatus::Completed => progress = 100,
            JobStatus::Pending | JobStatus::Processing => progress = progress.min(99),
            JobStatus::Failed => {}
        }

        let processed = self.processed_evidence_count.max(remote.processed_evidence);
        let total = self
            .total_evidence_count
            .max(remote.total_evidence)
            .max(processed);
        let label = if status.is_terminal() {
            None
        } else {
            remote
                .current_evidence
                .clone()
                .or_else(|| self.current_evidence_label.clone())
        };

        if status == self.status
            && progress == self.progress
            && processed == self.processed_evidence_count
            && total == self.total_evidence_count
            && label == self.current_evidence_label
        {
            return self.clone();
        }

        let mut next = self.transition_to(status);
        next.progress = progress;
        next.processed_evidence_count = processed;
        next.total_evidence_count = total;
        next.current_evidence_label = label;
        if status == JobStatus::Failed {
            next.error = Some(
                remote
                    .error
                    .clone()
                    .unwrap_or_else(|| "analysis failed".to_string()),
            );
        }
        next
    }

    /// Event announcing this job's current state
    pub fn to_event(&self) -> CaseEvent {
        CaseEvent::AnalysisJobUpdated {
            report_id: self.report_id.to_string(),
            job_id: self.job_id,
            status: self.status.as_str().to_string(),
            progress: self.progress,
            processed_evidence: self.processed_evidence_count,
            total_evidence: self.total_evidence_count,
            error: self.error.clone(),
            timestamp: self.updated_at,
        }
    }
}

fn percent(value: f64) -> u8 {
    if value.is_finite() {
        value.clamp(0.0, 100.0).round() as u8
    } else {
        0
    }
}
