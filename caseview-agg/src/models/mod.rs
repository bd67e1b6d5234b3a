//! Data models for caseview-agg

pub mod analysis_job;
pub mod case;

pub use analysis_job::{AnalysisJob, JobStatus};
pub use case::{
    derive_priority, derive_progress, Branch, Case, CasePriority, CaseSet, CaseStatus,
    CorrelationWarning,
};
