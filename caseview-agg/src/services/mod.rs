//! Business logic services for caseview-agg

pub mod analysis_tracker;
pub mod case_aggregator;
pub mod case_store;
pub mod confidence;
pub mod fetcher;

pub use analysis_tracker::{AnalysisTracker, TrackerError, TrackerResult};
pub use case_aggregator::{CaseAggregator, CaseError};
pub use case_store::{CaseStore, StoreError, StoreResult};
pub use confidence::{aggregate_scores, ConfidenceAggregator, ConfidenceBand};
pub use fetcher::{FetchRequest, Fetcher, SubFetchFailed, DEFAULT_MAX_IN_FLIGHT};
