//! caseview-agg library interface
//!
//! Case correlation and analysis tracking for the incident-reporting
//! dashboard. Exposes public APIs for integration testing.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use caseview_common::events::EventBus;
use caseview_common::IdNormalizer;
use chrono::{DateTime, Utc};
use client::CaseSource;
use services::{AnalysisTracker, CaseAggregator, CaseStore, Fetcher};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Per-user case snapshots
    pub cases: Arc<CaseStore>,
    /// Per-report analysis jobs
    pub tracker: Arc<AnalysisTracker>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    /// Wire the tracker, aggregator and store over one upstream source
    pub fn new(
        source: Arc<dyn CaseSource>,
        normalizer: IdNormalizer,
        fetcher: Fetcher,
        event_bus: EventBus,
    ) -> Self {
        let tracker = Arc::new(AnalysisTracker::new(
            source.clone(),
            normalizer,
            event_bus.clone(),
        ));
        let aggregator = Arc::new(CaseAggregator::new(
            source,
            tracker.clone(),
            normalizer,
            fetcher,
        ));
        let cases = Arc::new(CaseStore::new(aggregator, normalizer, event_bus.clone()));

        Self {
            cases,
            tracker,
            event_bus,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::case_routes())
        .merge(api::analysis_routes())
        .route("/events", get(api::event_stream))
        .merge(api::health_routes())
        .with_state(state)
}
