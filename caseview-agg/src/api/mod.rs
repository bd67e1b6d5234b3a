//! HTTP API handlers for caseview-agg
//!
//! REST for cases and analysis jobs, SSE for live job and refresh events.

pub mod analysis;
pub mod cases;
pub mod health;
pub mod sse;

pub use analysis::analysis_routes;
pub use cases::case_routes;
pub use health::health_routes;
pub use sse::event_stream;
