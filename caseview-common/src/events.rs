//! Event types for the caseview event system
//!
//! Provides shared event definitions and the EventBus used to fan job
//! transitions and refresh results out to SSE subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Caseview event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CaseEvent {
    /// Analysis job for a report changed state or progress
    ///
    /// Triggers:
    /// - SSE: Update progress bars on every open case card
    AnalysisJobUpdated {
        /// Canonical report id
        report_id: String,
        /// Job instance id
        job_id: Uuid,
        /// "pending", "processing", "completed" or "failed"
        status: String,
        /// Percentage complete (0-100)
        progress: u8,
        processed_evidence: u32,
        total_evidence: u32,
        /// Failure message when status is "failed"
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Aggregation pass for a user finished and replaced the case list
    CasesRefreshed {
        /// Canonical user id
        user_id: String,
        case_count: usize,
        /// Number of degraded joins recorded during the pass
        warning_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Aggregation pass for a user failed at the primary fetch
    CaseAggregationFailed {
        user_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl CaseEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            CaseEvent::AnalysisJobUpdated { .. } => "AnalysisJobUpdated",
            CaseEvent::CasesRefreshed { .. } => "CasesRefreshed",
            CaseEvent::CaseAggregationFailed { .. } => "CaseAggregationFailed",
        }
    }
}

/// Broadcast bus for [`CaseEvent`]s
///
/// # Examples
///
/// ```
/// use caseview_common::events::{CaseEvent, EventBus};
///
/// let bus = EventBus::new(100);
/// let mut rx = bus.subscribe();
///
/// bus.emit_lossy(CaseEvent::CaseAggregationFailed {
///     user_id: "65a1f0c2e4b0a1b2c3d4e5f6".to_string(),
///     error: "upstream unavailable".to_string(),
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CaseEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before lagging receivers drop old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<CaseEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: CaseEvent,
    ) -> Result<usize, broadcast::error::SendError<CaseEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: CaseEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
