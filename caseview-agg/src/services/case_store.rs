//! Case Store
//!
//! Holds the latest [`CaseSet`] per user and runs aggregation passes. A
//! successful pass swaps the whole snapshot; a failed pass leaves it in place
//! and reports the error alongside the previous cases.
//!
//! A read with nothing cached joins the pass already running for that user.
//! An explicit refresh cancels it and starts over; readers waiting on the
//! cancelled pass move to the new one.

use super::case_aggregator::{CaseAggregator, CaseError};
use crate::models::CaseSet;
use caseview_common::events::{CaseEvent, EventBus};
use caseview_common::{IdNormalizer, ObjectId};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome of a pass that lost to a newer one
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Case(#[from] CaseError),

    /// A newer refresh for the same user started; this pass's result was dropped
    #[error("Refresh for user {0} superseded by a newer refresh")]
    Superseded(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

type PassOutcome = Option<Arc<CaseSet>>;

/// Registered pass for one user
struct InFlight {
    generation: u64,
    token: CancellationToken,
    outcome: watch::Receiver<PassOutcome>,
}

/// Pass owned by the caller that started it
struct OwnedPass {
    generation: u64,
    token: CancellationToken,
    outcome: watch::Sender<PassOutcome>,
}

enum Claim {
    Start(OwnedPass),
    Join(watch::Receiver<PassOutcome>),
}

/// Per-user case snapshots
pub struct CaseStore {
    aggregator: Arc<CaseAggregator>,
    normalizer: IdNormalizer,
    snapshots: Arc<RwLock<HashMap<ObjectId, Arc<CaseSet>>>>,
    passes: Arc<RwLock<HashMap<ObjectId, InFlight>>>,
    generation: AtomicU64,
    event_bus: EventBus,
}

impl CaseStore {
    pub fn new(aggregator: Arc<CaseAggregator>, normalizer: IdNormalizer, event_bus: EventBus) -> Self {
        Self {
            aggregator,
            normalizer,
            snapshots: Arc::new(RwLock::new(HashMap::new())),
            passes: Arc::new(RwLock::new(HashMap::new())),
            generation: AtomicU64::new(0),
            event_bus,
        }
    }

    /// Cached cases for a user
    ///
    /// With nothing cached, joins the pass already running for the user or
    /// starts one. Never cancels another caller's pass.
    ///
    /// # Errors
    /// `Case(InvalidUserId)` for a malformed id.
    pub async fn get_cases_for_user(&self, user_id: &str) -> StoreResult<Arc<CaseSet>> {
        let user = self.user_id(user_id)?;

        loop {
            if let Some(snapshot) = self.cached(&user).await {
                debug!(user_id = %user, "Serving cached cases");
                return Ok(snapshot);
            }

            match self.join_or_start(&user).await {
                Claim::Join(mut outcome) => {
                    debug!(user_id = %user, "Joining in-flight case pass");
                    let joined = outcome
                        .wait_for(Option::is_some)
                        .await
                        .ok()
                        .and_then(|set| set.clone());
                    if let Some(set) = joined {
                        return Ok(set);
                    }
                    // Pass was cancelled or failed without a result; look again
                }
                Claim::Start(pass) => match self.run_pass(&user, pass).await {
                    Err(StoreError::Superseded(_)) => continue,
                    other => return other,
                },
            }
        }
    }

    /// Re-run the aggregation pass for a user
    ///
    /// Cancels the user's pass still in flight.
    ///
    /// # Returns
    /// The new snapshot, or on a primary fetch failure the previous cases
    /// (possibly none) with `error` set.
    ///
    /// # Errors
    /// `Case(InvalidUserId)` for a malformed id, `Superseded` if a newer
    /// refresh for the same user started before this one finished.
    pub async fn refresh(&self, user_id: &str) -> StoreResult<Arc<CaseSet>> {
        let user = self.user_id(user_id)?;
        let pass = {
            let mut passes = self.passes.write().await;
            self.start_pass(&mut passes, &user)
        };
        self.run_pass(&user, pass).await
    }

    /// Cached snapshot without running a pass
    pub async fn cached(&self, user_id: &ObjectId) -> Option<Arc<CaseSet>> {
        self.snapshots.read().await.get(user_id).cloned()
    }

    /// Users with a stored snapshot
    pub async fn cached_user_count(&self) -> usize {
        self.snapshots.read().await.len()
    }

    fn user_id(&self, raw: &str) -> StoreResult<ObjectId> {
        self.normalizer.text(raw).map_err(|e| {
            warn!(user_id = %raw, error = %e, "Rejecting malformed user id");
            StoreError::Case(CaseError::InvalidUserId(e))
        })
    }

    async fn join_or_start(&self, user: &ObjectId) -> Claim {
        let mut passes = self.passes.write().await;
        if let Some(pass) = passes.get(user) {
            return Claim::Join(pass.outcome.clone());
        }
        Claim::Start(self.start_pass(&mut passes, user))
    }

    /// Register a new pass, cancelling the one it replaces
    fn start_pass(&self, passes: &mut HashMap<ObjectId, InFlight>, user: &ObjectId) -> OwnedPass {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();
        let (sender, receiver) = watch::channel(None);

        if let Some(previous) = passes.insert(
            user.clone(),
            InFlight {
                generation,
                token: token.clone(),
                outcome: receiver,
            },
        ) {
            info!(user_id = %user, superseded = previous.generation, "Cancelling in-flight case refresh");
            previous.token.cancel();
        }

        OwnedPass {
            generation,
            token,
            outcome: sender,
        }
    }

    async fn run_pass(&self, user: &ObjectId, pass: OwnedPass) -> StoreResult<Arc<CaseSet>> {
        let outcome = tokio::select! {
            _ = pass.token.cancelled() => None,
            result = self.aggregator.build_cases(user.as_str()) => Some(result),
        };

        let result = match outcome {
            Some(result) if !pass.token.is_cancelled() => self.settle(user, result).await,
            _ => {
                debug!(user_id = %user, generation = pass.generation, "Discarding superseded case refresh");
                Err(StoreError::Superseded(user.to_string()))
            }
        };

        if let Ok(set) = &result {
            pass.outcome.send_replace(Some(set.clone()));
        }

        let mut passes = self.passes.write().await;
        if matches!(passes.get(user), Some(current) if current.generation == pass.generation) {
            passes.remove(user);
        }

        result
    }

    async fn settle(&self, user: &ObjectId, outcome: Result<CaseSet, CaseError>) -> StoreResult<Arc<CaseSet>> {
        match outcome {
            Ok(set) => {
                let set = Arc::new(set);
                self.snapshots.write().await.insert(user.clone(), set.clone());
                self.event_bus.emit_lossy(CaseEvent::CasesRefreshed {
                    user_id: user.to_string(),
                    case_count: set.cases.len(),
                    warning_count: set.warnings.len(),
                    timestamp: Utc::now(),
                });
                Ok(set)
            }
            Err(CaseError::PrimaryFetchFailed { source, .. }) => {
                let message = format!("Failed to fetch reports: {}", source);
                let previous = self.snapshots.read().await.get(user).cloned();
                warn!(
                    user_id = %user,
                    error = %message,
                    kept_cases = previous.as_ref().map(|p| p.cases.len()).unwrap_or(0),
                    "Case refresh failed, keeping previous snapshot"
                );
                self.event_bus.emit_lossy(CaseEvent::CaseAggregationFailed {
                    user_id: user.to_string(),
                    error: message.clone(),
                    timestamp: Utc::now(),
                });

                Ok(Arc::new(match previous {
                    Some(previous) => CaseSet {
                        error: Some(message),
                        ..(*previous).clone()
                    },
                    None => CaseSet {
                        user_id: user.to_string(),
                        cases: Vec::new(),
                        warnings: Vec::new(),
                        error: Some(message),
                        built_at: Utc::now(),
                    },
                }))
            }
            Err(e) => Err(e.into()),
        }
    }
}
