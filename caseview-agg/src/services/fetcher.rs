//! Resilient multi-source fetcher
//!
//! Runs a batch of independent upstream requests concurrently and returns one
//! outcome per request, in submission order. A failing request never aborts
//! its siblings; it is logged and reported as [`SubFetchFailed`]. No retries.

use crate::client::ClientError;
use crate::models::{Branch, CorrelationWarning};
use futures::stream::{self, StreamExt};
use std::future::Future;
use thiserror::Error;
use tracing::{debug, warn};

/// Default number of requests in flight per batch
pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

/// One failed branch lookup
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{branch} lookup for {key} failed: {source}")]
pub struct SubFetchFailed {
    pub branch: Branch,
    pub key: String,
    #[source]
    pub source: ClientError,
}

impl SubFetchFailed {
    pub fn to_warning(&self) -> CorrelationWarning {
        CorrelationWarning::new(self.branch, self.key.clone(), self.source.to_string())
    }
}

/// A labelled upstream request
pub struct FetchRequest<F> {
    pub branch: Branch,
    pub key: String,
    pub future: F,
}

impl<F> FetchRequest<F> {
    pub fn new(branch: Branch, key: impl Into<String>, future: F) -> Self {
        Self {
            branch,
            key: key.into(),
            future,
        }
    }
}

/// Bounded, order-preserving fan-out executor
#[derive(Debug, Clone, Copy)]
pub struct Fetcher {
    max_in_flight: usize,
}

impl Fetcher {
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            max_in_flight: max_in_flight.max(1),
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Execute all requests and collect their outcomes
    ///
    /// # Returns
    /// Exactly one entry per request, in the order submitted.
    pub async fn fetch_many<T, F>(
        &self,
        requests: Vec<FetchRequest<F>>,
    ) -> Vec<Result<T, SubFetchFailed>>
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        let total = requests.len();
        let outcomes: Vec<Result<T, SubFetchFailed>> = stream::iter(requests.into_iter().map(
            |FetchRequest { branch, key, future }| async move {
                future.await.map_err(|source| {
                    warn!(
                        branch = %branch,
                        key = %key,
                        error = %source,
                        "Sub-fetch failed"
                    );
                    SubFetchFailed { branch, key, source }
                })
            },
        ))
        .buffered(self.max_in_flight)
        .collect()
        .await;

        debug!(
            requests = total,
            failed = outcomes.iter().filter(|o| o.is_err()).count(),
            "Fetch batch complete"
        );

        outcomes
    }
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IN_FLIGHT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::time::Duration;

    type BoxedFetch = Pin<Box<dyn Future<Output = Result<i32, ClientError>> + Send>>;

    fn boxed(result: Result<i32, ClientError>) -> BoxedFetch {
        Box::pin(async move { result })
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_siblings() {
        let requests = vec![
            FetchRequest::new(Branch::Incident, "a", boxed(Ok(1))),
            FetchRequest::new(
                Branch::Incident,
                "b",
                boxed(Err(ClientError::NotFound("incidents/b".into()))),
            ),
            FetchRequest::new(Branch::Incident, "c", boxed(Ok(3))),
        ];

        let outcomes = Fetcher::default().fetch_many(requests).await;
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0], Ok(1));
        let failure = outcomes[1].as_ref().unwrap_err();
        assert_eq!(failure.branch, Branch::Incident);
        assert_eq!(failure.key, "b");
        assert_eq!(outcomes[2], Ok(3));
    }

    #[tokio::test]
    async fn test_order_is_submission_order_not_completion_order() {
        let requests = (0..5u64)
            .map(|i| {
                FetchRequest::new(Branch::AiResults, i.to_string(), async move {
                    tokio::time::sleep(Duration::from_millis(50 - i * 10)).await;
                    Ok::<u64, ClientError>(i)
                })
            })
            .collect();

        let outcomes = Fetcher::new(2).fetch_many(requests).await;
        let values: Vec<u64> = outcomes.into_iter().map(|o| o.unwrap()).collect();
        assert_eq!(values, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let requests: Vec<FetchRequest<std::future::Ready<Result<(), ClientError>>>> = Vec::new();
        assert!(Fetcher::default().fetch_many(requests).await.is_empty());
    }

    #[test]
    fn test_failure_converts_to_warning() {
        let failure = SubFetchFailed {
            branch: Branch::EvidenceByReport,
            key: "65f0000000000000000000b1".into(),
            source: ClientError::Api(500, "boom".into()),
        };
        let warning = failure.to_warning();
        assert_eq!(warning.branch, Branch::EvidenceByReport);
        assert!(warning.message.contains("500"));
        assert!(failure.to_string().contains("evidence-by-report"));
    }

    #[test]
    fn test_zero_concurrency_is_raised_to_one() {
        assert_eq!(Fetcher::new(0).max_in_flight(), 1);
    }
}
