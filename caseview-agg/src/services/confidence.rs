//! Confidence Aggregator
//!
//! Folds the per-evidence AI confidence scores of one case into a single
//! case confidence and a display band (High/Medium/Low).

use caseview_common::resources::AiAnalysisResult;
use serde::{Deserialize, Serialize};

/// Display band for a case confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceBand {
    /// confidence >= 0.85
    High,
    /// confidence 0.60-0.85
    Medium,
    /// confidence < 0.60
    Low,
}

/// Confidence Aggregator
pub struct ConfidenceAggregator {
    /// High threshold (default 0.85)
    high_threshold: f64,

    /// Medium threshold (default 0.60)
    medium_threshold: f64,
}

impl ConfidenceAggregator {
    /// Create aggregator with default thresholds
    ///
    /// **Default Thresholds:**
    /// - High: ≥0.85
    /// - Medium: 0.60-0.85
    /// - Low: <0.60
    pub fn new() -> Self {
        Self {
            high_threshold: 0.85,
            medium_threshold: 0.60,
        }
    }

    /// Mean confidence over a set of analysis results
    ///
    /// # Arguments
    /// * `results` - AI analysis results attached to one case
    ///
    /// # Returns
    /// `None` for an empty set. Otherwise the arithmetic mean where a missing
    /// score contributes 0 to the sum and still counts in the denominator.
    /// Scores are clamped to 0.0-1.0 first.
    pub fn aggregate(&self, results: &[AiAnalysisResult]) -> Option<f64> {
        aggregate_scores(results.iter().map(|r| r.confidence))
    }

    /// Band for a score
    pub fn band(&self, score: f64) -> ConfidenceBand {
        if score >= self.high_threshold {
            ConfidenceBand::High
        } else if score >= self.medium_threshold {
            ConfidenceBand::Medium
        } else {
            ConfidenceBand::Low
        }
    }
}

impl Default for ConfidenceAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// Mean of optional scores; `None` when there are no entries
pub fn aggregate_scores<I>(scores: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let (sum, count) = scores.into_iter().fold((0.0_f64, 0_usize), |(sum, count), score| {
        let score = match score {
            Some(s) if s.is_finite() => s.clamp(0.0, 1.0),
            _ => 0.0,
        };
        (sum + score, count + 1)
    });

    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}
