//! Observability sink for the ingestion pipeline.
//!
//! Everything is recorded through the `metrics` facade so any exporter the
//! host process installs picks it up. A small in-process tally is kept next
//! to it for run summaries and tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrics::{counter, histogram};

use crate::error::PipelineError;

/// Counter: pipeline terminal states, labelled by `outcome`
pub const PIPELINE_OUTCOMES_TOTAL: &str = "sentiment_pipeline_outcomes_total";
/// Counter: pipeline failures, labelled by `stage` and `kind`
pub const PIPELINE_FAILURES_TOTAL: &str = "sentiment_pipeline_failures_total";
/// Histogram: oracle round-trip time
pub const ORACLE_DURATION_SECONDS: &str = "sentiment_oracle_duration_seconds";
/// Histogram: persisted sentiment scores
pub const SENTIMENT_SCORES: &str = "sentiment_scores";
/// Counter: storage operations, labelled by `operation` and `status`
pub const DB_OPERATIONS_TOTAL: &str = "sentiment_db_operations_total";
/// Histogram: storage operation time
pub const DB_OPERATION_DURATION_SECONDS: &str = "sentiment_db_operation_duration_seconds";

/// Terminal pipeline state, as recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeLabel {
    /// Dropped by the eligibility filter
    Skipped,
    /// A new row was inserted
    Created,
    /// The external id was already stored
    Duplicate,
    /// Any failure
    Failed,
}

impl OutcomeLabel {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::Created => "created",
            Self::Duplicate => "duplicate",
            Self::Failed => "failed",
        }
    }
}

/// Point-in-time copy of the in-process tally
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub skipped: u64,
    pub created: u64,
    pub duplicates: u64,
    pub failed: u64,
    pub extraction_failures: u64,
    pub storage_failures: u64,
}

/// Metrics collection and management
#[derive(Debug, Default)]
pub struct MetricsCollector {
    skipped: AtomicU64,
    created: AtomicU64,
    duplicates: AtomicU64,
    failed: AtomicU64,
    extraction_failures: AtomicU64,
    storage_failures: AtomicU64,
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one pipeline reaching a terminal state
    pub fn record_outcome(&self, outcome: OutcomeLabel) {
        counter!(PIPELINE_OUTCOMES_TOTAL, "outcome" => outcome.as_str()).increment(1);

        let slot = match outcome {
            OutcomeLabel::Skipped => &self.skipped,
            OutcomeLabel::Created => &self.created,
            OutcomeLabel::Duplicate => &self.duplicates,
            OutcomeLabel::Failed => &self.failed,
        };
        slot.fetch_add(1, Ordering::Relaxed);
    }

    /// Report a pipeline failure
    pub fn record_failure(&self, error: &PipelineError) {
        counter!(
            PIPELINE_FAILURES_TOTAL,
            "stage" => error.stage(),
            "kind" => error.kind()
        )
        .increment(1);

        match error {
            PipelineError::Extraction(_) => {
                self.extraction_failures.fetch_add(1, Ordering::Relaxed);
            }
            PipelineError::Resolution(_) | PipelineError::Store(_) => {
                self.storage_failures.fetch_add(1, Ordering::Relaxed);
            }
            PipelineError::InvalidEvent(_) => {}
        }
        self.record_outcome(OutcomeLabel::Failed);
    }

    /// Record oracle latency
    pub fn record_oracle_call(&self, duration: Duration, success: bool) {
        histogram!(
            ORACLE_DURATION_SECONDS,
            "status" => if success { "success" } else { "error" }
        )
        .record(duration.as_secs_f64());
    }

    /// Record a persisted sentiment score
    pub fn record_sentiment(&self, score: f64) {
        histogram!(SENTIMENT_SCORES).record(score);
    }

    /// Record database operation metrics
    pub fn record_db_operation(&self, operation: &'static str, duration: Duration, success: bool) {
        let status = if success { "success" } else { "error" };
        counter!(DB_OPERATIONS_TOTAL, "operation" => operation, "status" => status).increment(1);
        histogram!(DB_OPERATION_DURATION_SECONDS, "operation" => operation).record(duration.as_secs_f64());
    }

    /// Copy the in-process tally
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            skipped: self.skipped.load(Ordering::Relaxed),
            created: self.created.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            extraction_failures: self.extraction_failures.load(Ordering::Relaxed),
            storage_failures: self.storage_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExtractionFailure, StorageError};

    #[test]
    fn test_outcome_tally() {
        let collector = MetricsCollector::new();
        collector.record_outcome(OutcomeLabel::Created);
        collector.record_outcome(OutcomeLabel::Created);
        collector.record_outcome(OutcomeLabel::Skipped);

        let snap = collector.snapshot();
        assert_eq!(snap.created, 2);
        assert_eq!(snap.skipped, 1);
        assert_eq!(snap.failed, 0);
    }

    #[test]
    fn test_failure_counts_as_failed_outcome() {
        let collector = MetricsCollector::new();
        collector.record_failure(&PipelineError::from(ExtractionFailure::malformed("x")));
        collector.record_failure(&PipelineError::Resolution(StorageError("down".into())));

        let snap = collector.snapshot();
        assert_eq!(snap.failed, 2);
        assert_eq!(snap.extraction_failures, 1);
        assert_eq!(snap.storage_failures, 1);
    }
}
