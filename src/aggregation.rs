//! Windowed per-protocol statistics, computed on demand from stored messages.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::error::Result;
use crate::logging::OperationTimer;
use crate::models::{ProtocolStats, StoredMessage};
use crate::repository::SentimentRepository;

/// Read-side aggregation over the message store
#[derive(Clone)]
pub struct AggregationEngine {
    repo: Arc<dyn SentimentRepository>,
}

impl AggregationEngine {
    pub fn new(repo: Arc<dyn SentimentRepository>) -> Self {
        Self { repo }
    }

    /// Statistics for `protocol_name` over the trailing `window_days`, or over
    /// all time when no window is given. `None` when nothing matches.
    pub async fn aggregate(&self, protocol_name: &str, window_days: Option<u32>) -> Result<Option<ProtocolStats>> {
        self.aggregate_at(protocol_name, window_days, Utc::now()).await
    }

    /// Same as [`aggregate`](Self::aggregate) with an explicit reference time
    pub async fn aggregate_at(
        &self,
        protocol_name: &str,
        window_days: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<Option<ProtocolStats>> {
        let timer = OperationTimer::new("aggregate");
        let since = window_days.map(|days| now - Duration::days(i64::from(days)));
        let rows = self.repo.get_protocol_messages(protocol_name, since).await?;
        debug!(protocol_name, rows = rows.len(), ?window_days, "Aggregating protocol");
        let stats = summarize(protocol_name, window_days, &rows);
        timer.finish();
        Ok(stats)
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0_usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Fold an already-selected set of rows into statistics.
///
/// Means skip null values. The latest message is the one with the greatest
/// `created_at`, ties going to the higher id. Row order does not matter.
#[must_use]
pub fn summarize(protocol_name: &str, window_days: Option<u32>, rows: &[StoredMessage]) -> Option<ProtocolStats> {
    let latest = rows.iter().max_by_key(|m| (m.created_at, m.id))?;

    Some(ProtocolStats {
        protocol_name: protocol_name.to_string(),
        window_days,
        average_sentiment: mean(rows.iter().filter_map(|m| m.enrichment.sentiment_score)),
        average_confidence: mean(rows.iter().filter_map(|m| m.enrichment.confidence)),
        message_count: rows.len(),
        latest_message: latest.content.clone(),
        latest_risk_assessment: latest.enrichment.risk_assessment.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Enrichment;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn row(id: i64, minute: u32, score: Option<f64>, risk: &str) -> StoredMessage {
        let created_at = Utc
            .with_ymd_and_hms(2026, 1, 1, 12, minute, 0)
            .single()
            .expect("valid timestamp");
        StoredMessage {
            id,
            external_id: format!("m{id}"),
            user_id: 1,
            channel_id: 1,
            content: format!("message {id}"),
            created_at,
            stored_at: created_at,
            enrichment: Enrichment {
                protocol_name: Some("Bitcoin".into()),
                sentiment_score: score,
                confidence: score.map(f64::abs),
                risk_assessment: Some(risk.into()),
                ..Enrichment::default()
            },
        }
    }

    #[test]
    fn test_empty_selection_is_none() {
        assert!(summarize("Bitcoin", None, &[]).is_none());
    }

    #[test]
    fn test_null_sentiments_excluded_from_mean() {
        let rows = vec![row(1, 0, Some(0.8), "low"), row(2, 1, None, "none"), row(3, 2, Some(0.4), "mid")];
        let stats = summarize("Bitcoin", Some(7), &rows).expect("stats");
        assert_eq!(stats.message_count, 3);
        let avg = stats.average_sentiment.expect("mean");
        assert!((avg - 0.6).abs() < 1e-9);
        assert_eq!(stats.latest_message, "message 3");
        assert_eq!(stats.latest_risk_assessment.as_deref(), Some("mid"));
        assert_eq!(stats.window_days, Some(7));
    }

    #[test]
    fn test_all_null_sentiment_gives_none_mean() {
        let rows = vec![row(1, 0, None, "a")];
        let stats = summarize("Bitcoin", None, &rows).expect("stats");
        assert_eq!(stats.message_count, 1);
        assert!(stats.average_sentiment.is_none());
        assert!(stats.average_confidence.is_none());
    }

    #[test]
    fn test_tie_on_created_at_goes_to_higher_id() {
        let rows = vec![row(7, 5, Some(0.1), "later insert"), row(3, 5, Some(0.2), "earlier insert")];
        let stats = summarize("Bitcoin", None, &rows).expect("stats");
        assert_eq!(stats.latest_message, "message 7");
    }

    proptest! {
        #[test]
        fn prop_mean_is_arithmetic_mean_of_scores(scores in prop::collection::vec(prop::option::of(-1.0f64..=1.0), 1..40)) {
            let rows: Vec<_> = scores
                .iter()
                .enumerate()
                .map(|(i, s)| row(i64::try_from(i).unwrap_or_default(), u32::try_from(i % 60).unwrap_or_default(), *s, "r"))
                .collect();
            let stats = summarize("Bitcoin", None, &rows).expect("non-empty");
            prop_assert_eq!(stats.message_count, rows.len());
            let present: Vec<f64> = scores.iter().flatten().copied().collect();
            match stats.average_sentiment {
                Some(avg) => {
                    let expected = present.iter().sum::<f64>() / f64::from(u32::try_from(present.len()).unwrap_or(u32::MAX));
                    prop_assert!((avg - expected).abs() < 1e-9, "mean {} != {}", avg, expected);
                    prop_assert!((-1.0 - 1e-9..=1.0 + 1e-9).contains(&avg));
                }
                None => prop_assert!(present.is_empty()),
            }
        }

        #[test]
        fn prop_order_independent(mut ids in prop::collection::vec(0i64..1000, 1..20)) {
            ids.sort_unstable();
            ids.dedup();
            let rows: Vec<_> = ids.iter().map(|&id| row(id, 0, Some(0.5), "r")).collect();
            let mut reversed = rows.clone();
            reversed.reverse();
            let a = summarize("Bitcoin", None, &rows).expect("stats");
            let b = summarize("Bitcoin", None, &reversed).expect("stats");
            prop_assert_eq!(a, b);
        }
    }
}
