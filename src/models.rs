//! Data models for ingestion and storage
//!
//! This module contains the records persisted by the pipeline (users,
//! channels, enriched messages), the inbound gateway event, and the
//! aggregate returned by the read side.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed range a sentiment score must fall in
pub const SENTIMENT_RANGE: (f64, f64) = (-1.0, 1.0);
/// Closed range confidence and community consensus must fall in
pub const UNIT_RANGE: (f64, f64) = (0.0, 1.0);

/// Author of a message on the source platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Database primary key
    pub id: i64,
    /// Platform-issued identifier, unique
    pub external_id: String,
    /// Display name as first observed
    pub display_name: String,
    /// When the row was created
    pub created_at: DateTime<Utc>,
}

/// Conversation/topic on the source platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Database primary key
    pub id: i64,
    /// Platform-issued identifier, unique
    pub external_id: String,
    /// Channel name as first observed
    pub name: String,
    /// When the row was created
    pub created_at: DateTime<Utc>,
}

/// Structured signals extracted from one message by the oracle.
///
/// Every field is independently optional. A persisted message carries
/// exactly one of these, taken whole from a single extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    /// Protocol or token the message talks about
    pub protocol_name: Option<String>,
    /// Polarity in [-1.0, 1.0]
    pub sentiment_score: Option<f64>,
    /// Oracle confidence in [0.0, 1.0]
    pub confidence: Option<f64>,
    /// Technical-analysis indicators mentioned, in order
    pub technical_indicators: Option<Vec<String>>,
    /// Risk assessment in prose
    pub risk_assessment: Option<String>,
    /// Estimated community agreement in [0.0, 1.0]
    pub community_consensus: Option<f64>,
}

impl Enrichment {
    /// True when no field carries a value
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.protocol_name.is_none()
            && self.sentiment_score.is_none()
            && self.confidence.is_none()
            && self.technical_indicators.is_none()
            && self.risk_assessment.is_none()
            && self.community_consensus.is_none()
    }

    /// Check every numeric field against its domain.
    ///
    /// Returns the name of the first offending field.
    pub fn check_ranges(&self) -> Result<(), &'static str> {
        let checks = [
            ("sentiment_score", self.sentiment_score, SENTIMENT_RANGE),
            ("confidence", self.confidence, UNIT_RANGE),
            ("community_consensus", self.community_consensus, UNIT_RANGE),
        ];
        for (field, value, (lo, hi)) in checks {
            if let Some(v) = value {
                if !v.is_finite() || v < lo || v > hi {
                    return Err(field);
                }
            }
        }
        Ok(())
    }
}

/// An enriched message as persisted. Never mutated after insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Database primary key
    pub id: i64,
    /// Platform-issued message identifier, unique
    pub external_id: String,
    /// Foreign key to users
    pub user_id: i64,
    /// Foreign key to channels
    pub channel_id: i64,
    /// Raw message text
    pub content: String,
    /// Author-supplied timestamp
    pub created_at: DateTime<Utc>,
    /// Ingestion timestamp
    pub stored_at: DateTime<Utc>,
    /// Oracle-derived signals
    #[serde(flatten)]
    pub enrichment: Enrichment,
}

/// Data for inserting a message
#[derive(Debug, Clone)]
pub struct NewMessage {
    /// Platform-issued message identifier
    pub external_id: String,
    /// Resolved author
    pub user_id: i64,
    /// Resolved channel
    pub channel_id: i64,
    /// Raw message text
    pub content: String,
    /// Author-supplied timestamp
    pub created_at: DateTime<Utc>,
    /// Oracle-derived signals
    pub enrichment: Enrichment,
}

/// Outcome of an insert-if-absent
#[derive(Debug, Clone, PartialEq)]
pub enum StoreResult {
    /// The message was new and has been inserted
    Created(StoredMessage),
    /// A row with the same external id already existed; it is returned unchanged
    AlreadyExists(StoredMessage),
}

impl StoreResult {
    /// The persisted row, whichever way it got there
    #[must_use]
    pub const fn message(&self) -> &StoredMessage {
        match self {
            Self::Created(m) | Self::AlreadyExists(m) => m,
        }
    }

    /// True when this call created the row
    #[must_use]
    pub const fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Message event delivered by the chat gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    /// Platform message id; the idempotency key
    pub external_message_id: String,
    /// Platform author id
    pub external_author_id: String,
    /// Author display name
    pub author_display_name: String,
    /// True for bots and webhooks
    #[serde(default)]
    pub author_is_automated: bool,
    /// Platform channel id
    pub external_channel_id: String,
    /// Channel name
    pub channel_name: String,
    /// Raw text
    pub content: String,
    /// Author-supplied timestamp
    pub created_at: DateTime<Utc>,
}

/// Windowed statistics for one protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolStats {
    /// Protocol the statistics are for
    pub protocol_name: String,
    /// Trailing window in days, if one was applied
    pub window_days: Option<u32>,
    /// Mean of non-null sentiment scores
    pub average_sentiment: Option<f64>,
    /// Mean of non-null confidences
    pub average_confidence: Option<f64>,
    /// Number of selected messages, including those without a sentiment
    pub message_count: usize,
    /// Content of the most recent selected message
    pub latest_message: String,
    /// Risk assessment of the most recent selected message
    pub latest_risk_assessment: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enrichment_ranges() {
        let ok = Enrichment {
            sentiment_score: Some(-1.0),
            confidence: Some(1.0),
            community_consensus: Some(0.0),
            ..Enrichment::default()
        };
        assert!(ok.check_ranges().is_ok());

        let bad = Enrichment {
            confidence: Some(1.2),
            ..Enrichment::default()
        };
        assert_eq!(bad.check_ranges(), Err("confidence"));

        let nan = Enrichment {
            sentiment_score: Some(f64::NAN),
            ..Enrichment::default()
        };
        assert_eq!(nan.check_ranges(), Err("sentiment_score"));
    }

    #[test]
    fn test_enrichment_is_empty() {
        assert!(Enrichment::default().is_empty());
        let e = Enrichment {
            risk_assessment: Some("high".into()),
            ..Enrichment::default()
        };
        assert!(!e.is_empty());
    }

    #[test]
    fn test_inbound_event_camel_case() {
        let json = r#"{
            "externalMessageId": "m1",
            "externalAuthorId": "u1",
            "authorDisplayName": "alice",
            "externalChannelId": "c1",
            "channelName": "alpha",
            "content": "hello there everyone",
            "createdAt": "2026-01-02T03:04:05Z"
        }"#;
        let event: InboundEvent = serde_json::from_str(json).expect("valid event");
        assert_eq!(event.external_message_id, "m1");
        assert!(!event.author_is_automated);
    }

    #[test]
    fn test_stored_message_serializes_flat() {
        let msg = StoredMessage {
            id: 1,
            external_id: "m1".into(),
            user_id: 2,
            channel_id: 3,
            content: "text".into(),
            created_at: Utc::now(),
            stored_at: Utc::now(),
            enrichment: Enrichment {
                protocol_name: Some("Bitcoin".into()),
                ..Enrichment::default()
            },
        };
        let value = serde_json::to_value(&msg).expect("serializable");
        assert_eq!(value["protocol_name"], "Bitcoin");
        assert!(value["sentiment_score"].is_null());
    }
}
