//! Sentiment extraction client.
//!
//! Sends one message to the classification oracle under a fixed instruction,
//! bounds the call with a timeout, and turns the answer into an
//! [`Enrichment`] or a typed [`ExtractionFailure`]. No retries happen here.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::ExtractionFailure;
use crate::models::Enrichment;
use crate::oracle::ClassificationOracle;
use crate::utils::{strip_code_blocks, truncate_chars};

/// Instruction sent with every message
pub const EXTRACTION_INSTRUCTION: &str = "You analyse chat messages from crypto and DeFi communities \
for investment signals. Respond with a single JSON object and nothing else, using exactly these keys:\n\
- \"protocol_name\": the protocol or token the message is about (e.g. \"Bitcoin\", \"Uniswap\"), or null if none is mentioned\n\
- \"sentiment_score\": investment sentiment as a number from -1.0 (very bearish) to 1.0 (very bullish), or null\n\
- \"confidence\": your confidence in the sentiment as a number from 0.0 to 1.0, or null\n\
- \"technical_indicators\": list of technical-analysis indicators or patterns mentioned (e.g. \"RSI\", \"breakout\"), or null\n\
- \"risk_assessment\": one or two sentences on the risk implied by the message, or null\n\
- \"community_consensus\": estimated share of the community that would agree, from 0.0 to 1.0, or null";

/// Outcome of one extraction call
pub type ExtractionResult = Result<Enrichment, ExtractionFailure>;

/// Shape of the oracle's JSON answer before validation
#[derive(Debug, Deserialize)]
struct RawExtraction {
    #[serde(default, alias = "protocolName")]
    protocol_name: Option<String>,
    #[serde(default, alias = "sentimentScore")]
    sentiment_score: Option<f64>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default, alias = "technicalIndicators")]
    technical_indicators: Option<Vec<String>>,
    #[serde(default, alias = "riskAssessment")]
    risk_assessment: Option<String>,
    #[serde(default, alias = "communityConsensus")]
    community_consensus: Option<f64>,
}

/// Placeholder strings models use instead of null
fn is_placeholder(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "" | "none" | "null" | "n/a" | "unknown"
    )
}

fn clean_text_field(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !is_placeholder(v))
}

impl From<RawExtraction> for Enrichment {
    fn from(raw: RawExtraction) -> Self {
        let technical_indicators = raw
            .technical_indicators
            .map(|items| {
                items
                    .into_iter()
                    .map(|item| item.trim().to_string())
                    .filter(|item| !item.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|items| !items.is_empty());

        Self {
            protocol_name: clean_text_field(raw.protocol_name),
            sentiment_score: raw.sentiment_score,
            confidence: raw.confidence,
            technical_indicators,
            risk_assessment: clean_text_field(raw.risk_assessment),
            community_consensus: raw.community_consensus,
        }
    }
}

/// Parse and validate an oracle answer.
///
/// Out-of-range numbers reject the whole answer; nothing is clamped.
pub fn parse_extraction(answer: &str) -> ExtractionResult {
    let body = strip_code_blocks(answer);
    // Some models wrap the object in prose
    let body = match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if start < end => &body[start..=end],
        _ => body,
    };
    let raw: RawExtraction = serde_json::from_str(body)
        .map_err(|e| ExtractionFailure::malformed(format!("not an extraction record: {e}")))?;

    let enrichment = Enrichment::from(raw);
    enrichment
        .check_ranges()
        .map_err(|field| ExtractionFailure::malformed(format!("{field} out of range")))?;

    Ok(enrichment)
}

/// Client for the extraction contract
#[derive(Clone)]
pub struct SentimentExtractor {
    oracle: Arc<dyn ClassificationOracle>,
    timeout: Duration,
    max_input_chars: usize,
}

impl SentimentExtractor {
    pub fn new(oracle: Arc<dyn ClassificationOracle>, timeout: Duration, max_input_chars: usize) -> Self {
        Self {
            oracle,
            timeout,
            max_input_chars,
        }
    }

    /// Extract investment signals from `text`.
    ///
    /// Suspends only the calling pipeline. A call running past the timeout
    /// is abandoned and reported as `Timeout`.
    pub async fn extract(&self, text: &str) -> ExtractionResult {
        let input = truncate_chars(text, self.max_input_chars);

        let answer = tokio::time::timeout(self.timeout, self.oracle.classify(EXTRACTION_INSTRUCTION, input))
            .await
            .map_err(|_| {
                ExtractionFailure::timeout(format!("no answer within {}ms", self.timeout.as_millis()))
            })??;

        debug!(answer_len = answer.len(), "Oracle answered");
        parse_extraction(&answer)
    }
}
