//! Cheap pre-check deciding whether a message is worth sending to the oracle.

use crate::config::IngestionConfig;

/// Default minimum content length, in characters
pub const DEFAULT_MIN_CONTENT_LENGTH: usize = 10;

/// Why a message was not enriched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Fewer characters than the configured minimum
    TooShort,
    /// Posted by a bot, webhook, or this service itself
    AutomatedAuthor,
}

/// Filter verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    /// Send to the oracle
    Eligible,
    /// Drop without further work
    Skip(SkipReason),
}

/// Pure eligibility rule
#[derive(Debug, Clone)]
pub struct EligibilityFilter {
    min_content_length: usize,
    self_author_id: Option<String>,
}

impl Default for EligibilityFilter {
    fn default() -> Self {
        Self {
            min_content_length: DEFAULT_MIN_CONTENT_LENGTH,
            self_author_id: None,
        }
    }
}

impl EligibilityFilter {
    #[must_use]
    pub fn from_config(config: &IngestionConfig) -> Self {
        Self {
            min_content_length: config.min_content_length,
            self_author_id: config.self_author_id.clone(),
        }
    }

    /// Skip short content and automated authors.
    ///
    /// Length is counted in characters, not bytes.
    #[must_use]
    pub fn check(&self, content: &str, author_is_automated: bool, author_id: &str) -> Eligibility {
        if author_is_automated || self.self_author_id.as_deref() == Some(author_id) {
            return Eligibility::Skip(SkipReason::AutomatedAuthor);
        }
        if content.chars().count() < self.min_content_length {
            return Eligibility::Skip(SkipReason::TooShort);
        }
        Eligibility::Eligible
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_content_skipped() {
        let filter = EligibilityFilter::default();
        assert_eq!(filter.check("ok", false, "u1"), Eligibility::Skip(SkipReason::TooShort));
        assert_eq!(filter.check("123456789", false, "u1"), Eligibility::Skip(SkipReason::TooShort));
        assert_eq!(filter.check("1234567890", false, "u1"), Eligibility::Eligible);
    }

    #[test]
    fn test_length_counts_characters() {
        let filter = EligibilityFilter::default();
        // 5 characters, 20 bytes
        assert_eq!(filter.check("🚀🚀🚀🚀🚀", false, "u1"), Eligibility::Skip(SkipReason::TooShort));
    }

    #[test]
    fn test_automated_author_skipped() {
        let filter = EligibilityFilter::default();
        assert_eq!(
            filter.check("BTC breaking out hard, huge rally incoming", true, "bot"),
            Eligibility::Skip(SkipReason::AutomatedAuthor)
        );
    }

    #[test]
    fn test_self_author_skipped() {
        let filter = EligibilityFilter::from_config(&IngestionConfig {
            min_content_length: 10,
            max_content_length: 4000,
            max_concurrent_pipelines: 4,
            self_author_id: Some("me".into()),
        });
        assert_eq!(
            filter.check("echo of my own long message", false, "me"),
            Eligibility::Skip(SkipReason::AutomatedAuthor)
        );
        assert_eq!(filter.check("someone else talking here", false, "you"), Eligibility::Eligible);
    }
}
