use anyhow::{anyhow, Result};

use crate::models::InboundEvent;

/// Longest accepted platform identifier
pub const MAX_EXTERNAL_ID_LENGTH: usize = 128;
/// Longest accepted protocol name
pub const MAX_PROTOCOL_NAME_LENGTH: usize = 100;
/// Longest accepted aggregation window (ten years)
pub const MAX_WINDOW_DAYS: u32 = 3650;

/// Validation utilities for inbound events and read-side query parameters
#[derive(Debug, Copy, Clone)]
pub struct InputValidator;

impl InputValidator {
    /// Validate a platform-issued identifier
    pub fn validate_external_id(field: &str, id: &str) -> Result<()> {
        if id.trim().is_empty() {
            return Err(anyhow!("{field} cannot be empty"));
        }

        if id.chars().count() > MAX_EXTERNAL_ID_LENGTH {
            return Err(anyhow!("{field} too long (max {MAX_EXTERNAL_ID_LENGTH} characters)"));
        }

        if id.chars().any(char::is_control) {
            return Err(anyhow!("{field} contains control characters"));
        }

        Ok(())
    }

    /// Validate the identifiers of a gateway event before any work is done on it
    pub fn validate_event(event: &InboundEvent) -> Result<()> {
        Self::validate_external_id("externalMessageId", &event.external_message_id)?;
        Self::validate_external_id("externalAuthorId", &event.external_author_id)?;
        Self::validate_external_id("externalChannelId", &event.external_channel_id)?;
        Ok(())
    }

    /// Validate a page size against the configured maximum
    pub fn validate_limit(limit: u32, max: u32) -> Result<u32> {
        if limit == 0 {
            return Err(anyhow!("limit must be at least 1"));
        }

        if limit > max {
            return Err(anyhow!("limit too large (max {max})"));
        }

        Ok(limit)
    }

    /// Validate an aggregation window in days
    pub fn validate_window_days(days: u32) -> Result<u32> {
        if days == 0 {
            return Err(anyhow!("windowDays must be at least 1"));
        }

        if days > MAX_WINDOW_DAYS {
            return Err(anyhow!("windowDays too large (max {MAX_WINDOW_DAYS})"));
        }

        Ok(days)
    }

    /// Validate a protocol name taken from a request path
    pub fn validate_protocol_name(name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(anyhow!("Protocol name cannot be empty"));
        }

        if name.chars().count() > MAX_PROTOCOL_NAME_LENGTH {
            return Err(anyhow!(
                "Protocol name too long (max {MAX_PROTOCOL_NAME_LENGTH} characters)"
            ));
        }

        if name.chars().any(char::is_control) {
            return Err(anyhow!("Protocol name contains invalid characters"));
        }

        Ok(())
    }

    /// Sanitize display text (names), keeping ordinary whitespace
    #[must_use]
    pub fn sanitize_text(text: &str) -> String {
        text.chars()
            .filter(|c| !c.is_control() || *c == '\n' || *c == '\t' || *c == '\r')
            .collect::<String>()
            .trim()
            .to_string()
    }

    /// Validate database URL
    pub fn validate_database_url(url: &str) -> Result<()> {
        if url.trim().is_empty() {
            return Err(anyhow!("Database URL cannot be empty"));
        }

        if url.len() > 1000 {
            return Err(anyhow!("Database URL too long"));
        }

        if url.contains("://") && !url.starts_with("sqlite://") {
            return Err(anyhow!("Only SQLite databases are supported"));
        }

        if Self::is_in_memory_database_url(url) {
            return Err(anyhow!(
                "In-memory databases are not supported: each pooled connection would see its own empty database"
            ));
        }

        Ok(())
    }

    /// Whether `url` names a private in-memory SQLite database
    #[must_use]
    pub fn is_in_memory_database_url(url: &str) -> bool {
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);
        let (file, query) = path.split_once('?').unwrap_or((path, ""));
        file == ":memory:" || file.is_empty() || query.split('&').any(|param| param == "mode=memory")
    }
}
