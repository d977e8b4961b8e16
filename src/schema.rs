//! Database schema definitions
//!
//! Constants for table and column names used with rusqlite. The DDL itself
//! lives in `migrations/`.

/// Users table schema
pub mod users {
    /// Table name
    pub const TABLE: &str = "users";
    /// Primary key column
    pub const ID: &str = "id";
    /// Platform identifier column (unique)
    pub const EXTERNAL_ID: &str = "external_id";
    /// Display name column
    pub const DISPLAY_NAME: &str = "display_name";
    /// Creation timestamp column
    pub const CREATED_AT: &str = "created_at";
}

/// Channels table schema
pub mod channels {
    /// Table name
    pub const TABLE: &str = "channels";
    /// Primary key column
    pub const ID: &str = "id";
    /// Platform identifier column (unique)
    pub const EXTERNAL_ID: &str = "external_id";
    /// Channel name column
    pub const NAME: &str = "name";
    /// Creation timestamp column
    pub const CREATED_AT: &str = "created_at";
}

/// Messages table schema
pub mod messages {
    /// Table name
    pub const TABLE: &str = "messages";
    /// Primary key column
    pub const ID: &str = "id";
    /// Platform message identifier column (unique)
    pub const EXTERNAL_ID: &str = "external_id";
    /// Foreign key to users
    pub const USER_ID: &str = "user_id";
    /// Foreign key to channels
    pub const CHANNEL_ID: &str = "channel_id";
    /// Raw text column
    pub const CONTENT: &str = "content";
    /// Author-supplied timestamp column
    pub const CREATED_AT: &str = "created_at";
    /// Ingestion timestamp column
    pub const STORED_AT: &str = "stored_at";
    /// Protocol/token name column
    pub const PROTOCOL_NAME: &str = "protocol_name";
    /// Sentiment score column
    pub const SENTIMENT_SCORE: &str = "sentiment_score";
    /// Confidence column
    pub const CONFIDENCE: &str = "confidence";
    /// JSON-encoded indicator list column
    pub const TECHNICAL_INDICATORS: &str = "technical_indicators";
    /// Risk assessment column
    pub const RISK_ASSESSMENT: &str = "risk_assessment";
    /// Community consensus column
    pub const COMMUNITY_CONSENSUS: &str = "community_consensus";
}
