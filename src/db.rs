use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::error::{Result, SentimentError};
use crate::models::{Channel, Enrichment, NewMessage, StoreResult, StoredMessage, User};
use crate::schema::{channels, messages, users};
use crate::validation::InputValidator;

// Type alias for the database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Database manager for handling connections and operations
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open (or create) a database with default pool settings
    pub fn new(database_url: &str) -> Result<Self> {
        Self::open(database_url, 10, Duration::from_secs(30), Duration::from_secs(5))
    }

    /// Open a database using the configured pool size and timeouts
    pub fn from_config(config: &DatabaseConfig) -> Result<Self> {
        Self::open(
            &config.url,
            config.max_connections,
            Duration::from_secs(config.connection_timeout_secs),
            Duration::from_millis(config.busy_timeout_ms),
        )
    }

    fn open(
        database_url: &str,
        max_connections: u32,
        connection_timeout: Duration,
        busy_timeout: Duration,
    ) -> Result<Self> {
        // Pooled connections to ":memory:" never share a schema
        if InputValidator::is_in_memory_database_url(database_url) {
            return Err(SentimentError::InvalidConfig(format!(
                "in-memory database {database_url} cannot back a connection pool"
            )));
        }
        let path = database_path(database_url);

        // Create parent directory if it doesn't exist
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // WAL + busy timeout so concurrent writers queue inside SQLite
        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            conn.busy_timeout(busy_timeout)
        });
        let pool = Pool::builder()
            .max_size(max_connections)
            .connection_timeout(connection_timeout)
            .build(manager)?;

        // Run migrations
        let conn = pool.get()?;
        Self::run_migrations(&conn)?;

        info!(path, max_connections, "Database opened");
        Ok(Self { pool })
    }

    /// Run database migrations
    fn run_migrations(conn: &Connection) -> Result<()> {
        conn.execute_batch(include_str!(
            "../migrations/2026-10-19-000000_create_tables/up.sql"
        ))?;
        debug!("Database migrations complete");
        Ok(())
    }

    /// Get a connection from the pool
    pub fn get_connection(&self) -> Result<DbConnection> {
        Ok(self.pool.get()?)
    }

    /// Get the user with this external id, creating it on first sight.
    ///
    /// The insert is a single conflict-ignoring statement, so concurrent
    /// callers converge on one row. An existing display name is never
    /// overwritten.
    pub fn get_or_create_user(&self, external_id: &str, display_name: &str) -> Result<User> {
        let conn = self.get_connection()?;

        let inserted = conn.execute(
            &format!(
                "INSERT INTO {} ({}, {}, {}) VALUES (?1, ?2, ?3) ON CONFLICT({}) DO NOTHING",
                users::TABLE,
                users::EXTERNAL_ID,
                users::DISPLAY_NAME,
                users::CREATED_AT,
                users::EXTERNAL_ID
            ),
            params![external_id, display_name, Utc::now()],
        )?;
        if inserted > 0 {
            debug!(external_id, "Created user");
        }

        conn.query_row(
            &format!("SELECT * FROM {} WHERE {} = ?1", users::TABLE, users::EXTERNAL_ID),
            params![external_id],
            map_user,
        )
        .map_err(SentimentError::from)
    }

    /// Get the channel with this external id, creating it on first sight
    pub fn get_or_create_channel(&self, external_id: &str, name: &str) -> Result<Channel> {
        let conn = self.get_connection()?;

        let inserted = conn.execute(
            &format!(
                "INSERT INTO {} ({}, {}, {}) VALUES (?1, ?2, ?3) ON CONFLICT({}) DO NOTHING",
                channels::TABLE,
                channels::EXTERNAL_ID,
                channels::NAME,
                channels::CREATED_AT,
                channels::EXTERNAL_ID
            ),
            params![external_id, name, Utc::now()],
        )?;
        if inserted > 0 {
            debug!(external_id, "Created channel");
        }

        conn.query_row(
            &format!(
                "SELECT * FROM {} WHERE {} = ?1",
                channels::TABLE,
                channels::EXTERNAL_ID
            ),
            params![external_id],
            map_channel,
        )
        .map_err(SentimentError::from)
    }

    /// Insert a message unless one with the same external id exists.
    ///
    /// One conflict-ignoring INSERT decides the outcome; an existing row is
    /// returned untouched.
    pub fn insert_message_if_absent(&self, new_message: NewMessage) -> Result<StoreResult> {
        let conn = self.get_connection()?;
        let stored_at = Utc::now();
        let enrichment = &new_message.enrichment;
        let indicators = enrichment
            .technical_indicators
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let inserted = conn.execute(
            &format!(
                "INSERT INTO {} ({}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12) \
                 ON CONFLICT({}) DO NOTHING",
                messages::TABLE,
                messages::EXTERNAL_ID,
                messages::USER_ID,
                messages::CHANNEL_ID,
                messages::CONTENT,
                messages::CREATED_AT,
                messages::STORED_AT,
                messages::PROTOCOL_NAME,
                messages::SENTIMENT_SCORE,
                messages::CONFIDENCE,
                messages::TECHNICAL_INDICATORS,
                messages::RISK_ASSESSMENT,
                messages::COMMUNITY_CONSENSUS,
                messages::EXTERNAL_ID
            ),
            params![
                new_message.external_id,
                new_message.user_id,
                new_message.channel_id,
                new_message.content,
                new_message.created_at,
                stored_at,
                enrichment.protocol_name,
                enrichment.sentiment_score,
                enrichment.confidence,
                indicators,
                enrichment.risk_assessment,
                enrichment.community_consensus
            ],
        )?;

        if inserted == 0 {
            let existing = query_message_by_external_id(&conn, &new_message.external_id)?
                .ok_or_else(|| {
                    SentimentError::Other(format!(
                        "Message {} conflicted but could not be read back",
                        new_message.external_id
                    ))
                })?;
            return Ok(StoreResult::AlreadyExists(existing));
        }

        let id = conn.last_insert_rowid();
        Ok(StoreResult::Created(StoredMessage {
            id,
            external_id: new_message.external_id,
            user_id: new_message.user_id,
            channel_id: new_message.channel_id,
            content: new_message.content,
            created_at: new_message.created_at,
            stored_at,
            enrichment: new_message.enrichment,
        }))
    }

    /// Get a message by its external id
    pub fn get_message_by_external_id(&self, external_id: &str) -> Result<Option<StoredMessage>> {
        let conn = self.get_connection()?;
        query_message_by_external_id(&conn, external_id)
    }

    /// All messages for a protocol, optionally restricted to `created_at >= since`,
    /// newest first
    pub fn get_protocol_messages(
        &self,
        protocol_name: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<StoredMessage>> {
        let conn = self.get_connection()?;

        let mut query = format!(
            "SELECT * FROM {} WHERE {} = ?",
            messages::TABLE,
            messages::PROTOCOL_NAME
        );
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(protocol_name.to_string())];

        if let Some(since) = since {
            query.push_str(&format!(" AND {} >= ?", messages::CREATED_AT));
            params.push(Box::new(since));
        }

        query.push_str(&format!(
            " ORDER BY {} DESC, {} DESC",
            messages::CREATED_AT,
            messages::ID
        ));

        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), map_message)?;
        collect_rows(rows)
    }

    /// Distinct protocol names observed, sorted
    pub fn get_protocol_names(&self) -> Result<Vec<String>> {
        let conn = self.get_connection()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT {} FROM {} WHERE {} IS NOT NULL ORDER BY {} ASC",
            messages::PROTOCOL_NAME,
            messages::TABLE,
            messages::PROTOCOL_NAME,
            messages::PROTOCOL_NAME
        ))?;
        let rows = stmt.query_map(params![], |row| row.get::<_, String>(0))?;
        collect_rows(rows)
    }

    /// Most recent messages in a channel, newest first
    pub fn get_channel_messages(&self, channel_id: i64, limit: u32) -> Result<Vec<StoredMessage>> {
        let conn = self.get_connection()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT * FROM {} WHERE {} = ?1 ORDER BY {} DESC, {} DESC LIMIT ?2",
            messages::TABLE,
            messages::CHANNEL_ID,
            messages::CREATED_AT,
            messages::ID
        ))?;
        let rows = stmt.query_map(params![channel_id, limit], map_message)?;
        collect_rows(rows)
    }

    /// Most recent messages across all channels, newest first
    pub fn get_recent_messages(&self, limit: u32) -> Result<Vec<StoredMessage>> {
        let conn = self.get_connection()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT * FROM {} ORDER BY {} DESC, {} DESC LIMIT ?1",
            messages::TABLE,
            messages::CREATED_AT,
            messages::ID
        ))?;
        let rows = stmt.query_map(params![limit], map_message)?;
        collect_rows(rows)
    }

    /// Get a channel by its internal id
    pub fn get_channel(&self, id: i64) -> Result<Option<Channel>> {
        let conn = self.get_connection()?;

        let channel = conn
            .query_row(
                &format!("SELECT * FROM {} WHERE {} = ?1", channels::TABLE, channels::ID),
                params![id],
                map_channel,
            )
            .optional()?;

        Ok(channel)
    }

    /// All users, by internal id
    pub fn get_users(&self) -> Result<Vec<User>> {
        let conn = self.get_connection()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT * FROM {} ORDER BY {} ASC",
            users::TABLE,
            users::ID
        ))?;
        let rows = stmt.query_map(params![], map_user)?;
        collect_rows(rows)
    }

    /// All channels, by internal id
    pub fn get_channels(&self) -> Result<Vec<Channel>> {
        let conn = self.get_connection()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT * FROM {} ORDER BY {} ASC",
            channels::TABLE,
            channels::ID
        ))?;
        let rows = stmt.query_map(params![], map_channel)?;
        collect_rows(rows)
    }

    /// Get statistics about stored rows
    pub fn get_storage_stats(&self) -> Result<StorageStats> {
        let conn = self.get_connection()?;

        let count = |table: &str| -> Result<usize> {
            let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), params![], |row| {
                row.get(0)
            })?;
            Ok(usize::try_from(n).unwrap_or_default())
        };

        Ok(StorageStats {
            users: count(users::TABLE)?,
            channels: count(channels::TABLE)?,
            messages: count(messages::TABLE)?,
        })
    }
}

/// Row counts per table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageStats {
    pub users: usize,
    pub channels: usize,
    pub messages: usize,
}

/// Strip an optional `sqlite:` / `sqlite://` scheme from a database URL
fn database_path(database_url: &str) -> &str {
    database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url)
}

fn query_message_by_external_id(conn: &Connection, external_id: &str) -> Result<Option<StoredMessage>> {
    let message = conn
        .query_row(
            &format!(
                "SELECT * FROM {} WHERE {} = ?1",
                messages::TABLE,
                messages::EXTERNAL_ID
            ),
            params![external_id],
            map_message,
        )
        .optional()?;

    Ok(message)
}

fn collect_rows<T>(rows: impl Iterator<Item = rusqlite::Result<T>>) -> Result<Vec<T>> {
    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Map a database row to a User
fn map_user(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(users::ID)?,
        external_id: row.get(users::EXTERNAL_ID)?,
        display_name: row.get(users::DISPLAY_NAME)?,
        created_at: row.get(users::CREATED_AT)?,
    })
}

/// Map a database row to a Channel
fn map_channel(row: &Row) -> rusqlite::Result<Channel> {
    Ok(Channel {
        id: row.get(channels::ID)?,
        external_id: row.get(channels::EXTERNAL_ID)?,
        name: row.get(channels::NAME)?,
        created_at: row.get(channels::CREATED_AT)?,
    })
}

/// Map a database row to a StoredMessage
fn map_message(row: &Row) -> rusqlite::Result<StoredMessage> {
    let indicators: Option<String> = row.get(messages::TECHNICAL_INDICATORS)?;
    let technical_indicators = indicators
        .map(|raw| serde_json::from_str::<Vec<String>>(&raw))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;

    Ok(StoredMessage {
        id: row.get(messages::ID)?,
        external_id: row.get(messages::EXTERNAL_ID)?,
        user_id: row.get(messages::USER_ID)?,
        channel_id: row.get(messages::CHANNEL_ID)?,
        content: row.get(messages::CONTENT)?,
        created_at: row.get(messages::CREATED_AT)?,
        stored_at: row.get(messages::STORED_AT)?,
        enrichment: Enrichment {
            protocol_name: row.get(messages::PROTOCOL_NAME)?,
            sentiment_score: row.get(messages::SENTIMENT_SCORE)?,
            confidence: row.get(messages::CONFIDENCE)?,
            technical_indicators,
            risk_assessment: row.get(messages::RISK_ASSESSMENT)?,
            community_consensus: row.get(messages::COMMUNITY_CONSENSUS)?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_path_strips_scheme() {
        assert_eq!(database_path("sqlite://data/a.db"), "data/a.db");
        assert_eq!(database_path("sqlite:data/a.db"), "data/a.db");
        assert_eq!(database_path("/tmp/a.db"), "/tmp/a.db");
    }
}
