use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::{Database, StorageStats};
use crate::error::Result;
use crate::metrics::MetricsCollector;
use crate::models::{Channel, NewMessage, StoreResult, StoredMessage, User};

/// Async storage capability used by the pipeline and the read side
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SentimentRepository: Send + Sync {
    async fn get_or_create_user(&self, external_id: &str, display_name: &str) -> Result<User>;
    async fn get_or_create_channel(&self, external_id: &str, name: &str) -> Result<Channel>;
    async fn insert_message_if_absent(&self, message: NewMessage) -> Result<StoreResult>;
    async fn get_message_by_external_id(&self, external_id: &str) -> Result<Option<StoredMessage>>;
    async fn get_protocol_messages(
        &self,
        protocol_name: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<StoredMessage>>;
    async fn get_protocol_names(&self) -> Result<Vec<String>>;
    async fn get_channel(&self, id: i64) -> Result<Option<Channel>>;
    async fn get_channel_messages(&self, channel_id: i64, limit: u32) -> Result<Vec<StoredMessage>>;
    async fn get_recent_messages(&self, limit: u32) -> Result<Vec<StoredMessage>>;
    async fn get_users(&self) -> Result<Vec<User>>;
    async fn get_channels(&self) -> Result<Vec<Channel>>;
    async fn get_storage_stats(&self) -> Result<StorageStats>;
}

/// SQLite-backed repository. Each call runs on the blocking pool so a slow
/// statement never stalls the async workers.
#[derive(Clone)]
pub struct SqliteRepository {
    database: Database,
    metrics: Arc<MetricsCollector>,
}

impl SqliteRepository {
    pub fn new(database: Database, metrics: Arc<MetricsCollector>) -> Self {
        Self { database, metrics }
    }

    async fn run<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
    {
        let database = self.database.clone();
        let start = Instant::now();
        let result = tokio::task::spawn_blocking(move || f(&database)).await?;
        self.metrics
            .record_db_operation(operation, start.elapsed(), result.is_ok());
        result
    }
}

#[async_trait]
impl SentimentRepository for SqliteRepository {
    async fn get_or_create_user(&self, external_id: &str, display_name: &str) -> Result<User> {
        let (external_id, display_name) = (external_id.to_string(), display_name.to_string());
        self.run("get_or_create_user", move |db| db.get_or_create_user(&external_id, &display_name))
            .await
    }

    async fn get_or_create_channel(&self, external_id: &str, name: &str) -> Result<Channel> {
        let (external_id, name) = (external_id.to_string(), name.to_string());
        self.run("get_or_create_channel", move |db| db.get_or_create_channel(&external_id, &name))
            .await
    }

    async fn insert_message_if_absent(&self, message: NewMessage) -> Result<StoreResult> {
        self.run("insert_message", move |db| db.insert_message_if_absent(message))
            .await
    }

    async fn get_message_by_external_id(&self, external_id: &str) -> Result<Option<StoredMessage>> {
        let external_id = external_id.to_string();
        self.run("get_message", move |db| db.get_message_by_external_id(&external_id))
            .await
    }

    async fn get_protocol_messages(
        &self,
        protocol_name: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<StoredMessage>> {
        let protocol_name = protocol_name.to_string();
        self.run("get_protocol_messages", move |db| db.get_protocol_messages(&protocol_name, since))
            .await
    }

    async fn get_protocol_names(&self) -> Result<Vec<String>> {
        self.run("get_protocol_names", Database::get_protocol_names).await
    }

    async fn get_channel(&self, id: i64) -> Result<Option<Channel>> {
        self.run("get_channel", move |db| db.get_channel(id)).await
    }

    async fn get_channel_messages(&self, channel_id: i64, limit: u32) -> Result<Vec<StoredMessage>> {
        self.run("get_channel_messages", move |db| db.get_channel_messages(channel_id, limit))
            .await
    }

    async fn get_recent_messages(&self, limit: u32) -> Result<Vec<StoredMessage>> {
        self.run("get_recent_messages", move |db| db.get_recent_messages(limit))
            .await
    }

    async fn get_users(&self) -> Result<Vec<User>> {
        self.run("get_users", Database::get_users).await
    }

    async fn get_channels(&self) -> Result<Vec<Channel>> {
        self.run("get_channels", Database::get_channels).await
    }

    async fn get_storage_stats(&self) -> Result<StorageStats> {
        self.run("get_storage_stats", Database::get_storage_stats).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Enrichment;
    use tempfile::TempDir;

    fn repo() -> (TempDir, SqliteRepository) {
        let dir = TempDir::new().expect("temp dir");
        let url = format!("sqlite:{}", dir.path().join("test.db").display());
        let database = Database::new(&url).expect("database opens");
        (dir, SqliteRepository::new(database, Arc::new(MetricsCollector::new())))
    }

    #[tokio::test]
    async fn test_get_or_create_is_stable() {
        let (_dir, repo) = repo();
        let first = repo.get_or_create_user("u1", "alice").await.expect("create");
        let second = repo.get_or_create_user("u1", "renamed").await.expect("get");
        assert_eq!(first.id, second.id);
        assert_eq!(second.display_name, "alice");
    }

    #[tokio::test]
    async fn test_insert_if_absent_keeps_first() {
        let (_dir, repo) = repo();
        let user = repo.get_or_create_user("u1", "alice").await.expect("user");
        let channel = repo.get_or_create_channel("c1", "alpha").await.expect("channel");

        let message = |score| NewMessage {
            external_id: "m1".into(),
            user_id: user.id,
            channel_id: channel.id,
            content: "bitcoin looking strong today".into(),
            created_at: Utc::now(),
            enrichment: Enrichment {
                sentiment_score: Some(score),
                ..Enrichment::default()
            },
        };

        let first = repo.insert_message_if_absent(message(0.5)).await.expect("insert");
        assert!(first.is_created());
        let second = repo.insert_message_if_absent(message(-0.5)).await.expect("insert");
        assert!(!second.is_created());
        assert_eq!(second.message().enrichment.sentiment_score, Some(0.5));
        assert_eq!(second.message().id, first.message().id);

        let stats = repo.get_storage_stats().await.expect("stats");
        assert_eq!(stats.messages, 1);
    }
}
