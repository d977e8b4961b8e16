//! Idempotent persistence of enriched messages keyed by external id.

use std::sync::Arc;

use tracing::debug;

use crate::error::StorageError;
use crate::locks::KeyedLocks;
use crate::models::{NewMessage, StoreResult, StoredMessage};
use crate::repository::SentimentRepository;

/// Insert-if-absent store. At most one row exists per external id and an
/// existing row is never modified.
#[derive(Clone)]
pub struct MessageStore {
    repo: Arc<dyn SentimentRepository>,
    locks: KeyedLocks,
}

impl MessageStore {
    pub fn new(repo: Arc<dyn SentimentRepository>) -> Self {
        Self {
            repo,
            locks: KeyedLocks::new(),
        }
    }

    /// Persist `message` unless its external id is already stored
    pub async fn record_message(&self, message: NewMessage) -> Result<StoreResult, StorageError> {
        let _guard = self.locks.lock(&format!("message:{}", message.external_id)).await;
        let external_id = message.external_id.clone();
        let result = self.repo.insert_message_if_absent(message).await?;
        debug!(
            external_id = %external_id,
            created = result.is_created(),
            "Recorded message"
        );
        Ok(result)
    }

    /// Look up a stored message by external id
    pub async fn find(&self, external_id: &str) -> Result<Option<StoredMessage>, StorageError> {
        Ok(self.repo.get_message_by_external_id(external_id).await?)
    }
}
