//! Maps platform ids to stable internal records, creating them on first sight.

use std::sync::Arc;

use tracing::debug;

use crate::error::StorageError;
use crate::locks::KeyedLocks;
use crate::models::{Channel, User};
use crate::repository::SentimentRepository;

/// Get-or-create for users and channels.
///
/// Concurrent calls for the same external id are serialized in-process and
/// the insert itself ignores conflicts, so every caller gets the same row.
#[derive(Clone)]
pub struct EntityResolver {
    repo: Arc<dyn SentimentRepository>,
    locks: KeyedLocks,
}

impl EntityResolver {
    pub fn new(repo: Arc<dyn SentimentRepository>) -> Self {
        Self {
            repo,
            locks: KeyedLocks::new(),
        }
    }

    /// Resolve an author. A display name seen later never replaces the first.
    pub async fn resolve_user(&self, external_id: &str, display_name: &str) -> Result<User, StorageError> {
        let _guard = self.locks.lock(&format!("user:{external_id}")).await;
        let user = self.repo.get_or_create_user(external_id, display_name).await?;
        debug!(external_id, user_id = user.id, "Resolved user");
        Ok(user)
    }

    /// Resolve a channel. The first observed name wins.
    pub async fn resolve_channel(&self, external_id: &str, name: &str) -> Result<Channel, StorageError> {
        let _guard = self.locks.lock(&format!("channel:{external_id}")).await;
        let channel = self.repo.get_or_create_channel(external_id, name).await?;
        debug!(external_id, channel_id = channel.id, "Resolved channel");
        Ok(channel)
    }

    /// Keys currently being resolved
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.locks.in_flight()
    }
}
