//! In-memory store for testing and offline mode

use async_trait::async_trait;
use postpilot_domain::{
    AuditError, AuditLog, PostStatus, PostStore, PublicationAttempt, ScheduledPost, StoreError,
};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

/// In-memory post store and audit log implementation
pub struct InMemoryStore {
    posts: RwLock<HashMap<Uuid, ScheduledPost>>,
    claims: RwLock<HashMap<Uuid, OffsetDateTime>>,
    attempts: RwLock<Vec<PublicationAttempt>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            posts: RwLock::new(HashMap::new()),
            claims: RwLock::new(HashMap::new()),
            attempts: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PostStore for InMemoryStore {
    async fn insert(&self, post: &ScheduledPost) -> Result<(), StoreError> {
        let mut posts = self
            .posts
            .write()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        posts.insert(post.id, post.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ScheduledPost>, StoreError> {
        let posts = self
            .posts
            .read()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(posts.get(&id).cloned())
    }

    async fn update(&self, post: &ScheduledPost) -> Result<(), StoreError> {
        let mut posts = self
            .posts
            .write()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        if !posts.contains_key(&post.id) {
            return Err(StoreError::NotFound(post.id));
        }
        posts.insert(post.id, post.clone());
        Ok(())
    }

    async fn list_by_owner(
        &self,
        owner: &str,
        status: Option<PostStatus>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ScheduledPost>, StoreError> {
        let posts = self
            .posts
            .read()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let mut matching: Vec<_> = posts
            .values()
            .filter(|p| p.owner == owner && status.is_none_or(|s| p.status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn find_due(&self, now: OffsetDateTime) -> Result<Vec<ScheduledPost>, StoreError> {
        let posts = self
            .posts
            .read()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let mut due: Vec<_> = posts
            .values()
            .filter(|p| p.status == PostStatus::Scheduled && p.scheduled_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|p| p.created_at);
        Ok(due)
    }

    async fn try_claim(
        &self,
        id: Uuid,
        now: OffsetDateTime,
        lease: Duration,
    ) -> Result<bool, StoreError> {
        let posts = self
            .posts
            .read()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        match posts.get(&id) {
            Some(post) if post.status == PostStatus::Scheduled => {}
            _ => return Ok(false),
        }

        let mut claims = self
            .claims
            .write()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        if let Some(claimed_until) = claims.get(&id) {
            if *claimed_until > now {
                return Ok(false);
            }
        }
        claims.insert(id, now + lease);
        Ok(true)
    }

    async fn release_claim(&self, id: Uuid) -> Result<(), StoreError> {
        let mut claims = self
            .claims
            .write()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        claims.remove(&id);
        Ok(())
    }

    async fn mark_published(
        &self,
        id: Uuid,
        published_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let mut posts = self
            .posts
            .write()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let post = posts.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        post.mark_published(published_at)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), StoreError> {
        let mut posts = self
            .posts
            .write()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let post = posts.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        post.mark_failed(error)
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

#[async_trait]
impl AuditLog for InMemoryStore {
    async fn record(&self, attempt: &PublicationAttempt) -> Result<(), AuditError> {
        let mut attempts = self
            .attempts
            .write()
            .map_err(|e| AuditError::Database(e.to_string()))?;
        attempts.push(attempt.clone());
        Ok(())
    }

    async fn attempts_for(&self, post_id: Uuid) -> Result<Vec<PublicationAttempt>, AuditError> {
        let attempts = self
            .attempts
            .read()
            .map_err(|e| AuditError::Database(e.to_string()))?;
        Ok(attempts
            .iter()
            .filter(|a| a.post_id == post_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use postpilot_domain::Platform;
    use time::Duration as TimeDuration;

    fn due_post(now: OffsetDateTime) -> ScheduledPost {
        ScheduledPost::new(
            "testuser",
            "hello",
            vec![Platform::Twitter],
            now - TimeDuration::minutes(5),
            None,
            now - TimeDuration::hours(1),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_insert_get_roundtrip() {
        let store = InMemoryStore::new();
        let now = OffsetDateTime::now_utc();
        let post = due_post(now);

        store.insert(&post).await.unwrap();
        let retrieved = store.get(post.id).await.unwrap().unwrap();
        assert_eq!(retrieved.content, "hello");
    }

    #[tokio::test]
    async fn test_find_due_is_fifo() {
        let store = InMemoryStore::new();
        let now = OffsetDateTime::now_utc();

        let older = ScheduledPost::new(
            "testuser",
            "older",
            vec![Platform::Twitter],
            now - TimeDuration::minutes(5),
            None,
            now - TimeDuration::hours(2),
        )
        .unwrap();
        let newer = due_post(now);
        store.insert(&newer).await.unwrap();
        store.insert(&older).await.unwrap();

        let due = store.find_due(now).await.unwrap();
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].id, older.id);
    }

    #[tokio::test]
    async fn test_claim_is_exclusive_until_released() {
        let store = InMemoryStore::new();
        let now = OffsetDateTime::now_utc();
        let post = due_post(now);
        store.insert(&post).await.unwrap();

        let lease = Duration::from_secs(120);
        assert!(store.try_claim(post.id, now, lease).await.unwrap());
        assert!(!store.try_claim(post.id, now, lease).await.unwrap());

        store.release_claim(post.id).await.unwrap();
        assert!(store.try_claim(post.id, now, lease).await.unwrap());
    }

    #[tokio::test]
    async fn test_terminal_transitions_reflected_in_store() {
        let store = InMemoryStore::new();
        let now = OffsetDateTime::now_utc();
        let post = due_post(now);
        store.insert(&post).await.unwrap();

        store.mark_published(post.id, now).await.unwrap();
        let stored = store.get(post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Published);
        assert!(store.find_due(now).await.unwrap().is_empty());
        assert!(store.mark_failed(post.id, "late").await.is_err());
    }

    #[tokio::test]
    async fn test_audit_filtering_by_post() {
        let store = InMemoryStore::new();
        let now = OffsetDateTime::now_utc();
        let post_a = due_post(now);
        let post_b = due_post(now);

        store
            .record(&PublicationAttempt::success(&post_a, now))
            .await
            .unwrap();
        store
            .record(&PublicationAttempt::failure(&post_b, now, "boom"))
            .await
            .unwrap();

        assert_eq!(store.attempts_for(post_a.id).await.unwrap().len(), 1);
        assert_eq!(store.attempts_for(post_b.id).await.unwrap().len(), 1);
    }
}
