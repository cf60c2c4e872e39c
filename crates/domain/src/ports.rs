//! Port definitions (traits) for external dependencies
//!
//! These traits define the boundaries between the domain and external systems.
//! Adapters implement these traits to connect to real infrastructure. The post
//! store is the single source of truth and the only synchronization point
//! across scheduler instances; no mutable state is shared in memory.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::model::{Platform, PostStatus, PublicationAttempt, PublishAck, PublishRequest, ScheduledPost};

/// Error type for post store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Post not found: {0}")]
    NotFound(Uuid),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Port for the durable scheduled-post collection
///
/// `find_due`, the claim pair and the `mark_*` updates are the engine's
/// surface; the remaining methods serve the CLI's CRUD commands.
#[async_trait]
pub trait PostStore: Send + Sync {
    async fn insert(&self, post: &ScheduledPost) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<ScheduledPost>, StoreError>;

    /// Persist an edited post (draft scheduling, content/time edits)
    async fn update(&self, post: &ScheduledPost) -> Result<(), StoreError>;

    async fn list_by_owner(
        &self,
        owner: &str,
        status: Option<PostStatus>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ScheduledPost>, StoreError>;

    /// Posts with status Scheduled and scheduled_at <= now, ordered by
    /// created_at ascending (first scheduled, first published)
    async fn find_due(&self, now: OffsetDateTime) -> Result<Vec<ScheduledPost>, StoreError>;

    /// Atomically claim a post for one coordinator run
    ///
    /// Succeeds only while the post is still Scheduled and no unexpired claim
    /// marker is set. Returns false on conflict, which is a normal skip.
    async fn try_claim(
        &self,
        id: Uuid,
        now: OffsetDateTime,
        lease: Duration,
    ) -> Result<bool, StoreError>;

    /// Clear the claim marker; claims also lapse on their own when the lease
    /// expires, so a crashed run never holds a post forever
    async fn release_claim(&self, id: Uuid) -> Result<(), StoreError>;

    /// Atomic single-item transition Scheduled -> Published
    async fn mark_published(
        &self,
        id: Uuid,
        published_at: OffsetDateTime,
    ) -> Result<(), StoreError>;

    /// Atomic single-item transition Scheduled -> Failed
    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), StoreError>;
}

/// Error type for audit log operations
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Port for the append-only publication attempt log
///
/// Entries are written once per coordinator run and never mutated or deleted
/// by the engine; retention is an external concern.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, attempt: &PublicationAttempt) -> Result<(), AuditError>;

    async fn attempts_for(&self, post_id: Uuid) -> Result<Vec<PublicationAttempt>, AuditError>;
}

/// Error type for publisher operations
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("API error: {0}")]
    Api(String),
    #[error("Rate limited")]
    RateLimited,
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Content too long: {len} > {max}")]
    ContentTooLong { len: usize, max: usize },
}

/// Port for delivering content to one named platform
///
/// The engine never re-invokes a target within one coordinator run; a repeat
/// call for the same post only happens on a fresh attempt.
#[async_trait]
pub trait PlatformPublisher: Send + Sync {
    async fn publish(
        &self,
        target: Platform,
        request: &PublishRequest,
    ) -> Result<PublishAck, PublishError>;
}

/// Port for time/clock operations (enables deterministic testing)
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> OffsetDateTime;
}

/// Real clock implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}
