//! SQLite post store and audit log implementation

use async_trait::async_trait;
use postpilot_domain::{
    AuditError, AuditLog, Platform, PostStatus, PostStore, PublicationAttempt, ScheduledPost,
    StoreError,
};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;
use time::{OffsetDateTime, UtcOffset, format_description::well_known::Rfc3339};
use uuid::Uuid;

/// SQLite-backed post store; also serves as the audit log
pub struct SqliteStore {
    pool: SqlitePool,
}

type PostRow = (
    String,         // id
    String,         // owner
    String,         // content
    String,         // targets (JSON array)
    Option<String>, // image_url
    String,         // scheduled_at
    Option<String>, // published_at
    String,         // created_at
    String,         // status
    Option<String>, // last_error
);

const POST_COLUMNS: &str =
    "id, owner, content, targets, image_url, scheduled_at, published_at, created_at, status, last_error";

impl SqliteStore {
    /// Create a new SQLite store, initializing the database if needed
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref();

        // Create parent directories if needed
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Database(format!("Failed to create directory: {}", e))
                })?;
            }
        }

        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing)
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                id TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                content TEXT NOT NULL,
                targets TEXT NOT NULL,
                image_url TEXT,
                scheduled_at TEXT NOT NULL,
                published_at TEXT,
                created_at TEXT NOT NULL,
                status TEXT NOT NULL,
                last_error TEXT,
                claimed_until TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        // Covers the scheduler's due query
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_posts_due
            ON posts(status, scheduled_at, created_at)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_posts_owner
            ON posts(owner, created_at)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS publication_attempts (
                id TEXT PRIMARY KEY,
                post_id TEXT NOT NULL,
                owner TEXT NOT NULL,
                targets TEXT NOT NULL,
                scheduled_at TEXT NOT NULL,
                attempted_at TEXT NOT NULL,
                outcome TEXT NOT NULL,
                error_detail TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_attempts_post
            ON publication_attempts(post_id, attempted_at)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }
}

/// Timestamps are stored as whole-second UTC RFC 3339 so that text comparison
/// in SQL matches chronological order.
fn format_ts(ts: OffsetDateTime) -> Result<String, String> {
    ts.to_offset(UtcOffset::UTC)
        .replace_nanosecond(0)
        .map_err(|e| e.to_string())?
        .format(&Rfc3339)
        .map_err(|e| e.to_string())
}

fn parse_ts(s: &str) -> Result<OffsetDateTime, String> {
    OffsetDateTime::parse(s, &Rfc3339).map_err(|e| e.to_string())
}

fn row_to_post(row: PostRow) -> Result<ScheduledPost, StoreError> {
    let (
        id,
        owner,
        content,
        targets_json,
        image_url,
        scheduled_at,
        published_at,
        created_at,
        status,
        last_error,
    ) = row;

    let id = Uuid::parse_str(&id).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let targets: Vec<Platform> = serde_json::from_str(&targets_json)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let scheduled_at = parse_ts(&scheduled_at).map_err(StoreError::Serialization)?;
    let published_at = published_at
        .as_deref()
        .map(parse_ts)
        .transpose()
        .map_err(StoreError::Serialization)?;
    let created_at = parse_ts(&created_at).map_err(StoreError::Serialization)?;
    let status: PostStatus = status.parse().map_err(StoreError::Serialization)?;

    Ok(ScheduledPost {
        id,
        owner,
        content,
        targets,
        image_url,
        scheduled_at,
        published_at,
        created_at,
        status,
        last_error,
    })
}

#[async_trait]
impl PostStore for SqliteStore {
    async fn insert(&self, post: &ScheduledPost) -> Result<(), StoreError> {
        let targets_json = serde_json::to_string(&post.targets)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let scheduled_at = format_ts(post.scheduled_at).map_err(StoreError::Serialization)?;
        let published_at = post
            .published_at
            .map(format_ts)
            .transpose()
            .map_err(StoreError::Serialization)?;
        let created_at = format_ts(post.created_at).map_err(StoreError::Serialization)?;

        sqlx::query(
            r#"
            INSERT INTO posts
            (id, owner, content, targets, image_url, scheduled_at, published_at,
             created_at, status, last_error, claimed_until)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL)
            "#,
        )
        .bind(post.id.to_string())
        .bind(&post.owner)
        .bind(&post.content)
        .bind(&targets_json)
        .bind(&post.image_url)
        .bind(&scheduled_at)
        .bind(&published_at)
        .bind(&created_at)
        .bind(post.status.as_str())
        .bind(&post.last_error)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ScheduledPost>, StoreError> {
        let row: Option<PostRow> = sqlx::query_as(&format!(
            "SELECT {} FROM posts WHERE id = ?",
            POST_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        row.map(row_to_post).transpose()
    }

    async fn update(&self, post: &ScheduledPost) -> Result<(), StoreError> {
        let targets_json = serde_json::to_string(&post.targets)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let scheduled_at = format_ts(post.scheduled_at).map_err(StoreError::Serialization)?;
        let published_at = post
            .published_at
            .map(format_ts)
            .transpose()
            .map_err(StoreError::Serialization)?;

        let result = sqlx::query(
            r#"
            UPDATE posts SET
                content = ?,
                targets = ?,
                image_url = ?,
                scheduled_at = ?,
                published_at = ?,
                status = ?,
                last_error = ?
            WHERE id = ?
            "#,
        )
        .bind(&post.content)
        .bind(&targets_json)
        .bind(&post.image_url)
        .bind(&scheduled_at)
        .bind(&published_at)
        .bind(post.status.as_str())
        .bind(&post.last_error)
        .bind(post.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(post.id));
        }
        Ok(())
    }

    async fn list_by_owner(
        &self,
        owner: &str,
        status: Option<PostStatus>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ScheduledPost>, StoreError> {
        let rows: Vec<PostRow> = match status {
            Some(status) => {
                sqlx::query_as(&format!(
                    "SELECT {} FROM posts WHERE owner = ? AND status = ? \
                     ORDER BY created_at DESC LIMIT ? OFFSET ?",
                    POST_COLUMNS
                ))
                .bind(owner)
                .bind(status.as_str())
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT {} FROM posts WHERE owner = ? \
                     ORDER BY created_at DESC LIMIT ? OFFSET ?",
                    POST_COLUMNS
                ))
                .bind(owner)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| StoreError::Database(e.to_string()))?;

        rows.into_iter().map(row_to_post).collect()
    }

    async fn find_due(&self, now: OffsetDateTime) -> Result<Vec<ScheduledPost>, StoreError> {
        let now = format_ts(now).map_err(StoreError::Serialization)?;

        let rows: Vec<PostRow> = sqlx::query_as(&format!(
            "SELECT {} FROM posts \
             WHERE status = 'scheduled' AND scheduled_at <= ? \
             ORDER BY created_at ASC, id ASC",
            POST_COLUMNS
        ))
        .bind(&now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        rows.into_iter().map(row_to_post).collect()
    }

    async fn try_claim(
        &self,
        id: Uuid,
        now: OffsetDateTime,
        lease: Duration,
    ) -> Result<bool, StoreError> {
        let now_str = format_ts(now).map_err(StoreError::Serialization)?;
        let claimed_until = format_ts(now + lease).map_err(StoreError::Serialization)?;

        // A single conditional UPDATE is the atomicity point: the claim only
        // lands while the post is still scheduled and any previous claim has
        // expired.
        let result = sqlx::query(
            r#"
            UPDATE posts SET claimed_until = ?
            WHERE id = ?
              AND status = 'scheduled'
              AND (claimed_until IS NULL OR claimed_until <= ?)
            "#,
        )
        .bind(&claimed_until)
        .bind(id.to_string())
        .bind(&now_str)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_claim(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE posts SET claimed_until = NULL WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    async fn mark_published(
        &self,
        id: Uuid,
        published_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let published_at = format_ts(published_at).map_err(StoreError::Serialization)?;

        let result = sqlx::query(
            r#"
            UPDATE posts SET
                status = 'published',
                published_at = ?,
                last_error = NULL,
                claimed_until = NULL
            WHERE id = ? AND status = 'scheduled'
            "#,
        )
        .bind(&published_at)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE posts SET
                status = 'failed',
                last_error = ?,
                claimed_until = NULL
            WHERE id = ? AND status = 'scheduled'
            "#,
        )
        .bind(error)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }
}

type AttemptRow = (
    String,         // id
    String,         // post_id
    String,         // owner
    String,         // targets
    String,         // scheduled_at
    String,         // attempted_at
    String,         // outcome
    Option<String>, // error_detail
);

fn row_to_attempt(row: AttemptRow) -> Result<PublicationAttempt, AuditError> {
    let (id, post_id, owner, targets_json, scheduled_at, attempted_at, outcome, error_detail) = row;

    Ok(PublicationAttempt {
        id: Uuid::parse_str(&id).map_err(|e| AuditError::Serialization(e.to_string()))?,
        post_id: Uuid::parse_str(&post_id).map_err(|e| AuditError::Serialization(e.to_string()))?,
        owner,
        targets: serde_json::from_str(&targets_json)
            .map_err(|e| AuditError::Serialization(e.to_string()))?,
        scheduled_at: parse_ts(&scheduled_at).map_err(AuditError::Serialization)?,
        attempted_at: parse_ts(&attempted_at).map_err(AuditError::Serialization)?,
        outcome: outcome.parse().map_err(AuditError::Serialization)?,
        error_detail,
    })
}

#[async_trait]
impl AuditLog for SqliteStore {
    async fn record(&self, attempt: &PublicationAttempt) -> Result<(), AuditError> {
        let targets_json = serde_json::to_string(&attempt.targets)
            .map_err(|e| AuditError::Serialization(e.to_string()))?;
        let scheduled_at = format_ts(attempt.scheduled_at).map_err(AuditError::Serialization)?;
        let attempted_at = format_ts(attempt.attempted_at).map_err(AuditError::Serialization)?;

        sqlx::query(
            r#"
            INSERT INTO publication_attempts
            (id, post_id, owner, targets, scheduled_at, attempted_at, outcome, error_detail)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(attempt.id.to_string())
        .bind(attempt.post_id.to_string())
        .bind(&attempt.owner)
        .bind(&targets_json)
        .bind(&scheduled_at)
        .bind(&attempted_at)
        .bind(attempt.outcome.to_string())
        .bind(&attempt.error_detail)
        .execute(&self.pool)
        .await
        .map_err(|e| AuditError::Database(e.to_string()))?;

        Ok(())
    }

    async fn attempts_for(&self, post_id: Uuid) -> Result<Vec<PublicationAttempt>, AuditError> {
        let rows: Vec<AttemptRow> = sqlx::query_as(
            r#"
            SELECT id, post_id, owner, targets, scheduled_at, attempted_at, outcome, error_detail
            FROM publication_attempts
            WHERE post_id = ?
            ORDER BY attempted_at ASC
            "#,
        )
        .bind(post_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AuditError::Database(e.to_string()))?;

        rows.into_iter().map(row_to_attempt).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration as TimeDuration;

    fn sample_post(
        content: &str,
        created_at: OffsetDateTime,
        scheduled_at: OffsetDateTime,
    ) -> ScheduledPost {
        ScheduledPost::new(
            "testuser",
            content,
            vec![Platform::Twitter, Platform::Facebook],
            scheduled_at,
            None,
            created_at,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_insert_get_roundtrip() {
        let store = SqliteStore::in_memory().await.unwrap();
        let now = OffsetDateTime::now_utc();
        let post = sample_post("hello", now, now + TimeDuration::hours(1));

        store.insert(&post).await.unwrap();
        let retrieved = store.get(post.id).await.unwrap().unwrap();

        assert_eq!(retrieved.id, post.id);
        assert_eq!(retrieved.owner, "testuser");
        assert_eq!(retrieved.content, "hello");
        assert_eq!(retrieved.targets, vec![Platform::Twitter, Platform::Facebook]);
        assert_eq!(retrieved.status, PostStatus::Scheduled);
        assert!(retrieved.published_at.is_none());
    }

    #[tokio::test]
    async fn test_find_due_orders_by_creation_time() {
        let store = SqliteStore::in_memory().await.unwrap();
        let base = OffsetDateTime::now_utc() - TimeDuration::hours(2);
        let due_at = base + TimeDuration::minutes(30);

        let post_b = sample_post("second", base + TimeDuration::minutes(10), due_at);
        let post_a = sample_post("first", base, due_at);
        store.insert(&post_b).await.unwrap();
        store.insert(&post_a).await.unwrap();

        let due = store.find_due(base + TimeDuration::hours(1)).await.unwrap();
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].id, post_a.id);
        assert_eq!(due[1].id, post_b.id);
    }

    #[tokio::test]
    async fn test_find_due_excludes_future_and_non_scheduled() {
        let store = SqliteStore::in_memory().await.unwrap();
        let now = OffsetDateTime::now_utc();

        let future = sample_post("future", now, now + TimeDuration::hours(2));
        let due = sample_post("due", now - TimeDuration::hours(1), now - TimeDuration::minutes(5));
        store.insert(&future).await.unwrap();
        store.insert(&due).await.unwrap();
        store.mark_failed(due.id, "boom").await.unwrap();

        let found = store.find_due(now).await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_claim_conflict_and_release() {
        let store = SqliteStore::in_memory().await.unwrap();
        let now = OffsetDateTime::now_utc();
        let post = sample_post("hello", now - TimeDuration::hours(1), now - TimeDuration::minutes(5));
        store.insert(&post).await.unwrap();

        let lease = Duration::from_secs(120);
        assert!(store.try_claim(post.id, now, lease).await.unwrap());
        // Second claim within the lease window loses
        assert!(!store.try_claim(post.id, now, lease).await.unwrap());

        store.release_claim(post.id).await.unwrap();
        assert!(store.try_claim(post.id, now, lease).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_lease_can_be_reclaimed() {
        let store = SqliteStore::in_memory().await.unwrap();
        let now = OffsetDateTime::now_utc();
        let post = sample_post("hello", now - TimeDuration::hours(1), now - TimeDuration::minutes(5));
        store.insert(&post).await.unwrap();

        let lease = Duration::from_secs(120);
        assert!(store.try_claim(post.id, now, lease).await.unwrap());

        // Claim holder crashed: after the lease elapses another instance wins
        let later = now + TimeDuration::minutes(3);
        assert!(store.try_claim(post.id, later, lease).await.unwrap());
    }

    #[tokio::test]
    async fn test_claim_requires_scheduled_status() {
        let store = SqliteStore::in_memory().await.unwrap();
        let now = OffsetDateTime::now_utc();
        let post = sample_post("hello", now - TimeDuration::hours(1), now - TimeDuration::minutes(5));
        store.insert(&post).await.unwrap();
        store.mark_published(post.id, now).await.unwrap();

        assert!(!store
            .try_claim(post.id, now, Duration::from_secs(120))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_mark_published_sets_fields_and_removes_from_due() {
        let store = SqliteStore::in_memory().await.unwrap();
        let now = OffsetDateTime::now_utc();
        let post = sample_post("hello", now - TimeDuration::hours(1), now - TimeDuration::minutes(5));
        store.insert(&post).await.unwrap();

        store.mark_published(post.id, now).await.unwrap();

        let stored = store.get(post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Published);
        assert!(stored.published_at.is_some());
        assert!(stored.last_error.is_none());

        assert!(store.find_due(now).await.unwrap().is_empty());

        // Terminal: a second transition is rejected
        assert!(matches!(
            store.mark_published(post.id, now).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_mark_failed_stores_error_detail() {
        let store = SqliteStore::in_memory().await.unwrap();
        let now = OffsetDateTime::now_utc();
        let post = sample_post("hello", now - TimeDuration::hours(1), now - TimeDuration::minutes(5));
        store.insert(&post).await.unwrap();

        store.mark_failed(post.id, "twitter: rate limited").await.unwrap();

        let stored = store.get(post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Failed);
        assert_eq!(stored.last_error.as_deref(), Some("twitter: rate limited"));
        assert!(store.find_due(now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_audit_roundtrip_in_attempt_order() {
        let store = SqliteStore::in_memory().await.unwrap();
        let now = OffsetDateTime::now_utc();
        let post = sample_post("hello", now - TimeDuration::hours(1), now - TimeDuration::minutes(5));

        let first = PublicationAttempt::failure(&post, now - TimeDuration::minutes(2), "boom");
        let second = PublicationAttempt::success(&post, now);
        store.record(&second).await.unwrap();
        store.record(&first).await.unwrap();

        let attempts = store.attempts_for(post.id).await.unwrap();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].id, first.id);
        assert_eq!(attempts[0].error_detail.as_deref(), Some("boom"));
        assert_eq!(attempts[1].id, second.id);
        assert!(attempts[1].error_detail.is_none());
        assert_eq!(attempts[0].owner, "testuser");
    }

    #[tokio::test]
    async fn test_list_by_owner_filters_and_pages() {
        let store = SqliteStore::in_memory().await.unwrap();
        let now = OffsetDateTime::now_utc();

        let mine = sample_post("mine", now - TimeDuration::minutes(10), now + TimeDuration::hours(1));
        let theirs = ScheduledPost::new(
            "someone_else",
            "theirs",
            vec![Platform::Instagram],
            now + TimeDuration::hours(1),
            None,
            now - TimeDuration::minutes(5),
        )
        .unwrap();
        store.insert(&mine).await.unwrap();
        store.insert(&theirs).await.unwrap();

        let listed = store.list_by_owner("testuser", None, 10, 0).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, mine.id);

        let published = store
            .list_by_owner("testuser", Some(PostStatus::Published), 10, 0)
            .await
            .unwrap();
        assert!(published.is_empty());
    }

    #[tokio::test]
    async fn test_update_persists_edits() {
        let store = SqliteStore::in_memory().await.unwrap();
        let now = OffsetDateTime::now_utc();
        let mut post = ScheduledPost::new_draft(
            "testuser",
            "draft content",
            vec![Platform::Twitter],
            now + TimeDuration::hours(1),
            None,
            now,
        )
        .unwrap();
        store.insert(&post).await.unwrap();

        post.schedule(now).unwrap();
        store.update(&post).await.unwrap();

        let stored = store.get(post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Scheduled);
    }
}
