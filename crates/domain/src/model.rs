//! Domain models and the post lifecycle state machine

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::policy::{self, PolicyError};

/// A target platform for publication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Twitter,
    Facebook,
    Instagram,
}

impl Platform {
    /// All known platforms, used for config validation
    pub const ALL: [Platform; 3] = [Platform::Twitter, Platform::Facebook, Platform::Instagram];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Twitter => "twitter",
            Platform::Facebook => "facebook",
            Platform::Instagram => "instagram",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for unrecognized platform names
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("Unknown platform: {0}")]
pub struct UnknownPlatform(pub String);

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "twitter" => Ok(Platform::Twitter),
            "facebook" => Ok(Platform::Facebook),
            "instagram" => Ok(Platform::Instagram),
            other => Err(UnknownPlatform(other.to_string())),
        }
    }
}

/// Lifecycle status of a scheduled post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Scheduled,
    Published,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Scheduled => "scheduled",
            PostStatus::Published => "published",
            PostStatus::Failed => "failed",
        }
    }

    /// Published and Failed are terminal: no transition leaves them
    pub fn is_terminal(&self) -> bool {
        matches!(self, PostStatus::Published | PostStatus::Failed)
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PostStatus::Draft),
            "scheduled" => Ok(PostStatus::Scheduled),
            "published" => Ok(PostStatus::Published),
            "failed" => Ok(PostStatus::Failed),
            other => Err(format!("Unknown post status: {}", other)),
        }
    }
}

/// Errors from lifecycle transitions and edits
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Post is {0} and cannot change")]
    Terminal(PostStatus),
    #[error("Invalid transition from {from}")]
    InvalidState { from: PostStatus },
    #[error("Scheduled time must be in the future")]
    ScheduledInPast,
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

/// A user-composed post awaiting (or past) publication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledPost {
    /// Unique identifier, immutable
    pub id: Uuid,
    /// Identifier of the requesting user, immutable
    pub owner: String,
    /// Post text, bounded by policy, immutable once published
    pub content: String,
    /// Target platforms, non-empty, immutable once published
    pub targets: Vec<Platform>,
    /// Optional image reference passed through to publishers
    pub image_url: Option<String>,
    /// When the post should go out
    #[serde(with = "time::serde::rfc3339")]
    pub scheduled_at: OffsetDateTime,
    /// Set exactly once, on the transition into Published
    #[serde(with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
    /// Creation time, the FIFO tie-break for due processing
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub status: PostStatus,
    /// Diagnostic detail, set only on Failed
    pub last_error: Option<String>,
}

impl ScheduledPost {
    /// Create a post directly in Scheduled state (the common path)
    pub fn new(
        owner: impl Into<String>,
        content: impl Into<String>,
        targets: Vec<Platform>,
        scheduled_at: OffsetDateTime,
        image_url: Option<String>,
        now: OffsetDateTime,
    ) -> Result<Self, TransitionError> {
        let mut post = Self::new_draft(owner, content, targets, scheduled_at, image_url, now)?;
        post.status = PostStatus::Scheduled;
        Ok(post)
    }

    /// Create a post in Draft state
    pub fn new_draft(
        owner: impl Into<String>,
        content: impl Into<String>,
        targets: Vec<Platform>,
        scheduled_at: OffsetDateTime,
        image_url: Option<String>,
        now: OffsetDateTime,
    ) -> Result<Self, TransitionError> {
        let content = content.into();
        policy::validate_content(&content)?;
        policy::validate_targets(&targets)?;
        if scheduled_at <= now {
            return Err(TransitionError::ScheduledInPast);
        }

        Ok(Self {
            id: Uuid::new_v4(),
            owner: owner.into(),
            content,
            targets,
            image_url,
            scheduled_at,
            published_at: None,
            created_at: now,
            status: PostStatus::Draft,
            last_error: None,
        })
    }

    /// Draft -> Scheduled, an explicit user action
    pub fn schedule(&mut self, now: OffsetDateTime) -> Result<(), TransitionError> {
        match self.status {
            PostStatus::Draft => {}
            s if s.is_terminal() => return Err(TransitionError::Terminal(s)),
            s => return Err(TransitionError::InvalidState { from: s }),
        }
        policy::validate_targets(&self.targets)?;
        if self.scheduled_at <= now {
            return Err(TransitionError::ScheduledInPast);
        }
        self.status = PostStatus::Scheduled;
        Ok(())
    }

    /// Scheduled -> Published; only the publication coordinator calls this
    pub fn mark_published(&mut self, now: OffsetDateTime) -> Result<(), TransitionError> {
        match self.status {
            PostStatus::Scheduled => {}
            s if s.is_terminal() => return Err(TransitionError::Terminal(s)),
            s => return Err(TransitionError::InvalidState { from: s }),
        }
        self.status = PostStatus::Published;
        self.published_at = Some(now);
        self.last_error = None;
        Ok(())
    }

    /// Scheduled -> Failed; only the publication coordinator calls this
    pub fn mark_failed(&mut self, detail: impl Into<String>) -> Result<(), TransitionError> {
        match self.status {
            PostStatus::Scheduled => {}
            s if s.is_terminal() => return Err(TransitionError::Terminal(s)),
            s => return Err(TransitionError::InvalidState { from: s }),
        }
        self.status = PostStatus::Failed;
        self.last_error = Some(detail.into());
        Ok(())
    }

    /// Replace the content while the post is still editable
    pub fn edit_content(&mut self, content: impl Into<String>) -> Result<(), TransitionError> {
        self.ensure_editable()?;
        let content = content.into();
        policy::validate_content(&content)?;
        self.content = content;
        Ok(())
    }

    /// Replace the targets while the post is still editable
    pub fn edit_targets(&mut self, targets: Vec<Platform>) -> Result<(), TransitionError> {
        self.ensure_editable()?;
        policy::validate_targets(&targets)?;
        self.targets = targets;
        Ok(())
    }

    /// Move the scheduled time while the post is still editable
    pub fn edit_schedule(
        &mut self,
        scheduled_at: OffsetDateTime,
        now: OffsetDateTime,
    ) -> Result<(), TransitionError> {
        self.ensure_editable()?;
        if scheduled_at <= now {
            return Err(TransitionError::ScheduledInPast);
        }
        self.scheduled_at = scheduled_at;
        Ok(())
    }

    fn ensure_editable(&self) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::Terminal(self.status));
        }
        Ok(())
    }
}

/// Aggregate outcome of one coordinator run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptOutcome {
    Success,
    Failed,
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Success => f.write_str("success"),
            AttemptOutcome::Failed => f.write_str("failed"),
        }
    }
}

impl FromStr for AttemptOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(AttemptOutcome::Success),
            "failed" => Ok(AttemptOutcome::Failed),
            other => Err(format!("Unknown attempt outcome: {}", other)),
        }
    }
}

/// Immutable audit record of one coordinator run
///
/// Owner, targets and scheduled time are denormalized so the audit trail
/// stays meaningful even if the post is later altered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicationAttempt {
    pub id: Uuid,
    /// Reference to the post, not ownership
    pub post_id: Uuid,
    pub owner: String,
    pub targets: Vec<Platform>,
    #[serde(with = "time::serde::rfc3339")]
    pub scheduled_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub attempted_at: OffsetDateTime,
    pub outcome: AttemptOutcome,
    /// Present iff outcome is Failed
    pub error_detail: Option<String>,
}

impl PublicationAttempt {
    pub fn success(post: &ScheduledPost, attempted_at: OffsetDateTime) -> Self {
        Self::record(post, attempted_at, AttemptOutcome::Success, None)
    }

    pub fn failure(
        post: &ScheduledPost,
        attempted_at: OffsetDateTime,
        detail: impl Into<String>,
    ) -> Self {
        Self::record(
            post,
            attempted_at,
            AttemptOutcome::Failed,
            Some(detail.into()),
        )
    }

    fn record(
        post: &ScheduledPost,
        attempted_at: OffsetDateTime,
        outcome: AttemptOutcome,
        error_detail: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            post_id: post.id,
            owner: post.owner.clone(),
            targets: post.targets.clone(),
            scheduled_at: post.scheduled_at,
            attempted_at,
            outcome,
            error_detail,
        }
    }
}

/// Content handed to a platform publisher for one delivery
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub post_id: Uuid,
    pub owner: String,
    pub content: String,
    pub image_url: Option<String>,
}

impl PublishRequest {
    pub fn from_post(post: &ScheduledPost) -> Self {
        Self {
            post_id: post.id,
            owner: post.owner.clone(),
            content: post.content.clone(),
            image_url: post.image_url.clone(),
        }
    }
}

/// Acknowledgement of a successful delivery to one platform
#[derive(Debug, Clone)]
pub struct PublishAck {
    /// Platform-specific post/event ID
    pub external_id: String,
    /// URL to the published content, if available
    pub url: Option<String>,
}

/// Counters reported at the end of each scheduler tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Posts transitioned to Published
    pub published: usize,
    /// Posts transitioned to Failed
    pub failed: usize,
    /// Posts skipped because another run holds their claim
    pub skipped: usize,
    /// Posts left Scheduled because the store was unavailable
    pub deferred: usize,
}

impl TickSummary {
    /// Total posts this tick made a publication attempt for
    pub fn processed(&self) -> usize {
        self.published + self.failed
    }
}
