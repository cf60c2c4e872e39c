//! Publication coordinator - the publish-and-record protocol for one post
//!
//! Given one claimed Scheduled post, deliver to every target platform, write
//! a single aggregate audit entry, then update the post's status. The audit
//! write lands before the status update: the trail is at-least-once even if
//! the process dies between the two operations.

use std::sync::Arc;

use crate::{
    model::{PostStatus, PublicationAttempt, PublishRequest, ScheduledPost},
    ports::{AuditLog, Clock, PlatformPublisher, PostStore},
};

/// Result of one coordinator run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// All targets delivered; post is Published
    Published,
    /// At least one target failed; post is Failed with the first error detail
    Failed { detail: String },
    /// Persistence was unavailable; post remains Scheduled and is retried on
    /// a later tick
    Deferred { reason: String },
}

/// Orchestrates delivery, audit and status update for one post
pub struct PublicationCoordinator<P, St, A, Cl>
where
    P: PlatformPublisher + ?Sized,
    St: PostStore + ?Sized,
    A: AuditLog + ?Sized,
    Cl: Clock + ?Sized,
{
    publisher: Arc<P>,
    store: Arc<St>,
    audit: Arc<A>,
    clock: Arc<Cl>,
}

impl<P, St, A, Cl> PublicationCoordinator<P, St, A, Cl>
where
    P: PlatformPublisher + ?Sized,
    St: PostStore + ?Sized,
    A: AuditLog + ?Sized,
    Cl: Clock + ?Sized,
{
    pub fn new(publisher: Arc<P>, store: Arc<St>, audit: Arc<A>, clock: Arc<Cl>) -> Self {
        Self {
            publisher,
            store,
            audit,
            clock,
        }
    }

    /// Run the publish-and-record protocol for one claimed post
    ///
    /// All targets succeed or the whole post fails; no per-target partial
    /// success is tracked.
    pub async fn publish_post(&self, post: &ScheduledPost) -> RunOutcome {
        if post.status != PostStatus::Scheduled {
            tracing::warn!(
                post_id = %post.id,
                status = %post.status,
                "Coordinator invoked for a post that is not scheduled"
            );
            return RunOutcome::Deferred {
                reason: format!("post is {}, not scheduled", post.status),
            };
        }

        let request = PublishRequest::from_post(post);
        let mut first_error: Option<String> = None;

        for target in &post.targets {
            match self.publisher.publish(*target, &request).await {
                Ok(ack) => {
                    tracing::debug!(
                        post_id = %post.id,
                        target = %target,
                        external_id = %ack.external_id,
                        "Delivered to platform"
                    );
                }
                Err(error) => {
                    tracing::warn!(
                        post_id = %post.id,
                        target = %target,
                        error = %error,
                        "Platform delivery failed"
                    );
                    // First failure decides the aggregate outcome; remaining
                    // targets are not attempted within this run.
                    first_error = Some(format!("{}: {}", target, error));
                    break;
                }
            }
        }

        let now = self.clock.now();
        match first_error {
            None => {
                let attempt = PublicationAttempt::success(post, now);
                if let Err(error) = self.audit.record(&attempt).await {
                    tracing::error!(post_id = %post.id, error = %error, "Audit write failed");
                    return RunOutcome::Deferred {
                        reason: error.to_string(),
                    };
                }

                if let Err(error) = self.store.mark_published(post.id, now).await {
                    tracing::error!(post_id = %post.id, error = %error, "Status update failed");
                    return RunOutcome::Deferred {
                        reason: error.to_string(),
                    };
                }

                tracing::info!(
                    post_id = %post.id,
                    targets = ?post.targets,
                    "Published post"
                );
                RunOutcome::Published
            }
            Some(detail) => {
                let attempt = PublicationAttempt::failure(post, now, detail.clone());
                if let Err(error) = self.audit.record(&attempt).await {
                    tracing::error!(post_id = %post.id, error = %error, "Audit write failed");
                    return RunOutcome::Deferred {
                        reason: error.to_string(),
                    };
                }

                if let Err(error) = self.store.mark_failed(post.id, &detail).await {
                    tracing::error!(post_id = %post.id, error = %error, "Status update failed");
                    return RunOutcome::Deferred {
                        reason: error.to_string(),
                    };
                }

                tracing::info!(post_id = %post.id, detail = %detail, "Post failed");
                RunOutcome::Failed { detail }
            }
        }
    }
}
