//! Scheduler loop - discovers due posts and drives coordinator runs
//!
//! The loop itself is cadence-free: `tick` performs exactly one discovery
//! pass, so callers decide whether to invoke it from a timer, a manual
//! trigger, or a test. Each claim is acquired immediately before its
//! coordinator run is dispatched, which keeps at most one run in flight per
//! post id even when several scheduler instances poll the same store.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};

use crate::{
    model::{ScheduledPost, TickSummary},
    ports::{AuditLog, Clock, PlatformPublisher, PostStore, StoreError},
    usecases::coordinator::{PublicationCoordinator, RunOutcome},
};

/// Configuration for the scheduler loop
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum concurrent coordinator runs within one tick
    pub max_concurrent: usize,
    /// Claim lease; must cover the worst-case latency of one publish run so
    /// an expired lease reliably means the owning run is gone. A post only
    /// holds its lease while its run is in flight, never while it waits for
    /// a dispatch slot.
    pub claim_lease: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            claim_lease: Duration::from_secs(120),
        }
    }
}

/// Scheduler loop orchestrator
pub struct SchedulerLoop<P, St, A, Cl>
where
    P: PlatformPublisher + ?Sized,
    St: PostStore + ?Sized,
    A: AuditLog + ?Sized,
    Cl: Clock + ?Sized,
{
    store: Arc<St>,
    clock: Arc<Cl>,
    coordinator: PublicationCoordinator<P, St, A, Cl>,
    config: SchedulerConfig,
}

impl<P, St, A, Cl> SchedulerLoop<P, St, A, Cl>
where
    P: PlatformPublisher + ?Sized,
    St: PostStore + ?Sized,
    A: AuditLog + ?Sized,
    Cl: Clock + ?Sized,
{
    pub fn new(
        publisher: Arc<P>,
        store: Arc<St>,
        audit: Arc<A>,
        clock: Arc<Cl>,
        config: SchedulerConfig,
    ) -> Self {
        let coordinator = PublicationCoordinator::new(
            publisher,
            Arc::clone(&store),
            audit,
            Arc::clone(&clock),
        );
        Self {
            store,
            clock,
            coordinator,
            config,
        }
    }

    /// Run a single tick: find due posts, claim each, publish the claimed
    ///
    /// A failure in one post's run never aborts the others; a `StoreError`
    /// from the due query aborts the whole tick and surfaces to the caller,
    /// which simply retries on the next interval.
    pub async fn tick(&self) -> Result<TickSummary, StoreError> {
        let now = self.clock.now();
        let due = self.store.find_due(now).await?;

        let mut summary = TickSummary::default();
        if due.is_empty() {
            tracing::debug!("No posts due");
            return Ok(summary);
        }

        tracing::info!(count = due.len(), "Found due posts");

        // Each claim is taken right before its run starts, as a dispatch slot
        // frees. A post waiting behind the concurrency limit therefore holds
        // no lease yet, so the lease only has to cover publish latency, never
        // queue wait. Claims still happen in created_at order: the
        // first-scheduled post is always the first one claimed.
        let max_concurrent = self.config.max_concurrent.max(1);
        let mut tasks: FuturesUnordered<BoxFuture<'_, RunOutcome>> = FuturesUnordered::new();
        let mut posts_iter = due.into_iter();

        while tasks.len() < max_concurrent {
            let Some(post) = self.claim_next(&mut posts_iter, &mut summary).await else {
                break;
            };
            tasks.push(Box::pin(self.run_claimed(post)));
        }

        while let Some(outcome) = tasks.next().await {
            match outcome {
                RunOutcome::Published => summary.published += 1,
                RunOutcome::Failed { .. } => summary.failed += 1,
                RunOutcome::Deferred { .. } => summary.deferred += 1,
            }
            if let Some(post) = self.claim_next(&mut posts_iter, &mut summary).await {
                tasks.push(Box::pin(self.run_claimed(post)));
            }
        }

        tracing::info!(
            published = summary.published,
            failed = summary.failed,
            skipped = summary.skipped,
            deferred = summary.deferred,
            "Tick complete"
        );

        Ok(summary)
    }

    /// Claim the next dispatchable post in due order
    ///
    /// The lease starts at the current clock reading, not at tick start, so
    /// posts that waited for a dispatch slot get a full lease window.
    async fn claim_next(
        &self,
        posts: &mut std::vec::IntoIter<ScheduledPost>,
        summary: &mut TickSummary,
    ) -> Option<ScheduledPost> {
        for post in posts.by_ref() {
            let now = self.clock.now();
            match self
                .store
                .try_claim(post.id, now, self.config.claim_lease)
                .await
            {
                Ok(true) => return Some(post),
                Ok(false) => {
                    tracing::debug!(post_id = %post.id, "Post already claimed, skipping");
                    summary.skipped += 1;
                }
                Err(error) => {
                    tracing::warn!(post_id = %post.id, error = %error, "Claim attempt failed");
                    summary.deferred += 1;
                }
            }
        }
        None
    }

    /// Run the coordinator for one claimed post, releasing the claim on every
    /// path afterwards
    async fn run_claimed(&self, post: ScheduledPost) -> RunOutcome {
        let id = post.id;
        let outcome = self.coordinator.publish_post(&post).await;

        // Release failure is tolerable: the lease expires on its own.
        if let Err(error) = self.store.release_claim(id).await {
            tracing::warn!(post_id = %id, error = %error, "Failed to release claim");
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttemptOutcome, Platform, PostStatus, PublicationAttempt, PublishAck, PublishRequest};
    use crate::ports::{AuditError, PublishError};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use time::{Duration as TimeDuration, OffsetDateTime};
    use uuid::Uuid;

    type EventLog = Arc<Mutex<Vec<(&'static str, Uuid)>>>;

    /// In-process store with atomic claims, shared by simulated instances
    #[derive(Default)]
    struct FakeStore {
        posts: Mutex<HashMap<Uuid, ScheduledPost>>,
        claims: Mutex<HashMap<Uuid, OffsetDateTime>>,
        claim_order: Mutex<Vec<Uuid>>,
        events: EventLog,
    }

    impl FakeStore {
        fn with_posts(posts: Vec<ScheduledPost>) -> Self {
            let store = Self::default();
            {
                let mut map = store.posts.lock().unwrap();
                for post in posts {
                    map.insert(post.id, post);
                }
            }
            store
        }

        fn with_event_log(mut self, events: EventLog) -> Self {
            self.events = events;
            self
        }

        fn status_of(&self, id: Uuid) -> PostStatus {
            self.posts.lock().unwrap().get(&id).unwrap().status
        }
    }

    #[async_trait]
    impl PostStore for FakeStore {
        async fn insert(&self, post: &ScheduledPost) -> Result<(), StoreError> {
            self.posts.lock().unwrap().insert(post.id, post.clone());
            Ok(())
        }

        async fn get(&self, id: Uuid) -> Result<Option<ScheduledPost>, StoreError> {
            Ok(self.posts.lock().unwrap().get(&id).cloned())
        }

        async fn update(&self, post: &ScheduledPost) -> Result<(), StoreError> {
            self.posts.lock().unwrap().insert(post.id, post.clone());
            Ok(())
        }

        async fn list_by_owner(
            &self,
            _owner: &str,
            _status: Option<PostStatus>,
            _limit: u32,
            _offset: u32,
        ) -> Result<Vec<ScheduledPost>, StoreError> {
            Ok(vec![])
        }

        async fn find_due(&self, now: OffsetDateTime) -> Result<Vec<ScheduledPost>, StoreError> {
            let mut due: Vec<_> = self
                .posts
                .lock()
                .unwrap()
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
            let posts = self.posts.lock().unwrap();
            let Some(post) = posts.get(&id) else {
                return Ok(false);
            };
            if post.status != PostStatus::Scheduled {
                return Ok(false);
            }
            let mut claims = self.claims.lock().unwrap();
            if let Some(claimed_until) = claims.get(&id) {
                if *claimed_until > now {
                    return Ok(false);
                }
            }
            claims.insert(id, now + lease);
            self.claim_order.lock().unwrap().push(id);
            self.events.lock().unwrap().push(("claim", id));
            Ok(true)
        }

        async fn release_claim(&self, id: Uuid) -> Result<(), StoreError> {
            self.claims.lock().unwrap().remove(&id);
            Ok(())
        }

        async fn mark_published(
            &self,
            id: Uuid,
            published_at: OffsetDateTime,
        ) -> Result<(), StoreError> {
            let mut posts = self.posts.lock().unwrap();
            let post = posts.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            post.mark_published(published_at)
                .map_err(|e| StoreError::Database(e.to_string()))
        }

        async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), StoreError> {
            let mut posts = self.posts.lock().unwrap();
            let post = posts.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            post.mark_failed(error)
                .map_err(|e| StoreError::Database(e.to_string()))
        }
    }

    #[derive(Default)]
    struct FakeAudit {
        attempts: Mutex<Vec<PublicationAttempt>>,
    }

    #[async_trait]
    impl AuditLog for FakeAudit {
        async fn record(&self, attempt: &PublicationAttempt) -> Result<(), AuditError> {
            self.attempts.lock().unwrap().push(attempt.clone());
            Ok(())
        }

        async fn attempts_for(
            &self,
            post_id: Uuid,
        ) -> Result<Vec<PublicationAttempt>, AuditError> {
            Ok(self
                .attempts
                .lock()
                .unwrap()
                .iter()
                .filter(|a| a.post_id == post_id)
                .cloned()
                .collect())
        }
    }

    #[derive(Default)]
    struct FakePublisher {
        failures: HashMap<Uuid, String>,
        deliveries: Mutex<Vec<Uuid>>,
        events: EventLog,
    }

    impl FakePublisher {
        fn succeeding() -> Self {
            Self::default()
        }

        fn failing_for(post_id: Uuid, message: &str) -> Self {
            let mut publisher = Self::default();
            publisher.failures.insert(post_id, message.to_string());
            publisher
        }

        fn with_event_log(mut self, events: EventLog) -> Self {
            self.events = events;
            self
        }

        fn delivery_count(&self) -> usize {
            self.deliveries.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl PlatformPublisher for FakePublisher {
        async fn publish(
            &self,
            _target: Platform,
            request: &PublishRequest,
        ) -> Result<PublishAck, PublishError> {
            self.deliveries.lock().unwrap().push(request.post_id);
            self.events.lock().unwrap().push(("deliver", request.post_id));
            if let Some(message) = self.failures.get(&request.post_id) {
                return Err(PublishError::Api(message.clone()));
            }
            Ok(PublishAck {
                external_id: Uuid::new_v4().to_string(),
                url: None,
            })
        }
    }

    struct FixedClock {
        time: OffsetDateTime,
    }

    impl Clock for FixedClock {
        fn now(&self) -> OffsetDateTime {
            self.time
        }
    }

    fn due_post(
        content: &str,
        created_at: OffsetDateTime,
        scheduled_at: OffsetDateTime,
    ) -> ScheduledPost {
        ScheduledPost::new(
            "alice",
            content,
            vec![Platform::Twitter],
            scheduled_at,
            None,
            created_at,
        )
        .unwrap()
    }

    fn scheduler(
        publisher: Arc<FakePublisher>,
        store: Arc<FakeStore>,
        audit: Arc<FakeAudit>,
        now: OffsetDateTime,
        config: SchedulerConfig,
    ) -> SchedulerLoop<FakePublisher, FakeStore, FakeAudit, FixedClock> {
        SchedulerLoop::new(
            publisher,
            store,
            audit,
            Arc::new(FixedClock { time: now }),
            config,
        )
    }

    #[tokio::test]
    async fn test_due_post_is_published_after_one_tick() {
        let created = OffsetDateTime::now_utc() - TimeDuration::hours(1);
        let post = due_post("hello", created, created + TimeDuration::minutes(30));
        let id = post.id;
        let now = created + TimeDuration::hours(1);

        let store = Arc::new(FakeStore::with_posts(vec![post]));
        let audit = Arc::new(FakeAudit::default());
        let publisher = Arc::new(FakePublisher::succeeding());
        let engine = scheduler(
            publisher,
            Arc::clone(&store),
            Arc::clone(&audit),
            now,
            SchedulerConfig::default(),
        );

        let summary = engine.tick().await.unwrap();
        assert_eq!(summary.published, 1);
        assert_eq!(summary.processed(), 1);

        assert_eq!(store.status_of(id), PostStatus::Published);
        let stored = store.get(id).await.unwrap().unwrap();
        assert!(stored.published_at.is_some());

        let attempts = audit.attempts_for(id).await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].outcome, AttemptOutcome::Success);
    }

    #[tokio::test]
    async fn test_failed_post_is_not_retried_on_later_ticks() {
        let created = OffsetDateTime::now_utc() - TimeDuration::hours(1);
        let post = due_post("hello", created, created + TimeDuration::minutes(30));
        let id = post.id;
        let now = created + TimeDuration::hours(1);

        let store = Arc::new(FakeStore::with_posts(vec![post]));
        let audit = Arc::new(FakeAudit::default());
        let publisher = Arc::new(FakePublisher::failing_for(id, "rate limited"));
        let engine = scheduler(
            Arc::clone(&publisher),
            Arc::clone(&store),
            Arc::clone(&audit),
            now,
            SchedulerConfig::default(),
        );

        let summary = engine.tick().await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(store.status_of(id), PostStatus::Failed);

        let stored = store.get(id).await.unwrap().unwrap();
        assert!(stored.last_error.unwrap().contains("rate limited"));

        let attempts = audit.attempts_for(id).await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].outcome, AttemptOutcome::Failed);

        // A later tick must not re-select the failed post
        let summary = engine.tick().await.unwrap();
        assert_eq!(summary, TickSummary::default());
        assert_eq!(publisher.delivery_count(), 1);
        assert_eq!(audit.attempts_for(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_tick_is_a_silent_no_op() {
        let now = OffsetDateTime::now_utc();
        let store = Arc::new(FakeStore::default());
        let audit = Arc::new(FakeAudit::default());
        let publisher = Arc::new(FakePublisher::succeeding());
        let engine = scheduler(publisher, store, audit, now, SchedulerConfig::default());

        let summary = engine.tick().await.unwrap();
        assert_eq!(summary, TickSummary::default());
    }

    #[tokio::test]
    async fn test_fifo_ordering_by_creation_time() {
        let base = OffsetDateTime::now_utc() - TimeDuration::hours(2);
        let due_at = base + TimeDuration::minutes(30);
        // B created after A, both due at the same instant
        let post_a = due_post("first", base, due_at);
        let post_b = due_post("second", base + TimeDuration::minutes(5), due_at);
        let (id_a, id_b) = (post_a.id, post_b.id);
        let now = base + TimeDuration::hours(2);

        let store = Arc::new(FakeStore::with_posts(vec![post_b, post_a]));
        let audit = Arc::new(FakeAudit::default());
        let publisher = Arc::new(FakePublisher::succeeding());
        let engine = scheduler(
            Arc::clone(&publisher),
            Arc::clone(&store),
            audit,
            now,
            SchedulerConfig {
                max_concurrent: 1,
                ..Default::default()
            },
        );

        engine.tick().await.unwrap();

        assert_eq!(*store.claim_order.lock().unwrap(), vec![id_a, id_b]);
        assert_eq!(*publisher.deliveries.lock().unwrap(), vec![id_a, id_b]);
    }

    #[tokio::test]
    async fn test_claim_is_taken_only_when_a_dispatch_slot_frees() {
        // A post waiting behind the concurrency limit must not hold a ticking
        // lease: its claim lands only once the previous run has finished, so
        // the lease never has to cover queue wait and cannot lapse mid-queue
        // for another instance to steal.
        let base = OffsetDateTime::now_utc() - TimeDuration::hours(2);
        let due_at = base + TimeDuration::minutes(30);
        let post_a = due_post("first", base, due_at);
        let post_b = due_post("second", base + TimeDuration::minutes(5), due_at);
        let (id_a, id_b) = (post_a.id, post_b.id);
        let now = base + TimeDuration::hours(2);

        let events: EventLog = Arc::default();
        let store = Arc::new(
            FakeStore::with_posts(vec![post_a, post_b]).with_event_log(Arc::clone(&events)),
        );
        let audit = Arc::new(FakeAudit::default());
        let publisher = Arc::new(FakePublisher::succeeding().with_event_log(Arc::clone(&events)));
        let engine = scheduler(
            publisher,
            store,
            audit,
            now,
            SchedulerConfig {
                max_concurrent: 1,
                ..Default::default()
            },
        );

        let summary = engine.tick().await.unwrap();
        assert_eq!(summary.published, 2);

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                ("claim", id_a),
                ("deliver", id_a),
                ("claim", id_b),
                ("deliver", id_b),
            ]
        );
    }

    #[tokio::test]
    async fn test_one_failing_post_does_not_abort_the_tick() {
        let base = OffsetDateTime::now_utc() - TimeDuration::hours(2);
        let due_at = base + TimeDuration::minutes(30);
        let post_a = due_post("doomed", base, due_at);
        let post_b = due_post("fine", base + TimeDuration::minutes(5), due_at);
        let (id_a, id_b) = (post_a.id, post_b.id);
        let now = base + TimeDuration::hours(2);

        let store = Arc::new(FakeStore::with_posts(vec![post_a, post_b]));
        let audit = Arc::new(FakeAudit::default());
        let publisher = Arc::new(FakePublisher::failing_for(id_a, "unreachable"));
        let engine = scheduler(
            publisher,
            Arc::clone(&store),
            audit,
            now,
            SchedulerConfig::default(),
        );

        let summary = engine.tick().await.unwrap();
        assert_eq!(summary.published, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(store.status_of(id_a), PostStatus::Failed);
        assert_eq!(store.status_of(id_b), PostStatus::Published);
    }

    #[tokio::test]
    async fn test_concurrent_ticks_coordinate_a_post_exactly_once() {
        // Two simulated scheduler instances fire for the same due post. The
        // claim guarantees exactly one coordinator run and one audit entry;
        // the loser observes the conflict and writes nothing.
        let created = OffsetDateTime::now_utc() - TimeDuration::hours(1);
        let post = due_post("hello", created, created + TimeDuration::minutes(30));
        let id = post.id;
        let now = created + TimeDuration::hours(1);

        let store = Arc::new(FakeStore::with_posts(vec![post]));
        let audit = Arc::new(FakeAudit::default());
        let publisher = Arc::new(FakePublisher::succeeding());

        let engine_a = scheduler(
            Arc::clone(&publisher),
            Arc::clone(&store),
            Arc::clone(&audit),
            now,
            SchedulerConfig::default(),
        );
        let engine_b = scheduler(
            Arc::clone(&publisher),
            Arc::clone(&store),
            Arc::clone(&audit),
            now,
            SchedulerConfig::default(),
        );

        let (summary_a, summary_b) = tokio::join!(engine_a.tick(), engine_b.tick());
        let (summary_a, summary_b) = (summary_a.unwrap(), summary_b.unwrap());

        assert_eq!(summary_a.published + summary_b.published, 1);
        assert_eq!(publisher.delivery_count(), 1);
        assert_eq!(audit.attempts_for(id).await.unwrap().len(), 1);
        assert_eq!(store.status_of(id), PostStatus::Published);
    }

    #[tokio::test]
    async fn test_claimed_post_is_skipped_until_lease_expires() {
        let created = OffsetDateTime::now_utc() - TimeDuration::hours(1);
        let post = due_post("hello", created, created + TimeDuration::minutes(30));
        let id = post.id;
        let now = created + TimeDuration::hours(1);

        let store = Arc::new(FakeStore::with_posts(vec![post]));
        // Simulate an in-flight run from a previous tick holding the claim
        assert!(store
            .try_claim(id, now, Duration::from_secs(120))
            .await
            .unwrap());

        let audit = Arc::new(FakeAudit::default());
        let publisher = Arc::new(FakePublisher::succeeding());
        let engine = scheduler(
            Arc::clone(&publisher),
            Arc::clone(&store),
            Arc::clone(&audit),
            now,
            SchedulerConfig::default(),
        );

        let summary = engine.tick().await.unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.published, 0);
        assert_eq!(publisher.delivery_count(), 0);
        assert!(audit.attempts_for(id).await.unwrap().is_empty());
        assert_eq!(store.status_of(id), PostStatus::Scheduled);

        // Once the lease lapses the post is picked up again
        let later = now + TimeDuration::minutes(3);
        let engine = scheduler(
            publisher,
            Arc::clone(&store),
            audit,
            later,
            SchedulerConfig::default(),
        );
        let summary = engine.tick().await.unwrap();
        assert_eq!(summary.published, 1);
        assert_eq!(store.status_of(id), PostStatus::Published);
    }
}
