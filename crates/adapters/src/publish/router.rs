//! Routing publisher - composes per-platform backends behind one port

use async_trait::async_trait;
use postpilot_domain::{Platform, PlatformPublisher, PublishAck, PublishError, PublishRequest};
use std::collections::HashMap;
use std::sync::Arc;

/// Dispatches each delivery to the publisher registered for its platform
#[derive(Default)]
pub struct RoutingPublisher {
    routes: HashMap<Platform, Arc<dyn PlatformPublisher>>,
}

impl RoutingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(mut self, target: Platform, publisher: Arc<dyn PlatformPublisher>) -> Self {
        self.routes.insert(target, publisher);
        self
    }
}

#[async_trait]
impl PlatformPublisher for RoutingPublisher {
    async fn publish(
        &self,
        target: Platform,
        request: &PublishRequest,
    ) -> Result<PublishAck, PublishError> {
        // Startup validation keeps this unreachable in normal operation
        let publisher = self.routes.get(&target).ok_or_else(|| {
            PublishError::Api(format!("No publisher registered for platform {}", target))
        })?;
        publisher.publish(target, request).await
    }
}
