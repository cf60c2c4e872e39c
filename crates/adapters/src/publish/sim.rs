//! Simulated publisher - no external side effects

use async_trait::async_trait;
use postpilot_domain::{Platform, PlatformPublisher, PublishAck, PublishError, PublishRequest};
use std::collections::HashMap;
use uuid::Uuid;

/// Publisher that pretends every delivery went out
///
/// The default delivery backend: logs each delivery and returns a generated
/// ID. Failures can be injected per platform for demos and tests.
#[derive(Debug, Clone, Default)]
pub struct SimulatedPublisher {
    failures: HashMap<Platform, String>,
}

impl SimulatedPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every delivery to `target` fail with the given message
    pub fn with_failure(mut self, target: Platform, message: impl Into<String>) -> Self {
        self.failures.insert(target, message.into());
        self
    }
}

#[async_trait]
impl PlatformPublisher for SimulatedPublisher {
    async fn publish(
        &self,
        target: Platform,
        request: &PublishRequest,
    ) -> Result<PublishAck, PublishError> {
        if let Some(message) = self.failures.get(&target) {
            return Err(PublishError::Api(message.clone()));
        }

        tracing::info!(
            post_id = %request.post_id,
            target = %target,
            chars = request.content.chars().count(),
            "Simulated delivery"
        );

        Ok(PublishAck {
            external_id: Uuid::new_v4().to_string(),
            url: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> PublishRequest {
        PublishRequest {
            post_id: Uuid::new_v4(),
            owner: "testuser".to_string(),
            content: "hello".to_string(),
            image_url: None,
        }
    }

    #[tokio::test]
    async fn test_simulated_delivery_succeeds() {
        let publisher = SimulatedPublisher::new();
        let ack = publisher
            .publish(Platform::Twitter, &request())
            .await
            .unwrap();
        assert!(!ack.external_id.is_empty());
    }

    #[tokio::test]
    async fn test_injected_failure_only_hits_its_platform() {
        let publisher = SimulatedPublisher::new().with_failure(Platform::Twitter, "rate limited");

        let err = publisher
            .publish(Platform::Twitter, &request())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("rate limited"));

        assert!(publisher
            .publish(Platform::Facebook, &request())
            .await
            .is_ok());
    }
}
