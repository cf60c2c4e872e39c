//! Webhook publisher - delivers posts to per-platform HTTP endpoints
//!
//! Stands in for real platform API integrations: each configured platform
//! maps to one URL (an automation bridge, relay service, or test double)
//! that receives the delivery as a JSON POST.

use async_trait::async_trait;
use postpilot_domain::{Platform, PlatformPublisher, PublishAck, PublishError, PublishRequest};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// HTTP publisher posting deliveries to configured endpoints
pub struct WebhookPublisher {
    client: Client,
    endpoints: HashMap<Platform, String>,
    bearer_token: Option<SecretString>,
}

impl WebhookPublisher {
    pub fn new(
        endpoints: HashMap<Platform, String>,
        bearer_token: Option<SecretString>,
    ) -> Result<Self, PublishError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PublishError::Network(e.to_string()))?;

        Ok(Self {
            client,
            endpoints,
            bearer_token,
        })
    }
}

#[derive(Serialize)]
struct DeliveryRequest<'a> {
    platform: &'a str,
    post_id: String,
    owner: &'a str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<&'a str>,
}

#[derive(Deserialize)]
struct DeliveryResponse {
    id: String,
    #[serde(default)]
    url: Option<String>,
}

#[async_trait]
impl PlatformPublisher for WebhookPublisher {
    async fn publish(
        &self,
        target: Platform,
        request: &PublishRequest,
    ) -> Result<PublishAck, PublishError> {
        let endpoint = self.endpoints.get(&target).ok_or_else(|| {
            PublishError::Api(format!("No endpoint configured for platform {}", target))
        })?;

        let body = DeliveryRequest {
            platform: target.as_str(),
            post_id: request.post_id.to_string(),
            owner: &request.owner,
            content: &request.content,
            image_url: request.image_url.as_deref(),
        };

        let mut http_request = self.client.post(endpoint).json(&body);
        if let Some(token) = &self.bearer_token {
            http_request = http_request.bearer_auth(token.expose_secret());
        }

        let response = http_request
            .send()
            .await
            .map_err(|e| PublishError::Network(e.to_string()))?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => Err(PublishError::RateLimited),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(PublishError::Auth(format!(
                "Endpoint rejected credentials for {}",
                target
            ))),
            status if status.is_success() => {
                let ack: DeliveryResponse = response
                    .json()
                    .await
                    .map_err(|e| PublishError::Api(format!("Invalid response body: {}", e)))?;
                Ok(PublishAck {
                    external_id: ack.id,
                    url: ack.url,
                })
            }
            status => {
                let detail = response.text().await.unwrap_or_default();
                Err(PublishError::Api(format!(
                    "Endpoint returned {}: {}",
                    status, detail
                )))
            }
        }
    }
}
