//! Outbox publisher for review-before-send workflows.

use async_trait::async_trait;
use postpilot_domain::{Platform, PlatformPublisher, PublishAck, PublishError, PublishRequest};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct OutboxWriter {
    path: PathBuf,
    file: Arc<Mutex<tokio::fs::File>>,
}

impl OutboxWriter {
    pub async fn new(path: PathBuf) -> Result<Self, OutboxError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, entry: &OutboxEntry<'_>) -> Result<(), OutboxError> {
        let line = serde_json::to_string(entry)?;
        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(())
    }
}

/// Publisher that appends each delivery to a JSONL file instead of sending it
#[derive(Debug, Clone)]
pub struct OutboxPublisher {
    writer: OutboxWriter,
}

impl OutboxPublisher {
    pub fn new(writer: OutboxWriter) -> Self {
        Self { writer }
    }
}

#[derive(Serialize)]
struct OutboxEntry<'a> {
    platform: &'a str,
    post_id: String,
    owner: &'a str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<&'a str>,
}

#[async_trait]
impl PlatformPublisher for OutboxPublisher {
    async fn publish(
        &self,
        target: Platform,
        request: &PublishRequest,
    ) -> Result<PublishAck, PublishError> {
        let entry = OutboxEntry {
            platform: target.as_str(),
            post_id: request.post_id.to_string(),
            owner: &request.owner,
            content: &request.content,
            image_url: request.image_url.as_deref(),
        };

        self.writer
            .append(&entry)
            .await
            .map_err(|error| PublishError::Api(format!("Outbox write failed: {}", error)))?;

        Ok(PublishAck {
            external_id: Uuid::new_v4().to_string(),
            url: None,
        })
    }
}
