//! Configuration loading and management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub scheduler: SchedulerSection,

    #[serde(default)]
    pub delivery: DeliveryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSection {
    /// Documented fallback cadence is one tick per minute
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_claim_lease")]
    pub claim_lease_secs: u64,

    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Delivery backend: sim, outbox, webhook
    #[serde(default = "default_delivery_mode")]
    pub mode: String,

    /// Valid platform names posts may target
    #[serde(default = "default_platforms")]
    pub platforms: Vec<String>,

    #[serde(default = "default_outbox_path")]
    pub outbox_path: PathBuf,

    #[serde(default)]
    pub webhook: WebhookConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Platform name -> endpoint URL
    #[serde(default)]
    pub endpoints: HashMap<String, String>,

    #[serde(default = "default_webhook_token_env")]
    pub bearer_token_env: String,
}

// Default value functions
fn default_db_path() -> PathBuf {
    PathBuf::from("./postpilot.sqlite")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_poll_interval() -> u64 {
    60
}

fn default_claim_lease() -> u64 {
    120
}

fn default_max_concurrent() -> usize {
    4
}

fn default_delivery_mode() -> String {
    "sim".to_string()
}

fn default_platforms() -> Vec<String> {
    vec![
        "twitter".to_string(),
        "facebook".to_string(),
        "instagram".to_string(),
    ]
}

fn default_outbox_path() -> PathBuf {
    PathBuf::from("./outbox.jsonl")
}

fn default_webhook_token_env() -> String {
    "POSTPILOT_WEBHOOK_TOKEN".to_string()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            log_level: default_log_level(),
        }
    }
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            claim_lease_secs: default_claim_lease(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            mode: default_delivery_mode(),
            platforms: default_platforms(),
            outbox_path: default_outbox_path(),
            webhook: WebhookConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Try default config path if none specified
        let default_path = PathBuf::from("./config.toml");
        let path = config_path.unwrap_or(&default_path);

        if path.exists() {
            builder = builder.add_source(config::File::from(path));
        } else if config_path.is_some() {
            // User specified a path that doesn't exist
            anyhow::bail!("Config file not found: {}", path.display());
        }

        // Add environment variable overrides
        builder = builder.add_source(
            config::Environment::with_prefix("POSTPILOT")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Generate example configuration as TOML string
    pub fn example_toml() -> String {
        r#"# postpilot configuration

[general]
db_path = "./postpilot.sqlite"
log_level = "info"

[scheduler]
poll_interval_secs = 60
claim_lease_secs = 120
max_concurrent = 4

[delivery]
mode = "sim"  # sim, outbox, webhook
platforms = ["twitter", "facebook", "instagram"]
outbox_path = "./outbox.jsonl"

[delivery.webhook]
bearer_token_env = "POSTPILOT_WEBHOOK_TOKEN"

[delivery.webhook.endpoints]
# twitter = "https://bridge.example.com/hooks/twitter"
# facebook = "https://bridge.example.com/hooks/facebook"
# instagram = "https://bridge.example.com/hooks/instagram"
"#
        .to_string()
    }
}
