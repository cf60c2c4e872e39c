//! Run command - the scheduler loop and manual tick trigger

use anyhow::{Context, Result, bail};
use postpilot_adapters::{
    publish::{OutboxPublisher, OutboxWriter, SimulatedPublisher, WebhookPublisher},
    store::SqliteStore,
};
use postpilot_domain::{
    Platform, PlatformPublisher, SystemClock,
    usecases::{SchedulerConfig, SchedulerLoop},
};
use secrecy::SecretString;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use crate::args::RunArgs;
use crate::config::AppConfig;

pub async fn execute(args: RunArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;

    // Invalid platform enumeration is fatal here, never per post at runtime
    let platforms = parse_enabled_platforms(&config)?;

    tracing::info!(
        once = args.once,
        mode = %config.delivery.mode,
        platforms = ?platforms,
        poll_interval_secs = config.scheduler.poll_interval_secs,
        "Starting postpilot scheduler"
    );

    let store = Arc::new(
        SqliteStore::new(&config.general.db_path)
            .await
            .context("Failed to initialize SQLite store")?,
    );

    let publisher = build_publisher(&config, &platforms).await?;

    let scheduler = SchedulerLoop::new(
        publisher,
        Arc::clone(&store),
        store,
        Arc::new(SystemClock),
        SchedulerConfig {
            max_concurrent: config.scheduler.max_concurrent,
            claim_lease: Duration::from_secs(config.scheduler.claim_lease_secs),
        },
    );

    if args.once {
        tracing::info!("Running single scheduler tick");
        let summary = scheduler.tick().await?;
        println!(
            "published={} failed={} skipped={} deferred={}",
            summary.published, summary.failed, summary.skipped, summary.deferred
        );
        return Ok(());
    }

    // Continuous polling loop
    let poll_interval = Duration::from_secs(config.scheduler.poll_interval_secs.max(1));
    let mut ticker = interval(poll_interval);

    // Set up graceful shutdown
    let shutdown = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        tracing::info!("Shutdown signal received");
    };

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match scheduler.tick().await {
                    Ok(summary) => {
                        if summary.processed() + summary.skipped > 0 {
                            tracing::info!(
                                published = summary.published,
                                failed = summary.failed,
                                skipped = summary.skipped,
                                "Scheduler tick complete"
                            );
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Scheduler tick failed");
                    }
                }
            }
            _ = &mut shutdown => {
                tracing::info!("Shutting down gracefully");
                break;
            }
        }
    }

    tracing::info!("postpilot run completed");
    Ok(())
}

/// Parse and validate the configured platform enumeration
pub fn parse_enabled_platforms(config: &AppConfig) -> Result<Vec<Platform>> {
    if config.delivery.platforms.is_empty() {
        bail!("No platforms configured");
    }
    config
        .delivery
        .platforms
        .iter()
        .map(|name| {
            name.parse::<Platform>()
                .with_context(|| format!("Invalid platform in config: {}", name))
        })
        .collect()
}

/// Build the delivery backend selected by config
pub async fn build_publisher(
    config: &AppConfig,
    platforms: &[Platform],
) -> Result<Arc<dyn PlatformPublisher>> {
    match config.delivery.mode.as_str() {
        "sim" => Ok(Arc::new(SimulatedPublisher::new())),
        "outbox" => {
            let writer = OutboxWriter::new(config.delivery.outbox_path.clone())
                .await
                .context("Failed to initialize outbox writer")?;
            tracing::info!(
                outbox = %config.delivery.outbox_path.display(),
                "Writing deliveries to outbox"
            );
            Ok(Arc::new(OutboxPublisher::new(writer)))
        }
        "webhook" => {
            let endpoints = webhook_endpoints(config, platforms)?;
            let token = std::env::var(&config.delivery.webhook.bearer_token_env)
                .ok()
                .map(|t| SecretString::new(t.into()));
            let publisher = WebhookPublisher::new(endpoints, token)
                .map_err(|e| anyhow::anyhow!("Failed to build webhook publisher: {}", e))?;
            Ok(Arc::new(publisher))
        }
        other => bail!("Invalid delivery mode: {}", other),
    }
}

/// Resolve a webhook endpoint for every enabled platform
pub fn webhook_endpoints(
    config: &AppConfig,
    platforms: &[Platform],
) -> Result<HashMap<Platform, String>> {
    let mut endpoints = HashMap::new();
    for platform in platforms {
        let url = config
            .delivery
            .webhook
            .endpoints
            .get(platform.as_str())
            .with_context(|| format!("No webhook endpoint configured for {}", platform))?;
        endpoints.insert(*platform, url.clone());
    }
    Ok(endpoints)
}
