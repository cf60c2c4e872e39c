//! Doctor command - validate configuration before running

use anyhow::{Result, bail};
use postpilot_adapters::store::SqliteStore;
use std::path::PathBuf;

use crate::commands::run::{parse_enabled_platforms, webhook_endpoints};
use crate::config::AppConfig;

pub async fn execute(config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;
    let mut problems = 0usize;

    // Platform enumeration
    let platforms = match parse_enabled_platforms(&config) {
        Ok(platforms) => {
            let names: Vec<&str> = platforms.iter().map(|p| p.as_str()).collect();
            println!("ok: platforms [{}]", names.join(", "));
            Some(platforms)
        }
        Err(e) => {
            println!("error: {:#}", e);
            problems += 1;
            None
        }
    };

    // Delivery mode
    match config.delivery.mode.as_str() {
        "sim" | "outbox" => println!("ok: delivery mode '{}'", config.delivery.mode),
        "webhook" => {
            println!("ok: delivery mode 'webhook'");
            if let Some(platforms) = &platforms {
                match webhook_endpoints(&config, platforms) {
                    Ok(endpoints) => {
                        println!("ok: webhook endpoints configured ({})", endpoints.len())
                    }
                    Err(e) => {
                        println!("error: {:#}", e);
                        problems += 1;
                    }
                }
            }
            if std::env::var(&config.delivery.webhook.bearer_token_env).is_err() {
                println!(
                    "warning: {} not set, webhook requests will be unauthenticated",
                    config.delivery.webhook.bearer_token_env
                );
            }
        }
        other => {
            println!("error: invalid delivery mode '{}'", other);
            problems += 1;
        }
    }

    // Scheduler settings
    if config.scheduler.poll_interval_secs == 0 {
        println!("warning: poll_interval_secs is 0, clamped to 1s at runtime");
    }
    if config.scheduler.max_concurrent == 0 {
        println!("error: max_concurrent must be at least 1");
        problems += 1;
    }

    // Store reachability
    match SqliteStore::new(&config.general.db_path).await {
        Ok(_) => println!("ok: database at {}", config.general.db_path.display()),
        Err(e) => {
            println!("error: cannot open database: {}", e);
            problems += 1;
        }
    }

    if problems > 0 {
        bail!("{} configuration problem(s) found", problems);
    }

    println!("Configuration looks good");
    Ok(())
}
