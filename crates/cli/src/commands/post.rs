//! Post command - create and inspect scheduled posts

use anyhow::{Context, Result, bail};
use postpilot_adapters::store::SqliteStore;
use postpilot_domain::{
    AuditLog, Clock, Platform, PostStatus, PostStore, ScheduledPost, SystemClock,
};
use std::path::PathBuf;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use crate::args::{PostArgs, PostCommands};
use crate::commands::run::parse_enabled_platforms;
use crate::config::AppConfig;

pub async fn execute(args: PostArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;
    let enabled = parse_enabled_platforms(&config)?;

    let store = SqliteStore::new(&config.general.db_path)
        .await
        .context("Failed to initialize SQLite store")?;

    match args.command {
        PostCommands::Add {
            owner,
            content,
            targets,
            at,
            image_url,
            draft,
        } => add(&store, &enabled, owner, content, targets, at, image_url, draft).await,
        PostCommands::Schedule { id } => schedule(&store, &id).await,
        PostCommands::Edit {
            id,
            content,
            targets,
            at,
        } => edit(&store, &enabled, &id, content, targets, at).await,
        PostCommands::List {
            owner,
            status,
            limit,
            offset,
            json,
        } => list(&store, &owner, status.as_deref(), limit, offset, json).await,
        PostCommands::Attempts { id, json } => attempts(&store, &id, json).await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn add(
    store: &SqliteStore,
    enabled: &[Platform],
    owner: String,
    content: String,
    targets: Vec<String>,
    at: String,
    image_url: Option<String>,
    draft: bool,
) -> Result<()> {
    let targets = parse_targets(&targets, enabled)?;

    let scheduled_at = OffsetDateTime::parse(&at, &Rfc3339)
        .with_context(|| format!("Invalid --at timestamp (expected RFC 3339): {}", at))?;

    let now = SystemClock.now();
    let post = if draft {
        ScheduledPost::new_draft(owner, content, targets, scheduled_at, image_url, now)
    } else {
        ScheduledPost::new(owner, content, targets, scheduled_at, image_url, now)
    }
    .map_err(|e| anyhow::anyhow!("Cannot create post: {}", e))?;

    store
        .insert(&post)
        .await
        .context("Failed to store post")?;

    tracing::info!(id = %post.id, status = %post.status, "Post created");
    println!("{}", post.id);
    Ok(())
}

async fn schedule(store: &SqliteStore, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let mut post = store
        .get(id)
        .await
        .context("Failed to load post")?
        .with_context(|| format!("Post not found: {}", id))?;

    post.schedule(SystemClock.now())
        .map_err(|e| anyhow::anyhow!("Cannot schedule post: {}", e))?;

    store.update(&post).await.context("Failed to store post")?;

    println!(
        "Scheduled {} for {}",
        post.id,
        post.scheduled_at
            .format(&Rfc3339)
            .unwrap_or_else(|_| post.scheduled_at.to_string())
    );
    Ok(())
}

async fn edit(
    store: &SqliteStore,
    enabled: &[Platform],
    id: &str,
    content: Option<String>,
    targets: Vec<String>,
    at: Option<String>,
) -> Result<()> {
    if content.is_none() && targets.is_empty() && at.is_none() {
        bail!("Nothing to edit: pass --content, --target or --at");
    }

    let id = parse_id(id)?;
    let mut post = store
        .get(id)
        .await
        .context("Failed to load post")?
        .with_context(|| format!("Post not found: {}", id))?;

    if let Some(content) = content {
        post.edit_content(content)
            .map_err(|e| anyhow::anyhow!("Cannot edit post: {}", e))?;
    }
    if !targets.is_empty() {
        let targets = parse_targets(&targets, enabled)?;
        post.edit_targets(targets)
            .map_err(|e| anyhow::anyhow!("Cannot edit post: {}", e))?;
    }
    if let Some(at) = at {
        let scheduled_at = OffsetDateTime::parse(&at, &Rfc3339)
            .with_context(|| format!("Invalid --at timestamp (expected RFC 3339): {}", at))?;
        post.edit_schedule(scheduled_at, SystemClock.now())
            .map_err(|e| anyhow::anyhow!("Cannot edit post: {}", e))?;
    }

    store.update(&post).await.context("Failed to store post")?;
    println!("Updated {}", post.id);
    Ok(())
}

async fn list(
    store: &SqliteStore,
    owner: &str,
    status: Option<&str>,
    limit: u32,
    offset: u32,
    json: bool,
) -> Result<()> {
    let status = status
        .map(|s| {
            s.parse::<PostStatus>()
                .map_err(|e| anyhow::anyhow!("Invalid --status: {}", e))
        })
        .transpose()?;

    let posts = store
        .list_by_owner(owner, status, limit, offset)
        .await
        .context("Failed to list posts")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&posts)?);
        return Ok(());
    }

    if posts.is_empty() {
        println!("No posts found for {}", owner);
        return Ok(());
    }

    for post in &posts {
        let targets: Vec<&str> = post.targets.iter().map(|p| p.as_str()).collect();
        println!(
            "{}  {:<9}  {}  [{}]  {}",
            post.id,
            post.status,
            post.scheduled_at
                .format(&Rfc3339)
                .unwrap_or_else(|_| post.scheduled_at.to_string()),
            targets.join(", "),
            truncate(&post.content, 60)
        );
        if let Some(err) = &post.last_error {
            println!("    last error: {}", err);
        }
    }
    Ok(())
}

async fn attempts(store: &SqliteStore, id: &str, json: bool) -> Result<()> {
    let id = parse_id(id)?;
    let attempts = store
        .attempts_for(id)
        .await
        .context("Failed to load publication attempts")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&attempts)?);
        return Ok(());
    }

    if attempts.is_empty() {
        println!("No publication attempts for {}", id);
        return Ok(());
    }

    for attempt in &attempts {
        let when = attempt
            .attempted_at
            .format(&Rfc3339)
            .unwrap_or_else(|_| attempt.attempted_at.to_string());
        match &attempt.error_detail {
            Some(detail) => println!("{}  {:?}  {}", when, attempt.outcome, detail),
            None => println!("{}  {:?}", when, attempt.outcome),
        }
    }
    Ok(())
}

fn parse_targets(names: &[String], enabled: &[Platform]) -> Result<Vec<Platform>> {
    let mut targets = Vec::with_capacity(names.len());
    for name in names {
        let platform = name
            .parse::<Platform>()
            .map_err(|e| anyhow::anyhow!("{}", e))?;
        if !enabled.contains(&platform) {
            bail!("Platform not enabled in config: {}", platform);
        }
        targets.push(platform);
    }
    Ok(targets)
}

fn parse_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id).with_context(|| format!("Invalid post ID: {}", id))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{}...", cut)
    }
}
