//! Command-line subcommands and their handlers.
//!
//! Every handler writes its user-facing output to the given writer so the
//! same code serves the binary (stdout) and the tests (a `Vec<u8>`).

use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context as _, Result};
use clap::Subcommand;
use tokio::sync::watch;

use crate::config::Config;
use crate::feed::Fetcher;
use crate::pipeline::Scheduler;
use crate::storage::{Database, Feed, User};
use crate::util::{parse_interval, validate_feed_url};

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create a user and log in as them
    Register { name: String },

    /// Switch to an existing user
    Login { name: String },

    /// List all users
    Users,

    /// Delete every user, feed, follow and post
    Reset,

    /// Register a feed and follow it (requires login)
    Addfeed { name: String, url: String },

    /// List every registered feed
    Feeds,

    /// Follow an already registered feed (requires login)
    Follow { url: String },

    /// List the feeds you follow (requires login)
    Following,

    /// Stop following a feed (requires login)
    Unfollow { url: String },

    /// Show the newest posts from the feeds you follow (requires login)
    Browse {
        #[arg(default_value_t = 2)]
        limit: i64,
    },

    /// Poll a feed again after repeated failures suspended it
    Resume { url: String },

    /// Poll feeds every <INTERVAL> (e.g. 30s, 1m, 1h30m) until interrupted
    Agg { interval: String },
}

/// Shared state for one command invocation.
pub struct Context {
    pub db: Database,
    pub config: Config,
    /// Where `config` is saved when the current user changes
    pub config_path: PathBuf,
}

impl Context {
    pub fn new(db: Database, config: Config, config_path: PathBuf) -> Self {
        Self {
            db,
            config,
            config_path,
        }
    }

    /// The logged-in user, required by the follow/browse family of commands.
    pub async fn current_user(&self) -> Result<User> {
        let Some(name) = self.config.current_user_name.as_deref() else {
            bail!("No user is logged in. Run `gator login <name>` first.");
        };
        self.db
            .get_user_by_name(name)
            .await?
            .with_context(|| format!("Logged-in user '{}' is not registered", name))
    }

    fn set_current_user(&mut self, name: &str) -> Result<()> {
        self.config.current_user_name = Some(name.to_string());
        self.config
            .save(&self.config_path)
            .with_context(|| format!("Failed to save {}", self.config_path.display()))
    }

    async fn feed_by_url(&self, url: &str) -> Result<Feed> {
        self.db
            .get_feed_by_url(url)
            .await?
            .with_context(|| format!("No feed registered with URL {}", url))
    }
}

/// Run one command.
pub async fn execute<W: Write>(ctx: &mut Context, command: Command, out: &mut W) -> Result<()> {
    match command {
        Command::Register { name } => register(ctx, &name, out).await,
        Command::Login { name } => login(ctx, &name, out).await,
        Command::Users => users(ctx, out).await,
        Command::Reset => reset(ctx, out).await,
        Command::Addfeed { name, url } => add_feed(ctx, &name, &url, out).await,
        Command::Feeds => feeds(ctx, out).await,
        Command::Follow { url } => follow(ctx, &url, out).await,
        Command::Following => following(ctx, out).await,
        Command::Unfollow { url } => unfollow(ctx, &url, out).await,
        Command::Browse { limit } => browse(ctx, limit, out).await,
        Command::Resume { url } => resume(ctx, &url, out).await,
        Command::Agg { interval } => aggregate(ctx, &interval, out).await,
    }
}

async fn register<W: Write>(ctx: &mut Context, name: &str, out: &mut W) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        bail!("User name must not be empty");
    }
    if ctx.db.get_user_by_name(name).await?.is_some() {
        bail!("A user named '{}' is already registered", name);
    }

    let user = ctx.db.create_user(name).await.context("Failed to create user")?;
    ctx.set_current_user(&user.name)?;
    tracing::info!(user_id = user.id, name = %user.name, "Registered user");

    writeln!(out, "Created user {} (id {})", user.name, user.id)?;
    writeln!(out, "Logged in as {}", user.name)?;
    Ok(())
}

async fn login<W: Write>(ctx: &mut Context, name: &str, out: &mut W) -> Result<()> {
    if ctx.db.get_user_by_name(name).await?.is_none() {
        bail!("User '{}' must be registered before logging in", name);
    }
    ctx.set_current_user(name)?;
    writeln!(out, "Logged in as {}", name)?;
    Ok(())
}

async fn users<W: Write>(ctx: &Context, out: &mut W) -> Result<()> {
    let current = ctx.config.current_user_name.as_deref();
    for user in ctx.db.list_users().await? {
        if Some(user.name.as_str()) == current {
            writeln!(out, "* {} (current)", user.name)?;
        } else {
            writeln!(out, "* {}", user.name)?;
        }
    }
    Ok(())
}

async fn reset<W: Write>(ctx: &Context, out: &mut W) -> Result<()> {
    ctx.db.reset().await.context("Failed to reset database")?;
    tracing::info!("Database reset");
    writeln!(out, "Deleted all users, feeds and posts.")?;
    Ok(())
}

async fn add_feed<W: Write>(ctx: &Context, name: &str, url: &str, out: &mut W) -> Result<()> {
    let user = ctx.current_user().await?;
    let url = validate_feed_url(url)?;

    if ctx.db.get_feed_by_url(url.as_str()).await?.is_some() {
        bail!(
            "Feed {} is already registered; use `gator follow {}` instead",
            url,
            url
        );
    }

    let feed = ctx
        .db
        .create_feed(user.id, name.trim(), url.as_str())
        .await
        .context("Failed to add feed")?;
    tracing::info!(feed_id = feed.id, url = %feed.url, user = %user.name, "Added feed");

    writeln!(out, "Added feed {} ({})", feed.name, feed.url)?;
    writeln!(out, "{} now follows {}", user.name, feed.name)?;
    Ok(())
}

fn feed_status(feed: &Feed, threshold: i64) -> String {
    match &feed.last_error {
        _ if threshold > 0 && feed.consecutive_failures >= threshold => format!(
            "suspended after {} failures (run `gator resume {}`)",
            feed.consecutive_failures, feed.url
        ),
        Some(error) => format!("failing ({}): {}", feed.consecutive_failures, error),
        None => "ok".to_string(),
    }
}

async fn feeds<W: Write>(ctx: &Context, out: &mut W) -> Result<()> {
    let threshold = ctx.config.fetch.circuit_breaker_threshold;
    for (idx, row) in ctx.db.list_feeds_with_owner().await?.iter().enumerate() {
        let feed = &row.feed;
        let last_fetched = feed
            .last_fetched_at
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());

        writeln!(out, "Feed {}:", idx + 1)?;
        writeln!(out, " * Name: {}", feed.name)?;
        writeln!(out, " * URL: {}", feed.url)?;
        writeln!(out, " * Added by: {}", row.owner_name)?;
        writeln!(out, " * Last fetched: {}", last_fetched)?;
        writeln!(out, " * Status: {}", feed_status(feed, threshold))?;
        writeln!(out)?;
    }
    Ok(())
}

async fn follow<W: Write>(ctx: &Context, url: &str, out: &mut W) -> Result<()> {
    let user = ctx.current_user().await?;
    let feed = ctx.feed_by_url(url).await?;

    if ctx.db.follow_feed(user.id, feed.id).await? {
        writeln!(out, "{} now follows {}", user.name, feed.name)?;
    } else {
        writeln!(out, "{} already follows {}", user.name, feed.name)?;
    }
    Ok(())
}

async fn following<W: Write>(ctx: &Context, out: &mut W) -> Result<()> {
    let user = ctx.current_user().await?;
    for (idx, followed) in ctx.db.list_follows_for_user(user.id).await?.iter().enumerate() {
        writeln!(out, "Feed #{}: {} ({})", idx + 1, followed.feed_name, followed.feed_url)?;
    }
    Ok(())
}

async fn unfollow<W: Write>(ctx: &Context, url: &str, out: &mut W) -> Result<()> {
    let user = ctx.current_user().await?;
    let feed = ctx.feed_by_url(url).await?;

    if ctx.db.unfollow_feed(user.id, feed.id).await? {
        writeln!(out, "{} unfollowed {}", user.name, feed.name)?;
    } else {
        writeln!(out, "{} was not following {}", user.name, feed.name)?;
    }
    Ok(())
}

async fn browse<W: Write>(ctx: &Context, limit: i64, out: &mut W) -> Result<()> {
    if limit < 1 {
        bail!("Limit must be at least 1");
    }
    let user = ctx.current_user().await?;
    for post in ctx.db.posts_for_user(user.id, limit).await? {
        writeln!(out, "{}", serde_json::to_string_pretty(&post)?)?;
    }
    Ok(())
}

async fn resume<W: Write>(ctx: &Context, url: &str, out: &mut W) -> Result<()> {
    let feed = ctx.feed_by_url(url).await?;
    ctx.db.reset_feed_failures(feed.id).await?;
    tracing::info!(feed_id = feed.id, url = %feed.url, "Feed resumed");
    writeln!(out, "{} will be polled again", feed.name)?;
    Ok(())
}

/// Run the scheduler until SIGINT or SIGTERM.
///
/// The interval is validated before anything else, so a bad value fails
/// without touching the network.
async fn aggregate<W: Write>(ctx: &Context, interval: &str, out: &mut W) -> Result<()> {
    let interval =
        parse_interval(interval).with_context(|| format!("Invalid interval '{}'", interval))?;
    let fetcher = Fetcher::from_config(&ctx.config.fetch).context("Failed to build HTTP client")?;
    let scheduler = Scheduler::new(ctx.db.clone(), fetcher, interval)
        .with_circuit_breaker(ctx.config.fetch.circuit_breaker_threshold);

    let (stop_tx, stop_rx) = watch::channel(false);
    spawn_signal_listener(stop_tx)?;

    writeln!(out, "Collecting feeds every {:?}", interval)?;
    out.flush()?;

    scheduler.run(stop_rx).await;
    Ok(())
}

/// Send `true` on `stop` at the first SIGINT or SIGTERM.
fn spawn_signal_listener(stop: watch::Sender<bool>) -> Result<()> {
    // Installed up front so a failure surfaces before the loop starts
    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("Failed to install SIGTERM handler")?;

    tokio::spawn(async move {
        #[cfg(unix)]
        let sigterm_fut = sigterm.recv();
        #[cfg(not(unix))]
        let sigterm_fut = std::future::pending::<Option<()>>();

        tokio::select! {
            biased;

            _ = sigterm_fut => {
                tracing::info!("Received SIGTERM, stopping after the current cycle");
            }

            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => tracing::info!("Received SIGINT, stopping after the current cycle"),
                Err(e) => tracing::error!(error = %e, "Failed to listen for SIGINT, stopping"),
            },
        }

        let _ = stop.send(true);
    });

    Ok(())
}
