//! Periodic polling loop.
//!
//! Every interval the [`Scheduler`] runs one cycle: pick the stalest eligible
//! feed, fetch it, and ingest its entries. Cycles never overlap and their
//! errors are logged, never propagated out of [`Scheduler::run`].

use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::ingestor::{ingest, IngestReport};
use super::selector::{select_eligible_feed, SelectionError};
use crate::feed::{FetchError, Fetcher};
use crate::storage::{Database, DatabaseError, Feed};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Waiting for the next tick or the stop signal.
    Idle,
    /// A cycle is in progress.
    Polling,
}

/// Why a cycle ended early. None of these stop the loop.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error("failed to fetch feed {feed_id} ({url}): {source}")]
    Fetch {
        feed_id: i64,
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("failed to store poll results: {0}")]
    Persistence(#[from] DatabaseError),
}

/// Result of one successful cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub feed_id: i64,
    pub feed_name: String,
    /// Entries in the fetched document.
    pub fetched: usize,
    pub ingest: IngestReport,
}

pub struct Scheduler {
    db: Database,
    fetcher: Fetcher,
    interval: Duration,
    breaker_threshold: i64,
    state: SchedulerState,
}

impl Scheduler {
    /// Default number of consecutive failures after which a feed is skipped.
    pub const DEFAULT_BREAKER_THRESHOLD: i64 = 5;

    pub fn new(db: Database, fetcher: Fetcher, interval: Duration) -> Self {
        Self {
            db,
            fetcher,
            interval,
            breaker_threshold: Self::DEFAULT_BREAKER_THRESHOLD,
            state: SchedulerState::Idle,
        }
    }

    /// Override the circuit breaker threshold. 0 disables the breaker.
    pub fn with_circuit_breaker(mut self, threshold: i64) -> Self {
        self.breaker_threshold = threshold;
        self
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run exactly one select, fetch, ingest cycle.
    ///
    /// The state is `Polling` for the duration of the call and `Idle` again
    /// afterwards, whatever the outcome.
    pub async fn tick(&mut self) -> Result<CycleReport, CycleError> {
        self.state = SchedulerState::Polling;
        let result = self.poll_next_feed().await;
        self.state = SchedulerState::Idle;
        result
    }

    async fn poll_next_feed(&self) -> Result<CycleReport, CycleError> {
        let feeds = self.db.list_feeds().await?;
        let feed = select_eligible_feed(&feeds, self.breaker_threshold)?;
        tracing::debug!(feed_id = feed.id, url = %feed.url, "Polling feed");

        let entries = match self.fetcher.fetch(&feed.url).await {
            Ok(entries) => entries,
            Err(source) => {
                self.record_failure(feed, &source).await;
                return Err(CycleError::Fetch {
                    feed_id: feed.id,
                    url: feed.url.clone(),
                    source,
                });
            }
        };

        let report = ingest(&self.db, feed, &entries, Utc::now()).await?;

        Ok(CycleReport {
            feed_id: feed.id,
            feed_name: feed.name.clone(),
            fetched: entries.len(),
            ingest: report,
        })
    }

    /// Store the fetch error on the feed and bump its failure count.
    ///
    /// A database error here is only logged; the fetch error is what the
    /// cycle reports.
    async fn record_failure(&self, feed: &Feed, error: &FetchError) {
        match self.db.record_feed_failure(feed.id, &error.to_string()).await {
            Ok(failures) => {
                if self.breaker_threshold > 0 && failures == self.breaker_threshold {
                    tracing::info!(
                        feed_id = feed.id,
                        name = %feed.name,
                        failures = failures,
                        "Feed circuit breaker tripped - skipped until resumed"
                    );
                }
            }
            Err(db_err) => {
                tracing::warn!(
                    feed_id = feed.id,
                    error = %db_err,
                    "Failed to record feed failure"
                );
            }
        }
    }

    /// Tick every interval until `shutdown` turns `true` or its sender is dropped.
    ///
    /// The first cycle starts one full interval after the call. A cycle that
    /// overruns delays the following ticks instead of bursting to catch up.
    /// The stop signal is only observed between cycles.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        if *shutdown.borrow() {
            return;
        }

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval = ?self.interval, "Collecting feeds");

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Stop requested, aggregator exiting");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    let result = self.tick().await;
                    report_cycle(&result);
                }
            }
        }
    }
}

/// Log the outcome of one cycle.
pub fn report_cycle(result: &Result<CycleReport, CycleError>) {
    match result {
        Ok(report) => {
            for rejected in &report.ingest.rejected {
                tracing::warn!(
                    feed_id = report.feed_id,
                    link = %rejected.link,
                    title = %rejected.title,
                    error = %rejected.error,
                    "Skipped feed entry"
                );
            }
            tracing::info!(
                feed_id = report.feed_id,
                name = %report.feed_name,
                fetched = report.fetched,
                inserted = report.ingest.inserted,
                duplicates = report.ingest.duplicates,
                rejected = report.ingest.rejected.len(),
                "Feed polled"
            );
        }
        Err(CycleError::Selection(SelectionError::NoFeeds)) => {
            tracing::warn!("No feeds to poll; add one with `gator addfeed`");
        }
        Err(e @ CycleError::Selection(_)) => {
            tracing::warn!(error = %e, "No feed eligible for polling");
        }
        Err(CycleError::Fetch {
            feed_id,
            url,
            source,
        }) => {
            tracing::warn!(feed_id = feed_id, url = %url, error = %source, "Feed fetch failed");
        }
        Err(e @ CycleError::Persistence(_)) => {
            tracing::error!(error = %e, "Failed to persist poll results");
        }
    }
}
