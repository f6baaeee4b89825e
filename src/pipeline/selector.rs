use thiserror::Error;

use crate::storage::Feed;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("no feeds registered")]
    NoFeeds,

    /// Every registered feed has tripped the circuit breaker.
    #[error("all {suspended} feeds are suspended after repeated failures")]
    AllSuspended { suspended: usize },
}

/// Pick the feed that has gone longest without a successful poll.
///
/// A feed that was never fetched sorts before every fetched one. Ties are
/// broken by the lower id, so the result is stable for an unchanged set.
pub fn select_next_feed(feeds: &[Feed]) -> Result<&Feed, SelectionError> {
    // `None < Some(_)` for Option, which gives never-fetched feeds priority
    feeds
        .iter()
        .min_by_key(|feed| (feed.last_fetched_at, feed.id))
        .ok_or(SelectionError::NoFeeds)
}

/// [`select_next_feed`] over the feeds whose circuit breaker has not tripped.
///
/// `threshold` is the failure count at which a feed is skipped; 0 disables
/// the breaker.
pub fn select_eligible_feed(feeds: &[Feed], threshold: i64) -> Result<&Feed, SelectionError> {
    if feeds.is_empty() {
        return Err(SelectionError::NoFeeds);
    }
    if threshold <= 0 {
        return select_next_feed(feeds);
    }

    feeds
        .iter()
        .filter(|feed| feed.consecutive_failures < threshold)
        .min_by_key(|feed| (feed.last_fetched_at, feed.id))
        .ok_or(SelectionError::AllSuspended {
            suspended: feeds.len(),
        })
}
