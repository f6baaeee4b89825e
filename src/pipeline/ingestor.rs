//! Turns fetched entries into stored posts.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::feed::{normalize_date, DateFormatError, Entry};
use crate::storage::{Database, DatabaseError, Feed, NewPost};

/// Why a single entry was left out of a poll. Never fails the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryError {
    #[error("entry has no link")]
    MissingLink,

    #[error(transparent)]
    Date(#[from] DateFormatError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedEntry {
    pub link: String,
    pub title: String,
    pub error: EntryError,
}

/// Outcome of ingesting one fetched batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Posts newly stored.
    pub inserted: usize,
    /// Valid entries whose link was already stored.
    pub duplicates: usize,
    pub rejected: Vec<RejectedEntry>,
}

impl IngestReport {
    /// Date failures only, in batch order
    pub fn date_errors(&self) -> impl Iterator<Item = &DateFormatError> {
        self.rejected.iter().filter_map(|r| match &r.error {
            EntryError::Date(e) => Some(e),
            EntryError::MissingLink => None,
        })
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Validate one entry and convert it into an insertable post.
pub fn prepare_post(feed_id: i64, entry: &Entry) -> Result<NewPost, EntryError> {
    let url = entry.link.trim();
    if url.is_empty() {
        return Err(EntryError::MissingLink);
    }
    let published_at = normalize_date(&entry.published)?;

    Ok(NewPost {
        feed_id,
        title: non_empty(&entry.title),
        url: url.to_string(),
        description: non_empty(&entry.description),
        published_at,
    })
}

/// Store the valid entries of a fetched batch and mark the feed as polled.
///
/// Entries with no link or an unparseable date are reported in
/// [`IngestReport::rejected`] and the rest of the batch continues. Inserting
/// the posts and advancing `last_fetched_at` to `fetched_at` happen in one
/// transaction; on error neither is visible.
pub async fn ingest(
    db: &Database,
    feed: &Feed,
    entries: &[Entry],
    fetched_at: DateTime<Utc>,
) -> Result<IngestReport, DatabaseError> {
    let mut posts = Vec::with_capacity(entries.len());
    let mut rejected = Vec::new();

    for entry in entries {
        match prepare_post(feed.id, entry) {
            Ok(post) => posts.push(post),
            Err(error) => rejected.push(RejectedEntry {
                link: entry.link.clone(),
                title: entry.title.clone(),
                error,
            }),
        }
    }

    let inserted = db.complete_feed_poll(feed.id, &posts, fetched_at).await?;

    Ok(IngestReport {
        inserted,
        duplicates: posts.len() - inserted,
        rejected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry(link: &str, published: &str) -> Entry {
        Entry {
            title: format!("title of {link}"),
            link: link.to_string(),
            description: String::new(),
            published: published.to_string(),
        }
    }

    async fn setup() -> (Database, Feed) {
        let db = Database::open(":memory:").await.unwrap();
        let user = db.create_user("alice").await.unwrap();
        let feed = db
            .create_feed(user.id, "Example", "https://example.com/rss")
            .await
            .unwrap();
        (db, feed)
    }

    #[test]
    fn test_prepare_post_blank_fields_become_none() {
        let post = prepare_post(
            4,
            &Entry {
                title: "   ".to_string(),
                link: " https://example.com/a ".to_string(),
                description: String::new(),
                published: "Mon, 02 Jan 2006 15:04:05 GMT".to_string(),
            },
        )
        .unwrap();

        assert_eq!(post.feed_id, 4);
        assert_eq!(post.url, "https://example.com/a");
        assert_eq!(post.title, None);
        assert_eq!(post.description, None);
    }

    #[test]
    fn test_prepare_post_missing_link() {
        let err = prepare_post(1, &entry("", "Mon, 02 Jan 2006 15:04:05 GMT")).unwrap_err();
        assert_eq!(err, EntryError::MissingLink);
    }

    #[test]
    fn test_prepare_post_bad_date() {
        let err = prepare_post(1, &entry("https://example.com/a", "yesterday")).unwrap_err();
        assert_eq!(
            err,
            EntryError::Date(DateFormatError::Unsupported("yesterday".to_string()))
        );
    }

    #[tokio::test]
    async fn test_bad_date_rejects_only_that_entry() {
        let (db, feed) = setup().await;
        let entries = vec![
            entry("https://example.com/1", "Mon, 02 Jan 2006 15:04:05 -0700"),
            entry("https://example.com/2", "not-a-date"),
            entry("https://example.com/3", "2006-01-03T10:00:00Z"),
        ];

        let report = ingest(&db, &feed, &entries, Utc::now()).await.unwrap();

        assert_eq!(report.inserted, 2);
        assert_eq!(report.duplicates, 0);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].link, "https://example.com/2");
        assert_eq!(
            report.date_errors().collect::<Vec<_>>(),
            vec![&DateFormatError::Unsupported("not-a-date".to_string())]
        );
        assert_eq!(db.posts_for_feed(feed.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_ingest_is_idempotent() {
        let (db, feed) = setup().await;
        let entries = vec![
            entry("https://example.com/1", "Mon, 02 Jan 2006 15:04:05 GMT"),
            entry("https://example.com/2", "Tue, 03 Jan 2006 15:04:05 GMT"),
        ];

        let first = ingest(&db, &feed, &entries, Utc::now()).await.unwrap();
        let before: Vec<String> = db
            .posts_for_feed(feed.id)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.url)
            .collect();

        let second = ingest(&db, &feed, &entries, Utc::now()).await.unwrap();
        let after: Vec<String> = db
            .posts_for_feed(feed.id)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.url)
            .collect();

        assert_eq!(first.inserted, 2);
        assert_eq!(second.inserted, 0);
        assert_eq!(second.duplicates, 2);
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_ingest_advances_last_fetched() {
        let (db, feed) = setup().await;
        let fetched_at = Utc::now();

        ingest(&db, &feed, &[], fetched_at).await.unwrap();

        let stored = db.get_feed_by_url(&feed.url).await.unwrap().unwrap();
        assert_eq!(
            stored.last_fetched_at.map(|t| t.timestamp_millis()),
            Some(fetched_at.timestamp_millis())
        );
    }
}
