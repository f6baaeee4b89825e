use chrono::{DateTime, Utc};
use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{to_millis, DatabaseError, Feed, FeedDbRow, FeedWithOwner, NewPost};

/// Columns selected for every `Feed` query, in `FeedDbRow` order
const FEED_COLUMNS: &str = "f.id, f.name, f.url, f.user_id, f.created_at, f.updated_at, \
     f.last_fetched_at, f.last_error, f.consecutive_failures";

/// 7 bound columns * 50 rows stays well under SQLite's 999 parameter limit
const POST_BATCH_SIZE: usize = 50;

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Register a feed and make its creator follow it, in one transaction.
    ///
    /// Fails with a unique constraint violation if the URL is already registered.
    pub async fn create_feed(
        &self,
        user_id: i64,
        name: &str,
        url: &str,
    ) -> Result<Feed, DatabaseError> {
        let now = to_millis(Utc::now());
        let mut tx = self.pool.begin().await?;

        let row: FeedDbRow = sqlx::query_as(
            r#"
            INSERT INTO feeds (name, url, user_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id, name, url, user_id, created_at, updated_at,
                      last_fetched_at, last_error, consecutive_failures
        "#,
        )
        .bind(name)
        .bind(url)
        .bind(user_id)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO feed_follows (user_id, feed_id, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(row.id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.into_feed())
    }

    pub async fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>, DatabaseError> {
        let row: Option<FeedDbRow> =
            sqlx::query_as(&format!("SELECT {FEED_COLUMNS} FROM feeds f WHERE f.url = ?"))
                .bind(url)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(FeedDbRow::into_feed))
    }

    /// All registered feeds, ordered by id.
    pub async fn list_feeds(&self) -> Result<Vec<Feed>, DatabaseError> {
        let rows: Vec<FeedDbRow> =
            sqlx::query_as(&format!("SELECT {FEED_COLUMNS} FROM feeds f ORDER BY f.id"))
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(FeedDbRow::into_feed).collect())
    }

    /// All feeds with the name of the user who registered them
    pub async fn list_feeds_with_owner(&self) -> Result<Vec<FeedWithOwner>, DatabaseError> {
        #[derive(sqlx::FromRow)]
        struct Row {
            #[sqlx(flatten)]
            feed: FeedDbRow,
            owner_name: String,
        }

        let rows: Vec<Row> = sqlx::query_as(&format!(
            "SELECT {FEED_COLUMNS}, u.name AS owner_name
             FROM feeds f
             JOIN users u ON u.id = f.user_id
             ORDER BY f.id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| FeedWithOwner {
                feed: row.feed.into_feed(),
                owner_name: row.owner_name,
            })
            .collect())
    }

    // ========================================================================
    // Polling Operations
    // ========================================================================

    /// Complete a feed poll atomically: insert new posts, advance `last_fetched_at`,
    /// clear the error state.
    ///
    /// Posts are inserted with `ON CONFLICT(url) DO NOTHING`, so links already in
    /// the store (from any feed) are skipped rather than duplicated or updated.
    /// `last_fetched_at` is only written when `fetched_at` is later than the
    /// stored value. If any step fails the transaction rolls back and the feed
    /// stays eligible for the next poll.
    ///
    /// # Returns
    ///
    /// The number of newly inserted posts.
    pub async fn complete_feed_poll(
        &self,
        feed_id: i64,
        posts: &[NewPost],
        fetched_at: DateTime<Utc>,
    ) -> Result<usize, DatabaseError> {
        let fetched_at = to_millis(fetched_at);
        let now = to_millis(Utc::now());
        let mut tx = self.pool.begin().await?;
        let mut inserted: usize = 0;

        for chunk in posts.chunks(POST_BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT INTO posts (feed_id, title, url, description, published_at, created_at, updated_at) ",
            );

            builder.push_values(chunk, |mut b, post| {
                b.push_bind(post.feed_id)
                    .push_bind(&post.title)
                    .push_bind(&post.url)
                    .push_bind(&post.description)
                    .push_bind(to_millis(post.published_at))
                    .push_bind(now)
                    .push_bind(now);
            });
            builder.push(" ON CONFLICT(url) DO NOTHING");

            let result = builder.build().execute(&mut *tx).await?;
            inserted += result.rows_affected() as usize;
        }

        sqlx::query(
            r#"
            UPDATE feeds SET
                last_fetched_at = CASE
                    WHEN last_fetched_at IS NULL OR last_fetched_at < ? THEN ?
                    ELSE last_fetched_at
                END,
                last_error = NULL,
                consecutive_failures = 0,
                updated_at = ?
            WHERE id = ?
        "#,
        )
        .bind(fetched_at)
        .bind(fetched_at)
        .bind(now)
        .bind(feed_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(inserted)
    }

    // ========================================================================
    // Circuit Breaker Operations
    // ========================================================================

    /// Record a failed poll. Returns the new consecutive failure count.
    ///
    /// `last_fetched_at` is deliberately left untouched.
    pub async fn record_feed_failure(
        &self,
        feed_id: i64,
        error: &str,
    ) -> Result<i64, DatabaseError> {
        let result: (i64,) = sqlx::query_as(
            "UPDATE feeds SET consecutive_failures = consecutive_failures + 1, last_error = ?
             WHERE id = ? RETURNING consecutive_failures",
        )
        .bind(error)
        .bind(feed_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(result.0)
    }

    /// Clear the failure count so a suspended feed is polled again.
    ///
    /// Returns `false` if no feed has that id.
    pub async fn reset_feed_failures(&self, feed_id: i64) -> Result<bool, DatabaseError> {
        let result =
            sqlx::query("UPDATE feeds SET consecutive_failures = 0, last_error = NULL WHERE id = ?")
                .bind(feed_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}
