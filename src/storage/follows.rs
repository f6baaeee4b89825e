use chrono::Utc;

use super::schema::Database;
use super::types::{to_millis, DatabaseError, FollowedFeed};

impl Database {
    /// Follow a feed. Following a feed twice is a no-op.
    ///
    /// Returns `true` if a new follow was created.
    pub async fn follow_feed(&self, user_id: i64, feed_id: i64) -> Result<bool, DatabaseError> {
        let now = to_millis(Utc::now());
        let result = sqlx::query(
            "INSERT INTO feed_follows (user_id, feed_id, created_at, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(user_id, feed_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(feed_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Returns `false` if the user was not following the feed.
    pub async fn unfollow_feed(&self, user_id: i64, feed_id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM feed_follows WHERE user_id = ? AND feed_id = ?")
            .bind(user_id)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_follows_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<FollowedFeed>, DatabaseError> {
        let rows = sqlx::query_as::<_, FollowedFeed>(
            r#"
            SELECT f.id AS feed_id, f.name AS feed_name, f.url AS feed_url
            FROM feed_follows ff
            JOIN feeds f ON f.id = ff.feed_id
            WHERE ff.user_id = ?
            ORDER BY ff.created_at, ff.id
        "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::Database;

    #[tokio::test]
    async fn test_follow_and_unfollow() {
        let db = Database::open(":memory:").await.unwrap();
        let alice = db.create_user("alice").await.unwrap();
        let bob = db.create_user("bob").await.unwrap();
        let feed = db
            .create_feed(alice.id, "A", "https://a.example.com/rss")
            .await
            .unwrap();

        assert!(db.follow_feed(bob.id, feed.id).await.unwrap());
        assert!(!db.follow_feed(bob.id, feed.id).await.unwrap());
        assert_eq!(db.list_follows_for_user(bob.id).await.unwrap().len(), 1);

        assert!(db.unfollow_feed(bob.id, feed.id).await.unwrap());
        assert!(!db.unfollow_feed(bob.id, feed.id).await.unwrap());
        assert!(db.list_follows_for_user(bob.id).await.unwrap().is_empty());

        // Unfollowing does not affect other users
        assert_eq!(db.list_follows_for_user(alice.id).await.unwrap().len(), 1);
    }
}
