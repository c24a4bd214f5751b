pub mod sqlite;

use crate::app::Result;
use crate::domain::{Article, Feed};

pub use sqlite::SqliteStore;

/// Predicates understood by [`Store::articles`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArticleQuery {
    All,
    Feed(i64),
    Unread,
    /// Articles whose read state has not been acknowledged by the backend.
    Unsynced,
    /// Articles whose link is any of the given URLs.
    Links(Vec<String>),
    /// Natural-key match inside one feed: same link OR same feed-native GUID.
    LinkOrIdentifier {
        feed_id: i64,
        link: Option<String>,
        identifier: Option<String>,
    },
}

pub trait Store: Send + Sync {
    // Feed operations
    fn get_feed(&self, id: i64) -> Result<Option<Feed>>;
    fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>>;
    fn all_feeds(&self) -> Result<Vec<Feed>>;
    /// Insert or update a feed, matched by id, else by URL.
    fn upsert_feed(&self, feed: &Feed) -> Result<Feed>;
    /// Delete a feed and every article it owns.
    fn delete_feed(&self, id: i64) -> Result<()>;
    fn unread_count(&self, feed_id: i64) -> Result<i64>;
    fn set_feed_tags(&self, id: i64, tags: &[String]) -> Result<()>;
    fn set_feed_url(&self, id: i64, url: &str) -> Result<()>;
    fn set_feed_image(&self, id: i64, image: &[u8]) -> Result<()>;
    /// Mark every unread article of a feed read and unsynced. Returns how
    /// many articles changed.
    fn mark_feed_read(&self, feed_id: i64) -> Result<usize>;

    // Article operations
    fn get_article(&self, id: i64) -> Result<Option<Article>>;
    fn articles(&self, query: &ArticleQuery) -> Result<Vec<Article>>;
    fn upsert_article(&self, article: &Article) -> Result<Article>;
    fn delete_article(&self, id: i64) -> Result<()>;
    fn set_reading_time(&self, id: i64, seconds: f64) -> Result<()>;
    /// Set the read state and clear `synced`, leaving every other column alone.
    fn set_read(&self, id: i64, read: bool) -> Result<Article>;
    fn set_flags(&self, id: i64, flags: &[String]) -> Result<()>;

    // Sync state
    /// Mark pushed articles synced, but only those whose read state still
    /// equals the pushed value. Returns how many rows were acknowledged.
    fn mark_synced(&self, pushed: &[(i64, bool)]) -> Result<usize>;
    fn mark_unsynced(&self, ids: &[i64]) -> Result<()>;

    // Relations
    fn relate_articles(&self, a: i64, b: i64) -> Result<()>;
    fn unrelate_articles(&self, a: i64, b: i64) -> Result<()>;

    /// Save feeds and articles in one transaction. Returns the saved
    /// articles with storage identifiers assigned.
    fn batch_save(&self, feeds: &[Feed], articles: &[Article]) -> Result<Vec<Article>>;

    /// Commit a feed refresh in one transaction. Only fields a refresh owns
    /// are written: feed title, summary and `last_updated`; article content,
    /// metadata, authors and relations. Read, synced and flag state of
    /// existing articles and the feed's tags, URL and image are untouched.
    /// Fails with `EntryNotFound` if the feed no longer exists.
    fn save_refresh(&self, feed: &Feed, articles: &[Article]) -> Result<Vec<Article>>;
}
