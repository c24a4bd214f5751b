use std::collections::BTreeSet;
use std::sync::Arc;

use html_escape::encode_double_quoted_attribute;
use tracing::info;
use url::Url;

use crate::app::{DatabaseError, Result, TethysError};
use crate::domain::Feed;
use crate::store::Store;

/// Subscription-level edits that are not part of a refresh.
#[derive(Clone)]
pub struct FeedService {
    store: Arc<dyn Store>,
}

impl FeedService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Marks every unread article of the feed read. Touched articles are
    /// left unsynced so the next push carries them. Returns how many changed.
    pub fn read_all(&self, feed_id: i64) -> Result<usize> {
        let changed = self.store.mark_feed_read(feed_id)?;
        info!(feed_id, changed, "Marked feed read");
        Ok(changed)
    }

    /// Every tag in use, sorted and deduplicated.
    pub fn tags(&self) -> Result<Vec<String>> {
        let tags: BTreeSet<String> = self
            .store
            .all_feeds()?
            .into_iter()
            .flat_map(|feed| feed.tags)
            .collect();
        Ok(tags.into_iter().collect())
    }

    /// Replaces the feed's tags. Blank and repeated tags are dropped.
    pub fn set_tags(&self, feed_id: i64, tags: &[String]) -> Result<Feed> {
        let mut feed = self.feed(feed_id)?;
        feed.tags.clear();
        for tag in tags {
            feed.add_tag(tag);
        }
        self.store.set_feed_tags(feed.id, &feed.tags)?;
        Ok(feed)
    }

    pub fn set_url(&self, feed_id: i64, url: &str) -> Result<Feed> {
        let parsed = Url::parse(url)?;
        let mut feed = self.feed(feed_id)?;
        feed.url = parsed.to_string();
        self.store.set_feed_url(feed.id, &feed.url)?;
        Ok(feed)
    }

    /// OPML 2.0 document listing every subscription.
    pub fn export_opml(&self) -> Result<String> {
        let mut opml = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <opml version=\"2.0\">\n  <head>\n    <title>tethys subscriptions</title>\n  </head>\n  <body>\n",
        );

        for feed in self.store.all_feeds()? {
            let title = encode_double_quoted_attribute(feed.display_title()).into_owned();
            let url = encode_double_quoted_attribute(&feed.url).into_owned();
            opml.push_str(&format!(
                "    <outline type=\"rss\" text=\"{}\" title=\"{}\" xmlUrl=\"{}\"",
                title, title, url
            ));
            if !feed.tags.is_empty() {
                let tags = feed.tags.join(",");
                opml.push_str(&format!(" category=\"{}\"", encode_double_quoted_attribute(&tags)));
            }
            opml.push_str("/>\n");
        }

        opml.push_str("  </body>\n</opml>\n");
        Ok(opml)
    }

    fn feed(&self, feed_id: i64) -> Result<Feed> {
        self.store
            .get_feed(feed_id)?
            .ok_or(TethysError::Database(DatabaseError::EntryNotFound))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Article;
    use crate::store::{ArticleQuery, SqliteStore};

    fn setup() -> (FeedService, Arc<dyn Store>) {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        (FeedService::new(store.clone()), store)
    }

    fn feed_with_articles(store: &Arc<dyn Store>, url: &str, n: usize) -> Feed {
        let feed = store.upsert_feed(&Feed::new(url)).unwrap();
        let articles: Vec<Article> = (0..n)
            .map(|i| {
                let mut article = Article::new(feed.id);
                article.link = Some(format!("{}/{}", url, i));
                article.synced = true;
                article
            })
            .collect();
        store.batch_save(&[], &articles).unwrap();
        feed
    }

    #[test]
    fn test_read_all_marks_only_that_feed() {
        let (service, store) = setup();
        let feed = feed_with_articles(&store, "https://a.example/feed", 3);
        let other = feed_with_articles(&store, "https://b.example/feed", 2);

        assert_eq!(service.read_all(feed.id).unwrap(), 3);
        assert_eq!(service.read_all(feed.id).unwrap(), 0);

        assert_eq!(store.unread_count(feed.id).unwrap(), 0);
        assert_eq!(store.unread_count(other.id).unwrap(), 2);
        let unsynced = store.articles(&ArticleQuery::Unsynced).unwrap();
        assert_eq!(unsynced.len(), 3);
        assert!(unsynced.iter().all(|a| a.feed_id == feed.id && a.read));
    }

    #[test]
    fn test_read_all_of_missing_feed_fails() {
        let (service, _store) = setup();
        assert_eq!(
            service.read_all(99),
            Err(TethysError::Database(DatabaseError::EntryNotFound))
        );
    }

    #[test]
    fn test_set_tags_normalizes_and_persists() {
        let (service, store) = setup();
        let feed = store.upsert_feed(&Feed::new("https://a.example/feed")).unwrap();

        let tags = vec!["rust".to_string(), " news ".to_string(), "rust".to_string(), "".to_string()];
        let updated = service.set_tags(feed.id, &tags).unwrap();

        assert_eq!(updated.tags, vec!["rust", "news"]);
        assert_eq!(store.get_feed(feed.id).unwrap().unwrap().tags, vec!["rust", "news"]);
    }

    #[test]
    fn test_tags_are_collected_across_feeds() {
        let (service, store) = setup();
        let a = store.upsert_feed(&Feed::new("https://a.example/feed")).unwrap();
        let b = store.upsert_feed(&Feed::new("https://b.example/feed")).unwrap();
        service.set_tags(a.id, &["rust".into(), "news".into()]).unwrap();
        service.set_tags(b.id, &["news".into(), "audio".into()]).unwrap();

        assert_eq!(service.tags().unwrap(), vec!["audio", "news", "rust"]);
    }

    #[test]
    fn test_set_url() {
        let (service, store) = setup();
        let feed = store.upsert_feed(&Feed::new("http://a.example/feed")).unwrap();
        store.upsert_feed(&Feed::new("https://b.example/feed")).unwrap();

        let moved = service.set_url(feed.id, "https://a.example/feed").unwrap();
        assert_eq!(moved.url, "https://a.example/feed");
        assert!(store.get_feed_by_url("https://a.example/feed").unwrap().is_some());
        assert!(store.get_feed_by_url("http://a.example/feed").unwrap().is_none());

        assert!(matches!(service.set_url(feed.id, "not a url"), Err(TethysError::InvalidUrl(_))));
        assert_eq!(
            service.set_url(feed.id, "https://b.example/feed"),
            Err(TethysError::Database(DatabaseError::Duplicate(
                "https://b.example/feed".into()
            )))
        );
    }

    #[test]
    fn test_export_opml_escapes_and_includes_tags() {
        let (service, store) = setup();
        let mut feed = Feed::new("https://a.example/feed?x=1&y=2");
        feed.title = "Tom & \"Jerry\"".into();
        let feed = store.upsert_feed(&feed).unwrap();
        service.set_tags(feed.id, &["cartoons".into(), "classic".into()]).unwrap();
        store.upsert_feed(&Feed::new("https://b.example/feed")).unwrap();

        let opml = service.export_opml().unwrap();

        assert!(opml.starts_with("<?xml"));
        assert!(opml.contains("<opml version=\"2.0\">"));
        assert!(opml.contains("xmlUrl=\"https://a.example/feed?x=1&amp;y=2\""));
        assert!(opml.contains("title=\"Tom &amp; &quot;Jerry&quot;\""));
        assert!(opml.contains("category=\"cartoons,classic\""));
        assert!(opml.contains("text=\"https://b.example/feed\""));
        assert_eq!(opml.matches("<outline").count(), 2);
    }
}
