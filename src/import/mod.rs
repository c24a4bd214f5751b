//! Discovering and importing subscriptions from a URL: a feed, an OPML
//! file, or a web page advertising feeds through `<link rel="alternate">`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use html_escape::decode_html_entities;
use tracing::{debug, info, warn};
use url::Url;

use crate::app::{NetworkError, Result, TethysError};
use crate::client::{HttpClient, HttpRequest};
use crate::domain::Feed;
use crate::parser::FeedParser;
use crate::store::Store;
use crate::update::FeedUpdater;

const FEED_MIME_TYPES: &[&str] = &[
    "application/rss+xml",
    "application/atom+xml",
    "application/feed+json",
    "application/json",
];

/// What a scanned URL turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Importable {
    Feed { url: String, articles: usize },
    Opml { url: String, feeds: usize },
    WebPage { url: String, feeds: Vec<String> },
    None(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImportKind {
    Feed,
    Opml,
}

pub struct ImportService {
    client: Arc<dyn HttpClient>,
    parser: Arc<dyn FeedParser>,
    store: Arc<dyn Store>,
    updater: FeedUpdater,
    known_urls: Mutex<HashMap<String, ImportKind>>,
}

impl ImportService {
    pub fn new(
        client: Arc<dyn HttpClient>,
        parser: Arc<dyn FeedParser>,
        store: Arc<dyn Store>,
        updater: FeedUpdater,
    ) -> Self {
        Self {
            client,
            parser,
            store,
            updater,
            known_urls: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch `url` and classify it. Fetch failures classify as `None`.
    pub async fn scan_for_importable(&self, url: &str) -> Importable {
        match self.fetch(url).await {
            Ok(data) => self.scan_data(&data, url),
            Err(e) => {
                debug!(url, error = %e, "Nothing to import");
                Importable::None(url.to_string())
            }
        }
    }

    /// Classify already-loaded content found at `url`.
    pub fn scan_data(&self, data: &[u8], url: &str) -> Importable {
        if let Ok(parsed) = self.parser.parse(data) {
            self.remember(url, ImportKind::Feed);
            return Importable::Feed {
                url: url.to_string(),
                articles: parsed.articles.len(),
            };
        }

        let text = String::from_utf8_lossy(data);
        if is_opml(&text) {
            self.remember(url, ImportKind::Opml);
            return Importable::Opml {
                url: url.to_string(),
                feeds: parse_opml(&text).len(),
            };
        }

        let feeds = feeds_in_web_page(url, &text);
        if feeds.is_empty() {
            return Importable::None(url.to_string());
        }
        for feed in &feeds {
            self.remember(feed, ImportKind::Feed);
        }
        Importable::WebPage {
            url: url.to_string(),
            feeds,
        }
    }

    /// Import a URL previously classified by a scan.
    ///
    /// A feed is subscribed and updated once; an update failure is logged
    /// and the subscription kept. An OPML file subscribes every outline.
    pub async fn import_item(&self, url: &str) -> Result<Vec<Feed>> {
        let kind = self
            .known_urls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .copied();

        match kind {
            None => Err(TethysError::Unknown),
            Some(ImportKind::Feed) => {
                let feed = self.subscribe(Feed::new(url))?;
                match self.updater.update_feed(&feed).await {
                    Ok(updated) => Ok(vec![updated]),
                    Err(e) => {
                        warn!(url, error = %e, "Imported feed failed its first update");
                        Ok(vec![feed])
                    }
                }
            }
            Some(ImportKind::Opml) => {
                let data = self.fetch(url).await?;
                let outlines = parse_opml(&String::from_utf8_lossy(&data));

                let mut feeds = Vec::with_capacity(outlines.len());
                for outline in outlines {
                    let mut feed = Feed::new(outline.url);
                    feed.title = outline.title;
                    for tag in &outline.tags {
                        feed.add_tag(tag);
                    }
                    feeds.push(self.subscribe(feed)?);
                }
                info!(url, feeds = feeds.len(), "Imported OPML");
                Ok(feeds)
            }
        }
    }

    fn remember(&self, url: &str, kind: ImportKind) {
        self.known_urls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string(), kind);
    }

    /// Existing subscriptions are returned untouched.
    fn subscribe(&self, feed: Feed) -> Result<Feed> {
        if let Some(existing) = self.store.get_feed_by_url(&feed.url)? {
            return Ok(existing);
        }
        self.store.upsert_feed(&feed)
    }

    /// `file://` URLs are read from disk, everything else over HTTP.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let parsed = Url::parse(url)?;
        if parsed.scheme() == "file" {
            let path = parsed
                .to_file_path()
                .map_err(|_| TethysError::Io(format!("not a local path: {}", url)))?;
            return Ok(std::fs::read(path)?);
        }

        let response = self
            .client
            .request(HttpRequest::get(url))
            .await
            .map_err(|e| TethysError::network(url, e))?;
        if !response.is_success() {
            return Err(TethysError::network(
                url,
                NetworkError::Http {
                    status: response.status,
                    body: String::from_utf8_lossy(&response.body).into_owned(),
                },
            ));
        }
        Ok(response.body)
    }
}

fn is_opml(content: &str) -> bool {
    content.to_ascii_lowercase().contains("<opml")
}

/// Every `<outline>` carrying an `xmlUrl`, as `(title, url)`.
#[derive(Debug, PartialEq)]
struct Outline {
    title: String,
    url: String,
    tags: Vec<String>,
}

/// Feed outlines; `category` is read as comma-separated tags.
fn parse_opml(content: &str) -> Vec<Outline> {
    elements(content, "outline")
        .filter_map(|tag| {
            let url = extract_attr(tag, "xmlUrl")?;
            let title = extract_attr(tag, "title")
                .or_else(|| extract_attr(tag, "text"))
                .unwrap_or_default();
            let tags = extract_attr(tag, "category")
                .map(|c| c.split(',').map(|t| t.trim().to_string()).collect())
                .unwrap_or_default();
            Some(Outline { title, url, tags })
        })
        .collect()
}

/// Feed URLs advertised by a web page, resolved against the page URL.
fn feeds_in_web_page(page_url: &str, html: &str) -> Vec<String> {
    let base = Url::parse(page_url).ok();
    let mut feeds = Vec::new();

    for tag in elements(html, "link") {
        let is_alternate = extract_attr(tag, "rel")
            .is_some_and(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("alternate")));
        let is_feed = extract_attr(tag, "type")
            .is_some_and(|t| FEED_MIME_TYPES.contains(&t.to_ascii_lowercase().as_str()));
        if !(is_alternate && is_feed) {
            continue;
        }

        let Some(href) = extract_attr(tag, "href") else {
            continue;
        };
        let resolved = match &base {
            Some(base) => base.join(&href).map(String::from).unwrap_or(href),
            None => href,
        };
        if !feeds.contains(&resolved) {
            feeds.push(resolved);
        }
    }

    feeds
}

/// Opening tags named `name`, case-insensitively, without the angle brackets.
fn elements<'a>(content: &'a str, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    let lower = content.to_ascii_lowercase();
    let needle = format!("<{}", name.to_ascii_lowercase());
    let mut cursor = 0;

    std::iter::from_fn(move || loop {
        let start = cursor + lower[cursor..].find(&needle)?;
        let after = start + needle.len();
        let boundary = lower[after..].chars().next();
        cursor = after;
        if !matches!(boundary, Some(c) if c.is_ascii_whitespace() || c == '/' || c == '>') {
            continue;
        }
        let end = after + lower[after..].find('>')?;
        cursor = end + 1;
        return Some(&content[after..end]);
    })
}

/// Extract an attribute value from an element's attribute text.
fn extract_attr(tag: &str, attr: &str) -> Option<String> {
    let lower = tag.to_ascii_lowercase();
    let pattern = attr.to_ascii_lowercase();
    let mut cursor = 0;

    while let Some(pos) = lower[cursor..].find(&pattern) {
        let start = cursor + pos;
        cursor = start + pattern.len();

        let preceded_by_space = start == 0 || lower.as_bytes()[start - 1].is_ascii_whitespace();
        let rest = lower[cursor..].trim_start();
        if !preceded_by_space || !rest.starts_with('=') {
            continue;
        }

        let value_start = tag.len() - rest[1..].trim_start().len();
        let quote = tag[value_start..].chars().next()?;
        let value = if quote == '"' || quote == '\'' {
            let inner = &tag[value_start + 1..];
            &inner[..inner.find(quote)?]
        } else {
            let inner = &tag[value_start..];
            let len = inner
                .find(|c: char| c.is_ascii_whitespace())
                .unwrap_or(inner.len());
            &inner[..len]
        };
        return Some(decode_html_entities(value).to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::FeedRsParser;
    use crate::store::{ArticleQuery, SqliteStore};
    use crate::testing::{rss, ScriptedClient};

    const OPML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<opml version="1.0">
  <head><title>Subscriptions</title></head>
  <body>
    <outline text="Tech">
      <outline type="rss" text="Rust Blog" title="Rust Blog" xmlUrl="https://blog.rust-lang.org/feed.xml"/>
      <outline type="rss" text="This Week in Rust"
               xmlUrl="https://this-week-in-rust.org/atom.xml" />
    </outline>
  </body>
</opml>"#;

    const PAGE: &str = r#"<html><head>
<link rel="stylesheet" href="/style.css">
<link rel="alternate" type="application/rss+xml" title="RSS" href="/feed.xml">
<LINK REL="alternate" TYPE="application/atom+xml" HREF="https://other.example/atom.xml">
</head><body>hello</body></html>"#;

    fn setup() -> (ImportService, Arc<ScriptedClient>, Arc<dyn Store>) {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let client = Arc::new(ScriptedClient::new());
        let parser = Arc::new(FeedRsParser::new());
        let updater = FeedUpdater::new(store.clone(), client.clone(), parser.clone());
        (
            ImportService::new(client.clone(), parser, store.clone(), updater),
            client,
            store,
        )
    }

    #[test]
    fn test_parse_opml_handles_multiline_outlines() {
        let feeds = parse_opml(OPML);
        let pairs: Vec<(&str, &str)> = feeds.iter().map(|o| (o.title.as_str(), o.url.as_str())).collect();
        assert_eq!(
            pairs,
            vec![
                ("Rust Blog", "https://blog.rust-lang.org/feed.xml"),
                ("This Week in Rust", "https://this-week-in-rust.org/atom.xml"),
            ]
        );
    }

    #[test]
    fn test_parse_opml_reads_category_tags() {
        let feeds = parse_opml(r#"<outline text="A" xmlUrl="https://a.example/feed" category="rust, news"/>"#);
        assert_eq!(feeds[0].tags, vec!["rust", "news"]);
    }

    #[test]
    fn test_feeds_in_web_page() {
        assert_eq!(
            feeds_in_web_page("https://example.com/blog/", PAGE),
            vec!["https://example.com/feed.xml", "https://other.example/atom.xml"]
        );
    }

    #[test]
    fn test_extract_attr_requires_whole_name() {
        assert_eq!(extract_attr(r#" type="rss" xmlUrl="x""#, "url"), None);
        assert_eq!(extract_attr(r#" text='a &amp; b'"#, "text").as_deref(), Some("a & b"));
        assert_eq!(extract_attr(" href=/feed", "href").as_deref(), Some("/feed"));
    }

    #[tokio::test]
    async fn test_scan_classifies_content() {
        let (service, client, _store) = setup();
        client.respond_ok("https://a.example/feed", rss("A", &[("One", "https://a.example/1", "1")]));
        client.respond_ok("https://a.example/subs.opml", OPML);
        client.respond_ok("https://a.example/", PAGE);
        client.respond_ok("https://a.example/plain", "<html>nothing here</html>");

        assert_eq!(
            service.scan_for_importable("https://a.example/feed").await,
            Importable::Feed { url: "https://a.example/feed".into(), articles: 1 }
        );
        assert_eq!(
            service.scan_for_importable("https://a.example/subs.opml").await,
            Importable::Opml { url: "https://a.example/subs.opml".into(), feeds: 2 }
        );
        assert_eq!(
            service.scan_for_importable("https://a.example/").await,
            Importable::WebPage {
                url: "https://a.example/".into(),
                feeds: vec!["https://a.example/feed.xml".into(), "https://other.example/atom.xml".into()],
            }
        );
        assert_eq!(
            service.scan_for_importable("https://a.example/plain").await,
            Importable::None("https://a.example/plain".into())
        );
        assert_eq!(
            service.scan_for_importable("https://unreachable.example/").await,
            Importable::None("https://unreachable.example/".into())
        );
    }

    #[tokio::test]
    async fn test_import_unknown_url_fails() {
        let (service, _client, _store) = setup();
        assert_eq!(
            service.import_item("https://never-scanned.example/").await,
            Err(TethysError::Unknown)
        );
    }

    #[tokio::test]
    async fn test_import_feed_subscribes_and_updates() {
        let (service, client, store) = setup();
        let url = "https://a.example/feed";
        client.respond_ok(url, rss("A", &[("One", "https://a.example/1", "1")]));

        service.scan_for_importable(url).await;
        let feeds = service.import_item(url).await.unwrap();

        assert_eq!(feeds.len(), 1);
        assert_eq!(feeds[0].title, "A");
        assert_eq!(store.articles(&ArticleQuery::Feed(feeds[0].id)).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_import_discovered_feed_from_web_page() {
        let (service, client, store) = setup();
        client.respond_ok("https://a.example/", PAGE);
        client.respond_ok("https://a.example/feed.xml", rss("Discovered", &[]));

        service.scan_for_importable("https://a.example/").await;
        let feeds = service.import_item("https://a.example/feed.xml").await.unwrap();

        assert_eq!(feeds[0].title, "Discovered");
        assert!(store.get_feed_by_url("https://a.example/feed.xml").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_import_opml_from_local_file() {
        let (service, _client, store) = setup();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subs.opml");
        std::fs::write(&path, OPML).unwrap();
        let url = Url::from_file_path(&path).unwrap().to_string();

        assert!(matches!(
            service.scan_for_importable(&url).await,
            Importable::Opml { feeds: 2, .. }
        ));
        let feeds = service.import_item(&url).await.unwrap();

        assert_eq!(feeds.len(), 2);
        assert_eq!(feeds[0].title, "Rust Blog");
        assert_eq!(store.all_feeds().unwrap().len(), 2);

        service.import_item(&url).await.unwrap();
        assert_eq!(store.all_feeds().unwrap().len(), 2);
    }
}
