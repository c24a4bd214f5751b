use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use url::Url;

use crate::app::{DatabaseError, NetworkError, Result, TethysError};
use crate::client::{HttpClient, HttpRequest};
use crate::domain::{Article, Author, Feed};
use crate::html::{clean_title, extract_links};
use crate::parser::{FeedParser, ParsedArticle};
use crate::store::{ArticleQuery, Store};

/// Title given to new articles whose entry carries none.
pub const UNKNOWN_TITLE: &str = "unknown";

/// Fetches, parses and reconciles a single feed.
#[derive(Clone)]
pub struct FeedUpdater {
    store: Arc<dyn Store>,
    client: Arc<dyn HttpClient>,
    parser: Arc<dyn FeedParser>,
}

impl FeedUpdater {
    pub fn new(
        store: Arc<dyn Store>,
        client: Arc<dyn HttpClient>,
        parser: Arc<dyn FeedParser>,
    ) -> Self {
        Self {
            store,
            client,
            parser,
        }
    }

    pub async fn update_feed(&self, feed: &Feed) -> Result<Feed> {
        let mut stored = self
            .store
            .get_feed(feed.id)?
            .ok_or(TethysError::Database(DatabaseError::EntryNotFound))?;

        let body = self.fetch(&stored.url).await?;
        let parsed = self.parser.parse(&body)?;

        let base = parsed
            .link
            .as_deref()
            .and_then(|link| resolve(&stored.url, link))
            .unwrap_or_else(|| stored.url.clone());

        let title = clean_title(&parsed.title);
        if !title.is_empty() {
            stored.title = title;
        }
        if !parsed.summary.trim().is_empty() {
            stored.summary = parsed.summary.trim().to_string();
        }
        stored.last_updated = Some(Utc::now());

        let mut pending: Vec<Article> = Vec::with_capacity(parsed.articles.len());
        for entry in &parsed.articles {
            self.reconcile(&stored, &base, entry, &mut pending)?;
        }

        // Only refresh-owned fields are written; edits made during the fetch survive.
        let saved = self.store.save_refresh(&stored, &pending)?;
        info!(feed = %stored.url, articles = saved.len(), "Feed updated");

        self.discover_related(&base, &saved);

        if stored.image.is_none() {
            if let Some(image_url) = parsed.image_url.as_deref() {
                self.fetch_image(&mut stored, &base, image_url).await;
            }
        }

        Ok(self.store.get_feed(stored.id)?.unwrap_or(stored))
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
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

    /// Merge one parsed entry into `pending`, matching first against entries
    /// already seen in this document, then against storage.
    fn reconcile(
        &self,
        feed: &Feed,
        base: &str,
        entry: &ParsedArticle,
        pending: &mut Vec<Article>,
    ) -> Result<()> {
        let link = entry
            .url
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| resolve(base, l).unwrap_or_else(|| l.to_string()));
        let guid = entry.guid.clone().filter(|g| !g.trim().is_empty());

        if link.is_none() && guid.is_none() {
            debug!(feed = %feed.url, title = %entry.title, "Entry has neither link nor guid");
        }

        let matches = |a: &Article| {
            (link.is_some() && a.link == link) || (guid.is_some() && a.identifier == guid)
        };

        if let Some(existing) = pending.iter_mut().find(|a| matches(a)) {
            apply_entry(existing, entry, link, guid);
            return Ok(());
        }

        let existing = if link.is_some() || guid.is_some() {
            self.store
                .articles(&ArticleQuery::LinkOrIdentifier {
                    feed_id: feed.id,
                    link: link.clone(),
                    identifier: guid.clone(),
                })?
                .into_iter()
                .next()
        } else {
            None
        };

        let mut article = existing.unwrap_or_else(|| {
            let mut article = Article::new(feed.id);
            article.title = UNKNOWN_TITLE.to_string();
            article.published = entry.published.or(entry.updated).unwrap_or_else(Utc::now);
            article
        });

        apply_entry(&mut article, entry, link, guid);
        pending.push(article);
        Ok(())
    }

    /// Relate every saved article to the stored articles its text links to.
    fn discover_related(&self, base: &str, saved: &[Article]) {
        for article in saved {
            let links: Vec<String> = extract_links(article.reading_text())
                .iter()
                .filter_map(|href| resolve(base, href))
                .filter(|href| article.link.as_deref() != Some(href.as_str()))
                .collect::<HashSet<_>>()
                .into_iter()
                .collect();
            if links.is_empty() {
                continue;
            }

            let targets = match self.store.articles(&ArticleQuery::Links(links)) {
                Ok(targets) => targets,
                Err(e) => {
                    warn!(article = article.id, error = %e, "Related article lookup failed");
                    continue;
                }
            };

            for target in targets.iter().filter(|t| t.id != article.id) {
                if let Err(e) = self.store.relate_articles(article.id, target.id) {
                    warn!(article = article.id, related = target.id, error = %e, "Failed to relate articles");
                }
            }
        }
    }

    async fn fetch_image(&self, feed: &mut Feed, base: &str, image_url: &str) {
        let Some(url) = resolve(base, image_url) else {
            warn!(feed = %feed.url, image = image_url, "Unresolvable feed image URL");
            return;
        };

        match self.fetch(&url).await {
            Ok(bytes) if !bytes.is_empty() => {
                if let Err(e) = self.store.set_feed_image(feed.id, &bytes) {
                    warn!(feed = %feed.url, error = %e, "Failed to save feed image");
                }
                feed.image = Some(bytes);
            }
            Ok(_) => debug!(feed = %feed.url, "Feed image is empty"),
            Err(e) => warn!(feed = %feed.url, error = %e, "Feed image fetch failed"),
        }
    }
}

fn apply_entry(
    article: &mut Article,
    entry: &ParsedArticle,
    link: Option<String>,
    guid: Option<String>,
) {
    let title = clean_title(&entry.title);
    if !title.is_empty() {
        article.title = title;
    }
    if link.is_some() {
        article.link = link;
    }
    if guid.is_some() {
        article.identifier = guid;
    }
    if let Some(published) = entry.published {
        article.published = published;
    }
    article.updated = entry.updated;
    article.summary = entry.summary.clone();
    if article.content != entry.content {
        article.content = entry.content.clone();
        article.estimated_reading_time = None;
    }

    let mut authors: Vec<Author> = Vec::with_capacity(entry.authors.len());
    for author in &entry.authors {
        match authors.iter_mut().find(|a| a.name == author.name) {
            Some(seen) if seen.email.is_none() => seen.email = author.email.clone(),
            Some(_) => {}
            None => authors.push(Author::new(author.name.clone(), author.email.clone())),
        }
    }
    if !authors.is_empty() {
        article.authors = authors;
    }
}

/// Resolve `href` against `base`; absolute `href`s stand on their own.
fn resolve(base: &str, href: &str) -> Option<String> {
    match Url::parse(base) {
        Ok(base) => base.join(href).ok().map(String::from),
        Err(_) => Url::parse(href).ok().map(String::from),
    }
}
