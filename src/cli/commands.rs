use std::path::Path;
use std::sync::Arc;

use url::Url;

use crate::app::{AppContext, DatabaseError, Result, TethysError};
use crate::article::LocalArticleService;
use crate::domain::Feed;
use crate::import::Importable;
use crate::store::ArticleQuery;
use crate::update::UpdateSubscriber;

/// Prints batch progress on one line.
struct ProgressPrinter;

impl UpdateSubscriber for ProgressPrinter {
    fn will_update_feeds(&self) {
        println!("Updating feeds...");
    }

    fn did_update_feeds_progress(&self, current: usize, total: usize) {
        println!("  [{}/{}]", current, total);
    }
}

pub async fn add_feed(ctx: &AppContext, url: &str) -> Result<()> {
    if ctx.store.get_feed_by_url(url)?.is_some() {
        println!("Feed already exists: {}", url);
        return Ok(());
    }

    let feed = ctx.store.upsert_feed(&Feed::new(url))?;
    println!("Added feed: {}", url);

    match ctx.updater.update_feed(&feed).await {
        Ok(updated) => {
            let count = ctx.store.articles(&ArticleQuery::Feed(updated.id))?.len();
            println!("Feed title: {}", updated.display_title());
            println!("Fetched {} articles", count);
        }
        Err(e) => eprintln!("  ! first update failed: {}", e),
    }

    Ok(())
}

fn feed_by_url(ctx: &AppContext, url: &str) -> Result<Feed> {
    ctx.store
        .get_feed_by_url(url)?
        .ok_or(TethysError::Database(DatabaseError::EntryNotFound))
}

pub async fn remove_feed(ctx: &AppContext, url: &str) -> Result<()> {
    let feed = feed_by_url(ctx, url)?;

    ctx.store.delete_feed(feed.id)?;
    println!("Removed feed: {}", url);
    Ok(())
}

/// Import from a URL or a local path. Web pages import every feed they
/// advertise.
pub async fn import(ctx: &AppContext, target: &str) -> Result<()> {
    let path = Path::new(target);
    let url = if path.exists() {
        let absolute = path.canonicalize()?;
        Url::from_file_path(&absolute)
            .map_err(|_| TethysError::Io(format!("not a usable path: {}", absolute.display())))?
            .to_string()
    } else {
        target.to_string()
    };

    let urls = match ctx.importer.scan_for_importable(&url).await {
        Importable::None(url) => {
            println!("Nothing to import at {}", url);
            return Ok(());
        }
        Importable::Feed { url, articles } => {
            println!("Found feed with {} articles", articles);
            vec![url]
        }
        Importable::Opml { url, feeds } => {
            println!("Found {} feeds in OPML file", feeds);
            vec![url]
        }
        Importable::WebPage { feeds, .. } => {
            println!("Found {} feeds on web page", feeds.len());
            feeds
        }
    };

    let mut imported = 0;
    let mut errors = 0;
    for url in urls {
        match ctx.importer.import_item(&url).await {
            Ok(feeds) => {
                for feed in &feeds {
                    println!("  + {}", feed.display_title());
                }
                imported += feeds.len();
            }
            Err(e) => {
                eprintln!("  ! {} - {}", url, e);
                errors += 1;
            }
        }
    }

    println!("\nImport complete: {} feeds, {} errors", imported, errors);
    Ok(())
}

pub async fn update_feeds(ctx: &AppContext) -> Result<()> {
    let feeds = ctx.store.all_feeds()?;

    if feeds.is_empty() {
        println!("No feeds to update");
        return Ok(());
    }

    let printer: Arc<dyn UpdateSubscriber> = Arc::new(ProgressPrinter);
    let updated = ctx.batch.update_feeds(feeds, &[printer]).await?;

    for feed in updated {
        println!("{} ({} unread)", feed.display_title(), ctx.store.unread_count(feed.id)?);
    }
    Ok(())
}

pub fn list_feeds(ctx: &AppContext) -> Result<()> {
    let feeds = ctx.store.all_feeds()?;

    if feeds.is_empty() {
        println!("No feeds");
        return Ok(());
    }

    for feed in feeds {
        println!(
            "{} ({} unread)\n  {}",
            feed.display_title(),
            feed.unread_count,
            feed.url
        );
    }

    Ok(())
}

pub fn list_articles(ctx: &AppContext, unsynced_only: bool) -> Result<()> {
    let query = if unsynced_only {
        ArticleQuery::Unsynced
    } else {
        ArticleQuery::All
    };
    let articles = ctx.store.articles(&query)?;

    if articles.is_empty() {
        println!("No articles");
        return Ok(());
    }

    for article in articles {
        let read_marker = if article.read { " " } else { "●" };
        let date = ctx.articles.date(&article).format("%Y-%m-%d");
        let minutes = (ctx.articles.estimated_reading_time(&article) / 60.0).ceil();
        println!(
            "{} {:>6} {} {} ({} min)",
            read_marker,
            article.id,
            date,
            article.display_title(),
            minutes
        );
    }

    Ok(())
}

pub async fn mark_article(ctx: &AppContext, id: i64, read: bool) -> Result<()> {
    let article = ctx
        .store
        .get_article(id)?
        .ok_or(TethysError::Database(DatabaseError::EntryNotFound))?;

    let marked = ctx.articles.mark(&article, read).finished().await?;
    println!(
        "Marked {} as {}",
        marked.display_title(),
        if marked.read { "read" } else { "unread" }
    );
    Ok(())
}

pub fn flag_article(ctx: &AppContext, id: i64, flag: &str, enabled: bool) -> Result<()> {
    let article = LocalArticleService::new(ctx.store.clone()).set_flag(id, flag, enabled)?;
    println!("{} flags: [{}]", article.display_title(), article.flags.join(", "));
    Ok(())
}

/// Marks the feed read and starts pushing the change.
pub fn read_all(ctx: &AppContext, url: &str) -> Result<()> {
    let feed = feed_by_url(ctx, url)?;
    let changed = ctx.feeds.read_all(feed.id)?;
    println!("Marked {} articles read in {}", changed, feed.display_title());

    if changed > 0 && ctx.sync.is_enabled() {
        ctx.sync.update_all_unsynced_articles();
    }
    Ok(())
}

pub fn list_tags(ctx: &AppContext) -> Result<()> {
    let tags = ctx.feeds.tags()?;
    if tags.is_empty() {
        println!("No tags");
    }
    for tag in tags {
        println!("{}", tag);
    }
    Ok(())
}

pub fn tag_feed(ctx: &AppContext, url: &str, tags: &[String]) -> Result<()> {
    let feed = feed_by_url(ctx, url)?;
    let feed = ctx.feeds.set_tags(feed.id, tags)?;
    println!("{} tags: [{}]", feed.display_title(), feed.tags.join(", "));
    Ok(())
}

pub fn set_feed_url(ctx: &AppContext, url: &str, new_url: &str) -> Result<()> {
    let feed = feed_by_url(ctx, url)?;
    let feed = ctx.feeds.set_url(feed.id, new_url)?;
    println!("Moved {} to {}", url, feed.url);
    Ok(())
}

pub fn export_opml(ctx: &AppContext, path: Option<&Path>) -> Result<()> {
    let opml = ctx.feeds.export_opml()?;
    match path {
        Some(path) => {
            std::fs::write(path, opml)?;
            println!("Exported subscriptions to {}", path.display());
        }
        None => print!("{}", opml),
    }
    Ok(())
}

pub async fn sync(ctx: &AppContext) -> Result<()> {
    if !ctx.sync.is_enabled() {
        println!("No account configured");
        return Ok(());
    }

    ctx.sync.update_all_unsynced_articles();
    ctx.sync.wait_idle().await;

    let remaining = ctx.store.articles(&ArticleQuery::Unsynced)?.len();
    if remaining == 0 {
        println!("Read state synced");
    } else {
        eprintln!("{} articles still unsynced", remaining);
    }
    Ok(())
}
