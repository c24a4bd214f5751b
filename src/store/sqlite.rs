use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use rusqlite_migration::{Migrations, M};
use tracing::warn;

use crate::app::{DatabaseError, Result, TethysError};
use crate::domain::{Article, Author, Feed};
use crate::store::{ArticleQuery, Store};

const FEED_COLUMNS: &str = "id, url, title, summary, tags, image, last_updated,
    (SELECT COUNT(*) FROM articles a WHERE a.feed_id = feeds.id AND a.read = 0)";

const ARTICLE_COLUMNS: &str = "id, feed_id, title, link, summary, content, identifier,
    published, updated, read, synced, estimated_reading_time, flags";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.conn()?;

        conn.execute("PRAGMA foreign_keys = ON", [])?;
        migrations
            .to_latest(&mut conn)
            .map_err(|e| DatabaseError::Unknown(format!("migration failed: {}", e)))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| TethysError::Database(DatabaseError::Unknown(e.to_string())))
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| s.parse::<DateTime<Utc>>().ok())
    }

    fn feed_from_row(row: &Row<'_>) -> rusqlite::Result<Feed> {
        Ok(Feed {
            id: row.get(0)?,
            url: row.get(1)?,
            title: row.get(2)?,
            summary: row.get(3)?,
            tags: serde_json::from_str(&row.get::<_, String>(4)?).unwrap_or_default(),
            image: row.get(5)?,
            last_updated: row
                .get::<_, Option<String>>(6)?
                .and_then(|s| Self::parse_datetime(&s)),
            unread_count: row.get(7)?,
        })
    }

    fn article_from_row(row: &Row<'_>) -> rusqlite::Result<Article> {
        Ok(Article {
            id: row.get(0)?,
            feed_id: row.get(1)?,
            title: row.get(2)?,
            link: row.get(3)?,
            summary: row.get(4)?,
            content: row.get(5)?,
            identifier: row.get(6)?,
            published: row
                .get::<_, String>(7)
                .ok()
                .and_then(|s| Self::parse_datetime(&s))
                .unwrap_or_else(Utc::now),
            updated: row
                .get::<_, Option<String>>(8)?
                .and_then(|s| Self::parse_datetime(&s)),
            read: row.get(9)?,
            synced: row.get(10)?,
            estimated_reading_time: row.get(11)?,
            flags: serde_json::from_str(&row.get::<_, String>(12)?).unwrap_or_default(),
            authors: Vec::new(),
            related: BTreeSet::new(),
        })
    }

    fn query_feed(conn: &Connection, clause: &str, value: &dyn rusqlite::ToSql) -> Result<Option<Feed>> {
        let sql = format!("SELECT {} FROM feeds WHERE {}", FEED_COLUMNS, clause);
        let feed = conn
            .query_row(&sql, [value], Self::feed_from_row)
            .optional()?;
        Ok(feed)
    }

    /// Fill in authors and related ids, which live in join tables.
    fn load_relations(conn: &Connection, article: &mut Article) -> Result<()> {
        let mut stmt = conn.prepare_cached(
            "SELECT au.name, au.email FROM article_authors aa
             JOIN authors au ON au.id = aa.author_id
             WHERE aa.article_id = ?1 ORDER BY aa.position",
        )?;
        article.authors = stmt
            .query_map(params![article.id], |row| {
                Ok(Author::new(row.get::<_, String>(0)?, row.get(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut stmt = conn
            .prepare_cached("SELECT related_id FROM related_articles WHERE article_id = ?1")?;
        article.related = stmt
            .query_map(params![article.id], |row| row.get::<_, i64>(0))?
            .collect::<std::result::Result<BTreeSet<_>, _>>()?;

        Ok(())
    }

    fn query_articles(
        conn: &Connection,
        clause: &str,
        values: Vec<Box<dyn rusqlite::ToSql>>,
    ) -> Result<Vec<Article>> {
        let sql = format!(
            "SELECT {} FROM articles WHERE {} ORDER BY published DESC, id DESC",
            ARTICLE_COLUMNS, clause
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut articles = stmt
            .query_map(params_from_iter(values.iter()), Self::article_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for article in &mut articles {
            Self::load_relations(conn, article)?;
        }
        Ok(articles)
    }

    fn save_feed(conn: &Connection, feed: &Feed) -> Result<i64> {
        let existing = if feed.id != 0 {
            Self::query_feed(conn, "id = ?1", &feed.id)?
        } else {
            None
        };
        let existing = match existing {
            Some(found) => Some(found),
            None => Self::query_feed(conn, "url = ?1", &feed.url)?,
        };

        let tags = serde_json::to_string(&feed.tags)?;
        let last_updated = feed.last_updated.map(|dt| dt.to_rfc3339());

        match existing {
            Some(found) => {
                conn.execute(
                    "UPDATE feeds SET url = ?1, title = ?2, summary = ?3, tags = ?4, image = ?5,
                     last_updated = ?6 WHERE id = ?7",
                    params![
                        feed.url,
                        feed.title,
                        feed.summary,
                        tags,
                        feed.image,
                        last_updated,
                        found.id
                    ],
                )?;
                Ok(found.id)
            }
            None => {
                conn.execute(
                    "INSERT INTO feeds (url, title, summary, tags, image, last_updated)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![feed.url, feed.title, feed.summary, tags, feed.image, last_updated],
                )?;
                Ok(conn.last_insert_rowid())
            }
        }
    }

    fn save_article(conn: &Connection, article: &Article) -> Result<Article> {
        let flags = serde_json::to_string(&article.flags)?;
        let mut saved = article.clone();

        let updated_rows = if article.id != 0 {
            conn.execute(
                "UPDATE articles SET feed_id = ?1, title = ?2, link = ?3, summary = ?4,
                 content = ?5, identifier = ?6, published = ?7, updated = ?8, read = ?9,
                 synced = ?10, estimated_reading_time = ?11, flags = ?12 WHERE id = ?13",
                params![
                    article.feed_id,
                    article.title,
                    article.link,
                    article.summary,
                    article.content,
                    article.identifier,
                    article.published.to_rfc3339(),
                    article.updated.map(|dt| dt.to_rfc3339()),
                    article.read,
                    article.synced,
                    article.estimated_reading_time,
                    flags,
                    article.id
                ],
            )?
        } else {
            0
        };

        if updated_rows == 0 {
            conn.execute(
                "INSERT INTO articles (feed_id, title, link, summary, content, identifier,
                 published, updated, read, synced, estimated_reading_time, flags)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    article.feed_id,
                    article.title,
                    article.link,
                    article.summary,
                    article.content,
                    article.identifier,
                    article.published.to_rfc3339(),
                    article.updated.map(|dt| dt.to_rfc3339()),
                    article.read,
                    article.synced,
                    article.estimated_reading_time,
                    flags
                ],
            )?;
            saved.id = conn.last_insert_rowid();
        }

        Self::save_article_links(conn, saved.id, article)?;
        Self::load_relations(conn, &mut saved)?;
        Ok(saved)
    }

    /// Refresh an existing article's feed-owned columns, inserting it if it
    /// is new. The returned article is read back so user-owned state is current.
    fn refresh_article(conn: &Connection, article: &Article) -> Result<Article> {
        let updated_rows = if article.id != 0 {
            conn.execute(
                "UPDATE articles SET title = ?1, link = ?2, summary = ?3, content = ?4,
                 identifier = ?5, published = ?6, updated = ?7, estimated_reading_time = ?8
                 WHERE id = ?9",
                params![
                    article.title,
                    article.link,
                    article.summary,
                    article.content,
                    article.identifier,
                    article.published.to_rfc3339(),
                    article.updated.map(|dt| dt.to_rfc3339()),
                    article.estimated_reading_time,
                    article.id
                ],
            )?
        } else {
            0
        };
        if updated_rows == 0 {
            return Self::save_article(conn, article);
        }

        Self::save_article_links(conn, article.id, article)?;
        Self::query_articles(conn, "id = ?1", vec![Box::new(article.id)])?
            .pop()
            .ok_or(TethysError::Database(DatabaseError::EntryNotFound))
    }

    /// Replace authors and add relations for a stored article.
    fn save_article_links(conn: &Connection, id: i64, article: &Article) -> Result<()> {
        conn.execute("DELETE FROM article_authors WHERE article_id = ?1", params![id])?;
        let mut seen = BTreeSet::new();
        for (position, author) in article.authors.iter().enumerate() {
            if !seen.insert(author.name.as_str()) {
                continue;
            }
            if let Err(e) = Self::attach_author(conn, id, author, position) {
                warn!(article = id, author = %author.name, error = %e, "skipping author upsert");
            }
        }

        for related in &article.related {
            if *related != id && *related != 0 {
                Self::insert_relation(conn, id, *related)?;
            }
        }
        Ok(())
    }

    /// `UPDATE` that must hit exactly one row.
    fn update_one(conn: &Connection, sql: &str, values: &[&dyn rusqlite::ToSql]) -> Result<()> {
        if conn.execute(sql, values)? == 0 {
            return Err(DatabaseError::EntryNotFound.into());
        }
        Ok(())
    }

    /// Authors are de-duplicated by name across all articles.
    fn attach_author(conn: &Connection, article_id: i64, author: &Author, position: usize) -> Result<()> {
        conn.execute(
            "INSERT INTO authors (name, email) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET email = COALESCE(excluded.email, authors.email)",
            params![author.name, author.email],
        )?;
        let author_id: i64 = conn.query_row(
            "SELECT id FROM authors WHERE name = ?1",
            params![author.name],
            |row| row.get(0),
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO article_authors (article_id, author_id, position)
             VALUES (?1, ?2, ?3)",
            params![article_id, author_id, position as i64],
        )?;
        Ok(())
    }

    fn insert_relation(conn: &Connection, a: i64, b: i64) -> Result<()> {
        conn.execute(
            "INSERT OR IGNORE INTO related_articles (article_id, related_id) VALUES (?1, ?2)",
            params![a, b],
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO related_articles (article_id, related_id) VALUES (?1, ?2)",
            params![b, a],
        )?;
        Ok(())
    }
}

impl Store for SqliteStore {
    fn get_feed(&self, id: i64) -> Result<Option<Feed>> {
        let conn = self.conn()?;
        Self::query_feed(&conn, "id = ?1", &id)
    }

    fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>> {
        let conn = self.conn()?;
        Self::query_feed(&conn, "url = ?1", &url)
    }

    fn all_feeds(&self) -> Result<Vec<Feed>> {
        let conn = self.conn()?;

        let sql = format!("SELECT {} FROM feeds ORDER BY title, url", FEED_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let feeds = stmt
            .query_map([], Self::feed_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(feeds)
    }

    fn upsert_feed(&self, feed: &Feed) -> Result<Feed> {
        let conn = self.conn()?;
        let id = Self::save_feed(&conn, feed)?;
        Self::query_feed(&conn, "id = ?1", &id)?
            .ok_or(TethysError::Database(DatabaseError::EntryNotFound))
    }

    fn delete_feed(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM feeds WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(DatabaseError::EntryNotFound.into());
        }
        Ok(())
    }

    fn unread_count(&self, feed_id: i64) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM articles WHERE feed_id = ?1 AND read = 0",
            params![feed_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn set_feed_tags(&self, id: i64, tags: &[String]) -> Result<()> {
        let conn = self.conn()?;
        let tags = serde_json::to_string(tags)?;
        Self::update_one(&conn, "UPDATE feeds SET tags = ?1 WHERE id = ?2", &[&tags, &id])
    }

    fn set_feed_url(&self, id: i64, url: &str) -> Result<()> {
        let conn = self.conn()?;
        if let Some(other) = Self::query_feed(&conn, "url = ?1", &url)? {
            if other.id != id {
                return Err(DatabaseError::Duplicate(url.to_string()).into());
            }
        }
        Self::update_one(&conn, "UPDATE feeds SET url = ?1 WHERE id = ?2", &[&url, &id])
    }

    fn set_feed_image(&self, id: i64, image: &[u8]) -> Result<()> {
        let conn = self.conn()?;
        Self::update_one(&conn, "UPDATE feeds SET image = ?1 WHERE id = ?2", &[&image, &id])
    }

    fn mark_feed_read(&self, feed_id: i64) -> Result<usize> {
        let conn = self.conn()?;
        if Self::query_feed(&conn, "id = ?1", &feed_id)?.is_none() {
            return Err(DatabaseError::EntryNotFound.into());
        }
        let changed = conn.execute(
            "UPDATE articles SET read = 1, synced = 0 WHERE feed_id = ?1 AND read = 0",
            params![feed_id],
        )?;
        Ok(changed)
    }

    fn get_article(&self, id: i64) -> Result<Option<Article>> {
        let conn = self.conn()?;
        let mut articles = Self::query_articles(&conn, "id = ?1", vec![Box::new(id)])?;
        Ok(articles.pop())
    }

    fn articles(&self, query: &ArticleQuery) -> Result<Vec<Article>> {
        let conn = self.conn()?;
        match query {
            ArticleQuery::All => Self::query_articles(&conn, "1 = 1", Vec::new()),
            ArticleQuery::Feed(feed_id) => {
                Self::query_articles(&conn, "feed_id = ?1", vec![Box::new(*feed_id)])
            }
            ArticleQuery::Unread => Self::query_articles(&conn, "read = 0", Vec::new()),
            ArticleQuery::Unsynced => Self::query_articles(&conn, "synced = 0", Vec::new()),
            ArticleQuery::Links(links) => {
                if links.is_empty() {
                    return Ok(Vec::new());
                }
                let placeholders = (1..=links.len())
                    .map(|i| format!("?{}", i))
                    .collect::<Vec<_>>()
                    .join(", ");
                let values = links
                    .iter()
                    .map(|l| Box::new(l.clone()) as Box<dyn rusqlite::ToSql>)
                    .collect();
                Self::query_articles(&conn, &format!("link IN ({})", placeholders), values)
            }
            ArticleQuery::LinkOrIdentifier {
                feed_id,
                link,
                identifier,
            } => Self::query_articles(
                &conn,
                "feed_id = ?1 AND ((?2 IS NOT NULL AND link = ?2) OR (?3 IS NOT NULL AND identifier = ?3))",
                vec![
                    Box::new(*feed_id),
                    Box::new(link.clone()),
                    Box::new(identifier.clone()),
                ],
            ),
        }
    }

    fn upsert_article(&self, article: &Article) -> Result<Article> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let saved = Self::save_article(&tx, article)?;
        tx.commit()?;
        Ok(saved)
    }

    fn delete_article(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM articles WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(DatabaseError::EntryNotFound.into());
        }
        Ok(())
    }

    fn set_reading_time(&self, id: i64, seconds: f64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE articles SET estimated_reading_time = ?1 WHERE id = ?2",
            params![seconds, id],
        )?;
        Ok(())
    }

    fn set_read(&self, id: i64, read: bool) -> Result<Article> {
        let conn = self.conn()?;
        Self::update_one(
            &conn,
            "UPDATE articles SET read = ?1, synced = 0 WHERE id = ?2",
            &[&read, &id],
        )?;
        Self::query_articles(&conn, "id = ?1", vec![Box::new(id)])?
            .pop()
            .ok_or(TethysError::Database(DatabaseError::EntryNotFound))
    }

    fn set_flags(&self, id: i64, flags: &[String]) -> Result<()> {
        let conn = self.conn()?;
        let flags = serde_json::to_string(flags)?;
        Self::update_one(&conn, "UPDATE articles SET flags = ?1 WHERE id = ?2", &[&flags, &id])
    }

    fn mark_synced(&self, pushed: &[(i64, bool)]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut acknowledged = 0;
        {
            let mut stmt =
                tx.prepare("UPDATE articles SET synced = 1 WHERE id = ?1 AND read = ?2")?;
            for (id, read) in pushed {
                acknowledged += stmt.execute(params![id, read])?;
            }
        }
        tx.commit()?;
        Ok(acknowledged)
    }

    fn mark_unsynced(&self, ids: &[i64]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare("UPDATE articles SET synced = 0 WHERE id = ?1")?;
            for id in ids {
                stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn relate_articles(&self, a: i64, b: i64) -> Result<()> {
        if a == b {
            return Ok(());
        }
        let conn = self.conn()?;
        Self::insert_relation(&conn, a, b)
    }

    fn unrelate_articles(&self, a: i64, b: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM related_articles
             WHERE (article_id = ?1 AND related_id = ?2) OR (article_id = ?2 AND related_id = ?1)",
            params![a, b],
        )?;
        Ok(())
    }

    fn batch_save(&self, feeds: &[Feed], articles: &[Article]) -> Result<Vec<Article>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        for feed in feeds {
            Self::save_feed(&tx, feed)?;
        }

        let mut saved = Vec::with_capacity(articles.len());
        for article in articles {
            saved.push(Self::save_article(&tx, article)?);
        }

        tx.commit()?;
        Ok(saved)
    }

    fn save_refresh(&self, feed: &Feed, articles: &[Article]) -> Result<Vec<Article>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let last_updated = feed.last_updated.map(|dt| dt.to_rfc3339());
        Self::update_one(
            &tx,
            "UPDATE feeds SET title = ?1, summary = ?2, last_updated = ?3 WHERE id = ?4",
            &[&feed.title, &feed.summary, &last_updated, &feed.id],
        )?;

        let mut saved = Vec::with_capacity(articles.len());
        for article in articles {
            saved.push(Self::refresh_article(&tx, article)?);
        }

        tx.commit()?;
        Ok(saved)
    }
}
