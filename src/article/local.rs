use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::app::{DatabaseError, Result};
use crate::article::ArticleService;
use crate::domain::{estimate_reading_time, Article};
use crate::store::Store;

/// Article service backed by local storage.
#[derive(Clone)]
pub struct LocalArticleService {
    store: Arc<dyn Store>,
}

impl LocalArticleService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Add or remove a free-text flag on the stored article.
    pub fn set_flag(&self, article_id: i64, flag: &str, enabled: bool) -> Result<Article> {
        let mut stored = self
            .store
            .get_article(article_id)?
            .ok_or(DatabaseError::EntryNotFound)?;

        let changed = if enabled {
            stored.add_flag(flag)
        } else {
            stored.remove_flag(flag)
        };
        if changed {
            self.store.set_flags(stored.id, &stored.flags)?;
        }
        Ok(stored)
    }
}

#[async_trait]
impl ArticleService for LocalArticleService {
    async fn mark(&self, article: &Article, read: bool) -> Result<Article> {
        self.store.set_read(article.id, read)
    }

    async fn remove(&self, article: &Article) -> Result<()> {
        self.store.delete_article(article.id)
    }

    /// Computes and persists the estimate the first time it is asked for.
    fn estimated_reading_time(&self, article: &Article) -> f64 {
        if let Some(seconds) = article.estimated_reading_time {
            return seconds;
        }

        let seconds = estimate_reading_time(article.reading_text());
        if article.id != 0 {
            if let Err(e) = self.store.set_reading_time(article.id, seconds) {
                warn!(article = article.id, error = %e, "Failed to cache reading time");
            }
        }
        seconds
    }
}
