//! Read-state mutations and derived article values.
//!
//! - [`ArticleService`]: capability implemented against local storage
//!   ([`LocalArticleService`]) or a remote account ([`BackendArticleService`])
//! - [`ArticleCoordinator`]: composes the two, coalesces identical in-flight
//!   `mark` calls and caches derived values

pub mod backend;
pub mod coordinator;
pub mod local;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::app::Result;
use crate::domain::{estimate_reading_time, Article};

pub use backend::BackendArticleService;
pub use coordinator::{ArticleCoordinator, MarkState, MarkSubscription};
pub use local::LocalArticleService;

#[async_trait]
pub trait ArticleService: Send + Sync {
    /// Set the article's read state, returning the updated article.
    async fn mark(&self, article: &Article, read: bool) -> Result<Article>;

    async fn remove(&self, article: &Article) -> Result<()>;

    /// Authors joined for display, e.g. `"Ada <ada@example.com>, Grace"`.
    fn authors(&self, article: &Article) -> String {
        article
            .authors
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn date(&self, article: &Article) -> DateTime<Utc> {
        article.effective_date()
    }

    /// Seconds needed to read the article.
    fn estimated_reading_time(&self, article: &Article) -> f64 {
        article
            .estimated_reading_time
            .unwrap_or_else(|| estimate_reading_time(article.reading_text()))
    }
}
