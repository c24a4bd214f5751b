use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::app::{BackendError, Result, TethysError};
use crate::article::ArticleService;
use crate::domain::Article;
use crate::sync::Backend;

/// Article service that talks to the remote account only.
#[derive(Clone)]
pub struct BackendArticleService {
    backend: Arc<dyn Backend>,
}

impl BackendArticleService {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ArticleService for BackendArticleService {
    async fn mark(&self, article: &Article, read: bool) -> Result<Article> {
        // The remote side identifies articles by link.
        let link = article
            .link
            .clone()
            .ok_or(TethysError::Backend(BackendError::Unknown))?;

        self.backend
            .mark_read(HashMap::from([(link, read)]))
            .await?;

        let mut marked = article.clone();
        marked.read = read;
        marked.synced = true;
        Ok(marked)
    }

    async fn remove(&self, _article: &Article) -> Result<()> {
        Err(TethysError::NotSupported)
    }
}
