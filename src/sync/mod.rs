//! Pushes local read state to the remote account.

pub mod backend;
pub mod timer;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::app::BackendError;
use crate::config::SyncConfig;
use crate::domain::Article;
use crate::store::{ArticleQuery, Store};

pub use backend::{Backend, HttpBackend};
pub use timer::RetryTimer;

/// Background synchronization of read state.
///
/// Both entry points return immediately; failures are logged and retried
/// after the configured delay. Without a backend they do nothing.
pub struct SyncManager {
    inner: Arc<SyncInner>,
}

struct SyncInner {
    store: Arc<dyn Store>,
    backend: Option<Arc<dyn Backend>>,
    retry_delay: Duration,
    timer: RetryTimer,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncManager {
    pub fn new(store: Arc<dyn Store>, backend: Option<Arc<dyn Backend>>, config: &SyncConfig) -> Self {
        Self {
            inner: Arc::new(SyncInner {
                store,
                backend,
                retry_delay: config.retry_delay(),
                timer: RetryTimer::new(),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.backend.is_some()
    }

    pub fn update_all_unsynced_articles(&self) {
        self.inner.update_all_unsynced_articles();
    }

    pub fn update(&self, articles: Vec<Article>) {
        self.inner.update(articles);
    }

    pub fn retry_pending(&self) -> bool {
        self.inner.timer.is_scheduled()
    }

    /// Wait for every push started so far, including ones started while waiting.
    pub async fn wait_idle(&self) {
        loop {
            let handles: Vec<_> = std::mem::take(
                &mut *self
                    .inner
                    .tasks
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner),
            );
            if handles.is_empty() {
                break;
            }
            futures::future::join_all(handles).await;
        }
    }
}

impl SyncInner {
    fn update_all_unsynced_articles(self: &Arc<Self>) {
        if self.backend.is_none() {
            return;
        }

        match self.store.articles(&ArticleQuery::Unsynced) {
            Ok(articles) if articles.is_empty() => debug!("No unsynced articles"),
            Ok(articles) => self.update(articles),
            Err(e) => error!(error = %e, "Failed to load unsynced articles"),
        }
    }

    fn update(self: &Arc<Self>, articles: Vec<Article>) {
        let Some(backend) = self.backend.clone() else {
            return;
        };
        if articles.is_empty() {
            return;
        }

        let pushed: Vec<(i64, bool)> = articles
            .iter()
            .filter(|a| a.id != 0)
            .map(|a| (a.id, a.read))
            .collect();
        let ids: Vec<i64> = pushed.iter().map(|(id, _)| *id).collect();
        if let Err(e) = self.store.mark_unsynced(&ids) {
            error!(error = %e, "Failed to flag articles as unsynced");
        }

        let read_state: HashMap<String, bool> = articles
            .iter()
            .filter_map(|a| a.link.clone().map(|link| (link, a.read)))
            .collect();

        let push = tokio::spawn(async move { backend.mark_read(read_state).await });

        let store = self.store.clone();
        let weak = Arc::downgrade(self);
        let save = tokio::spawn(async move {
            // The acknowledgement depends on the push having finished.
            let result = match push.await {
                Ok(result) => result,
                Err(e) => {
                    error!(error = %e, "Sync push task failed");
                    Err(BackendError::Unknown)
                }
            };

            match result {
                // Rows whose read state changed during the push stay unsynced.
                Ok(()) => match store.mark_synced(&pushed) {
                    Ok(acknowledged) => {
                        info!(pushed = pushed.len(), acknowledged, "Synced read state")
                    }
                    Err(e) => error!(error = %e, "Failed to save sync state"),
                },
                Err(e) => {
                    warn!(count = pushed.len(), error = %e, "Sync failed, scheduling retry");
                    SyncInner::schedule_retry(&weak);
                }
            }
        });

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|h| !h.is_finished());
        tasks.push(save);
    }

    fn schedule_retry(weak: &Weak<Self>) {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        let retry = weak.clone();
        inner.timer.schedule(inner.retry_delay, move || {
            if let Some(inner) = retry.upgrade() {
                inner.update_all_unsynced_articles();
            }
        });
    }
}
