use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::app::{Result, TethysError};
use crate::article::ArticleService;
use crate::domain::{estimate_reading_time, Article};

/// Progress of one coalesced `mark` call.
#[derive(Debug, Clone, Default)]
pub struct MarkState {
    /// Most recent outcome: the local result first, then the final one.
    pub latest: Option<Result<Article>>,
    pub finished: bool,
}

/// Shared handle to an in-flight `mark` call. Clones observe the same call.
#[derive(Clone)]
pub struct MarkSubscription {
    rx: watch::Receiver<MarkState>,
}

impl MarkSubscription {
    pub fn latest(&self) -> Option<Result<Article>> {
        self.rx.borrow().latest.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.rx.borrow().finished
    }

    /// Receiver for observing intermediate results as they are published.
    pub fn watch(&self) -> watch::Receiver<MarkState> {
        self.rx.clone()
    }

    /// Wait for the terminal result.
    pub async fn finished(&self) -> Result<Article> {
        let mut rx = self.rx.clone();
        let state = rx
            .wait_for(|s| s.finished)
            .await
            .map_err(|_| TethysError::Unknown)?;
        state.latest.clone().unwrap_or(Err(TethysError::Unknown))
    }

    fn same_call(&self, other: &MarkSubscription) -> bool {
        self.rx.same_channel(&other.rx)
    }
}

type MarkKey = (i64, bool);

/// Front door for article mutations.
///
/// With both services present, `mark` applies locally first and publishes
/// that result, then applies remotely. If either side fails, the remote
/// outcome is final; when both succeed the local article stands.
pub struct ArticleCoordinator {
    local: Option<Arc<dyn ArticleService>>,
    remote: Option<Arc<dyn ArticleService>>,
    in_flight: Arc<Mutex<HashMap<MarkKey, MarkSubscription>>>,
    authors: Mutex<HashMap<i64, String>>,
    dates: Mutex<HashMap<i64, DateTime<Utc>>>,
    reading_times: Mutex<HashMap<i64, f64>>,
}

impl ArticleCoordinator {
    pub fn new(
        local: Option<Arc<dyn ArticleService>>,
        remote: Option<Arc<dyn ArticleService>>,
    ) -> Self {
        Self {
            local,
            remote,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            authors: Mutex::new(HashMap::new()),
            dates: Mutex::new(HashMap::new()),
            reading_times: Mutex::new(HashMap::new()),
        }
    }

    /// Mark `article` read or unread.
    ///
    /// While a call for the same article and target state is pending, the
    /// same handle is returned instead of starting another one.
    pub fn mark(&self, article: &Article, read: bool) -> MarkSubscription {
        let key = (article.id, read);
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = in_flight.get(&key) {
            if !existing.is_finished() {
                debug!(article = article.id, read, "Joining in-flight mark");
                return existing.clone();
            }
        }

        let (tx, rx) = watch::channel(MarkState::default());
        let subscription = MarkSubscription { rx };
        in_flight.insert(key, subscription.clone());
        drop(in_flight);

        let local = self.local.clone();
        let remote = self.remote.clone();
        let registry = self.in_flight.clone();
        let article = article.clone();
        let own = subscription.clone();

        tokio::spawn(async move {
            let local_result = match &local {
                Some(local) => {
                    let result = local.mark(&article, read).await;
                    tx.send_modify(|s| s.latest = Some(result.clone()));
                    Some(result)
                }
                None => None,
            };

            let outcome = match (&remote, local_result) {
                (Some(remote), local_result) => {
                    let input = match &local_result {
                        Some(Ok(marked)) => marked.clone(),
                        _ => article.clone(),
                    };
                    match remote.mark(&input, read).await {
                        Err(e) => {
                            warn!(article = article.id, error = %e, "Remote mark failed");
                            Err(e)
                        }
                        Ok(remote_marked) => match local_result {
                            Some(Ok(local_marked)) => Ok(local_marked),
                            _ => Ok(remote_marked),
                        },
                    }
                }
                (None, Some(local_result)) => local_result,
                (None, None) => Err(TethysError::NotSupported),
            };

            // Finish and evict together so a caller never joins a finished call.
            let mut in_flight = registry.lock().unwrap_or_else(PoisonError::into_inner);
            tx.send_modify(|s| {
                s.latest = Some(outcome);
                s.finished = true;
            });
            if in_flight.get(&key).is_some_and(|s| s.same_call(&own)) {
                in_flight.remove(&key);
            }
        });

        subscription
    }

    /// Remove locally, then remotely where the remote side supports it.
    pub async fn remove(&self, article: &Article) -> Result<()> {
        if let Some(local) = &self.local {
            local.remove(article).await?;
        }
        if let Some(remote) = &self.remote {
            match remote.remove(article).await {
                Ok(()) | Err(TethysError::NotSupported) => {}
                Err(e) => return Err(e),
            }
        }
        self.forget(article.id);
        Ok(())
    }

    pub fn authors(&self, article: &Article) -> String {
        cached(&self.authors, article.id, || match self.service() {
            Some(service) => service.authors(article),
            None => article
                .authors
                .iter()
                .map(|a| a.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    pub fn date(&self, article: &Article) -> DateTime<Utc> {
        cached(&self.dates, article.id, || match self.service() {
            Some(service) => service.date(article),
            None => article.effective_date(),
        })
    }

    pub fn estimated_reading_time(&self, article: &Article) -> f64 {
        cached(&self.reading_times, article.id, || match self.service() {
            Some(service) => service.estimated_reading_time(article),
            None => estimate_reading_time(article.reading_text()),
        })
    }

    /// Number of `mark` calls still pending.
    pub fn in_flight(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn service(&self) -> Option<&Arc<dyn ArticleService>> {
        self.local.as_ref().or(self.remote.as_ref())
    }

    fn forget(&self, id: i64) {
        self.authors.lock().unwrap_or_else(PoisonError::into_inner).remove(&id);
        self.dates.lock().unwrap_or_else(PoisonError::into_inner).remove(&id);
        self.reading_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }
}

/// Unsaved articles (id 0) share no identity, so they are never cached.
fn cached<V: Clone>(cache: &Mutex<HashMap<i64, V>>, id: i64, compute: impl FnOnce() -> V) -> V {
    if id == 0 {
        return compute();
    }
    if let Some(value) = cache.lock().unwrap_or_else(PoisonError::into_inner).get(&id) {
        return value.clone();
    }
    let value = compute();
    cache
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(id, value.clone());
    value
}
