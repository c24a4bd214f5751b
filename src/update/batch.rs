use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::app::{Result, TethysError};
use crate::domain::Feed;
use crate::update::{FeedUpdater, MainQueue, SubscriberRegistry, UpdateSubscriber};

struct Progress {
    completed: usize,
    results: Vec<Option<Feed>>,
    done: Option<oneshot::Sender<Vec<Feed>>>,
}

/// Runs [`FeedUpdater`] across many feeds at once and reports progress.
///
/// Every feed is updated on its own task with no concurrency bound. A feed
/// whose update never completes holds back the batch indefinitely.
pub struct BatchUpdater {
    updater: FeedUpdater,
    main_queue: MainQueue,
    subscribers: SubscriberRegistry,
}

impl BatchUpdater {
    pub fn new(updater: FeedUpdater, main_queue: MainQueue) -> Self {
        Self {
            updater,
            main_queue,
            subscribers: SubscriberRegistry::new(),
        }
    }

    /// Long-lived observers notified on every batch.
    pub fn subscribers(&self) -> &SubscriberRegistry {
        &self.subscribers
    }

    /// Update `feeds` concurrently.
    ///
    /// Resolves once every feed has been attempted, with one entry per input
    /// feed: the updated feed, or the original one if its update failed.
    /// An empty input fails with [`TethysError::Unknown`].
    pub async fn update_feeds(
        &self,
        feeds: Vec<Feed>,
        subscribers: &[Arc<dyn UpdateSubscriber>],
    ) -> Result<Vec<Feed>> {
        if feeds.is_empty() {
            return Err(TethysError::Unknown);
        }

        let mut all = self.subscribers.snapshot();
        all.extend(subscribers.iter().cloned());
        let subscribers = Arc::new(all);

        {
            let subscribers = subscribers.clone();
            self.main_queue.dispatch(move || {
                for subscriber in subscribers.iter() {
                    subscriber.will_update_feeds();
                }
            });
        }

        let total = feeds.len();
        let (done_tx, done_rx) = oneshot::channel();
        let progress = Arc::new(Mutex::new(Progress {
            completed: 0,
            results: vec![None; total],
            done: Some(done_tx),
        }));

        for (index, feed) in feeds.into_iter().enumerate() {
            let updater = self.updater.clone();
            let main_queue = self.main_queue.clone();
            let subscribers = subscribers.clone();
            let progress = progress.clone();

            tokio::spawn(async move {
                let result = match updater.update_feed(&feed).await {
                    Ok(updated) => updated,
                    Err(e) => {
                        warn!(feed = %feed.url, error = %e, "Feed update failed");
                        feed
                    }
                };

                // Dispatch under the lock so callbacks reach the queue in
                // counter order and the resolution is always last.
                let mut progress = progress.lock().unwrap_or_else(PoisonError::into_inner);
                progress.results[index] = Some(result);
                progress.completed += 1;
                let current = progress.completed;

                let finished = if current == total {
                    let feeds: Vec<Feed> = progress.results.iter_mut().filter_map(Option::take).collect();
                    progress.done.take().map(|tx| (tx, feeds))
                } else {
                    None
                };

                main_queue.dispatch(move || {
                    for subscriber in subscribers.iter() {
                        subscriber.did_update_feeds_progress(current, total);
                    }
                });
                if let Some((tx, feeds)) = finished {
                    main_queue.dispatch(move || {
                        let _ = tx.send(feeds);
                    });
                }
            });
        }

        let feeds = done_rx.await.map_err(|_| TethysError::Unknown)?;
        debug!(feeds = feeds.len(), "Batch update finished");
        Ok(feeds)
    }
}
