use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Observer of batch feed updates. Callbacks are delivered on the
/// [`MainQueue`](crate::update::MainQueue).
pub trait UpdateSubscriber: Send + Sync {
    fn will_update_feeds(&self) {}

    /// `current` feeds out of `total` have finished, successfully or not.
    fn did_update_feeds_progress(&self, current: usize, total: usize);
}

/// Handle returned by [`SubscriberRegistry::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

#[derive(Default)]
pub struct SubscriberRegistry {
    next_token: AtomicU64,
    subscribers: Mutex<Vec<(SubscriptionToken, Arc<dyn UpdateSubscriber>)>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, subscriber: Arc<dyn UpdateSubscriber>) -> SubscriptionToken {
        let token = SubscriptionToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((token, subscriber));
        token
    }

    /// Returns false if the token was not registered.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|(t, _)| *t != token);
        before != subscribers.len()
    }

    /// Current subscribers in registration order.
    pub fn snapshot(&self) -> Vec<Arc<dyn UpdateSubscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, s)| s.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
