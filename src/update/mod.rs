//! Feed update pipeline: one feed at a time, or many at once with progress.

pub mod batch;
pub mod feed_updater;
pub mod main_queue;
pub mod subscriber;

pub use batch::BatchUpdater;
pub use feed_updater::FeedUpdater;
pub use main_queue::MainQueue;
pub use subscriber::{SubscriberRegistry, SubscriptionToken, UpdateSubscriber};
