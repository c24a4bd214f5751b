pub mod article;
pub mod author;
pub mod credential;
pub mod feed;

pub use article::{estimate_reading_time, Article};
pub use author::Author;
pub use credential::{AccountType, Credential};
pub use feed::Feed;
