//! # Tethys
//!
//! Keeps a local store of subscribed feeds and articles up to date, and
//! mirrors read state to a remote account.
//!
//! ## Architecture
//!
//! ```text
//! HttpClient → FeedParser → FeedUpdater → Store
//!                              ↑
//!                         BatchUpdater → subscribers (MainQueue)
//!
//! ArticleCoordinator → local service → Store
//!                    → remote service → Backend
//! SyncManager → Backend (retries on a timer)
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! # Subscribe to a feed
//! tethys add https://blog.rust-lang.org/feed.xml
//!
//! # Import an OPML file or a web page's feeds
//! tethys import subscriptions.opml
//!
//! # Update all feeds
//! tethys update
//!
//! # Mark an article read and push read state
//! tethys read 42
//! tethys sync
//!
//! # Back up subscriptions
//! tethys export subscriptions.opml
//! ```

/// Remote account credentials and the authenticated transport.
///
/// - [`CredentialStore`](account::CredentialStore): persisted credentials
/// - [`AuthenticatedClient`](account::AuthenticatedClient): bearer auth with token refresh
pub mod account;

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together all components.
pub mod app;

/// Article mutations: local, remote, and the coordinator in front of both.
pub mod article;

/// Command-line interface using clap.
pub mod cli;

/// Transport port and its reqwest implementation.
pub mod client;

/// Configuration loaded from `~/.config/tethys/config.toml`.
pub mod config;

/// Core domain models: [`Feed`](domain::Feed), [`Article`](domain::Article),
/// [`Author`](domain::Author), [`Credential`](domain::Credential).
pub mod domain;

/// Subscription edits: tags, URL changes, mark-all-read and OPML export.
pub mod feed;

/// HTML helpers for titles, plain text and link extraction.
pub mod html;

/// Discovering and importing feeds, OPML files and feed-advertising pages.
pub mod import;

/// Feed parsing via feed-rs.
pub mod parser;

/// SQLite persistence layer.
///
/// - [`Store`](store::Store): Trait defining storage operations
/// - [`SqliteStore`](store::SqliteStore): SQLite implementation
pub mod store;

/// Background synchronization of read state with the remote account.
pub mod sync;

/// Single-feed and batch feed updates.
pub mod update;

#[cfg(test)]
mod testing;
