pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tethys")]
#[command(about = "Feed synchronization: fetch, reconcile and sync read state", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Subscribe to a feed and fetch it once
    Add {
        /// URL of the feed to add
        url: String,
    },
    /// Remove a feed and its articles
    Remove {
        /// URL of the feed to remove
        url: String,
    },
    /// Import a feed, an OPML file, or the feeds a web page advertises
    Import {
        /// URL or local path
        target: String,
    },
    /// Update all feeds
    Update,
    /// List feeds or articles
    List {
        /// Show articles instead of feeds
        #[arg(long)]
        items: bool,
        /// Show only articles whose read state has not been synced
        #[arg(long, conflicts_with = "items")]
        unsynced: bool,
    },
    /// Mark an article read
    Read {
        /// Article id as shown by `list --items`
        id: i64,
        /// Mark unread instead
        #[arg(long)]
        unread: bool,
    },
    /// Mark every article of a feed read
    ReadAll {
        /// URL of the feed
        url: String,
    },
    /// Set or clear a flag on an article
    Flag {
        /// Article id as shown by `list --items`
        id: i64,
        /// Flag name, e.g. `starred`
        flag: String,
        /// Clear the flag instead
        #[arg(long)]
        remove: bool,
    },
    /// List tags in use
    Tags,
    /// Replace a feed's tags
    Tag {
        /// URL of the feed
        url: String,
        /// New tags; none clears them
        tags: Vec<String>,
    },
    /// Move a feed to a new URL, keeping its articles
    SetUrl {
        /// Current URL of the feed
        url: String,
        /// Replacement URL
        new_url: String,
    },
    /// Export subscriptions as OPML
    Export {
        /// Output file; stdout when omitted
        path: Option<PathBuf>,
    },
    /// Push unsynced read state to the remote account
    Sync,
}
