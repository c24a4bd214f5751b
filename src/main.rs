use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tethys::app::AppContext;
use tethys::cli::{commands, Cli, Commands};
use tethys::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;
    let ctx = AppContext::new(config)?;

    match cli.command {
        Commands::Add { url } => {
            commands::add_feed(&ctx, &url).await?;
        }
        Commands::Remove { url } => {
            commands::remove_feed(&ctx, &url).await?;
        }
        Commands::Import { target } => {
            commands::import(&ctx, &target).await?;
        }
        Commands::Update => {
            commands::update_feeds(&ctx).await?;
        }
        Commands::List { items, unsynced } => {
            if items || unsynced {
                commands::list_articles(&ctx, unsynced)?;
            } else {
                commands::list_feeds(&ctx)?;
            }
        }
        Commands::Read { id, unread } => {
            commands::mark_article(&ctx, id, !unread).await?;
        }
        Commands::ReadAll { url } => {
            commands::read_all(&ctx, &url)?;
        }
        Commands::Flag { id, flag, remove } => {
            commands::flag_article(&ctx, id, &flag, !remove)?;
        }
        Commands::Tags => {
            commands::list_tags(&ctx)?;
        }
        Commands::Tag { url, tags } => {
            commands::tag_feed(&ctx, &url, &tags)?;
        }
        Commands::SetUrl { url, new_url } => {
            commands::set_feed_url(&ctx, &url, &new_url)?;
        }
        Commands::Export { path } => {
            commands::export_opml(&ctx, path.as_deref())?;
        }
        Commands::Sync => {
            commands::sync(&ctx).await?;
        }
    }

    // Pushes started by marks finish before exit.
    ctx.sync.wait_idle().await;
    Ok(())
}
