use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::account::{AuthenticatedClient, CredentialStore, FileCredentialStore, MemoryCredentialStore};
use crate::app::error::{Result, TethysError};
use crate::article::{ArticleCoordinator, ArticleService, BackendArticleService, LocalArticleService};
use crate::client::reqwest_client::ReqwestClient;
use crate::client::HttpClient;
use crate::config::Config;
use crate::feed::FeedService;
use crate::import::ImportService;
use crate::parser::{FeedParser, FeedRsParser};
use crate::store::{SqliteStore, Store};
use crate::sync::{Backend, HttpBackend, SyncManager};
use crate::update::{BatchUpdater, FeedUpdater, MainQueue};

/// Every service, wired once. Must be built inside a tokio runtime.
pub struct AppContext {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub client: Arc<dyn HttpClient>,
    pub updater: FeedUpdater,
    pub batch: BatchUpdater,
    pub articles: ArticleCoordinator,
    pub sync: SyncManager,
    pub importer: ImportService,
    pub feeds: FeedService,
}

impl AppContext {
    pub fn new(config: Config) -> Result<Self> {
        let db_path = match &config.storage.database_path {
            Some(p) => p.clone(),
            None => Self::data_dir()?.join("tethys.db"),
        };
        let credentials_path = match &config.storage.credentials_path {
            Some(p) => p.clone(),
            None => Self::data_dir()?.join("credentials.json"),
        };

        let store: Arc<dyn Store> = Arc::new(SqliteStore::new(&db_path)?);
        let credentials: Arc<dyn CredentialStore> = Arc::new(FileCredentialStore::new(credentials_path));
        Ok(Self::build(config, store, credentials))
    }

    /// In-memory store and credentials; used by tests and dry runs.
    pub fn in_memory(config: Config) -> Result<Self> {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory()?);
        let credentials: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::new());
        Ok(Self::build(config, store, credentials))
    }

    fn build(config: Config, store: Arc<dyn Store>, credentials: Arc<dyn CredentialStore>) -> Self {
        let client: Arc<dyn HttpClient> = Arc::new(ReqwestClient::with_options(
            config.http.timeout(),
            &config.http.user_agent,
        ));
        let parser: Arc<dyn FeedParser> = Arc::new(FeedRsParser::new());

        let backend: Option<Arc<dyn Backend>> = config.account.as_ref().map(|account| {
            debug!(account = %account.account_id, "Remote account configured");
            let authenticated: Arc<dyn HttpClient> = Arc::new(AuthenticatedClient::new(
                client.clone(),
                credentials,
                account.clone(),
            ));
            Arc::new(HttpBackend::new(authenticated, &account.api_base)) as Arc<dyn Backend>
        });

        let updater = FeedUpdater::new(store.clone(), client.clone(), parser.clone());
        let batch = BatchUpdater::new(updater.clone(), MainQueue::spawn());

        let local: Arc<dyn ArticleService> = Arc::new(LocalArticleService::new(store.clone()));
        let remote = backend
            .clone()
            .map(|b| Arc::new(BackendArticleService::new(b)) as Arc<dyn ArticleService>);
        let articles = ArticleCoordinator::new(Some(local), remote);

        let sync = SyncManager::new(store.clone(), backend, &config.sync);
        let importer = ImportService::new(client.clone(), parser, store.clone(), updater.clone());
        let feeds = FeedService::new(store.clone());

        Self {
            config,
            store,
            client,
            updater,
            batch,
            articles,
            sync,
            importer,
            feeds,
        }
    }

    fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| TethysError::Config("Could not find data directory".into()))?;
        let tethys_dir = data_dir.join("tethys");
        std::fs::create_dir_all(&tethys_dir)?;
        Ok(tethys_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AccountConfig;
    use crate::domain::Feed;

    #[tokio::test]
    async fn test_without_account_sync_is_disabled() {
        let ctx = AppContext::in_memory(Config::default()).unwrap();
        assert!(!ctx.sync.is_enabled());
        assert!(ctx.store.all_feeds().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_account_enables_sync() {
        let mut config = Config::default();
        config.account = Some(AccountConfig {
            account_id: "me".into(),
            api_base: "https://api.example.com".into(),
            token_url: "https://api.example.com/token".into(),
            client_id: "id".into(),
            client_secret: "secret".into(),
        });
        let ctx = AppContext::in_memory(config).unwrap();
        assert!(ctx.sync.is_enabled());
    }

    #[tokio::test]
    async fn test_configured_paths_are_used() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.database_path = Some(dir.path().join("feeds.db"));
        config.storage.credentials_path = Some(dir.path().join("credentials.json"));

        let ctx = AppContext::new(config).unwrap();
        ctx.store.upsert_feed(&Feed::new("https://example.com/feed.xml")).unwrap();

        assert!(dir.path().join("feeds.db").exists());
    }
}
