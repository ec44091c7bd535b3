//! Wiring of configuration, store, dispatcher and scheduler.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use ticketmail_core::store::{CheckpointStore, MailLog, SyncLog};
use ticketmail_core::sync::{ImapConnector, SystemClock};
use ticketmail_core::{Config, Dispatcher, Scheduler, SqliteStore, SyncEngine};

/// Everything a subcommand needs.
pub struct Desk {
    pub config: Arc<Config>,
    pub store: Arc<SqliteStore>,
    pub dispatcher: Dispatcher,
    pub scheduler: Scheduler,
}

impl Desk {
    /// Loads the configuration, opens the database and builds the services.
    pub async fn open(config_path: Option<&Path>) -> anyhow::Result<Self> {
        let config = Arc::new(load_config(config_path)?);

        if let Some(parent) = config.database_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let database = config.database_path.to_string_lossy();
        let store = Arc::new(
            SqliteStore::new(&database)
                .await
                .with_context(|| format!("failed to open database {database}"))?,
        );
        info!(path = %database, "database opened");

        if !config.smtp.is_configured() {
            warn!("SMTP settings are incomplete, notifications will be skipped");
        }
        let mail_log: Arc<dyn MailLog> = store.clone();
        let dispatcher = Dispatcher::smtp(Arc::clone(&config), mail_log);

        let connector = Arc::new(ImapConnector::new(config.imap.clone(), &config.sync));
        let engine = SyncEngine::new(
            connector,
            store.clone(),
            store.clone(),
            &config.imap,
            &config.sync,
        );
        let checkpoints: Arc<dyn CheckpointStore> = store.clone();
        let sync_log: Arc<dyn SyncLog> = store.clone();
        let scheduler = Scheduler::new(
            Arc::new(engine),
            Some(checkpoints),
            Some(sync_log),
            Arc::new(SystemClock),
            config.sync.clone(),
        );

        Ok(Self {
            config,
            store,
            dispatcher,
            scheduler,
        })
    }
}

fn load_config(explicit: Option<&Path>) -> anyhow::Result<Config> {
    if let Some(path) = explicit {
        return Config::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()));
    }

    let path = Config::default_path();
    if path.exists() {
        Config::load(&path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))
    } else {
        warn!(path = %path.display(), "no configuration file, using defaults");
        Ok(Config::default())
    }
}
