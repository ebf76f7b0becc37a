use crate::articles::ArticleClient;
use crate::collections::Records;
use crate::config::AppConfig;
use crate::errors::AppError;
use crate::notifier::{ChangeBus, Context};
use crate::storage::{SnapshotWriter, load_snapshot, spawn_persister};
use crate::store::MemoryStore;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// One origin: the store, its change bus and the snapshot persister.
pub struct AppState {
    pub config: AppConfig,
    pub bus: Arc<ChangeBus>,
    persister: Option<JoinHandle<()>>,
    writer: Option<SnapshotWriter>,
}

impl AppState {
    /// In-memory origin with no snapshot file.
    pub fn ephemeral(config: AppConfig) -> Self {
        Self {
            config,
            bus: ChangeBus::new(MemoryStore::new().shared()),
            persister: None,
            writer: None,
        }
    }

    /// Loads the snapshot at `config.data_path` and persists every change
    /// back to it. Requires a tokio runtime.
    pub async fn open(config: AppConfig) -> Self {
        let snapshot = load_snapshot(&config.data_path).await;
        info!(
            path = %config.data_path.display(),
            keys = snapshot.len(),
            "store loaded"
        );
        let bus = ChangeBus::new(MemoryStore::from_snapshot(snapshot).shared());
        let writer = SnapshotWriter::new(Arc::clone(bus.store()), config.data_path.clone());
        let persister = spawn_persister(&bus, writer.clone());
        Self {
            config,
            bus,
            persister: Some(persister),
            writer: Some(writer),
        }
    }

    pub fn open_context(&self) -> Context {
        self.bus.open_context()
    }

    pub fn records(&self) -> Records {
        Records::new(self.open_context())
    }

    pub fn article_client(&self) -> ArticleClient {
        ArticleClient::new(&self.config)
    }

    /// Writes the current store to the snapshot file now.
    pub async fn flush(&self) -> Result<(), AppError> {
        match &self.writer {
            Some(writer) => writer.flush().await,
            None => Ok(()),
        }
    }

    /// Stops the persister and writes a final snapshot.
    pub async fn close(mut self) -> Result<(), AppError> {
        if let Some(handle) = self.persister.take() {
            handle.abort();
        }
        match self.writer.take() {
            Some(writer) => writer.flush().await,
            None => Ok(()),
        }
    }
}

impl Drop for AppState {
    fn drop(&mut self) {
        if let Some(handle) = self.persister.take() {
            handle.abort();
        }
        if let Some(writer) = self.writer.take() {
            if let Err(err) = writer.flush_blocking() {
                error!(path = %writer.path().display(), "final snapshot failed: {err}");
            }
        }
    }
}
