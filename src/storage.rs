use crate::errors::AppError;
use crate::notifier::ChangeBus;
use crate::store::{KeyValueStore, SharedStore};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::{env, path::Path, path::PathBuf};
use tokio::fs;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

pub type Snapshot = BTreeMap<String, String>;

pub fn resolve_data_path() -> PathBuf {
    if let Ok(path) = env::var("APP_DATA_PATH") {
        return PathBuf::from(path);
    }

    PathBuf::from("data/state.json")
}

/// Missing or unreadable snapshots start an empty store.
pub async fn load_snapshot(path: &Path) -> Snapshot {
    match fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(data) => data,
            Err(err) => {
                error!("failed to parse snapshot file: {err}");
                Snapshot::default()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
        Err(err) => {
            error!("failed to read snapshot file: {err}");
            Snapshot::default()
        }
    }
}

/// Writes through a sibling temp file and a rename, so readers never see a
/// half-written snapshot.
pub fn persist_snapshot(path: &Path, data: &Snapshot) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let payload = serde_json::to_vec_pretty(data)?;
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    let staging = PathBuf::from(staging);
    std::fs::write(&staging, payload)?;
    std::fs::rename(&staging, path)?;
    Ok(())
}

/// Flushes the live store to one snapshot file.
///
/// The store is read while the write lock is held, so a later flush always
/// writes a state at least as new as an earlier one.
#[derive(Clone)]
pub struct SnapshotWriter {
    path: PathBuf,
    store: SharedStore,
    lock: Arc<Mutex<()>>,
}

impl SnapshotWriter {
    pub fn new(store: SharedStore, path: PathBuf) -> Self {
        Self {
            path,
            store,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Synchronous flush, usable from `Drop`.
    pub fn flush_blocking(&self) -> Result<(), AppError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let data = self.store.snapshot();
        persist_snapshot(&self.path, &data)?;
        debug!(path = %self.path.display(), keys = data.len(), "snapshot flushed");
        Ok(())
    }

    pub async fn flush(&self) -> Result<(), AppError> {
        let writer = self.clone();
        tokio::task::spawn_blocking(move || writer.flush_blocking())
            .await
            .map_err(AppError::internal)?
    }
}

/// Flushes the whole store after change notifications. Events that queue up
/// while a flush is running are folded into the next one.
pub fn spawn_persister(bus: &Arc<ChangeBus>, writer: SnapshotWriter) -> JoinHandle<()> {
    let mut receiver = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
            loop {
                match receiver.try_recv() {
                    Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                    Err(_) => break,
                }
            }
            if let Err(err) = writer.flush().await {
                error!("failed to persist snapshot: {err}");
            }
        }
        info!("persister stopped");
    })
}
