//! Injectable store client with explicit connection state.
//!
//! The orchestrator only sees [`RecordSource`]. Both operations fail closed:
//! a broken or missing store answers `None` / an empty list, never an error.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::sqlite::DirectoryStore;
use crate::types::Record;
use deskline_core::{Error, Result};

/// Read-only view of the record store used by the resolver and advisor.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// First record whose name approximately matches, or None (also on failure).
    async fn find_by_approximate_name(&self, name: &str) -> Option<Record>;

    /// Every known canonical name, or an empty list on failure.
    async fn list_all_names(&self) -> Vec<String>;
}

/// Connection state of a [`StoreClient`].
pub enum StoreState {
    Disconnected,
    Connected(Arc<DirectoryStore>),
}

/// Long-lived handle to the directory store, shared across requests.
///
/// Starts disconnected unless built from an open store; connects lazily on
/// first use and drops back to disconnected after a database failure.
pub struct StoreClient {
    db_dir: Option<PathBuf>,
    state: RwLock<StoreState>,
}

impl StoreClient {
    /// Disconnected client that will open `db_dir` on demand.
    pub fn new(db_dir: impl AsRef<Path>) -> Self {
        Self {
            db_dir: Some(db_dir.as_ref().to_path_buf()),
            state: RwLock::new(StoreState::Disconnected),
        }
    }

    /// Client around an already opened store.
    pub fn from_store(store: DirectoryStore) -> Self {
        let db_dir = store.db_path().parent().map(Path::to_path_buf);
        Self {
            db_dir,
            state: RwLock::new(StoreState::Connected(Arc::new(store))),
        }
    }

    /// Open the store now (blocking). Used at startup.
    pub fn connect(&self) -> Result<Arc<DirectoryStore>> {
        if let Some(store) = self.store() {
            return Ok(store);
        }
        let db_dir = self
            .db_dir
            .as_ref()
            .ok_or_else(|| Error::Storage("no store directory configured".into()))?;
        let store = DirectoryStore::open(db_dir)?;
        Ok(self.install(store))
    }

    pub fn is_connected(&self) -> bool {
        matches!(*self.state.read(), StoreState::Connected(_))
    }

    /// Drop the current connection; the next call reconnects.
    pub fn disconnect(&self) {
        let mut state = self.state.write();
        if matches!(*state, StoreState::Connected(_)) {
            warn!("Directory store marked disconnected");
        }
        *state = StoreState::Disconnected;
    }

    /// Current store handle, if connected.
    pub fn store(&self) -> Option<Arc<DirectoryStore>> {
        match &*self.state.read() {
            StoreState::Connected(store) => Some(store.clone()),
            StoreState::Disconnected => None,
        }
    }

    fn install(&self, store: DirectoryStore) -> Arc<DirectoryStore> {
        let mut state = self.state.write();
        match &*state {
            StoreState::Connected(existing) => existing.clone(),
            StoreState::Disconnected => {
                let store = Arc::new(store);
                info!("Directory store connected: {}", store.db_path().display());
                *state = StoreState::Connected(store.clone());
                store
            }
        }
    }

    async fn handle(&self) -> Option<Arc<DirectoryStore>> {
        if let Some(store) = self.store() {
            return Some(store);
        }
        let db_dir = self.db_dir.clone()?;
        match tokio::task::spawn_blocking(move || DirectoryStore::open(&db_dir)).await {
            Ok(Ok(store)) => Some(self.install(store)),
            Ok(Err(e)) => {
                warn!("Directory store unavailable: {}", e);
                None
            }
            Err(e) => {
                warn!("Directory store connect task failed: {}", e);
                None
            }
        }
    }

    fn note_failure(&self, op: &str, err: &Error) {
        warn!("Directory store {} failed: {}", op, err);
        if matches!(err, Error::Database(_)) {
            self.disconnect();
        }
    }
}

#[async_trait]
impl RecordSource for StoreClient {
    async fn find_by_approximate_name(&self, name: &str) -> Option<Record> {
        let store = self.handle().await?;
        let name = name.to_string();
        match tokio::task::spawn_blocking(move || store.find_by_approximate_name(&name)).await {
            Ok(Ok(found)) => found,
            Ok(Err(e)) => {
                self.note_failure("lookup", &e);
                None
            }
            Err(e) => {
                warn!("Directory lookup task failed: {}", e);
                None
            }
        }
    }

    async fn list_all_names(&self) -> Vec<String> {
        let Some(store) = self.handle().await else {
            return Vec::new();
        };
        match tokio::task::spawn_blocking(move || store.list_all_names()).await {
            Ok(Ok(names)) => names,
            Ok(Err(e)) => {
                self.note_failure("name listing", &e);
                Vec::new()
            }
            Err(e) => {
                warn!("Directory name listing task failed: {}", e);
                Vec::new()
            }
        }
    }
}
