//! Document store backing the account and transaction records.
//!
//! A [`Database`] is opened once at startup with [`Database::connect`], handed to the
//! stores that need it, and closed on shutdown with [`Database::close`]. Cloning the
//! handle is cheap and every clone refers to the same collections. After `close`
//! every operation fails with [`StoreError::Closed`].
//!
//! When a snapshot path is configured the collections are loaded from it on connect
//! and written back on close. Nothing is written to disk in between, so a process
//! that dies without a graceful close loses every write made since it connected.

mod collection;

pub use collection::{Collection, Filter};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::config::DatabaseConfig;
use collection::{restore_state, CollectionState, StoredDocument};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database is closed")]
    Closed,
    #[error("duplicate key in {collection}: {field} = {value:?}")]
    DuplicateKey {
        collection: String,
        field: String,
        value: String,
    },
    #[error("failed to encode document for {collection}: {source}")]
    Encode {
        collection: String,
        source: serde_json::Error,
    },
    #[error("failed to decode document from {collection}: {source}")]
    Decode {
        collection: String,
        source: serde_json::Error,
    },
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot is corrupt: {0}")]
    Snapshot(serde_json::Error),
}

#[derive(Debug)]
struct Inner {
    name: String,
    snapshot_path: Option<PathBuf>,
    open: Arc<AtomicBool>,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
}

#[derive(Debug, Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

#[derive(Serialize, Deserialize, Default)]
struct Snapshot {
    collections: BTreeMap<String, Vec<SnapshotDocument>>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotDocument {
    id: String,
    seq: u64,
    doc: Value,
}

impl Database {
    pub fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let snapshot_path = config.snapshot_path.as_ref().map(PathBuf::from);
        let mut collections = HashMap::new();
        if let Some(path) = snapshot_path.as_deref().filter(|p| p.exists()) {
            collections = load_snapshot(path)?;
            tracing::info!(
                database = %config.name,
                path = %path.display(),
                collections = collections.len(),
                "Loaded snapshot"
            );
        }

        let open = Arc::new(AtomicBool::new(true));
        let collections = collections
            .into_iter()
            .map(|(name, state)| {
                let collection = Collection::new(name.clone(), open.clone(), state);
                (name, Arc::new(collection))
            })
            .collect();

        tracing::info!(database = %config.name, "Connected to document store");
        Ok(Self {
            inner: Arc::new(Inner {
                name: config.name.clone(),
                snapshot_path,
                open,
                collections: RwLock::new(collections),
            }),
        })
    }

    /// A throwaway store with no snapshot, for tests and benchmarks.
    pub fn in_memory(name: &str) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.to_string(),
                snapshot_path: None,
                open: Arc::new(AtomicBool::new(true)),
                collections: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the named collection, creating it empty on first use.
    pub fn collection(&self, name: &str) -> Arc<Collection> {
        if let Some(existing) = self.inner.collections.read().get(name) {
            return existing.clone();
        }
        self.inner
            .collections
            .write()
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(Collection::new(
                    name.to_string(),
                    self.inner.open.clone(),
                    CollectionState::default(),
                ))
            })
            .clone()
    }

    pub fn ping(&self) -> Result<(), StoreError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(StoreError::Closed)
        }
    }

    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::Acquire)
    }

    /// Disconnects the store, then writes the snapshot when one is configured.
    /// Writes are refused from the moment the store is marked closed, so every write
    /// that reported success is in the snapshot. Closing an already closed store is a
    /// no-op.
    pub fn close(&self) -> Result<(), StoreError> {
        if self
            .inner
            .open
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }
        tracing::info!(database = %self.inner.name, "Disconnected from document store");
        if let Some(path) = &self.inner.snapshot_path {
            self.write_snapshot(path)?;
            tracing::info!(path = %path.display(), "Wrote snapshot");
        }
        Ok(())
    }

    fn write_snapshot(&self, path: &Path) -> Result<(), StoreError> {
        let mut snapshot = Snapshot::default();
        for (name, collection) in self.inner.collections.read().iter() {
            let docs = collection
                .snapshot()
                .into_iter()
                .map(|(id, stored)| SnapshotDocument {
                    id,
                    seq: stored.seq,
                    doc: stored.doc,
                })
                .collect();
            snapshot.collections.insert(name.clone(), docs);
        }
        let bytes = serde_json::to_vec_pretty(&snapshot).map_err(StoreError::Snapshot)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

fn load_snapshot(path: &Path) -> Result<HashMap<String, CollectionState>, StoreError> {
    let bytes = fs::read(path)?;
    let snapshot: Snapshot = serde_json::from_slice(&bytes).map_err(StoreError::Snapshot)?;
    Ok(snapshot
        .collections
        .into_iter()
        .map(|(name, docs)| {
            let docs = docs
                .into_iter()
                .map(|d| (d.id, StoredDocument { seq: d.seq, doc: d.doc }))
                .collect();
            (name, restore_state(docs))
        })
        .collect())
}
