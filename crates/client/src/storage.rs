//! Key/value storage shared by every tab of one browser profile.
//!
//! Writes publish a [`StorageEvent`] on a broadcast channel. Each tab reads
//! through its own [`TabStorage`], and its subscription never yields events the
//! tab wrote itself. Writes that leave a value unchanged publish nothing.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("corrupt storage file {path}: {source}")]
    Corrupt {
        path: String,
        source: serde_json::Error,
    },
}

/// Identifies the tab that performed a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TabId(u64);

impl std::fmt::Display for TabId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tab-{}", self.0)
    }
}

/// A change to one key. `new_value` is `None` when the key was removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    pub new_value: Option<String>,
    pub origin: TabId,
}

struct Inner {
    entries: RwLock<BTreeMap<String, String>>,
    events: broadcast::Sender<StorageEvent>,
    next_tab: AtomicU64,
    persist_to: Option<PathBuf>,
}

/// Profile-wide storage area. Cheap to clone.
#[derive(Clone)]
pub struct SharedStorage {
    inner: Arc<Inner>,
}

impl SharedStorage {
    pub fn in_memory() -> Self {
        Self::with_entries(BTreeMap::new(), None)
    }

    /// Storage backed by a JSON file. Existing contents are loaded; every
    /// write replaces the file.
    pub fn persistent(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = match std::fs::read(&path) {
            Ok(raw) => serde_json::from_slice(&raw).map_err(|source| StorageError::Corrupt {
                path: path.display().to_string(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => {
                return Err(StorageError::Read {
                    path: path.display().to_string(),
                    source,
                });
            }
        };
        Ok(Self::with_entries(entries, Some(path)))
    }

    fn with_entries(entries: BTreeMap<String, String>, persist_to: Option<PathBuf>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                entries: RwLock::new(entries),
                events,
                next_tab: AtomicU64::new(1),
                persist_to,
            }),
        }
    }

    /// Open a new tab on this storage area.
    pub fn open_tab(&self) -> TabStorage {
        let id = TabId(self.inner.next_tab.fetch_add(1, Ordering::Relaxed));
        TabStorage {
            id,
            shared: self.clone(),
        }
    }

    fn get(&self, key: &str) -> Option<String> {
        self.inner
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Apply one write. The lock is held until the file is replaced and the
    /// event is sent, so the file and the event order always match memory. A failed
    /// persist restores the previous value and publishes nothing.
    fn write(&self, origin: TabId, key: &str, value: Option<&str>) -> Result<(), StorageError> {
        let mut entries = self
            .inner
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let previous = match value {
            Some(v) => entries.insert(key.to_string(), v.to_string()),
            None => entries.remove(key),
        };
        if previous.as_deref() == value {
            return Ok(());
        }

        if let Some(path) = &self.inner.persist_to {
            if let Err(e) = persist(path, &entries) {
                match previous {
                    Some(old) => entries.insert(key.to_string(), old),
                    None => entries.remove(key),
                };
                return Err(e);
            }
        }

        // No receivers is fine: no other tab is listening.
        let _ = self.inner.events.send(StorageEvent {
            key: key.to_string(),
            new_value: value.map(str::to_string),
            origin,
        });
        Ok(())
    }
}

fn persist(path: &Path, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
    let write_err = |source| StorageError::Write {
        path: path.display().to_string(),
        source,
    };
    // Serializing a string map cannot fail.
    let encoded = serde_json::to_vec_pretty(entries).unwrap_or_default();
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, encoded).map_err(write_err)?;
    std::fs::rename(&tmp, path).map_err(write_err)
}

/// One tab's view of the shared storage area.
#[derive(Clone)]
pub struct TabStorage {
    id: TabId,
    shared: SharedStorage,
}

impl TabStorage {
    pub fn id(&self) -> TabId {
        self.id
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.shared.get(key)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.shared.write(self.id, key, Some(value))
    }

    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.shared.write(self.id, key, None)
    }

    /// Change notifications written by *other* tabs.
    pub fn subscribe(&self) -> StorageSubscription {
        StorageSubscription {
            own: self.id,
            rx: self.shared.inner.events.subscribe(),
        }
    }
}

/// Receiving side of [`TabStorage::subscribe`].
pub struct StorageSubscription {
    own: TabId,
    rx: broadcast::Receiver<StorageEvent>,
}

/// Why [`StorageSubscription::recv`] returned without an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missed {
    /// Some events were dropped. Re-read the keys you care about.
    Lagged(u64),
    /// The storage area is gone.
    Closed,
}

impl StorageSubscription {
    /// Next foreign event. Cancel safe.
    pub async fn recv(&mut self) -> Result<StorageEvent, Missed> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.origin == self.own => continue,
                Ok(event) => return Ok(event),
                Err(broadcast::error::RecvError::Lagged(n)) => return Err(Missed::Lagged(n)),
                Err(broadcast::error::RecvError::Closed) => return Err(Missed::Closed),
            }
        }
    }
}
