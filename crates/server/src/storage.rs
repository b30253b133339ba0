//! File-backed client collection.
//!
//! Reads go straight to disk on every call so each request sees the latest
//! state. Writes are serialized through one async mutex and land with a
//! write-to-temp + rename, so a concurrent reader observes either the old or
//! the new file, never a torn one. Readers do not take the lock; a read that
//! starts before a write commits sees the pre-write collection.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use democrm_api::{Record, ServiceError};

/// On-disk layout: `{"clients": [...]}`. Unknown top-level keys are carried
/// through writes untouched.
#[derive(Debug, Default, Serialize, Deserialize)]
struct DataFile {
    #[serde(default)]
    clients: Vec<Record>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

/// Shared handle to the collection.
#[derive(Clone)]
pub struct ClientStore {
    path: Arc<PathBuf>,
    writer: Arc<Mutex<()>>,
}

impl ClientStore {
    /// Open the store at `path`, creating an empty collection when the file
    /// does not exist yet.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            write_atomic(&path, &DataFile::default()).await?;
            tracing::info!("created empty client store at {}", path.display());
        }
        Ok(Self {
            path: Arc::new(path),
            writer: Arc::new(Mutex::new(())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current collection, in stored order.
    pub async fn load(&self) -> Result<Vec<Record>> {
        Ok(read_file(&self.path).await?.clients)
    }

    /// Apply `apply` to the collection under the writer lock and persist the
    /// result. Nothing is written when `apply` fails.
    pub async fn mutate<T, F>(&self, apply: F) -> Result<T, ServiceError>
    where
        F: FnOnce(&mut Vec<Record>) -> Result<T, ServiceError>,
    {
        let _guard = self.writer.lock().await;
        let mut data = read_file(&self.path)
            .await
            .map_err(log_internal("load clients"))?;
        let out = apply(&mut data.clients)?;
        write_atomic(&self.path, &data)
            .await
            .map_err(log_internal("persist clients"))?;
        Ok(out)
    }
}

async fn read_file(path: &Path) -> Result<DataFile> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("parsing {}", path.display()))
}

async fn write_atomic(path: &Path, data: &DataFile) -> Result<()> {
    let encoded = serde_json::to_vec_pretty(data).context("encoding client store")?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, encoded)
        .await
        .with_context(|| format!("writing {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("replacing {}", path.display()))
}

fn log_internal(context: &'static str) -> impl FnOnce(anyhow::Error) -> ServiceError {
    move |e| {
        tracing::error!("{context}: {e:#}");
        ServiceError::Internal(context.to_string())
    }
}
