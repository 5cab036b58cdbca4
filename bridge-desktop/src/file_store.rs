//! File-backed credential storage
//!
//! Fallback [`SecureStore`] for machines without a usable keychain. Secrets
//! live in a single JSON document in the application data directory.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SecureStore,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const APP_DIR: &str = "club-portal";
const FILE_NAME: &str = "credentials.json";

/// JSON-file [`SecureStore`].
///
/// Every write rewrites the document through a temp file followed by a
/// rename, so a crash never leaves a half-written file behind. On unix the
/// file is created with mode `0600`.
pub struct FileSecureStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSecureStore {
    /// Store under the platform data directory (`~/.local/share/club-portal` on Linux).
    pub fn new() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".local")
                    .join("share")
            })
            .join(APP_DIR);

        Self::with_path(data_dir.join(FILE_NAME))
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_map(&self) -> Result<BTreeMap<String, String>> {
        match fs::read(&self.path).await {
            Ok(raw) => serde_json::from_slice(&raw).map_err(|e| {
                warn!(path = ?self.path, error = %e, "Credential file is corrupt");
                BridgeError::OperationFailed(format!("Corrupt credential file: {}", e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(BridgeError::Io(e)),
        }
    }

    /// Like `read_map`, but a corrupt document reads as empty so it can be
    /// overwritten. I/O errors still propagate: rewriting after a failed read
    /// would drop every other entry.
    async fn read_map_for_update(&self) -> Result<BTreeMap<String, String>> {
        match self.read_map().await {
            Err(BridgeError::OperationFailed(_)) => Ok(BTreeMap::new()),
            other => other,
        }
    }

    async fn write_map(&self, map: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let raw = serde_json::to_vec_pretty(map)
            .map_err(|e| BridgeError::OperationFailed(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&tmp).await?;
        file.write_all(&raw).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp, &self.path).await?;
        debug!(path = ?self.path, entries = map.len(), "Wrote credential file");
        Ok(())
    }
}

impl Default for FileSecureStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecureStore for FileSecureStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_map_for_update().await?;
        map.insert(key.to_string(), STANDARD.encode(value));
        self.write_map(&map).await
    }

    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let _guard = self.lock.lock().await;
        let map = self.read_map().await?;
        match map.get(key) {
            Some(encoded) => STANDARD
                .decode(encoded.as_bytes())
                .map(Some)
                .map_err(|e| BridgeError::OperationFailed(format!("Failed to decode secret: {}", e))),
            None => Ok(None),
        }
    }

    async fn delete_secret(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_map_for_update().await?;
        if map.remove(key).is_some() || !map.is_empty() {
            self.write_map(&map).await?;
        } else if fs::try_exists(&self.path).await.unwrap_or(false) {
            fs::remove_file(&self.path).await?;
        }
        Ok(())
    }
}
