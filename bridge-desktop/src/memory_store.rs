//! In-process credential storage

use async_trait::async_trait;
use bridge_traits::{error::Result, storage::SecureStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// [`SecureStore`] that keeps secrets in memory only.
///
/// Used by tests and by hosts that must not persist sessions across
/// restarts. Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemorySecureStore {
    secrets: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemorySecureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored secrets.
    pub async fn len(&self) -> usize {
        self.secrets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.secrets.read().await.is_empty()
    }
}

#[async_trait]
impl SecureStore for MemorySecureStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()> {
        self.secrets
            .write()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.secrets.read().await.get(key).cloned())
    }

    async fn delete_secret(&self, key: &str) -> Result<()> {
        self.secrets.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = MemorySecureStore::new();
        let other = store.clone();

        store.set_secret("club_platform_user", b"{}").await.unwrap();
        assert_eq!(
            other.get_secret("club_platform_user").await.unwrap(),
            Some(b"{}".to_vec())
        );

        other.delete_secret("club_platform_user").await.unwrap();
        assert!(store.is_empty().await);
    }
}
