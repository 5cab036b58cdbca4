//! Credential Storage
//!
//! Durable storage of the session (access token, refresh token, user
//! profile) on top of an injected [`SecureStore`], with an in-memory cache
//! so the transport does not hit storage on every request.
//!
//! ## Guarantees
//!
//! - The three entries are written under the cache's write lock; readers
//!   never observe a half-written session.
//! - A session is either complete (both tokens non-empty, user decodes) or
//!   absent. Partial or corrupt entries are removed on load.
//! - Token values are never logged.
//! - Every `save` and `clear` starts a new session generation. Work begun
//!   for one session (a token refresh) can check its generation and must
//!   not write into a later one.
//!
//! ## Example
//!
//! ```no_run
//! use core_auth::{AuthTokens, CredentialStore, Session, StorageKeys, UserProfile};
//! use std::sync::Arc;
//! # use bridge_traits::storage::SecureStore;
//! # async fn example(secure_store: Arc<dyn SecureStore>) -> core_auth::Result<()> {
//! let store = CredentialStore::new(secure_store, StorageKeys::default());
//!
//! let session = Session::new(AuthTokens::new("access", "refresh"), UserProfile::default());
//! store.save(&session).await?;
//!
//! assert!(store.load().await.is_some());
//! store.clear().await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::types::{AuthTokens, Session, StorageKeys, UserProfile};
use bridge_traits::storage::SecureStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
enum Cache {
    /// Storage has not been read since start or the last invalidation.
    Unloaded,
    Loaded(Option<Session>),
}

/// Session persistence with a read-through cache.
pub struct CredentialStore {
    secure_store: Arc<dyn SecureStore>,
    keys: StorageKeys,
    cache: RwLock<Cache>,
    /// Bumped under the cache write lock.
    generation: AtomicU64,
}

impl CredentialStore {
    pub fn new(secure_store: Arc<dyn SecureStore>, keys: StorageKeys) -> Self {
        debug!(
            access_key = %keys.access_token,
            refresh_key = %keys.refresh_token,
            user_key = %keys.user,
            "Initializing CredentialStore"
        );
        Self {
            secure_store,
            keys,
            cache: RwLock::new(Cache::Unloaded),
            generation: AtomicU64::new(0),
        }
    }

    pub fn keys(&self) -> &StorageKeys {
        &self.keys
    }

    /// Identifies the session currently stored. Changes on every `save` and
    /// `clear`, not on token or profile updates.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn next_generation(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Persist a complete session.
    ///
    /// If any of the three writes fails, the entries already written are
    /// removed and the error is returned; the cache is then re-read from
    /// storage on next access.
    pub async fn save(&self, session: &Session) -> Result<()> {
        if !session.tokens.is_complete() {
            return Err(AuthError::InvalidSession(
                "both access and refresh tokens are required".to_string(),
            ));
        }

        let user_json = serde_json::to_vec(&session.user)
            .map_err(|e| AuthError::serialization("user profile", e))?;

        let mut cache = self.cache.write().await;
        self.next_generation();

        let entries: [(&str, &[u8]); 3] = [
            (self.keys.access_token.as_str(), session.tokens.access_token.as_bytes()),
            (self.keys.refresh_token.as_str(), session.tokens.refresh_token.as_bytes()),
            (self.keys.user.as_str(), user_json.as_slice()),
        ];

        let mut written: Vec<&str> = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            if let Err(e) = self.secure_store.set_secret(key, value).await {
                warn!(key = %key, error = %e, "Failed to persist session, rolling back");
                for written_key in written {
                    if let Err(rollback_err) = self.secure_store.delete_secret(written_key).await {
                        warn!(key = %written_key, error = %rollback_err, "Rollback delete failed");
                    }
                }
                *cache = Cache::Unloaded;
                return Err(AuthError::from_storage(e));
            }
            written.push(key);
        }

        *cache = Cache::Loaded(Some(session.clone()));
        info!(user_id = %session.user.display_id(), "Session stored");
        Ok(())
    }

    /// The stored session, if a complete one exists.
    ///
    /// Never fails: storage errors and corrupt payloads are logged and read
    /// as "no session".
    pub async fn load(&self) -> Option<Session> {
        if let Cache::Loaded(session) = &*self.cache.read().await {
            return session.clone();
        }

        let mut cache = self.cache.write().await;
        if let Cache::Loaded(session) = &*cache {
            return session.clone();
        }

        match self.read_storage().await {
            Ok(session) => {
                *cache = Cache::Loaded(session.clone());
                session
            }
            Err(e) => {
                // Left unloaded so the next read retries storage.
                warn!(error = %e, "Secure storage unavailable, treating as signed out");
                None
            }
        }
    }

    /// Alias of [`load`](Self::load) for call sites reading the cached session.
    pub async fn current(&self) -> Option<Session> {
        self.load().await
    }

    pub async fn access_token(&self) -> Option<String> {
        self.load().await.map(|session| session.tokens.access_token)
    }

    pub async fn refresh_token(&self) -> Option<String> {
        self.load().await.map(|session| session.tokens.refresh_token)
    }

    /// Remove the session.
    ///
    /// The cache is emptied before storage is touched, so once this returns
    /// no reader can obtain the old token. Every key is attempted; the first
    /// storage error is returned.
    pub async fn clear(&self) -> Result<()> {
        let mut cache = self.cache.write().await;
        self.clear_locked(&mut cache).await
    }

    /// Clear only if the stored session is still the one of `generation`.
    ///
    /// Returns `Ok(false)` without touching storage when a newer session
    /// (or a sign-out) replaced it.
    pub(crate) async fn clear_for(&self, generation: u64) -> Result<bool> {
        let mut cache = self.cache.write().await;
        if self.generation() != generation {
            debug!("Session replaced, skipping clear");
            return Ok(false);
        }
        self.clear_locked(&mut cache).await.map(|()| true)
    }

    async fn clear_locked(&self, cache: &mut Cache) -> Result<()> {
        *cache = Cache::Loaded(None);
        self.next_generation();

        let mut first_error = None;
        for key in self.keys.all() {
            if let Err(e) = self.secure_store.delete_secret(key).await {
                warn!(key = %key, error = %e, "Failed to delete credential entry");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(AuthError::from_storage(e)),
            None => {
                info!("Session cleared");
                Ok(())
            }
        }
    }

    /// Replace both tokens, keeping the stored profile.
    ///
    /// Fails with [`AuthError::NotAuthenticated`] after `clear()`: tokens
    /// are never written without a session to attach them to.
    pub async fn update_tokens(&self, tokens: &AuthTokens) -> Result<()> {
        let mut cache = self.cache.write().await;
        self.write_tokens(&mut cache, tokens).await
    }

    /// [`update_tokens`](Self::update_tokens) for the session of
    /// `generation` only; a replaced session yields `NotAuthenticated`.
    pub(crate) async fn update_tokens_for(&self, generation: u64, tokens: &AuthTokens) -> Result<()> {
        let mut cache = self.cache.write().await;
        if self.generation() != generation {
            debug!("Session replaced, discarding refreshed tokens");
            return Err(AuthError::NotAuthenticated);
        }
        self.write_tokens(&mut cache, tokens).await
    }

    async fn write_tokens(&self, cache: &mut Cache, tokens: &AuthTokens) -> Result<()> {
        if !tokens.is_complete() {
            return Err(AuthError::InvalidSession(
                "refusing to store an incomplete token pair".to_string(),
            ));
        }
        if matches!(cache, Cache::Loaded(None)) {
            return Err(AuthError::NotAuthenticated);
        }

        let writes = async {
            self.secure_store
                .set_secret(&self.keys.access_token, tokens.access_token.as_bytes())
                .await?;
            self.secure_store
                .set_secret(&self.keys.refresh_token, tokens.refresh_token.as_bytes())
                .await
        };

        if let Err(e) = writes.await {
            warn!(error = %e, "Failed to persist refreshed tokens");
            *cache = Cache::Unloaded;
            return Err(AuthError::from_storage(e));
        }

        match cache {
            Cache::Loaded(Some(session)) => session.tokens = tokens.clone(),
            other => *other = Cache::Unloaded,
        }

        debug!("Tokens updated");
        Ok(())
    }

    /// Replace the stored profile, keeping the tokens.
    pub async fn update_user(&self, user: &UserProfile) -> Result<()> {
        let user_json =
            serde_json::to_vec(user).map_err(|e| AuthError::serialization("user profile", e))?;

        let mut cache = self.cache.write().await;
        if let Err(e) = self.secure_store.set_secret(&self.keys.user, &user_json).await {
            warn!(error = %e, "Failed to persist user profile");
            *cache = Cache::Unloaded;
            return Err(AuthError::from_storage(e));
        }

        match &mut *cache {
            Cache::Loaded(Some(session)) => session.user = user.clone(),
            other => *other = Cache::Unloaded,
        }

        debug!(user_id = %user.display_id(), "User profile updated");
        Ok(())
    }

    /// Force the next read to go to storage.
    ///
    /// Hosts call this when another window or process changed the store.
    pub async fn invalidate_cache(&self) {
        *self.cache.write().await = Cache::Unloaded;
        debug!("Credential cache invalidated");
    }

    /// Storage errors are returned; missing, partial and corrupt sessions
    /// are `Ok(None)`.
    async fn read_storage(&self) -> std::result::Result<Option<Session>, bridge_traits::BridgeError> {
        let access = self.secure_store.get_secret(&self.keys.access_token).await?;
        let refresh = self.secure_store.get_secret(&self.keys.refresh_token).await?;
        let user = self.secure_store.get_secret(&self.keys.user).await?;

        if access.is_none() && refresh.is_none() && user.is_none() {
            debug!("No stored session");
            return Ok(None);
        }

        match decode_session(access, refresh, user) {
            Ok(session) => {
                debug!(user_id = %session.user.display_id(), "Stored session loaded");
                Ok(Some(session))
            }
            Err(reason) => {
                warn!(reason = %reason, "Discarding invalid stored session");
                for key in self.keys.all() {
                    if let Err(e) = self.secure_store.delete_secret(key).await {
                        warn!(key = %key, error = %e, "Failed to delete invalid credential entry");
                    }
                }
                Ok(None)
            }
        }
    }
}

fn decode_session(
    access: Option<Vec<u8>>,
    refresh: Option<Vec<u8>>,
    user: Option<Vec<u8>>,
) -> std::result::Result<Session, String> {
    let token = |bytes: Option<Vec<u8>>, name: &str| -> std::result::Result<String, String> {
        let bytes = bytes.ok_or_else(|| format!("{} missing", name))?;
        let value = String::from_utf8(bytes).map_err(|_| format!("{} is not UTF-8", name))?;
        if value.trim().is_empty() {
            return Err(format!("{} is empty", name));
        }
        Ok(value)
    };

    let access_token = token(access, "access token")?;
    let refresh_token = token(refresh, "refresh token")?;
    let user_bytes = user.ok_or_else(|| "user profile missing".to_string())?;
    let user: UserProfile = serde_json::from_slice(&user_bytes)
        .map_err(|e| format!("user profile does not decode: {}", e))?;

    Ok(Session::new(AuthTokens::new(access_token, refresh_token), user))
}
