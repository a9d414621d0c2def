use std::{
    collections::HashMap,
    fs,
    path::PathBuf,
    sync::{Arc, RwLock},
};

use thiserror::Error;
use tokio::sync::broadcast;

use questlink_core::{
    error::AuthError,
    keys,
    types::{IdentityProfile, ProviderTokenSet, SessionToken},
};

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StorageError> for AuthError {
    fn from(value: StorageError) -> Self {
        AuthError::Storage(value.to_string())
    }
}

/// Raw key/value persistence behind the token store facade.
pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// In-memory backend, used in tests and embedded hosts without persistence.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .entries
            .read()
            .expect("storage read lock poisoned")
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .write()
            .expect("storage write lock poisoned")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries
            .write()
            .expect("storage write lock poisoned")
            .remove(key);
        Ok(())
    }
}

/// Filesystem-backed storage with an in-memory cache. One file per key under
/// the base directory, mirroring the key's slash-separated namespace.
pub struct FileStorage {
    base_dir: PathBuf,
    cache: RwLock<HashMap<String, String>>,
}

impl FileStorage {
    pub fn new(base_dir: PathBuf) -> Result<Self, StorageError> {
        fs::create_dir_all(&base_dir)?;
        Ok(Self {
            base_dir,
            cache: RwLock::new(HashMap::new()),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base_dir.join(key)
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        if let Some(value) = self
            .cache
            .read()
            .expect("cache read lock poisoned")
            .get(key)
            .cloned()
        {
            return Ok(Some(value));
        }

        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => {
                self.cache
                    .write()
                    .expect("cache write lock poisoned")
                    .insert(key.to_string(), value.clone());
                Ok(Some(value))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StorageError::from(err)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        {
            let mut cache = self.cache.write().expect("cache write lock poisoned");
            cache.insert(key.to_string(), value.to_string());
        }

        let fs_path = self.path_for(key);
        if let Some(parent) = fs_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(fs_path, value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.cache
            .write()
            .expect("cache write lock poisoned")
            .remove(key);

        match fs::remove_file(self.path_for(key)) {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageError::from(err)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Set,
    Removed,
}

/// Emitted on every mutation that goes through the facade, so observers in
/// this context and in sibling contexts sharing the backend see the change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
    pub key: String,
    pub op: StoreOp,
}

/// Facade over client storage. All auth state flows through here; raw keys
/// are never touched by the rest of the crate. Mutations emit [`StoreEvent`]s.
///
/// The provider token set and the application session token are cleared by
/// separate operations so one lifecycle cannot take the other down with it.
#[derive(Clone)]
pub struct TokenStore {
    backend: Arc<dyn KeyValueStorage>,
    events: broadcast::Sender<StoreEvent>,
}

impl TokenStore {
    pub fn new(backend: Arc<dyn KeyValueStorage>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { backend, events }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// Observe mutations made through this facade (and its clones).
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AuthError> {
        self.backend.set(key, value)?;
        self.emit(key, StoreOp::Set);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), AuthError> {
        self.backend.remove(key)?;
        self.emit(key, StoreOp::Removed);
        Ok(())
    }

    fn take(&self, key: &str) -> Result<Option<String>, AuthError> {
        let value = self.backend.get(key)?;
        if value.is_some() {
            self.remove(key)?;
        }
        Ok(value)
    }

    fn emit(&self, key: &str, op: StoreOp) {
        let _ = self.events.send(StoreEvent {
            key: key.to_string(),
            op,
        });
    }

    // Provider token set: assembled from its three keys.

    pub fn provider_tokens(&self) -> Result<Option<ProviderTokenSet>, AuthError> {
        let access_token = match self.backend.get(keys::PROVIDER_ACCESS_TOKEN)? {
            Some(value) => value,
            None => return Ok(None),
        };
        let refresh_token = self.backend.get(keys::PROVIDER_REFRESH_TOKEN)?;
        let expires_at = self
            .backend
            .get(keys::PROVIDER_EXPIRES_AT)?
            .and_then(|raw| raw.parse::<u64>().ok())
            .unwrap_or_default();

        Ok(Some(ProviderTokenSet {
            access_token,
            refresh_token,
            expires_at,
        }))
    }

    /// The refresh token may outlive the access-token record; silent refresh
    /// after the access token is gone reads it directly.
    pub fn provider_refresh_token(&self) -> Result<Option<String>, AuthError> {
        Ok(self.backend.get(keys::PROVIDER_REFRESH_TOKEN)?)
    }

    pub fn set_provider_tokens(&self, tokens: &ProviderTokenSet) -> Result<(), AuthError> {
        self.set(keys::PROVIDER_ACCESS_TOKEN, &tokens.access_token)?;
        self.set(keys::PROVIDER_EXPIRES_AT, &tokens.expires_at.to_string())?;
        match &tokens.refresh_token {
            Some(refresh) => self.set(keys::PROVIDER_REFRESH_TOKEN, refresh)?,
            None => self.remove(keys::PROVIDER_REFRESH_TOKEN)?,
        }
        Ok(())
    }

    /// Drops the provider token set and the cached profile. The application
    /// session token is not reachable from here.
    pub fn clear_provider_tokens(&self) -> Result<(), AuthError> {
        self.remove(keys::PROVIDER_ACCESS_TOKEN)?;
        self.remove(keys::PROVIDER_REFRESH_TOKEN)?;
        self.remove(keys::PROVIDER_EXPIRES_AT)?;
        self.remove(keys::IDENTITY_PROFILE)?;
        Ok(())
    }

    // Identity profile.

    pub fn identity_profile(&self) -> Result<Option<IdentityProfile>, AuthError> {
        match self.backend.get(keys::IDENTITY_PROFILE)? {
            Some(raw) => {
                let profile = serde_json::from_str(&raw).map_err(StorageError::from)?;
                Ok(Some(profile))
            }
            None => Ok(None),
        }
    }

    pub fn set_identity_profile(&self, profile: &IdentityProfile) -> Result<(), AuthError> {
        let raw = serde_json::to_string(profile).map_err(StorageError::from)?;
        self.set(keys::IDENTITY_PROFILE, &raw)
    }

    // Application session token.

    pub fn session_token(&self) -> Result<Option<SessionToken>, AuthError> {
        Ok(self
            .backend
            .get(keys::SESSION_TOKEN)?
            .map(SessionToken::new))
    }

    pub fn set_session_token(&self, token: &SessionToken) -> Result<(), AuthError> {
        self.set(keys::SESSION_TOKEN, token.as_str())
    }

    pub fn clear_session_token(&self) -> Result<(), AuthError> {
        self.remove(keys::SESSION_TOKEN)
    }

    // Flow-scoped keys.

    pub fn stash_flow(&self, verifier: &str, csrf_state: &str) -> Result<(), AuthError> {
        self.set(keys::FLOW_VERIFIER, verifier)?;
        self.set(keys::FLOW_STATE, csrf_state)
    }

    /// One-time read: the verifier is removed as soon as it is read.
    pub fn take_flow_verifier(&self) -> Result<Option<String>, AuthError> {
        self.take(keys::FLOW_VERIFIER)
    }

    /// One-time read of the stored CSRF state.
    pub fn take_flow_state(&self) -> Result<Option<String>, AuthError> {
        self.take(keys::FLOW_STATE)
    }

    pub fn set_return_path(&self, path: &str) -> Result<(), AuthError> {
        self.set(keys::FLOW_RETURN_PATH, path)
    }

    pub fn take_return_path(&self) -> Result<Option<String>, AuthError> {
        self.take(keys::FLOW_RETURN_PATH)
    }

    pub fn set_host_marker(&self, marker: &str) -> Result<(), AuthError> {
        self.set(keys::HOST_MARKER, marker)
    }

    pub fn host_marker(&self) -> Result<Option<String>, AuthError> {
        Ok(self.backend.get(keys::HOST_MARKER)?)
    }
}
