use crate::storage::{StorageError, TabStorage};

pub const TOKEN_KEY: &str = "token";
/// Idle expiry of the session, unix milliseconds.
pub const EXPIRES_AT_KEY: &str = "expiresAt";
/// Expiry of the bearer token itself, unix milliseconds.
pub const TOKEN_EXPIRES_AT_KEY: &str = "tokenExpiresAt";

/// Session keys as currently stored, seen by any tab.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SharedSession {
    pub token_present: bool,
    pub expires_at: Option<u64>,
    pub token_expires_at: Option<u64>,
}

/// Bearer token plus expiry timestamps, kept in profile-wide storage.
///
/// Write order matters to other tabs: the token is stored before `expiresAt`
/// on save, and removed before it on purge, so a tab reacting to an
/// `expiresAt` change always sees a consistent token.
#[derive(Clone)]
pub struct CredentialStore {
    storage: TabStorage,
}

impl CredentialStore {
    pub fn new(storage: TabStorage) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &TabStorage {
        &self.storage
    }

    pub fn token(&self) -> Option<String> {
        self.storage.get(TOKEN_KEY).filter(|t| !t.is_empty())
    }

    pub fn expires_at(&self) -> Option<u64> {
        self.read_millis(EXPIRES_AT_KEY)
    }

    pub fn token_expires_at(&self) -> Option<u64> {
        self.read_millis(TOKEN_EXPIRES_AT_KEY)
    }

    pub fn shared_session(&self) -> SharedSession {
        SharedSession {
            token_present: self.token().is_some(),
            expires_at: self.expires_at(),
            token_expires_at: self.token_expires_at(),
        }
    }

    /// Store a freshly issued token.
    pub fn save(&self, token: &str, token_expires_at: Option<u64>) -> Result<(), StorageError> {
        self.storage.set(TOKEN_KEY, token)?;
        match token_expires_at {
            Some(at) => self.storage.set(TOKEN_EXPIRES_AT_KEY, &at.to_string()),
            None => self.storage.remove(TOKEN_EXPIRES_AT_KEY),
        }
    }

    pub fn set_expires_at(&self, at: u64) -> Result<(), StorageError> {
        self.storage.set(EXPIRES_AT_KEY, &at.to_string())
    }

    /// Remove every session key.
    pub fn purge(&self) -> Result<(), StorageError> {
        self.storage.remove(TOKEN_KEY)?;
        self.storage.remove(TOKEN_EXPIRES_AT_KEY)?;
        self.storage.remove(EXPIRES_AT_KEY)
    }

    fn read_millis(&self, key: &str) -> Option<u64> {
        self.storage.get(key).and_then(|v| v.trim().parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SharedStorage;

    #[test]
    fn save_then_purge() {
        let store = CredentialStore::new(SharedStorage::in_memory().open_tab());
        store.save("tok", Some(5_000)).unwrap();
        store.set_expires_at(9_000).unwrap();
        assert_eq!(
            store.shared_session(),
            SharedSession {
                token_present: true,
                expires_at: Some(9_000),
                token_expires_at: Some(5_000),
            }
        );

        store.purge().unwrap();
        assert_eq!(store.shared_session(), SharedSession::default());
        assert_eq!(store.token(), None);
    }

    #[test]
    fn garbage_timestamps_read_as_absent() {
        let tab = SharedStorage::in_memory().open_tab();
        tab.set(EXPIRES_AT_KEY, "soon").unwrap();
        assert_eq!(CredentialStore::new(tab).expires_at(), None);
    }

    #[tokio::test]
    async fn other_tabs_see_token_before_expiry() {
        let shared = SharedStorage::in_memory();
        let writer = CredentialStore::new(shared.open_tab());
        let reader = shared.open_tab();
        let mut sub = reader.subscribe();

        writer.save("tok", None).unwrap();
        writer.set_expires_at(1).unwrap();

        assert_eq!(sub.recv().await.unwrap().key, TOKEN_KEY);
        assert_eq!(sub.recv().await.unwrap().key, EXPIRES_AT_KEY);
    }
}
