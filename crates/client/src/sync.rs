//! Cross-tab session synchronization.
//!
//! A tab learns about session changes made elsewhere only through storage
//! events. Each relevant event is turned into a fresh read of every session
//! key, so a tab never acts on a half-applied write sequence.

use tracing::{debug, warn};

use crate::credential::{CredentialStore, EXPIRES_AT_KEY, SharedSession, TOKEN_KEY, TOKEN_EXPIRES_AT_KEY};
use crate::storage::{Missed, StorageSubscription};

pub struct CrossTabSync {
    credentials: CredentialStore,
    subscription: StorageSubscription,
    closed: bool,
}

impl CrossTabSync {
    pub fn new(credentials: CredentialStore) -> Self {
        let subscription = credentials.storage().subscribe();
        Self {
            credentials,
            subscription,
            closed: false,
        }
    }

    pub fn read_shared(&self) -> SharedSession {
        self.credentials.shared_session()
    }

    /// Wait for another tab to change a session key, then return the full
    /// session state as it is now. Cancel safe. Pends forever once the
    /// storage area is gone.
    pub async fn next_change(&mut self) -> SharedSession {
        loop {
            if self.closed {
                std::future::pending::<()>().await;
            }
            match self.subscription.recv().await {
                Ok(event) if is_session_key(&event.key) => {
                    debug!(key = %event.key, origin = %event.origin, "session key changed in another tab");
                    return self.read_shared();
                }
                Ok(_) => continue,
                Err(Missed::Lagged(n)) => {
                    warn!(skipped = n, "missed storage events, re-reading session keys");
                    return self.read_shared();
                }
                Err(Missed::Closed) => {
                    self.closed = true;
                }
            }
        }
    }
}

fn is_session_key(key: &str) -> bool {
    matches!(key, TOKEN_KEY | EXPIRES_AT_KEY | TOKEN_EXPIRES_AT_KEY)
}
