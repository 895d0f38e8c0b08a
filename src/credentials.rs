//! Credential store
//!
//! Remembers passwords for the lifetime of the process so an environment can
//! be reconnected without asking again. Handed to whatever opens
//! connections; cleared on shutdown.

use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Identity a password belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialKey {
    pub server: String,
    pub database: String,
    pub login: String,
}

impl CredentialKey {
    pub fn new(server: &str, database: &str, login: &str) -> Self {
        Self {
            server: server.to_ascii_lowercase(),
            database: database.to_ascii_lowercase(),
            login: login.to_string(),
        }
    }
}

#[derive(Default)]
pub struct CredentialStore {
    entries: RwLock<HashMap<CredentialKey, String>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a password that just authenticated successfully
    pub async fn remember(&self, key: CredentialKey, password: String) {
        debug!("Caching credentials for {}@{}/{}", key.login, key.server, key.database);
        self.entries.write().await.insert(key, password);
    }

    pub async fn lookup(&self, key: &CredentialKey) -> Option<String> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn forget(&self, key: &CredentialKey) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        let count = entries.len();
        entries.clear();
        debug!("Cleared {} cached credential(s)", count);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_remember_and_lookup() {
        let store = CredentialStore::new();
        store
            .remember(CredentialKey::new("SQL-PROD", "Sales", "deployer"), "s3cret".into())
            .await;

        let key = CredentialKey::new("sql-prod", "sales", "deployer");
        assert_eq!(store.lookup(&key).await.as_deref(), Some("s3cret"));
        assert_eq!(
            store.lookup(&CredentialKey::new("sql-prod", "sales", "other")).await,
            None
        );
    }

    #[tokio::test]
    async fn test_clear() {
        let store = CredentialStore::new();
        store.remember(CredentialKey::new("a", "b", "c"), "p".into()).await;
        store.remember(CredentialKey::new("a", "d", "c"), "p".into()).await;
        assert_eq!(store.len().await, 2);

        assert!(store.forget(&CredentialKey::new("a", "d", "c")).await);
        store.clear().await;
        assert_eq!(store.len().await, 0);
    }

    #[test]
    fn test_forget_missing_key() {
        let store = CredentialStore::new();
        assert!(!tokio_test::block_on(store.forget(&CredentialKey::new("a", "b", "c"))));
    }
}
