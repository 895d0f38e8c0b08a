//! Application state management
//!
//! Contains shared state accessible across all handlers.

use crate::compare::CompareSession;
use crate::config::Settings;
use crate::credentials::CredentialStore;
use crate::deploy::Deployer;
use crate::environment::EnvironmentManager;
use crate::versioning::{AuditLogSource, ChangeIngestor, IngestionFilter, VersionStore};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Application state shared across all handlers
pub struct AppState {
    /// Versioned object history
    pub store: Arc<dyn VersionStore>,

    /// Audit log -> version store
    pub ingestor: ChangeIngestor,

    /// Cached passwords, shared with the environment manager
    pub credentials: Arc<CredentialStore>,

    /// Source / target / target2 connections
    pub environments: EnvironmentManager,

    /// Primary and secondary comparison pairs
    pub compare: CompareSession,

    pub deployer: Deployer,

    /// Outcome of the last long-running action
    status: RwLock<String>,

    pub history_default_limit: i64,
}

impl AppState {
    pub fn new(
        store: Arc<dyn VersionStore>,
        audit_log: Arc<dyn AuditLogSource>,
        settings: &Settings,
    ) -> Self {
        let credentials = Arc::new(CredentialStore::new());
        let filter = IngestionFilter::from_config(&settings.ingestion);

        Self {
            ingestor: ChangeIngestor::new(store.clone(), audit_log, filter),
            store,
            environments: EnvironmentManager::new(credentials.clone()),
            credentials,
            compare: CompareSession::new(),
            deployer: Deployer::new(settings.deploy.verify_target_unchanged),
            status: RwLock::new("Ready".to_string()),
            history_default_limit: settings.deploy.history_default_limit,
        }
    }

    pub async fn set_status(&self, message: impl Into<String>) {
        let message = message.into();
        info!("Status: {}", message);
        *self.status.write().await = message;
    }

    pub async fn status(&self) -> String {
        self.status.read().await.clone()
    }

    /// Drop connections and cached credentials
    pub async fn shutdown(&self) {
        self.environments.disconnect_all().await;
        self.credentials.clear().await;
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;

#[cfg(test)]
pub(crate) fn test_state() -> (SharedState, Arc<crate::testing::MemoryVersionStore>, Arc<crate::testing::ScriptedAuditLog>) {
    use crate::testing::{MemoryVersionStore, ScriptedAuditLog};

    let store = Arc::new(MemoryVersionStore::new());
    let log = Arc::new(ScriptedAuditLog::new(Vec::new()));
    let settings = Settings::default();
    let state = Arc::new(AppState::new(store.clone(), log.clone(), &settings));
    (state, store, log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialKey;

    #[tokio::test]
    async fn test_status_and_shutdown() {
        let (state, _, _) = test_state();
        assert_eq!(state.status().await, "Ready");

        state.set_status("Sync complete: 2 new version(s)").await;
        assert_eq!(state.status().await, "Sync complete: 2 new version(s)");

        state
            .credentials
            .remember(CredentialKey::new("h", "d", "u"), "p".into())
            .await;
        state.shutdown().await;
        assert_eq!(state.credentials.len().await, 0);
    }
}
