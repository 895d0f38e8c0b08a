//! Comparison session
//!
//! Three environments are compared as two independent pairs: the primary
//! pair (source, target) and the secondary pair (target, target2).

use crate::compare::reconcile::StatusCounts;
use crate::compare::scanner::ReconciliationScanner;
use crate::environment::connection::{EnvironmentManager, EnvironmentRole};
use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparePair {
    Primary,
    Secondary,
}

impl ComparePair {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "primary" | "source-target" => Some(ComparePair::Primary),
            "secondary" | "target-target2" => Some(ComparePair::Secondary),
            _ => None,
        }
    }

    /// (left, right) roles; deployments go left to right
    pub fn roles(&self) -> (EnvironmentRole, EnvironmentRole) {
        match self {
            ComparePair::Primary => (EnvironmentRole::Source, EnvironmentRole::Target),
            ComparePair::Secondary => (EnvironmentRole::Target, EnvironmentRole::Target2),
        }
    }
}

impl fmt::Display for ComparePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (left, right) = self.roles();
        write!(f, "{} -> {}", left, right)
    }
}

pub struct CompareSession {
    primary: ReconciliationScanner,
    secondary: ReconciliationScanner,
}

impl CompareSession {
    pub fn new() -> Self {
        Self {
            primary: ReconciliationScanner::new("primary"),
            secondary: ReconciliationScanner::new("secondary"),
        }
    }

    pub fn scanner(&self, pair: ComparePair) -> &ReconciliationScanner {
        match pair {
            ComparePair::Primary => &self.primary,
            ComparePair::Secondary => &self.secondary,
        }
    }

    /// Load the pair's catalogs from whichever of its environments are connected
    pub async fn load(
        &self,
        pair: ComparePair,
        environments: &EnvironmentManager,
    ) -> Result<StatusCounts, AppError> {
        let (left, right) = pair.roles();
        let source = environments.get(left).await.map(|env| env.backend.clone());
        let target = environments.get(right).await.map(|env| env.backend.clone());

        if source.is_none() && target.is_none() {
            return Err(AppError::NotConnected(format!(
                "Connect {} or {} before loading",
                left, right
            )));
        }

        self.scanner(pair).load(source, target).await
    }
}

impl Default for CompareSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialStore;
    use crate::environment::connection::managed;
    use crate::testing::ScriptedEnvironment;
    use std::sync::Arc;

    #[test]
    fn test_pair_roles() {
        assert_eq!(
            ComparePair::Secondary.roles(),
            (EnvironmentRole::Target, EnvironmentRole::Target2)
        );
        assert_eq!(ComparePair::parse("source-target"), Some(ComparePair::Primary));
        assert_eq!(ComparePair::Primary.to_string(), "source -> target");
    }

    #[tokio::test]
    async fn test_pairs_are_independent() {
        let environments = EnvironmentManager::new(Arc::new(CredentialStore::new()));
        environments
            .register(managed(
                EnvironmentRole::Source,
                Arc::new(ScriptedEnvironment::new("dev").with("dbo", "a", "x")),
            ))
            .await;
        environments
            .register(managed(
                EnvironmentRole::Target,
                Arc::new(ScriptedEnvironment::new("qa").with("dbo", "a", "x").with("dbo", "b", "y")),
            ))
            .await;
        environments
            .register(managed(
                EnvironmentRole::Target2,
                Arc::new(ScriptedEnvironment::new("prod").with("dbo", "b", "y")),
            ))
            .await;

        let session = CompareSession::new();
        let primary = session.load(ComparePair::Primary, &environments).await.unwrap();
        assert_eq!(primary.target_only, 1);

        let secondary = session.load(ComparePair::Secondary, &environments).await.unwrap();
        assert_eq!(secondary.source_only, 1);

        session.scanner(ComparePair::Secondary).scan().await.unwrap();
        assert_eq!(session.scanner(ComparePair::Secondary).counts().await.identical, 1);
        assert_eq!(session.scanner(ComparePair::Primary).counts().await.identical, 0);
    }

    #[tokio::test]
    async fn test_load_without_environments() {
        let environments = EnvironmentManager::new(Arc::new(CredentialStore::new()));
        let session = CompareSession::new();
        assert!(session.load(ComparePair::Primary, &environments).await.is_err());
    }
}
