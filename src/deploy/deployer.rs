//! Deployment and rollback
//!
//! Deploy copies an object's current definition from the left environment of
//! a comparison pair to the right one. Rollback re-applies a recorded
//! version. Both go through the idempotent transform and run as a single
//! batch with no retry.

use crate::compare::normalize::definition_fingerprint;
use crate::compare::reconcile::{ObjectId, ReconciledObject};
use crate::compare::scanner::ReconciliationScanner;
use crate::deploy::transform::prepare_for_idempotent_apply;
use crate::environment::catalog::{definition_or_sentinel, EnvironmentBackend};
use crate::environment::connection::{EnvironmentManager, EnvironmentRole};
use crate::error::AppError;
use crate::versioning::model::VersionSummary;
use crate::versioning::store::VersionStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of applying one definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyOutcome {
    pub object: String,
    pub success: bool,
    pub message: String,
}

impl ApplyOutcome {
    fn ok(object: &str, message: impl Into<String>) -> Self {
        Self {
            object: object.to_string(),
            success: true,
            message: message.into(),
        }
    }

    fn failed(object: &str, message: impl Into<String>) -> Self {
        Self {
            object: object.to_string(),
            success: false,
            message: message.into(),
        }
    }
}

/// Tally of a batch deploy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<ApplyOutcome>,
}

impl BatchOutcome {
    fn push(&mut self, outcome: ApplyOutcome) {
        if outcome.success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.results.push(outcome);
    }

    pub fn status_message(&self) -> String {
        if self.failed == 0 {
            format!("Deployed {} object(s)", self.succeeded)
        } else {
            format!(
                "Deployed {} object(s), {} failed",
                self.succeeded, self.failed
            )
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackOutcome {
    pub version: VersionSummary,
    pub role: EnvironmentRole,
    pub database: String,
    pub outcome: ApplyOutcome,
}

impl RollbackOutcome {
    pub fn status_message(&self) -> String {
        if self.outcome.success {
            format!(
                "Successfully rolled back {}.{} to v{} on {}",
                self.version.schema, self.version.object_name, self.version.version_number, self.database
            )
        } else {
            format!("Rollback failed: {}", self.outcome.message)
        }
    }
}

/// Transform a definition and execute it against `backend`
pub async fn apply(backend: &dyn EnvironmentBackend, definition: &str) -> Result<(), AppError> {
    let script = prepare_for_idempotent_apply(definition);
    debug!("Applying {} byte(s) to {}", script.len(), backend.name());
    backend.execute_batch(&script).await
}

pub struct Deployer {
    /// Re-check the target against the last scan before applying
    verify_target: bool,
}

impl Deployer {
    pub fn new(verify_target: bool) -> Self {
        Self { verify_target }
    }

    async fn deploy_one(
        &self,
        source: &dyn EnvironmentBackend,
        target: &dyn EnvironmentBackend,
        object: &ReconciledObject,
    ) -> ApplyOutcome {
        let name = object.qualified_name();

        if !object.in_source {
            return ApplyOutcome::failed(&name, format!("{} does not exist in {}", name, source.name()));
        }

        let definition = match source.fetch_definition(&object.schema, &object.name).await {
            Ok(Some(definition)) => definition,
            Ok(None) => {
                return ApplyOutcome::failed(&name, format!("Definition of {} is not available", name))
            }
            Err(e) => return ApplyOutcome::failed(&name, e.to_string()),
        };

        if self.verify_target {
            if let Some(scanned) = &object.target_definition {
                match definition_or_sentinel(target, &object.schema, &object.name).await {
                    Ok(current) if definition_fingerprint(&current) != definition_fingerprint(scanned) => {
                        warn!("{} changed on {} since the last scan", name, target.name());
                        return ApplyOutcome::failed(&name, "Target changed since last scan; rescan before deploying");
                    }
                    Ok(_) => {}
                    Err(e) => return ApplyOutcome::failed(&name, e.to_string()),
                }
            }
        }

        match apply(target, &definition).await {
            Ok(()) => {
                info!("Deployed {} to {}", name, target.name());
                ApplyOutcome::ok(&name, format!("Deployed to {}", target.name()))
            }
            Err(e) => {
                warn!("Deploy of {} to {} failed: {}", name, target.name(), e);
                ApplyOutcome::failed(&name, e.to_string())
            }
        }
    }

    async fn pair_backends(
        scanner: &ReconciliationScanner,
    ) -> Result<(Arc<dyn EnvironmentBackend>, Arc<dyn EnvironmentBackend>), AppError> {
        match scanner.backends().await {
            (Some(source), Some(target)) => Ok((source, target)),
            _ => Err(AppError::NotConnected(
                "Both environments of the pair must be loaded before deploying".to_string(),
            )),
        }
    }

    /// Deploy one object and reload the pair's catalog
    pub async fn deploy_object(
        &self,
        scanner: &ReconciliationScanner,
        id: &ObjectId,
    ) -> Result<ApplyOutcome, AppError> {
        let (source, target) = Self::pair_backends(scanner).await?;
        let object = scanner
            .get(id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("Object {} not found", id)))?;

        let outcome = self.deploy_one(source.as_ref(), target.as_ref(), &object).await;
        if outcome.success {
            scanner.set_selected(std::slice::from_ref(id), false).await;
            self.reload_after_deploy(scanner).await;
        }
        Ok(outcome)
    }

    /// Deploy every selected object, continuing past failures
    pub async fn deploy_selected(&self, scanner: &ReconciliationScanner) -> Result<BatchOutcome, AppError> {
        let (source, target) = Self::pair_backends(scanner).await?;
        let selected = scanner.selected().await;
        if selected.is_empty() {
            return Err(AppError::BadRequest("No objects selected".to_string()));
        }

        info!(
            "Deploying {} object(s) from {} to {}",
            selected.len(),
            source.name(),
            target.name()
        );

        let mut batch = BatchOutcome::default();
        for object in &selected {
            let outcome = self.deploy_one(source.as_ref(), target.as_ref(), object).await;
            if outcome.success {
                scanner.set_selected(&[object.id()], false).await;
            }
            batch.push(outcome);
        }

        self.reload_after_deploy(scanner).await;
        info!("{}", batch.status_message());
        Ok(batch)
    }

    async fn reload_after_deploy(&self, scanner: &ReconciliationScanner) {
        if let Err(e) = scanner.reload().await {
            warn!("Catalog reload after deploy failed: {}", e);
        }
    }

    /// Re-apply a recorded version.
    ///
    /// With `expected_latest`, the store's newest version number for the
    /// object must still match it. Without `role`, the environment whose
    /// database name matches the version is used.
    pub async fn rollback(
        &self,
        store: &dyn VersionStore,
        environments: &EnvironmentManager,
        version_id: i64,
        role: Option<EnvironmentRole>,
        expected_latest: Option<i32>,
    ) -> Result<RollbackOutcome, AppError> {
        let version = store
            .get(version_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Version {} not found", version_id)))?;

        if let Some(expected) = expected_latest {
            let latest = store.latest_version_number(&version.key()).await?;
            if latest != Some(expected) {
                return Err(AppError::Conflict(format!(
                    "{}.{} is now at v{}, expected v{}",
                    version.schema,
                    version.object_name,
                    latest.unwrap_or(0),
                    expected
                )));
            }
        }

        let environment = match role {
            Some(role) => environments.get(role).await.ok_or_else(|| {
                AppError::NotConnected(format!("No {} environment connected", role))
            })?,
            None => environments
                .find_by_database(&version.environment)
                .await
                .ok_or_else(|| {
                    AppError::NotConnected(format!(
                        "No connected environment for database {}",
                        version.environment
                    ))
                })?,
        };

        let name = format!("{}.{}", version.schema, version.object_name);
        let outcome = match apply(environment.backend.as_ref(), &version.definition).await {
            Ok(()) => {
                info!(
                    "Rolled back {} to v{} on {}",
                    name, version.version_number, environment.database
                );
                ApplyOutcome::ok(&name, format!("Rolled back to v{}", version.version_number))
            }
            Err(e) => {
                warn!("Rollback of {} failed: {}", name, e);
                ApplyOutcome::failed(&name, e.to_string())
            }
        };

        Ok(RollbackOutcome {
            version: VersionSummary::from(&version),
            role: environment.role,
            database: environment.database.clone(),
            outcome,
        })
    }
}
