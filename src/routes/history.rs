//! Version history route handlers
//!
//! Sync from the audit log, browse recorded versions and diff two of them.

use crate::compare::diff::{line_diff, unified_diff, DiffLine, DiffStats};
use crate::error::{not_found_error, validation_error, ApiResult};
use crate::models::SuccessResponse;
use crate::state::SharedState;
use crate::versioning::model::TrackedObject;
use crate::versioning::{ObjectKey, ObjectVersion, SyncOutcome, VersionSummary};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

const MAX_RECENT_LIMIT: i64 = 1000;

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    /// Only ingest events from this database
    #[validate(length(min = 1, max = 128, message = "Environment must be 1-128 characters"))]
    pub environment: Option<String>,
}

/// Pull new audit-log events into the version store
pub async fn sync(
    State(state): State<SharedState>,
    payload: Option<Json<SyncRequest>>,
) -> ApiResult<Json<SuccessResponse<SyncOutcome>>> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let outcome = match state.ingestor.sync(payload.environment.as_deref()).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!("Sync failed: {}", e);
            state.set_status(format!("Sync failed: {}", e)).await;
            return Err(e);
        }
    };

    let message = outcome.status_message();
    state.set_status(message.clone()).await;

    Ok(Json(SuccessResponse::with_data(message, outcome)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentQuery {
    pub environment: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RecentChangesResponse {
    pub changes: Vec<VersionSummary>,
}

/// Latest recorded changes, newest first
pub async fn recent_changes(
    State(state): State<SharedState>,
    Query(query): Query<RecentQuery>,
) -> ApiResult<Json<SuccessResponse<RecentChangesResponse>>> {
    let limit = query
        .limit
        .unwrap_or(state.history_default_limit)
        .clamp(1, MAX_RECENT_LIMIT);
    let environment = query.environment.as_deref().filter(|e| !e.is_empty());

    let changes: Vec<VersionSummary> = state
        .store
        .recent_changes(environment, limit)
        .await?
        .iter()
        .map(VersionSummary::from)
        .collect();

    Ok(Json(SuccessResponse::with_data(
        format!("{} recent change(s).", changes.len()),
        RecentChangesResponse { changes },
    )))
}

#[derive(Debug, Deserialize)]
pub struct TrackedQuery {
    pub environment: String,
}

#[derive(Debug, Serialize)]
pub struct TrackedObjectsResponse {
    pub objects: Vec<TrackedObject>,
}

/// Objects with at least one recorded version in an environment
pub async fn tracked_objects(
    State(state): State<SharedState>,
    Query(query): Query<TrackedQuery>,
) -> ApiResult<Json<SuccessResponse<TrackedObjectsResponse>>> {
    if query.environment.trim().is_empty() {
        return Err(validation_error("environment is required"));
    }

    let objects = state.store.tracked_objects(&query.environment).await?;

    Ok(Json(SuccessResponse::with_data(
        format!("{} tracked object(s).", objects.len()),
        TrackedObjectsResponse { objects },
    )))
}

/// A version plus its display label and checksum
#[derive(Debug, Serialize)]
pub struct VersionEntry {
    #[serde(flatten)]
    pub version: ObjectVersion,
    pub label: String,
    pub checksum: String,
}

impl From<ObjectVersion> for VersionEntry {
    fn from(version: ObjectVersion) -> Self {
        Self {
            label: version.label(),
            checksum: version.checksum(),
            version,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectHistoryResponse {
    pub object: ObjectKey,
    pub versions: Vec<VersionEntry>,
}

/// Every version of one object, newest first
pub async fn object_history(
    State(state): State<SharedState>,
    Path((environment, schema, name)): Path<(String, String, String)>,
) -> ApiResult<Json<SuccessResponse<ObjectHistoryResponse>>> {
    let key = ObjectKey::new(environment, schema, name);
    let versions: Vec<VersionEntry> = state
        .store
        .history(&key)
        .await?
        .into_iter()
        .map(VersionEntry::from)
        .collect();

    Ok(Json(SuccessResponse::with_data(
        format!("{} version(s) of {}.", versions.len(), key),
        ObjectHistoryResponse {
            object: key,
            versions,
        },
    )))
}

#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: VersionEntry,
}

/// One version including its full definition
pub async fn get_version(
    State(state): State<SharedState>,
    Path(version_id): Path<i64>,
) -> ApiResult<Json<SuccessResponse<VersionResponse>>> {
    let version = state
        .store
        .get(version_id)
        .await?
        .ok_or_else(|| not_found_error(format!("Version {} not found", version_id)))?;

    Ok(Json(SuccessResponse::with_data(
        format!("Version {} retrieved.", version_id),
        VersionResponse {
            version: version.into(),
        },
    )))
}

#[derive(Debug, Deserialize)]
pub struct VersionDiffQuery {
    pub from: i64,
    pub to: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionDiffResponse {
    pub from: VersionSummary,
    pub to: VersionSummary,
    pub lines: Vec<DiffLine>,
    pub stats: DiffStats,
    pub unified: String,
}

/// Line diff between two recorded versions
pub async fn diff_versions(
    State(state): State<SharedState>,
    Query(query): Query<VersionDiffQuery>,
) -> ApiResult<Json<SuccessResponse<VersionDiffResponse>>> {
    let from = state
        .store
        .get(query.from)
        .await?
        .ok_or_else(|| not_found_error(format!("Version {} not found", query.from)))?;
    let to = state
        .store
        .get(query.to)
        .await?
        .ok_or_else(|| not_found_error(format!("Version {} not found", query.to)))?;

    let lines = line_diff(&from.definition, &to.definition);
    let stats = DiffStats::of(&lines);
    let unified = unified_diff(&from.definition, &to.definition, &from.label(), &to.label());

    info!(
        "Diffed versions {} and {}: {} modified, {} inserted, {} deleted",
        query.from, query.to, stats.modified, stats.inserted, stats.deleted
    );

    let message = if stats.is_identical() {
        "Versions are identical.".to_string()
    } else {
        "Versions differ.".to_string()
    };

    Ok(Json(SuccessResponse::with_data(
        message,
        VersionDiffResponse {
            from: VersionSummary::from(&from),
            to: VersionSummary::from(&to),
            lines,
            stats,
            unified,
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::state::test_state;
    use crate::testing::raw_event;

    #[tokio::test]
    async fn test_sync_then_browse_history() {
        let (state, _, log) = test_state();
        log.push(raw_event(10, "Sales", "usp_get_order", "CREATE PROCEDURE dbo.usp_get_order AS SELECT 1"));
        log.push(raw_event(11, "Sales", "usp_get_order", "CREATE PROCEDURE dbo.usp_get_order AS SELECT 2"));

        let Json(synced) = sync(State(state.clone()), None).await.unwrap();
        assert_eq!(synced.data.unwrap().inserted, 2);
        assert_eq!(state.status().await, "Sync complete: 2 new version(s)");

        let Json(history) = object_history(
            State(state.clone()),
            Path(("Sales".to_string(), "dbo".to_string(), "usp_get_order".to_string())),
        )
        .await
        .unwrap();
        let versions = history.data.unwrap().versions;
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].version.version_number, 2);
        assert!(versions[0].label.starts_with("v2 - "));

        let Json(recent) = recent_changes(
            State(state.clone()),
            Query(RecentQuery {
                environment: Some("Sales".to_string()),
                limit: Some(1),
            }),
        )
        .await
        .unwrap();
        assert_eq!(recent.data.unwrap().changes.len(), 1);

        let newer = versions[0].version.version_id;
        let older = versions[1].version.version_id;
        let Json(diff) = diff_versions(State(state), Query(VersionDiffQuery { from: older, to: newer }))
            .await
            .unwrap();
        let diff = diff.data.unwrap();
        assert_eq!(diff.stats.modified, 1);
        assert!(diff.unified.contains("+CREATE PROCEDURE dbo.usp_get_order AS SELECT 2"));
    }

    #[tokio::test]
    async fn test_missing_version_is_not_found() {
        let (state, _, _) = test_state();
        let result = get_version(State(state), Path(999)).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_tracked_objects_requires_environment() {
        let (state, _, _) = test_state();
        let result = tracked_objects(
            State(state),
            Query(TrackedQuery {
                environment: " ".to_string(),
            }),
        )
        .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
