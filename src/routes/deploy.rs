//! Deploy and rollback route handlers

use crate::compare::ObjectId;
use crate::deploy::{ApplyOutcome, BatchOutcome, RollbackOutcome};
use crate::error::{validation_error, ApiResult};
use crate::models::SuccessResponse;
use crate::routes::compare::parse_pair;
use crate::routes::environment::parse_role;
use crate::state::SharedState;
use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use tracing::{info, warn};
use validator::Validate;

/// Deploy every selected object of a pair, left to right
pub async fn deploy_selected(
    State(state): State<SharedState>,
    Path(pair): Path<String>,
) -> ApiResult<Json<SuccessResponse<BatchOutcome>>> {
    let pair = parse_pair(&pair)?;
    info!("Deploying selection ({})", pair);

    let batch = match state
        .deployer
        .deploy_selected(state.compare.scanner(pair))
        .await
    {
        Ok(batch) => batch,
        Err(e) => {
            warn!("Deploy ({}) failed: {}", pair, e);
            state.set_status(format!("Deploy failed: {}", e)).await;
            return Err(e);
        }
    };

    let message = batch.status_message();
    state.set_status(message.clone()).await;

    Ok(Json(SuccessResponse::with_data(message, batch)))
}

/// Deploy a single object of a pair
pub async fn deploy_object(
    State(state): State<SharedState>,
    Path((pair, schema, name)): Path<(String, String, String)>,
) -> ApiResult<Json<SuccessResponse<ApplyOutcome>>> {
    let pair = parse_pair(&pair)?;
    let id = ObjectId::new(schema, name);

    let outcome = match state
        .deployer
        .deploy_object(state.compare.scanner(pair), &id)
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!("Deploy of {} failed: {}", id, e);
            state.set_status(format!("Deploy of {} failed: {}", id, e)).await;
            return Err(e);
        }
    };

    let message = if outcome.success {
        format!("Deployed {}", outcome.object)
    } else {
        format!("Deploy of {} failed: {}", outcome.object, outcome.message)
    };
    state.set_status(message.clone()).await;

    Ok(Json(SuccessResponse::with_data(message, outcome)))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RollbackRequest {
    #[validate(range(min = 1, message = "versionId must be positive"))]
    pub version_id: i64,

    /// source, target or target2; defaults to the environment matching the version
    pub role: Option<String>,

    /// Latest version number the caller last saw for this object
    #[validate(range(min = 1, message = "expectedLatest must be positive"))]
    pub expected_latest: Option<i32>,
}

/// Re-apply a recorded version
pub async fn rollback(
    State(state): State<SharedState>,
    Json(payload): Json<RollbackRequest>,
) -> ApiResult<Json<SuccessResponse<RollbackOutcome>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let role = payload.role.as_deref().map(parse_role).transpose()?;

    let outcome = match state
        .deployer
        .rollback(
            state.store.as_ref(),
            &state.environments,
            payload.version_id,
            role,
            payload.expected_latest,
        )
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!("Rollback of version {} failed: {}", payload.version_id, e);
            state.set_status(format!("Rollback failed: {}", e)).await;
            return Err(e);
        }
    };

    let message = outcome.status_message();
    state.set_status(message.clone()).await;

    Ok(Json(SuccessResponse::with_data(message, outcome)))
}
