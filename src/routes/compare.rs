//! Comparison route handlers
//!
//! Every route is scoped to a pair: `primary` (source -> target) or
//! `secondary` (target -> target2).

use crate::compare::reconcile::StatusCounts;
use crate::compare::scanner::{ObjectComparison, ObjectListing};
use crate::compare::{ComparePair, ObjectId, ScanProgress, ScanSummary};
use crate::error::{validation_error, ApiResult, AppError};
use crate::models::SuccessResponse;
use crate::state::SharedState;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use validator::Validate;

pub(crate) fn parse_pair(raw: &str) -> Result<ComparePair, AppError> {
    ComparePair::parse(raw).ok_or_else(|| {
        AppError::BadRequest(format!(
            "Unknown comparison pair '{}'. Use primary or secondary",
            raw
        ))
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountsResponse {
    pub pair: ComparePair,
    pub counts: StatusCounts,
}

/// Load (or reload) both catalogs of a pair
pub async fn load(
    State(state): State<SharedState>,
    Path(pair): Path<String>,
) -> ApiResult<Json<SuccessResponse<CountsResponse>>> {
    let pair = parse_pair(&pair)?;

    let counts = match state.compare.load(pair, &state.environments).await {
        Ok(counts) => counts,
        Err(e) => {
            warn!("Loading {} failed: {}", pair, e);
            state.set_status(format!("Load failed ({}): {}", pair, e)).await;
            return Err(e);
        }
    };

    let message = format!(
        "Loaded {}: {} object(s), {} source only, {} target only",
        pair, counts.total, counts.source_only, counts.target_only
    );
    state.set_status(message.clone()).await;

    Ok(Json(SuccessResponse::with_data(
        message,
        CountsResponse { pair, counts },
    )))
}

/// Deep-compare every object present on both sides
pub async fn scan(
    State(state): State<SharedState>,
    Path(pair): Path<String>,
) -> ApiResult<Json<SuccessResponse<ScanSummary>>> {
    let pair = parse_pair(&pair)?;
    let summary = match state.compare.scanner(pair).scan().await {
        Ok(summary) => summary,
        Err(e) => {
            warn!("Scan of {} failed: {}", pair, e);
            state.set_status(format!("Scan failed ({}): {}", pair, e)).await;
            return Err(e);
        }
    };

    let message = summary.status_message();
    state.set_status(message.clone()).await;

    Ok(Json(SuccessResponse::with_data(message, summary)))
}

/// Current position of a running (or the last) scan
pub async fn progress(
    State(state): State<SharedState>,
    Path(pair): Path<String>,
) -> ApiResult<Json<SuccessResponse<ScanProgress>>> {
    let pair = parse_pair(&pair)?;
    let progress = state.compare.scanner(pair).progress();

    let message = if progress.running {
        format!("Comparing {} of {}", progress.current, progress.total)
    } else {
        "No scan running".to_string()
    };

    Ok(Json(SuccessResponse::with_data(message, progress)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub differences_only: bool,
}

/// Filtered object list
pub async fn list_objects(
    State(state): State<SharedState>,
    Path(pair): Path<String>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<SuccessResponse<ObjectListing>>> {
    let pair = parse_pair(&pair)?;
    let listing = state
        .compare
        .scanner(pair)
        .list(&query.q, query.differences_only)
        .await;

    Ok(Json(SuccessResponse::with_data(listing.label.clone(), listing)))
}

/// Both definitions of one object with their aligned diff
pub async fn compare_object(
    State(state): State<SharedState>,
    Path((pair, schema, name)): Path<(String, String, String)>,
) -> ApiResult<Json<SuccessResponse<ObjectComparison>>> {
    let pair = parse_pair(&pair)?;
    let id = ObjectId::new(schema, name);
    debug!("Comparing {} ({})", id, pair);

    let comparison = state.compare.scanner(pair).compare_object(&id).await?;

    Ok(Json(SuccessResponse::with_data(
        format!("{}: {:?}", id, comparison.object.status),
        comparison,
    )))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SelectionAction {
    Select,
    Deselect,
    SelectVisible,
    Clear,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SelectionRequest {
    pub action: SelectionAction,
    #[serde(default)]
    #[validate(length(max = 10000, message = "Too many objects in one request"))]
    pub objects: Vec<ObjectId>,
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub differences_only: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionResponse {
    /// Objects the action touched
    pub affected: usize,
    pub selected: usize,
}

/// Change the deploy selection of a pair
pub async fn update_selection(
    State(state): State<SharedState>,
    Path(pair): Path<String>,
    Json(payload): Json<SelectionRequest>,
) -> ApiResult<Json<SuccessResponse<SelectionResponse>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let pair = parse_pair(&pair)?;
    let scanner = state.compare.scanner(pair);

    let affected = match payload.action {
        SelectionAction::Select => scanner.set_selected(&payload.objects, true).await,
        SelectionAction::Deselect => scanner.set_selected(&payload.objects, false).await,
        SelectionAction::SelectVisible => {
            scanner
                .select_visible(&payload.q, payload.differences_only)
                .await
        }
        SelectionAction::Clear => {
            let before = scanner.selected_count().await;
            scanner.clear_selection().await;
            before
        }
    };
    let selected = scanner.selected_count().await;

    Ok(Json(SuccessResponse::with_data(
        format!("{} object(s) selected.", selected),
        SelectionResponse { affected, selected },
    )))
}
