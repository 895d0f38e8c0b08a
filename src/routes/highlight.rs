//! Syntax highlighting route handler

use crate::error::{validation_error, ApiResult};
use crate::highlight::{tokenize, HighlightedSegment};
use crate::models::SuccessResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct HighlightRequest {
    #[validate(length(max = 2000000, message = "Text is too large to highlight"))]
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct HighlightResponse {
    pub segments: Vec<HighlightedSegment>,
}

/// Tokenize T-SQL text into typed segments
pub async fn highlight(
    Json(payload): Json<HighlightRequest>,
) -> ApiResult<Json<SuccessResponse<HighlightResponse>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let segments = tokenize(&payload.text);

    Ok(Json(SuccessResponse::with_data(
        format!("{} segment(s).", segments.len()),
        HighlightResponse { segments },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::highlight::TokenKind;

    #[tokio::test]
    async fn test_highlight_handler() {
        let Json(response) = highlight(Json(HighlightRequest {
            text: "SELECT @id".to_string(),
        }))
        .await
        .unwrap();

        let segments = response.data.unwrap().segments;
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].kind, TokenKind::Keyword);
        assert_eq!(segments[2].kind, TokenKind::Variable);
    }
}
