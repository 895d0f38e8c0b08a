//! Route definitions and router setup
//!
//! Configures all API routes and middleware.

mod compare;
mod deploy;
mod environment;
mod highlight;
mod history;

use crate::config::Settings;
use crate::state::SharedState;
use axum::{
    extract::State,
    http::{header, Method},
    routing::{delete, get, post},
    Json, Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::MakeRequestUuid,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
    ServiceBuilderExt,
};
use tracing::Level;

/// Create the application router with all routes and middleware
pub fn create_router(state: SharedState, settings: &Settings) -> Router {
    let cors = build_cors_layer(settings);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let middleware = ServiceBuilder::new()
        .set_x_request_id(MakeRequestUuid)
        .layer(trace_layer)
        .layer(CompressionLayer::new())
        .layer(cors)
        .propagate_x_request_id();

    Router::new()
        .route("/health", get(health_check))
        .route("/api/status", get(status))

        // Environments
        .route(
            "/api/environments",
            post(environment::connect_environment).get(environment::list_environments),
        )
        .route("/api/environments/{role}", delete(environment::disconnect_environment))

        // Version history
        .route("/api/sync", post(history::sync))
        .route("/api/history/recent", get(history::recent_changes))
        .route("/api/history/objects", get(history::tracked_objects))
        .route(
            "/api/history/{environment}/{schema}/{name}",
            get(history::object_history),
        )
        .route("/api/versions/diff", get(history::diff_versions))
        .route("/api/versions/{id}", get(history::get_version))

        // Comparison
        .route("/api/compare/{pair}/load", post(compare::load))
        .route("/api/compare/{pair}/scan", post(compare::scan))
        .route("/api/compare/{pair}/progress", get(compare::progress))
        .route("/api/compare/{pair}/objects", get(compare::list_objects))
        .route(
            "/api/compare/{pair}/objects/{schema}/{name}",
            get(compare::compare_object),
        )
        .route("/api/compare/{pair}/selection", post(compare::update_selection))

        // Deploy / rollback
        .route("/api/compare/{pair}/deploy", post(deploy::deploy_selected))
        .route(
            "/api/compare/{pair}/objects/{schema}/{name}/deploy",
            post(deploy::deploy_object),
        )
        .route("/api/rollback", post(deploy::rollback))

        .route("/api/highlight", post(highlight::highlight))

        .layer(middleware)
        .with_state(state)
}

/// Build CORS layer from settings
fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<_> = settings
        .cors
        .allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(3600));

    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(origins)
    }
}

/// Health check endpoint
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "message": "Server is running fine.",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Last status message plus connection summary
async fn status(State(state): State<SharedState>) -> Json<serde_json::Value> {
    let environments = state.environments.list().await;
    let primary = state.compare.scanner(crate::compare::ComparePair::Primary).counts().await;
    let secondary = state.compare.scanner(crate::compare::ComparePair::Secondary).counts().await;

    Json(serde_json::json!({
        "success": true,
        "message": state.status().await,
        "environments": environments,
        "primary": primary,
        "secondary": secondary,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_state;

    #[tokio::test]
    async fn test_status_reports_last_message() {
        let (state, _, _) = test_state();
        state.set_status("Deployed 2 object(s)").await;

        let Json(body) = status(State(state)).await;
        assert_eq!(body["message"], "Deployed 2 object(s)");
        assert_eq!(body["environments"].as_array().map(Vec::len), Some(0));
        assert_eq!(body["primary"]["total"], 0);
    }

    #[test]
    fn test_router_builds() {
        let (state, _, _) = test_state();
        let settings = Settings::default();
        let _router = create_router(state, &settings);
    }
}
