use crate::infra::AppState;
use approval_desk::workflows::access::{Actor, RoleStore};
use approval_desk::workflows::submissions::{desk_router, DeskState, SubmissionRepository};
use axum::extract::Path;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use axum::Json;
use serde_json::json;
use std::io::ErrorKind;
use std::path::Component;
use tracing::warn;

pub(crate) fn with_desk_routes<R, D>(state: DeskState<R, D>) -> axum::Router
where
    R: SubmissionRepository + 'static,
    D: RoleStore + 'static,
{
    desk_router(state)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route("/assets/*path", axum::routing::get(asset_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Serves files written by the filesystem object store, matching its public base URL.
/// Callers must come through the authenticating proxy.
pub(crate) async fn asset_endpoint(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Path(path): Path<String>,
) -> Response {
    if !Actor::from_headers(&headers).authenticated {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "authentication required" })),
        )
            .into_response();
    }

    let relative = std::path::Path::new(&path);
    let contained = relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)));
    if !contained {
        return asset_not_found();
    }

    match tokio::fs::read(state.assets_root.join(relative)).await {
        Ok(bytes) => {
            let content_type = mime_guess::from_path(relative).first_or_octet_stream();
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, content_type.to_string())],
                bytes,
            )
                .into_response()
        }
        Err(err) if err.kind() == ErrorKind::NotFound => asset_not_found(),
        Err(err) => {
            warn!(%path, error = %err, "asset read failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "asset unavailable" })),
            )
                .into_response()
        }
    }
}

fn asset_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "asset not found" })),
    )
        .into_response()
}
