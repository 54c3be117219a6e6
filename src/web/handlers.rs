//! HTTP handlers. Thin: every decision lives in the services.

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::errors::{AppError, ProbeError};
use crate::utils::UrlUtils;
use crate::web::AppState;
use crate::web::responses::{
    ApiResponse, EnabledRequest, HealthResponse, StatsResponse, handle_error,
};

pub const MANIFEST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = chrono::Utc::now() - state.start_time;
    ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime.num_seconds(),
        enabled: state.interceptor.engine().context().is_enabled(),
    })
}

#[derive(Debug, Deserialize)]
pub struct PlaylistParams {
    pub url: String,
}

/// Fetch an upstream manifest and serve it through the interceptor
pub async fn serve_playlist(
    State(state): State<AppState>,
    Query(params): Query<PlaylistParams>,
) -> Response {
    if Url::parse(&params.url).is_err() {
        return handle_error(AppError::Probe(ProbeError::InvalidUrl {
            url: UrlUtils::obfuscate_credentials(&params.url),
        }));
    }

    let timeout = state.config.web.upstream_timeout;
    let fetched = tokio::time::timeout(timeout, state.fetcher.fetch_manifest(&params.url))
        .await
        .unwrap_or(Err(ProbeError::Timeout {
            millis: timeout.as_millis() as u64,
        }));

    let text = match fetched {
        Ok(text) => text,
        Err(err) => {
            debug!(
                "Upstream fetch failed for {}: {}",
                UrlUtils::obfuscate_credentials(&params.url),
                err
            );
            return handle_error(AppError::Probe(err));
        }
    };

    let body = state
        .interceptor
        .intercept(Bytes::from(text), Some(&params.url))
        .await;

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, MANIFEST_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}

pub async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    let context = state.interceptor.engine().context();
    ApiResponse::success(StatsResponse {
        enabled: context.is_enabled(),
        stats: context.stats(),
        recent: context.recent_log().await,
    })
}

pub async fn set_enabled(
    State(state): State<AppState>,
    Json(request): Json<EnabledRequest>,
) -> Response {
    let context = state.interceptor.engine().context();
    context.set_enabled(request.enabled);
    if let Err(e) = context.flush().await {
        return handle_error(e);
    }
    tracing::info!("Ad filtering {}", if request.enabled { "enabled" } else { "disabled" });
    ApiResponse::success(request).into_response()
}

/// Token relay: token requests are answered from the cache, anything else is forwarded
pub async fn relay_gql(State(state): State<AppState>, body: Bytes) -> Response {
    match state.relay.handle(body).await {
        Ok(reply) => {
            let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::BAD_GATEWAY);
            (
                status,
                [(header::CONTENT_TYPE, "application/json")],
                reply.body,
            )
                .into_response()
        }
        Err(e) => handle_error(e),
    }
}
