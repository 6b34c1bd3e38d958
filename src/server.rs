use std::net::SocketAddr;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::app::AppContext;
use crate::leaderboard::EvaluationRecord;
use crate::submission::{self, SubmitError};
use crate::types::{SubmissionRequest, SubmissionStatus};

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    ok: bool,
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(error: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ApiErrorBody {
            ok: false,
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/evaluate_model", post(evaluate_model))
        .route("/leaderboard", get(leaderboard))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

pub async fn run_server(ctx: AppContext, bind: SocketAddr, token: CancellationToken) -> Result<()> {
    let app = router(ctx);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("REST API listening on http://{bind}");
    axum::serve(listener, app)
        .with_graceful_shutdown(token.cancelled_owned())
        .await?;
    Ok(())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn evaluate_model(
    State(ctx): State<AppContext>,
    Json(request): Json<SubmissionRequest>,
) -> Result<Json<SubmissionStatus>, ApiError> {
    match submission::submit(&ctx, request).await {
        Ok(payload) => Ok(Json(payload)),
        Err(error @ SubmitError::FingerprintMismatch) => Err(ApiError::bad_request(error.to_string())),
        Err(error) => Err(ApiError::internal(error)),
    }
}

async fn leaderboard(State(ctx): State<AppContext>) -> Json<Vec<EvaluationRecord>> {
    Json(ctx.store.snapshot())
}
