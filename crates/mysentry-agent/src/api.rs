//! Local admin API. Bound to loopback by default; the `status`, `ack`
//! and `simulate` subcommands are thin clients of these routes.

use crate::runtime::AdminCommand;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

#[derive(Clone)]
pub struct ApiState {
    commands: mpsc::Sender<AdminCommand>,
}

#[derive(Serialize)]
struct ApiError {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> impl IntoResponse {
    (
        status,
        Json(ApiError {
            error: message.into(),
        }),
    )
}

pub fn router(commands: mpsc::Sender<AdminCommand>) -> Router {
    Router::new()
        .route("/v1/status", get(get_status))
        .route("/v1/alerts/:alert_id/ack", post(ack_alert))
        .route("/v1/rules/:rule_id/simulate", post(simulate_rule))
        .with_state(ApiState { commands })
}

async fn get_status(State(state): State<ApiState>) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    if state.commands.send(AdminCommand::Status(tx)).await.is_err() {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "pipeline unavailable")
            .into_response();
    }
    match rx.await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(_) => {
            tracing::error!("Pipeline dropped status reply");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "no reply from pipeline")
                .into_response()
        }
    }
}

async fn ack_alert(
    State(state): State<ApiState>,
    Path(alert_id): Path<String>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    let command = AdminCommand::Ack {
        alert_id,
        reply: tx,
    };
    if state.commands.send(command).await.is_err() {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "pipeline unavailable")
            .into_response();
    }
    match rx.await {
        Ok(Ok(alert)) => (StatusCode::OK, Json(alert)).into_response(),
        Ok(Err(message)) => error_response(StatusCode::NOT_FOUND, message).into_response(),
        Err(_) => {
            tracing::error!("Pipeline dropped ack reply");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "no reply from pipeline")
                .into_response()
        }
    }
}

async fn simulate_rule(
    State(state): State<ApiState>,
    Path(rule_id): Path<String>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    let command = AdminCommand::Simulate { rule_id, reply: tx };
    if state.commands.send(command).await.is_err() {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "pipeline unavailable")
            .into_response();
    }
    match rx.await {
        Ok(Ok(alert)) => (StatusCode::OK, Json(alert)).into_response(),
        Ok(Err(message)) => error_response(StatusCode::NOT_FOUND, message).into_response(),
        Err(_) => {
            tracing::error!("Pipeline dropped simulate reply");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "no reply from pipeline")
                .into_response()
        }
    }
}
