use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde_json::json;

use super::super::AppState;
use super::{failure, success};
use crate::core::voice::manager::StartOutcome;

type ApiResult = Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)>;

pub async fn start_voice(State(state): State<AppState>) -> ApiResult {
    match state.voice.start().await.map_err(|e| failure(&e))? {
        StartOutcome::Started => Ok(success(json!({ "message": "voice receiver started" }))),
        StartOutcome::AlreadyRunning => {
            Ok(success(json!({ "message": "voice receiver already running" })))
        }
        StartOutcome::NotConfigured { missing } => Err((
            StatusCode::BAD_REQUEST,
            Json(json!({
                "status": "error",
                "message": format!("voice receiver not configured: missing {missing}"),
            })),
        )),
    }
}

pub async fn stop_voice(State(state): State<AppState>) -> ApiResult {
    state.voice.stop().await.map_err(|e| failure(&e))?;
    Ok(success(json!({ "message": "voice receiver stopped" })))
}

pub async fn voice_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "success",
        "running": state.voice.is_running().await,
    }))
}
