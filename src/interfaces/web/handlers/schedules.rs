use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde_json::json;
use tracing::warn;

use super::super::AppState;
use super::{failure, success};
use crate::core::error::Error;
use crate::core::store::ScheduleRuleInput;

type ApiResult = Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)>;

pub async fn list_schedules(State(state): State<AppState>) -> ApiResult {
    let rules = state.schedules.list().await.map_err(|e| failure(&e))?;
    Ok(success(json!({ "schedules": rules })))
}

fn validate(input: &ScheduleRuleInput) -> Result<(), Error> {
    if input.name.trim().is_empty()
        || input.device_id.trim().is_empty()
        || input.action_id.trim().is_empty()
    {
        return Err(Error::Configuration(
            "name, device_id and action_id are required".to_string(),
        ));
    }
    // HH:MM, 24-hour.
    let valid_time = input.time.len() == 5
        && input.time.as_bytes()[2] == b':'
        && input.time[..2].parse::<u8>().is_ok_and(|h| h < 24)
        && input.time[3..].parse::<u8>().is_ok_and(|m| m < 60);
    if !valid_time {
        return Err(Error::Configuration(format!(
            "invalid time '{}', expected HH:MM",
            input.time
        )));
    }
    if input.weekdays.iter().any(|d| *d > 6) {
        return Err(Error::Configuration(
            "weekdays must be 0 (Sunday) through 6 (Saturday)".to_string(),
        ));
    }
    Ok(())
}

/// Mutations persist first, then re-derive the trigger's active rule set.
async fn reload_trigger(state: &AppState) {
    if let Err(e) = state.trigger.reload().await {
        warn!(error = %e, "schedule reload after mutation failed");
    }
}

pub async fn create_schedule(
    State(state): State<AppState>,
    Json(input): Json<ScheduleRuleInput>,
) -> ApiResult {
    validate(&input).map_err(|e| failure(&e))?;
    let rule = state.schedules.create(input).await.map_err(|e| failure(&e))?;
    reload_trigger(&state).await;
    Ok(success(json!({ "schedule": rule })))
}

pub async fn update_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<ScheduleRuleInput>,
) -> ApiResult {
    validate(&input).map_err(|e| failure(&e))?;
    let rule = state
        .schedules
        .update(&id, input)
        .await
        .map_err(|e| failure(&e))?;
    reload_trigger(&state).await;
    Ok(success(json!({ "schedule": rule })))
}

pub async fn delete_schedule(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let removed = state.schedules.remove(&id).await.map_err(|e| failure(&e))?;
    if !removed {
        return Err(failure(&Error::NotFound(format!("schedule '{id}'"))));
    }
    reload_trigger(&state).await;
    Ok(success(json!({ "message": format!("schedule '{id}' deleted") })))
}
