use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde_json::json;

use super::super::AppState;
use super::{failure, success};
use crate::core::error::Error;
use crate::core::store::Device;

type ApiResult = Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)>;

pub async fn list_devices(State(state): State<AppState>) -> ApiResult {
    let devices = state.devices.list().await.map_err(|e| failure(&e))?;
    Ok(success(json!({ "devices": devices })))
}

pub async fn get_device(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let device = state
        .devices
        .get(&id)
        .await
        .map_err(|e| failure(&e))?
        .ok_or_else(|| failure(&Error::NotFound(format!("device '{id}'"))))?;
    Ok(success(json!({ "device": device })))
}

pub async fn create_device(
    State(state): State<AppState>,
    Json(device): Json<Device>,
) -> ApiResult {
    if device.id.trim().is_empty() || device.name.trim().is_empty() {
        let err = Error::Configuration("device id and name are required".to_string());
        return Err(failure(&err));
    }
    let device = state.devices.insert(device).await.map_err(|e| failure(&e))?;
    Ok(success(json!({ "device": device })))
}

pub async fn update_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut device): Json<Device>,
) -> ApiResult {
    // The path wins over whatever id the body carries.
    device.id = id;
    let device = state.devices.update(device).await.map_err(|e| failure(&e))?;
    Ok(success(json!({ "device": device })))
}

pub async fn delete_device(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let removed = state.devices.remove(&id).await.map_err(|e| failure(&e))?;
    if !removed {
        return Err(failure(&Error::NotFound(format!("device '{id}'"))));
    }
    Ok(success(json!({ "message": format!("device '{id}' deleted") })))
}
