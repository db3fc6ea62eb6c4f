pub mod devices;
pub mod execute;
pub mod logs;
pub mod schedules;
pub mod voice;

use axum::Json;
use axum::http::StatusCode;

use crate::core::error::Error;

/// The `{"status": "success" | "error"}` response envelope every JSON
/// endpoint uses.
pub fn success(mut body: serde_json::Value) -> Json<serde_json::Value> {
    if let Some(map) = body.as_object_mut() {
        map.insert("status".to_string(), "success".into());
    }
    Json(body)
}

pub fn failure(error: &Error) -> (StatusCode, Json<serde_json::Value>) {
    let code = if error.is_not_found() {
        StatusCode::NOT_FOUND
    } else if matches!(error, Error::Configuration(_) | Error::Lifecycle(_)) {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (
        code,
        Json(serde_json::json!({
            "status": "error",
            "message": error.to_string(),
        })),
    )
}
