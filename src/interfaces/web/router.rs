use axum::http::Method;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};

use super::AppState;
use super::handlers::{devices, execute, logs, schedules, voice};

async fn banner() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "success",
        "service": "flowhome",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/", get(banner))
        .route(
            "/api/devices",
            get(devices::list_devices).post(devices::create_device),
        )
        .route(
            "/api/devices/{id}",
            get(devices::get_device)
                .put(devices::update_device)
                .delete(devices::delete_device),
        )
        .route("/api/devices/{id}/execute", post(execute::execute_device_action))
        .route("/api/devices/{id}/trigger", post(execute::trigger_device_action))
        .route("/api/logs/stream", get(logs::stream_logs))
        .route("/api/voice/start", post(voice::start_voice))
        .route("/api/voice/stop", post(voice::stop_voice))
        .route("/api/voice/status", get(voice::voice_status))
        .route(
            "/api/schedules",
            get(schedules::list_schedules).post(schedules::create_schedule),
        )
        .route(
            "/api/schedules/{id}",
            axum::routing::put(schedules::update_schedule).delete(schedules::delete_schedule),
        )
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use tokio_stream::StreamExt;
    use tower::ServiceExt;

    use crate::config::VoiceSettings;
    use crate::core::dispatcher::{Dispatcher, ExecutorConfig};
    use crate::core::error::Result;
    use crate::core::events::LogEvent;
    use crate::core::hub::LogHub;
    use crate::core::scheduler::ScheduleTrigger;
    use crate::core::store::{Device, DeviceAction, DeviceStore, ScheduleStore};
    use crate::core::voice::VoiceMessage;
    use crate::core::voice::manager::VoiceManager;
    use crate::core::voice::poller::VoiceSink;

    struct NullSink;

    #[async_trait]
    impl VoiceSink for NullSink {
        async fn on_message(&self, _message: VoiceMessage) -> Result<()> {
            Ok(())
        }
    }

    async fn state(dir: &std::path::Path) -> AppState {
        let hub = LogHub::new();
        let devices = Arc::new(DeviceStore::new(dir.join("devices.json")));
        let schedules = Arc::new(ScheduleStore::new(dir.join("schedules.json")));
        let dispatcher = Dispatcher::new(
            devices.clone(),
            hub.clone(),
            ExecutorConfig {
                program: "sh".to_string(),
                args: vec!["-c".to_string()],
                workdir: None,
            },
            2,
        );
        let trigger = ScheduleTrigger::new(schedules.clone(), dispatcher.clone(), hub.clone());
        let voice = VoiceManager::new(VoiceSettings::default(), Arc::new(NullSink), hub.clone());
        AppState {
            hub,
            dispatcher,
            trigger,
            devices,
            schedules,
            voice,
        }
    }

    fn lamp() -> Device {
        Device {
            id: "lamp".to_string(),
            name: "Lamp".to_string(),
            app: "SmartLight".to_string(),
            icon: "💡".to_string(),
            status: "idle".to_string(),
            actions: vec![DeviceAction {
                id: "on".to_string(),
                name: "On".to_string(),
                command: "echo on".to_string(),
            }],
        }
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn banner_names_the_service() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(state(dir.path()).await);
        let response = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["service"], "flowhome");
        assert_eq!(body["status"], "success");
    }

    #[tokio::test]
    async fn device_crud_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path()).await;

        let response = build_router(state.clone())
            .oneshot(json_request(
                "POST",
                "/api/devices",
                serde_json::to_value(lamp()).unwrap(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = build_router(state.clone())
            .oneshot(Request::get("/api/devices").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["devices"].as_array().unwrap().len(), 1);

        let mut renamed = lamp();
        renamed.name = "Desk Lamp".to_string();
        let response = build_router(state.clone())
            .oneshot(json_request(
                "PUT",
                "/api/devices/lamp",
                serde_json::to_value(renamed).unwrap(),
            ))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["device"]["name"], "Desk Lamp");

        let response = build_router(state.clone())
            .oneshot(
                Request::delete("/api/devices/lamp")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = build_router(state)
            .oneshot(Request::get("/api/devices/lamp").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn blank_device_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(state(dir.path()).await);
        let mut device = lamp();
        device.id = "  ".to_string();
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/devices",
                serde_json::to_value(device).unwrap(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn trigger_acks_and_unknown_device_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path()).await;
        state.devices.insert(lamp()).await.unwrap();

        let response = build_router(state.clone())
            .oneshot(json_request(
                "POST",
                "/api/devices/lamp/trigger",
                serde_json::json!({ "action_id": "on" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["device"], "Lamp");

        let response = build_router(state)
            .oneshot(json_request(
                "POST",
                "/api/devices/nope/trigger",
                serde_json::json!({ "action_id": "on" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn execute_streams_the_full_event_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path()).await;
        state.devices.insert(lamp()).await.unwrap();

        let response = build_router(state)
            .oneshot(json_request(
                "POST",
                "/api/devices/lamp/execute",
                serde_json::json!({ "action_id": "on" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("\"type\":\"start\""));
        assert!(text.contains("\"type\":\"output\""));
        assert!(text.contains("\"type\":\"success\""));
    }

    #[tokio::test]
    async fn execute_on_unknown_action_yields_one_error_frame() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path()).await;
        state.devices.insert(lamp()).await.unwrap();

        let response = build_router(state)
            .oneshot(json_request(
                "POST",
                "/api/devices/lamp/execute",
                serde_json::json!({ "action_id": "nope" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert_eq!(text.matches("\"type\":\"error\"").count(), 1);
        assert!(!text.contains("\"type\":\"start\""));
    }

    #[tokio::test]
    async fn schedule_mutations_validate_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path()).await;
        state.devices.insert(lamp()).await.unwrap();

        let response = build_router(state.clone())
            .oneshot(json_request(
                "POST",
                "/api/schedules",
                serde_json::json!({
                    "name": "morning",
                    "device_id": "lamp",
                    "action_id": "on",
                    "time": "25:00",
                    "repeat": "daily",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = build_router(state.clone())
            .oneshot(json_request(
                "POST",
                "/api/schedules",
                serde_json::json!({
                    "name": "morning",
                    "device_id": "lamp",
                    "action_id": "on",
                    "time": "07:30",
                    "repeat": "daily",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let id = body["schedule"]["id"].as_str().unwrap().to_string();

        let response = build_router(state.clone())
            .oneshot(
                Request::delete(format!("/api/schedules/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = build_router(state)
            .oneshot(Request::get("/api/schedules").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert!(body["schedules"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn log_stream_opens_with_connected_then_replay_then_heartbeats() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path()).await;
        // Published before the subscription, so it arrives as replay.
        state.hub.publish(LogEvent::info("earlier event"));

        let response = build_router(state)
            .oneshot(
                Request::get("/api/logs/stream")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // The stream never ends; read frames until an idle second has
        // produced a heartbeat.
        let mut body = response.into_body().into_data_stream();
        let mut text = String::new();
        while !text.contains("\"type\":\"heartbeat\"") {
            let chunk = tokio::time::timeout(Duration::from_secs(3), body.next())
                .await
                .expect("log stream stalled")
                .expect("log stream ended")
                .unwrap();
            text.push_str(std::str::from_utf8(&chunk).unwrap());
        }

        let connected = text.find("\"type\":\"connected\"").unwrap();
        let replay = text.find("earlier event").unwrap();
        let heartbeat = text.find("\"type\":\"heartbeat\"").unwrap();
        assert!(connected < replay);
        assert!(replay < heartbeat);
    }

    #[tokio::test]
    async fn stopping_an_idle_voice_receiver_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(state(dir.path()).await);
        let response = app
            .oneshot(
                Request::post("/api/voice/stop")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert!(body["message"].as_str().unwrap().contains("not running"));
    }

    #[tokio::test]
    async fn voice_endpoints_report_unconfigured_and_idle() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path()).await;

        let response = build_router(state.clone())
            .oneshot(
                Request::get("/api/voice/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["running"], false);

        let response = build_router(state)
            .oneshot(
                Request::post("/api/voice/start")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
    }
}
