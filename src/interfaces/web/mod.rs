mod handlers;
mod router;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::core::dispatcher::Dispatcher;
use crate::core::hub::LogHub;
use crate::core::scheduler::ScheduleTrigger;
use crate::core::store::{DeviceStore, ScheduleStore};
use crate::core::voice::manager::VoiceManager;

pub use router::build_router;

/// Everything the HTTP handlers reach for. Cheap to clone; every field is an
/// `Arc` onto the shared daemon state.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<LogHub>,
    pub dispatcher: Arc<Dispatcher>,
    pub trigger: Arc<ScheduleTrigger>,
    pub devices: Arc<DeviceStore>,
    pub schedules: Arc<ScheduleStore>,
    pub voice: Arc<VoiceManager>,
}

pub async fn serve(state: AppState, host: &str, port: u16) -> Result<()> {
    let addr = format!("{host}:{port}");
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("API server running at http://{addr}");
    axum::serve(listener, app).await.context("server crashed")?;
    Ok(())
}
