mod config;
mod core;
mod interfaces;
mod logging;

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::core::dispatcher::{Dispatcher, ExecutorConfig};
use crate::core::hub::LogHub;
use crate::core::scheduler::ScheduleTrigger;
use crate::core::store::{DeviceStore, ScheduleStore};
use crate::core::voice::intent::{GlmConfig, GlmIntentResolver};
use crate::core::voice::manager::{StartOutcome, VoiceManager};
use crate::core::voice::pipeline::VoicePipeline;
use crate::interfaces::web::{AppState, serve};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let config = AppConfig::load()?;

    let hub = LogHub::new();
    let devices = Arc::new(DeviceStore::new(config.data_dir.join("devices.json")));
    let schedules = Arc::new(ScheduleStore::new(config.data_dir.join("schedules.json")));

    let dispatcher = Dispatcher::new(
        devices.clone(),
        hub.clone(),
        ExecutorConfig {
            program: config.executor.program.clone(),
            args: config.executor.args.clone(),
            workdir: config.executor.workdir.clone(),
        },
        config.executor.max_concurrent,
    );

    let trigger = ScheduleTrigger::new(schedules.clone(), dispatcher.clone(), hub.clone());
    trigger.reload().await?;
    let _trigger_loop = trigger.start();

    let resolver = Arc::new(GlmIntentResolver::new(GlmConfig {
        api_key: config.intent.api_key.clone(),
        base_url: config.intent.base_url.clone(),
        model: config.intent.model.clone(),
    }));
    let pipeline = VoicePipeline::new(resolver, dispatcher.clone(), hub.clone(), devices.clone());
    let voice = VoiceManager::new(config.voice.clone(), pipeline, hub.clone());

    // Voice is best-effort at startup: credentials may arrive later via the
    // API, so a failed or skipped start never blocks the daemon.
    match voice.start().await {
        Ok(StartOutcome::Started) => {}
        Ok(StartOutcome::AlreadyRunning) => {}
        Ok(StartOutcome::NotConfigured { missing }) => {
            info!(missing, "voice receiver idle until configured");
        }
        Err(e) => warn!(error = %e, "voice receiver failed to start"),
    }

    let state = AppState {
        hub,
        dispatcher,
        trigger,
        devices,
        schedules,
        voice,
    };
    serve(state, &config.server.host, config.server.port).await
}
