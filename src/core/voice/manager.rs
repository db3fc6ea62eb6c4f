use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::VoiceSettings;
use crate::core::error::{Error, Result};
use crate::core::events::LogEvent;
use crate::core::hub::LogHub;
use crate::core::voice::client::{ConversationSource, MinaClient, MinaSession};
use crate::core::voice::poller::{VoicePoller, VoiceSink};

/// What a start request actually did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
    /// Names the first missing credential field.
    NotConfigured { missing: String },
}

/// Builds the conversation source for a fresh session. A seam so lifecycle
/// tests run against fakes instead of the vendor endpoint.
type SourceFactory = dyn Fn(MinaSession) -> Arc<dyn ConversationSource> + Send + Sync;

/// Owns the poller lifecycle for the configured vendor speaker. All three
/// operations serialize on one lock, so concurrent start requests cannot
/// race into two pollers.
pub struct VoiceManager {
    settings: VoiceSettings,
    sink: Arc<dyn VoiceSink>,
    hub: Arc<LogHub>,
    source_factory: Box<SourceFactory>,
    poller: Mutex<Option<Arc<VoicePoller>>>,
}

impl VoiceManager {
    pub fn new(settings: VoiceSettings, sink: Arc<dyn VoiceSink>, hub: Arc<LogHub>) -> Arc<Self> {
        let factory = |session: MinaSession| -> Arc<dyn ConversationSource> {
            Arc::new(MinaClient::new(session))
        };
        Self::with_source(settings, sink, hub, Box::new(factory))
    }

    pub fn with_source(
        settings: VoiceSettings,
        sink: Arc<dyn VoiceSink>,
        hub: Arc<LogHub>,
        source_factory: Box<SourceFactory>,
    ) -> Arc<Self> {
        Arc::new(Self {
            settings,
            sink,
            hub,
            source_factory,
            poller: Mutex::new(None),
        })
    }

    pub async fn start(&self) -> Result<StartOutcome> {
        let mut slot = self.poller.lock().await;
        if slot.is_some() {
            return Ok(StartOutcome::AlreadyRunning);
        }
        let Some(session) = self.settings.session() else {
            let missing = self.settings.missing_field().unwrap_or("credentials");
            warn!(missing, "voice receiver not configured");
            return Ok(StartOutcome::NotConfigured {
                missing: missing.to_string(),
            });
        };

        let poller = Arc::new(VoicePoller::new(
            (self.source_factory)(session),
            Arc::clone(&self.sink),
        ));
        poller
            .start(Duration::from_millis(self.settings.poll_interval_ms))
            .await?;
        *slot = Some(poller);
        self.hub
            .publish(LogEvent::info("Voice receiver started"));
        Ok(StartOutcome::Started)
    }

    /// Stop while idle is rejected, matching the poller's own lifecycle
    /// contract.
    pub async fn stop(&self) -> Result<()> {
        let mut slot = self.poller.lock().await;
        let Some(poller) = slot.take() else {
            return Err(Error::Lifecycle("voice receiver is not running".into()));
        };
        poller.stop().await?;
        self.hub.publish(LogEvent::info("Voice receiver stopped"));
        info!("voice receiver stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.poller.lock().await.is_some()
    }
}
