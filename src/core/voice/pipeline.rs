use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::core::dispatcher::Dispatcher;
use crate::core::error::Result;
use crate::core::events::LogEvent;
use crate::core::hub::LogHub;
use crate::core::store::DeviceStore;
use crate::core::voice::VoiceMessage;
use crate::core::voice::intent::IntentResolver;
use crate::core::voice::poller::VoiceSink;

/// Turns an utterance into a dispatch: announce it, resolve it against the
/// current device catalog, and fire the matched action async-to-hub. Every
/// stage reports on the broadcast stream, so a dashboard shows the whole
/// journey of a voice command.
pub struct VoicePipeline {
    resolver: Arc<dyn IntentResolver>,
    dispatcher: Arc<Dispatcher>,
    hub: Arc<LogHub>,
    devices: Arc<DeviceStore>,
}

impl VoicePipeline {
    pub fn new(
        resolver: Arc<dyn IntentResolver>,
        dispatcher: Arc<Dispatcher>,
        hub: Arc<LogHub>,
        devices: Arc<DeviceStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            resolver,
            dispatcher,
            hub,
            devices,
        })
    }
}

#[async_trait]
impl VoiceSink for VoicePipeline {
    async fn on_message(&self, message: VoiceMessage) -> Result<()> {
        info!(text = %message.text, "voice message received");
        self.hub.publish(LogEvent::voice(&message.text));

        let devices = self.devices.list().await?;
        let resolved = match self.resolver.resolve(&message.text, &devices).await {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(error = %e, "intent resolution failed");
                self.hub
                    .publish(LogEvent::error(format!("Intent resolution failed: {e}"), None));
                return Err(e);
            }
        };

        let Some(intent) = resolved else {
            self.hub.publish(LogEvent::warning(format!(
                "No matching action for: {}",
                message.text
            )));
            return Ok(());
        };

        self.hub.publish(LogEvent::matched(
            &intent.device_name,
            &intent.action_name,
            intent.confidence,
            intent.reason.clone(),
        ));

        match self
            .dispatcher
            .dispatch_to_hub(&intent.device_id, &intent.action_id)
            .await
        {
            Ok(ack) => {
                info!(device = %ack.device, action = %ack.action, "voice dispatch started");
                Ok(())
            }
            Err(e) => {
                // The catalog moved between resolution and dispatch.
                warn!(error = %e, "voice dispatch failed");
                self.hub
                    .publish(LogEvent::error(format!("Voice dispatch failed: {e}"), None));
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dispatcher::ExecutorConfig;
    use crate::core::error::Error;
    use crate::core::store::{Device, DeviceAction};
    use crate::core::voice::intent::IntentMatch;
    use std::time::Duration;

    enum Script {
        Match(IntentMatch),
        NoMatch,
        Fail,
    }

    struct ScriptedResolver(Script);

    #[async_trait]
    impl IntentResolver for ScriptedResolver {
        async fn resolve(&self, _text: &str, _devices: &[Device]) -> Result<Option<IntentMatch>> {
            match &self.0 {
                Script::Match(m) => Ok(Some(m.clone())),
                Script::NoMatch => Ok(None),
                Script::Fail => Err(Error::RemoteService("resolver offline".into())),
            }
        }
    }

    async fn fixture(script: Script) -> (Arc<VoicePipeline>, Arc<LogHub>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let devices = Arc::new(DeviceStore::new(dir.path().join("devices.json")));
        devices
            .insert(Device {
                id: "lamp".to_string(),
                name: "Lamp".to_string(),
                app: String::new(),
                icon: "💡".to_string(),
                status: "idle".to_string(),
                actions: vec![DeviceAction {
                    id: "on".to_string(),
                    name: "On".to_string(),
                    command: "echo on".to_string(),
                }],
            })
            .await
            .unwrap();
        let hub = LogHub::new();
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
        let pipeline = VoicePipeline::new(
            Arc::new(ScriptedResolver(script)),
            dispatcher,
            hub.clone(),
            devices,
        );
        (pipeline, hub, dir)
    }

    fn message(text: &str) -> VoiceMessage {
        VoiceMessage {
            text: text.to_string(),
            timestamp: 1,
            request_id: "req".to_string(),
        }
    }

    fn lamp_match() -> IntentMatch {
        IntentMatch {
            device_id: "lamp".to_string(),
            action_id: "on".to_string(),
            device_name: "Lamp".to_string(),
            action_name: "On".to_string(),
            confidence: Some(0.9),
            reason: None,
        }
    }

    #[tokio::test]
    async fn matched_utterance_runs_through_voice_match_and_execution() {
        let (pipeline, hub, _dir) = fixture(Script::Match(lamp_match())).await;
        pipeline.on_message(message("turn on the lamp")).await.unwrap();

        // The dispatch runs in the background; wait for its terminal event.
        for _ in 0..50 {
            if hub
                .history()
                .iter()
                .any(|e| matches!(e, LogEvent::Success { .. }))
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let kinds: Vec<_> = hub.history().iter().map(|e| e.kind()).collect();
        assert_eq!(kinds[..2], ["voice", "match"]);
        assert!(kinds.contains(&"start"));
        assert!(kinds.contains(&"success"));
    }

    #[tokio::test]
    async fn unmatched_utterance_ends_with_a_warning() {
        let (pipeline, hub, _dir) = fixture(Script::NoMatch).await;
        pipeline.on_message(message("sing me a song")).await.unwrap();
        let kinds: Vec<_> = hub.history().iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, ["voice", "warning"]);
    }

    #[tokio::test]
    async fn resolver_failure_surfaces_as_an_error_event() {
        let (pipeline, hub, _dir) = fixture(Script::Fail).await;
        let err = pipeline.on_message(message("anything")).await.unwrap_err();
        assert!(matches!(err, Error::RemoteService(_)));
        let kinds: Vec<_> = hub.history().iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, ["voice", "error"]);
    }

    #[tokio::test]
    async fn stale_match_is_reported_not_silently_dropped() {
        let mut stale = lamp_match();
        stale.device_id = "gone".to_string();
        let (pipeline, hub, _dir) = fixture(Script::Match(stale)).await;
        let err = pipeline.on_message(message("turn on the lamp")).await.unwrap_err();
        assert!(err.is_not_found());
        let kinds: Vec<_> = hub.history().iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, ["voice", "match", "error"]);
    }
}
