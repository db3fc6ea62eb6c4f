use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::error::{Error, Result};
use crate::core::voice::VoiceMessage;
use crate::core::voice::client::ConversationSource;

/// Records fetched per polling cycle.
const PAGE_LIMIT: usize = 10;
/// How long `stop` waits for the loop to acknowledge termination.
const STOP_WAIT: Duration = Duration::from_secs(2);

/// Consumer of genuinely-new utterances.
#[async_trait]
pub trait VoiceSink: Send + Sync {
    async fn on_message(&self, message: VoiceMessage) -> Result<()>;
}

enum PollerState {
    Idle,
    Running {
        cancel: CancellationToken,
        handle: JoinHandle<()>,
    },
}

/// Long-lived polling loop over the conversation source.
///
/// The watermark timestamp lives inside the loop task and is advanced to the
/// maximum timestamp of each fetched page. Remote ordering within a page is
/// not reliable, so tracking only the last-processed record could re-deliver
/// a sibling that sorted after it.
pub struct VoicePoller {
    source: Arc<dyn ConversationSource>,
    sink: Arc<dyn VoiceSink>,
    state: Mutex<PollerState>,
}

impl VoicePoller {
    pub fn new(source: Arc<dyn ConversationSource>, sink: Arc<dyn VoiceSink>) -> Self {
        Self {
            source,
            sink,
            state: Mutex::new(PollerState::Idle),
        }
    }

    /// Rejected with a lifecycle error while already running.
    pub async fn start(&self, interval: Duration) -> Result<()> {
        let mut state = self.state.lock().await;
        if matches!(*state, PollerState::Running { .. }) {
            return Err(Error::Lifecycle("voice poller is already running".into()));
        }
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_loop(
            Arc::clone(&self.source),
            Arc::clone(&self.sink),
            interval,
            cancel.clone(),
        ));
        *state = PollerState::Running { cancel, handle };
        info!(interval_ms = interval.as_millis() as u64, "voice poller started");
        Ok(())
    }

    /// Cooperative stop: the loop observes cancellation at its next wait
    /// checkpoint; an in-flight fetch is allowed to finish, bounded by the
    /// stop-wait.
    pub async fn stop(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        match std::mem::replace(&mut *state, PollerState::Idle) {
            PollerState::Idle => Err(Error::Lifecycle("voice poller is not running".into())),
            PollerState::Running { cancel, handle } => {
                cancel.cancel();
                if tokio::time::timeout(STOP_WAIT, handle).await.is_err() {
                    warn!("voice poller did not acknowledge stop within {STOP_WAIT:?}");
                }
                info!("voice poller stopped");
                Ok(())
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        matches!(*self.state.lock().await, PollerState::Running { .. })
    }
}

async fn run_loop(
    source: Arc<dyn ConversationSource>,
    sink: Arc<dyn VoiceSink>,
    interval: Duration,
    cancel: CancellationToken,
) {
    // Baseline: only records strictly newer than "now" are ever delivered;
    // pre-existing history is not replayed.
    let mut watermark: i64 = match source.recent(1).await {
        Ok(records) => records.first().map(|r| r.time).unwrap_or(0),
        Err(e) => {
            warn!(error = %e, "watermark baseline fetch failed, starting from zero");
            0
        }
    };

    loop {
        if cancel.is_cancelled() {
            break;
        }

        match source.recent(PAGE_LIMIT).await {
            Ok(records) => {
                let mut fresh: Vec<_> =
                    records.iter().filter(|r| r.time > watermark).collect();
                if let Some(page_max) = records.iter().map(|r| r.time).max()
                    && page_max > watermark
                {
                    watermark = page_max;
                }
                fresh.sort_by_key(|r| r.time);
                for record in fresh {
                    let message = VoiceMessage::from(record);
                    // One bad message must not abort the loop or starve the
                    // rest of the page.
                    if let Err(e) = sink.on_message(message).await {
                        warn!(error = %e, "voice message handler failed");
                    }
                }
            }
            Err(e) => warn!(error = %e, "conversation fetch failed, skipping cycle"),
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
