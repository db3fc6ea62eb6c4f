use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{Semaphore, mpsc};
use tracing::{info, warn};

use crate::core::error::{Error, Result};
use crate::core::events::{DispatchAck, LogEvent};
use crate::core::hub::LogHub;
use crate::core::store::DeviceStore;

/// Queue depth for a sync-stream consumer; sending backpressures the
/// reader task, never the child process pipes.
const STREAM_QUEUE: usize = 32;

/// The external automation invocation: program, its fixed arguments, and an
/// optional working directory. The resolved command text is appended as the
/// final argument.
#[derive(Debug, Clone, Default)]
pub struct ExecutorConfig {
    pub program: String,
    pub args: Vec<String>,
    pub workdir: Option<PathBuf>,
}

/// Where a dispatch's events go: the shared hub, or one synchronous caller.
#[derive(Clone)]
pub enum EventSink {
    Hub(Arc<LogHub>),
    Channel(mpsc::Sender<LogEvent>),
}

impl EventSink {
    async fn emit(&self, event: LogEvent) {
        match self {
            EventSink::Hub(hub) => hub.publish(event),
            EventSink::Channel(tx) => {
                // A sync-stream caller that went away just ends the dispatch
                // stream; the child still runs to completion.
                let _ = tx.send(event).await;
            }
        }
    }
}

struct ResolvedDispatch {
    device_name: String,
    action_name: String,
    command_text: String,
}

/// Resolves a device action and runs it as an external process, emitting the
/// `start` / `output`* / terminal event sequence to the chosen sink.
pub struct Dispatcher {
    devices: Arc<DeviceStore>,
    hub: Arc<LogHub>,
    executor: ExecutorConfig,
    permits: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(
        devices: Arc<DeviceStore>,
        hub: Arc<LogHub>,
        executor: ExecutorConfig,
        max_concurrent: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            devices,
            hub,
            executor,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        })
    }

    /// Async-to-hub mode: returns immediately with an acknowledgement; the
    /// execution events are only observable on the broadcast stream.
    pub async fn dispatch_to_hub(
        self: &Arc<Self>,
        device_id: &str,
        action_id: &str,
    ) -> Result<DispatchAck> {
        let resolved = self.resolve(device_id, action_id).await?;
        let ack = DispatchAck {
            device: resolved.device_name.clone(),
            action: resolved.action_name.clone(),
        };
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let permit = this.permits.acquire().await;
            if permit.is_err() {
                return;
            }
            let sink = EventSink::Hub(Arc::clone(&this.hub));
            this.run(resolved, sink).await;
        });
        Ok(ack)
    }

    /// Sync-stream mode: the caller is the consumer. The returned receiver
    /// yields the full event sequence and closes after the terminal event.
    pub async fn dispatch_stream(
        self: &Arc<Self>,
        device_id: &str,
        action_id: &str,
    ) -> Result<mpsc::Receiver<LogEvent>> {
        let resolved = self.resolve(device_id, action_id).await?;
        let (tx, rx) = mpsc::channel(STREAM_QUEUE);
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run(resolved, EventSink::Channel(tx)).await;
        });
        Ok(rx)
    }

    async fn resolve(&self, device_id: &str, action_id: &str) -> Result<ResolvedDispatch> {
        let device = self
            .devices
            .get(device_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("device '{device_id}'")))?;
        let action = device
            .actions
            .iter()
            .find(|a| a.id == action_id)
            .ok_or_else(|| {
                Error::NotFound(format!("action '{action_id}' on device '{device_id}'"))
            })?;
        let command_text = action.command.replace("{app}", &device.app);
        if command_text.trim().is_empty() {
            return Err(Error::NotFound(format!(
                "action '{action_id}' on device '{device_id}' has no command"
            )));
        }
        Ok(ResolvedDispatch {
            device_name: device.name,
            action_name: action.name.clone(),
            command_text,
        })
    }

    async fn run(&self, resolved: ResolvedDispatch, sink: EventSink) {
        let mut argv = self.executor.args.clone();
        argv.push(resolved.command_text.clone());
        let command_line = format!("{} {}", self.executor.program, argv.join(" "));

        // `start` goes out before any output is known.
        sink.emit(LogEvent::start(
            format!(
                "Executing: {} - {}",
                resolved.device_name, resolved.action_name
            ),
            command_line,
            resolved.command_text.clone(),
        ))
        .await;

        let mut cmd = Command::new(&self.executor.program);
        cmd.args(&argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Keeps Python-based automation tools line-buffered so output
            // arrives incrementally instead of at exit.
            .env("PYTHONUNBUFFERED", "1");
        if let Some(dir) = &self.executor.workdir {
            cmd.current_dir(dir);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let err = Error::ProcessExecution(format!(
                    "executable not found: {}",
                    self.executor.program
                ));
                sink.emit(LogEvent::error(err.to_string(), None)).await;
                return;
            }
            Err(e) => {
                let err = Error::ProcessExecution(format!("failed to spawn: {e}"));
                sink.emit(LogEvent::error(err.to_string(), None)).await;
                return;
            }
        };

        // stderr drains on a side task into the same sink, so neither pipe
        // can fill up and deadlock the child.
        let stderr_task = child.stderr.take().map(|stderr| {
            let sink = sink.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    sink.emit(LogEvent::output(line)).await;
                }
            })
        });

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                sink.emit(LogEvent::output(line)).await;
            }
        }
        if let Some(task) = stderr_task {
            let _ = task.await;
        }

        match child.wait().await {
            Ok(status) if status.success() => {
                info!(
                    device = %resolved.device_name,
                    action = %resolved.action_name,
                    "dispatch completed"
                );
                sink.emit(LogEvent::success(
                    format!(
                        "Completed: {} - {}",
                        resolved.device_name, resolved.action_name
                    ),
                    status.code(),
                ))
                .await;
            }
            Ok(status) => {
                warn!(
                    device = %resolved.device_name,
                    action = %resolved.action_name,
                    code = ?status.code(),
                    "dispatch failed"
                );
                sink.emit(LogEvent::error(
                    format!(
                        "Failed: {} - {} (exit code {})",
                        resolved.device_name,
                        resolved.action_name,
                        status.code().map_or_else(|| "?".to_string(), |c| c.to_string()),
                    ),
                    status.code(),
                ))
                .await;
            }
            Err(e) => {
                let err = Error::ProcessExecution(format!("wait failed: {e}"));
                sink.emit(LogEvent::error(err.to_string(), None)).await;
            }
        }
    }
}
