use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Local, Weekday};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::core::dispatcher::Dispatcher;
use crate::core::error::Result;
use crate::core::events::LogEvent;
use crate::core::hub::LogHub;
use crate::core::store::{RepeatKind, ScheduleRule, ScheduleStore};

/// Evaluates time/day rules against the local clock and fires the
/// dispatcher (async-to-hub) on matching ticks.
///
/// The active rule set is a cached snapshot, re-derived in full by
/// `reload()` after every rule mutation; device and action are resolved by
/// id at fire time, so edits to a rule or its device take effect on the
/// very next matching tick.
pub struct ScheduleTrigger {
    store: Arc<ScheduleStore>,
    dispatcher: Arc<Dispatcher>,
    hub: Arc<LogHub>,
    rules: RwLock<Vec<ScheduleRule>>,
}

impl ScheduleTrigger {
    pub fn new(
        store: Arc<ScheduleStore>,
        dispatcher: Arc<Dispatcher>,
        hub: Arc<LogHub>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            dispatcher,
            hub,
            rules: RwLock::new(Vec::new()),
        })
    }

    /// Replaces the cached rule set with a fresh snapshot from the store.
    /// Returns how many enabled rules are active.
    pub async fn reload(&self) -> Result<usize> {
        let rules = self.store.list().await?;
        let enabled = rules.iter().filter(|r| r.enabled).count();
        info!(total = rules.len(), enabled, "schedule rules reloaded");
        *self.rules.write().await = rules;
        Ok(enabled)
    }

    /// Spawns the tick loop: 1s cadence, at most one evaluation per
    /// wall-clock minute. Evaluation failures never terminate the loop.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut last_minute: Option<String> = None;
            info!("schedule trigger started");
            loop {
                ticker.tick().await;
                let now = Local::now();
                let minute = now.format("%Y-%m-%d %H:%M").to_string();
                if last_minute.as_deref() == Some(minute.as_str()) {
                    continue;
                }
                last_minute = Some(minute);
                this.evaluate(now).await;
            }
        })
    }

    async fn evaluate(&self, now: DateTime<Local>) {
        let hhmm = now.format("%H:%M").to_string();
        let weekday = now.weekday();
        let due: Vec<ScheduleRule> = self
            .rules
            .read()
            .await
            .iter()
            .filter(|r| rule_matches(r, weekday, &hhmm))
            .cloned()
            .collect();

        for rule in due {
            info!(rule = %rule.name, time = %rule.time, "schedule rule fired");
            match self
                .dispatcher
                .dispatch_to_hub(&rule.device_id, &rule.action_id)
                .await
            {
                // One info announces the firing; success/error for the
                // execution itself come from the dispatch.
                Ok(ack) => {
                    self.hub.publish(LogEvent::info(format!(
                        "Schedule fired: {} ({} - {})",
                        rule.name, ack.device, ack.action
                    )));
                }
                Err(e) => {
                    warn!(rule = %rule.name, error = %e, "schedule dispatch failed");
                    self.hub.publish(LogEvent::error(
                        format!("Schedule '{}' failed: {e}", rule.name),
                        None,
                    ));
                }
            }
        }
    }
}

/// Weekday as stored in rules: 0 = Sunday .. 6 = Saturday.
fn weekday_index(weekday: Weekday) -> u8 {
    weekday.num_days_from_sunday() as u8
}

pub fn rule_matches(rule: &ScheduleRule, weekday: Weekday, hhmm: &str) -> bool {
    if !rule.enabled || rule.time != hhmm {
        return false;
    }
    match rule.repeat {
        // "once" behaves like daily: the source of record never
        // unschedules it, it only fires at its time.
        RepeatKind::Once | RepeatKind::Daily => true,
        RepeatKind::Weekdays => !matches!(weekday, Weekday::Sat | Weekday::Sun),
        RepeatKind::Weekends => matches!(weekday, Weekday::Sat | Weekday::Sun),
        RepeatKind::Weekly => rule.weekdays.contains(&weekday_index(weekday)),
    }
}
