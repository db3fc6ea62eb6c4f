use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::core::error::{Error, Result};
use crate::core::store::Device;

/// The outcome of mapping an utterance onto the device/action catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentMatch {
    pub device_id: String,
    pub action_id: String,
    pub device_name: String,
    pub action_name: String,
    pub confidence: Option<f64>,
    pub reason: Option<String>,
}

/// Remote intent resolution: free text plus candidate actions in, optional
/// match out. `Ok(None)` means "nothing matched", not a failure.
#[async_trait]
pub trait IntentResolver: Send + Sync {
    async fn resolve(&self, text: &str, devices: &[Device]) -> Result<Option<IntentMatch>>;
}

#[derive(Debug, Clone)]
pub struct GlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

/// Chat-completions backed resolver.
pub struct GlmIntentResolver {
    http: reqwest::Client,
    config: GlmConfig,
}

impl GlmIntentResolver {
    pub fn new(config: GlmConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn catalog(devices: &[Device]) -> Value {
        let entries: Vec<Value> = devices
            .iter()
            .map(|device| {
                let actions: Vec<Value> = device
                    .actions
                    .iter()
                    .map(|action| {
                        serde_json::json!({
                            "id": action.id,
                            "name": action.name,
                            "description": action.command.replace("{app}", &device.app),
                        })
                    })
                    .collect();
                serde_json::json!({
                    "id": device.id,
                    "name": device.name,
                    "app": device.app,
                    "actions": actions,
                })
            })
            .collect();
        Value::Array(entries)
    }

    fn prompt(text: &str, devices: &[Device]) -> String {
        format!(
            "You are a smart home assistant. The user said something; find the best \
             matching device and action from the list below.\n\n\
             User said: \"{text}\"\n\n\
             Available devices and actions:\n{catalog}\n\n\
             Analyse the user's intent and return the best matching device id and \
             action id. If nothing matches, return null ids.\n\n\
             Reply with JSON only, no other content, in this shape:\n\
             {{\"device_id\": \"...\", \"action_id\": \"...\", \"confidence\": 0.0, \"reason\": \"...\"}}\n\
             or, when nothing matches:\n\
             {{\"device_id\": null, \"action_id\": null, \"reason\": \"...\"}}",
            catalog = serde_json::to_string_pretty(&Self::catalog(devices)).unwrap_or_default(),
        )
    }
}

/// Models wrap their JSON in markdown fences often enough to strip them.
fn strip_code_fences(content: &str) -> &str {
    content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

fn confidence_of(value: &Value) -> Option<f64> {
    match value.get("confidence") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    }
}

#[async_trait]
impl IntentResolver for GlmIntentResolver {
    async fn resolve(&self, text: &str, devices: &[Device]) -> Result<Option<IntentMatch>> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Configuration("intent API key is not configured".into()))?;

        info!(text, "resolving voice intent");
        let request = serde_json::json!({
            "model": self.config.model,
            "messages": [{ "role": "user", "content": Self::prompt(text, devices) }],
            // Low temperature keeps the id selection deterministic.
            "temperature": 0.1,
            "max_tokens": 500,
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let body: Value = response.json().await?;
        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| Error::Parse("intent response has no message content".into()))?;
        let parsed: Value = serde_json::from_str(strip_code_fences(content))?;

        let (Some(device_id), Some(action_id)) = (
            parsed.get("device_id").and_then(Value::as_str),
            parsed.get("action_id").and_then(Value::as_str),
        ) else {
            debug!(
                reason = parsed.get("reason").and_then(serde_json::Value::as_str).unwrap_or(""),
                "no intent match"
            );
            return Ok(None);
        };

        // Only report a match the catalog can actually back.
        let Some(device) = devices.iter().find(|d| d.id == device_id) else {
            debug!(device_id, "resolver returned an unknown device id");
            return Ok(None);
        };
        let Some(action) = device.actions.iter().find(|a| a.id == action_id) else {
            debug!(action_id, "resolver returned an unknown action id");
            return Ok(None);
        };

        Ok(Some(IntentMatch {
            device_id: device.id.clone(),
            action_id: action.id.clone(),
            device_name: device.name.clone(),
            action_name: action.name.clone(),
            confidence: confidence_of(&parsed),
            reason: parsed
                .get("reason")
                .and_then(Value::as_str)
                .map(str::to_string),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_fences_are_stripped() {
        let fenced = "```json\n{\"device_id\": \"lamp\"}\n```";
        assert_eq!(strip_code_fences(fenced), "{\"device_id\": \"lamp\"}");
        assert_eq!(strip_code_fences("{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn confidence_accepts_numbers_and_strings() {
        assert_eq!(
            confidence_of(&serde_json::json!({"confidence": 0.9})),
            Some(0.9)
        );
        assert_eq!(
            confidence_of(&serde_json::json!({"confidence": "0.75"})),
            Some(0.75)
        );
        assert_eq!(confidence_of(&serde_json::json!({})), None);
    }

    #[test]
    fn prompt_substitutes_app_into_action_descriptions() {
        let devices = vec![Device {
            id: "lamp".to_string(),
            name: "Lamp".to_string(),
            app: "SmartLight".to_string(),
            icon: "💡".to_string(),
            status: "idle".to_string(),
            actions: vec![crate::core::store::DeviceAction {
                id: "on".to_string(),
                name: "On".to_string(),
                command: "open {app}".to_string(),
            }],
        }];
        let prompt = GlmIntentResolver::prompt("turn on the lamp", &devices);
        assert!(prompt.contains("open SmartLight"));
        assert!(!prompt.contains("{app}"));
    }
}
