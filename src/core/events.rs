use chrono::Local;
use serde::{Deserialize, Serialize};

/// One broadcast event, the unit the hub fans out and the SSE endpoints
/// frame as `data: <json>\n\n`.
///
/// Closed tagged enum so every producer/consumer pair is checked
/// exhaustively; the wire shape is `{"type": "...", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogEvent {
    Connected {
        message: String,
    },
    Start {
        message: String,
        timestamp: String,
        command: String,
        final_command: String,
    },
    Output {
        line: String,
        timestamp: String,
    },
    Voice {
        message: String,
        timestamp: String,
        voice_text: String,
    },
    Match {
        message: String,
        timestamp: String,
        device_name: String,
        action_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        confidence: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Warning {
        message: String,
        timestamp: String,
    },
    Success {
        message: String,
        timestamp: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        returncode: Option<i32>,
    },
    Error {
        message: String,
        timestamp: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        returncode: Option<i32>,
    },
    Info {
        message: String,
        timestamp: String,
    },
    Heartbeat {
        timestamp: String,
    },
}

fn now() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

impl LogEvent {
    pub fn connected() -> Self {
        LogEvent::Connected {
            message: "log stream connected".to_string(),
        }
    }

    pub fn start(message: impl Into<String>, command: String, final_command: String) -> Self {
        LogEvent::Start {
            message: message.into(),
            timestamp: now(),
            command,
            final_command,
        }
    }

    pub fn output(line: impl Into<String>) -> Self {
        LogEvent::Output {
            line: line.into(),
            timestamp: now(),
        }
    }

    pub fn voice(text: &str) -> Self {
        LogEvent::Voice {
            message: format!("Voice received: {text}"),
            timestamp: now(),
            voice_text: text.to_string(),
        }
    }

    pub fn matched(
        device_name: &str,
        action_name: &str,
        confidence: Option<f64>,
        reason: Option<String>,
    ) -> Self {
        LogEvent::Match {
            message: format!("Matched device action: {device_name} - {action_name}"),
            timestamp: now(),
            device_name: device_name.to_string(),
            action_name: action_name.to_string(),
            confidence,
            reason,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        LogEvent::Warning {
            message: message.into(),
            timestamp: now(),
        }
    }

    pub fn success(message: impl Into<String>, returncode: Option<i32>) -> Self {
        LogEvent::Success {
            message: message.into(),
            timestamp: now(),
            returncode,
        }
    }

    pub fn error(message: impl Into<String>, returncode: Option<i32>) -> Self {
        LogEvent::Error {
            message: message.into(),
            timestamp: now(),
            returncode,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        LogEvent::Info {
            message: message.into(),
            timestamp: now(),
        }
    }

    pub fn heartbeat() -> Self {
        LogEvent::Heartbeat { timestamp: now() }
    }

    /// The wire `type` tag, handy for logging and assertions.
    pub fn kind(&self) -> &'static str {
        match self {
            LogEvent::Connected { .. } => "connected",
            LogEvent::Start { .. } => "start",
            LogEvent::Output { .. } => "output",
            LogEvent::Voice { .. } => "voice",
            LogEvent::Match { .. } => "match",
            LogEvent::Warning { .. } => "warning",
            LogEvent::Success { .. } => "success",
            LogEvent::Error { .. } => "error",
            LogEvent::Info { .. } => "info",
            LogEvent::Heartbeat { .. } => "heartbeat",
        }
    }
}

/// Immediate response for an async-to-hub dispatch; the events themselves
/// are only observable on the broadcast stream.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchAck {
    pub device: String,
    pub action: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(LogEvent::output("hello")).unwrap();
        assert_eq!(json["type"], "output");
        assert_eq!(json["line"], "hello");

        let json = serde_json::to_value(LogEvent::heartbeat()).unwrap();
        assert_eq!(json["type"], "heartbeat");
    }

    #[test]
    fn match_event_uses_match_tag_and_omits_empty_fields() {
        let json = serde_json::to_value(LogEvent::matched("Lamp", "On", None, None)).unwrap();
        assert_eq!(json["type"], "match");
        assert_eq!(json["device_name"], "Lamp");
        assert!(json.get("confidence").is_none());
    }

    #[test]
    fn non_ascii_is_not_escaped() {
        let text = serde_json::to_string(&LogEvent::voice("打开空调")).unwrap();
        assert!(text.contains("打开空调"));
    }
}
