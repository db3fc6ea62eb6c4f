pub mod client;
pub mod intent;
pub mod manager;
pub mod pipeline;
pub mod poller;

use serde::{Deserialize, Serialize};

/// One raw conversation record as the vendor cloud reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    #[serde(default)]
    pub query: String,
    /// Milliseconds since epoch.
    #[serde(default)]
    pub time: i64,
    #[serde(default, rename = "requestId")]
    pub request_id: String,
}

/// A genuinely-new utterance, produced at most once per remote record.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceMessage {
    pub text: String,
    /// Milliseconds since epoch.
    pub timestamp: i64,
    pub request_id: String,
}

impl From<&ConversationRecord> for VoiceMessage {
    fn from(record: &ConversationRecord) -> Self {
        Self {
            text: record.query.clone(),
            timestamp: record.time,
            request_id: record.request_id.clone(),
        }
    }
}
