use async_trait::async_trait;
use reqwest::header;
use serde_json::Value;
use uuid::Uuid;

use crate::core::error::{Error, Result};
use crate::core::voice::ConversationRecord;

const CONVERSATION_URL: &str =
    "https://userprofile.mina.mi.com/device_profile/v2/conversation";
const VENDOR_USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 10; 000; wv) AppleWebKit/537.36 \
     (KHTML, like Gecko) Version/4.0 Chrome/119.0.6045.193 Mobile Safari/537.36 \
     /XiaoMi/HybridView/ micoSoundboxApp/i appVersion/A_2.4.40";
const VENDOR_REFERER: &str = "https://userprofile.mina.mi.com/dialogue-note/index.html";

/// Remote source of recent conversation records; a trait seam so the poller
/// can be exercised with fakes.
#[async_trait]
pub trait ConversationSource: Send + Sync {
    /// Most-recent records first is not guaranteed to be strictly ordered;
    /// callers must not assume monotone timestamps within a page.
    async fn recent(&self, limit: usize) -> Result<Vec<ConversationRecord>>;
}

/// Ready vendor session material. The login protocol itself is an opaque
/// collaborator; these values come from configuration.
#[derive(Debug, Clone)]
pub struct MinaSession {
    pub user_id: String,
    pub service_token: String,
    pub device_id: String,
    pub hardware: Option<String>,
}

/// Conversation client for the vendor speaker cloud.
pub struct MinaClient {
    http: reqwest::Client,
    session: MinaSession,
}

impl MinaClient {
    pub fn new(session: MinaSession) -> Self {
        Self {
            http: reqwest::Client::new(),
            session,
        }
    }

    fn cookie_header(&self) -> String {
        format!(
            "userId={}; serviceToken={}; deviceId={}",
            self.session.user_id, self.session.service_token, self.session.device_id
        )
    }
}

#[async_trait]
impl ConversationSource for MinaClient {
    async fn recent(&self, limit: usize) -> Result<Vec<ConversationRecord>> {
        let mut params = vec![
            ("limit", limit.to_string()),
            ("requestId", Uuid::new_v4().simple().to_string()),
            ("source", "dialogu".to_string()),
        ];
        if let Some(hardware) = &self.session.hardware {
            params.push(("hardware", hardware.clone()));
        }

        let response = self
            .http
            .get(CONVERSATION_URL)
            .query(&params)
            .header(header::COOKIE, self.cookie_header())
            .header(header::USER_AGENT, VENDOR_USER_AGENT)
            .header(header::REFERER, VENDOR_REFERER)
            .send()
            .await?
            .error_for_status()?;

        let body: Value = response.json().await?;
        if body.get("code").and_then(Value::as_i64) != Some(0) {
            return Err(Error::RemoteService(format!(
                "conversation API rejected the request: {body}"
            )));
        }

        // The payload is double-encoded: `data` is a JSON string that itself
        // contains the `records` array.
        let data = body
            .get("data")
            .ok_or_else(|| Error::Parse("conversation response has no data field".into()))?;
        let payload: Value = match data {
            Value::String(raw) => serde_json::from_str(raw)?,
            other => other.clone(),
        };
        let records = payload
            .get("records")
            .cloned()
            .ok_or_else(|| Error::Parse("conversation payload has no records field".into()))?;
        Ok(serde_json::from_value(records)?)
    }
}
