use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::core::voice::client::MinaSession;

/// Top-level daemon configuration. Loaded from a TOML file, then overlaid
/// with environment variables so containerized deployments can configure
/// everything without a file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    /// Directory holding the JSON device and schedule files.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub voice: VoiceSettings,

    #[serde(default)]
    pub intent: IntentSettings,

    #[serde(default)]
    pub executor: ExecutorSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Vendor speaker session material plus polling cadence.
#[derive(Debug, Clone, Deserialize)]
pub struct VoiceSettings {
    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default)]
    pub service_token: Option<String>,

    #[serde(default)]
    pub device_id: Option<String>,

    #[serde(default)]
    pub hardware: Option<String>,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntentSettings {
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_intent_base_url")]
    pub base_url: String,

    #[serde(default = "default_intent_model")]
    pub model: String,
}

/// The external automation program dispatches are handed to.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorSettings {
    #[serde(default = "default_executor_program")]
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub workdir: Option<PathBuf>,

    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    5001
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("datas")
}
fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_intent_base_url() -> String {
    "https://open.bigmodel.cn/api/paas/v4".to_string()
}
fn default_intent_model() -> String {
    "glm-4-flash".to_string()
}
fn default_executor_program() -> String {
    "sh".to_string()
}
fn default_max_concurrent() -> usize {
    8
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            data_dir: default_data_dir(),
            voice: VoiceSettings::default(),
            intent: IntentSettings::default(),
            executor: ExecutorSettings::default(),
        }
    }
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            user_id: None,
            service_token: None,
            device_id: None,
            hardware: None,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for IntentSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_intent_base_url(),
            model: default_intent_model(),
        }
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            program: default_executor_program(),
            args: Vec::new(),
            workdir: None,
            max_concurrent: default_max_concurrent(),
        }
    }
}

/// Template values like "your-user-id" left in a config file count as
/// absent, not as credentials.
fn usable(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.starts_with("your-"))
}

impl VoiceSettings {
    pub fn is_configured(&self) -> bool {
        self.session().is_some()
    }

    /// Ready session material, or `None` with the first missing field named
    /// so startup logs can say what to fill in.
    pub fn session(&self) -> Option<MinaSession> {
        Some(MinaSession {
            user_id: usable(&self.user_id)?.to_string(),
            service_token: usable(&self.service_token)?.to_string(),
            device_id: usable(&self.device_id)?.to_string(),
            hardware: usable(&self.hardware).map(str::to_string),
        })
    }

    pub fn missing_field(&self) -> Option<&'static str> {
        if usable(&self.user_id).is_none() {
            Some("user_id")
        } else if usable(&self.service_token).is_none() {
            Some("service_token")
        } else if usable(&self.device_id).is_none() {
            Some("device_id")
        } else {
            None
        }
    }
}

impl AppConfig {
    /// File (if present) first, environment second. A missing file is the
    /// normal zero-config case; a file that fails to parse is an error.
    pub fn load() -> Result<Self> {
        let path = env::var("FLOWHOME_CONFIG").unwrap_or_else(|_| "flowhome.toml".to_string());
        let mut config = if Path::new(&path).exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config file {path}"))?;
            let config: AppConfig = toml::from_str(&content)
                .with_context(|| format!("failed to parse config file {path}"))?;
            info!(path, "configuration loaded");
            config
        } else {
            info!("no configuration file, using defaults");
            AppConfig::default()
        };
        config.apply_env()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(host) = env::var("FLOWHOME_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = env::var("FLOWHOME_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("invalid FLOWHOME_PORT: {port}"))?;
        }
        if let Ok(dir) = env::var("FLOWHOME_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(v) = env::var("MI_USER_ID") {
            self.voice.user_id = Some(v);
        }
        if let Ok(v) = env::var("MI_SERVICE_TOKEN") {
            self.voice.service_token = Some(v);
        }
        if let Ok(v) = env::var("MI_DEVICE_ID") {
            self.voice.device_id = Some(v);
        }
        if let Ok(v) = env::var("MI_HARDWARE") {
            self.voice.hardware = Some(v);
        }
        if let Ok(v) = env::var("POLL_INTERVAL_MS") {
            self.voice.poll_interval_ms = v
                .parse()
                .with_context(|| format!("invalid POLL_INTERVAL_MS: {v}"))?;
        }
        if let Ok(v) = env::var("GLM_API_KEY") {
            self.intent.api_key = Some(v);
        }
        if let Ok(v) = env::var("GLM_API_BASE_URL") {
            self.intent.base_url = v;
        }
        if let Ok(v) = env::var("GLM_MODEL") {
            self.intent.model = v;
        }
        if let Ok(v) = env::var("AUTOMATION_EXECUTABLE") {
            self.executor.program = v;
        }
        Ok(())
    }
}
