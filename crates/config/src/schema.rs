//! Config schema types (server, database, automation engine, media limits,
//! handoff thresholds).

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub automation: AutomationConfig,
    pub media: MediaConfig,
    pub handoff: HandoffConfig,
}

/// Gateway server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to "127.0.0.1".
    pub bind: String,
    /// Port to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8484,
        }
    }
}

/// Persistent store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite connection URL. Defaults to `sqlite:<data_dir>/courier.db?mode=rwc`.
    pub url: Option<String>,
}

/// Automation-engine collaboration settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    /// Base URL inbound events are forwarded to (`<base>/chat-message`).
    /// Channels may override this per bot via their config blob.
    pub webhook_base: Option<String>,
    /// Shared key expected on `/internal/*` calls from the engine.
    pub internal_api_key: Option<String>,
}

/// Media pipeline limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Hard cap on downloaded/uploaded attachment size in bytes.
    pub max_download_bytes: u64,
    /// Images wider than this are downscaled to exactly this width.
    pub max_image_width: u32,
    /// JPEG quality used when recompressing downscaled images.
    pub jpeg_quality: u8,
    /// Per-download timeout in seconds.
    pub download_timeout_secs: u64,
    /// Maximum number of concurrent download/transcode jobs.
    pub transcode_concurrency: usize,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            max_download_bytes: 20 * 1024 * 1024,
            max_image_width: 1280,
            jpeg_quality: 80,
            download_timeout_secs: 30,
            transcode_concurrency: 4,
        }
    }
}

/// Handoff gatekeeper thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HandoffConfig {
    /// Silence window after the last agent reply before a conversation
    /// reverts from `human` to `bot`.
    pub timeout_secs: u64,
    /// Number of unanswered customer messages that forces the same reversion.
    pub max_unanswered: i64,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 5 * 60,
            max_unanswered: 3,
        }
    }
}

impl HandoffConfig {
    #[must_use]
    pub fn timeout_ms(&self) -> i64 {
        (self.timeout_secs * 1000) as i64
    }
}
