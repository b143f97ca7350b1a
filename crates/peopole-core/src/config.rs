use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PeopoleError, Result};

/// Top-level configuration for the Peopole chat server.
///
/// Loaded from `peopole.toml` by default, then overlaid with environment
/// variables. Each section corresponds to one subsystem.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeopoleConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub organization: OrganizationConfig,
}

impl PeopoleConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PeopoleConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| PeopoleError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Overlay values from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Overlay values from an arbitrary variable lookup.
    ///
    /// Empty values are ignored. An unparseable `PORT` is logged and skipped.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("GROQ_API_KEY") {
            self.upstream.api_key = Some(key);
        }
        if let Some(token) = get("ADMIN_TOKEN").or_else(|| get("ADMIN_PASSWORD")) {
            self.server.admin_token = Some(token);
        }
        if let Some(origin) = get("ALLOWED_ORIGIN") {
            self.server.allowed_origin = origin;
        }
        if let Some(port) = get("PORT") {
            match port.trim().parse::<u16>() {
                Ok(p) => self.server.port = p,
                Err(_) => warn!(value = %port, "Ignoring invalid PORT"),
            }
        }
        if let Some(key) = get("VAPID_PUBLIC_KEY") {
            self.push.vapid_public_key = Some(key);
        }
        if let Some(pem) = get("VAPID_PRIVATE_KEY") {
            self.push.vapid_private_key_pem = Some(pem);
        }
        if let Some(dir) = get("PEOPOLE_DATA_DIR") {
            self.general.data_dir = dir;
        }
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory holding the JSON stores.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// CORS origin allowed to call the API; `*` allows any.
    pub allowed_origin: String,
    /// Shared secret for the admin surface. Admin calls are refused when unset.
    pub admin_token: Option<String>,
    /// Chat requests allowed per client IP per minute; 0 disables the limit.
    pub chat_requests_per_minute: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            allowed_origin: "*".to_string(),
            admin_token: None,
            chat_requests_per_minute: 30,
        }
    }
}

/// Upstream text-completion provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Bearer key. Requests route to the fallback responder when unset.
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    /// Overall request timeout; the HTTP client default applies when unset.
    pub timeout_secs: Option<u64>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            temperature: 0.7,
            max_tokens: 1024,
            top_p: 0.9,
            timeout_secs: None,
        }
    }
}

/// In-memory conversation session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Most recent messages retained per session.
    pub max_messages: usize,
    /// Idle time after which a session is evicted by the sweep.
    pub ttl_minutes: u32,
    /// Interval between sweeps.
    pub sweep_interval_minutes: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_messages: 30,
            ttl_minutes: 180,
            sweep_interval_minutes: 30,
        }
    }
}

/// Streaming relay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Pause between words when replaying a canned answer.
    pub replay_delay_ms: u64,
    /// JSON file replacing the built-in FAQ table.
    pub faq_path: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            replay_delay_ms: 35,
            faq_path: None,
        }
    }
}

/// Retention caps for the JSON stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub max_inquiries: usize,
    pub max_events: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_inquiries: 2000,
            max_events: 10_000,
        }
    }
}

/// Web push (VAPID) settings. Push is disabled unless both keys are set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// Base64 URL-safe public key handed to browsers.
    pub vapid_public_key: Option<String>,
    /// PEM-encoded private key used to sign push requests.
    pub vapid_private_key_pem: Option<String>,
    /// Contact URI placed in the VAPID `sub` claim.
    pub subject: Option<String>,
}

impl PushConfig {
    pub fn is_configured(&self) -> bool {
        self.vapid_public_key.is_some() && self.vapid_private_key_pem.is_some()
    }
}

/// Organization facts rendered into FAQ answers, prompts and fallbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganizationConfig {
    pub name: String,
    pub assistant_name: String,
    pub city: String,
    pub whatsapp: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub office_hours: String,
    pub payment_methods: String,
    pub consultation_fee: String,
}

impl Default for OrganizationConfig {
    fn default() -> Self {
        Self {
            name: "Earth Solutions Visa Zone".to_string(),
            assistant_name: "Peopole AI".to_string(),
            city: "Dhaka".to_string(),
            whatsapp: "+8801700000000".to_string(),
            phone: "+8801700000000".to_string(),
            email: "info@earthsolutionsvisa.com".to_string(),
            address: "Dhanmondi, Dhaka, Bangladesh".to_string(),
            office_hours: "Saturday to Thursday, 10:00 AM to 7:00 PM".to_string(),
            payment_methods: "bKash, Nagad, bank transfer or cash at the office".to_string(),
            consultation_fee: "BDT 2,000".to_string(),
        }
    }
}
