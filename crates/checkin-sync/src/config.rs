//! # Scanner Configuration
//!
//! Configuration management for the check-in engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     CHECKIN_SERVICE_URL=https://events.example.com/api                 │
//! │     CHECKIN_CONTEXT_ID=session-7                                       │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/scanner/scanner.toml (Linux)                             │
//! │     ~/Library/Application Support/com.checkin.scanner/scanner.toml     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     500 ms decode interval, 2000 ms cool-down, 640x480                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The device identifier is not generated here: when `[device].id` is
//! absent, [`DeviceIdentity`](crate::identity::DeviceIdentity) loads or
//! creates one in the database.
//!
//! ## Configuration File Format
//! ```toml
//! # scanner.toml
//! [device]
//! name = "Door A"
//!
//! [service]
//! base_url = "https://events.example.com/api"
//! api_token = "..."
//! request_timeout_secs = 10
//!
//! [capture]
//! decode_interval_ms = 500
//! cooldown_ms = 2000
//!
//! [queue]
//! stuck_after_attempts = 10
//!
//! [connectivity]
//! probe_enabled = true
//! probe_interval_secs = 5
//!
//! [context]
//! default_id = "session-7"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use checkin_core::{
    DEFAULT_CAPTURE_HEIGHT, DEFAULT_CAPTURE_WIDTH, DEFAULT_COOLDOWN_MS,
    DEFAULT_DECODE_INTERVAL_MS, DEFAULT_STUCK_AFTER_ATTEMPTS,
};

use crate::error::{CheckInError, CheckInResult};

// =============================================================================
// Device Configuration
// =============================================================================

/// Configuration for this device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Fixed device identifier. When unset, a UUID v4 is generated once and
    /// kept in the database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Human-readable device name (e.g., "Door A", "Registration desk").
    #[serde(default = "default_device_name")]
    pub name: String,
}

fn default_device_name() -> String {
    "Check-In Scanner".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: None,
            name: default_device_name(),
        }
    }
}

// =============================================================================
// Service Settings
// =============================================================================

/// Remote check-in service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Base URL of the check-in API. Check-ins are posted to
    /// `{base_url}/contexts/{contextId}/check-ins`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token sent with every request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    /// Whole-request timeout (seconds). A timeout is a transient failure.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// TCP connect timeout (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_connect_timeout() -> u64 {
    5
}

impl Default for ServiceSettings {
    fn default() -> Self {
        ServiceSettings {
            base_url: default_base_url(),
            api_token: None,
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl ServiceSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

// =============================================================================
// Capture Settings
// =============================================================================

/// Camera capture and decode cadence.
///
/// ## Timing
/// ```text
/// tick   tick   tick(decode ok)          tick   tick
///  │ 500ms │ 500ms │◄──── cool-down 2000ms ────►│ 500ms │
///  ▼       ▼       ▼   (no decode attempts)      ▼       ▼
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSettings {
    /// Interval between decode attempts (milliseconds).
    #[serde(default = "default_decode_interval")]
    pub decode_interval_ms: u64,

    /// Pause after a successful decode (milliseconds).
    #[serde(default = "default_cooldown")]
    pub cooldown_ms: u64,

    /// Requested frame width.
    #[serde(default = "default_width")]
    pub width: u32,

    /// Requested frame height.
    #[serde(default = "default_height")]
    pub height: u32,
}

fn default_decode_interval() -> u64 {
    DEFAULT_DECODE_INTERVAL_MS
}

fn default_cooldown() -> u64 {
    DEFAULT_COOLDOWN_MS
}

fn default_width() -> u32 {
    DEFAULT_CAPTURE_WIDTH
}

fn default_height() -> u32 {
    DEFAULT_CAPTURE_HEIGHT
}

impl Default for CaptureSettings {
    fn default() -> Self {
        CaptureSettings {
            decode_interval_ms: default_decode_interval(),
            cooldown_ms: default_cooldown(),
            width: default_width(),
            height: default_height(),
        }
    }
}

impl CaptureSettings {
    pub fn decode_interval(&self) -> Duration {
        Duration::from_millis(self.decode_interval_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

// =============================================================================
// Queue Settings
// =============================================================================

/// Offline queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Failed replays after which an entry is reported as stuck.
    /// Entries are never dropped automatically. 0 disables the report.
    #[serde(default = "default_stuck_after")]
    pub stuck_after_attempts: u32,
}

fn default_stuck_after() -> u32 {
    DEFAULT_STUCK_AFTER_ATTEMPTS
}

impl Default for QueueSettings {
    fn default() -> Self {
        QueueSettings {
            stuck_after_attempts: default_stuck_after(),
        }
    }
}

// =============================================================================
// Connectivity Settings
// =============================================================================

/// Reachability probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivitySettings {
    /// Probe the service host periodically. When disabled, connectivity only
    /// changes through explicit reports.
    #[serde(default = "default_true")]
    pub probe_enabled: bool,

    /// Interval between probes (seconds).
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,

    /// Connect timeout for one probe (seconds).
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_probe_interval() -> u64 {
    5
}

fn default_probe_timeout() -> u64 {
    3
}

impl Default for ConnectivitySettings {
    fn default() -> Self {
        ConnectivitySettings {
            probe_enabled: true,
            probe_interval_secs: default_probe_interval(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

impl ConnectivitySettings {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

// =============================================================================
// Context Settings
// =============================================================================

/// Check-in context selected at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextSettings {
    /// Event or session scans are checked into until the operator picks
    /// another.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_id: Option<String>,
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete scanner configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckInConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub service: ServiceSettings,

    #[serde(default)]
    pub capture: CaptureSettings,

    #[serde(default)]
    pub queue: QueueSettings,

    #[serde(default)]
    pub connectivity: ConnectivitySettings,

    #[serde(default)]
    pub context: ContextSettings,
}

impl CheckInConfig {
    /// Creates a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (scanner.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> CheckInResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading scanner config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> CheckInResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| CheckInError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CheckInError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| CheckInError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Scanner config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> CheckInResult<()> {
        if let Some(ref id) = self.device.id {
            if id.trim().is_empty() {
                return Err(CheckInError::MissingDeviceId);
            }
        }

        self.service_url()?;

        if self.capture.decode_interval_ms == 0 {
            return Err(CheckInError::InvalidConfig(
                "decode_interval_ms must be greater than 0".into(),
            ));
        }

        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(CheckInError::InvalidConfig(
                "capture width and height must be greater than 0".into(),
            ));
        }

        if self.connectivity.probe_enabled && self.connectivity.probe_interval_secs == 0 {
            return Err(CheckInError::InvalidConfig(
                "probe_interval_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Parses the service base URL. Only http and https are accepted.
    pub fn service_url(&self) -> CheckInResult<Url> {
        let url = Url::parse(&self.service.base_url)?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(CheckInError::InvalidUrl(format!(
                "Service URL must start with http:// or https://, got scheme '{}'",
                other
            ))),
        }
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from any key lookup. Unparseable numbers are
    /// ignored with a warning.
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(id) = lookup("CHECKIN_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.device.id = Some(id);
        }

        if let Some(name) = lookup("CHECKIN_DEVICE_NAME") {
            self.device.name = name;
        }

        if let Some(url) = lookup("CHECKIN_SERVICE_URL") {
            debug!(url = %url, "Overriding service URL from environment");
            self.service.base_url = url;
        }

        if let Some(token) = lookup("CHECKIN_API_TOKEN") {
            self.service.api_token = Some(token);
        }

        if let Some(context) = lookup("CHECKIN_CONTEXT_ID") {
            debug!(context_id = %context, "Overriding default context from environment");
            self.context.default_id = Some(context);
        }

        if let Some(ms) = lookup("CHECKIN_DECODE_INTERVAL_MS") {
            match ms.parse::<u64>() {
                Ok(v) => self.capture.decode_interval_ms = v,
                Err(_) => warn!(value = %ms, "Invalid CHECKIN_DECODE_INTERVAL_MS"),
            }
        }

        if let Some(ms) = lookup("CHECKIN_COOLDOWN_MS") {
            match ms.parse::<u64>() {
                Ok(v) => self.capture.cooldown_ms = v,
                Err(_) => warn!(value = %ms, "Invalid CHECKIN_COOLDOWN_MS"),
            }
        }

        if let Some(enabled) = lookup("CHECKIN_PROBE_ENABLED") {
            match enabled.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.connectivity.probe_enabled = true,
                "0" | "false" | "no" | "off" => self.connectivity.probe_enabled = false,
                _ => warn!(value = %enabled, "Invalid CHECKIN_PROBE_ENABLED"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "checkin", "scanner")
            .map(|dirs| dirs.config_dir().join("scanner.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns the configured device ID override, if any.
    pub fn device_id(&self) -> Option<&str> {
        self.device.id.as_deref()
    }

    /// Returns the default check-in context, if any.
    pub fn default_context(&self) -> Option<&str> {
        self.context.default_id.as_deref()
    }
}
