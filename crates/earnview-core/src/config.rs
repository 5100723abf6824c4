//! Controller and RPC configuration
//!
//! Both structs deserialize from partial JSON; missing keys fall back to the
//! defaults below.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Upper bound for every millisecond interval (one day)
pub const MAX_INTERVAL_MS: u64 = 86_400_000;

/// Upper bound for the hold window (thirty days)
pub const MAX_HOLD_WINDOW_SECS: i64 = 30 * 86_400;

/// What to do when content turns out to be unplayable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailablePolicy {
    /// Surface retry/skip and wait for the user
    #[default]
    Manual,
    /// Advance automatically, bounded by `max_consecutive_auto_skips`
    AutoSkip,
}

/// Playback-reward controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Watch timer tick period (milliseconds)
    pub tick_interval_ms: u64,
    /// Position poll period for stall detection (milliseconds)
    pub stall_poll_interval_ms: u64,
    /// Minimum position advance between polls (seconds)
    pub stall_epsilon_secs: f64,
    /// Buffering duration before the soft warning shows (milliseconds)
    pub stall_warning_after_ms: u64,
    /// Load watchdog window (milliseconds)
    pub load_timeout_ms: u64,
    /// Remaining eligible entries that trigger a background refill
    pub queue_low_water: usize,
    /// Length of the administrative hold window (seconds)
    pub hold_window_secs: i64,
    /// User preference: claim and advance as soon as the target is reached,
    /// and move past recoverable playback errors
    pub auto_skip: bool,
    pub unavailable_policy: UnavailablePolicy,
    /// Upper bound on back-to-back automatic skips of failing content
    pub max_consecutive_auto_skips: u32,
    /// Embed error codes treated as "content unavailable"
    pub unavailable_error_codes: Vec<i64>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            stall_poll_interval_ms: 2000,
            stall_epsilon_secs: 0.25,
            stall_warning_after_ms: 3000,
            load_timeout_ms: 15_000,
            queue_low_water: 2,
            hold_window_secs: 600,
            auto_skip: false,
            unavailable_policy: UnavailablePolicy::Manual,
            max_consecutive_auto_skips: 3,
            // YouTube iframe API: invalid id, not found, embedding disallowed
            unavailable_error_codes: vec![2, 100, 101, 150],
        }
    }
}

impl ControllerConfig {
    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the controller cannot run with
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("tick_interval_ms", self.tick_interval_ms),
            ("stall_poll_interval_ms", self.stall_poll_interval_ms),
            ("load_timeout_ms", self.load_timeout_ms),
        ] {
            if value == 0 {
                return Err(Error::InvalidConfig(format!("{name} must be > 0")));
            }
        }
        for (name, value) in [
            ("tick_interval_ms", self.tick_interval_ms),
            ("stall_poll_interval_ms", self.stall_poll_interval_ms),
            ("stall_warning_after_ms", self.stall_warning_after_ms),
            ("load_timeout_ms", self.load_timeout_ms),
        ] {
            if value > MAX_INTERVAL_MS {
                return Err(Error::InvalidConfig(format!(
                    "{name} must be <= {MAX_INTERVAL_MS}"
                )));
            }
        }
        if !self.stall_epsilon_secs.is_finite() || self.stall_epsilon_secs < 0.0 {
            return Err(Error::InvalidConfig(
                "stall_epsilon_secs must be a non-negative number".into(),
            ));
        }
        if !(0..=MAX_HOLD_WINDOW_SECS).contains(&self.hold_window_secs) {
            return Err(Error::InvalidConfig(format!(
                "hold_window_secs must be between 0 and {MAX_HOLD_WINDOW_SECS}"
            )));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn stall_poll_interval(&self) -> Duration {
        Duration::from_millis(self.stall_poll_interval_ms)
    }

    pub fn stall_warning_after(&self) -> Duration {
        Duration::from_millis(self.stall_warning_after_ms)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    /// Saturates instead of panicking on values `validate` would refuse
    pub fn hold_window(&self) -> chrono::Duration {
        chrono::Duration::try_seconds(self.hold_window_secs.max(0))
            .unwrap_or_else(chrono::Duration::max_value)
    }

    pub fn is_unavailable_code(&self, code: i64) -> bool {
        self.unavailable_error_codes.contains(&code)
    }
}

/// Names of the remote procedures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcFunctions {
    pub claim_reward: String,
    pub fetch_queue: String,
    pub refresh_balance: String,
}

impl Default for RpcFunctions {
    fn default() -> Self {
        Self {
            claim_reward: "claim_video_reward".into(),
            fetch_queue: "get_video_queue".into(),
            refresh_balance: "get_user_balance".into(),
        }
    }
}

/// Remote procedure endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Project base URL, e.g. `https://xyz.example.co/`
    pub base_url: Url,
    /// Public API key sent as `apikey`
    pub api_key: String,
    /// User access token; the API key is used as bearer when absent
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub functions: RpcFunctions,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl RpcConfig {
    pub fn new(base_url: Url, api_key: impl Into<String>) -> Self {
        Self {
            base_url,
            api_key: api_key.into(),
            access_token: None,
            request_timeout_ms: default_request_timeout_ms(),
            functions: RpcFunctions::default(),
        }
    }

    /// Read `EARNVIEW_RPC_URL`, `EARNVIEW_API_KEY` and the optional
    /// `EARNVIEW_ACCESS_TOKEN`
    pub fn from_env() -> Result<Self> {
        let base = std::env::var("EARNVIEW_RPC_URL")
            .map_err(|_| Error::InvalidConfig("EARNVIEW_RPC_URL is not set".into()))?;
        let api_key = std::env::var("EARNVIEW_API_KEY")
            .map_err(|_| Error::InvalidConfig("EARNVIEW_API_KEY is not set".into()))?;
        let base_url = Url::parse(&base)
            .map_err(|e| Error::InvalidConfig(format!("EARNVIEW_RPC_URL: {e}")))?;

        let mut config = Self::new(base_url, api_key);
        config.access_token = std::env::var("EARNVIEW_ACCESS_TOKEN").ok();
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_config_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
        assert_eq!(config.stall_poll_interval(), Duration::from_secs(2));
        assert_eq!(config.load_timeout(), Duration::from_secs(15));
        assert_eq!(config.unavailable_policy, UnavailablePolicy::Manual);
        assert!(config.is_unavailable_code(150));
        assert!(!config.is_unavailable_code(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ControllerConfig =
            serde_json::from_str(r#"{"auto_skip": true, "unavailable_policy": "auto_skip"}"#)
                .unwrap();
        assert!(config.auto_skip);
        assert_eq!(config.unavailable_policy, UnavailablePolicy::AutoSkip);
        assert_eq!(config.load_timeout_ms, 15_000);
    }

    #[test]
    fn test_validate_rejects_zero_tick() {
        let config = ControllerConfig {
            tick_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_bounds_hold_window_and_intervals() {
        for hold_window_secs in [-1, i64::MAX, 9_000_000_000_000, MAX_HOLD_WINDOW_SECS + 1] {
            let config = ControllerConfig {
                hold_window_secs,
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
        }
        let config = ControllerConfig {
            hold_window_secs: MAX_HOLD_WINDOW_SECS,
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let config = ControllerConfig {
            load_timeout_ms: u64::MAX,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
        let config = ControllerConfig {
            stall_warning_after_ms: MAX_INTERVAL_MS + 1,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_hold_window_saturates() {
        let config: ControllerConfig =
            serde_json::from_str(r#"{"hold_window_secs": 9223372036854775807}"#).unwrap();
        assert!(config.validate().is_err());
        assert_eq!(config.hold_window(), chrono::Duration::max_value());
    }

    #[test]
    fn test_rpc_config_json() {
        let config: RpcConfig = serde_json::from_str(
            r#"{"base_url": "https://api.example.com/", "api_key": "anon"}"#,
        )
        .unwrap();
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.functions.claim_reward, "claim_video_reward");
        assert!(config.access_token.is_none());
    }
}
