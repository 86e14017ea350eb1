//! Configuration management for slotwatch
//!
//! Engine-wide settings are loaded from environment variables or a TOML file.
//! Per-account settings live in [`account`], one file per account.

pub mod account;

pub use account::{country_name, AccountConfig, COUNTRIES};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default remote host serving the scheduling portal
pub const DEFAULT_HOST: &str = "ais.usvisa-info.com";

/// Default browser user agent sent with every portal request
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Remote portal configuration
    #[serde(default)]
    pub portal: PortalSettings,

    /// Tick cadence and coupling window
    #[serde(default)]
    pub schedule: ScheduleSettings,

    /// Outcome delivery sinks
    #[serde(default)]
    pub notifications: NotificationSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Portal transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalSettings {
    /// Host name, combined with the account country into the base URL
    pub host: String,

    /// Full base URL override (used instead of host + country when set)
    pub base_url: Option<String>,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// User agent string
    pub user_agent: String,

    /// Rate limit (requests per second, per account)
    pub requests_per_second: u32,
}

/// Scheduler cadence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleSettings {
    /// Poll only on minutes divisible by this value
    pub tick_modulus_minutes: u32,

    /// Seconds after the aligned minute during which a poll may start
    pub tick_window_secs: u32,

    /// Sleep step between alignment checks, in milliseconds
    pub step_interval_ms: u64,

    /// Maximum days a secondary slot may precede its primary slot
    pub lead_window_days: i64,
}

/// Notification sink configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    /// Generic JSON webhook URL
    pub webhook_url: Option<String>,

    /// Bearer token sent to the webhook
    pub webhook_token: Option<String>,

    /// Pushover application token
    pub pushover_token: Option<String>,

    /// Pushover user key
    pub pushover_user: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for PortalSettings {
    fn default() -> Self {
        Self {
            host: String::from(DEFAULT_HOST),
            base_url: None,
            request_timeout_secs: 30,
            user_agent: String::from(DEFAULT_USER_AGENT),
            requests_per_second: 2,
        }
    }
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            tick_modulus_minutes: 5,
            tick_window_secs: 10,
            step_interval_ms: 1500,
            lead_window_days: 7,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Settings {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let portal = PortalSettings {
            host: std::env::var("SLOTWATCH_HOST").unwrap_or(defaults.portal.host),
            base_url: env_opt("SLOTWATCH_BASE_URL"),
            request_timeout_secs: env_parse("SLOTWATCH_REQUEST_TIMEOUT")
                .unwrap_or(defaults.portal.request_timeout_secs),
            user_agent: std::env::var("SLOTWATCH_USER_AGENT")
                .unwrap_or(defaults.portal.user_agent),
            requests_per_second: env_parse("SLOTWATCH_RATE_LIMIT")
                .unwrap_or(defaults.portal.requests_per_second),
        };

        let schedule = ScheduleSettings {
            tick_modulus_minutes: env_parse("SLOTWATCH_TICK_MINUTES")
                .unwrap_or(defaults.schedule.tick_modulus_minutes),
            tick_window_secs: env_parse("SLOTWATCH_TICK_WINDOW")
                .unwrap_or(defaults.schedule.tick_window_secs),
            step_interval_ms: env_parse("SLOTWATCH_STEP_MS")
                .unwrap_or(defaults.schedule.step_interval_ms),
            lead_window_days: env_parse("SLOTWATCH_LEAD_DAYS")
                .unwrap_or(defaults.schedule.lead_window_days),
        };

        let notifications = NotificationSettings {
            webhook_url: env_opt("SLOTWATCH_WEBHOOK_URL"),
            webhook_token: env_opt("SLOTWATCH_WEBHOOK_TOKEN"),
            pushover_token: env_opt("PUSHOVER_TOKEN"),
            pushover_user: env_opt("PUSHOVER_USER"),
        };

        let logging = LoggingSettings {
            level: std::env::var("SLOTWATCH_LOG_LEVEL").unwrap_or(defaults.logging.level),
            format: std::env::var("SLOTWATCH_LOG_FORMAT").unwrap_or(defaults.logging.format),
        };

        Ok(Self {
            portal,
            schedule,
            notifications,
            logging,
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let settings: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(settings)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.portal.requests_per_second == 0 {
            anyhow::bail!("requests_per_second must be greater than 0");
        }

        if self.portal.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than 0");
        }

        let modulus = self.schedule.tick_modulus_minutes;
        if modulus == 0 || modulus > 60 {
            anyhow::bail!("tick_modulus_minutes must be between 1 and 60");
        }

        if self.schedule.tick_window_secs == 0 || self.schedule.tick_window_secs > 60 {
            anyhow::bail!("tick_window_secs must be between 1 and 60");
        }

        if self.schedule.step_interval_ms == 0 {
            anyhow::bail!("step_interval_ms must be greater than 0");
        }

        if self.schedule.lead_window_days < 1 {
            anyhow::bail!("lead_window_days must be at least 1");
        }

        if let Some(url) = &self.portal.base_url {
            url::Url::parse(url).with_context(|| format!("Invalid base_url: {url}"))?;
        }

        if let Some(url) = &self.notifications.webhook_url {
            url::Url::parse(url).with_context(|| format!("Invalid webhook_url: {url}"))?;
        }

        if self.notifications.pushover_token.is_some() != self.notifications.pushover_user.is_some()
        {
            anyhow::bail!("pushover_token and pushover_user must be set together");
        }

        Ok(())
    }

    /// Base URL of the portal for a given account country
    pub fn base_url_for(&self, country: &str) -> String {
        match &self.portal.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}/en-{}/niv", self.portal.host, country),
        }
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.portal.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_invalid_tick_modulus() {
        let mut settings = Settings::default();
        settings.schedule.tick_modulus_minutes = 0;
        assert!(settings.validate().is_err());

        settings.schedule.tick_modulus_minutes = 61;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_pushover_requires_both_keys() {
        let mut settings = Settings::default();
        settings.notifications.pushover_token = Some("app-token".into());
        assert!(settings.validate().is_err());

        settings.notifications.pushover_user = Some("user-key".into());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_base_url_for_country() {
        let mut settings = Settings::default();
        assert_eq!(
            settings.base_url_for("ca"),
            "https://ais.usvisa-info.com/en-ca/niv"
        );

        settings.portal.base_url = Some("http://127.0.0.1:8080/".into());
        assert_eq!(settings.base_url_for("ca"), "http://127.0.0.1:8080");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[schedule]\nlead_window_days = 5\n").unwrap();

        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.schedule.lead_window_days, 5);
        assert_eq!(settings.schedule.tick_modulus_minutes, 5);
        assert_eq!(settings.portal.host, DEFAULT_HOST);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn test_request_timeout_conversion() {
        let settings = Settings::default();
        assert_eq!(settings.request_timeout(), Duration::from_secs(30));
    }
}
