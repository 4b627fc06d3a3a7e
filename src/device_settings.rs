use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

/// Digest credentials issued by the TV during pairing.
#[derive(Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: &str, password: &str) -> Self {
        Credentials {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Settings for one TV. Can be created with [`DeviceSettingsBuilder`], or deserialized from a
/// host application's configuration (durations are given as `*_secs` / `*_ms` fields).
///
/// ```
/// let settings: philipstv_manager::DeviceSettings = serde_json::from_str(r#"{
///     "host": "192.168.1.20",
///     "credentials": { "username": "abc", "password": "def" },
///     "poll_interval_secs": 15
/// }"#).unwrap();
///
/// assert_eq!(settings.poll_interval.as_secs(), 15);
/// assert_eq!(settings.https_port, 1926);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    pub host: String,
    pub credentials: Option<Credentials>,
    pub api_version: u8,
    pub https_port: u16,
    pub http_port: u16,
    /// Short calls go over HTTPS (self-signed) when `true`, plain HTTP otherwise.
    pub is_tls: bool,
    #[serde(rename = "startup_delay_secs", deserialize_with = "secs")]
    pub startup_delay: Duration,
    #[serde(rename = "poll_interval_secs", deserialize_with = "secs")]
    pub poll_interval: Duration,
    #[serde(rename = "request_spacing_ms", deserialize_with = "millis")]
    pub request_spacing: Duration,
    #[serde(rename = "request_timeout_secs", deserialize_with = "secs")]
    pub request_timeout: Duration,
    pub long_poll_enabled: bool,
    #[serde(rename = "long_poll_timeout_secs", deserialize_with = "secs")]
    pub long_poll_timeout: Duration,
    #[serde(rename = "long_poll_min_spacing_ms", deserialize_with = "millis")]
    pub long_poll_min_spacing: Duration,
    pub long_poll_failure_ceiling: u32,
    #[serde(rename = "long_poll_backoff_base_secs", deserialize_with = "secs")]
    pub long_poll_backoff_base: Duration,
    #[serde(rename = "long_poll_backoff_max_secs", deserialize_with = "secs")]
    pub long_poll_backoff_max: Duration,
    #[serde(rename = "long_poll_retry_cooldown_secs", deserialize_with = "secs")]
    pub long_poll_retry_cooldown: Duration,
    /// Notification resources which change on their own and never confirm long-polling.
    pub noise_resources: Vec<String>,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        DeviceSettingsBuilder::new("").build()
    }
}

impl DeviceSettings {
    /// Check that the settings describe a usable device.
    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err(String::from("No host specified"));
        }

        if self.poll_interval.is_zero() {
            return Err(String::from("Poll interval must be greater than zero"));
        }

        if self.request_timeout.is_zero() || self.long_poll_timeout.is_zero() {
            return Err(String::from("Request timeouts must be greater than zero"));
        }

        if self.long_poll_failure_ceiling == 0 {
            return Err(String::from("Long-poll failure ceiling must be at least 1"));
        }

        Ok(())
    }
}

fn secs<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_secs)
}

fn millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}

/// Build a [`DeviceSettings`] instance.
///
/// Examples:
/// ```
/// use std::time::Duration;
///
/// use philipstv_manager::DeviceSettingsBuilder;
///
/// // Default device settings
/// DeviceSettingsBuilder::new("192.168.1.20").build();
///
/// // Device settings with overrides
/// DeviceSettingsBuilder::new("192.168.1.20")
///     .with_credentials("abc", "def")
///     .with_poll_interval(Duration::from_secs(30))
///     .with_no_long_poll()
///     .build();
/// ```
pub struct DeviceSettingsBuilder {
    settings: DeviceSettings,
}

impl DeviceSettingsBuilder {
    pub fn new(host: &str) -> Self {
        Self {
            settings: DeviceSettings {
                host: host.into(),
                credentials: None,
                api_version: 6,
                https_port: 1926,
                http_port: 1925,
                is_tls: true,
                startup_delay: Duration::from_secs(5),
                poll_interval: Duration::from_secs(10),
                request_spacing: Duration::from_millis(100),
                request_timeout: Duration::from_secs(5),
                long_poll_enabled: true,
                long_poll_timeout: Duration::from_secs(120),
                long_poll_min_spacing: Duration::from_secs(1),
                long_poll_failure_ceiling: 5,
                long_poll_backoff_base: Duration::from_secs(2),
                long_poll_backoff_max: Duration::from_secs(60),
                long_poll_retry_cooldown: Duration::from_secs(60),
                noise_resources: vec![String::from("context")],
            },
        }
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.settings.credentials = Some(Credentials::new(username, password));
        self
    }

    pub fn with_api_version(mut self, api_version: u8) -> Self {
        self.settings.api_version = api_version;
        self
    }

    pub fn with_ports(mut self, https_port: u16, http_port: u16) -> Self {
        self.settings.https_port = https_port;
        self.settings.http_port = http_port;
        self
    }

    pub fn with_no_tls(mut self) -> Self {
        self.settings.is_tls = false;
        self
    }

    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.settings.startup_delay = delay;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.settings.poll_interval = interval;
        self
    }

    pub fn with_request_spacing(mut self, spacing: Duration) -> Self {
        self.settings.request_spacing = spacing;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.settings.request_timeout = timeout;
        self
    }

    pub fn with_no_long_poll(mut self) -> Self {
        self.settings.long_poll_enabled = false;
        self
    }

    pub fn with_long_poll_timeout(mut self, timeout: Duration) -> Self {
        self.settings.long_poll_timeout = timeout;
        self
    }

    pub fn with_long_poll_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.settings.long_poll_backoff_base = base;
        self.settings.long_poll_backoff_max = max;
        self
    }

    pub fn with_long_poll_failure_ceiling(mut self, ceiling: u32) -> Self {
        self.settings.long_poll_failure_ceiling = ceiling;
        self
    }

    pub fn with_long_poll_retry_cooldown(mut self, cooldown: Duration) -> Self {
        self.settings.long_poll_retry_cooldown = cooldown;
        self
    }

    pub fn with_noise_resources(mut self, resources: &[&str]) -> Self {
        self.settings.noise_resources = resources.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn build(self) -> DeviceSettings {
        self.settings
    }
}

// ================================================================================================
// Tests
