//! Station connection configuration
//!
//! [`ConnectionConfig`] is the validated, immutable form used by the
//! connection manager. [`StationSettings`] is the raw, borrowed form that
//! comes out of a settings file or build-time environment before validation.

use core::fmt;
use core::str::FromStr;

use embassy_time::Duration;
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

/// Longest SSID accepted by 802.11.
pub const SSID_MAX_LEN: usize = 32;
/// Longest WPA passphrase.
pub const PASSWORD_MAX_LEN: usize = 64;

pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

pub type Ssid = heapless::String<SSID_MAX_LEN>;
pub type Password = heapless::String<PASSWORD_MAX_LEN>;

/// Minimum authentication strength the station accepts from an access point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AuthMode {
    Open,
    Wep,
    WpaPersonal,
    #[default]
    Wpa2Personal,
    WpaWpa2Personal,
    Wpa3Personal,
    Wpa2Wpa3Personal,
}

impl AuthMode {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Wep => "WEP",
            Self::WpaPersonal => "WPA_PSK",
            Self::Wpa2Personal => "WPA2_PSK",
            Self::WpaWpa2Personal => "WPA_WPA2_PSK",
            Self::Wpa3Personal => "WPA3_PSK",
            Self::Wpa2Wpa3Personal => "WPA2_WPA3_PSK",
        }
    }
}

impl FromStr for AuthMode {
    type Err = ConfigError;

    /// Accepts the labels from [`AuthMode::label`], case-insensitively, with
    /// or without a `WIFI_AUTH_` prefix.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let name = match trimmed.get(..10) {
            Some(prefix) if prefix.eq_ignore_ascii_case("WIFI_AUTH_") => &trimmed[10..],
            _ => trimmed,
        };

        [
            Self::Open,
            Self::Wep,
            Self::WpaPersonal,
            Self::Wpa2Personal,
            Self::WpaWpa2Personal,
            Self::Wpa3Personal,
            Self::Wpa2Wpa3Personal,
        ]
        .into_iter()
        .find(|mode| mode.label().eq_ignore_ascii_case(name))
        .ok_or(ConfigError::UnknownAuthMode)
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("SSID must not be empty")]
    EmptySsid,
    #[error("SSID is longer than 32 bytes")]
    SsidTooLong,
    #[error("password must not be empty")]
    EmptyPassword,
    #[error("password is longer than 64 bytes")]
    PasswordTooLong,
    #[error("connect timeout must be greater than zero")]
    ZeroTimeout,
    #[error("unknown authentication mode")]
    UnknownAuthMode,
    #[error("invalid number: {0}")]
    InvalidNumber(&'static str),
}

/// Validated configuration for one station.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    ssid: Ssid,
    password: Password,
    auth_mode: AuthMode,
    max_retries: u32,
    connect_timeout: Duration,
}

impl ConnectionConfig {
    /// Build a configuration with default auth mode, retry budget and timeout.
    pub fn new(ssid: &str, password: &str) -> Result<Self, ConfigError> {
        if ssid.is_empty() {
            return Err(ConfigError::EmptySsid);
        }
        if password.is_empty() {
            return Err(ConfigError::EmptyPassword);
        }

        Ok(Self {
            ssid: Ssid::from_str(ssid).map_err(|_| ConfigError::SsidTooLong)?,
            password: Password::from_str(password).map_err(|_| ConfigError::PasswordTooLong)?,
            auth_mode: AuthMode::default(),
            max_retries: DEFAULT_MAX_RETRIES,
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
        })
    }

    pub fn with_auth_mode(mut self, auth_mode: AuthMode) -> Self {
        self.auth_mode = auth_mode;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Result<Self, ConfigError> {
        if timeout.as_ticks() == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        self.connect_timeout = timeout;
        Ok(self)
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn auth_mode(&self) -> AuthMode {
        self.auth_mode
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

// The passphrase never reaches logs.
impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("ssid", &self.ssid)
            .field("password", &"<redacted>")
            .field("auth_mode", &self.auth_mode)
            .field("max_retries", &self.max_retries)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// Unvalidated station settings as they appear in a settings file.
#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(bound(deserialize = "'de: 'a"))]
pub struct StationSettings<'a> {
    pub wifi: WifiSettings<'a>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct WifiSettings<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
    #[serde(default)]
    pub auth_mode: Option<AuthMode>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,
}

impl TryFrom<&WifiSettings<'_>> for ConnectionConfig {
    type Error = ConfigError;

    fn try_from(settings: &WifiSettings<'_>) -> Result<Self, Self::Error> {
        ConnectionConfig::new(settings.ssid, settings.password)?
            .with_auth_mode(settings.auth_mode.unwrap_or_default())
            .with_max_retries(settings.max_retries.unwrap_or(DEFAULT_MAX_RETRIES))
            .with_connect_timeout(Duration::from_millis(
                settings
                    .connect_timeout_ms
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS),
            ))
    }
}

/// Build a configuration from the textual values baked in at build time.
///
/// Optional values fall back to the defaults when `None`.
pub fn from_env_values(
    ssid: &str,
    password: &str,
    auth_mode: Option<&str>,
    max_retries: Option<&str>,
    connect_timeout_ms: Option<&str>,
) -> Result<ConnectionConfig, ConfigError> {
    let auth_mode = auth_mode.map(AuthMode::from_str).transpose()?;
    let max_retries = max_retries
        .map(|value| value.trim().parse::<u32>())
        .transpose()
        .map_err(|_| ConfigError::InvalidNumber("WIFI_MAX_RETRY"))?;
    let connect_timeout_ms = connect_timeout_ms
        .map(|value| value.trim().parse::<u64>())
        .transpose()
        .map_err(|_| ConfigError::InvalidNumber("WIFI_CONNECT_TIMEOUT_MS"))?;

    ConnectionConfig::try_from(&WifiSettings {
        ssid,
        password,
        auth_mode,
        max_retries,
        connect_timeout_ms,
    })
}
