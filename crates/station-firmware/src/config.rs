//! Configuration baked in at build time
//!
//! `build.rs` forwards the `WIFI_*` variables from the environment or `.env`
//! into the compiler environment; this module turns them into a validated
//! [`ConnectionConfig`].

use station_core::config::{ConfigError, ConnectionConfig, from_env_values};

pub const WIFI_SSID: &str = env!("WIFI_SSID");
pub const WIFI_PASS: &str = env!("WIFI_PASS");

/// Connection settings compiled into this image.
pub fn connection_config() -> Result<ConnectionConfig, ConfigError> {
    from_env_values(
        WIFI_SSID,
        WIFI_PASS,
        option_env!("WIFI_AUTH_MODE"),
        option_env!("WIFI_MAX_RETRY"),
        option_env!("WIFI_CONNECT_TIMEOUT_MS"),
    )
}
