use station_core::config::ConfigError;
use station_core::station::{ErrorDetail, StationError};
use thiserror_no_std::Error;

#[derive(Error, Debug)]
pub enum FirmwareError {
    #[error("invalid WiFi configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("radio initialization failed: {0}")]
    RadioInit(ErrorDetail),
    #[error("WiFi driver setup failed: {0}")]
    WifiSetup(ErrorDetail),
    #[error("WiFi station error: {0}")]
    Station(#[from] StationError),
}
