//! esp-radio backend for the station connection manager
//!
//! The [`WifiController`](esp_radio::wifi::WifiController) is owned by
//! [`tasks::radio_task`]. The connection manager reaches it through a
//! [`WifiLink`], and radio and DHCP progress flows back as
//! [`StationEvent`](station_core::station::StationEvent)s.

pub mod tasks;

use core::net::Ipv4Addr;

use embassy_net::{HardwareAddress, Stack};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use esp_radio::wifi::{AuthMethod, ClientConfig, ModeConfig, WifiError};

use station_core::config::{AuthMode, ConnectionConfig};
use station_core::station::{LinkInfo, NetInterface, RadioLink, Station};

pub use tasks::*;

/// Command link between the connection manager and the radio task.
pub type WifiLink = RadioLink<CriticalSectionRawMutex, WifiError>;

/// Connection manager bound to the embassy-net station interface.
pub type WifiStation = Station<CriticalSectionRawMutex, StackInterface>;

/// Station interface of the embassy-net stack.
#[derive(Clone, Copy)]
pub struct StackInterface(pub Stack<'static>);

impl NetInterface for StackInterface {
    fn ipv4_address(&self) -> Option<Ipv4Addr> {
        self.0.config_v4().map(|config| config.address.address())
    }

    fn link_info(&self) -> Option<LinkInfo> {
        let config = self.0.config_v4()?;
        let mac = match self.0.hardware_address() {
            HardwareAddress::Ethernet(mac) => Some(mac.0),
            #[allow(unreachable_patterns)]
            _ => None,
        };
        let mut info = LinkInfo {
            address: config.address.address(),
            prefix_len: config.address.prefix_len(),
            gateway: config.gateway,
            dns_servers: Default::default(),
            mac,
        };
        for dns in &config.dns_servers {
            let _ = info.dns_servers.push(*dns);
        }
        Some(info)
    }
}

/// Minimum security the radio accepts when joining.
pub fn auth_method(mode: AuthMode) -> AuthMethod {
    match mode {
        AuthMode::Open => AuthMethod::None,
        AuthMode::Wep => AuthMethod::Wep,
        AuthMode::WpaPersonal => AuthMethod::Wpa,
        AuthMode::Wpa2Personal => AuthMethod::Wpa2Personal,
        AuthMode::WpaWpa2Personal => AuthMethod::WpaWpa2Personal,
        AuthMode::Wpa3Personal => AuthMethod::Wpa3Personal,
        AuthMode::Wpa2Wpa3Personal => AuthMethod::Wpa2Wpa3Personal,
    }
}

/// Station mode configuration for `config`.
pub fn mode_config(config: &ConnectionConfig) -> ModeConfig {
    ModeConfig::Client(
        ClientConfig::default()
            .with_ssid(config.ssid().into())
            .with_password(config.password().into())
            .with_auth_method(auth_method(config.auth_mode())),
    )
}
