//! Hardware-independent core of the WiFi station firmware
//!
//! The connection manager, its configuration and the small helpers the
//! board binaries share. Everything here is `no_std` and free of ESP32
//! types so it builds on desktop hosts for the simulator and the tests; the
//! firmware crate plugs the real radio in through the traits in
//! [`station::driver`].

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod event_group;
pub mod hexdump;
pub mod led;
pub mod math;
pub mod station;
pub mod timing;
