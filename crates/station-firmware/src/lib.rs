//! ESP32-S3 firmware modules for the WiFi station
//!
//! Everything that touches esp-hal or esp-radio lives here: the build-time
//! configuration, radio and network stack bring-up, and the tasks that
//! connect the real WiFi controller to the `station_core` connection
//! manager.

#![no_std]

pub mod config;
pub mod error;
pub mod hardware;
pub mod wifi;
