//! Board bring-up shared by the firmware binaries
//!
//! Radio, network stack and the status LED. Each function hands back owned,
//! `'static` parts ready to be moved into tasks.

use embassy_net::{Runner, Stack, StackResources};
use esp_hal::gpio::{Level, Output, OutputConfig, OutputPin};
use esp_hal::rng::Rng;
use esp_radio::wifi::{WifiController, WifiDevice};
use log::info;
use static_cell::StaticCell;

use station_core::led::Led;
use station_core::station::error_detail;

use crate::error::FirmwareError;

/// Sockets reserved in the network stack. DHCP needs one.
const STACK_SOCKETS: usize = 3;

/// Everything the WiFi station tasks need, created by [`init_wifi`].
pub struct WifiHardware {
    pub controller: WifiController<'static>,
    pub stack: Stack<'static>,
    pub runner: Runner<'static, WifiDevice<'static>>,
}

/// Initialize the radio and a DHCPv4 network stack on the station interface.
///
/// The radio is left stopped and unconfigured; the radio task applies the
/// station configuration when the connection manager asks for it.
pub fn init_wifi(wifi: esp_hal::peripherals::WIFI<'static>) -> Result<WifiHardware, FirmwareError> {
    static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
    static STACK_RESOURCES: StaticCell<StackResources<STACK_SOCKETS>> = StaticCell::new();

    let radio = esp_radio::init().map_err(|e| FirmwareError::RadioInit(error_detail(&e)))?;
    let radio = RADIO.init(radio);

    let (controller, interfaces) = esp_radio::wifi::new(radio, wifi, Default::default())
        .map_err(|e| FirmwareError::WifiSetup(error_detail(&e)))?;

    let rng = Rng::new();
    let seed = (rng.random() as u64) << 32 | rng.random() as u64;

    let (stack, runner) = embassy_net::new(
        interfaces.sta,
        embassy_net::Config::dhcpv4(Default::default()),
        STACK_RESOURCES.init(StackResources::<STACK_SOCKETS>::new()),
        seed,
    );

    info!("WiFi radio and network stack initialized");

    Ok(WifiHardware {
        controller,
        stack,
        runner,
    })
}

/// Status LED on `pin`, initially off.
pub fn status_led(pin: impl OutputPin + 'static) -> Led<Output<'static>> {
    let output = Output::new(pin, Level::Low, OutputConfig::default());
    let Ok(led) = Led::new(output);
    led
}
