#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_time::{Duration, Timer};
use esp_hal::clock::CpuClock;
use esp_hal::timer::timg::TimerGroup;
use log::{error, info, warn};
use rtt_target::rprintln;
use static_cell::StaticCell;

use station_core::station::{ConnectOutcome, RadioLink, Station};
use station_firmware::config::connection_config;
use station_firmware::error::FirmwareError;
use station_firmware::hardware::{WifiHardware, init_wifi};
use station_firmware::wifi::{
    StackInterface, WifiLink, WifiStation, dhcp_task, net_task, radio_task, station_task,
};

const STATUS_INTERVAL: Duration = Duration::from_secs(5);

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("ESP32 WiFi Station Example");

    let (station, outcome) = connect_station(spawner, peripherals.WIFI)
        .await
        .expect("WiFi bring-up failed");

    if outcome != ConnectOutcome::Success {
        error!("Failed to connect to WiFi: {}", outcome.label());
        loop {
            Timer::after(Duration::from_secs(1)).await;
        }
    }

    match station.ip_address_string() {
        Ok(ip) => info!("WiFi connected successfully, IP: {}", ip),
        Err(e) => warn!("WiFi connected but the address is unavailable: {}", e),
    }

    loop {
        Timer::after(STATUS_INTERVAL).await;
        station.log_status();
    }
}

/// Bring up the radio and the station tasks, then wait for the first
/// connection outcome.
async fn connect_station(
    spawner: Spawner,
    wifi: esp_hal::peripherals::WIFI<'static>,
) -> Result<(&'static WifiStation, ConnectOutcome), FirmwareError> {
    static STATION: StaticCell<WifiStation> = StaticCell::new();
    static LINK: StaticCell<WifiLink> = StaticCell::new();

    let station: &'static WifiStation = STATION.init(Station::new(connection_config()?));
    let link: &'static WifiLink = LINK.init(RadioLink::new());

    let WifiHardware {
        controller,
        stack,
        runner,
    } = init_wifi(wifi)?;

    spawner.must_spawn(net_task(runner));
    spawner.must_spawn(radio_task(controller, link, station));
    spawner.must_spawn(dhcp_task(stack, station));
    spawner.must_spawn(station_task(station, link));

    let outcome = station.connect(link, StackInterface(stack)).await?;
    Ok((station, outcome))
}
