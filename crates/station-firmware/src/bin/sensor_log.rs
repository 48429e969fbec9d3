#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]

use embassy_executor::Spawner;
use esp_hal::clock::CpuClock;
use esp_hal::timer::timg::TimerGroup;
use log::info;
use rtt_target::rprintln;

use station_core::math::{constrain, map_range};
use station_core::timing::{delay_ms, uptime_ms};

const LOG_PERIOD_MS: u64 = 2_000;
/// Full scale of the simulated 10-bit reading.
const RAW_MAX: i32 = 1023;

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rprintln!("PANIC: {}", info);
    loop {}
}

esp_bootloader_esp_idf::esp_app_desc!();

#[esp_rtos::main]
async fn main(_spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("ESP32 Sensor Example");

    loop {
        let now = uptime_ms();
        let raw = (now / 10 % (RAW_MAX as u64 + 1)) as i32;
        let level = constrain(map_range(raw, 0, RAW_MAX, 0, 100), 0, 100);
        info!("Sensor reading at {} ms: raw={} level={}%", now, raw, level);
        delay_ms(LOG_PERIOD_MS).await;
    }
}
