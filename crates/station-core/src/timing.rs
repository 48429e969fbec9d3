//! Uptime and delay helpers

use embassy_time::{Duration, Instant, Timer};

/// Milliseconds since the time driver started.
pub fn uptime_ms() -> u64 {
    Instant::now().as_millis()
}

pub async fn delay_ms(ms: u64) {
    Timer::after(Duration::from_millis(ms)).await;
}
