use crate::watchdog::WatchdogHandle;
use esp_idf_hal::delay::FreeRtos;
use otaloop_lib::ports::Clock;
use std::time::Instant;

/// Uptime from `std::time`, waits through the FreeRTOS scheduler.
///
/// Every call is a point where the OTA task is alive, so both feed the watchdog.
pub struct TaskClock {
    boot: Instant,
    watchdog: WatchdogHandle,
}

impl TaskClock {
    pub fn new(watchdog: WatchdogHandle) -> Self {
        Self {
            boot: Instant::now(),
            watchdog,
        }
    }
}

impl Clock for TaskClock {
    #[allow(clippy::cast_possible_truncation)]
    fn now_ms(&self) -> u64 {
        self.watchdog.feed();
        self.boot.elapsed().as_millis() as u64
    }

    fn sleep_ms(&self, ms: u32) {
        self.watchdog.feed();
        FreeRtos::delay_ms(ms);
        self.watchdog.feed();
    }
}
