//! Task watchdog (TWDT) user for the OTA task.
//!
//! The OTA task blocks inside socket reads for up to the HTTP timeout, so the
//! watchdog period is stretched past that before the user is registered.

use anyhow::Result;
use esp_idf_svc::sys::{
    esp, esp_task_wdt_add_user, esp_task_wdt_config_t, esp_task_wdt_delete_user,
    esp_task_wdt_init, esp_task_wdt_reconfigure, esp_task_wdt_reset_user,
    esp_task_wdt_user_handle_t,
};
use log::{debug, error, info};
use std::ffi::CStr;
use std::time::Duration;

/// Set the TWDT period, initializing the watchdog if the bootloader config left it off.
#[allow(clippy::cast_possible_truncation)]
pub fn configure(timeout: Duration) -> Result<()> {
    let config = esp_task_wdt_config_t {
        timeout_ms: timeout.as_millis() as u32,
        // Keep watching the idle task of core 0
        idle_core_mask: 1,
        trigger_panic: true,
    };

    // SAFETY: config outlives both calls, ESP-IDF copies it
    if esp!(unsafe { esp_task_wdt_reconfigure(&config) }).is_err() {
        esp!(unsafe { esp_task_wdt_init(&config) })?;
    }
    info!("Watchdog: timeout set to {} s", timeout.as_secs());
    Ok(())
}

/// A handle to a registered watchdog user. Automatically unregisters on drop.
pub struct WatchdogHandle {
    handle: esp_task_wdt_user_handle_t,
    name: &'static CStr,
}

impl WatchdogHandle {
    /// Register a new watchdog user with the given name.
    pub fn register(name: &'static CStr) -> Result<Self> {
        let mut handle: esp_task_wdt_user_handle_t = std::ptr::null_mut();

        // SAFETY: name is 'static and handle is a valid out pointer
        esp!(unsafe { esp_task_wdt_add_user(name.as_ptr(), &mut handle) })?;
        debug!("Watchdog: registered user '{name:?}'");
        Ok(Self { handle, name })
    }

    /// Reset this user's countdown.
    pub fn feed(&self) {
        // SAFETY: handle stays registered until drop
        let result = unsafe { esp_task_wdt_reset_user(self.handle) };
        if result != 0 {
            error!("Watchdog: failed to feed '{:?}'", self.name);
        }
    }
}

impl Drop for WatchdogHandle {
    fn drop(&mut self) {
        debug!("Watchdog: unregistering user '{:?}'", self.name);
        // SAFETY: handle was returned by esp_task_wdt_add_user
        let result = unsafe { esp_task_wdt_delete_user(self.handle) };
        if result != 0 {
            error!(
                "Watchdog: failed to unregister '{:?}': error code {result}",
                self.name
            );
        }
    }
}
