//! Helper for spawning threads with FreeRTOS task names
//!
//! Rust's `std::thread::Builder::name()` sets the pthread name after creation,
//! but ESP-IDF creates the FreeRTOS task at pthread creation time with the
//! default name. `ThreadSpawnConfiguration` sets the name before spawning.

use esp_idf_hal::task::thread::ThreadSpawnConfiguration;
use std::ffi::CStr;
use std::thread::JoinHandle;

/// Spawn a thread with a FreeRTOS task name and an explicit stack size.
///
/// FreeRTOS task names are limited to 16 characters including the null terminator.
///
/// # Errors
/// Fails if the spawn configuration cannot be applied or the task cannot be created.
pub fn spawn_named<F, T>(
    name: &'static CStr,
    stack_size: usize,
    f: F,
) -> anyhow::Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    // Get current config to restore after spawn
    let prev_conf = ThreadSpawnConfiguration::get();

    ThreadSpawnConfiguration {
        name: Some(name.to_bytes_with_nul()),
        stack_size,
        ..Default::default()
    }
    .set()?;

    let handle = std::thread::Builder::new().stack_size(stack_size).spawn(f);

    // Restore previous config (or default if none was set)
    ThreadSpawnConfiguration::set(&prev_conf.unwrap_or_default())?;

    Ok(handle?)
}
