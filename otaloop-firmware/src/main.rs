use anyhow::Result;
use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::modem::Modem;
use esp_idf_hal::prelude::*;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::EspWifi;
use log::{debug, error, info, warn};
use otaloop_lib::{UpdateLoop, UpdateStatus};
use std::sync::Arc;

mod clock;
mod config;
mod http;
mod ota;
mod thread_util;
mod watchdog;
mod wifi;

use clock::TaskClock;
use config::Config;
use http::EspHttpClient;
use ota::{OtaPartition, Reboot};
use std::time::Duration;
use watchdog::WatchdogHandle;
use wifi::StationNetwork;

/// HTTP + TLS need far more than the default pthread stack
const OTA_TASK_STACK_SIZE: usize = 16 * 1024;

const STATUS_LOG_INTERVAL_MS: u32 = 30_000;

/// Room for a connect plus one body read, each bounded by the HTTP timeout
const WATCHDOG_TIMEOUT: Duration = Duration::from_secs(http::TIMEOUT.as_secs() * 2);

/// Initialize logging and load configuration from NVS
fn init_logging_and_config(nvs: EspDefaultNvsPartition) -> Result<Config> {
    config::init_nvs(nvs)?;
    let config = Config::load_or_default();

    let level = config.log_level.as_level_filter();
    if let Err(e) = esp_idf_svc::log::set_target_level("*", level) {
        warn!("Failed to set log level: {e}");
    } else {
        info!("Log level set to {:?}", config.log_level);
    }

    Ok(config)
}

/// Body of the OTA task: bring up the collaborators and run the loop forever.
fn ota_task(
    config: &Config,
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs: EspDefaultNvsPartition,
    status_tx: oneshot::Sender<Arc<UpdateStatus>>,
) -> Result<()> {
    let wifi = EspWifi::new(modem, sys_loop, Some(nvs))?;
    let network = StationNetwork::new(wifi, &config.wifi)?;
    let target = OtaPartition::new()?;

    watchdog::configure(WATCHDOG_TIMEOUT)?;
    let clock = TaskClock::new(WatchdogHandle::register(c"ota_task")?);

    let mut update_loop = UpdateLoop::new(
        network,
        EspHttpClient,
        target,
        clock,
        Reboot,
        config.updater.clone(),
        ota::VERSION,
    );
    if status_tx.send(update_loop.status()).is_err() {
        debug!("Status receiver gone");
    }

    update_loop.run();
    Ok(())
}

fn main() -> Result<()> {
    // It is necessary to call this function once. Otherwise some patches to the runtime
    // implemented by esp-idf-sys might not link properly. See https://github.com/esp-rs/esp-idf-template/issues/71
    esp_idf_svc::sys::link_patches();

    // Bind the log crate to the ESP Logging facilities
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("Starting otaloop firmware {}...", ota::VERSION);

    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let config = init_logging_and_config(nvs.clone())?;
    info!(
        "Firmware URL: {}, version URL: {}, check every {} ms",
        config.updater.firmware_url, config.updater.version_url, config.updater.check_interval_ms
    );

    let (status_tx, status_rx) = oneshot::channel();
    let modem = peripherals.modem;
    thread_util::spawn_named(c"ota_task", OTA_TASK_STACK_SIZE, move || {
        if let Err(e) = ota_task(&config, modem, sys_loop, nvs, status_tx) {
            error!("OTA task failed: {e:?}");
        }
    })?;

    let status = match status_rx.recv() {
        Ok(status) => Some(status),
        Err(_) => {
            warn!("OTA task exited before reporting status");
            None
        }
    };

    // Main loop - keep alive
    loop {
        FreeRtos::delay_ms(STATUS_LOG_INTERVAL_MS);
        if let Some(status) = &status {
            info!(
                "OTA status: {} (progress {}%, latest {})",
                status.phase().as_str(),
                status.progress(),
                status.latest_version().as_deref().unwrap_or("unknown")
            );
        }
    }
}
