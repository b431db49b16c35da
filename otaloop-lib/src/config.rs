use serde::{Deserialize, Serialize};

/// Endpoints and timing for the update loop.
///
/// Every field has a default so partial JSON from older firmware still loads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdaterConfig {
    /// URL of the firmware image (`.bin`).
    pub firmware_url: String,
    /// URL of a plain text file holding the latest version string.
    pub version_url: String,
    /// Time between periodic version checks while connected.
    pub check_interval_ms: u64,
    /// How many times to poll for association before giving up on an attempt.
    pub association_attempts: u32,
    /// Delay between association polls.
    pub association_poll_ms: u32,
    /// Delay before starting a new association attempt after a failed one.
    pub association_backoff_ms: u32,
    /// Idle delay at the end of every loop iteration.
    pub loop_tick_ms: u32,
    /// Minimum time between two progress lines during a download.
    pub progress_interval_ms: u64,
    /// Seconds counted down on the console before rebooting into new firmware.
    pub restart_countdown_secs: u8,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            firmware_url: String::new(),
            version_url: String::new(),
            check_interval_ms: 60_000,
            association_attempts: 20,
            association_poll_ms: 500,
            association_backoff_ms: 3000,
            loop_tick_ms: 100,
            progress_interval_ms: 500,
            restart_countdown_secs: 3,
        }
    }
}

impl UpdaterConfig {
    /// Check that the configuration can drive the loop.
    ///
    /// # Errors
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        check_url("firmware_url", &self.firmware_url)?;
        check_url("version_url", &self.version_url)?;
        if self.check_interval_ms == 0 {
            return Err("check_interval_ms must be greater than 0".to_string());
        }
        if self.association_attempts == 0 {
            return Err("association_attempts must be greater than 0".to_string());
        }
        if self.association_poll_ms == 0 {
            return Err("association_poll_ms must be greater than 0".to_string());
        }
        if self.association_backoff_ms == 0 {
            return Err("association_backoff_ms must be greater than 0".to_string());
        }
        if self.loop_tick_ms == 0 {
            return Err("loop_tick_ms must be greater than 0".to_string());
        }
        Ok(())
    }
}

fn check_url(field: &str, url: &str) -> Result<(), String> {
    if url.is_empty() {
        return Err(format!("{field} is not set"));
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(format!("{field} must be an http:// or https:// URL, got '{url}'"));
    }
    Ok(())
}
