//! OTA partition and reboot behind the update loop's traits.
//!
//! Writes go to the inactive OTA slot; `complete` lets ESP-IDF validate the image
//! and switch the boot partition to it.

use anyhow::{bail, Result};
use esp_idf_svc::ota::{EspOta, EspOtaUpdate};
use log::{debug, info};
use otaloop_lib::ports::{Restart, UpdateSession, UpdateTarget};

/// Firmware version baked in at build time from `git describe`.
pub const VERSION: &str = env!("GIT_VERSION");

pub struct OtaPartition {
    ota: EspOta,
}

impl OtaPartition {
    pub fn new() -> Result<Self> {
        Ok(Self { ota: EspOta::new()? })
    }
}

/// Size in bytes of the slot the next update will be written to.
fn next_slot_size() -> Option<usize> {
    // SAFETY: passing NULL asks ESP-IDF for the slot after the running one; the
    // returned pointer refers to the static partition table.
    let partition =
        unsafe { esp_idf_sys::esp_ota_get_next_update_partition(std::ptr::null()) };
    if partition.is_null() {
        return None;
    }
    // SAFETY: non-null pointers from the partition API stay valid for the program lifetime
    usize::try_from(unsafe { (*partition).size }).ok()
}

impl UpdateTarget for OtaPartition {
    type Error = anyhow::Error;
    type Session<'a> = OtaSession<'a> where Self: 'a;

    fn begin(&mut self, expected_len: usize) -> Result<Self::Session<'_>> {
        match next_slot_size() {
            None => bail!("no OTA update partition"),
            Some(size) if expected_len > size => {
                bail!("image of {expected_len} bytes does not fit OTA slot of {size} bytes")
            }
            Some(size) => debug!("OTA: slot size {size} bytes, image {expected_len} bytes"),
        }

        let update = self.ota.initiate_update()?;
        info!("OTA: update slot prepared");
        Ok(OtaSession { update })
    }
}

pub struct OtaSession<'a> {
    update: EspOtaUpdate<'a>,
}

impl UpdateSession for OtaSession<'_> {
    type Error = anyhow::Error;

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.update.write(buf)?;
        Ok(buf.len())
    }

    fn complete(self) -> Result<()> {
        self.update.complete()?;
        info!("OTA: new image set as boot partition");
        Ok(())
    }

    fn abort(self) -> Result<()> {
        self.update.abort()?;
        info!("OTA: update aborted");
        Ok(())
    }
}

pub struct Reboot;

impl Restart for Reboot {
    fn restart(&mut self) {
        esp_idf_hal::reset::restart();
    }
}
