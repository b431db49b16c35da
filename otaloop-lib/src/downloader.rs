//! One complete update attempt: fetch the image, write it, reboot.

use crate::config::UpdaterConfig;
use crate::error::Error;
use crate::ports::{Clock, HttpClient, HttpResponse, RedirectPolicy, Restart, UpdateTarget};
use crate::status::{UpdatePhase, UpdateStatus};
use crate::writer::FirmwareWriter;
use log::{error, info, Log};

/// How an update attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The new image was committed and the restart primitive was invoked.
    Restarted,
    /// The attempt was abandoned; the running firmware is untouched.
    Failed(Error),
}

/// Borrowed collaborators for a single attempt.
pub struct FirmwareDownloader<'a, H, T, C, R> {
    pub http: &'a mut H,
    pub target: &'a mut T,
    pub clock: &'a C,
    pub restart: &'a mut R,
    pub config: &'a UpdaterConfig,
    pub status: &'a UpdateStatus,
    pub current_version: &'a str,
}

impl<H, T, C, R> FirmwareDownloader<'_, H, T, C, R>
where
    H: HttpClient,
    T: UpdateTarget,
    C: Clock,
    R: Restart,
{
    /// Download the configured firmware image, which the caller identified as
    /// `target_version`, and reboot into it.
    ///
    /// Failures are logged and returned as [`DownloadOutcome::Failed`]; they never
    /// leave the running firmware in a modified state.
    pub fn download_and_apply(&mut self, target_version: &str) -> DownloadOutcome {
        self.status.set_phase(UpdatePhase::Downloading);

        if let Err(e) = self.fetch_and_write() {
            error!("OTA update failed: {e}");
            self.status.set_phase(UpdatePhase::Failed);
            return DownloadOutcome::Failed(e);
        }

        info!(
            "OTA update success: {} -> {target_version}",
            self.current_version
        );
        self.status.set_phase(UpdatePhase::Restarting);
        self.countdown();
        log::logger().flush();
        self.restart.restart();
        DownloadOutcome::Restarted
    }

    fn fetch_and_write(&mut self) -> Result<(), Error> {
        let url = &self.config.firmware_url;
        info!("OTA: downloading from {url}");

        let mut response = self
            .http
            .get(url, RedirectPolicy::Strict)
            .map_err(Error::transport)?;

        let status = response.status();
        info!("HTTP GET code: {status}");
        if status != 200 {
            return Err(Error::HttpStatus(status));
        }

        let declared = response.content_length();
        let len = match declared.map(usize::try_from) {
            Some(Ok(len)) if len > 0 => len,
            _ => return Err(Error::InvalidContentLength(declared)),
        };
        info!("Firmware size: {len} bytes");

        let writer = FirmwareWriter::new(self.clock, self.status, self.config.progress_interval_ms);
        writer.write(&mut response, &mut *self.target, len)?;
        Ok(())
    }

    fn countdown(&self) {
        let secs = self.config.restart_countdown_secs;
        info!("Restarting in {secs}s...");
        for i in (1..=secs).rev() {
            info!("{i}...");
            self.clock.sleep_ms(1000);
        }
    }
}
