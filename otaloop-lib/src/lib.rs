//! Over-the-air firmware update client core.
//!
//! This crate contains everything about the update process that does not touch
//! hardware: polling a version endpoint, streaming a firmware image into an
//! update partition with progress reports, and the connect/check/update loop
//! that drives both. The device-specific pieces (WiFi, HTTP transport, flash
//! partition, reboot, timing) are reached through the traits in [`ports`], so
//! the whole loop can run on the host against fakes.

pub mod config;
pub mod downloader;
pub mod error;
pub mod format;
pub mod ports;
pub mod status;
pub mod update_loop;
pub mod version;
pub mod writer;

#[cfg(test)]
mod fakes;

pub use config::UpdaterConfig;
pub use downloader::{DownloadOutcome, FirmwareDownloader};
pub use error::Error;
pub use status::{UpdatePhase, UpdateStatus};
pub use update_loop::{ConnectivityState, Step, UpdateLoop};
pub use version::fetch_latest_version;
pub use writer::{FirmwareWriter, WriteReport};
