//! Update status shared with other tasks.
//!
//! Only the update loop writes; anything else (a status LED, a web page) may
//! read through an `Arc<UpdateStatus>`.

use atomic_enum::atomic_enum;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

/// What the update loop is doing right now.
#[atomic_enum]
#[derive(PartialEq, Eq)]
pub enum UpdatePhase {
    /// Connected and waiting for the next scheduled check.
    Idle,
    /// Associating with the access point.
    Connecting,
    /// Fetching the latest version string.
    Checking,
    /// Streaming a firmware image into the update slot.
    Downloading,
    /// Image accepted, countdown to reboot running.
    Restarting,
    /// The last update attempt failed.
    Failed,
}

impl UpdatePhase {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Checking => "checking",
            Self::Downloading => "downloading",
            Self::Restarting => "restarting",
            Self::Failed => "failed",
        }
    }
}

pub struct UpdateStatus {
    phase: AtomicUpdatePhase,
    progress: AtomicU8,
    latest_version: Mutex<Option<String>>,
}

impl UpdateStatus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: AtomicUpdatePhase::new(UpdatePhase::Connecting),
            progress: AtomicU8::new(0),
            latest_version: Mutex::new(None),
        }
    }

    pub fn phase(&self) -> UpdatePhase {
        self.phase.load(Ordering::Relaxed)
    }

    pub(crate) fn set_phase(&self, phase: UpdatePhase) {
        self.phase.store(phase, Ordering::Relaxed);
    }

    /// Download progress of the current or last attempt, 0-100.
    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::Relaxed)
    }

    pub(crate) fn set_progress(&self, percent: u8) {
        self.progress.store(percent.min(100), Ordering::Relaxed);
    }

    /// Version string returned by the most recent successful check.
    pub fn latest_version(&self) -> Option<String> {
        self.latest_version
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_latest_version(&self, version: &str) {
        *self
            .latest_version
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(version.to_string());
    }
}

impl Default for UpdateStatus {
    fn default() -> Self {
        Self::new()
    }
}
