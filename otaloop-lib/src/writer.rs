//! Streams a firmware image of known length into the update partition.

use crate::error::Error;
use crate::format::{format_eta, format_speed, progress_bar};
use crate::ports::{Clock, UpdateSession, UpdateTarget};
use crate::status::UpdateStatus;
use embedded_io::{Read, ReadReady};
use log::{info, warn};

/// Bytes requested from the stream per read.
pub const CHUNK_SIZE: usize = 1024;

/// Width of the progress bar, in columns.
pub const BAR_WIDTH: usize = 40;

/// Yield used while the stream has nothing buffered.
const STALL_SLEEP_MS: u32 = 1;

/// Summary of a successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReport {
    pub bytes_written: usize,
    pub elapsed_ms: u64,
}

/// Bookkeeping for one write, dropped when it ends.
struct DownloadSession {
    expected: usize,
    written: usize,
    started_ms: u64,
    last_report_ms: u64,
}

impl DownloadSession {
    #[allow(clippy::cast_possible_truncation)]
    fn percent(&self) -> u8 {
        (self.written as u64 * 100 / self.expected as u64) as u8
    }
}

pub struct FirmwareWriter<'a, C: Clock> {
    clock: &'a C,
    status: &'a UpdateStatus,
    progress_interval_ms: u64,
}

impl<'a, C: Clock> FirmwareWriter<'a, C> {
    pub fn new(clock: &'a C, status: &'a UpdateStatus, progress_interval_ms: u64) -> Self {
        Self {
            clock,
            status,
            progress_interval_ms,
        }
    }

    /// Copy exactly `expected_len` bytes from `stream` into a new update session
    /// on `target` and finalize it.
    ///
    /// On any failure after the session was started the session is aborted, so
    /// the running firmware stays the boot target.
    ///
    /// # Errors
    /// [`Error::WriteInit`] if the session cannot start, [`Error::StreamRead`] or
    /// [`Error::StreamClosed`] if the body does not deliver, [`Error::FlashWrite`]
    /// if a chunk cannot be stored and [`Error::Finalize`] if the finished image
    /// is rejected.
    pub fn write<S, T>(
        &self,
        stream: &mut S,
        target: &mut T,
        expected_len: usize,
    ) -> Result<WriteReport, Error>
    where
        S: Read + ReadReady,
        T: UpdateTarget,
    {
        info!("Starting OTA...");
        let mut update = target
            .begin(expected_len)
            .map_err(|e| Error::WriteInit(format!("{e:?}")))?;

        let now = self.clock.now_ms();
        let mut session = DownloadSession {
            expected: expected_len,
            written: 0,
            started_ms: now,
            last_report_ms: now,
        };
        self.status.set_progress(0);

        if let Err(e) = self.pump(stream, &mut update, &mut session) {
            if let Err(abort_err) = update.abort() {
                warn!("Failed to abort update: {abort_err:?}");
            }
            return Err(e);
        }

        update
            .complete()
            .map_err(|e| Error::Finalize(format!("{e:?}")))?;

        let elapsed_ms = self.clock.now_ms() - session.started_ms;
        #[allow(clippy::cast_precision_loss)]
        let secs = elapsed_ms as f64 / 1000.0;
        info!("Done in {secs:.2} sec");
        self.status.set_progress(100);

        Ok(WriteReport {
            bytes_written: session.written,
            elapsed_ms,
        })
    }

    fn pump<S, U>(
        &self,
        stream: &mut S,
        update: &mut U,
        session: &mut DownloadSession,
    ) -> Result<(), Error>
    where
        S: Read + ReadReady,
        U: UpdateSession,
    {
        let mut buf = [0u8; CHUNK_SIZE];

        while session.written < session.expected {
            let ready = stream
                .read_ready()
                .map_err(|e| Error::StreamRead(format!("{e:?}")))?;
            if !ready {
                self.clock.sleep_ms(STALL_SLEEP_MS);
                continue;
            }

            let want = CHUNK_SIZE.min(session.expected - session.written);
            let n = stream
                .read(&mut buf[..want])
                .map_err(|e| Error::StreamRead(format!("{e:?}")))?;
            if n == 0 {
                return Err(Error::StreamClosed {
                    written: session.written,
                    expected: session.expected,
                });
            }

            write_all(update, &buf[..n])?;
            session.written += n;

            let now = self.clock.now_ms();
            if now - session.last_report_ms > self.progress_interval_ms {
                self.report(session, now);
                session.last_report_ms = now;
            }
        }

        Ok(())
    }

    fn report(&self, session: &DownloadSession, now: u64) {
        let percent = session.percent();
        self.status.set_progress(percent);

        #[allow(clippy::cast_precision_loss)]
        let elapsed_s = (now - session.started_ms) as f64 / 1000.0;
        #[allow(clippy::cast_precision_loss)]
        let rate = if elapsed_s > 0.0 {
            session.written as f64 / elapsed_s
        } else {
            0.0
        };
        #[allow(clippy::cast_precision_loss)]
        let eta = if rate > 0.0 {
            (session.expected - session.written) as f64 / rate
        } else {
            0.0
        };

        info!(
            "{} {percent:3}% {} ETA {}",
            progress_bar(percent, BAR_WIDTH),
            format_speed(rate),
            format_eta(eta)
        );
    }
}

/// Hand `buf` to the session until all of it is accepted.
fn write_all<U: UpdateSession>(update: &mut U, mut buf: &[u8]) -> Result<(), Error> {
    while !buf.is_empty() {
        let n = update
            .write(buf)
            .map_err(|e| Error::FlashWrite(format!("{e:?}")))?;
        if n == 0 {
            return Err(Error::FlashWrite("update target accepted 0 bytes".to_string()));
        }
        buf = &buf[n..];
    }
    Ok(())
}
