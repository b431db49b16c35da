use derive_more::{Display, Error};

/// Reasons an update attempt ends early.
///
/// None of these are fatal to the update loop: they end the current attempt and
/// the next scheduled check tries again.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The request could not be sent or the response headers never arrived.
    #[display("HTTP request failed: {_0}")]
    Transport(#[error(not(source))] String),
    /// The server answered with something other than 200.
    #[display("HTTP status {_0}")]
    HttpStatus(#[error(not(source))] u16),
    /// Missing or zero `Content-Length` on the firmware response.
    #[display("invalid firmware size: {_0:?}")]
    InvalidContentLength(#[error(not(source))] Option<u64>),
    /// The update partition refused to start (usually not enough space).
    #[display("update begin failed: {_0}")]
    WriteInit(#[error(not(source))] String),
    /// Reading the response body failed.
    #[display("stream read failed: {_0}")]
    StreamRead(#[error(not(source))] String),
    /// A response body was longer than the caller accepts.
    #[display("response body of {len} bytes exceeds {limit}")]
    BodyTooLong { len: usize, limit: usize },
    /// The response body ended before the declared length.
    #[display("stream closed after {written} of {expected} bytes")]
    StreamClosed { written: usize, expected: usize },
    /// Writing a chunk to flash failed.
    #[display("flash write failed: {_0}")]
    FlashWrite(#[error(not(source))] String),
    /// The update partition rejected the finished image.
    #[display("update failed: {_0}")]
    Finalize(#[error(not(source))] String),
}

impl Error {
    pub(crate) fn transport(e: impl core::fmt::Debug) -> Self {
        Self::Transport(format!("{e:?}"))
    }
}
