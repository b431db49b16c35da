//! Collaborator traits for the hardware facing parts of an update.
//!
//! The firmware crate implements these on top of ESP-IDF; tests implement them
//! with in-memory fakes.

use core::fmt::Debug;
use embedded_io::{Read, ReadReady};
use std::net::Ipv4Addr;

/// Station mode network association.
pub trait Network {
    type Error: Debug;

    /// Whether the link is associated and has an address.
    fn is_connected(&mut self) -> bool;

    /// Start associating with the configured access point.
    ///
    /// Returns as soon as the attempt has been started; completion is observed
    /// by polling [`Network::is_connected`].
    fn begin(&mut self) -> Result<(), Self::Error>;

    /// Address assigned to the station interface, if any.
    fn local_ip(&mut self) -> Option<Ipv4Addr>;
}

/// How the HTTP transport treats 3xx responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectPolicy {
    /// Return redirects to the caller as-is.
    None,
    /// Follow redirects for GET/HEAD requests only, host and scheme changes allowed.
    Strict,
}

/// Response to a GET request.
///
/// The body is read through the `embedded_io` traits. Dropping the response
/// releases the underlying connection.
pub trait HttpResponse: Read + ReadReady {
    /// HTTP status code of the final response.
    fn status(&self) -> u16;

    /// Declared `Content-Length`, `None` when the server did not send one.
    fn content_length(&self) -> Option<u64>;
}

/// Minimal HTTP client.
pub trait HttpClient {
    type Error: Debug;
    type Response<'a>: HttpResponse
    where
        Self: 'a;

    /// Issue a GET request and wait for the response headers.
    fn get(
        &mut self,
        url: &str,
        redirects: RedirectPolicy,
    ) -> Result<Self::Response<'_>, Self::Error>;
}

/// An in-progress write into the inactive firmware slot.
pub trait UpdateSession {
    type Error: Debug;

    /// Write a chunk, returning the number of bytes accepted.
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error>;

    /// Validate the written image and make it the next boot target.
    fn complete(self) -> Result<(), Self::Error>;

    /// Discard everything written so far.
    fn abort(self) -> Result<(), Self::Error>;
}

/// Firmware update partition.
pub trait UpdateTarget {
    type Error: Debug;
    type Session<'a>: UpdateSession<Error = Self::Error>
    where
        Self: 'a;

    /// Prepare the update slot for an image of `expected_len` bytes.
    fn begin(&mut self, expected_len: usize) -> Result<Self::Session<'_>, Self::Error>;
}

/// Device reboot.
pub trait Restart {
    /// Reboot the device. On hardware this never returns.
    fn restart(&mut self);
}

/// Monotonic time and the cooperative yield point.
pub trait Clock {
    /// Milliseconds since an arbitrary fixed point.
    fn now_ms(&self) -> u64;

    /// Block the calling task for at least `ms` milliseconds, letting others run.
    fn sleep_ms(&self, ms: u32);
}
