use crate::error::Error;
use crate::ports::{HttpClient, HttpResponse, RedirectPolicy};
use embedded_io::Read;
use log::{debug, warn};

/// Longest version string accepted, after trimming.
const MAX_VERSION_LEN: usize = 128;

/// Longest raw body read, whitespace padding included.
const MAX_BODY_LEN: usize = 1024;

/// Fetch the latest published version string.
///
/// Returns the trimmed response body on HTTP 200. Any other status, a transport
/// error, an empty body or one too long to be a version is logged and reported
/// as `None`.
pub fn fetch_latest_version<H: HttpClient>(http: &mut H, url: &str) -> Option<String> {
    match try_fetch_latest_version(http, url) {
        Ok(version) if version.is_empty() => {
            warn!("Version endpoint returned an empty body");
            None
        }
        Ok(version) => Some(version),
        Err(e) => {
            warn!("Version check failed: {e}");
            None
        }
    }
}

fn try_fetch_latest_version<H: HttpClient>(http: &mut H, url: &str) -> Result<String, Error> {
    debug!("GET {url}");
    let mut response = http.get(url, RedirectPolicy::None).map_err(Error::transport)?;

    let status = response.status();
    if status != 200 {
        return Err(Error::HttpStatus(status));
    }

    let body = read_body(&mut response, MAX_BODY_LEN)?;
    let version = String::from_utf8_lossy(&body).trim().to_string();
    if version.len() > MAX_VERSION_LEN {
        return Err(Error::BodyTooLong {
            len: version.len(),
            limit: MAX_VERSION_LEN,
        });
    }
    Ok(version)
}

/// Read a response body to EOF, failing once it grows past `limit` bytes.
fn read_body<R: HttpResponse>(response: &mut R, limit: usize) -> Result<Vec<u8>, Error> {
    let mut body = Vec::new();
    let mut buf = [0u8; 64];
    loop {
        let n = response
            .read(&mut buf)
            .map_err(|e| Error::StreamRead(format!("{e:?}")))?;
        if n == 0 {
            return Ok(body);
        }
        body.extend_from_slice(&buf[..n]);
        if body.len() > limit {
            return Err(Error::BodyTooLong {
                len: body.len(),
                limit,
            });
        }
    }
}
