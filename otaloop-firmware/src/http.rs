//! ESP-IDF HTTP client behind the update loop's `HttpClient` trait.

use embedded_io::{ErrorType, Read, ReadReady};
use embedded_svc::http::Method;
use esp_idf_svc::http::client::{
    Configuration as HttpConfig, EspHttpConnection, FollowRedirectsPolicy,
};
use esp_idf_svc::io::EspIOError;
use log::debug;
use otaloop_lib::ports::{HttpClient, HttpResponse, RedirectPolicy};
use std::time::Duration;

const BUFFER_SIZE: usize = 4096;
pub const TIMEOUT: Duration = Duration::from_secs(60);

/// Opens a fresh connection per request; the certificate bundle is attached so
/// `https://` endpoints work out of the box.
#[derive(Default)]
pub struct EspHttpClient;

/// Response headers plus the connection the body is read from.
pub struct EspHttpResponse {
    conn: EspHttpConnection,
    status: u16,
    content_length: Option<u64>,
}

impl HttpClient for EspHttpClient {
    type Error = EspIOError;
    type Response<'a> = EspHttpResponse where Self: 'a;

    fn get(
        &mut self,
        url: &str,
        redirects: RedirectPolicy,
    ) -> Result<Self::Response<'_>, Self::Error> {
        let follow_redirects_policy = match redirects {
            RedirectPolicy::None => FollowRedirectsPolicy::FollowNone,
            RedirectPolicy::Strict => FollowRedirectsPolicy::FollowGetHead,
        };

        let mut conn = EspHttpConnection::new(&HttpConfig {
            crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
            timeout: Some(TIMEOUT),
            follow_redirects_policy,
            buffer_size: Some(BUFFER_SIZE),
            ..Default::default()
        })?;

        conn.initiate_request(Method::Get, url, &[])?;
        conn.initiate_response()?;

        let status = conn.status();
        let content_length = conn
            .header("Content-Length")
            .and_then(|v| v.parse().ok());
        debug!("GET {url} -> {status}, Content-Length {content_length:?}");

        Ok(EspHttpResponse {
            conn,
            status,
            content_length,
        })
    }
}

impl ErrorType for EspHttpResponse {
    type Error = EspIOError;
}

impl Read for EspHttpResponse {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        Read::read(&mut self.conn, buf)
    }
}

impl ReadReady for EspHttpResponse {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        // Reads block inside the socket layer, which yields to other tasks
        Ok(true)
    }
}

impl HttpResponse for EspHttpResponse {
    fn status(&self) -> u16 {
        self.status
    }

    fn content_length(&self) -> Option<u64> {
        self.content_length
    }
}
