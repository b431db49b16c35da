//! In-memory collaborators for host tests.

use crate::ports::{
    Clock, HttpClient, HttpResponse, Network, RedirectPolicy, Restart, UpdateSession,
    UpdateTarget,
};
use embedded_io::{ErrorKind, ErrorType, Read, ReadReady};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::rc::Rc;

/// Virtual clock: `sleep_ms` advances time instantly.
#[derive(Clone, Default)]
pub struct FakeClock {
    now: Rc<Cell<u64>>,
    sleeps: Rc<RefCell<Vec<u32>>>,
}

impl FakeClock {
    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }

    pub fn sleeps(&self) -> Vec<u32> {
        self.sleeps.borrow().clone()
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }

    fn sleep_ms(&self, ms: u32) {
        self.sleeps.borrow_mut().push(ms);
        self.advance(u64::from(ms));
    }
}

/// Network that comes up after a fixed number of status polls per `begin`.
#[derive(Clone, Default)]
pub struct FakeNetwork {
    /// Polls after `begin` before the link reports up. `None` never connects.
    pub polls_until_up: Rc<Cell<Option<u32>>>,
    pub connected: Rc<Cell<bool>>,
    pub begin_calls: Rc<Cell<u32>>,
    pending: Rc<Cell<Option<u32>>>,
}

impl FakeNetwork {
    pub fn connecting_after(polls: u32) -> Self {
        let net = Self::default();
        net.polls_until_up.set(Some(polls));
        net
    }

    pub fn never_connecting() -> Self {
        Self::default()
    }

    pub fn drop_link(&self) {
        self.connected.set(false);
    }
}

impl Network for FakeNetwork {
    type Error = &'static str;

    fn is_connected(&mut self) -> bool {
        if let Some(left) = self.pending.get() {
            if left == 0 {
                self.connected.set(true);
                self.pending.set(None);
            } else {
                self.pending.set(Some(left - 1));
            }
        }
        self.connected.get()
    }

    fn begin(&mut self) -> Result<(), Self::Error> {
        self.begin_calls.set(self.begin_calls.get() + 1);
        self.pending.set(self.polls_until_up.get());
        Ok(())
    }

    fn local_ip(&mut self) -> Option<Ipv4Addr> {
        self.connected.get().then(|| Ipv4Addr::new(192, 168, 1, 50))
    }
}

/// Scripted reply for one URL.
#[derive(Clone)]
pub struct Route {
    pub status: u16,
    pub body: Vec<u8>,
    pub content_length: Option<u64>,
    /// Largest read the fake stream hands out at once.
    pub chunk: usize,
    /// Every n-th `read_ready` call reports no data.
    pub stall_every: Option<u32>,
    /// Close the stream after this many bytes.
    pub truncate_at: Option<usize>,
    /// Fail the request itself instead of answering.
    pub transport_error: bool,
}

impl Route {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        Self {
            status: 200,
            content_length: Some(body.len() as u64),
            body,
            chunk: 1024,
            stall_every: None,
            truncate_at: None,
            transport_error: false,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            ..Self::ok(Vec::new())
        }
    }

    pub fn transport_error() -> Self {
        Self {
            transport_error: true,
            ..Self::ok(Vec::new())
        }
    }
}

#[derive(Clone, Default)]
pub struct FakeHttp {
    routes: Rc<RefCell<HashMap<String, Route>>>,
    requests: Rc<RefCell<Vec<(String, RedirectPolicy)>>>,
}

impl FakeHttp {
    pub fn route(&self, url: &str, route: Route) {
        self.routes.borrow_mut().insert(url.to_string(), route);
    }

    pub fn requests_to(&self, url: &str) -> usize {
        self.requests.borrow().iter().filter(|(u, _)| u == url).count()
    }

    pub fn last_policy(&self) -> Option<RedirectPolicy> {
        self.requests.borrow().last().map(|(_, p)| *p)
    }
}

pub struct FakeResponse {
    route: Route,
    pos: usize,
    ready_calls: u32,
}

impl FakeResponse {
    fn end(&self) -> usize {
        self.route
            .truncate_at
            .unwrap_or(self.route.body.len())
            .min(self.route.body.len())
    }
}

impl ErrorType for FakeResponse {
    type Error = ErrorKind;
}

impl ReadReady for FakeResponse {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        self.ready_calls += 1;
        match self.route.stall_every {
            Some(n) if self.ready_calls % n == 0 => Ok(false),
            _ => Ok(true),
        }
    }
}

impl Read for FakeResponse {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let n = buf
            .len()
            .min(self.route.chunk)
            .min(self.end() - self.pos);
        buf[..n].copy_from_slice(&self.route.body[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl HttpResponse for FakeResponse {
    fn status(&self) -> u16 {
        self.route.status
    }

    fn content_length(&self) -> Option<u64> {
        self.route.content_length
    }
}

impl HttpClient for FakeHttp {
    type Error = String;
    type Response<'a> = FakeResponse where Self: 'a;

    fn get(
        &mut self,
        url: &str,
        redirects: RedirectPolicy,
    ) -> Result<Self::Response<'_>, Self::Error> {
        self.requests.borrow_mut().push((url.to_string(), redirects));
        let route = self
            .routes
            .borrow()
            .get(url)
            .cloned()
            .ok_or_else(|| format!("connection refused: {url}"))?;
        if route.transport_error {
            return Err("connection reset".to_string());
        }
        Ok(FakeResponse {
            route,
            pos: 0,
            ready_calls: 0,
        })
    }
}

/// Flash slot kept in memory.
#[derive(Clone, Default)]
pub struct FakeTarget {
    pub capacity: Option<usize>,
    pub reject_on_complete: bool,
    /// Accept at most this many bytes per `write` call.
    pub max_write: Option<usize>,
    pub data: Rc<RefCell<Vec<u8>>>,
    pub begin_calls: Rc<Cell<u32>>,
    pub committed: Rc<Cell<bool>>,
    pub aborted: Rc<Cell<bool>>,
}

pub struct FakeSession<'a> {
    target: &'a FakeTarget,
}

impl UpdateSession for FakeSession<'_> {
    type Error = String;

    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let n = self.target.max_write.map_or(buf.len(), |m| m.min(buf.len()));
        self.target.data.borrow_mut().extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn complete(self) -> Result<(), Self::Error> {
        if self.target.reject_on_complete {
            self.target.data.borrow_mut().clear();
            return Err("image validation failed".to_string());
        }
        self.target.committed.set(true);
        Ok(())
    }

    fn abort(self) -> Result<(), Self::Error> {
        self.target.data.borrow_mut().clear();
        self.target.aborted.set(true);
        Ok(())
    }
}

impl UpdateTarget for FakeTarget {
    type Error = String;
    type Session<'a> = FakeSession<'a> where Self: 'a;

    fn begin(&mut self, expected_len: usize) -> Result<Self::Session<'_>, Self::Error> {
        self.begin_calls.set(self.begin_calls.get() + 1);
        if let Some(cap) = self.capacity {
            if expected_len > cap {
                return Err(format!("not enough space: need {expected_len}, have {cap}"));
            }
        }
        self.data.borrow_mut().clear();
        Ok(FakeSession { target: self })
    }
}

#[derive(Clone, Default)]
pub struct FakeRestart {
    pub count: Rc<Cell<u32>>,
}

impl Restart for FakeRestart {
    fn restart(&mut self) {
        self.count.set(self.count.get() + 1);
    }
}

/// Deterministic firmware image of `len` bytes.
pub fn firmware_image(len: usize) -> Vec<u8> {
    #[allow(clippy::cast_possible_truncation)]
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}
