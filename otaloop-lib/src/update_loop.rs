//! Connect, check, update, repeat.

use crate::config::UpdaterConfig;
use crate::downloader::{DownloadOutcome, FirmwareDownloader};
use crate::ports::{Clock, HttpClient, Network, Restart, UpdateTarget};
use crate::status::{UpdatePhase, UpdateStatus};
use crate::version::fetch_latest_version;
use log::{debug, info, warn};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Disconnected,
    Connecting,
    Connected,
}

/// Result of one loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// The device was told to reboot into new firmware.
    Restarted,
}

pub struct UpdateLoop<N, H, T, C, R> {
    network: N,
    http: H,
    target: T,
    clock: C,
    restart: R,
    config: UpdaterConfig,
    current_version: String,
    status: Arc<UpdateStatus>,
    state: ConnectivityState,
    last_check_ms: u64,
}

impl<N, H, T, C, R> UpdateLoop<N, H, T, C, R>
where
    N: Network,
    H: HttpClient,
    T: UpdateTarget,
    C: Clock,
    R: Restart,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        network: N,
        http: H,
        target: T,
        clock: C,
        restart: R,
        config: UpdaterConfig,
        current_version: impl Into<String>,
    ) -> Self {
        Self {
            network,
            http,
            target,
            clock,
            restart,
            config,
            current_version: current_version.into(),
            status: Arc::new(UpdateStatus::new()),
            state: ConnectivityState::Disconnected,
            last_check_ms: 0,
        }
    }

    /// Handle for other tasks to observe progress.
    pub fn status(&self) -> Arc<UpdateStatus> {
        self.status.clone()
    }

    pub fn state(&self) -> ConnectivityState {
        self.state
    }

    /// Run until the device is restarted into new firmware.
    ///
    /// On hardware the restart never returns, so neither does this.
    pub fn run(&mut self) {
        info!(
            "Update loop started, running firmware {}",
            self.current_version
        );
        while self.step() == Step::Continue {}
    }

    /// One iteration of the loop.
    pub fn step(&mut self) -> Step {
        if self.network.is_connected() {
            // Link came up without us, e.g. already associated at boot
            if self.state != ConnectivityState::Connected {
                info!("WiFi already connected");
                if self.enter_connected() == Step::Restarted {
                    return Step::Restarted;
                }
            }
        } else {
            if self.state == ConnectivityState::Connected {
                warn!("WiFi connection lost");
            }
            self.state = ConnectivityState::Disconnected;

            if !self.associate() {
                warn!("WiFi connect failed, retrying...");
                self.state = ConnectivityState::Disconnected;
                self.clock.sleep_ms(self.config.association_backoff_ms);
                return Step::Continue;
            }

            if self.enter_connected() == Step::Restarted {
                return Step::Restarted;
            }
        }

        let due = self.clock.now_ms() - self.last_check_ms >= self.config.check_interval_ms;
        if due && self.network.is_connected() {
            self.last_check_ms = self.clock.now_ms();
            if self.check_for_update() == Step::Restarted {
                return Step::Restarted;
            }
        }

        self.clock.sleep_ms(self.config.loop_tick_ms);
        Step::Continue
    }

    /// Switch to `Connected` and run the check that goes with it.
    fn enter_connected(&mut self) -> Step {
        self.state = ConnectivityState::Connected;
        if self.check_for_update() == Step::Restarted {
            return Step::Restarted;
        }
        self.last_check_ms = self.clock.now_ms();
        Step::Continue
    }

    /// Start association and poll until connected or out of attempts.
    fn associate(&mut self) -> bool {
        self.state = ConnectivityState::Connecting;
        self.status.set_phase(UpdatePhase::Connecting);
        info!("Connecting to WiFi...");

        if let Err(e) = self.network.begin() {
            warn!("Failed to start WiFi association: {e:?}");
            return false;
        }

        let mut attempt = 0;
        while !self.network.is_connected() && attempt < self.config.association_attempts {
            debug!("Waiting for WiFi ({}/{})", attempt + 1, self.config.association_attempts);
            self.clock.sleep_ms(self.config.association_poll_ms);
            attempt += 1;
        }

        if !self.network.is_connected() {
            return false;
        }

        match self.network.local_ip() {
            Some(ip) => info!("WiFi connected. IP: {ip}"),
            None => info!("WiFi connected"),
        }
        true
    }

    /// Compare the published version with ours and update if they differ.
    fn check_for_update(&mut self) -> Step {
        info!("Checking for firmware update...");
        self.status.set_phase(UpdatePhase::Checking);

        let Some(latest) = fetch_latest_version(&mut self.http, &self.config.version_url) else {
            warn!("Failed to fetch latest version");
            self.status.set_phase(UpdatePhase::Idle);
            return Step::Continue;
        };
        self.status.set_latest_version(&latest);

        info!("Current: {}", self.current_version);
        info!("Latest : {latest}");
        if latest == self.current_version {
            info!("Already up to date.");
            self.status.set_phase(UpdatePhase::Idle);
            return Step::Continue;
        }

        info!("New firmware found, starting OTA...");
        let outcome = FirmwareDownloader {
            http: &mut self.http,
            target: &mut self.target,
            clock: &self.clock,
            restart: &mut self.restart,
            config: &self.config,
            status: &self.status,
            current_version: &self.current_version,
        }
        .download_and_apply(&latest);

        match outcome {
            DownloadOutcome::Restarted => Step::Restarted,
            DownloadOutcome::Failed(_) => Step::Continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{
        firmware_image, FakeClock, FakeHttp, FakeNetwork, FakeRestart, FakeTarget, Route,
    };

    const FW_URL: &str = "http://updates.local/firmware.bin";
    const VERSION_URL: &str = "http://updates.local/version.txt";

    type TestLoop = UpdateLoop<FakeNetwork, FakeHttp, FakeTarget, FakeClock, FakeRestart>;

    struct Rig {
        network: FakeNetwork,
        http: FakeHttp,
        target: FakeTarget,
        clock: FakeClock,
        restart: FakeRestart,
    }

    impl Rig {
        fn new(network: FakeNetwork) -> Self {
            Self {
                network,
                http: FakeHttp::default(),
                target: FakeTarget::default(),
                clock: FakeClock::default(),
                restart: FakeRestart::default(),
            }
        }

        fn build(&self, check_interval_ms: u64) -> TestLoop {
            UpdateLoop::new(
                self.network.clone(),
                self.http.clone(),
                self.target.clone(),
                self.clock.clone(),
                self.restart.clone(),
                UpdaterConfig {
                    firmware_url: FW_URL.to_string(),
                    version_url: VERSION_URL.to_string(),
                    check_interval_ms,
                    ..Default::default()
                },
                "1.0.0",
            )
        }
    }

    #[test]
    fn test_same_version_does_not_download() {
        let rig = Rig::new(FakeNetwork::connecting_after(2));
        rig.http.route(VERSION_URL, Route::ok("1.0.0\n"));
        rig.http.route(FW_URL, Route::ok(firmware_image(100)));
        let mut ota = rig.build(60_000);

        assert_eq!(ota.step(), Step::Continue);
        assert_eq!(ota.state(), ConnectivityState::Connected);
        assert_eq!(rig.http.requests_to(VERSION_URL), 1);
        assert_eq!(rig.http.requests_to(FW_URL), 0);
        assert!(ota.status().phase() == UpdatePhase::Idle);
        assert_eq!(ota.status().latest_version().as_deref(), Some("1.0.0"));
    }

    #[test]
    fn test_new_version_downloads_once_per_check() {
        let rig = Rig::new(FakeNetwork::connecting_after(0));
        rig.http.route(VERSION_URL, Route::ok("1.0.1"));
        // Image is rejected so the device keeps running and checks again
        rig.http.route(FW_URL, Route::ok(firmware_image(2048)));
        let mut ota = rig.build(1000);
        let mut target = rig.target.clone();
        target.reject_on_complete = true;
        ota.target = target;

        assert_eq!(ota.step(), Step::Continue);
        assert_eq!(rig.http.requests_to(FW_URL), 1);

        // Not due yet
        assert_eq!(ota.step(), Step::Continue);
        assert_eq!(rig.http.requests_to(FW_URL), 1);

        rig.clock.advance(1000);
        assert_eq!(ota.step(), Step::Continue);
        assert_eq!(rig.http.requests_to(VERSION_URL), 2);
        assert_eq!(rig.http.requests_to(FW_URL), 2);
        assert_eq!(rig.restart.count.get(), 0);
    }

    #[test]
    fn test_failed_version_fetch_waits_for_next_interval() {
        let rig = Rig::new(FakeNetwork::connecting_after(0));
        rig.http.route(VERSION_URL, Route::status(500));
        let mut ota = rig.build(5000);

        for _ in 0..10 {
            assert_eq!(ota.step(), Step::Continue);
        }
        // 10 ticks of 100ms, not due again yet
        assert_eq!(rig.http.requests_to(VERSION_URL), 1);
        assert_eq!(rig.http.requests_to(FW_URL), 0);

        rig.clock.advance(5000);
        ota.step();
        assert_eq!(rig.http.requests_to(VERSION_URL), 2);
    }

    #[test]
    fn test_association_retries_then_backs_off() {
        let rig = Rig::new(FakeNetwork::never_connecting());
        let mut ota = rig.build(60_000);

        assert_eq!(ota.step(), Step::Continue);
        assert_eq!(ota.state(), ConnectivityState::Disconnected);
        assert_eq!(rig.network.begin_calls.get(), 1);

        let sleeps = rig.clock.sleeps();
        assert_eq!(sleeps.len(), 21);
        assert!(sleeps[..20].iter().all(|&ms| ms == 500));
        assert_eq!(sleeps[20], 3000);
        assert_eq!(rig.http.requests_to(VERSION_URL), 0);

        ota.step();
        assert_eq!(rig.network.begin_calls.get(), 2);
    }

    #[test]
    fn test_reconnect_triggers_immediate_check() {
        let rig = Rig::new(FakeNetwork::connecting_after(1));
        rig.http.route(VERSION_URL, Route::ok("1.0.0"));
        let mut ota = rig.build(60_000);

        ota.step();
        assert_eq!(rig.http.requests_to(VERSION_URL), 1);

        rig.network.drop_link();
        ota.step();
        assert_eq!(ota.state(), ConnectivityState::Connected);
        assert_eq!(rig.network.begin_calls.get(), 2);
        assert_eq!(rig.http.requests_to(VERSION_URL), 2);
    }

    #[test]
    fn test_already_connected_checks_immediately() {
        let network = FakeNetwork::never_connecting();
        network.connected.set(true);
        let rig = Rig::new(network);
        rig.http.route(VERSION_URL, Route::ok("1.0.0"));
        let mut ota = rig.build(60_000);

        assert_eq!(ota.step(), Step::Continue);
        assert_eq!(ota.state(), ConnectivityState::Connected);
        assert_eq!(rig.network.begin_calls.get(), 0);
        assert_eq!(rig.http.requests_to(VERSION_URL), 1);

        // Only the periodic schedule triggers further checks
        ota.step();
        assert_eq!(rig.http.requests_to(VERSION_URL), 1);
        rig.clock.advance(60_000);
        ota.step();
        assert_eq!(rig.http.requests_to(VERSION_URL), 2);
        assert_eq!(ota.state(), ConnectivityState::Connected);
    }

    #[test]
    fn test_end_to_end_update_restarts_once() {
        let image = firmware_image(102_400);
        let rig = Rig::new(FakeNetwork::connecting_after(3));
        rig.http.route(VERSION_URL, Route::ok("  1.0.1\n"));
        let mut route = Route::ok(image.clone());
        route.chunk = 1024;
        route.stall_every = Some(4);
        rig.http.route(FW_URL, route);
        let mut ota = rig.build(60_000);

        ota.run();

        assert_eq!(rig.restart.count.get(), 1);
        assert_eq!(*rig.target.data.borrow(), image);
        assert!(rig.target.committed.get());
        assert_eq!(rig.http.requests_to(VERSION_URL), 1);
        assert_eq!(rig.http.requests_to(FW_URL), 1);
        // Nothing ran after the restart: the last sleeps are the countdown
        let sleeps = rig.clock.sleeps();
        assert_eq!(sleeps[sleeps.len() - 3..], [1000, 1000, 1000]);
        assert!(ota.status().phase() == UpdatePhase::Restarting);
        assert_eq!(ota.status().progress(), 100);
    }
}
