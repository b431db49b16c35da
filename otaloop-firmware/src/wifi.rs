//! Station mode WiFi behind the update loop's `Network` trait.

use anyhow::{anyhow, Result};
use esp_idf_svc::sys::EspError;
use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration, EspWifi};
use log::{debug, info, warn};
use otaloop_lib::ports::Network;
use std::net::Ipv4Addr;

use crate::config::WifiConfig;

pub struct StationNetwork {
    wifi: EspWifi<'static>,
}

impl StationNetwork {
    /// Configure the driver for station mode and start it without connecting.
    pub fn new(mut wifi: EspWifi<'static>, config: &WifiConfig) -> Result<Self> {
        let password = config.password.clone().unwrap_or_default();
        let auth_method = if password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };

        info!("Configuring WiFi STA for '{}'", config.ssid);
        wifi.set_configuration(&Configuration::Client(ClientConfiguration {
            ssid: config
                .ssid
                .as_str()
                .try_into()
                .map_err(|()| anyhow!("WiFi SSID '{}' is too long", config.ssid))?,
            password: password
                .as_str()
                .try_into()
                .map_err(|()| anyhow!("WiFi password is too long"))?,
            auth_method,
            ..Default::default()
        }))?;
        wifi.start()?;

        Ok(Self { wifi })
    }
}

impl Network for StationNetwork {
    type Error = EspError;

    fn is_connected(&mut self) -> bool {
        // `is_up` also requires the netif to have an address
        self.wifi.is_up().unwrap_or(false)
    }

    fn begin(&mut self) -> Result<(), Self::Error> {
        if self.wifi.is_connected().unwrap_or(false) {
            debug!("Dropping stale association before reconnecting");
            if let Err(e) = self.wifi.disconnect() {
                warn!("WiFi disconnect failed: {e:?}");
            }
        }
        self.wifi.connect()
    }

    fn local_ip(&mut self) -> Option<Ipv4Addr> {
        self.wifi
            .sta_netif()
            .get_ip_info()
            .ok()
            .map(|info| info.ip)
    }
}
