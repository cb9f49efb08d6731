//! WiFi station connection for ESP32.
//!
//! The gate only talks to its broker once the station has an IP address,
//! so [`Esp32Wifi::new`] blocks until DHCP completes or the retries run out.
//!
//! # Example
//!
//! ```ignore
//! use rs_gate::hal::esp32::Esp32Wifi;
//! use rs_gate::config::WifiConfig;
//!
//! let config = WifiConfig::default()
//!     .with_ssid("GateNet")
//!     .with_password("secret123");
//!
//! let wifi = Esp32Wifi::new(modem, sysloop, nvs, &config)?;
//! log::info!("IP: {:?}", wifi.ip_addr());
//! ```

use std::net::Ipv4Addr;
use std::time::Instant;

use anyhow::{anyhow, Context};
use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};
use log::{info, warn};

use crate::config::WifiConfig;

/// Delay between connection attempts.
const RETRY_DELAY_MS: u32 = 1000;

/// Station-mode WiFi connection, held for the lifetime of this struct.
pub struct Esp32Wifi<'a> {
    wifi: BlockingWifi<EspWifi<'a>>,
}

impl<'a> Esp32Wifi<'a> {
    /// Start the station and connect.
    ///
    /// Retries until `config.max_retries` attempts or `connect_timeout_ms`
    /// is used up (0 disables either limit), then waits for DHCP.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver cannot start, the SSID or password
    /// does not fit, or every attempt fails.
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: Option<EspDefaultNvsPartition>,
        config: &WifiConfig,
    ) -> anyhow::Result<Self> {
        let esp_wifi = EspWifi::new(modem, sysloop.clone(), nvs)?;
        let mut wifi = BlockingWifi::wrap(esp_wifi, sysloop)?;

        let ssid = config.ssid.as_str();
        let auth_method = if config.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };

        wifi.set_configuration(&Configuration::Client(ClientConfiguration {
            ssid: ssid.try_into().map_err(|_| anyhow!("SSID too long"))?,
            password: config
                .password
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("WiFi password too long"))?,
            auth_method,
            ..Default::default()
        }))?;

        info!("[WiFi] Starting...");
        wifi.start()?;

        let started = Instant::now();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            info!("[WiFi] Connecting to '{}' (attempt {})...", ssid, attempt);
            match wifi.connect() {
                Ok(()) => break,
                Err(e) if config.retry_allowed(attempt, started.elapsed().as_millis() as u64) => {
                    warn!("[WiFi] Connect failed: {:?}", e);
                    FreeRtos::delay_ms(RETRY_DELAY_MS);
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!(
                            "could not join '{}' after {} attempts in {} ms",
                            ssid,
                            attempt,
                            started.elapsed().as_millis()
                        )
                    })
                }
            }
        }

        info!("[WiFi] Waiting for DHCP...");
        wifi.wait_netif_up()?;

        let this = Self { wifi };
        if let Some(ip) = this.ip_addr() {
            info!("[WiFi] Connected! IP: {}", ip);
        }
        Ok(this)
    }

    /// Get the current IP address, if connected.
    pub fn ip_addr(&self) -> Option<Ipv4Addr> {
        self.wifi
            .wifi()
            .sta_netif()
            .get_ip_info()
            .ok()
            .map(|info| info.ip)
    }

    /// Check if WiFi is connected.
    pub fn is_connected(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
    }
}
