//! Shared configuration system for desktop and ESP32.
//!
//! Uses `heapless::String` for `no_std` compatibility while remaining
//! ergonomic to use on desktop with `std`.
//!
//! # Example
//!
//! ```rust
//! use rs_gate::config::{Config, GateConfig, MqttConfig};
//!
//! // Use defaults
//! let config = Config::default();
//! assert_eq!(config.gate.debounce_ms, 2000);
//!
//! // Or customize
//! let config = Config::default()
//!     .with_mqtt(MqttConfig::default().with_host("192.168.1.100"))
//!     .with_gate(GateConfig::default().with_debounce_ms(500));
//! ```

use heapless::String as HString;

/// Maximum length for short config strings (hostnames, client IDs)
pub const MAX_SHORT_STRING: usize = 64;

/// Maximum length for longer config strings (topic prefixes, URLs)
pub const MAX_LONG_STRING: usize = 128;

/// Type alias for short config strings
pub type ShortString = HString<MAX_SHORT_STRING>;

/// Type alias for longer config strings
pub type LongString = HString<MAX_LONG_STRING>;

// ============================================================================
// Helper for creating heapless strings
// ============================================================================

fn truncated<const N: usize>(s: &str) -> HString<N> {
    let mut hs = HString::new();
    // Find valid UTF-8 boundary
    let valid_end = s
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .take_while(|&end| end <= N)
        .last()
        .unwrap_or(0);
    let _ = hs.push_str(&s[..valid_end]);
    hs
}

/// Create a ShortString from a &str, truncating if too long
pub fn short_string(s: &str) -> ShortString {
    truncated(s)
}

/// Create a LongString from a &str, truncating if too long
pub fn long_string(s: &str) -> LongString {
    truncated(s)
}

// ============================================================================
// Main Config
// ============================================================================

/// Complete application configuration
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// WiFi connection configuration
    pub wifi: WifiConfig,
    /// MQTT client configuration
    pub mqtt: MqttConfig,
    /// Motor and gate timing
    pub gate: GateConfig,
    /// Device identification
    pub device: DeviceConfig,
}

impl Config {
    /// Set WiFi configuration
    pub fn with_wifi(mut self, wifi: WifiConfig) -> Self {
        self.wifi = wifi;
        self
    }

    /// Set MQTT configuration
    pub fn with_mqtt(mut self, mqtt: MqttConfig) -> Self {
        self.mqtt = mqtt;
        self
    }

    /// Set gate configuration
    pub fn with_gate(mut self, gate: GateConfig) -> Self {
        self.gate = gate;
        self
    }

    /// Set device configuration
    pub fn with_device(mut self, device: DeviceConfig) -> Self {
        self.device = device;
        self
    }
}

// ============================================================================
// MQTT Config
// ============================================================================

/// Default topic prefix the gate listens below.
pub const DEFAULT_TOPIC_PREFIX: &str = "Inatel/C115/2024/Semester/02";

/// MQTT client configuration
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MqttConfig {
    /// Broker hostname or IP
    pub host: ShortString,
    /// Broker port. 1883 is plain TCP, anything else uses TLS.
    pub port: u16,
    /// Client ID (should be unique per device)
    pub client_id: ShortString,
    /// Topic prefix for all pub/sub (e.g., "home" -> "home/gate/action")
    pub topic_prefix: LongString,
    /// Username for authentication (empty = no auth)
    pub username: ShortString,
    /// Password for authentication
    pub password: ShortString,
    /// Keep-alive interval in seconds
    pub keep_alive_secs: u16,
    /// Last-will topic suffix, published by the broker on disconnect
    pub last_will_suffix: ShortString,
    /// Last-will payload
    pub last_will_payload: ShortString,
    /// Whether MQTT is enabled
    pub enabled: bool,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: short_string("localhost"),
            port: 1883,
            client_id: short_string("rs-gate"),
            topic_prefix: long_string(DEFAULT_TOPIC_PREFIX),
            username: ShortString::new(),
            password: ShortString::new(),
            keep_alive_secs: 30,
            last_will_suffix: short_string("gate/status"),
            last_will_payload: short_string("offline"),
            enabled: true,
        }
    }
}

impl MqttConfig {
    /// Set the broker host
    pub fn with_host(mut self, host: &str) -> Self {
        self.host = short_string(host);
        self
    }

    /// Set the broker port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the client ID
    pub fn with_client_id(mut self, id: &str) -> Self {
        self.client_id = short_string(id);
        self
    }

    /// Set the topic prefix
    pub fn with_topic_prefix(mut self, prefix: &str) -> Self {
        self.topic_prefix = long_string(prefix);
        self
    }

    /// Set authentication credentials
    pub fn with_auth(mut self, username: &str, password: &str) -> Self {
        self.username = short_string(username);
        self.password = short_string(password);
        self
    }

    /// Set the keep-alive interval
    pub fn with_keep_alive_secs(mut self, secs: u16) -> Self {
        self.keep_alive_secs = secs;
        self
    }

    /// Set the last-will topic suffix and payload
    pub fn with_last_will(mut self, suffix: &str, payload: &str) -> Self {
        self.last_will_suffix = short_string(suffix);
        self.last_will_payload = short_string(payload);
        self
    }

    /// Enable or disable MQTT
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Build a topic string with the configured prefix
    pub fn topic(&self, suffix: &str) -> LongString {
        let mut topic = self.topic_prefix.clone();
        let _ = topic.push('/');
        let _ = topic.push_str(suffix);
        topic
    }

    /// Fully qualified last-will topic
    pub fn last_will_topic(&self) -> LongString {
        self.topic(self.last_will_suffix.as_str())
    }

    /// Whether the broker connection uses TLS
    pub fn uses_tls(&self) -> bool {
        self.port != 1883
    }

    /// Broker URL: `mqtt://host:1883`, or `mqtts://host:port` for any other port
    pub fn broker_url(&self) -> LongString {
        let scheme = if self.uses_tls() { "mqtts" } else { "mqtt" };
        let mut url = LongString::new();
        let _ = core::fmt::Write::write_fmt(
            &mut url,
            format_args!("{}://{}:{}", scheme, self.host, self.port),
        );
        url
    }

    /// Check if authentication is configured
    pub fn has_auth(&self) -> bool {
        !self.username.is_empty()
    }
}

// ============================================================================
// Gate Config
// ============================================================================

/// Motor, debounce and task configuration
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GateConfig {
    /// Quiet interval after a button press before the button is re-enabled
    pub debounce_ms: u32,
    /// Consumer task stack size in bytes
    pub consumer_stack_size: usize,
    /// Consumer task priority (FreeRTOS priority on ESP32)
    pub consumer_priority: u8,
    /// Interval between MQTT polls in the command loop
    pub poll_interval_ms: u32,
    /// Brake time before the motor changes direction
    pub settle_ms: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 2000,
            consumer_stack_size: 4096,
            consumer_priority: 10,
            poll_interval_ms: 50,
            settle_ms: 300,
        }
    }
}

impl GateConfig {
    /// Set the debounce interval
    pub fn with_debounce_ms(mut self, ms: u32) -> Self {
        self.debounce_ms = ms;
        self
    }

    /// Set the consumer task stack size
    pub fn with_consumer_stack_size(mut self, bytes: usize) -> Self {
        self.consumer_stack_size = bytes;
        self
    }

    /// Set the consumer task priority
    pub fn with_consumer_priority(mut self, priority: u8) -> Self {
        self.consumer_priority = priority;
        self
    }

    /// Set the MQTT poll interval
    pub fn with_poll_interval_ms(mut self, ms: u32) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set the direction-change settle time
    pub fn with_settle_ms(mut self, ms: u32) -> Self {
        self.settle_ms = ms;
        self
    }
}

// ============================================================================
// WiFi Config
// ============================================================================

/// WiFi connection configuration
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WifiConfig {
    /// WiFi network SSID
    pub ssid: ShortString,
    /// WiFi password
    pub password: ShortString,
    /// Overall time allowed for joining the network, in milliseconds (0 = no limit)
    pub connect_timeout_ms: u32,
    /// Whether WiFi is enabled
    pub enabled: bool,
    /// Maximum connection retry attempts (0 = unlimited)
    pub max_retries: u8,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            ssid: ShortString::new(),
            password: ShortString::new(),
            connect_timeout_ms: 30_000,
            enabled: true,
            max_retries: 5,
        }
    }
}

impl WifiConfig {
    /// Set the SSID
    pub fn with_ssid(mut self, ssid: &str) -> Self {
        self.ssid = short_string(ssid);
        self
    }

    /// Set the password
    pub fn with_password(mut self, password: &str) -> Self {
        self.password = short_string(password);
        self
    }

    /// Set the connection timeout
    pub fn with_connect_timeout_ms(mut self, ms: u32) -> Self {
        self.connect_timeout_ms = ms;
        self
    }

    /// Enable or disable WiFi
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the maximum retry count
    pub fn with_max_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries;
        self
    }

    /// Check if WiFi credentials are configured
    pub fn is_configured(&self) -> bool {
        !self.ssid.is_empty()
    }

    /// Whether another join attempt is allowed after `attempts` failures
    /// spread over `elapsed_ms`.
    pub fn retry_allowed(&self, attempts: u32, elapsed_ms: u64) -> bool {
        let retries_left = self.max_retries == 0 || attempts < self.max_retries as u32;
        let time_left =
            self.connect_timeout_ms == 0 || elapsed_ms < self.connect_timeout_ms as u64;
        retries_left && time_left
    }
}

// ============================================================================
// Device Config
// ============================================================================

/// Device identification configuration
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceConfig {
    /// Human-readable device name
    pub name: ShortString,
    /// Device ID
    pub id: ShortString,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: short_string("rs-gate"),
            id: short_string("gate1"),
        }
    }
}

impl DeviceConfig {
    /// Set the device name
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = short_string(name);
        self
    }

    /// Set the device ID
    pub fn with_id(mut self, id: &str) -> Self {
        self.id = short_string(id);
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.gate.debounce_ms, 2000);
        assert_eq!(
            config.mqtt.topic_prefix.as_str(),
            "Inatel/C115/2024/Semester/02"
        );
    }

    #[test]
    fn mqtt_topic_building() {
        let mqtt = MqttConfig::default().with_topic_prefix("home/front");
        let topic = mqtt.topic("gate/action");
        assert_eq!(topic.as_str(), "home/front/gate/action");
    }

    #[test]
    fn mqtt_auth_detection() {
        let no_auth = MqttConfig::default();
        assert!(!no_auth.has_auth());

        let with_auth = MqttConfig::default().with_auth("user", "pass");
        assert!(with_auth.has_auth());
    }

    #[test]
    fn short_string_truncation() {
        let long_input = "a".repeat(100);
        let s = short_string(&long_input);
        assert_eq!(s.len(), MAX_SHORT_STRING);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::default()
            .with_mqtt(
                MqttConfig::default()
                    .with_host("broker.local")
                    .with_port(8883),
            )
            .with_gate(GateConfig::default().with_settle_ms(100))
            .with_device(DeviceConfig::default().with_name("Front Gate"));

        assert_eq!(config.mqtt.host.as_str(), "broker.local");
        assert_eq!(config.mqtt.port, 8883);
        assert_eq!(config.gate.settle_ms, 100);
        assert_eq!(config.device.name.as_str(), "Front Gate");
    }

    // =========================================================================
    // MqttConfig Tests
    // =========================================================================

    #[test]
    fn broker_url_scheme_by_port() {
        let plain = MqttConfig::default().with_host("broker.hivemq.com");
        assert_eq!(plain.broker_url().as_str(), "mqtt://broker.hivemq.com:1883");
        assert!(!plain.uses_tls());

        let tls = plain.with_port(8883);
        assert_eq!(tls.broker_url().as_str(), "mqtts://broker.hivemq.com:8883");
        assert!(tls.uses_tls());
    }

    #[test]
    fn last_will_topic() {
        let mqtt = MqttConfig::default().with_topic_prefix("home");
        assert_eq!(mqtt.last_will_topic().as_str(), "home/gate/status");
        assert_eq!(mqtt.last_will_payload.as_str(), "offline");

        let mqtt = mqtt.with_last_will("gate/lwt", "gone");
        assert_eq!(mqtt.last_will_topic().as_str(), "home/gate/lwt");
        assert_eq!(mqtt.last_will_payload.as_str(), "gone");
    }

    #[test]
    fn mqtt_config_full_builder() {
        let mqtt = MqttConfig::default()
            .with_host("broker.example.com")
            .with_port(8883)
            .with_client_id("gate-42")
            .with_topic_prefix("site/gate42")
            .with_auth("user", "pass")
            .with_keep_alive_secs(60)
            .with_enabled(false);

        assert_eq!(mqtt.host.as_str(), "broker.example.com");
        assert_eq!(mqtt.client_id.as_str(), "gate-42");
        assert_eq!(mqtt.topic_prefix.as_str(), "site/gate42");
        assert_eq!(mqtt.username.as_str(), "user");
        assert_eq!(mqtt.password.as_str(), "pass");
        assert_eq!(mqtt.keep_alive_secs, 60);
        assert!(!mqtt.enabled);
    }

    // =========================================================================
    // GateConfig Tests
    // =========================================================================

    #[test]
    fn gate_config_default() {
        let gate = GateConfig::default();
        assert_eq!(gate.debounce_ms, 2000);
        assert_eq!(gate.consumer_stack_size, 4096);
        assert_eq!(gate.consumer_priority, 10);
        assert_eq!(gate.poll_interval_ms, 50);
        assert_eq!(gate.settle_ms, 300);
    }

    #[test]
    fn gate_config_builder() {
        let gate = GateConfig::default()
            .with_debounce_ms(50)
            .with_consumer_stack_size(8192)
            .with_consumer_priority(5)
            .with_poll_interval_ms(10)
            .with_settle_ms(0);

        assert_eq!(gate.debounce_ms, 50);
        assert_eq!(gate.consumer_stack_size, 8192);
        assert_eq!(gate.consumer_priority, 5);
        assert_eq!(gate.poll_interval_ms, 10);
        assert_eq!(gate.settle_ms, 0);
    }

    // =========================================================================
    // WifiConfig Tests
    // =========================================================================

    #[test]
    fn wifi_config_is_configured() {
        let unconfigured = WifiConfig::default();
        assert!(!unconfigured.is_configured());

        let configured = WifiConfig::default().with_ssid("MyNetwork");
        assert!(configured.is_configured());
    }

    #[test]
    fn wifi_config_builder() {
        let wifi = WifiConfig::default()
            .with_ssid("TestNetwork")
            .with_password("secret123")
            .with_connect_timeout_ms(15_000)
            .with_max_retries(3)
            .with_enabled(false);

        assert_eq!(wifi.ssid.as_str(), "TestNetwork");
        assert_eq!(wifi.password.as_str(), "secret123");
        assert_eq!(wifi.connect_timeout_ms, 15_000);
        assert_eq!(wifi.max_retries, 3);
        assert!(!wifi.enabled);
    }

    #[test]
    fn wifi_retry_stops_at_count_or_timeout() {
        let wifi = WifiConfig::default()
            .with_max_retries(3)
            .with_connect_timeout_ms(5_000);
        assert!(wifi.retry_allowed(1, 0));
        assert!(wifi.retry_allowed(2, 4_999));
        assert!(!wifi.retry_allowed(3, 100));
        assert!(!wifi.retry_allowed(1, 5_000));
    }

    #[test]
    fn wifi_retry_limits_can_be_disabled() {
        let forever = WifiConfig::default()
            .with_max_retries(0)
            .with_connect_timeout_ms(0);
        assert!(forever.retry_allowed(1_000, u64::MAX));

        let timed = WifiConfig::default()
            .with_max_retries(0)
            .with_connect_timeout_ms(30_000);
        assert!(timed.retry_allowed(500, 29_999));
        assert!(!timed.retry_allowed(500, 30_000));
    }

    #[test]
    fn device_config_default() {
        let device = DeviceConfig::default();
        assert_eq!(device.name.as_str(), "rs-gate");
        assert_eq!(device.id.as_str(), "gate1");
    }

    // =========================================================================
    // String Helper Tests
    // =========================================================================

    #[test]
    fn long_string_truncation() {
        let long_input = "b".repeat(200);
        let s = long_string(&long_input);
        assert_eq!(s.len(), MAX_LONG_STRING);
    }

    #[test]
    fn string_helpers_utf8_boundary() {
        // 4-byte characters: 64 / 4 = 16 fit exactly, 17 do not
        let input = "\u{1F6AA}".repeat(17);
        let s = short_string(&input);
        assert_eq!(s.len(), 64);
        assert!(core::str::from_utf8(s.as_bytes()).is_ok());

        let odd = format!("a{}", "\u{1F6AA}".repeat(16));
        assert_eq!(short_string(&odd).len(), 61);
    }
}
