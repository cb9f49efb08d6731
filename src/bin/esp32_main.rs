//! ESP32 DevKit gate controller.
//!
//! This is the main entry point for the physical hardware controller.
//! Startup is staged:
//! - Motor hardware: inputs, LEDs, H-bridge, debounce timer, action queue
//! - Motor wiring: interrupt handlers registered, button unmasked
//! - Consumer task: drives LEDs and sensor arming from the action queue
//! - WiFi then MQTT (if enabled), followed by the remote command loop
//!
//! # Hardware Setup
//!
//! See [`rs_gate::hal::esp32::pins`] for the wiring.
//!
//! # Build
//!
//! ```bash
//! # Motor, button and sensors only
//! cargo build --release --features esp32 --bin esp32_main
//!
//! # With WiFi + MQTT
//! WIFI_SSID=... WIFI_PASSWORD=... MQTT_HOST=... GATE_ID=... \
//!     cargo build --release --features esp32-mqtt --bin esp32_main
//! ```

use std::thread;
use std::time::Duration;

use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::task::thread::ThreadSpawnConfiguration;
use rs_gate::config::{Config, DeviceConfig, GateConfig};
use rs_gate::hal::esp32::{
    Esp32ActionQueue, Esp32DebounceTimer, Esp32InputLine, Esp32MotorDriver, Esp32OutputLine,
};
use rs_gate::runtime::{motor_init, motor_start_task, CONSUMER_TASK_NAME};
use rs_gate::MotorParts;

/// Idle interval for the main thread when MQTT is not running.
const IDLE_INTERVAL: Duration = Duration::from_secs(10);

/// Maximum wait for the first broker connection before subscribing.
#[cfg(feature = "esp32-mqtt")]
const MQTT_CONNECT_WAIT_MS: u32 = 10_000;

fn main() -> anyhow::Result<()> {
    // Initialize ESP-IDF
    esp_idf_hal::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    // =========================================================================
    // Configuration
    // =========================================================================
    let device = DeviceConfig::default()
        .with_name(option_env!("GATE_NAME").unwrap_or("rs-gate"))
        .with_id(option_env!("GATE_ID").unwrap_or("gate1"));
    let config = Config::default()
        .with_wifi(
            rs_gate::config::WifiConfig::default()
                .with_ssid(option_env!("WIFI_SSID").unwrap_or(""))
                .with_password(option_env!("WIFI_PASSWORD").unwrap_or("")),
        )
        .with_mqtt(
            rs_gate::config::MqttConfig::default()
                .with_host(option_env!("MQTT_HOST").unwrap_or("broker.hivemq.com"))
                .with_client_id(device.id.as_str())
                .with_auth(
                    option_env!("MQTT_USERNAME").unwrap_or(""),
                    option_env!("MQTT_PASSWORD").unwrap_or(""),
                ),
        )
        .with_device(device);

    println!();
    println!("================================");
    println!("  {} ESP32 Controller", config.device.name);
    println!("  id {}", config.device.id);
    println!("================================");
    println!();

    let peripherals = Peripherals::take()?;

    // =========================================================================
    // Initialize Motor Hardware
    // =========================================================================
    let parts = MotorParts {
        button: Esp32InputLine::new(peripherals.pins.gpio14.into())?,
        open_sensor: Esp32InputLine::new(peripherals.pins.gpio23.into())?,
        close_sensor: Esp32InputLine::new(peripherals.pins.gpio22.into())?,
        led_opening: Esp32OutputLine::new(peripherals.pins.gpio27.into())?,
        led_closing: Esp32OutputLine::new(peripherals.pins.gpio26.into())?,
        led_stopped: Esp32OutputLine::new(peripherals.pins.gpio25.into())?,
        timer: Esp32DebounceTimer::new(Duration::from_millis(config.gate.debounce_ms as u64)),
        driver: Esp32MotorDriver::new(
            peripherals.pins.gpio32.into(),
            peripherals.pins.gpio33.into(),
            Duration::from_millis(config.gate.settle_ms as u64),
        )?,
        queue: Esp32ActionQueue::new(),
    };
    println!("[OK] Motor hardware initialized (button GPIO14, sensors GPIO23/22)");

    // =========================================================================
    // Wire Interrupts
    // =========================================================================
    let motor = motor_init(parts)?;
    println!(
        "[OK] Interrupts registered, debounce {} ms",
        config.gate.debounce_ms
    );

    // =========================================================================
    // Start Consumer Task
    // =========================================================================
    let consumer = start_consumer(motor.clone(), &config.gate)?;
    println!(
        "[OK] {} started (priority {})",
        CONSUMER_TASK_NAME, config.gate.consumer_priority
    );

    println!();
    println!("Controls:");
    println!("  Press button: open / stop / close / stop");
    println!();

    // =========================================================================
    // Initialize WiFi (required for MQTT)
    // =========================================================================
    #[cfg(feature = "esp32-mqtt")]
    let _wifi = {
        use esp_idf_svc::eventloop::EspSystemEventLoop;
        use esp_idf_svc::nvs::EspDefaultNvsPartition;
        use rs_gate::hal::esp32::Esp32Wifi;

        if config.wifi.is_configured() && config.mqtt.enabled {
            let sysloop = EspSystemEventLoop::take()?;
            let nvs = EspDefaultNvsPartition::take()?;
            let wifi = Esp32Wifi::new(peripherals.modem, sysloop, Some(nvs), &config.wifi)?;
            println!("[OK] WiFi connected: {:?}", wifi.ip_addr());
            Some(wifi)
        } else {
            println!("[SKIP] WiFi not configured (set WIFI_SSID/WIFI_PASSWORD)");
            None
        }
    };

    // =========================================================================
    // Remote Command Loop
    // =========================================================================
    #[cfg(feature = "esp32-mqtt")]
    if _wifi.is_some() {
        run_mqtt(motor, &config)?;
    }

    // Only the button and sensors drive the gate from here on.
    loop {
        if consumer.is_finished() {
            anyhow::bail!("{} exited", CONSUMER_TASK_NAME);
        }
        thread::sleep(IDLE_INTERVAL);
    }
}

/// Spawn the consumer task with its FreeRTOS priority.
fn start_consumer(
    motor: std::sync::Arc<rs_gate::GateMotor<rs_gate::hal::esp32::Esp32Hardware>>,
    gate: &GateConfig,
) -> anyhow::Result<thread::JoinHandle<usize>> {
    ThreadSpawnConfiguration {
        name: Some(b"motor_task\0".as_slice()),
        priority: gate.consumer_priority,
        ..Default::default()
    }
    .set()?;

    let handle = motor_start_task(motor, gate);

    // Later threads get the default configuration again.
    ThreadSpawnConfiguration::default().set()?;
    Ok(handle?)
}

/// Connect to the broker and serve remote commands forever.
#[cfg(feature = "esp32-mqtt")]
fn run_mqtt(
    motor: std::sync::Arc<rs_gate::GateMotor<rs_gate::hal::esp32::Esp32Hardware>>,
    config: &Config,
) -> anyhow::Result<()> {
    use esp_idf_hal::delay::FreeRtos;
    use log::{info, warn};
    use rs_gate::hal::esp32::Esp32Mqtt;
    use rs_gate::services::GateService;
    use rs_gate::traits::MqttClient;

    let client = Esp32Mqtt::new(&config.mqtt)?;

    let mut waited = 0;
    while !client.is_connected() && waited < MQTT_CONNECT_WAIT_MS {
        FreeRtos::delay_ms(100);
        waited += 100;
    }
    if client.is_connected() {
        println!(
            "[OK] MQTT connected to {}:{}",
            config.mqtt.host, config.mqtt.port
        );
    } else {
        println!("[WARN] MQTT not connected yet, subscribing on connect");
    }

    let mut service = GateService::new(motor, client, config.mqtt.clone());
    let mut was_connected = false;
    let poll_interval = Duration::from_millis(config.gate.poll_interval_ms as u64);

    info!(
        "Serving {} every {} ms",
        config.mqtt.topic("gate/#"),
        config.gate.poll_interval_ms
    );

    loop {
        let connected = service.client().is_connected();
        if connected && !was_connected {
            let result = if service.subscriptions().is_empty() {
                service.subscribe_topics()
            } else {
                service.resubscribe().map(|_| ())
            };
            match result.and_then(|_| service.announce_online()) {
                Ok(()) => info!("MQTT session ready"),
                Err(e) => warn!("MQTT session setup failed: {}", e),
            }
        }
        was_connected = connected;

        if connected {
            if let Err(e) = service.poll() {
                warn!("MQTT poll failed: {}", e);
            }
        }
        thread::sleep(poll_interval);
    }
}
