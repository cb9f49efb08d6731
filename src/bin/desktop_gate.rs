//! Desktop gate for exercising the MQTT protocol without hardware.
//!
//! Runs the full motor stack on mock hardware and bridges it to a real
//! broker. The button and end-of-travel sensors are driven from stdin:
//!
//! | Key | Effect |
//! |-----|--------|
//! | `b` | press the button |
//! | `o` | open limit reached |
//! | `c` | closed limit reached |
//! | `s` | print motor and LED state |
//! | `q` | quit |
//!
//! # Usage
//!
//! ```sh
//! MQTT_HOST=localhost RUST_LOG=debug cargo run --bin desktop_gate --features mqtt
//!
//! # In another shell
//! mosquitto_sub -t 'Inatel/C115/2024/Semester/02/gate/#' -v
//! mosquitto_pub -t 'Inatel/C115/2024/Semester/02/gate/action' -m 0
//! ```
//!
//! # Configuration
//!
//! `MQTT_HOST`, `MQTT_PORT`, `MQTT_PREFIX`, `MQTT_USERNAME`/`MQTT_PASSWORD`,
//! `GATE_NAME`, `GATE_ID` and `GATE_DEBOUNCE_MS` override the defaults. The
//! broker client id is `<GATE_ID>-desktop`.

use std::io::BufRead;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rs_gate::config::{Config, DeviceConfig, GateConfig, MqttConfig};
use rs_gate::hal::{MockHardware, MockParts};
use rs_gate::runtime::{motor_init, motor_start_task};
use rs_gate::services::{GateService, MqttRuntimeConfig, RumqttcClient};
use rs_gate::traits::{MotorDriver, OutputLine};
use rs_gate::{ActionQueue, GateMotor, GateObjectiveState};
use tracing_subscriber::EnvFilter;

/// How long to wait for the broker before giving up.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

fn config_from_env() -> Config {
    let env = |key: &str| std::env::var(key).ok();

    let mut device = DeviceConfig::default();
    if let Some(name) = env("GATE_NAME") {
        device = device.with_name(&name);
    }
    if let Some(id) = env("GATE_ID") {
        device = device.with_id(&id);
    }

    let mut mqtt = MqttConfig::default();
    if let Some(host) = env("MQTT_HOST") {
        mqtt = mqtt.with_host(&host);
    }
    if let Some(port) = env("MQTT_PORT").and_then(|p| p.parse().ok()) {
        mqtt = mqtt.with_port(port);
    }
    if let Some(prefix) = env("MQTT_PREFIX") {
        mqtt = mqtt.with_topic_prefix(&prefix);
    }
    if let (Some(user), Some(pass)) = (env("MQTT_USERNAME"), env("MQTT_PASSWORD")) {
        mqtt = mqtt.with_auth(&user, &pass);
    }

    let mut gate = GateConfig::default().with_consumer_stack_size(64 * 1024);
    if let Some(ms) = env("GATE_DEBOUNCE_MS").and_then(|v| v.parse().ok()) {
        gate = gate.with_debounce_ms(ms);
    }

    Config::default()
        .with_mqtt(mqtt)
        .with_gate(gate)
        .with_device(device)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config_from_env();

    println!("=================================");
    println!("  {} Desktop Gate", config.device.name);
    println!("=================================");
    println!();

    // =========================================================================
    // Motor on mock hardware
    // =========================================================================
    let mock = MockParts::new();
    let motor = motor_init(mock.motor_parts())?;
    let consumer = motor_start_task(Arc::clone(&motor), &config.gate)?;

    // =========================================================================
    // Broker
    // =========================================================================
    let runtime_config = MqttRuntimeConfig::from_config(&config.mqtt)
        .client_id(format!("{}-desktop", config.device.id));
    println!(
        "Connecting to {}:{}...",
        runtime_config.host, runtime_config.port
    );
    let client = RumqttcClient::connect(&runtime_config, CONNECT_TIMEOUT).await?;

    let mut service = GateService::new(Arc::clone(&motor), client, config.mqtt.clone());
    service.subscribe_topics()?;
    service.announce_online()?;

    println!();
    println!("Topics:");
    println!("  Subscribe: {}", config.mqtt.topic("gate/action"));
    println!("  Subscribe: {}", config.mqtt.topic("gate/state"));
    println!("  Publish:   {}", config.mqtt.topic("gate/state/answer"));
    println!();
    println!("Keys: b = button, o = open limit, c = closed limit, s = status, q = quit");
    println!();

    spawn_console(mock.clone(), Arc::clone(&motor), config.gate.debounce_ms);

    // =========================================================================
    // Poll loop
    // =========================================================================
    let mut interval =
        tokio::time::interval(Duration::from_millis(config.gate.poll_interval_ms as u64));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = service.poll() {
                    log::warn!("mqtt: poll failed: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
        if consumer.is_finished() {
            break;
        }
    }

    mock.queue.close();
    let processed = consumer
        .join()
        .map_err(|_| anyhow::anyhow!("consumer task panicked"))?;
    println!("Processed {} queued action(s)", processed);
    Ok(())
}

/// Read keys from stdin on a plain thread, standing in for the GPIO edges.
fn spawn_console(mock: MockParts, motor: Arc<GateMotor<MockHardware>>, debounce_ms: u32) {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match line.trim() {
                "b" => {
                    if mock.button.trigger() {
                        // The debounce timer has no clock of its own on desktop.
                        let timer = mock.timer.clone();
                        thread::spawn(move || {
                            thread::sleep(Duration::from_millis(debounce_ms as u64));
                            timer.fire();
                        });
                    } else {
                        println!("button ignored (debouncing)");
                    }
                }
                "o" => pulse(&mock.open_sensor, "open"),
                "c" => pulse(&mock.close_sensor, "closed"),
                "s" => print_status(&mock, &motor),
                "q" => {
                    mock.queue.close();
                    break;
                }
                "" => {}
                other => println!("unknown key {:?}", other),
            }
        }
    });
}

fn pulse(sensor: &rs_gate::hal::MockLine, name: &str) {
    sensor.set_asserted(true);
    if !sensor.trigger() {
        println!("{} limit ignored (sensor not armed)", name);
    }
    sensor.set_asserted(false);
}

fn print_status(mock: &MockParts, motor: &GateMotor<MockHardware>) {
    let led = |on: bool| if on { "on" } else { "off" };
    println!(
        "direction {} ({:?}), driver {}, last limit {:?}",
        motor.current().as_str(),
        GateObjectiveState::from(motor.current()),
        mock.driver.current().as_str(),
        motor.last_limit(),
    );
    println!(
        "LEDs opening {} closing {} stopped {}; queue {}, dropped {}",
        led(mock.led_opening.is_set()),
        led(mock.led_closing.is_set()),
        led(mock.led_stopped.is_set()),
        mock.queue.len(),
        motor.dropped_actions(),
    );
}
