//! ESP32 DevKit hardware abstraction layer for the gate controller.
//!
//! This module provides hardware implementations for an ESP32 DevKit
//! driving a reversible gate motor through an H-bridge.
//!
//! # Hardware Configuration
//!
//! - **MCU**: ESP32 (Xtensa dual core, 240MHz)
//! - **Motor Driver**: H-bridge (L298N or similar) on two direction inputs
//! - **Inputs**: push button and two end-of-travel switches, active low
//! - **Indicators**: opening, closing and stopped LEDs
//!
//! Every type here is usable through `&self` from interrupt context: level
//! changes go straight to the GPIO registers via `esp-idf-sys`, and state is
//! mirrored in atomics.
//!
//! # Pin Assignments
//!
//! See the [`pins`] module for GPIO assignments.

mod gpio;
mod motor;
mod queue;
mod timer;

pub use gpio::{Esp32InputLine, Esp32OutputLine};
pub use motor::Esp32MotorDriver;
pub use queue::Esp32ActionQueue;
pub use timer::Esp32DebounceTimer;

#[cfg(feature = "wifi")]
mod wifi;
#[cfg(feature = "wifi")]
pub use wifi::Esp32Wifi;

#[cfg(feature = "esp32-mqtt")]
mod mqtt;
#[cfg(feature = "esp32-mqtt")]
pub use mqtt::{Esp32Mqtt, Esp32MqttError};

use crate::traits::MotorHardware;

/// ESP32 platform for [`GateMotor`](crate::GateMotor).
#[derive(Debug)]
pub struct Esp32Hardware;

impl MotorHardware for Esp32Hardware {
    type Input = Esp32InputLine;
    type Output = Esp32OutputLine;
    type Timer = Esp32DebounceTimer;
    type Driver = Esp32MotorDriver;
    type Queue = Esp32ActionQueue;
}

/// Pin assignments for the ESP32 DevKit gate board.
pub mod pins {
    // =========================================================================
    // Inputs (internal pull-up, active low, falling-edge interrupt)
    // =========================================================================

    /// Manual toggle button
    pub const BUTTON: i32 = 14;

    /// End-of-travel switch at the open limit
    pub const OPEN_SENSOR: i32 = 23;

    /// End-of-travel switch at the closed limit
    pub const CLOSE_SENSOR: i32 = 22;

    // =========================================================================
    // Status LEDs
    // =========================================================================

    /// Lit while opening
    pub const LED_OPENING: i32 = 27;

    /// Lit while closing
    pub const LED_CLOSING: i32 = 26;

    /// Lit while stopped
    pub const LED_STOPPED: i32 = 25;

    // =========================================================================
    // Motor Control (H-bridge)
    // =========================================================================

    /// H-bridge input 1, high to open
    pub const MOTOR_IN1: i32 = 32;

    /// H-bridge input 2, high to close
    pub const MOTOR_IN2: i32 = 33;
}
