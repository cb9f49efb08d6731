//! Trait definitions for hardware abstraction and messaging.
//!
//! These abstractions let the gate core run on the ESP32 and on desktop
//! with mocks.
//!
//! # Submodules
//!
//! - `hardware`: LEDs, interrupt inputs, debounce timer, motor actuation
//! - `network`: MQTT client
//!
//! # Hardware Abstraction
//!
//! - [`OutputLine`]: status LEDs
//! - [`InterruptLine`]: button and end-of-travel sensors
//! - [`DebounceTimer`]: re-enables the button after a quiet interval
//! - [`MotorDriver`]: drive and brake the gate motor
//! - [`MotorHardware`]: bundles the concrete types for a platform

pub mod hardware;
pub mod network;

pub use hardware::*;
pub use network::*;
