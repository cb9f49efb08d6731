//! # rs-gate
//!
//! An automatic gate controller: a reversible motor, two end-of-travel
//! sensors, a manual button, status LEDs, and a remote MQTT command channel.
//!
//! ## Features
//!
//! - **Lock-free direction state**: button, sensor and remote writers share one atomic cell
//! - **Interrupt-safe handoff**: button presses reach a consumer task through a bounded queue
//! - **Safety precedence**: sensor trips stop the motor from interrupt context, bypassing the queue
//! - **Debounced button**: re-enabled only by a one-shot timer
//! - **Remote control**: open/close/stop and state queries over MQTT, with an "already achieved" answer
//!
//! ## Architecture
//!
//! The crate is structured to allow testing on desktop without hardware:
//!
//! - `direction` - Direction states, the button toggle rule, the atomic cell
//! - `queue` - Interrupt-to-task action queue
//! - `motor` - Handler bodies binding the state machine to hardware
//! - `runtime` - Instance slot, callback wiring, consumer task
//! - `gate` - Remote protocol and coordinator
//! - `traits` - Hardware and network abstractions
//! - `hal` - Concrete implementations (mock for testing, esp32 for hardware)
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use rs_gate::hal::{MockMqtt, MockParts};
//! use rs_gate::runtime::motor_init;
//! use rs_gate::{GateAction, GateAnswer, GateCoordinator, GateObjectiveState, GateTopics};
//!
//! // Wire the motor to mock hardware
//! let mock = MockParts::new();
//! let motor = motor_init(mock.motor_parts()).unwrap();
//!
//! // Remote open
//! let gate = GateCoordinator::new(Arc::clone(&motor), GateTopics::new("home"));
//! let mut mqtt = MockMqtt::new();
//! let answer = gate.handle_remote_action(&mut mqtt, GateAction::Open).unwrap();
//! assert_eq!(answer, GateAnswer::State(GateObjectiveState::Opened));
//!
//! // Button press stops the moving gate
//! mock.button.trigger();
//! assert_eq!(gate.objective_state(), GateObjectiveState::Stopped);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]

extern crate alloc;

/// Direction states, button toggle rule and the atomic direction cell.
pub mod direction;
/// Gate-level remote protocol and coordinator.
pub mod gate;
/// Hardware abstraction layer with mock implementations for testing.
pub mod hal;
/// Motor state machine bound to its hardware.
pub mod motor;
/// Interrupt-to-task action queue.
pub mod queue;
/// Core traits for hardware and network abstraction.
pub mod traits;

/// Shared configuration system for desktop and ESP32.
pub mod config;

/// Instance slot, callback wiring and the consumer task.
#[cfg(feature = "std")]
pub mod runtime;

/// MQTT services (runner, desktop client).
#[cfg(feature = "std")]
pub mod services;

// Re-exports for convenience
pub use direction::{
    compute_next_on_button, DirectionCell, DirectionSnapshot, MotorAction, MotorDirectionState,
    Transition,
};
pub use gate::{
    GateAction, GateAnswer, GateCoordinator, GateError, GateObjectiveState, GateTopics,
    InvalidActionCode,
};
pub use motor::{ButtonOutcome, DequeueOutcome, GateMotor, LimitSensor, MotorParts};
pub use queue::{ActionQueue, ActionSource, QueuedAction, ACTION_QUEUE_CAPACITY};
pub use traits::{
    // Hardware
    DebounceTimer,
    InterruptLine,
    MotorDriver,
    MotorHardware,
    // Network
    MqttClient,
    MqttMessage,
    OutputLine,
};
