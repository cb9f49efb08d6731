//! Mock implementations for testing without hardware.
//!
//! Every hardware mock is a cheap-to-clone handle over shared state: move one
//! clone into a [`GateMotor`](crate::GateMotor) and keep another in the test
//! to inspect it or to fire interrupts and timers by hand.
//!
//! # Available Mocks
//!
//! | Mock | Trait | Purpose |
//! |------|-------|---------|
//! | [`MockLine`] | [`InterruptLine`] | Input level, mask state, `trigger()` runs the handler |
//! | [`MockLed`] | [`OutputLine`] | Tracks level and write count |
//! | [`MockTimer`] | [`DebounceTimer`] | `fire()` runs the callback once per arm |
//! | [`MockDriver`] | [`MotorDriver`] | Records distinct actions |
//! | [`MockMqtt`] | [`MqttClient`] | Captures pub/sub operations |
//!
//! # Example
//!
//! ```rust
//! use rs_gate::hal::MockParts;
//! use rs_gate::traits::InterruptLine;
//! use rs_gate::{GateMotor, MotorDirectionState};
//!
//! let mock = MockParts::new();
//! let motor = GateMotor::new(mock.motor_parts());
//!
//! motor.on_button();
//! assert_eq!(motor.current(), MotorDirectionState::Clockwise);
//! assert!(!mock.button.is_armed());
//! ```
//!
//! [`InterruptLine`]: crate::traits::InterruptLine
//! [`OutputLine`]: crate::traits::OutputLine
//! [`DebounceTimer`]: crate::traits::DebounceTimer
//! [`MotorDriver`]: crate::traits::MotorDriver
//! [`MqttClient`]: crate::traits::MqttClient

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::direction::MotorAction;
use crate::motor::MotorParts;
use crate::queue::BoundedActionQueue;
use crate::traits::{
    DebounceTimer, InterruptLine, MotorDriver, MotorHardware, MqttClient, MqttMessage, OutputLine,
};

type Handler = Box<dyn FnMut() + Send>;

// ============================================================================
// Hardware Mocks
// ============================================================================

#[derive(Default)]
struct LineState {
    level: AtomicBool,
    armed: AtomicBool,
    enables: AtomicUsize,
    disables: AtomicUsize,
    handler: Mutex<Option<Handler>>,
}

/// Mock button or limit sensor.
///
/// Active-high: [`set_asserted`](Self::set_asserted) sets the raw level.
/// [`trigger`](Self::trigger) simulates an edge and runs the handler only if
/// the interrupt is unmasked, as the hardware would.
#[derive(Clone, Default)]
pub struct MockLine {
    state: Arc<LineState>,
}

impl core::fmt::Debug for MockLine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MockLine")
            .field("level", &self.state.level.load(Ordering::Relaxed))
            .field("armed", &self.state.armed.load(Ordering::Relaxed))
            .finish()
    }
}

impl MockLine {
    /// Creates a masked, deasserted line.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the input level.
    pub fn set_asserted(&self, asserted: bool) {
        self.state.level.store(asserted, Ordering::SeqCst);
    }

    /// Simulate an edge. Returns `true` if the handler ran.
    pub fn trigger(&self) -> bool {
        if !self.state.armed.load(Ordering::SeqCst) {
            return false;
        }
        let mut handler = self
            .state
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match handler.as_mut() {
            Some(run) => {
                run();
                true
            }
            None => false,
        }
    }

    /// Whether a handler has been registered.
    pub fn has_handler(&self) -> bool {
        self.state
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Number of `enable_interrupt` calls.
    pub fn enable_count(&self) -> usize {
        self.state.enables.load(Ordering::SeqCst)
    }

    /// Number of `disable_interrupt` calls.
    pub fn disable_count(&self) -> usize {
        self.state.disables.load(Ordering::SeqCst)
    }
}

impl InterruptLine for MockLine {
    type Error = ();

    fn read(&self) -> bool {
        self.state.level.load(Ordering::SeqCst)
    }

    fn is_asserted(&self) -> bool {
        self.read()
    }

    fn enable_interrupt(&self) -> Result<(), ()> {
        self.state.enables.fetch_add(1, Ordering::SeqCst);
        self.state.armed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn disable_interrupt(&self) -> Result<(), ()> {
        self.state.disables.fetch_add(1, Ordering::SeqCst);
        self.state.armed.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_armed(&self) -> bool {
        self.state.armed.load(Ordering::SeqCst)
    }

    fn subscribe<F>(&mut self, handler: F) -> Result<(), ()>
    where
        F: FnMut() + Send + 'static,
    {
        *self
            .state
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Box::new(handler));
        Ok(())
    }
}

#[derive(Default)]
struct LedState {
    on: AtomicBool,
    writes: AtomicUsize,
    hook: Mutex<Option<Handler>>,
}

/// Mock status LED.
#[derive(Clone, Default)]
pub struct MockLed {
    state: Arc<LedState>,
}

impl core::fmt::Debug for MockLed {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MockLed")
            .field("on", &self.state.on.load(Ordering::Relaxed))
            .field("writes", &self.state.writes.load(Ordering::Relaxed))
            .finish()
    }
}

impl MockLed {
    /// Creates an LED that is off.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `hook` after every `write`, standing in for another context
    /// that acts while outputs are being updated.
    pub fn on_write<F>(&self, hook: F)
    where
        F: FnMut() + Send + 'static,
    {
        *self
            .state
            .hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Box::new(hook));
    }

    /// Number of `write` and `toggle` calls.
    pub fn write_count(&self) -> usize {
        self.state.writes.load(Ordering::SeqCst)
    }
}

impl OutputLine for MockLed {
    type Error = ();

    fn write(&self, on: bool) -> Result<(), ()> {
        self.state.writes.fetch_add(1, Ordering::SeqCst);
        self.state.on.store(on, Ordering::SeqCst);
        if let Some(hook) = self
            .state
            .hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            hook();
        }
        Ok(())
    }

    fn toggle(&self) -> Result<(), ()> {
        self.state.writes.fetch_add(1, Ordering::SeqCst);
        self.state.on.fetch_xor(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_set(&self) -> bool {
        self.state.on.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct TimerState {
    armed: AtomicBool,
    arms: AtomicUsize,
    fail_arm: AtomicBool,
    callback: Mutex<Option<Handler>>,
}

/// Mock debounce timer. Time never passes on its own; call [`fire`](Self::fire).
#[derive(Clone, Default)]
pub struct MockTimer {
    state: Arc<TimerState>,
}

impl core::fmt::Debug for MockTimer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MockTimer")
            .field("armed", &self.state.armed.load(Ordering::Relaxed))
            .field("arms", &self.state.arms.load(Ordering::Relaxed))
            .finish()
    }
}

impl MockTimer {
    /// Creates an idle timer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Expire the interval. Runs the callback once if armed.
    pub fn fire(&self) -> bool {
        if !self.state.armed.swap(false, Ordering::SeqCst) {
            return false;
        }
        let mut callback = self
            .state
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(run) = callback.as_mut() {
            run();
        }
        true
    }

    /// Whether an interval is pending.
    pub fn is_armed(&self) -> bool {
        self.state.armed.load(Ordering::SeqCst)
    }

    /// Make every following `arm` fail.
    pub fn set_fail_arm(&self, fail: bool) {
        self.state.fail_arm.store(fail, Ordering::SeqCst);
    }

    /// Number of `arm` calls.
    pub fn arm_count(&self) -> usize {
        self.state.arms.load(Ordering::SeqCst)
    }
}

impl DebounceTimer for MockTimer {
    type Error = ();

    fn subscribe<F>(&mut self, callback: F) -> Result<(), ()>
    where
        F: FnMut() + Send + 'static,
    {
        *self
            .state
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Box::new(callback));
        Ok(())
    }

    fn arm(&self) -> Result<(), ()> {
        self.state.arms.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_arm.load(Ordering::SeqCst) {
            return Err(());
        }
        self.state.armed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct DriverState {
    current: AtomicU8,
    calls: AtomicUsize,
    history: Mutex<Vec<MotorAction>>,
}

/// Mock motor driver.
///
/// `history` records each change of action; repeated drives of the action
/// in effect are counted but not recorded.
#[derive(Clone, Debug, Default)]
pub struct MockDriver {
    state: Arc<DriverState>,
}

impl MockDriver {
    /// Creates a stopped driver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Distinct actions applied, oldest first.
    pub fn history(&self) -> Vec<MotorAction> {
        self.state
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of `drive` calls, including no-ops.
    pub fn call_count(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }
}

impl MotorDriver for MockDriver {
    type Error = ();

    fn drive(&self, action: MotorAction) -> Result<(), ()> {
        self.state.calls.fetch_add(1, Ordering::SeqCst);
        let previous = self.state.current.swap(action as u8, Ordering::SeqCst);
        if previous != action as u8 {
            self.state
                .history
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(action);
        }
        Ok(())
    }

    fn current(&self) -> MotorAction {
        match self.state.current.load(Ordering::SeqCst) {
            1 => MotorAction::Clockwise,
            2 => MotorAction::CounterClockwise,
            _ => MotorAction::Stop,
        }
    }
}

/// Mock platform for [`GateMotor`](crate::GateMotor).
#[derive(Debug)]
pub struct MockHardware;

impl MotorHardware for MockHardware {
    type Input = MockLine;
    type Output = MockLed;
    type Timer = MockTimer;
    type Driver = MockDriver;
    type Queue = Arc<BoundedActionQueue>;
}

/// One handle to every mock of a [`MockHardware`] motor.
#[derive(Clone, Debug, Default)]
pub struct MockParts {
    /// Manual button.
    pub button: MockLine,
    /// Open limit sensor.
    pub open_sensor: MockLine,
    /// Closed limit sensor.
    pub close_sensor: MockLine,
    /// Opening LED.
    pub led_opening: MockLed,
    /// Closing LED.
    pub led_closing: MockLed,
    /// Stopped LED.
    pub led_stopped: MockLed,
    /// Debounce timer.
    pub timer: MockTimer,
    /// Motor driver.
    pub driver: MockDriver,
    /// Action queue.
    pub queue: Arc<BoundedActionQueue>,
}

impl MockParts {
    /// Fresh set of mocks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clones of every handle, ready to move into a motor.
    pub fn motor_parts(&self) -> MotorParts<MockHardware> {
        MotorParts {
            button: self.button.clone(),
            open_sensor: self.open_sensor.clone(),
            close_sensor: self.close_sensor.clone(),
            led_opening: self.led_opening.clone(),
            led_closing: self.led_closing.clone(),
            led_stopped: self.led_stopped.clone(),
            timer: self.timer.clone(),
            driver: self.driver.clone(),
            queue: Arc::clone(&self.queue),
        }
    }

    /// True when at most one sensor is armed and none is armed exactly
    /// when the stopped LED is lit.
    pub fn arming_consistent(&self) -> bool {
        let open = self.open_sensor.is_armed();
        let close = self.close_sensor.is_armed();
        !(open && close) && ((open || close) != self.led_stopped.is_set())
    }
}

// ============================================================================
// Network Mocks
// ============================================================================

/// Mock MQTT client for testing.
///
/// Captures all publish and subscribe operations for verification.
///
/// # Example
///
/// ```rust
/// use rs_gate::hal::MockMqtt;
/// use rs_gate::traits::MqttClient;
///
/// let mut mqtt = MockMqtt::new();
///
/// // Queue incoming message
/// mqtt.queue_message("gate/action", b"0".to_vec());
/// assert!(mqtt.try_recv().is_some());
///
/// mqtt.publish("gate/state/answer", b"0", false).unwrap();
/// assert_eq!(mqtt.published_to("gate/state/answer").len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MockMqtt {
    /// Messages that have been published (topic, payload, retain).
    pub published: Vec<(String, Vec<u8>, bool)>,
    /// Topics that have been subscribed to.
    pub subscriptions: Vec<String>,
    /// Queue of incoming messages to be returned by `try_recv()`.
    pub incoming: Vec<MqttMessage>,
    /// Whether the client is connected.
    pub connected: bool,
    /// Make every publish fail.
    pub fail_publish: bool,
}

impl MockMqtt {
    /// Creates a new mock MQTT client in connected state.
    pub fn new() -> Self {
        Self {
            connected: true,
            ..Default::default()
        }
    }

    /// Queue an incoming message
    pub fn queue_message(&mut self, topic: impl Into<String>, payload: impl Into<Vec<u8>>) {
        self.incoming.push(MqttMessage::new(topic, payload));
    }

    /// Check if a topic was subscribed to
    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.subscriptions.iter().any(|t| t == topic)
    }

    /// Payloads published to a topic, as text
    pub fn published_to(&self, topic: &str) -> Vec<String> {
        self.published
            .iter()
            .filter(|(t, _, _)| t == topic)
            .map(|(_, payload, _)| String::from_utf8_lossy(payload).into_owned())
            .collect()
    }
}

impl MqttClient for MockMqtt {
    type Error = ();

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), ()> {
        if self.fail_publish {
            return Err(());
        }
        self.published
            .push((topic.into(), payload.to_vec(), retain));
        Ok(())
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), ()> {
        self.subscriptions.push(topic.into());
        Ok(())
    }

    fn try_recv(&mut self) -> Option<MqttMessage> {
        if self.incoming.is_empty() {
            None
        } else {
            Some(self.incoming.remove(0))
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
