//! Process-wide motor instance and the wiring that connects it to interrupts.
//!
//! Interrupt and timer callbacks carry no request context. Each registered
//! callback captures a shared [`InstanceSlot`] and reaches the motor through
//! it; a callback that fires before the slot is filled returns without
//! touching state.
//!
//! # Startup
//!
//! ```rust
//! use rs_gate::config::GateConfig;
//! use rs_gate::hal::MockParts;
//! use rs_gate::runtime::{motor_init, motor_start_task};
//! use rs_gate::traits::InterruptLine;
//! use rs_gate::queue::ActionQueue;
//! use rs_gate::MotorDirectionState;
//!
//! let mock = MockParts::new();
//! let motor = motor_init(mock.motor_parts()).unwrap();
//! let consumer = motor_start_task(motor.clone(), &GateConfig::default()).unwrap();
//!
//! mock.button.trigger();
//! assert_eq!(motor.current(), MotorDirectionState::Clockwise);
//!
//! mock.queue.close();
//! consumer.join().unwrap();
//! assert!(mock.open_sensor.is_armed());
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};

use log::{debug, info, warn};

use crate::config::GateConfig;
use crate::direction::Transition;
use crate::motor::{ButtonOutcome, GateMotor, LimitSensor, MotorParts};
use crate::queue::ActionQueue;
use crate::traits::{DebounceTimer, InterruptLine, MotorHardware};

/// Name of the consumer thread.
pub const CONSUMER_TASK_NAME: &str = "motor_task";

// ============================================================================
// Instance Slot
// ============================================================================

/// Write-once holder for the single motor instance.
///
/// Reads are lock-free and usable from interrupt context.
pub struct InstanceSlot<T> {
    cell: OnceLock<Arc<T>>,
    early_calls: AtomicU32,
}

impl<T> InstanceSlot<T> {
    /// Empty slot.
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
            early_calls: AtomicU32::new(0),
        }
    }

    /// Assign the instance. Fails, returning `value`, if already assigned.
    pub fn set(&self, value: Arc<T>) -> Result<(), Arc<T>> {
        self.cell.set(value)
    }

    /// The instance, if assigned.
    pub fn get(&self) -> Option<&Arc<T>> {
        self.cell.get()
    }

    /// Whether the instance has been assigned.
    pub fn is_set(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Run `f` against the instance, or count an early call and return `None`.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        match self.cell.get() {
            Some(instance) => Some(f(instance)),
            None => {
                self.early_calls.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Callbacks that arrived before the instance was assigned.
    pub fn early_calls(&self) -> u32 {
        self.early_calls.load(Ordering::Relaxed)
    }
}

impl<T> Default for InstanceSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for InstanceSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceSlot")
            .field("set", &self.is_set())
            .field("early_calls", &self.early_calls())
            .finish()
    }
}

/// Slot type used by the motor callbacks.
pub type MotorSlot<H> = InstanceSlot<GateMotor<H>>;

// ============================================================================
// Callback Entry Points
// ============================================================================

/// Button interrupt entry. `None` if the motor is not assigned yet.
pub fn button_interrupt<H: MotorHardware>(slot: &MotorSlot<H>) -> Option<ButtonOutcome> {
    slot.with(GateMotor::on_button)
}

/// Limit sensor interrupt entry. `None` if the motor is not assigned yet.
pub fn sensor_interrupt<H: MotorHardware>(
    slot: &MotorSlot<H>,
    sensor: LimitSensor,
) -> Option<Transition> {
    slot.with(|motor| motor.on_limit(sensor))
}

/// Debounce timer entry. Runs in timer task context, so it may log.
pub fn debounce_elapsed<H: MotorHardware>(slot: &MotorSlot<H>) {
    match slot.with(GateMotor::on_debounce_elapsed) {
        Some(Ok(())) => debug!("motor: button re-enabled"),
        Some(Err(e)) => warn!("motor: failed to re-enable button: {:?}", e),
        None => warn!("motor: debounce fired before initialization"),
    }
}

// ============================================================================
// Initialization
// ============================================================================

/// Errors from [`motor_init`] and [`motor_start_task`].
#[derive(Debug)]
pub enum InitError {
    /// An interrupt handler could not be registered.
    Interrupt {
        /// Which input.
        line: &'static str,
        /// Platform error.
        detail: String,
    },
    /// The debounce callback could not be registered.
    Timer(String),
    /// The instance slot was already filled.
    AlreadyInitialized,
    /// The consumer thread could not be spawned.
    Spawn(std::io::Error),
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::Interrupt { line, detail } => {
                write!(f, "failed to register {} interrupt: {}", line, detail)
            }
            InitError::Timer(detail) => write!(f, "failed to register debounce timer: {}", detail),
            InitError::AlreadyInitialized => write!(f, "motor already initialized"),
            InitError::Spawn(e) => write!(f, "failed to spawn {}: {}", CONSUMER_TASK_NAME, e),
        }
    }
}

impl std::error::Error for InitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InitError::Spawn(e) => Some(e),
            _ => None,
        }
    }
}

fn subscribe_line<L, F>(line: &mut L, name: &'static str, handler: F) -> Result<(), InitError>
where
    L: InterruptLine,
    F: FnMut() + Send + 'static,
{
    line.subscribe(handler).map_err(|e| InitError::Interrupt {
        line: name,
        detail: format!("{:?}", e),
    })
}

/// Wire the callbacks, assign the motor, and unmask the button.
///
/// Outputs are forced to the pattern for the initial `Stopped` direction
/// before the button interrupt is enabled. Returns the shared handle.
pub fn motor_init<H: MotorHardware>(
    parts: MotorParts<H>,
) -> Result<Arc<GateMotor<H>>, InitError> {
    let slot: Arc<MotorSlot<H>> = Arc::new(InstanceSlot::new());
    motor_init_with_slot(parts, slot)
}

/// [`motor_init`] with a caller-supplied slot, so callbacks can be
/// observed firing before assignment.
pub fn motor_init_with_slot<H: MotorHardware>(
    mut parts: MotorParts<H>,
    slot: Arc<MotorSlot<H>>,
) -> Result<Arc<GateMotor<H>>, InitError> {
    let s = Arc::clone(&slot);
    subscribe_line(&mut parts.button, "button", move || {
        button_interrupt(&s);
    })?;
    let s = Arc::clone(&slot);
    subscribe_line(&mut parts.open_sensor, "open sensor", move || {
        sensor_interrupt(&s, LimitSensor::Open);
    })?;
    let s = Arc::clone(&slot);
    subscribe_line(&mut parts.close_sensor, "close sensor", move || {
        sensor_interrupt(&s, LimitSensor::Close);
    })?;
    let s = Arc::clone(&slot);
    parts
        .timer
        .subscribe(move || debounce_elapsed(&s))
        .map_err(|e| InitError::Timer(format!("{:?}", e)))?;

    let motor = Arc::new(GateMotor::new(parts));
    slot.set(Arc::clone(&motor))
        .map_err(|_| InitError::AlreadyInitialized)?;

    let early = slot.early_calls();
    if early > 0 {
        warn!("motor: {} callback(s) fired before initialization", early);
    }

    motor.sync_outputs();
    motor
        .parts()
        .button
        .enable_interrupt()
        .map_err(|e| InitError::Interrupt {
            line: "button",
            detail: format!("{:?}", e),
        })?;

    info!("motor: initialized, direction {}", motor.current().as_str());
    Ok(motor)
}

// ============================================================================
// Consumer Task
// ============================================================================

/// Drain the action queue until it is closed. Returns the number processed.
pub fn run_consumer<H: MotorHardware>(motor: &GateMotor<H>) -> usize {
    let mut processed = 0;
    while let Some(queued) = motor.parts().queue.recv() {
        motor.process(queued);
        processed += 1;
    }
    info!("motor: action queue closed after {} entries", processed);
    processed
}

/// Spawn the consumer thread.
///
/// On ESP32 the FreeRTOS priority comes from the thread spawn configuration
/// in effect when this is called.
pub fn motor_start_task<H: MotorHardware>(
    motor: Arc<GateMotor<H>>,
    config: &GateConfig,
) -> Result<JoinHandle<usize>, InitError> {
    let handle = thread::Builder::new()
        .name(CONSUMER_TASK_NAME.into())
        .stack_size(config.consumer_stack_size)
        .spawn(move || run_consumer(&motor))
        .map_err(InitError::Spawn)?;
    info!(
        "motor: {} started ({} byte stack)",
        CONSUMER_TASK_NAME, config.consumer_stack_size
    );
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::{MockHardware, MockParts};
    use crate::traits::OutputLine;
    use crate::MotorDirectionState;

    fn setup() -> (Arc<GateMotor<MockHardware>>, MockParts) {
        let mock = MockParts::new();
        let motor = motor_init(mock.motor_parts()).unwrap();
        (motor, mock)
    }

    #[test]
    fn slot_counts_early_calls() {
        let slot: InstanceSlot<u8> = InstanceSlot::new();
        assert_eq!(slot.with(|v| *v), None);
        assert_eq!(slot.with(|v| *v), None);
        assert_eq!(slot.early_calls(), 2);

        slot.set(Arc::new(7)).unwrap();
        assert_eq!(slot.with(|v| *v), Some(7));
        assert_eq!(slot.early_calls(), 2);
        assert!(slot.set(Arc::new(8)).is_err());
    }

    #[test]
    fn early_callbacks_leave_state_alone() {
        let slot: Arc<MotorSlot<MockHardware>> = Arc::new(InstanceSlot::new());
        assert_eq!(button_interrupt(&slot), None);
        assert_eq!(sensor_interrupt(&slot, LimitSensor::Open), None);
        debounce_elapsed(&slot);
        assert_eq!(slot.early_calls(), 3);
    }

    #[test]
    fn init_registers_every_callback() {
        let (_motor, mock) = setup();
        assert!(mock.button.has_handler());
        assert!(mock.open_sensor.has_handler());
        assert!(mock.close_sensor.has_handler());
    }

    #[test]
    fn init_shows_stopped_and_unmasks_button() {
        let (motor, mock) = setup();
        assert_eq!(motor.current(), MotorDirectionState::Stopped);
        assert!(mock.led_stopped.is_set());
        assert!(mock.button.is_armed());
        assert!(!mock.open_sensor.is_armed());
        assert!(!mock.close_sensor.is_armed());
    }

    #[test]
    fn button_then_timer_round_trip() {
        let (motor, mock) = setup();

        assert!(mock.button.trigger());
        assert_eq!(motor.current(), MotorDirectionState::Clockwise);
        // Bounce while masked is ignored
        assert!(!mock.button.trigger());
        assert_eq!(mock.queue.len(), 1);

        assert!(mock.timer.fire());
        assert!(mock.button.is_armed());
    }

    #[test]
    fn consumer_drains_until_closed() {
        let (motor, mock) = setup();
        mock.button.trigger();

        let config = GateConfig::default().with_consumer_stack_size(64 * 1024);
        let handle = motor_start_task(Arc::clone(&motor), &config).unwrap();
        mock.queue.close();

        assert_eq!(handle.join().unwrap(), 1);
        assert!(mock.open_sensor.is_armed());
        assert!(mock.led_opening.is_set());
    }

    #[test]
    fn init_error_display() {
        let e = InitError::Interrupt {
            line: "button",
            detail: "EspError".into(),
        };
        assert_eq!(e.to_string(), "failed to register button interrupt: EspError");
    }
}
