//! Gate motor: direction state plus the hardware it drives.
//!
//! [`GateMotor`] holds the handler bodies for every execution context:
//!
//! | Method | Context | Effect |
//! |--------|---------|--------|
//! | [`on_button`](GateMotor::on_button) | button interrupt | toggle, mask button, arm debounce, enqueue |
//! | [`on_limit`](GateMotor::on_limit) | sensor interrupt | force stop, brake, stopped LED, mask both sensors |
//! | [`on_debounce_elapsed`](GateMotor::on_debounce_elapsed) | timer task | unmask button |
//! | [`process`](GateMotor::process) | consumer task | drive, LEDs, arm the sensor ahead of travel |
//! | [`apply_action`](GateMotor::apply_action) | remote command | set direction, drive, enqueue refresh |
//!
//! Interrupt-context methods never log, block or allocate. Hardware errors
//! there are ignored; the consumer re-applies the full output pattern on
//! every dequeue.

use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use log::{debug, error, info, warn};

use crate::direction::{DirectionCell, MotorAction, MotorDirectionState, Transition};
use crate::queue::{ActionQueue, ActionSource, QueuedAction};
use crate::traits::{DebounceTimer, InterruptLine, MotorDriver, MotorHardware, OutputLine};

/// Bound on output re-application when the direction keeps moving.
const RESYNC_ATTEMPTS: usize = 4;

/// The hardware a [`GateMotor`] owns.
pub struct MotorParts<H: MotorHardware> {
    /// Manual toggle button.
    pub button: H::Input,
    /// End-of-travel sensor at the open limit.
    pub open_sensor: H::Input,
    /// End-of-travel sensor at the closed limit.
    pub close_sensor: H::Input,
    /// Lit while opening.
    pub led_opening: H::Output,
    /// Lit while closing.
    pub led_closing: H::Output,
    /// Lit while stopped.
    pub led_stopped: H::Output,
    /// Button debounce timer.
    pub timer: H::Timer,
    /// Motor actuation.
    pub driver: H::Driver,
    /// Interrupt-to-task handoff.
    pub queue: H::Queue,
}

/// Which end-of-travel sensor fired.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum LimitSensor {
    /// Open limit, armed while turning clockwise.
    Open,
    /// Closed limit, armed while turning counter-clockwise.
    Close,
}

impl LimitSensor {
    const fn tag(self) -> u8 {
        match self {
            LimitSensor::Open => 1,
            LimitSensor::Close => 2,
        }
    }

    const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(LimitSensor::Open),
            2 => Some(LimitSensor::Close),
            _ => None,
        }
    }
}

/// Result of a button interrupt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ButtonOutcome {
    /// Transition applied and handed to the consumer.
    Queued(QueuedAction),
    /// Transition applied but the queue was full.
    Dropped(QueuedAction),
    /// Direction cell unreadable, nothing changed.
    Ignored,
}

/// Result of processing one queue entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DequeueOutcome {
    /// The queued action still matched the direction state.
    Applied(MotorAction),
    /// The direction changed after enqueue; outputs follow the current state.
    Superseded {
        /// What the producer enqueued.
        queued: MotorAction,
        /// What was applied instead.
        applied: MotorAction,
    },
}

impl DequeueOutcome {
    /// Action whose outputs are now in effect.
    pub fn applied(&self) -> MotorAction {
        match *self {
            DequeueOutcome::Applied(action) => action,
            DequeueOutcome::Superseded { applied, .. } => applied,
        }
    }
}

/// Motor direction state machine bound to its hardware.
pub struct GateMotor<H: MotorHardware> {
    direction: DirectionCell,
    parts: MotorParts<H>,
    dropped: AtomicU32,
    last_limit: AtomicU8,
    debounce_faults: AtomicU32,
    debounce_faults_logged: AtomicU32,
}

impl<H: MotorHardware> GateMotor<H> {
    /// Wrap the hardware. Direction starts `Stopped` with previous `CounterClockwise`.
    pub fn new(parts: MotorParts<H>) -> Self {
        Self {
            direction: DirectionCell::new(),
            parts,
            dropped: AtomicU32::new(0),
            last_limit: AtomicU8::new(0),
            debounce_faults: AtomicU32::new(0),
            debounce_faults_logged: AtomicU32::new(0),
        }
    }

    /// The shared direction cell.
    pub fn direction(&self) -> &DirectionCell {
        &self.direction
    }

    /// Direction in effect.
    pub fn current(&self) -> MotorDirectionState {
        self.direction.current()
    }

    /// Owned hardware.
    pub fn parts(&self) -> &MotorParts<H> {
        &self.parts
    }

    /// Entries lost to a full queue since startup.
    pub fn dropped_actions(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Presses whose debounce timer could not be armed. The button was left
    /// unmasked for each of them.
    pub fn debounce_faults(&self) -> u32 {
        self.debounce_faults.load(Ordering::Relaxed)
    }

    /// Sensor that caused the most recent safety stop, cleared by any
    /// remote or button-driven transition.
    pub fn last_limit(&self) -> Option<LimitSensor> {
        LimitSensor::from_tag(self.last_limit.load(Ordering::Acquire))
    }

    // ========================================================================
    // Interrupt Context
    // ========================================================================

    /// Button interrupt body.
    ///
    /// The button is masked and the debounce timer armed before the push,
    /// so a bounce cannot re-enter until the timer unmasks it. If the timer
    /// refuses to arm, the button is unmasked again and the fault counted
    /// for the consumer to report.
    pub fn on_button(&self) -> ButtonOutcome {
        let Some(transition) = self.direction.press_button() else {
            return ButtonOutcome::Ignored;
        };
        self.last_limit.store(0, Ordering::Release);

        let _ = self.parts.button.disable_interrupt();
        if self.parts.timer.arm().is_err() {
            // No expiry will come to unmask it.
            let _ = self.parts.button.enable_interrupt();
            self.debounce_faults.fetch_add(1, Ordering::Relaxed);
        }

        let item = QueuedAction::new(
            transition.to.current.into(),
            ActionSource::Button,
            transition.to.generation,
        );
        if self.parts.queue.try_push(item) {
            ButtonOutcome::Queued(item)
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            ButtonOutcome::Dropped(item)
        }
    }

    /// End-of-travel sensor interrupt body.
    ///
    /// Takes effect on the direction cell before returning. Nothing is
    /// queued unless another writer raced the output update.
    pub fn on_limit(&self, sensor: LimitSensor) -> Transition {
        let transition = self.direction.force_stop();
        let _ = self.parts.driver.drive(MotorAction::Stop);
        self.last_limit.store(sensor.tag(), Ordering::Release);

        let _ = self.show(MotorAction::Stop);
        let _ = self.parts.open_sensor.disable_interrupt();
        let _ = self.parts.close_sensor.disable_interrupt();

        // A writer on the other core may have moved the cell while the stop
        // pattern was written over its outputs.
        if self.direction.generation() != transition.to.generation {
            let item =
                QueuedAction::new(MotorAction::Stop, ActionSource::Limit, transition.to.generation);
            if !self.parts.queue.try_push(item) {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
        transition
    }

    // ========================================================================
    // Timer Context
    // ========================================================================

    /// Debounce expiry: unmask the button. The only place it is re-enabled.
    pub fn on_debounce_elapsed(&self) -> Result<(), <H::Input as InterruptLine>::Error> {
        self.parts.button.enable_interrupt()
    }

    // ========================================================================
    // Task Context
    // ========================================================================

    /// Select a direction explicitly, used by remote commands.
    ///
    /// The motor is driven before returning. LED and sensor updates are
    /// queued for the consumer task.
    pub fn apply_action(&self, action: MotorAction) -> MotorDirectionState {
        let transition = self.direction.apply(action);
        self.last_limit.store(0, Ordering::Release);
        info!(
            "motor: {} -> {} (remote)",
            transition.from.current.as_str(),
            transition.to.current.as_str()
        );

        self.drive_checked(action, transition.to.generation);

        let item = QueuedAction::new(action, ActionSource::Remote, transition.to.generation);
        if !self.parts.queue.try_push(item) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!("motor: action queue full, {} refresh dropped", action.as_str());
        }
        transition.to.current
    }

    /// Consumer task body for one dequeued entry.
    ///
    /// Outputs always follow the direction state at dequeue time. Sensors
    /// are armed only after the LEDs show the direction.
    pub fn process(&self, queued: QueuedAction) -> DequeueOutcome {
        let snapshot = self.direction.snapshot();
        let current = MotorAction::from(snapshot.current);
        let superseded = snapshot.generation != queued.generation;

        if queued.source == ActionSource::Button {
            self.report_debounce_faults();
        }
        if superseded || queued.source == ActionSource::Button {
            self.drive_checked(current, snapshot.generation);
        }

        self.refresh(current);
        self.resync(snapshot.generation);

        if superseded {
            info!(
                "motor: queued {} superseded, applied {}",
                queued.action.as_str(),
                current.as_str()
            );
            DequeueOutcome::Superseded {
                queued: queued.action,
                applied: current,
            }
        } else {
            debug!("motor: applied {} ({:?})", current.as_str(), queued.source);
            DequeueOutcome::Applied(current)
        }
    }

    /// Put every output in the pattern for the current direction.
    ///
    /// Used at startup before the button is unmasked.
    pub fn sync_outputs(&self) {
        let snapshot = self.direction.snapshot();
        let current = MotorAction::from(snapshot.current);
        self.drive_checked(current, snapshot.generation);
        self.refresh(current);
    }

    fn report_debounce_faults(&self) {
        let total = self.debounce_faults.load(Ordering::Relaxed);
        let logged = self.debounce_faults_logged.swap(total, Ordering::Relaxed);
        if total != logged {
            warn!(
                "motor: debounce timer failed to arm {} time(s), button left unmasked",
                total.wrapping_sub(logged)
            );
        }
    }

    /// LEDs, then sensor arming, then the already-on-limit check.
    fn refresh(&self, action: MotorAction) {
        if let Err(e) = self.show(action) {
            error!("motor: LED update failed: {:?}", e);
        }
        if let Err(e) = self.arm_sensors(action) {
            error!("motor: sensor arming failed: {:?}", e);
        }
        self.check_limits(action);
    }

    /// Re-apply outputs if another context wrote the cell during `refresh`.
    ///
    /// A sensor trip landing between the snapshot and the arming would
    /// otherwise leave a sensor armed while stopped. Driving is left to
    /// the writer, which either drove already or queued an entry.
    fn resync(&self, mut generation: u32) {
        for _ in 0..RESYNC_ATTEMPTS {
            let latest = self.direction.snapshot();
            if latest.generation == generation {
                return;
            }
            let action = MotorAction::from(latest.current);
            debug!("motor: direction moved to {} during refresh", action.as_str());
            self.refresh(action);
            generation = latest.generation;
        }
        warn!("motor: outputs still racing after {} attempts", RESYNC_ATTEMPTS);
    }

    fn show(&self, action: MotorAction) -> Result<(), <H::Output as OutputLine>::Error> {
        self.parts
            .led_opening
            .write(action == MotorAction::Clockwise)?;
        self.parts
            .led_closing
            .write(action == MotorAction::CounterClockwise)?;
        self.parts.led_stopped.write(action == MotorAction::Stop)
    }

    fn arm_sensors(&self, action: MotorAction) -> Result<(), <H::Input as InterruptLine>::Error> {
        // Mask before unmask so both are never armed at once.
        match action {
            MotorAction::Stop => {
                self.parts.open_sensor.disable_interrupt()?;
                self.parts.close_sensor.disable_interrupt()
            }
            MotorAction::Clockwise => {
                self.parts.close_sensor.disable_interrupt()?;
                self.parts.open_sensor.enable_interrupt()
            }
            MotorAction::CounterClockwise => {
                self.parts.open_sensor.disable_interrupt()?;
                self.parts.close_sensor.enable_interrupt()
            }
        }
    }

    /// An edge interrupt never fires if the gate already sits on the limit.
    fn check_limits(&self, action: MotorAction) {
        let (sensor, line) = match action {
            MotorAction::Stop => return,
            MotorAction::Clockwise => (LimitSensor::Open, &self.parts.open_sensor),
            MotorAction::CounterClockwise => (LimitSensor::Close, &self.parts.close_sensor),
        };
        if line.is_armed() && line.is_asserted() {
            info!("motor: {:?} limit already reached, stopping", sensor);
            self.on_limit(sensor);
        }
    }

    /// Drive, then re-drive if another context moved the direction while
    /// the driver was settling.
    fn drive_checked(&self, action: MotorAction, generation: u32) {
        if let Err(e) = self.parts.driver.drive(action) {
            error!("motor: drive {} failed: {:?}", action.as_str(), e);
        }
        let snapshot = self.direction.snapshot();
        if snapshot.generation != generation {
            let latest = MotorAction::from(snapshot.current);
            if latest != action {
                warn!(
                    "motor: direction changed to {} while driving {}",
                    latest.as_str(),
                    action.as_str()
                );
                if let Err(e) = self.parts.driver.drive(latest) {
                    error!("motor: drive {} failed: {:?}", latest.as_str(), e);
                }
            }
        }
    }
}
