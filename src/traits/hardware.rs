//! Hardware abstraction traits for the gate motor, its indicators and inputs.
//!
//! Every method takes `&self`: one instance is reached concurrently from
//! interrupt handlers, the debounce timer and the consumer task, so
//! implementations keep their state in atomics or hardware registers.
//!
//! # Key Traits
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`OutputLine`] | Status LED (opening, closing, stopped) |
//! | [`InterruptLine`] | Button and end-of-travel sensors |
//! | [`DebounceTimer`] | One-shot timer that re-enables the button |
//! | [`MotorDriver`] | Drive/brake actuation |
//! | [`MotorHardware`] | Names the concrete types for one platform |
//!
//! For tests and desktop runs use [`crate::hal::mock`]; for the board use
//! `hal::esp32` (requires the `esp32` feature).

use core::fmt::Debug;

use crate::direction::MotorAction;
use crate::queue::ActionQueue;

/// Digital output driving an indicator.
pub trait OutputLine: Send + Sync {
    /// Error type for output operations.
    type Error: Debug;

    /// Drive the line high (`true`) or low (`false`).
    fn write(&self, on: bool) -> Result<(), Self::Error>;

    /// Invert the current level.
    fn toggle(&self) -> Result<(), Self::Error>;

    /// Last level written.
    fn is_set(&self) -> bool;
}

/// Digital input with an edge interrupt: the button and both limit sensors.
///
/// # Interrupt Context
///
/// `enable_interrupt`, `disable_interrupt`, `is_armed` and `is_asserted`
/// are called from interrupt handlers and must not block or allocate.
pub trait InterruptLine: Send + Sync {
    /// Error type for input operations.
    type Error: Debug;

    /// Raw electrical level (`true` = high).
    fn read(&self) -> bool;

    /// Level with polarity resolved: button held, or gate sitting on the limit.
    fn is_asserted(&self) -> bool;

    /// Unmask the edge interrupt.
    fn enable_interrupt(&self) -> Result<(), Self::Error>;

    /// Mask the edge interrupt. Idempotent.
    fn disable_interrupt(&self) -> Result<(), Self::Error>;

    /// Whether the interrupt is currently unmasked.
    fn is_armed(&self) -> bool;

    /// Register the handler run on each unmasked edge.
    ///
    /// The handler runs in interrupt context on hardware targets. It
    /// replaces any previously registered handler.
    fn subscribe<F>(&mut self, handler: F) -> Result<(), Self::Error>
    where
        F: FnMut() + Send + 'static;
}

/// One-shot debounce timer.
///
/// Each [`arm`](Self::arm) schedules exactly one callback after the interval
/// fixed at construction. Arming an already armed timer restarts it.
pub trait DebounceTimer: Send + Sync {
    /// Error type for timer operations.
    type Error: Debug;

    /// Register the expiry callback. Runs in timer task context.
    fn subscribe<F>(&mut self, callback: F) -> Result<(), Self::Error>
    where
        F: FnMut() + Send + 'static;

    /// Start the interval. Must be callable from interrupt context.
    fn arm(&self) -> Result<(), Self::Error>;
}

/// Low-level motor actuation.
///
/// # Contract
///
/// - `drive(MotorAction::Stop)` never blocks and may be called from an
///   interrupt handler. It is the safety path.
/// - `drive(Clockwise | CounterClockwise)` may block for the
///   direction-change settling time when reversing. It is only called from
///   task context.
/// - Driving the action already in effect is a no-op.
///
/// # Example Implementation
///
/// ```rust,ignore
/// use rs_gate::traits::MotorDriver;
/// use rs_gate::MotorAction;
///
/// struct Relay { /* two relay outputs */ }
///
/// impl MotorDriver for Relay {
///     type Error = ();
///
///     fn drive(&self, action: MotorAction) -> Result<(), ()> {
///         match action {
///             MotorAction::Stop => { /* both relays off */ }
///             MotorAction::Clockwise => { /* relay A on */ }
///             MotorAction::CounterClockwise => { /* relay B on */ }
///         }
///         Ok(())
///     }
///
///     fn current(&self) -> MotorAction {
///         MotorAction::Stop
///     }
/// }
/// ```
pub trait MotorDriver: Send + Sync {
    /// Error type for actuation.
    type Error: Debug;

    /// Energise the motor for `action`.
    fn drive(&self, action: MotorAction) -> Result<(), Self::Error>;

    /// Action currently applied to the motor terminals.
    fn current(&self) -> MotorAction;
}

/// Concrete hardware types for one platform.
///
/// ```rust
/// use rs_gate::hal::MockHardware;
/// use rs_gate::traits::MotorHardware;
///
/// fn needs_hardware<H: MotorHardware>() {}
/// needs_hardware::<MockHardware>();
/// ```
pub trait MotorHardware: Send + Sync + 'static {
    /// Button and limit sensor inputs.
    type Input: InterruptLine + 'static;
    /// LED outputs.
    type Output: OutputLine + 'static;
    /// Button debounce timer.
    type Timer: DebounceTimer + 'static;
    /// Motor actuation.
    type Driver: MotorDriver + 'static;
    /// Interrupt-to-task handoff queue.
    type Queue: ActionQueue + 'static;
}
