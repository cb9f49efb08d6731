//! Motor direction state machine.
//!
//! The direction state is shared by the button interrupt, both end-of-travel
//! sensor interrupts, the consumer task and the remote-command path. It is
//! stored in a single [`DirectionCell`]: one `AtomicU32` holding the current
//! direction, the previous direction and a transition counter. Every writer
//! goes through one compare-and-swap, so the cell is safe to touch from
//! interrupt context and a transition can never be observed half-applied.
//!
//! # Button toggle law
//!
//! ```rust
//! use rs_gate::direction::{compute_next_on_button, MotorDirectionState::*};
//!
//! // Stopped toggles away from the last direction of travel
//! assert_eq!(compute_next_on_button(Stopped, CounterClockwise), Clockwise);
//! assert_eq!(compute_next_on_button(Stopped, Clockwise), CounterClockwise);
//!
//! // A moving gate always stops
//! assert_eq!(compute_next_on_button(Clockwise, Stopped), Stopped);
//! assert_eq!(compute_next_on_button(CounterClockwise, Clockwise), Stopped);
//! ```

use core::sync::atomic::{AtomicU32, Ordering};

// ============================================================================
// Direction and Action
// ============================================================================

/// Observed or intended rotation of the gate motor.
///
/// Clockwise opens the gate, counter-clockwise closes it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[repr(u8)]
pub enum MotorDirectionState {
    /// Motor is not driven.
    #[default]
    Stopped = 0,
    /// Rotating towards the open limit.
    Clockwise = 1,
    /// Rotating towards the closed limit.
    CounterClockwise = 2,
}

impl MotorDirectionState {
    /// Decode a raw tag. Returns `None` for values outside the enum.
    #[inline]
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Stopped),
            1 => Some(Self::Clockwise),
            2 => Some(Self::CounterClockwise),
            _ => None,
        }
    }

    /// Raw tag used inside the atomic cell.
    #[inline]
    pub const fn as_raw(self) -> u8 {
        self as u8
    }

    /// True for either direction of travel.
    #[inline]
    pub const fn is_moving(self) -> bool {
        !matches!(self, Self::Stopped)
    }

    /// Lowercase name for logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Clockwise => "clockwise",
            Self::CounterClockwise => "counterclockwise",
        }
    }
}

/// A command for the motor, isomorphic to [`MotorDirectionState`].
///
/// Produced by the button handler and the gate coordinator, consumed by the
/// consumer task and by [`MotorDriver`](crate::traits::MotorDriver).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[repr(u8)]
pub enum MotorAction {
    /// De-energise the motor.
    Stop = 0,
    /// Drive towards the open limit.
    Clockwise = 1,
    /// Drive towards the closed limit.
    CounterClockwise = 2,
}

impl MotorAction {
    /// Direction state this action produces.
    #[inline]
    pub const fn target(self) -> MotorDirectionState {
        match self {
            Self::Stop => MotorDirectionState::Stopped,
            Self::Clockwise => MotorDirectionState::Clockwise,
            Self::CounterClockwise => MotorDirectionState::CounterClockwise,
        }
    }

    /// Lowercase name for logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Clockwise => "clockwise",
            Self::CounterClockwise => "counterclockwise",
        }
    }
}

impl From<MotorDirectionState> for MotorAction {
    fn from(state: MotorDirectionState) -> Self {
        match state {
            MotorDirectionState::Stopped => MotorAction::Stop,
            MotorDirectionState::Clockwise => MotorAction::Clockwise,
            MotorDirectionState::CounterClockwise => MotorAction::CounterClockwise,
        }
    }
}

impl From<MotorAction> for MotorDirectionState {
    fn from(action: MotorAction) -> Self {
        action.target()
    }
}

/// Next direction after a button press.
///
/// From `Stopped` the gate reverses relative to `previous`, defaulting to
/// `Clockwise` whenever `previous` was not `Clockwise`. A moving gate stops.
pub const fn compute_next_on_button(
    current: MotorDirectionState,
    previous: MotorDirectionState,
) -> MotorDirectionState {
    match current {
        MotorDirectionState::Stopped => match previous {
            MotorDirectionState::Clockwise => MotorDirectionState::CounterClockwise,
            _ => MotorDirectionState::Clockwise,
        },
        MotorDirectionState::Clockwise | MotorDirectionState::CounterClockwise => {
            MotorDirectionState::Stopped
        }
    }
}

// ============================================================================
// Atomic Direction Cell
// ============================================================================

const DIRECTION_MASK: u32 = 0b11;
const PREVIOUS_SHIFT: u32 = 2;
const GENERATION_SHIFT: u32 = 4;

/// Point-in-time copy of the direction cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirectionSnapshot {
    /// Direction in effect.
    pub current: MotorDirectionState,
    /// Direction held immediately before `current`.
    pub previous: MotorDirectionState,
    /// Number of transitions applied so far (wraps at 2^28).
    pub generation: u32,
}

impl DirectionSnapshot {
    const fn pack(self) -> u32 {
        (self.current.as_raw() as u32)
            | ((self.previous.as_raw() as u32) << PREVIOUS_SHIFT)
            | (self.generation << GENERATION_SHIFT)
    }

    const fn unpack(bits: u32) -> Option<Self> {
        let current = match MotorDirectionState::from_raw((bits & DIRECTION_MASK) as u8) {
            Some(state) => state,
            None => return None,
        };
        let previous =
            match MotorDirectionState::from_raw(((bits >> PREVIOUS_SHIFT) & DIRECTION_MASK) as u8)
            {
                Some(state) => state,
                None => return None,
            };
        Some(Self {
            current,
            previous,
            generation: bits >> GENERATION_SHIFT,
        })
    }

    /// Snapshot after moving to `next`: current becomes previous.
    const fn advance(self, next: MotorDirectionState) -> Self {
        Self {
            current: next,
            previous: self.current,
            generation: self.generation.wrapping_add(1) & (u32::MAX >> GENERATION_SHIFT),
        }
    }
}

/// A single applied transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    /// Cell contents before the write.
    pub from: DirectionSnapshot,
    /// Cell contents after the write.
    pub to: DirectionSnapshot,
}

/// Lock-free holder of the motor direction state.
///
/// Starts `Stopped` with `previous = CounterClockwise`, so the first button
/// press opens the gate.
#[derive(Debug)]
pub struct DirectionCell {
    bits: AtomicU32,
}

impl DirectionCell {
    /// Initial contents.
    pub const INITIAL: DirectionSnapshot = DirectionSnapshot {
        current: MotorDirectionState::Stopped,
        previous: MotorDirectionState::CounterClockwise,
        generation: 0,
    };

    /// Create a cell in the initial state.
    pub const fn new() -> Self {
        Self {
            bits: AtomicU32::new(Self::INITIAL.pack()),
        }
    }

    /// Read the whole cell at once.
    pub fn snapshot(&self) -> DirectionSnapshot {
        // Only this module writes the cell and it only stores packed snapshots.
        DirectionSnapshot::unpack(self.bits.load(Ordering::Acquire)).unwrap_or(Self::INITIAL)
    }

    /// Direction in effect.
    #[inline]
    pub fn current(&self) -> MotorDirectionState {
        self.snapshot().current
    }

    /// Direction before the last transition.
    #[inline]
    pub fn previous(&self) -> MotorDirectionState {
        self.snapshot().previous
    }

    /// Transition counter.
    #[inline]
    pub fn generation(&self) -> u32 {
        self.snapshot().generation
    }

    /// Apply the button toggle law.
    ///
    /// Returns `None` only if the cell held an undecodable value, in which
    /// case nothing is written.
    pub fn press_button(&self) -> Option<Transition> {
        self.update(|snap| Some(compute_next_on_button(snap.current, snap.previous)))
    }

    /// Unconditionally move to `Stopped`.
    pub fn force_stop(&self) -> Transition {
        self.set(MotorDirectionState::Stopped)
    }

    /// Move to the direction named by `action`, bypassing the toggle law.
    pub fn apply(&self, action: MotorAction) -> Transition {
        self.set(action.target())
    }

    fn set(&self, next: MotorDirectionState) -> Transition {
        match self.update(|_| Some(next)) {
            Some(transition) => transition,
            None => {
                // Undecodable cell: overwrite it rather than leave it wedged.
                let from = Self::INITIAL;
                let to = from.advance(next);
                self.bits.store(to.pack(), Ordering::Release);
                Transition { from, to }
            }
        }
    }

    fn update<F>(&self, next: F) -> Option<Transition>
    where
        F: Fn(DirectionSnapshot) -> Option<MotorDirectionState>,
    {
        let mut applied = None;
        let _ = self
            .bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                let from = DirectionSnapshot::unpack(bits)?;
                let to = from.advance(next(from)?);
                applied = Some(Transition { from, to });
                Some(to.pack())
            });
        applied
    }
}

impl Default for DirectionCell {
    fn default() -> Self {
        Self::new()
    }
}
