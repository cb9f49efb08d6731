//! Gate coordinator: remote open/close/stop requests and state queries.
//!
//! The objective state (Opened, Closed, Stopped) is never stored. It is
//! derived from the motor direction on every request, because sensor trips
//! and button presses move the motor without telling the coordinator.
//!
//! # Wire Format
//!
//! All payloads are ASCII decimal integers.
//!
//! | Topic | Direction | Payload |
//! |-------|-----------|---------|
//! | `<base>/gate/action` | in | `0` open, `1` close, `2` stop |
//! | `<base>/gate/state` | in | ignored |
//! | `<base>/gate/state/answer` | out | objective state, or `-1` if already achieved |
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use rs_gate::hal::{MockMqtt, MockParts};
//! use rs_gate::{GateCoordinator, GateMotor, GateTopics};
//!
//! let mock = MockParts::new();
//! let motor = Arc::new(GateMotor::new(mock.motor_parts()));
//! let gate = GateCoordinator::new(motor, GateTopics::new("home"));
//! let mut mqtt = MockMqtt::new();
//!
//! gate.handle_action_payload(&mut mqtt, b"0").unwrap();
//! assert_eq!(mqtt.published_to("home/gate/state/answer"), vec!["0"]);
//!
//! gate.handle_action_payload(&mut mqtt, b"0").unwrap();
//! assert_eq!(mqtt.published_to("home/gate/state/answer"), vec!["0", "-1"]);
//! ```

extern crate alloc;
use alloc::string::String;
use alloc::sync::Arc;
use core::fmt;

use log::{info, warn};

use crate::config::{long_string, LongString, MqttConfig};
use crate::direction::{MotorAction, MotorDirectionState};
use crate::motor::GateMotor;
use crate::traits::{MotorHardware, MqttClient};

/// Topic suffix for inbound actions.
pub const ACTION_TOPIC: &str = "gate/action";
/// Topic suffix for inbound state queries.
pub const STATE_TOPIC: &str = "gate/state";
/// Topic suffix for outbound answers.
pub const ANSWER_TOPIC: &str = "gate/state/answer";

// ============================================================================
// Protocol Types
// ============================================================================

/// Remote request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[repr(u8)]
pub enum GateAction {
    /// Drive towards the open limit.
    Open = 0,
    /// Drive towards the closed limit.
    Close = 1,
    /// Halt.
    Stop = 2,
}

impl GateAction {
    /// Decode a wire code.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(GateAction::Open),
            1 => Some(GateAction::Close),
            2 => Some(GateAction::Stop),
            _ => None,
        }
    }

    /// Parse an ASCII decimal payload. Surrounding whitespace is ignored.
    ///
    /// ```rust
    /// use rs_gate::GateAction;
    ///
    /// assert_eq!(GateAction::parse(b"1").ok(), Some(GateAction::Close));
    /// assert_eq!(GateAction::parse(b" 2\n").ok(), Some(GateAction::Stop));
    /// assert!(GateAction::parse(b"3").is_err());
    /// assert!(GateAction::parse(b"open").is_err());
    /// ```
    pub fn parse(payload: &[u8]) -> Result<Self, InvalidActionCode> {
        core::str::from_utf8(payload)
            .ok()
            .and_then(|text| text.trim().parse::<i64>().ok())
            .and_then(Self::from_code)
            .ok_or_else(|| InvalidActionCode::from_payload(payload))
    }

    /// Objective state this request asks for.
    pub const fn objective(self) -> GateObjectiveState {
        match self {
            GateAction::Open => GateObjectiveState::Opened,
            GateAction::Close => GateObjectiveState::Closed,
            GateAction::Stop => GateObjectiveState::Stopped,
        }
    }

    /// Motor action that realises this request.
    pub const fn motor_action(self) -> MotorAction {
        match self {
            GateAction::Open => MotorAction::Clockwise,
            GateAction::Close => MotorAction::CounterClockwise,
            GateAction::Stop => MotorAction::Stop,
        }
    }
}

/// Gate-level state derived from the motor direction.
///
/// `Stopped` covers both a manual halt and a completed travel; see
/// [`GateMotor::last_limit`] to tell them apart locally.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[repr(u8)]
pub enum GateObjectiveState {
    /// Motor turning clockwise.
    Opened = 0,
    /// Motor turning counter-clockwise.
    Closed = 1,
    /// Motor not driven.
    Stopped = 2,
}

impl GateObjectiveState {
    /// Wire code.
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl From<MotorDirectionState> for GateObjectiveState {
    fn from(direction: MotorDirectionState) -> Self {
        match direction {
            MotorDirectionState::Clockwise => GateObjectiveState::Opened,
            MotorDirectionState::CounterClockwise => GateObjectiveState::Closed,
            MotorDirectionState::Stopped => GateObjectiveState::Stopped,
        }
    }
}

/// What the coordinator published.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateAnswer {
    /// Objective state after handling the request.
    State(GateObjectiveState),
    /// The requested objective was already in effect.
    AlreadyAchieved,
}

impl GateAnswer {
    /// Wire code of [`GateAnswer::AlreadyAchieved`].
    pub const ALREADY_ACHIEVED_CODE: i8 = -1;

    /// Wire code.
    pub const fn code(self) -> i8 {
        match self {
            GateAnswer::State(state) => state.code() as i8,
            GateAnswer::AlreadyAchieved => Self::ALREADY_ACHIEVED_CODE,
        }
    }

    /// ASCII decimal payload.
    pub fn payload(self) -> heapless::String<4> {
        let mut out = heapless::String::new();
        let _ = fmt::Write::write_fmt(&mut out, format_args!("{}", self.code()));
        out
    }
}

// ============================================================================
// Errors
// ============================================================================

/// A remote action payload outside {0, 1, 2}.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvalidActionCode {
    /// Offending payload, lossily decoded and truncated.
    pub payload: String,
}

impl InvalidActionCode {
    const MAX_ECHO: usize = 16;

    fn from_payload(payload: &[u8]) -> Self {
        let text = String::from_utf8_lossy(payload);
        Self {
            payload: text.chars().take(Self::MAX_ECHO).collect(),
        }
    }
}

impl fmt::Display for InvalidActionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid gate action code {:?}", self.payload)
    }
}

/// Gate coordinator errors.
#[derive(Debug)]
pub enum GateError<E> {
    /// Rejected request; nothing was published.
    InvalidActionCode(InvalidActionCode),
    /// The answer could not be published.
    Publish(E),
}

impl<E: fmt::Debug> fmt::Display for GateError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateError::InvalidActionCode(e) => write!(f, "{}", e),
            GateError::Publish(e) => write!(f, "failed to publish gate answer: {:?}", e),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for InvalidActionCode {}

#[cfg(feature = "std")]
impl<E: fmt::Debug> std::error::Error for GateError<E> {}

impl<E> From<InvalidActionCode> for GateError<E> {
    fn from(e: InvalidActionCode) -> Self {
        GateError::InvalidActionCode(e)
    }
}

// ============================================================================
// Topics
// ============================================================================

/// Fully qualified gate topics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GateTopics {
    /// Inbound actions.
    pub action: LongString,
    /// Inbound state queries.
    pub state: LongString,
    /// Outbound answers.
    pub answer: LongString,
}

impl GateTopics {
    /// Topics below `base`.
    pub fn new(base: &str) -> Self {
        let join = |suffix: &str| {
            let mut topic = long_string(base);
            let _ = topic.push('/');
            let _ = topic.push_str(suffix);
            topic
        };
        Self {
            action: join(ACTION_TOPIC),
            state: join(STATE_TOPIC),
            answer: join(ANSWER_TOPIC),
        }
    }

    /// Topics below the configured prefix.
    pub fn from_config(config: &MqttConfig) -> Self {
        Self {
            action: config.topic(ACTION_TOPIC),
            state: config.topic(STATE_TOPIC),
            answer: config.topic(ANSWER_TOPIC),
        }
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// Bridges remote requests to the motor and publishes the outcome.
pub struct GateCoordinator<H: MotorHardware> {
    motor: Arc<GateMotor<H>>,
    topics: GateTopics,
}

impl<H: MotorHardware> GateCoordinator<H> {
    /// Create a coordinator for `motor`.
    pub fn new(motor: Arc<GateMotor<H>>, topics: GateTopics) -> Self {
        Self { motor, topics }
    }

    /// The motor being coordinated.
    pub fn motor(&self) -> &Arc<GateMotor<H>> {
        &self.motor
    }

    /// Topics in use.
    pub fn topics(&self) -> &GateTopics {
        &self.topics
    }

    /// Objective state derived from the motor right now.
    pub fn objective_state(&self) -> GateObjectiveState {
        self.motor.current().into()
    }

    /// Parse an action payload and handle it.
    pub fn handle_action_payload<C: MqttClient>(
        &self,
        client: &mut C,
        payload: &[u8],
    ) -> Result<GateAnswer, GateError<C::Error>> {
        match GateAction::parse(payload) {
            Ok(action) => self.handle_remote_action(client, action),
            Err(e) => {
                warn!("gate: rejected action: {}", e);
                Err(e.into())
            }
        }
    }

    /// Handle a decoded action code. Codes outside {0, 1, 2} are rejected.
    pub fn handle_action_code<C: MqttClient>(
        &self,
        client: &mut C,
        code: i64,
    ) -> Result<GateAnswer, GateError<C::Error>> {
        match GateAction::from_code(code) {
            Some(action) => self.handle_remote_action(client, action),
            None => {
                let e = InvalidActionCode {
                    payload: alloc::format!("{}", code),
                };
                warn!("gate: rejected action: {}", e);
                Err(e.into())
            }
        }
    }

    /// Drive the motor towards `action` unless its objective already holds,
    /// then publish the answer.
    pub fn handle_remote_action<C: MqttClient>(
        &self,
        client: &mut C,
        action: GateAction,
    ) -> Result<GateAnswer, GateError<C::Error>> {
        let objective = self.objective_state();
        let answer = if action.objective() == objective {
            info!("gate: {:?} already achieved", objective);
            GateAnswer::AlreadyAchieved
        } else {
            self.motor.apply_action(action.motor_action());
            let state = self.objective_state();
            info!("gate: {:?} requested, now {:?}", action, state);
            GateAnswer::State(state)
        };
        self.publish(client, answer)?;
        Ok(answer)
    }

    /// Publish the objective state without touching the motor.
    pub fn handle_state_query<C: MqttClient>(
        &self,
        client: &mut C,
    ) -> Result<GateObjectiveState, GateError<C::Error>> {
        let state = self.objective_state();
        self.publish(client, GateAnswer::State(state))?;
        Ok(state)
    }

    fn publish<C: MqttClient>(
        &self,
        client: &mut C,
        answer: GateAnswer,
    ) -> Result<(), GateError<C::Error>> {
        client
            .publish(self.topics.answer.as_str(), answer.payload().as_bytes(), false)
            .map_err(GateError::Publish)
    }
}
