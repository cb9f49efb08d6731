//! H-bridge motor driver on two GPIO direction inputs.
//!
//! | IN1 | IN2 | Motor |
//! |-----|-----|-------|
//! | 0 | 0 | brake / stopped |
//! | 1 | 0 | clockwise (open) |
//! | 0 | 1 | counter-clockwise (close) |
//!
//! Reversing brakes first and waits the settle time before energising the
//! new direction. A stop issued during the wait cancels the reversal.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::{AnyOutputPin, Output, PinDriver};
use esp_idf_hal::sys::{esp, gpio_set_level, EspError};

use crate::direction::MotorAction;
use crate::traits::MotorDriver;

/// H-bridge driver for the gate motor.
///
/// # Hardware Setup
///
/// - GPIO32 → IN1
/// - GPIO33 → IN2
/// - ENA jumpered high (full speed)
///
/// # Example
///
/// ```ignore
/// use rs_gate::hal::esp32::Esp32MotorDriver;
/// use std::time::Duration;
///
/// let peripherals = Peripherals::take()?;
/// let driver = Esp32MotorDriver::new(
///     peripherals.pins.gpio32.into(),
///     peripherals.pins.gpio33.into(),
///     Duration::from_millis(300),
/// )?;
/// ```
pub struct Esp32MotorDriver {
    _pins: Mutex<(
        PinDriver<'static, AnyOutputPin, Output>,
        PinDriver<'static, AnyOutputPin, Output>,
    )>,
    in1: i32,
    in2: i32,
    settle: Duration,
    current: AtomicU8,
    /// Bumped by every `drive`; a reversal aborts if it moved while settling.
    epoch: AtomicU32,
}

impl Esp32MotorDriver {
    /// Configure both inputs low (braked).
    pub fn new(in1: AnyOutputPin, in2: AnyOutputPin, settle: Duration) -> Result<Self, EspError> {
        let mut in1 = PinDriver::output(in1)?;
        let mut in2 = PinDriver::output(in2)?;
        in1.set_low()?;
        in2.set_low()?;
        let (in1_pin, in2_pin) = (in1.pin(), in2.pin());
        Ok(Self {
            _pins: Mutex::new((in1, in2)),
            in1: in1_pin,
            in2: in2_pin,
            settle,
            current: AtomicU8::new(MotorAction::Stop as u8),
            epoch: AtomicU32::new(0),
        })
    }

    fn set_inputs(&self, in1: bool, in2: bool) -> Result<(), EspError> {
        // Release the energised side first so both are never high together.
        if in1 {
            esp!(unsafe { gpio_set_level(self.in2, in2 as u32) })?;
            esp!(unsafe { gpio_set_level(self.in1, in1 as u32) })
        } else {
            esp!(unsafe { gpio_set_level(self.in1, in1 as u32) })?;
            esp!(unsafe { gpio_set_level(self.in2, in2 as u32) })
        }
    }
}

impl MotorDriver for Esp32MotorDriver {
    type Error = EspError;

    fn drive(&self, action: MotorAction) -> Result<(), EspError> {
        let ticket = self.epoch.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
        let previous = self.current();
        if previous == action {
            return Ok(());
        }

        match action {
            MotorAction::Stop => {
                self.set_inputs(false, false)?;
                self.current.store(MotorAction::Stop as u8, Ordering::Release);
            }
            MotorAction::Clockwise | MotorAction::CounterClockwise => {
                if previous != MotorAction::Stop {
                    self.set_inputs(false, false)?;
                    self.current.store(MotorAction::Stop as u8, Ordering::Release);
                    FreeRtos::delay_ms(self.settle.as_millis() as u32);
                    if self.epoch.load(Ordering::Acquire) != ticket {
                        return Ok(());
                    }
                }
                let clockwise = action == MotorAction::Clockwise;
                self.set_inputs(clockwise, !clockwise)?;
                self.current.store(action as u8, Ordering::Release);
            }
        }
        Ok(())
    }

    fn current(&self) -> MotorAction {
        match self.current.load(Ordering::Acquire) {
            1 => MotorAction::Clockwise,
            2 => MotorAction::CounterClockwise,
            _ => MotorAction::Stop,
        }
    }
}
