//! Button, end-of-travel switch and LED lines.
//!
//! Pins are configured once through `PinDriver`. After that, levels and
//! interrupt masks are driven with the ESP-IDF GPIO calls directly, which
//! take no locks and are safe from an ISR.
//!
//! # Wiring
//!
//! - Button / switches: between GPIO and GND, internal pull-up
//! - LEDs: GPIO → resistor → LED → GND

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use esp_idf_hal::gpio::{AnyIOPin, AnyOutputPin, Input, InterruptType, Output, PinDriver, Pull};
use esp_idf_hal::sys::{
    esp, gpio_get_level, gpio_intr_disable, gpio_intr_enable, gpio_set_level, EspError,
};

use crate::traits::{InterruptLine, OutputLine};

// ============================================================================
// Input Line
// ============================================================================

/// Active-low input with a falling-edge interrupt.
///
/// The HAL masks a pin's interrupt each time it fires, so the armed flag is
/// cleared before the registered handler runs.
///
/// # Example
///
/// ```ignore
/// use rs_gate::hal::esp32::Esp32InputLine;
///
/// let peripherals = Peripherals::take()?;
/// let button = Esp32InputLine::new(peripherals.pins.gpio14.into())?;
/// ```
pub struct Esp32InputLine {
    driver: Mutex<PinDriver<'static, AnyIOPin, Input>>,
    pin: i32,
    armed: Arc<AtomicBool>,
}

impl Esp32InputLine {
    /// Configure `pin` as a pulled-up input interrupting on the falling edge.
    ///
    /// The interrupt starts masked.
    pub fn new(pin: AnyIOPin) -> Result<Self, EspError> {
        let mut driver = PinDriver::input(pin)?;
        driver.set_pull(Pull::Up)?;
        driver.set_interrupt_type(InterruptType::NegEdge)?;
        let pin = driver.pin();
        Ok(Self {
            driver: Mutex::new(driver),
            pin,
            armed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// GPIO number.
    pub fn pin(&self) -> i32 {
        self.pin
    }
}

impl InterruptLine for Esp32InputLine {
    type Error = EspError;

    fn read(&self) -> bool {
        unsafe { gpio_get_level(self.pin) != 0 }
    }

    fn is_asserted(&self) -> bool {
        // Active low
        !self.read()
    }

    fn enable_interrupt(&self) -> Result<(), EspError> {
        // Flag first: the edge can fire as soon as the mask is lifted.
        self.armed.store(true, Ordering::Release);
        esp!(unsafe { gpio_intr_enable(self.pin) }).inspect_err(|_| {
            self.armed.store(false, Ordering::Release);
        })
    }

    fn disable_interrupt(&self) -> Result<(), EspError> {
        esp!(unsafe { gpio_intr_disable(self.pin) })?;
        self.armed.store(false, Ordering::Release);
        Ok(())
    }

    fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    fn subscribe<F>(&mut self, mut handler: F) -> Result<(), EspError>
    where
        F: FnMut() + Send + 'static,
    {
        let armed = Arc::clone(&self.armed);
        let driver = self
            .driver
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        // SAFETY: the handler only touches atomics, GPIO registers and the
        // FreeRTOS queue, all of which are ISR-safe.
        unsafe {
            driver.subscribe(move || {
                armed.store(false, Ordering::Release);
                handler();
            })
        }
    }
}

// ============================================================================
// Output Line
// ============================================================================

/// Push-pull output driving an indicator LED.
pub struct Esp32OutputLine {
    _driver: Mutex<PinDriver<'static, AnyOutputPin, Output>>,
    pin: i32,
    level: AtomicBool,
}

impl Esp32OutputLine {
    /// Configure `pin` as an output, initially low.
    pub fn new(pin: AnyOutputPin) -> Result<Self, EspError> {
        let mut driver = PinDriver::output(pin)?;
        driver.set_low()?;
        let pin = driver.pin();
        Ok(Self {
            _driver: Mutex::new(driver),
            pin,
            level: AtomicBool::new(false),
        })
    }
}

impl OutputLine for Esp32OutputLine {
    type Error = EspError;

    fn write(&self, on: bool) -> Result<(), EspError> {
        esp!(unsafe { gpio_set_level(self.pin, on as u32) })?;
        self.level.store(on, Ordering::Release);
        Ok(())
    }

    fn toggle(&self) -> Result<(), EspError> {
        self.write(!self.is_set())
    }

    fn is_set(&self) -> bool {
        self.level.load(Ordering::Acquire)
    }
}
