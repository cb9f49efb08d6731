//! One-shot debounce timer on top of `esp_timer`.
//!
//! `esp_timer_start_once` is callable from an ISR, so the button handler
//! can arm the timer directly. The callback is dispatched on the
//! `esp_timer` task, never in interrupt context.

use core::ffi::c_void;
use core::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::time::Duration;

use esp_idf_hal::sys::{
    esp, esp_timer, esp_timer_create, esp_timer_create_args_t,
    esp_timer_dispatch_t_ESP_TIMER_TASK, esp_timer_is_active, esp_timer_start_once,
    esp_timer_stop, EspError, ESP_ERR_INVALID_STATE,
};

use crate::traits::DebounceTimer;

type Callback = Box<dyn FnMut() + Send + 'static>;

fn invalid_state() -> EspError {
    EspError::from_infallible::<{ ESP_ERR_INVALID_STATE as i32 }>()
}

/// Debounce timer with an interval fixed at construction.
pub struct Esp32DebounceTimer {
    interval: Duration,
    handle: AtomicPtr<esp_timer>,
}

impl Esp32DebounceTimer {
    /// Create an idle timer. The hardware timer is allocated by `subscribe`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            handle: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Interval between `arm` and the callback.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    unsafe extern "C" fn fire(arg: *mut c_void) {
        let callback = &mut *(arg as *mut Callback);
        callback();
    }
}

impl DebounceTimer for Esp32DebounceTimer {
    type Error = EspError;

    fn subscribe<F>(&mut self, callback: F) -> Result<(), EspError>
    where
        F: FnMut() + Send + 'static,
    {
        if !self.handle.load(Ordering::Acquire).is_null() {
            return Err(invalid_state());
        }

        // Leaked: the timer lives for the rest of the process.
        let callback: Callback = Box::new(callback);
        let callback = Box::into_raw(Box::new(callback));
        let args = esp_timer_create_args_t {
            callback: Some(Self::fire),
            arg: callback as *mut c_void,
            dispatch_method: esp_timer_dispatch_t_ESP_TIMER_TASK,
            name: c"debounce".as_ptr(),
            skip_unhandled_events: true,
        };
        let mut handle = ptr::null_mut();
        esp!(unsafe { esp_timer_create(&args, &mut handle) })?;
        self.handle.store(handle, Ordering::Release);
        Ok(())
    }

    fn arm(&self) -> Result<(), EspError> {
        let handle = self.handle.load(Ordering::Acquire);
        if handle.is_null() {
            return Err(invalid_state());
        }
        unsafe {
            if esp_timer_is_active(handle) {
                esp!(esp_timer_stop(handle))?;
            }
            esp!(esp_timer_start_once(handle, self.interval.as_micros() as u64))
        }
    }
}
