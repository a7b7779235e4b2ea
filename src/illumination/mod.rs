//! Illumination - LED flash control
//!
//! ## Responsibilities
//!
//! - Hold the configured LED intensity (`led_intensity` command)
//! - Track the process-wide "currently streaming" flag
//! - Drive the PWM duty when capture paths switch the LED on and off

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Highest duty applied while a stream is running (8 bit PWM)
pub const LED_MAX_INTENSITY: i32 = 255;

/// PWM output driving the LED
pub trait LedDriver: Send + Sync {
    fn write_duty(&self, duty: u32);
}

/// LED that only remembers what was written
#[derive(Debug, Default)]
pub struct SimulatedLed {
    duty: AtomicU32,
    writes: AtomicU64,
}

impl SimulatedLed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn duty(&self) -> u32 {
        self.duty.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }
}

impl LedDriver for SimulatedLed {
    fn write_duty(&self, duty: u32) {
        self.duty.store(duty, Ordering::SeqCst);
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

/// LED state shared by the capture, stream and control paths
pub struct Illuminator {
    driver: Arc<dyn LedDriver>,
    intensity: AtomicI32,
    streaming: AtomicBool,
}

impl Illuminator {
    pub fn new(driver: Arc<dyn LedDriver>) -> Self {
        Self {
            driver,
            intensity: AtomicI32::new(0),
            streaming: AtomicBool::new(false),
        }
    }

    /// Switch the LED on at the configured intensity, or off
    pub fn enable(&self, on: bool) {
        let intensity = self.intensity();
        let mut duty = if on { intensity } else { 0 };
        if on && self.is_streaming() && intensity > LED_MAX_INTENSITY {
            duty = LED_MAX_INTENSITY;
        }
        let duty = u32::try_from(duty).unwrap_or(0);
        self.driver.write_duty(duty);
        tracing::info!(duty, "Set LED intensity");
    }

    /// Store a new intensity; re-applied at once while streaming
    pub fn set_intensity(&self, value: i32) {
        self.intensity.store(value, Ordering::SeqCst);
        if self.is_streaming() {
            self.enable(true);
        }
    }

    pub fn intensity(&self) -> i32 {
        self.intensity.load(Ordering::SeqCst)
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    /// Mark a stream as running and light the LED.
    ///
    /// The returned guard clears the flag and turns the LED off when dropped.
    pub fn begin_stream(self: &Arc<Self>) -> StreamingGuard {
        self.streaming.store(true, Ordering::SeqCst);
        self.enable(true);
        StreamingGuard {
            illuminator: Arc::clone(self),
        }
    }

    /// Light the LED for a single capture. Dropping the guard turns it off,
    /// also when the request is cancelled mid-exposure.
    pub fn flash(self: &Arc<Self>) -> FlashGuard {
        self.enable(true);
        FlashGuard {
            illuminator: Arc::clone(self),
        }
    }
}

/// Held while a single capture is exposed
pub struct FlashGuard {
    illuminator: Arc<Illuminator>,
}

impl Drop for FlashGuard {
    fn drop(&mut self) {
        self.illuminator.enable(false);
    }
}

/// Held for the lifetime of a stream connection
pub struct StreamingGuard {
    illuminator: Arc<Illuminator>,
}

impl Drop for StreamingGuard {
    fn drop(&mut self) {
        self.illuminator.streaming.store(false, Ordering::SeqCst);
        self.illuminator.enable(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Arc<SimulatedLed>, Arc<Illuminator>) {
        let led = Arc::new(SimulatedLed::new());
        let illuminator = Arc::new(Illuminator::new(led.clone()));
        (led, illuminator)
    }

    #[test]
    fn test_enable_uses_intensity() {
        let (led, illuminator) = setup();
        illuminator.set_intensity(120);
        assert_eq!(led.writes(), 0);

        illuminator.enable(true);
        assert_eq!(led.duty(), 120);
        illuminator.enable(false);
        assert_eq!(led.duty(), 0);
    }

    #[test]
    fn test_stream_clamps_and_clears() {
        let (led, illuminator) = setup();
        illuminator.set_intensity(400);

        let guard = illuminator.begin_stream();
        assert!(illuminator.is_streaming());
        assert_eq!(led.duty(), 255);

        illuminator.set_intensity(30);
        assert_eq!(led.duty(), 30);

        drop(guard);
        assert!(!illuminator.is_streaming());
        assert_eq!(led.duty(), 0);
    }

    #[test]
    fn test_flash_guard_turns_led_off() {
        let (led, illuminator) = setup();
        illuminator.set_intensity(100);

        let flash = illuminator.flash();
        assert_eq!(led.duty(), 100);
        drop(flash);
        assert_eq!(led.duty(), 0);
        assert_eq!(led.writes(), 2);
    }

    #[test]
    fn test_negative_intensity_is_off() {
        let (led, illuminator) = setup();
        illuminator.set_intensity(-5);
        illuminator.enable(true);
        assert_eq!(led.duty(), 0);
    }
}
