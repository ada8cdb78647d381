//! Status indicator (LED) control.
//!
//! The loop blinks the indicator slowly while the scene is clear and quickly
//! while an object is detected. `ALERT:` frames and test commands flash it.
//! Without the `gpio` feature the indicator only tracks its state in memory.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Blink period while an object is detected (ms).
pub const DETECTED_BLINK_MS: u64 = 200;

/// Blink period while the scene is clear (ms).
pub const NORMAL_BLINK_MS: u64 = 1000;

/// A single on/off status light.
pub trait StatusIndicator: Send + Sync {
    fn set(&self, lit: bool);

    fn is_lit(&self) -> bool;

    fn toggle(&self) {
        self.set(!self.is_lit());
    }
}

pub type SharedIndicator = Arc<dyn StatusIndicator>;

/// Blink period for the current detection state.
pub fn blink_interval_ms(object_detected: bool) -> u64 {
    if object_detected {
        DETECTED_BLINK_MS
    } else {
        NORMAL_BLINK_MS
    }
}

/// In-memory indicator used when no LED is wired.
#[derive(Debug, Default)]
pub struct LogIndicator {
    lit: AtomicBool,
}

impl LogIndicator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatusIndicator for LogIndicator {
    fn set(&self, lit: bool) {
        self.lit.store(lit, Ordering::SeqCst);
    }

    fn is_lit(&self) -> bool {
        self.lit.load(Ordering::SeqCst)
    }
}

/// Light the indicator for `duration`, then turn it off, without blocking the caller.
pub fn flash(indicator: SharedIndicator, duration: Duration) {
    debug!(duration_ms = duration.as_millis() as u64, "Flashing status indicator");
    indicator.set(true);
    tokio::spawn(async move {
        tokio::time::sleep(duration).await;
        indicator.set(false);
    });
}

/// Pick the indicator for `pin`: a GPIO pin when compiled in and available,
/// otherwise the in-memory one.
pub fn indicator_for_pin(pin: Option<u8>) -> SharedIndicator {
    #[cfg(feature = "gpio")]
    {
        if let Some(pin) = pin {
            match gpio::GpioIndicator::new(pin) {
                Ok(led) => return Arc::new(led),
                Err(e) => tracing::warn!("Status LED unavailable, continuing without it: {}", e),
            }
        }
    }

    #[cfg(not(feature = "gpio"))]
    {
        if let Some(pin) = pin {
            debug!(pin, "GPIO support not compiled in, status LED is simulated");
        }
    }

    Arc::new(LogIndicator::new())
}

#[cfg(feature = "gpio")]
pub mod gpio {
    use super::StatusIndicator;
    use crate::error::{NodeError, Result};
    use rppal::gpio::{Gpio, OutputPin};
    use std::sync::Mutex;

    /// LED on a Raspberry Pi GPIO pin, via rppal.
    pub struct GpioIndicator {
        pin: Mutex<OutputPin>,
    }

    impl GpioIndicator {
        pub fn new(bcm_pin: u8) -> Result<Self> {
            let gpio = Gpio::new()
                .map_err(|e| NodeError::gpio_error(format!("Failed to initialize GPIO: {}", e)))?;
            let pin = gpio
                .get(bcm_pin)
                .map_err(|e| NodeError::gpio_error(format!("Failed to claim pin {}: {}", bcm_pin, e)))?
                .into_output_low();
            Ok(Self {
                pin: Mutex::new(pin),
            })
        }
    }

    impl StatusIndicator for GpioIndicator {
        fn set(&self, lit: bool) {
            if let Ok(mut pin) = self.pin.lock() {
                if lit {
                    pin.set_high();
                } else {
                    pin.set_low();
                }
            }
        }

        fn is_lit(&self) -> bool {
            self.pin
                .lock()
                .map(|pin| pin.is_set_high())
                .unwrap_or(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blink_interval() {
        assert_eq!(blink_interval_ms(true), 200);
        assert_eq!(blink_interval_ms(false), 1000);
    }

    #[test]
    fn test_toggle() {
        let led = LogIndicator::new();
        assert!(!led.is_lit());
        led.toggle();
        assert!(led.is_lit());
        led.toggle();
        assert!(!led.is_lit());
    }

    #[tokio::test]
    async fn test_flash_turns_off_after_duration() {
        let led: SharedIndicator = Arc::new(LogIndicator::new());
        flash(led.clone(), Duration::from_millis(20));
        assert!(led.is_lit());

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(!led.is_lit());
    }
}
