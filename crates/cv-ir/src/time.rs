//! Conversion between seconds and scheduler ticks.

use core::time::Duration;

use crate::error::ConfigError;

/// Default control-block rate.
pub const DEFAULT_TICK_HZ: u32 = 1500;

/// Rate of the real-time output scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickRate {
    hz: u32,
}

impl TickRate {
    pub fn new(hz: u32) -> Result<Self, ConfigError> {
        if hz == 0 {
            return Err(ConfigError::InvalidTickRate);
        }
        Ok(Self { hz })
    }

    pub fn hz(self) -> u32 {
        self.hz
    }

    /// Length of one tick.
    pub fn period(self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.hz as u64)
    }

    /// Ticks spanned by `seconds`. Any positive duration lasts at least one
    /// tick; zero, negative and NaN durations are instantaneous.
    pub fn seconds_to_ticks(self, seconds: f32) -> u32 {
        if seconds.is_nan() || seconds <= 0.0 {
            return 0;
        }
        let ticks = libm::roundf(seconds * self.hz as f32);
        if ticks >= u32::MAX as f32 {
            u32::MAX
        } else {
            (ticks as u32).max(1)
        }
    }

    pub fn ticks_to_seconds(self, ticks: u32) -> f32 {
        ticks as f32 / self.hz as f32
    }
}

impl Default for TickRate {
    fn default() -> Self {
        Self { hz: DEFAULT_TICK_HZ }
    }
}
