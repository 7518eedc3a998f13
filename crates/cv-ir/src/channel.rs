//! Output channel addressing and the device voltage range.

use core::fmt;

use crate::error::ConfigError;

/// Number of hardware output channels.
pub const NUM_CHANNELS: usize = 4;

/// Lowest voltage the default output stage can produce.
pub const DEFAULT_MIN_VOLTS: f32 = -6.0;
/// Highest voltage the default output stage can produce.
pub const DEFAULT_MAX_VOLTS: f32 = 6.0;

/// A hardware output channel.
///
/// Stored 0-based; user-facing numbering (`1..=4`) goes through
/// [`Channel::from_number`] and [`Channel::number`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Channel(u8);

impl Channel {
    /// Channel from a 0-based index.
    pub const fn from_index(index: usize) -> Option<Self> {
        if index < NUM_CHANNELS {
            Some(Self(index as u8))
        } else {
            None
        }
    }

    /// Channel from a 1-based number, as printed on the panel.
    pub const fn from_number(number: u8) -> Option<Self> {
        if number >= 1 && (number as usize) <= NUM_CHANNELS {
            Some(Self(number - 1))
        } else {
            None
        }
    }

    /// 0-based index, suitable for indexing per-channel arrays.
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// 1-based number.
    pub const fn number(self) -> u8 {
        self.0 + 1
    }

    /// All channels in index order.
    pub fn all() -> impl Iterator<Item = Channel> {
        (0..NUM_CHANNELS as u8).map(Channel)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "output {}", self.number())
    }
}

/// Inclusive voltage range of the output stage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OutputRange {
    min: f32,
    max: f32,
}

impl OutputRange {
    pub fn new(min: f32, max: f32) -> Result<Self, ConfigError> {
        if !min.is_finite() || !max.is_finite() || min >= max {
            return Err(ConfigError::InvalidRange { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    /// Clamp a voltage into range. NaN maps to the in-range value nearest 0 V.
    pub fn clamp(&self, volts: f32) -> f32 {
        if volts.is_nan() {
            return 0.0f32.clamp(self.min, self.max);
        }
        volts.clamp(self.min, self.max)
    }

    pub fn contains(&self, volts: f32) -> bool {
        volts >= self.min && volts <= self.max
    }
}

impl Default for OutputRange {
    fn default() -> Self {
        Self { min: DEFAULT_MIN_VOLTS, max: DEFAULT_MAX_VOLTS }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbering_is_one_based() {
        let ch = Channel::from_number(1).unwrap();
        assert_eq!(ch.index(), 0);
        assert_eq!(ch.number(), 1);
        assert_eq!(Channel::from_number(4).unwrap().index(), 3);
    }

    #[test]
    fn out_of_range_channels_rejected() {
        assert!(Channel::from_number(0).is_none());
        assert!(Channel::from_number(5).is_none());
        assert!(Channel::from_index(4).is_none());
    }

    #[test]
    fn all_channels_in_order() {
        let numbers: Vec<u8> = Channel::all().map(Channel::number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
    }

    #[test]
    fn range_clamps() {
        let range = OutputRange::default();
        assert_eq!(range.clamp(10.0), 6.0);
        assert_eq!(range.clamp(-10.0), -6.0);
        assert_eq!(range.clamp(1.5), 1.5);
        assert_eq!(range.clamp(f32::NAN), 0.0);
    }

    #[test]
    fn nan_clamps_to_nearest_bound_when_zero_excluded() {
        let range = OutputRange::new(1.0, 5.0).unwrap();
        assert_eq!(range.clamp(f32::NAN), 1.0);
    }

    #[test]
    fn inverted_range_rejected() {
        assert!(OutputRange::new(5.0, -5.0).is_err());
        assert!(OutputRange::new(1.0, 1.0).is_err());
    }
}
