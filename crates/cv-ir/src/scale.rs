//! Per-channel scale quantizer.

use arrayvec::ArrayVec;

use crate::error::ConfigError;

/// Maximum number of degrees in a scale table.
pub const MAX_DEGREES: usize = 24;

/// Degrees per octave when none is given.
pub const DEFAULT_MODULO: f32 = 12.0;
/// Volts per octave when none is given.
pub const DEFAULT_SCALING: f32 = 1.0;

/// Scale quantizer configuration for one channel.
///
/// The degree table lives inline so a configuration can be swapped into the
/// shared channel state without allocating.
#[derive(Clone, Debug, PartialEq)]
pub struct ScaleConfig {
    active: bool,
    degrees: ArrayVec<f32, MAX_DEGREES>,
    modulo: f32,
    scaling: f32,
    offset: f32,
}

impl ScaleConfig {
    /// Pass-through configuration.
    pub fn disabled() -> Self {
        Self {
            active: false,
            degrees: ArrayVec::new(),
            modulo: DEFAULT_MODULO,
            scaling: DEFAULT_SCALING,
            offset: 0.0,
        }
    }

    /// Every semitone of a 12-tone octave at 1 V/oct.
    pub fn chromatic() -> Self {
        let degrees = (0..DEFAULT_MODULO as usize).map(|d| d as f32).collect();
        Self::build(degrees, DEFAULT_MODULO, DEFAULT_SCALING)
    }

    /// Custom degree table. `modulo` and `scaling` default to 12 and 1 V/oct.
    ///
    /// Each degree owns an equal share of the octave regardless of where it
    /// sits, so quantizing is only idempotent when the degrees are spread
    /// roughly evenly. For a lopsided table such as `[0, 1]` a snapped value
    /// can land in a neighbouring bin and move again on a second pass.
    pub fn custom(
        degrees: &[f32],
        modulo: Option<f32>,
        scaling: Option<f32>,
    ) -> Result<Self, ConfigError> {
        if degrees.is_empty() {
            return Err(ConfigError::EmptyScale);
        }
        if degrees.len() > MAX_DEGREES {
            return Err(ConfigError::ScaleTooLong(MAX_DEGREES));
        }
        if degrees.iter().any(|d| !d.is_finite()) || degrees.windows(2).any(|w| w[1] < w[0]) {
            return Err(ConfigError::MalformedScale);
        }

        let modulo = modulo.unwrap_or(DEFAULT_MODULO);
        if !modulo.is_finite() || modulo <= 0.0 {
            return Err(ConfigError::NonPositiveModulo(modulo));
        }
        let scaling = scaling.unwrap_or(DEFAULT_SCALING);
        if !scaling.is_finite() || scaling <= 0.0 {
            return Err(ConfigError::NonPositiveScaling(scaling));
        }

        Ok(Self::build(degrees.iter().copied().collect(), modulo, scaling))
    }

    fn build(degrees: ArrayVec<f32, MAX_DEGREES>, modulo: f32, scaling: f32) -> Self {
        Self {
            active: true,
            degrees,
            modulo,
            scaling,
            // Half a degree: bins are centred on the degrees instead of
            // starting at them, so values snap to the nearest step.
            offset: 0.5 * scaling / modulo,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn degrees(&self) -> &[f32] {
        &self.degrees
    }

    pub fn modulo(&self) -> f32 {
        self.modulo
    }

    pub fn scaling(&self) -> f32 {
        self.scaling
    }

    pub fn offset(&self) -> f32 {
        self.offset
    }

    /// Snap `volts` to the nearest scale value at or below its bin.
    ///
    /// Returns the input untouched when the quantizer is inactive.
    #[inline]
    pub fn quantize(&self, volts: f32) -> f32 {
        if !self.active {
            return volts;
        }
        let normalized = (volts + self.offset) / self.scaling;
        let octave = libm::floorf(normalized);
        let phase = normalized - octave;

        let len = self.degrees.len();
        let index = (libm::floorf(phase * len as f32) as usize).min(len - 1);
        let degree = self.degrees[index] / self.modulo;

        self.scaling * (octave + degree)
    }
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self::disabled()
    }
}
