//! Ramp shapes and their lookup tables.
//!
//! A [`Shape`] is a closed set of easing curves. Every curve maps the
//! normalized segment position `t` in `[0, 1]` to a normalized progress in
//! `[0, 1]`, is non-decreasing, and hits exactly 0 at `t = 0` and exactly 1
//! at `t = 1`. The transcendental curves are sampled once into a
//! [`ShapeTable`] and evaluated by linear interpolation on the tick path.

use core::f32::consts::PI;
use core::fmt;
use core::str::FromStr;

use alloc::string::ToString;

use crate::error::ConfigError;

/// Segments per lookup table (tables hold `LUT_SIZE + 1` points).
pub const LUT_SIZE: usize = 256;

/// Easing curve for a ramp segment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Shape {
    /// Straight line.
    #[default]
    Linear,
    /// Half-cosine: slow start, slow finish.
    Sine,
    /// Fast start, decelerating toward the target (`1 - 2^(-10t)`, normalized).
    Log,
    /// Slow start, accelerating into the target (`2^(10(t-1))`, normalized).
    Exp,
    /// Jump to the target on the first sample, then hold for the segment time.
    Now,
    /// Hold the start value, jump to the target on the last sample.
    Wait,
}

impl Shape {
    pub const ALL: [Shape; 6] =
        [Shape::Linear, Shape::Sine, Shape::Log, Shape::Exp, Shape::Now, Shape::Wait];

    /// Parse a shape tag. Matching is case-insensitive and accepts the
    /// common abbreviations.
    pub fn parse(tag: &str) -> Result<Self, ConfigError> {
        let lower = tag.trim().to_ascii_lowercase();
        match lower.as_str() {
            "linear" | "lin" => Ok(Shape::Linear),
            "sine" | "sin" => Ok(Shape::Sine),
            "log" | "logarithmic" => Ok(Shape::Log),
            "exp" | "expo" | "exponential" => Ok(Shape::Exp),
            "now" => Ok(Shape::Now),
            "wait" => Ok(Shape::Wait),
            _ => Err(ConfigError::UnknownShape(tag.to_string())),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Shape::Linear => "linear",
            Shape::Sine => "sine",
            Shape::Log => "log",
            Shape::Exp => "exp",
            Shape::Now => "now",
            Shape::Wait => "wait",
        }
    }

    /// Exact curve value, used to build the tables.
    fn exact(self, t: f32) -> f32 {
        // 2^-10: the raw log/exp curves start/end this far from 0/1.
        const FLOOR: f32 = 1.0 / 1024.0;
        match self {
            Shape::Linear => t,
            Shape::Sine => 0.5 - 0.5 * libm::cosf(PI * t),
            Shape::Log => (1.0 - libm::exp2f(-10.0 * t)) / (1.0 - FLOOR),
            Shape::Exp => (libm::exp2f(10.0 * (t - 1.0)) - FLOOR) / (1.0 - FLOOR),
            Shape::Now => {
                if t > 0.0 { 1.0 } else { 0.0 }
            }
            Shape::Wait => {
                if t >= 1.0 { 1.0 } else { 0.0 }
            }
        }
    }
}

impl FromStr for Shape {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Shape::parse(s)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Precomputed curves for the transcendental shapes.
///
/// Built once at boot; [`ShapeTable::eval`] is allocation-free and O(1).
#[derive(Clone, Debug)]
pub struct ShapeTable {
    sine: [f32; LUT_SIZE + 1],
    log: [f32; LUT_SIZE + 1],
    exp: [f32; LUT_SIZE + 1],
}

impl ShapeTable {
    pub fn new() -> Self {
        Self {
            sine: build_table(Shape::Sine),
            log: build_table(Shape::Log),
            exp: build_table(Shape::Exp),
        }
    }

    /// Normalized progress of `shape` at position `t` (clamped to `[0, 1]`).
    pub fn eval(&self, shape: Shape, t: f32) -> f32 {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        match shape {
            Shape::Linear | Shape::Now | Shape::Wait => shape.exact(t),
            Shape::Sine => lookup(&self.sine, t),
            Shape::Log => lookup(&self.log, t),
            Shape::Exp => lookup(&self.exp, t),
        }
    }
}

impl Default for ShapeTable {
    fn default() -> Self {
        Self::new()
    }
}

fn build_table(shape: Shape) -> [f32; LUT_SIZE + 1] {
    let mut table = [0.0; LUT_SIZE + 1];
    let mut floor = 0.0f32;
    for (i, slot) in table.iter_mut().enumerate() {
        let t = i as f32 / LUT_SIZE as f32;
        // Running max irons out rounding wobble so the table stays monotonic.
        floor = floor.max(shape.exact(t).clamp(0.0, 1.0));
        *slot = floor;
    }
    table[0] = 0.0;
    table[LUT_SIZE] = 1.0;
    table
}

fn lookup(table: &[f32; LUT_SIZE + 1], t: f32) -> f32 {
    if t >= 1.0 {
        return 1.0;
    }
    let pos = t * LUT_SIZE as f32;
    let index = (pos as usize).min(LUT_SIZE - 1);
    let frac = pos - index as f32;
    let (a, b) = (table[index], table[index + 1]);
    (a + (b - a) * frac).clamp(a, b)
}
