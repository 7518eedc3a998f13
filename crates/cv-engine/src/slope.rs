//! Per-channel ramp state machine.

use cv_ir::{Shape, ShapeTable};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlopePhase {
    /// Static voltage, no target.
    Idle,
    /// Moving toward the target.
    Ramping,
    /// Landed on the target this tick.
    Arrived,
}

/// Result of one [`SlopeState::step`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Holding,
    Moving,
    /// The segment tagged with this generation just landed on its target.
    Completed(u32),
}

/// Ramp state for one channel.
///
/// `start`, `target` and the tick counters are always written together by
/// [`SlopeState::toward`], so a reader holding the channel lock never sees a
/// target paired with another segment's timing.
#[derive(Clone, Debug)]
pub struct SlopeState {
    current: f32,
    start: f32,
    target: f32,
    total: u32,
    remaining: u32,
    shape: Shape,
    phase: SlopePhase,
    generation: u32,
}

impl SlopeState {
    pub fn new(volts: f32) -> Self {
        Self {
            current: volts,
            start: volts,
            target: volts,
            total: 0,
            remaining: 0,
            shape: Shape::Linear,
            phase: SlopePhase::Idle,
            generation: 0,
        }
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn phase(&self) -> SlopePhase {
        self.phase
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Start a new segment from the current voltage, replacing any segment in
    /// flight. Zero ticks applies the target immediately without producing a
    /// completion. Returns the segment's generation tag.
    pub fn toward(&mut self, target: f32, ticks: u32, shape: Shape) -> u32 {
        self.generation = self.generation.wrapping_add(1);
        self.start = self.current;
        self.target = target;
        self.shape = shape;
        self.total = ticks;
        self.remaining = ticks;
        if ticks == 0 {
            self.current = target;
            self.phase = SlopePhase::Arrived;
        } else {
            self.phase = SlopePhase::Ramping;
        }
        self.generation
    }

    /// Cancel any segment in flight and hold the current voltage.
    pub fn hold(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.start = self.current;
        self.target = self.current;
        self.total = 0;
        self.remaining = 0;
        self.phase = SlopePhase::Idle;
    }

    /// Advance by one output sample.
    #[inline]
    pub fn step(&mut self, table: &ShapeTable) -> StepOutcome {
        match self.phase {
            SlopePhase::Idle => StepOutcome::Holding,
            SlopePhase::Arrived => {
                self.phase = SlopePhase::Idle;
                StepOutcome::Holding
            }
            SlopePhase::Ramping => {
                self.remaining = self.remaining.saturating_sub(1);
                if self.remaining == 0 {
                    self.current = self.target;
                    self.phase = SlopePhase::Arrived;
                    return StepOutcome::Completed(self.generation);
                }
                let t = (self.total - self.remaining) as f32 / self.total as f32;
                let progress = table.eval(self.shape, t);
                let v = self.start + (self.target - self.start) * progress;
                let (lo, hi) = if self.start <= self.target {
                    (self.start, self.target)
                } else {
                    (self.target, self.start)
                };
                self.current = v.clamp(lo, hi);
                StepOutcome::Moving
            }
        }
    }
}

impl Default for SlopeState {
    fn default() -> Self {
        Self::new(0.0)
    }
}
