//! Internal input sources.

use cv_engine::{InputEvent, InputSource};
use cv_ir::TickRate;

/// Square-wave clock counted in ticks. Emits a rising edge at the start of
/// each period and a falling edge halfway through.
pub struct ClockInput {
    input: u8,
    period: u32,
    counter: u32,
}

impl ClockInput {
    /// `input` is 0-based. Periods shorter than two ticks are stretched to
    /// two so both edges fire.
    pub fn new(input: u8, period_seconds: f32, rate: TickRate) -> Self {
        Self { input, period: rate.seconds_to_ticks(period_seconds).max(2), counter: 0 }
    }

    pub fn period_ticks(&self) -> u32 {
        self.period
    }
}

impl InputSource for ClockInput {
    fn poll(&mut self) -> Option<InputEvent> {
        let phase = self.counter;
        self.counter = (self.counter + 1) % self.period;
        if phase == 0 {
            Some(InputEvent::rising(self.input))
        } else if phase == self.period / 2 {
            Some(InputEvent::falling(self.input))
        } else {
            None
        }
    }
}
