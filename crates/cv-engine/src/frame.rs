//! Output frame type.

use cv_ir::{Channel, NUM_CHANNELS};

/// The voltages written to every channel in one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct OutputFrame {
    pub volts: [f32; NUM_CHANNELS],
}

impl OutputFrame {
    pub const fn zero() -> Self {
        Self { volts: [0.0; NUM_CHANNELS] }
    }

    pub fn get(&self, channel: Channel) -> f32 {
        self.volts[channel.index()]
    }

    pub fn set(&mut self, channel: Channel, volts: f32) {
        self.volts[channel.index()] = volts;
    }
}
