//! Fixed-period output tick.
//!
//! Per channel, in index order: step the slope, quantize, write. The
//! quantizer runs on the exact value handed to hardware, inside the same
//! critical section that produced it, so no sample (ramped or instant)
//! reaches the output unquantized.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use cv_ir::{Channel, ShapeTable, NUM_CHANNELS};
use ringbuf::traits::Producer;

use crate::frame::OutputFrame;
use crate::notice::{NoticeProducer, RtNotice};
use crate::shared::SharedState;
use crate::slope::StepOutcome;

/// Destination for output samples. Called exactly once per channel per tick;
/// implementations must be bounded-time and must not block.
pub trait HardwareOutput {
    fn write(&mut self, channel: Channel, volts: f32);

    /// Called after every channel has been written for a tick.
    fn end_tick(&mut self) {}
}

pub struct Scheduler {
    shared: Arc<SharedState>,
    table: ShapeTable,
    last: OutputFrame,
}

impl Scheduler {
    pub fn new(shared: Arc<SharedState>) -> Self {
        let last = OutputFrame { volts: std::array::from_fn(|i| match Channel::from_index(i) {
            Some(ch) => shared.written(ch),
            None => 0.0,
        }) };
        Self { shared, table: ShapeTable::new(), last }
    }

    /// Values written on the most recent tick.
    pub fn last_frame(&self) -> OutputFrame {
        self.last
    }

    /// Run one tick. Never blocks, allocates or logs.
    pub fn tick<O: HardwareOutput + ?Sized>(
        &mut self,
        output: &mut O,
        notices: &mut NoticeProducer,
    ) -> OutputFrame {
        let range = self.shared.range();
        for index in 0..NUM_CHANNELS {
            let Some(channel) = Channel::from_index(index) else { continue };
            let volts = match self.shared.try_lock(channel) {
                Some(mut core) => {
                    if let StepOutcome::Completed(generation) = core.slope.step(&self.table) {
                        self.shared.mark_completed(channel, generation);
                    }
                    range.clamp(core.scale.quantize(core.slope.current()))
                }
                None => {
                    self.shared.stats.skipped_channels.fetch_add(1, Ordering::Relaxed);
                    let _ = notices.try_push(RtNotice::ChannelSkipped(channel));
                    self.last.get(channel)
                }
            };
            output.write(channel, volts);
            self.last.set(channel, volts);
            self.shared.publish(channel, volts);
        }
        output.end_tick();
        self.shared.stats.ticks.fetch_add(1, Ordering::Relaxed);
        self.last
    }
}

impl HardwareOutput for OutputFrame {
    fn write(&mut self, channel: Channel, volts: f32) {
        self.set(channel, volts);
    }
}
