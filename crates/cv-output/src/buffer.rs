//! In-memory backends for offline rendering and for handing frames to
//! another thread.

use cv_engine::{HardwareOutput, OutputFrame};
use cv_ir::{Channel, NUM_CHANNELS};
use ringbuf::traits::{Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::traits::CvOutput;

/// Records every sample into preallocated per-channel buffers.
///
/// Writes past capacity are counted and discarded rather than reallocating.
pub struct BufferOutput {
    channels: [Vec<f32>; NUM_CHANNELS],
    capacity: usize,
    overflow: u64,
}

impl BufferOutput {
    pub fn with_capacity(ticks: usize) -> Self {
        Self {
            channels: std::array::from_fn(|_| Vec::with_capacity(ticks)),
            capacity: ticks,
            overflow: 0,
        }
    }

    pub fn channel(&self, channel: Channel) -> &[f32] {
        &self.channels[channel.index()]
    }

    /// Number of complete ticks recorded.
    pub fn len(&self) -> usize {
        self.channels.iter().map(Vec::len).min().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn frame(&self, tick: usize) -> Option<OutputFrame> {
        if tick >= self.len() {
            return None;
        }
        Some(OutputFrame { volts: std::array::from_fn(|i| self.channels[i][tick]) })
    }

    pub fn frames(&self) -> impl Iterator<Item = OutputFrame> + '_ {
        (0..self.len()).filter_map(|tick| self.frame(tick))
    }

    /// Samples discarded because the buffers were full.
    pub fn overflow(&self) -> u64 {
        self.overflow
    }

    pub fn clear(&mut self) {
        for samples in &mut self.channels {
            samples.clear();
        }
        self.overflow = 0;
    }
}

impl HardwareOutput for BufferOutput {
    fn write(&mut self, channel: Channel, volts: f32) {
        let samples = &mut self.channels[channel.index()];
        if samples.len() < self.capacity {
            samples.push(volts);
        } else {
            self.overflow += 1;
        }
    }
}

impl CvOutput for BufferOutput {}

/// Pushes one [`OutputFrame`] per tick into a lock-free ring.
pub struct RingOutput {
    producer: HeapProd<OutputFrame>,
    pending: OutputFrame,
    dropped: u64,
}

impl RingOutput {
    /// Create the output and the consumer end of its ring.
    pub fn new(capacity: usize) -> (Self, HeapCons<OutputFrame>) {
        let (producer, consumer) = HeapRb::<OutputFrame>::new(capacity.max(1)).split();
        (Self { producer, pending: OutputFrame::zero(), dropped: 0 }, consumer)
    }

    /// Frames discarded because the consumer fell behind.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl HardwareOutput for RingOutput {
    fn write(&mut self, channel: Channel, volts: f32) {
        self.pending.set(channel, volts);
    }

    fn end_tick(&mut self) {
        // Non-blocking push; drop the frame if the ring is full
        if self.producer.try_push(self.pending).is_err() {
            self.dropped += 1;
        }
    }
}

impl CvOutput for RingOutput {}

#[cfg(test)]
mod tests {
    use super::*;
    use ringbuf::traits::Consumer;

    fn ch(i: usize) -> Channel {
        Channel::from_index(i).unwrap()
    }

    fn write_frame(out: &mut impl HardwareOutput, base: f32) {
        for i in 0..NUM_CHANNELS {
            out.write(ch(i), base + i as f32);
        }
        out.end_tick();
    }

    #[test]
    fn buffer_records_per_channel() {
        let mut out = BufferOutput::with_capacity(4);
        write_frame(&mut out, 0.0);
        write_frame(&mut out, 10.0);
        assert_eq!(out.len(), 2);
        assert_eq!(out.channel(ch(2)), &[2.0, 12.0]);
        assert_eq!(out.frame(1).unwrap().volts, [10.0, 11.0, 12.0, 13.0]);
        assert_eq!(out.frames().count(), 2);
    }

    #[test]
    fn buffer_overflow_is_counted_not_grown() {
        let mut out = BufferOutput::with_capacity(1);
        write_frame(&mut out, 0.0);
        write_frame(&mut out, 1.0);
        assert_eq!(out.len(), 1);
        assert_eq!(out.overflow(), NUM_CHANNELS as u64);
        out.clear();
        assert!(out.is_empty());
    }

    #[test]
    fn ring_pushes_one_frame_per_tick() {
        let (mut out, mut rx) = RingOutput::new(2);
        write_frame(&mut out, 0.0);
        write_frame(&mut out, 1.0);
        write_frame(&mut out, 2.0);
        assert_eq!(out.dropped(), 1);
        assert_eq!(rx.try_pop().unwrap().volts[0], 0.0);
        assert_eq!(rx.try_pop().unwrap().volts[3], 4.0);
        assert!(rx.try_pop().is_none());
    }
}
