//! State shared between the interpreter and the real-time scheduler.
//!
//! Each channel's slope and scale sit behind their own short-held mutex. The
//! interpreter may block on it; the scheduler only ever `try_lock`s. Segment
//! completions and the last written voltage travel back through atomics so
//! neither side needs the other's lock to observe them.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use cv_ir::{Channel, OutputRange, ScaleConfig, NUM_CHANNELS};
use parking_lot::{Mutex, MutexGuard};

use crate::slope::SlopeState;

/// Everything the scheduler touches for one channel inside its critical
/// section.
#[derive(Clone, Debug, Default)]
pub struct ChannelCore {
    pub slope: SlopeState,
    pub scale: ScaleConfig,
}

/// Counters bumped by the real-time path.
#[derive(Debug, Default)]
pub struct RtStats {
    pub ticks: AtomicU64,
    pub skipped_channels: AtomicU64,
    pub dropped_events: AtomicU64,
}

pub struct SharedState {
    channels: [Mutex<ChannelCore>; NUM_CHANNELS],
    /// Generation of the most recently completed segment, per channel.
    completed: [AtomicU32; NUM_CHANNELS],
    /// Bits of the last voltage written to hardware, per channel.
    written: [AtomicU32; NUM_CHANNELS],
    range: OutputRange,
    pub stats: RtStats,
}

impl SharedState {
    pub fn new(range: OutputRange) -> Self {
        let initial = range.clamp(0.0);
        Self {
            channels: std::array::from_fn(|_| {
                Mutex::new(ChannelCore {
                    slope: SlopeState::new(initial),
                    scale: ScaleConfig::disabled(),
                })
            }),
            completed: std::array::from_fn(|_| AtomicU32::new(0)),
            written: std::array::from_fn(|_| AtomicU32::new(initial.to_bits())),
            range,
            stats: RtStats::default(),
        }
    }

    pub fn range(&self) -> OutputRange {
        self.range
    }

    /// Blocking acquire. Not for the real-time path.
    pub fn lock(&self, channel: Channel) -> MutexGuard<'_, ChannelCore> {
        self.channels[channel.index()].lock()
    }

    pub fn try_lock(&self, channel: Channel) -> Option<MutexGuard<'_, ChannelCore>> {
        self.channels[channel.index()].try_lock()
    }

    pub fn mark_completed(&self, channel: Channel, generation: u32) {
        self.completed[channel.index()].store(generation, Ordering::Release);
    }

    pub fn completed(&self, channel: Channel) -> u32 {
        self.completed[channel.index()].load(Ordering::Acquire)
    }

    pub fn publish(&self, channel: Channel, volts: f32) {
        self.written[channel.index()].store(volts.to_bits(), Ordering::Release);
    }

    /// Last voltage written to hardware for `channel`.
    pub fn written(&self, channel: Channel) -> f32 {
        f32::from_bits(self.written[channel.index()].load(Ordering::Acquire))
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new(OutputRange::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_lock_fails_while_held() {
        let shared = SharedState::default();
        let ch = Channel::from_index(1).unwrap();
        let guard = shared.lock(ch);
        assert!(shared.try_lock(ch).is_none());
        assert!(shared.try_lock(Channel::from_index(0).unwrap()).is_some());
        drop(guard);
        assert!(shared.try_lock(ch).is_some());
    }

    #[test]
    fn written_round_trips_through_atomic() {
        let shared = SharedState::default();
        let ch = Channel::from_index(2).unwrap();
        assert_eq!(shared.written(ch), 0.0);
        shared.publish(ch, -3.75);
        assert_eq!(shared.written(ch), -3.75);
    }

    #[test]
    fn starts_inside_range() {
        let shared = SharedState::new(OutputRange::new(1.0, 5.0).unwrap());
        let ch = Channel::from_index(0).unwrap();
        assert_eq!(shared.lock(ch).slope.current(), 1.0);
        assert_eq!(shared.written(ch), 1.0);
    }
}
