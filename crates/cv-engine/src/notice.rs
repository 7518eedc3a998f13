//! Real-time diagnostics.
//!
//! The tick thread never logs. It pushes [`RtNotice`]s into a preallocated
//! SPSC ring and the host drains them into `tracing`.

use cv_ir::Channel;
use ringbuf::traits::{Consumer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::error::EngineError;

pub type NoticeProducer = HeapProd<RtNotice>;
pub type NoticeConsumer = HeapCons<RtNotice>;

#[derive(Clone, Debug, PartialEq)]
pub enum RtNotice {
    /// The interpreter was busy; an input event was dropped.
    EventDropped { input: u8 },
    /// A channel's lock was busy; its previous value was re-written.
    ChannelSkipped(Channel),
    /// An input handler returned an error.
    HandlerFailed { input: u8, error: EngineError },
}

pub fn notice_queue(capacity: usize) -> (NoticeProducer, NoticeConsumer) {
    HeapRb::<RtNotice>::new(capacity).split()
}

/// Drain pending notices into the log. Returns how many were drained.
pub fn drain_notices(consumer: &mut NoticeConsumer) -> usize {
    let mut drained = 0;
    while let Some(notice) = consumer.try_pop() {
        drained += 1;
        match notice {
            RtNotice::EventDropped { input } => {
                tracing::debug!(input, "input event dropped, interpreter busy")
            }
            RtNotice::ChannelSkipped(channel) => {
                tracing::debug!(%channel, "tick skipped, channel state busy")
            }
            RtNotice::HandlerFailed { input, error } => {
                tracing::warn!(input, %error, "input handler failed")
            }
        }
    }
    drained
}
