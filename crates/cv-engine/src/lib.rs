//! Real-time engine for cvcore.
//!
//! Runs action sequences per output channel, ramps the slope state, and
//! writes quantized samples to hardware from a fixed-period tick that never
//! blocks on the interpreter.

mod bridge;
mod engine;
mod error;
mod frame;
mod interpreter;
mod notice;
mod scheduler;
mod shared;
mod slope;

pub use bridge::{
    Delivery, EventBridge, InputEvent, InputHandler, InputKind, InputSource, Runtime, NUM_INPUTS,
};
pub use engine::{engine, EngineConfig, Host, Realtime};
pub use error::EngineError;
pub use frame::OutputFrame;
pub use interpreter::{
    Action, ExecContext, Interpreter, SequenceEvent, EVENT_CAPACITY, ZERO_TIME_BUDGET,
};
pub use notice::{drain_notices, notice_queue, NoticeConsumer, NoticeProducer, RtNotice};
pub use scheduler::{HardwareOutput, Scheduler};
pub use shared::{ChannelCore, RtStats, SharedState};
pub use slope::{SlopePhase, SlopeState, StepOutcome};

/// Channel from its 1-based panel number.
pub fn channel(number: u8) -> Result<cv_ir::Channel, EngineError> {
    cv_ir::Channel::from_number(number).ok_or(EngineError::InvalidChannel(number))
}
