//! Sequence interpreter.
//!
//! Walks each channel's compiled [`Sequence`] and feeds ramp segments into
//! the shared slope state. Walking stops at the first segment that takes
//! time; the scheduler reports its completion through
//! [`SharedState::completed`] and [`Interpreter::advance_completed`] picks up
//! where the walk left off.

use std::sync::Arc;

use arrayvec::ArrayVec;
use cv_ir::{
    BlockId, BlockKind, Channel, ConfigError, Dynamics, NodeDesc, Op, OutputRange, ScaleConfig,
    Sequence, Shape, TickRate, MAX_DEPTH, NUM_CHANNELS,
};
use heapless::Deque;
use parking_lot::MutexGuard;

use crate::error::EngineError;
use crate::shared::{ChannelCore, SharedState};
use crate::slope::SlopeState;

/// Pending sequence notifications kept for the host.
pub const EVENT_CAPACITY: usize = 16;

/// Operations a single walk may run without reaching a timed segment before
/// it yields for one tick.
pub const ZERO_TIME_BUDGET: usize = 64;

/// Trigger entry points.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// Advance a held sequence past its hold point.
    Release = 0,
    /// Cancel whatever is in flight and start from the top.
    Restart = 1,
    /// Leave a `lock` block's trigger guard.
    Unlock = 2,
}

impl TryFrom<u8> for Action {
    type Error = EngineError;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        match index {
            0 => Ok(Action::Release),
            1 => Ok(Action::Restart),
            2 => Ok(Action::Unlock),
            other => Err(EngineError::UnknownAction(other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SequenceEvent {
    /// The sequence ran off the end of its root block.
    Done(Channel),
}

/// Which executor is driving the interpreter.
///
/// Under `Realtime` every channel lock is try-acquired and a busy lock
/// surfaces as [`EngineError::Contention`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecContext {
    Cooperative,
    Realtime,
}

#[derive(Clone, Copy, Debug)]
struct Frame {
    block: BlockId,
    pc: usize,
    remaining: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Advance {
    /// A timed segment is in flight.
    Waiting,
    /// Parked at the end of a held block.
    Suspended,
    /// Ran off the end of the root block.
    Done,
}

struct Program {
    sequence: Sequence,
    dynamics: Dynamics,
    cursor: ArrayVec<Frame, MAX_DEPTH>,
    holding: bool,
    locked: bool,
    awaiting: Option<u32>,
}

impl Program {
    fn new(sequence: Sequence) -> Self {
        let dynamics = sequence.dynamics().clone();
        Self {
            sequence,
            dynamics,
            cursor: ArrayVec::new(),
            holding: false,
            locked: false,
            awaiting: None,
        }
    }

    fn restart(&mut self) {
        self.cursor.clear();
        self.cursor.push(Frame { block: self.sequence.root(), pc: 0, remaining: 0 });
        self.holding = false;
        self.locked = false;
        self.awaiting = None;
    }

    /// Unwind through the innermost held block. Returns `false` when nothing
    /// is holding.
    fn release(&mut self) -> bool {
        if !self.holding {
            return false;
        }
        self.holding = false;
        let sequence = &self.sequence;
        let held = self.cursor.iter().rposition(|frame| {
            sequence.block(frame.block).is_some_and(|b| b.kind == BlockKind::Held)
        });
        if let Some(pos) = held {
            self.cursor.truncate(pos);
        }
        true
    }

    fn advance(
        &mut self,
        slope: &mut SlopeState,
        rate: TickRate,
        range: OutputRange,
    ) -> Result<Advance, EngineError> {
        self.awaiting = None;
        let mut budget = ZERO_TIME_BUDGET;
        loop {
            let Some(frame) = self.cursor.last_mut() else {
                return Ok(Advance::Done);
            };
            let block = self
                .sequence
                .block(frame.block)
                .ok_or(EngineError::Corrupt("frame points outside its sequence"))?;

            if let Some(op) = block.ops.get(frame.pc) {
                frame.pc += 1;
                match op {
                    Op::To(step) => {
                        let volts = range.clamp(step.volts.eval(&mut self.dynamics));
                        let ticks = rate.seconds_to_ticks(step.time.eval(&mut self.dynamics));
                        let generation = slope.toward(volts, ticks, step.shape);
                        if ticks > 0 {
                            self.awaiting = Some(generation);
                            return Ok(Advance::Waiting);
                        }
                    }
                    Op::Enter(id) => {
                        let child = self
                            .sequence
                            .block(*id)
                            .ok_or(EngineError::Corrupt("block reference out of range"))?;
                        let remaining = match &child.kind {
                            BlockKind::If(cond) if cond.eval(&mut self.dynamics) <= 0.0 => None,
                            BlockKind::Times(count) => Some(*count),
                            BlockKind::Held => {
                                self.holding = true;
                                Some(0)
                            }
                            BlockKind::Locked => {
                                self.locked = true;
                                Some(0)
                            }
                            _ => Some(0),
                        };
                        if let Some(remaining) = remaining {
                            self.cursor
                                .try_push(Frame { block: *id, pc: 0, remaining })
                                .map_err(|_| EngineError::Corrupt("nesting exceeds cursor depth"))?;
                        }
                    }
                }
            } else {
                match block.kind {
                    BlockKind::Loop => frame.pc = 0,
                    BlockKind::Times(_) => {
                        frame.remaining = frame.remaining.saturating_sub(1);
                        if frame.remaining > 0 {
                            frame.pc = 0;
                        } else {
                            self.cursor.pop();
                        }
                    }
                    BlockKind::Held if self.holding => return Ok(Advance::Suspended),
                    BlockKind::Locked => {
                        self.locked = false;
                        self.cursor.pop();
                    }
                    _ => {
                        self.cursor.pop();
                    }
                }
            }

            budget -= 1;
            if budget == 0 {
                self.awaiting = Some(slope.toward(slope.target(), 1, Shape::Linear));
                return Ok(Advance::Waiting);
            }
        }
    }
}

struct Slot {
    program: Option<Program>,
    slew: f32,
    slew_shape: Shape,
}

impl Default for Slot {
    fn default() -> Self {
        Self { program: None, slew: 0.0, slew_shape: Shape::Linear }
    }
}

fn channel_core(
    shared: &SharedState,
    context: ExecContext,
    channel: Channel,
) -> Result<MutexGuard<'_, ChannelCore>, EngineError> {
    match context {
        ExecContext::Cooperative => Ok(shared.lock(channel)),
        ExecContext::Realtime => shared.try_lock(channel).ok_or(EngineError::Contention),
    }
}

/// Per-channel sequence execution.
pub struct Interpreter {
    shared: Arc<SharedState>,
    rate: TickRate,
    slots: [Slot; NUM_CHANNELS],
    events: Deque<SequenceEvent, EVENT_CAPACITY>,
    context: ExecContext,
}

impl Interpreter {
    pub fn new(shared: Arc<SharedState>, rate: TickRate) -> Self {
        Self {
            shared,
            rate,
            slots: std::array::from_fn(|_| Slot::default()),
            events: Deque::new(),
            context: ExecContext::Cooperative,
        }
    }

    pub fn shared(&self) -> &Arc<SharedState> {
        &self.shared
    }

    pub fn tick_rate(&self) -> TickRate {
        self.rate
    }

    pub fn context(&self) -> ExecContext {
        self.context
    }

    pub(crate) fn set_context(&mut self, context: ExecContext) {
        self.context = context;
    }

    // --- Sequences ---

    /// Replace the channel's sequence. The new sequence does not run until
    /// triggered; a segment already in flight finishes on its own.
    pub fn install(&mut self, channel: Channel, sequence: Sequence) {
        tracing::debug!(%channel, steps = sequence.step_count(), "sequence installed");
        self.slots[channel.index()].program = Some(Program::new(sequence));
    }

    /// Compile and install a description. A rejected description leaves the
    /// current sequence in place.
    pub fn install_desc(
        &mut self,
        channel: Channel,
        nodes: &[NodeDesc],
    ) -> Result<(), EngineError> {
        match Sequence::compile(nodes) {
            Ok(sequence) => {
                self.install(channel, sequence);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(%channel, error = %err, "sequence rejected");
                Err(err.into())
            }
        }
    }

    /// Drop the sequence and hold the current voltage.
    pub fn clear(&mut self, channel: Channel) -> Result<(), EngineError> {
        channel_core(&self.shared, self.context, channel)?.slope.hold();
        self.slots[channel.index()].program = None;
        Ok(())
    }

    pub fn action(&mut self, channel: Channel, index: u8) -> Result<(), EngineError> {
        self.trigger(channel, Action::try_from(index)?)
    }

    pub fn trigger(&mut self, channel: Channel, action: Action) -> Result<(), EngineError> {
        let program = self.slots[channel.index()]
            .program
            .as_mut()
            .ok_or(EngineError::NoSequence(channel))?;
        match action {
            Action::Unlock => {
                program.locked = false;
                return Ok(());
            }
            _ if program.locked => return Ok(()),
            Action::Release if !program.holding => return Ok(()),
            _ => {}
        }

        let mut core = channel_core(&self.shared, self.context, channel)?;
        if action == Action::Restart {
            program.restart();
        } else {
            program.release();
        }
        core.slope.hold();
        let outcome = program.advance(&mut core.slope, self.rate, self.shared.range());
        drop(core);
        self.finish(channel, outcome?);
        Ok(())
    }

    /// Resume every channel whose awaited segment has completed. Returns how
    /// many channels advanced.
    pub fn advance_completed(&mut self) -> usize {
        let mut advanced = 0;
        for channel in Channel::all() {
            let slot = &mut self.slots[channel.index()];
            let Some(program) = slot.program.as_mut() else { continue };
            let Some(generation) = program.awaiting else { continue };
            if self.shared.completed(channel) != generation {
                continue;
            }
            let Ok(mut core) = channel_core(&self.shared, self.context, channel) else { continue };
            let outcome = program.advance(&mut core.slope, self.rate, self.shared.range());
            drop(core);
            advanced += 1;
            match outcome {
                Ok(outcome) => self.finish(channel, outcome),
                Err(err) => {
                    tracing::error!(%channel, error = %err, "sequence aborted");
                    self.slots[channel.index()].program = None;
                }
            }
        }
        advanced
    }

    fn finish(&mut self, channel: Channel, outcome: Advance) {
        if outcome == Advance::Done {
            if self.events.is_full() {
                self.events.pop_front();
            }
            let _ = self.events.push_back(SequenceEvent::Done(channel));
        }
    }

    pub fn poll_event(&mut self) -> Option<SequenceEvent> {
        self.events.pop_front()
    }

    pub fn has_sequence(&self, channel: Channel) -> bool {
        self.slots[channel.index()].program.is_some()
    }

    /// Whether the sequence is mid-walk (not finished and not never-started).
    pub fn is_running(&self, channel: Channel) -> bool {
        self.slots[channel.index()].program.as_ref().is_some_and(|p| !p.cursor.is_empty())
    }

    pub fn is_holding(&self, channel: Channel) -> bool {
        self.slots[channel.index()].program.as_ref().is_some_and(|p| p.holding)
    }

    pub fn is_locked(&self, channel: Channel) -> bool {
        self.slots[channel.index()].program.as_ref().is_some_and(|p| p.locked)
    }

    // --- Direct voltage ---

    pub fn set_slew(
        &mut self,
        channel: Channel,
        seconds: f32,
        shape: Shape,
    ) -> Result<(), EngineError> {
        if !seconds.is_finite() {
            return Err(ConfigError::NonFiniteValue.into());
        }
        if seconds < 0.0 {
            return Err(ConfigError::NegativeDuration(seconds).into());
        }
        let slot = &mut self.slots[channel.index()];
        slot.slew = seconds;
        slot.slew_shape = shape;
        Ok(())
    }

    pub fn slew(&self, channel: Channel) -> (f32, Shape) {
        let slot = &self.slots[channel.index()];
        (slot.slew, slot.slew_shape)
    }

    /// Move to `volts` over the channel's slew time, replacing its sequence.
    pub fn set_volts(&mut self, channel: Channel, volts: f32) -> Result<(), EngineError> {
        let (slew, shape) = self.slew(channel);
        let sequence = Sequence::single(volts, slew, shape)?;
        self.install(channel, sequence);
        self.trigger(channel, Action::Restart)
    }

    /// Slope voltage before quantization.
    pub fn voltage(&self, channel: Channel) -> Result<f32, EngineError> {
        Ok(channel_core(&self.shared, self.context, channel)?.slope.current())
    }

    /// Last value written to hardware. Lock-free.
    pub fn output_voltage(&self, channel: Channel) -> f32 {
        self.shared.written(channel)
    }

    // --- Scales ---

    pub fn set_scale(&mut self, channel: Channel, scale: ScaleConfig) -> Result<(), EngineError> {
        tracing::debug!(
            %channel,
            active = scale.is_active(),
            degrees = scale.degrees().len(),
            "scale changed"
        );
        channel_core(&self.shared, self.context, channel)?.scale = scale;
        Ok(())
    }

    pub fn enable_chromatic(&mut self, channel: Channel) -> Result<(), EngineError> {
        self.set_scale(channel, ScaleConfig::chromatic())
    }

    pub fn enable_scale(
        &mut self,
        channel: Channel,
        degrees: &[f32],
        modulo: Option<f32>,
        scaling: Option<f32>,
    ) -> Result<(), EngineError> {
        let scale = ScaleConfig::custom(degrees, modulo, scaling).inspect_err(|err| {
            tracing::warn!(%channel, error = %err, "scale rejected");
        })?;
        self.set_scale(channel, scale)
    }

    pub fn disable_scale(&mut self, channel: Channel) -> Result<(), EngineError> {
        self.set_scale(channel, ScaleConfig::disabled())
    }

    pub fn scale(&self, channel: Channel) -> Result<ScaleConfig, EngineError> {
        Ok(channel_core(&self.shared, self.context, channel)?.scale.clone())
    }

    // --- Dynamics ---

    pub fn get_dynamic(&self, channel: Channel, name: &str) -> Result<f32, EngineError> {
        let program = self.slots[channel.index()]
            .program
            .as_ref()
            .ok_or(EngineError::NoSequence(channel))?;
        program
            .dynamics
            .value_of(name)
            .ok_or_else(|| EngineError::UnknownDynamic(name.to_string()))
    }

    pub fn set_dynamic(
        &mut self,
        channel: Channel,
        name: &str,
        value: f32,
    ) -> Result<(), EngineError> {
        if !value.is_finite() {
            return Err(ConfigError::NonFiniteValue.into());
        }
        let program = self.slots[channel.index()]
            .program
            .as_mut()
            .ok_or(EngineError::NoSequence(channel))?;
        if program.dynamics.set_named(name, value) {
            Ok(())
        } else {
            Err(EngineError::UnknownDynamic(name.to_string()))
        }
    }
}
