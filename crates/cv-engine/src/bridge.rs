//! Hand-off of input events from the real-time thread to interpreter-owned
//! handlers.
//!
//! The interpreter and its handlers live in a [`Runtime`] behind one
//! execution lock. The host holds that lock while it works; the real-time
//! side only ever try-acquires it and drops the event when it is busy.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use ringbuf::traits::Producer;

use crate::error::EngineError;
use crate::interpreter::{ExecContext, Interpreter};
use crate::notice::{NoticeProducer, RtNotice};
use crate::shared::SharedState;

/// Number of trigger inputs.
pub const NUM_INPUTS: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InputKind {
    Rising,
    Falling,
    /// Level reading in volts.
    Level(f32),
}

/// A detected input change. Detection itself happens upstream.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InputEvent {
    pub input: u8,
    pub kind: InputKind,
}

impl InputEvent {
    pub fn rising(input: u8) -> Self {
        Self { input, kind: InputKind::Rising }
    }

    pub fn falling(input: u8) -> Self {
        Self { input, kind: InputKind::Falling }
    }
}

/// Polled exactly once per tick on the real-time thread. Must not block.
pub trait InputSource: Send {
    fn poll(&mut self) -> Option<InputEvent>;
}

/// Interpreter-owned callback for one input. Runs on the real-time thread
/// with the interpreter in [`ExecContext::Realtime`], so it must not block.
pub type InputHandler =
    Box<dyn FnMut(&mut Interpreter, InputEvent) -> Result<(), EngineError> + Send>;

/// Interpreter plus its input handlers, guarded as one unit.
pub struct Runtime {
    interpreter: Interpreter,
    handlers: [Option<InputHandler>; NUM_INPUTS],
}

impl Runtime {
    pub fn new(interpreter: Interpreter) -> Self {
        Self { interpreter, handlers: std::array::from_fn(|_| None) }
    }

    pub fn set_handler(&mut self, input: u8, handler: InputHandler) -> Result<(), EngineError> {
        let slot = self.handlers.get_mut(input as usize).ok_or(EngineError::InvalidInput(input))?;
        tracing::debug!(input, "input handler installed");
        *slot = Some(handler);
        Ok(())
    }

    pub fn clear_handler(&mut self, input: u8) -> Result<(), EngineError> {
        let slot = self.handlers.get_mut(input as usize).ok_or(EngineError::InvalidInput(input))?;
        *slot = None;
        Ok(())
    }

    /// Run the handler for `event`. Returns `Ok(false)` when the input has no
    /// handler.
    pub fn dispatch(&mut self, event: InputEvent) -> Result<bool, EngineError> {
        let Some(handler) = self
            .handlers
            .get_mut(event.input as usize)
            .ok_or(EngineError::InvalidInput(event.input))?
        else {
            return Ok(false);
        };
        let previous = self.interpreter.context();
        self.interpreter.set_context(ExecContext::Realtime);
        let result = handler(&mut self.interpreter, event);
        self.interpreter.set_context(previous);
        result.map(|()| true)
    }
}

impl Deref for Runtime {
    type Target = Interpreter;

    fn deref(&self) -> &Interpreter {
        &self.interpreter
    }
}

impl DerefMut for Runtime {
    fn deref_mut(&mut self) -> &mut Interpreter {
        &mut self.interpreter
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The execution lock was busy; the event is gone.
    Dropped,
    /// No handler for this input.
    Unhandled,
    /// The handler ran and failed.
    Failed,
}

/// Real-time end of the hand-off.
pub struct EventBridge {
    runtime: Arc<Mutex<Runtime>>,
    shared: Arc<SharedState>,
}

impl EventBridge {
    pub fn new(runtime: Arc<Mutex<Runtime>>, shared: Arc<SharedState>) -> Self {
        Self { runtime, shared }
    }

    /// Never blocks: a busy execution lock drops the event.
    pub fn deliver(&self, event: InputEvent, notices: &mut NoticeProducer) -> Delivery {
        let Some(mut runtime) = self.runtime.try_lock() else {
            self.shared.stats.dropped_events.fetch_add(1, Ordering::Relaxed);
            let _ = notices.try_push(RtNotice::EventDropped { input: event.input });
            return Delivery::Dropped;
        };
        match runtime.dispatch(event) {
            Ok(true) => Delivery::Delivered,
            Ok(false) => Delivery::Unhandled,
            Err(error) => {
                let _ = notices.try_push(RtNotice::HandlerFailed { input: event.input, error });
                Delivery::Failed
            }
        }
    }
}
