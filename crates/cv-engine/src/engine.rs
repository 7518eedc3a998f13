//! Wiring of the two executors.
//!
//! [`engine`] splits one set of shared state into a [`Host`] half for the
//! cooperative side and a [`Realtime`] half for the tick thread.

use std::sync::Arc;

use cv_ir::{Channel, OutputRange, TickRate};
use parking_lot::{Mutex, MutexGuard};

use crate::bridge::{EventBridge, InputSource, Runtime};
use crate::frame::OutputFrame;
use crate::interpreter::Interpreter;
use crate::notice::{drain_notices, notice_queue, NoticeConsumer, NoticeProducer};
use crate::scheduler::{HardwareOutput, Scheduler};
use crate::shared::SharedState;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngineConfig {
    pub tick_rate: TickRate,
    pub range: OutputRange,
    /// Capacity of the real-time notice ring.
    pub notice_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { tick_rate: TickRate::default(), range: OutputRange::default(), notice_capacity: 256 }
    }
}

pub fn engine(config: EngineConfig) -> (Host, Realtime) {
    let shared = Arc::new(SharedState::new(config.range));
    let interpreter = Interpreter::new(shared.clone(), config.tick_rate);
    let runtime = Arc::new(Mutex::new(Runtime::new(interpreter)));
    let (producer, consumer) = notice_queue(config.notice_capacity.max(1));

    let host = Host { runtime: runtime.clone(), shared: shared.clone(), notices: consumer };
    let realtime = Realtime {
        scheduler: Scheduler::new(shared.clone()),
        bridge: EventBridge::new(runtime, shared),
        notices: producer,
        inputs: Vec::new(),
    };
    (host, realtime)
}

/// Cooperative half: owns the execution lock.
pub struct Host {
    runtime: Arc<Mutex<Runtime>>,
    shared: Arc<SharedState>,
    notices: NoticeConsumer,
}

impl Host {
    /// Take the execution lock. While held, input events from the tick
    /// thread are dropped.
    pub fn lock(&self) -> MutexGuard<'_, Runtime> {
        self.runtime.lock()
    }

    pub fn shared(&self) -> &Arc<SharedState> {
        &self.shared
    }

    /// Resume sequences whose segments completed and log real-time notices.
    /// Returns the number of channels advanced.
    pub fn service(&mut self) -> usize {
        let advanced = self.runtime.lock().advance_completed();
        drain_notices(&mut self.notices);
        advanced
    }

    /// Last value written to hardware. Never takes a lock.
    pub fn output_voltage(&self, channel: Channel) -> f32 {
        self.shared.written(channel)
    }
}

/// Real-time half: everything the tick thread touches.
pub struct Realtime {
    scheduler: Scheduler,
    bridge: EventBridge,
    notices: NoticeProducer,
    inputs: Vec<Box<dyn InputSource>>,
}

impl Realtime {
    /// Register an input polled at the start of every tick. Call before the
    /// tick thread starts.
    pub fn add_input(&mut self, source: Box<dyn InputSource>) {
        self.inputs.push(source);
    }

    pub fn last_frame(&self) -> OutputFrame {
        self.scheduler.last_frame()
    }

    /// Poll inputs, deliver their events, then write one sample per channel.
    pub fn tick<O: HardwareOutput + ?Sized>(&mut self, output: &mut O) -> OutputFrame {
        #[cfg(feature = "alloc_check")]
        {
            assert_no_alloc::assert_no_alloc(|| self.tick_inner(output))
        }
        #[cfg(not(feature = "alloc_check"))]
        {
            self.tick_inner(output)
        }
    }

    fn tick_inner<O: HardwareOutput + ?Sized>(&mut self, output: &mut O) -> OutputFrame {
        for input in &mut self.inputs {
            if let Some(event) = input.poll() {
                self.bridge.deliver(event, &mut self.notices);
            }
        }
        self.scheduler.tick(output, &mut self.notices)
    }
}
