//! Headless controller for the cvcore engine.
//!
//! Applies a boot configuration, renders offline, and runs the tick thread
//! against a hardware backend. The CLI and the integration tests both drive
//! the engine through [`Controller`].

mod config;
mod csv;
mod error;
mod input;

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use cv_engine::{
    engine, Action, EngineConfig, HardwareOutput, Host, InputEvent, InputHandler, InputSource,
    Interpreter, OutputFrame, Realtime, Runtime, SequenceEvent,
};
use cv_ir::{Channel, NodeDesc, OutputRange, ScaleConfig, Shape, TickRate};
use cv_output::{BufferOutput, CvOutput, OutputError};
use parking_lot::MutexGuard;

pub use config::{
    BootConfig, ChannelConfig, EdgeConfig, InputConfig, RangeConfig, ScaleSetting, TriggerConfig,
};
pub use csv::{frames_to_csv, write_csv};
pub use error::ControllerError;
pub use input::ClockInput;

/// Counters from the real-time side.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    pub ticks: u64,
    pub skipped_channels: u64,
    pub dropped_events: u64,
    /// Ticks that started after their deadline.
    pub overruns: u64,
}

/// Owns both halves of the engine. While the tick thread runs, the
/// real-time half lives on that thread and comes back on [`Controller::stop`].
pub struct Controller {
    host: Host,
    realtime: Option<Realtime>,
    tick_rate: TickRate,
    range: OutputRange,
    thread: Option<TickThread>,
    overruns: Arc<AtomicU64>,
}

struct TickThread {
    stop_signal: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    handle: JoinHandle<(Realtime, Result<(), OutputError>)>,
}

impl Controller {
    /// Engine with default settings and nothing installed.
    pub fn new() -> Self {
        Self::with_engine(EngineConfig::default())
    }

    pub fn with_engine(config: EngineConfig) -> Self {
        let (host, realtime) = engine(config);
        Self {
            host,
            realtime: Some(realtime),
            tick_rate: config.tick_rate,
            range: config.range,
            thread: None,
            overruns: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Build an engine and apply every channel and input in `config`.
    pub fn from_config(config: &BootConfig) -> Result<Self, ControllerError> {
        config.validate()?;
        let mut controller = Self::with_engine(config.engine_config()?);
        for channel in &config.channels {
            controller.apply_channel(channel)?;
        }
        for input in &config.inputs {
            controller.apply_input(input)?;
        }
        tracing::info!(
            tick_hz = controller.tick_rate.hz(),
            channels = config.channels.len(),
            inputs = config.inputs.len(),
            "controller configured"
        );
        Ok(controller)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ControllerError> {
        Self::from_config(&BootConfig::load(path)?)
    }

    fn apply_channel(&mut self, config: &ChannelConfig) -> Result<(), ControllerError> {
        let channel = config.channel()?;
        let (slew, slew_shape) = config.slew()?;
        let mut runtime = self.host.lock();
        runtime.set_slew(channel, slew, slew_shape)?;
        if let Some(scale) = &config.scale {
            runtime.set_scale(channel, scale.resolve()?)?;
        }
        if let Some(volts) = config.volts {
            runtime.set_volts(channel, volts)?;
        }
        if let Some(sequence) = config.compile()? {
            runtime.install(channel, sequence);
            for (name, value) in &config.dynamics {
                runtime.set_dynamic(channel, name, *value)?;
            }
            if config.start {
                runtime.trigger(channel, Action::Restart)?;
            }
        }
        tracing::debug!(%channel, "channel configured");
        Ok(())
    }

    fn apply_input(&mut self, config: &InputConfig) -> Result<(), ControllerError> {
        let input = config.input()?;
        let triggers = config
            .triggers
            .iter()
            .map(TriggerConfig::resolve)
            .collect::<Result<Vec<_>, _>>()?;
        let edge = config.edge;
        let handler: InputHandler = Box::new(move |interp: &mut Interpreter, event: InputEvent| {
            if !edge.matches(event.kind) {
                return Ok(());
            }
            for &(channel, action) in &triggers {
                interp.trigger(channel, action)?;
            }
            Ok(())
        });
        self.host.lock().set_handler(input, handler)?;
        if let Some(period) = config.clock {
            self.add_input(Box::new(ClockInput::new(input, period, self.tick_rate)))?;
        }
        Ok(())
    }

    pub fn tick_rate(&self) -> TickRate {
        self.tick_rate
    }

    pub fn range(&self) -> OutputRange {
        self.range
    }

    /// Take the execution lock for direct access to the interpreter and its
    /// input handlers. Input events arriving meanwhile are dropped.
    pub fn runtime(&self) -> MutexGuard<'_, Runtime> {
        self.host.lock()
    }

    // --- Interpreter pass-throughs ---

    pub fn install(&self, channel: Channel, nodes: &[NodeDesc]) -> Result<(), ControllerError> {
        Ok(self.host.lock().install_desc(channel, nodes)?)
    }

    pub fn clear(&self, channel: Channel) -> Result<(), ControllerError> {
        Ok(self.host.lock().clear(channel)?)
    }

    pub fn trigger(&self, channel: Channel, action: Action) -> Result<(), ControllerError> {
        Ok(self.host.lock().trigger(channel, action)?)
    }

    pub fn action(&self, channel: Channel, index: u8) -> Result<(), ControllerError> {
        Ok(self.host.lock().action(channel, index)?)
    }

    pub fn set_volts(&self, channel: Channel, volts: f32) -> Result<(), ControllerError> {
        Ok(self.host.lock().set_volts(channel, volts)?)
    }

    pub fn set_slew(
        &self,
        channel: Channel,
        seconds: f32,
        shape: Shape,
    ) -> Result<(), ControllerError> {
        Ok(self.host.lock().set_slew(channel, seconds, shape)?)
    }

    pub fn set_scale(&self, channel: Channel, scale: ScaleConfig) -> Result<(), ControllerError> {
        Ok(self.host.lock().set_scale(channel, scale)?)
    }

    pub fn set_dynamic(
        &self,
        channel: Channel,
        name: &str,
        value: f32,
    ) -> Result<(), ControllerError> {
        Ok(self.host.lock().set_dynamic(channel, name, value)?)
    }

    pub fn get_dynamic(&self, channel: Channel, name: &str) -> Result<f32, ControllerError> {
        Ok(self.host.lock().get_dynamic(channel, name)?)
    }

    /// Unquantized slope voltage.
    pub fn voltage(&self, channel: Channel) -> Result<f32, ControllerError> {
        Ok(self.host.lock().voltage(channel)?)
    }

    /// Last value written to hardware. Lock-free.
    pub fn output_voltage(&self, channel: Channel) -> f32 {
        self.host.output_voltage(channel)
    }

    // --- Cooperative executor ---

    /// Advance sequences whose segments completed and log real-time notices.
    pub fn service(&mut self) -> usize {
        self.host.service()
    }

    /// Drain queued sequence events.
    pub fn poll_events(&self) -> Vec<SequenceEvent> {
        let mut runtime = self.host.lock();
        std::iter::from_fn(|| runtime.poll_event()).collect()
    }

    pub fn stats(&self) -> RunStats {
        let stats = &self.host.shared().stats;
        RunStats {
            ticks: stats.ticks.load(Ordering::Relaxed),
            skipped_channels: stats.skipped_channels.load(Ordering::Relaxed),
            dropped_events: stats.dropped_events.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
        }
    }

    // --- Offline rendering ---

    /// Register an input source on the real-time half.
    pub fn add_input(&mut self, source: Box<dyn InputSource>) -> Result<(), ControllerError> {
        self.realtime.as_mut().ok_or(ControllerError::Running)?.add_input(source);
        Ok(())
    }

    /// Run `ticks` ticks on the calling thread, servicing the cooperative
    /// side after each one.
    pub fn render<O: HardwareOutput + ?Sized>(
        &mut self,
        ticks: usize,
        output: &mut O,
    ) -> Result<OutputFrame, ControllerError> {
        let realtime = self.realtime.as_mut().ok_or(ControllerError::Running)?;
        let mut frame = realtime.last_frame();
        for _ in 0..ticks {
            frame = realtime.tick(output);
            self.host.service();
        }
        Ok(frame)
    }

    pub fn render_frames(&mut self, ticks: usize) -> Result<BufferOutput, ControllerError> {
        let mut buffer = BufferOutput::with_capacity(ticks);
        self.render(ticks, &mut buffer)?;
        Ok(buffer)
    }

    /// Render `seconds` of output as CSV.
    pub fn render_to_csv(&mut self, seconds: f32) -> Result<String, ControllerError> {
        let ticks = self.tick_rate.seconds_to_ticks(seconds) as usize;
        let buffer = self.render_frames(ticks)?;
        let frames: Vec<OutputFrame> = buffer.frames().collect();
        Ok(frames_to_csv(&frames, self.tick_rate))
    }

    // --- Real-time thread ---

    /// Move the real-time half onto its own thread and tick it at the
    /// configured rate. The backend is built by `factory` on that thread.
    pub fn start<F>(&mut self, factory: F) -> Result<(), ControllerError>
    where
        F: FnOnce() -> Result<Box<dyn CvOutput>, OutputError> + Send + 'static,
    {
        let mut realtime = self.realtime.take().ok_or(ControllerError::Running)?;
        let stop_signal = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let period = self.tick_rate.period();

        let stop = stop_signal.clone();
        let done = finished.clone();
        let overruns = self.overruns.clone();
        let handle = std::thread::spawn(move || {
            let result = tick_thread(&mut realtime, factory, period, &stop, &overruns);
            if let Err(err) = &result {
                tracing::error!(error = %err, "output backend failed");
            }
            done.store(true, Ordering::Release);
            (realtime, result)
        });

        self.thread = Some(TickThread { stop_signal, finished, handle });
        tracing::info!(tick_hz = self.tick_rate.hz(), "tick thread started");
        Ok(())
    }

    /// Stop the tick thread and take the real-time half back. Returns the
    /// backend's error, if it failed.
    pub fn stop(&mut self) -> Result<(), ControllerError> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        thread.stop_signal.store(true, Ordering::Relaxed);
        let (realtime, result) = thread.handle.join().map_err(|_| ControllerError::ThreadPanicked)?;
        self.realtime = Some(realtime);
        // Catch notices pushed during the last ticks.
        self.host.service();
        tracing::info!(stats = ?self.stats(), "tick thread stopped");
        Ok(result?)
    }

    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|t| !t.finished.load(Ordering::Acquire))
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            tracing::warn!(error = %err, "tick thread stopped with error");
        }
    }
}

/// Ticks against absolute deadlines so jitter does not accumulate. After a
/// long stall the schedule restarts from now rather than bursting.
fn tick_thread<F>(
    realtime: &mut Realtime,
    factory: F,
    period: Duration,
    stop: &AtomicBool,
    overruns: &AtomicU64,
) -> Result<(), OutputError>
where
    F: FnOnce() -> Result<Box<dyn CvOutput>, OutputError>,
{
    let mut output = factory()?;
    output.start()?;

    let mut deadline = Instant::now();
    while !stop.load(Ordering::Relaxed) {
        realtime.tick(output.as_mut());
        deadline += period;
        let now = Instant::now();
        if now < deadline {
            std::thread::sleep(deadline - now);
        } else {
            overruns.fetch_add(1, Ordering::Relaxed);
            if now - deadline > period * 8 {
                deadline = now;
            }
        }
    }

    output.stop()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_ir::library::*;

    fn ch(n: u8) -> Channel {
        Channel::from_number(n).unwrap()
    }

    fn controller_at(hz: u32) -> Controller {
        Controller::with_engine(EngineConfig {
            tick_rate: TickRate::new(hz).unwrap(),
            ..EngineConfig::default()
        })
    }

    #[test]
    fn render_services_between_ticks() {
        let mut controller = controller_at(1000);
        controller
            .install(ch(1), &[to(1.0, 0.002, Shape::Linear), to(-1.0, 0.002, Shape::Linear)])
            .unwrap();
        controller.trigger(ch(1), Action::Restart).unwrap();
        let buffer = controller.render_frames(4).unwrap();
        assert_eq!(buffer.channel(ch(1)), &[0.5, 1.0, 0.0, -1.0]);
        assert_eq!(controller.poll_events(), vec![SequenceEvent::Done(ch(1))]);
        assert_eq!(controller.stats().ticks, 4);
    }

    #[test]
    fn boot_config_starts_channels() {
        let config = BootConfig::from_toml_str(
            r#"
            tick_rate_hz = 1000
            [[channel]]
            index = 2
            sequence = [{ to = { volts = { var = "level", default = 1.0 }, time = 0.0 } }]
            dynamics = { level = 3.0 }
            start = true

            [[channel]]
            index = 4
            scale = "chromatic"
            volts = 0.45
            "#,
        )
        .unwrap();
        let mut controller = Controller::from_config(&config).unwrap();
        let frame = controller.render(1, &mut OutputFrame::zero()).unwrap();
        assert_eq!(frame.get(ch(2)), 3.0);
        assert!((frame.get(ch(4)) - 5.0 / 12.0).abs() < 1e-6);
        assert_eq!(controller.get_dynamic(ch(2), "level").unwrap(), 3.0);
    }

    #[test]
    fn clock_input_retriggers_channel() {
        let config = BootConfig::from_toml_str(
            r#"
            tick_rate_hz = 1000
            [[channel]]
            index = 1
            sequence = [
                { to = { volts = 2.0, time = 0.001 } },
                { to = { volts = 0.0, time = 0.001 } },
            ]

            [[input]]
            index = 1
            clock = 0.004
            triggers = [{ channel = 1, action = 1 }]
            "#,
        )
        .unwrap();
        let mut controller = Controller::from_config(&config).unwrap();
        let buffer = controller.render_frames(6).unwrap();
        assert_eq!(buffer.channel(ch(1))[0], 2.0);
        assert_eq!(buffer.channel(ch(1))[4], 2.0);
        assert_eq!(buffer.channel(ch(1))[3], 0.0);
    }

    #[test]
    fn falling_edge_filter_ignores_rising() {
        let config = BootConfig::from_toml_str(
            r#"
            tick_rate_hz = 1000
            [[channel]]
            index = 1
            sequence = [{ to = { volts = 1.0, time = 0.0 } }]

            [[input]]
            index = 2
            clock = 0.004
            edge = "falling"
            triggers = [{ channel = 1, action = 1 }]
            "#,
        )
        .unwrap();
        let mut controller = Controller::from_config(&config).unwrap();
        let buffer = controller.render_frames(4).unwrap();
        assert_eq!(buffer.channel(ch(1)), &[0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn render_to_csv_has_one_row_per_tick() {
        let mut controller = controller_at(100);
        let csv = controller.render_to_csv(0.05).unwrap();
        assert_eq!(csv.lines().count(), 6);
    }

    #[test]
    fn render_is_refused_while_running() {
        let mut controller = controller_at(1000);
        controller
            .start(|| Ok(Box::new(BufferOutput::with_capacity(16)) as Box<dyn CvOutput>))
            .unwrap();
        assert!(matches!(
            controller.render_frames(1),
            Err(ControllerError::Running)
        ));
        assert!(matches!(
            controller.start(|| Err(OutputError::NoDevice)),
            Err(ControllerError::Running)
        ));
        controller.stop().unwrap();
        assert!(!controller.is_running());
        assert!(controller.render_frames(1).is_ok());
    }

    #[test]
    fn backend_failure_is_reported_on_stop() {
        let mut controller = controller_at(1000);
        controller.start(|| Err(OutputError::NoDevice)).unwrap();
        while controller.is_running() {
            std::thread::yield_now();
        }
        assert!(matches!(
            controller.stop(),
            Err(ControllerError::Output(OutputError::NoDevice))
        ));
        assert!(controller.render_frames(1).is_ok());
    }
}
