//! cvcore CLI: validate boot configs, render them offline, or run them live.
//!
//! Usage:
//!   cv-cli check boot.toml
//!   cv-cli render boot.toml --seconds 2 --out trace.csv
//!   cv-cli run boot.toml --seconds 10 --csv live.csv

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use cv_engine::OutputFrame;
use cv_ir::{Channel, TickRate};
use cv_master::{write_csv, BootConfig, Controller, ControllerError};
use cv_output::{CvOutput, RingOutput};
use ringbuf::traits::Consumer;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cv-cli")]
#[command(version)]
#[command(about = "Control-voltage sequencer engine")]
struct Args {
    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse and validate a boot config
    Check { config: PathBuf },

    /// Render a boot config offline to CSV
    Render {
        config: PathBuf,
        #[arg(short, long, default_value_t = 1.0)]
        seconds: f32,
        /// Output file; stdout when omitted
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Run a boot config on the real-time thread
    Run {
        config: PathBuf,
        /// Stop after this many seconds; run until killed when omitted
        #[arg(short, long)]
        seconds: Option<f32>,
        /// Record every tick to this CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Drive the default audio device through a DC-coupled interface
        #[cfg(feature = "cpal")]
        #[arg(long)]
        device: bool,
    },
}

fn setup_tracing(args: &Args) {
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    setup_tracing(&args);

    let result = match args.command {
        Command::Check { config } => check(&config),
        Command::Render { config, seconds, out } => render(&config, seconds, out.as_deref()),
        #[cfg(feature = "cpal")]
        Command::Run { config, seconds, csv, device } => {
            run(&config, seconds, csv.as_deref(), device)
        }
        #[cfg(not(feature = "cpal"))]
        Command::Run { config, seconds, csv } => run(&config, seconds, csv.as_deref(), false),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "failed");
            ExitCode::FAILURE
        }
    }
}

fn check(path: &Path) -> Result<(), ControllerError> {
    let config = BootConfig::load(path)?;
    for channel in &config.channels {
        let steps = channel.compile()?.map_or(0, |s| s.step_count());
        info!(channel = channel.index, steps, start = channel.start, "ok");
    }
    println!("{}: ok", path.display());
    Ok(())
}

fn render(path: &Path, seconds: f32, out: Option<&Path>) -> Result<(), ControllerError> {
    let mut controller = Controller::load(path)?;
    let ticks = controller.tick_rate().seconds_to_ticks(seconds) as usize;
    let buffer = controller.render_frames(ticks)?;
    let frames: Vec<_> = buffer.frames().collect();

    match out {
        Some(out) => {
            let file = File::create(out).map_err(|e| io_err(e, out))?;
            let mut w = BufWriter::new(file);
            write_csv(&mut w, &frames, controller.tick_rate())
                .and_then(|()| w.flush())
                .map_err(|e| io_err(e, out))?;
            info!(ticks, path = %out.display(), "rendered");
        }
        None => {
            let stdout = std::io::stdout();
            write_csv(&mut stdout.lock(), &frames, controller.tick_rate())
                .map_err(|e| io_err(e, Path::new("<stdout>")))?;
        }
    }
    for event in controller.poll_events() {
        info!(?event, "sequence event");
    }
    Ok(())
}

fn run(
    path: &Path,
    seconds: Option<f32>,
    csv: Option<&Path>,
    device: bool,
) -> Result<(), ControllerError> {
    let mut controller = Controller::load(path)?;
    let rate = controller.tick_rate();
    // One second of headroom between the tick thread and this loop.
    let (ring, mut frames) = RingOutput::new(rate.hz() as usize);

    if device {
        #[cfg(feature = "cpal")]
        {
            let range = controller.range();
            let full_scale = range.min().abs().max(range.max().abs());
            controller.start(move || {
                let output = cv_output::CpalOutput::new(rate.hz(), full_scale)?;
                Ok(Box::new(output) as Box<dyn CvOutput>)
            })?;
        }
    } else {
        controller.start(move || Ok(Box::new(ring) as Box<dyn CvOutput>))?;
    }

    let mut recorder = csv.map(|path| Recorder::create(path, rate)).transpose()?;

    let deadline = seconds.map(|s| Instant::now() + Duration::from_secs_f32(s.max(0.0)));
    let mut last_report = Instant::now();
    while controller.is_running() && deadline.is_none_or(|d| Instant::now() < d) {
        controller.service();
        for event in controller.poll_events() {
            info!(?event, "sequence event");
        }
        match recorder.as_mut() {
            Some(recorder) => recorder.record(frames.pop_iter())?,
            None => {
                frames.pop_iter().count();
            }
        }

        if last_report.elapsed() >= Duration::from_secs(1) {
            let volts: Vec<f32> = Channel::all().map(|c| controller.output_voltage(c)).collect();
            info!(?volts, stats = ?controller.stats(), "running");
            last_report = Instant::now();
        }
        std::thread::sleep(Duration::from_millis(1));
    }

    controller.stop()?;
    if let Some(mut recorder) = recorder {
        recorder.record(frames.pop_iter())?;
        recorder.finish()?;
    }
    Ok(())
}

/// Streams frames from the tick thread into a CSV file.
struct Recorder<'a> {
    w: BufWriter<File>,
    path: &'a Path,
    rate: TickRate,
    tick: u32,
}

impl<'a> Recorder<'a> {
    fn create(path: &'a Path, rate: TickRate) -> Result<Self, ControllerError> {
        let mut recorder = Self {
            w: BufWriter::new(File::create(path).map_err(|e| io_err(e, path))?),
            path,
            rate,
            tick: 0,
        };
        // Header only; rows follow as frames arrive.
        write_csv(&mut recorder.w, &[], rate).map_err(|e| io_err(e, path))?;
        Ok(recorder)
    }

    fn record(&mut self, frames: impl Iterator<Item = OutputFrame>) -> Result<(), ControllerError> {
        for frame in frames {
            let [a, b, c, d] = frame.volts;
            let time = self.rate.ticks_to_seconds(self.tick);
            writeln!(self.w, "{time:.6},{a:.6},{b:.6},{c:.6},{d:.6}")
                .map_err(|e| io_err(e, self.path))?;
            self.tick = self.tick.saturating_add(1);
        }
        Ok(())
    }

    fn finish(mut self) -> Result<(), ControllerError> {
        self.w.flush().map_err(|e| io_err(e, self.path))?;
        info!(ticks = self.tick, path = %self.path.display(), "recorded");
        Ok(())
    }
}

fn io_err(source: std::io::Error, path: &Path) -> ControllerError {
    ControllerError::Io { path: path.to_path_buf(), source }
}
