//! Output backend trait and error type.

use cv_engine::HardwareOutput;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("device init error: {0}")]
    DeviceInit(String),
    #[error("stream create error: {0}")]
    StreamCreate(String),
    #[error("playback error: {0}")]
    Playback(String),
    #[error("no output device available")]
    NoDevice,
    #[error("device has {0} channel(s), at least one is required")]
    TooFewChannels(u16),
}

/// A hardware backend driven by the tick thread.
///
/// Backends are built on the tick thread itself, so they need not be `Send`.
pub trait CvOutput: HardwareOutput {
    /// Bring the device up. Called on the tick thread before the first tick.
    fn start(&mut self) -> Result<(), OutputError> {
        Ok(())
    }

    /// Park the device. Called on the tick thread after the last tick.
    fn stop(&mut self) -> Result<(), OutputError> {
        Ok(())
    }
}
