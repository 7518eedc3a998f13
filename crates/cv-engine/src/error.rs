//! Engine error type.

use cv_ir::{Channel, ConfigError};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no output channel numbered {0}")]
    InvalidChannel(u8),

    #[error("no input numbered {0}")]
    InvalidInput(u8),

    #[error("unknown action {0}")]
    UnknownAction(u8),

    #[error("no sequence installed on {0}")]
    NoSequence(Channel),

    #[error("no dynamic named `{0}` on this channel")]
    UnknownDynamic(String),

    /// A lock was busy on the real-time path; the operation was skipped.
    #[error("shared state busy, operation skipped")]
    Contention,

    #[error("corrupt interpreter state: {0}")]
    Corrupt(&'static str),
}
