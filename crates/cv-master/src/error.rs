use std::path::PathBuf;

use cv_engine::EngineError;
use cv_ir::ConfigError;
use cv_output::OutputError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse boot config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid boot config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error("real-time thread is running")]
    Running,

    #[error("real-time thread panicked")]
    ThreadPanicked,
}
