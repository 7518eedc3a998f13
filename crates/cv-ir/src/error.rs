//! Install-time configuration errors.

use alloc::string::String;
use thiserror::Error;

/// A sequence, scale or engine setting that was rejected before installation.
///
/// Producing one of these never disturbs what is currently installed.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ConfigError {
    #[error("duration must not be negative (got {0})")]
    NegativeDuration(f32),

    #[error("unknown shape `{0}`")]
    UnknownShape(String),

    #[error("unknown operator `{0}`")]
    UnknownOperator(String),

    #[error("operator `{op}` takes {expected} argument(s), got {got}")]
    Arity { op: String, expected: usize, got: usize },

    #[error("value is not finite")]
    NonFiniteValue,

    #[error("malformed sequence: {0}")]
    MalformedNesting(&'static str),

    #[error("sequence nests deeper than {0} levels")]
    NestingTooDeep(usize),

    #[error("sequence has more than {0} blocks")]
    TooManyBlocks(usize),

    #[error("`mutate` must target a dynamic")]
    MutateTarget,

    #[error("unknown dynamic `{0}`")]
    UnknownDynamic(String),

    #[error("more than {0} dynamics declared")]
    TooManyDynamics(usize),

    #[error("scale table is empty")]
    EmptyScale,

    #[error("scale table has more than {0} degrees")]
    ScaleTooLong(usize),

    #[error("scale degrees must be finite and non-decreasing")]
    MalformedScale,

    #[error("scale modulo must be positive (got {0})")]
    NonPositiveModulo(f32),

    #[error("scale scaling must be positive (got {0})")]
    NonPositiveScaling(f32),

    #[error("invalid output range {min}..{max}")]
    InvalidRange { min: f32, max: f32 },

    #[error("tick rate must be positive")]
    InvalidTickRate,
}
