//! Output backends for cvcore.

mod buffer;
#[cfg(feature = "cpal")]
mod cpal_backend;
mod traits;

pub use buffer::{BufferOutput, RingOutput};
#[cfg(feature = "cpal")]
pub use cpal_backend::CpalOutput;
pub use traits::{CvOutput, OutputError};
