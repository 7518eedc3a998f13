//! Core data model for the cvcore control-voltage engine.
//!
//! Everything the real-time path reads (shapes, scales, compiled sequences)
//! is defined here, along with the install-time validation that keeps bad
//! configuration away from it.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod channel;
mod error;
mod expr;
pub mod library;
mod scale;
mod sequence;
mod shape;
mod time;

pub use channel::{Channel, OutputRange, DEFAULT_MAX_VOLTS, DEFAULT_MIN_VOLTS, NUM_CHANNELS};
pub use error::ConfigError;
pub use expr::{DynId, Dynamics, Elem, MAX_DYNAMICS};
pub use scale::{ScaleConfig, DEFAULT_MODULO, DEFAULT_SCALING, MAX_DEGREES};
pub use sequence::{
    ActionStep, Block, BlockId, BlockKind, NodeDesc, Op, Sequence, ValueDesc, MAX_BLOCKS,
    MAX_DEPTH,
};
pub use shape::{Shape, ShapeTable, LUT_SIZE};
pub use time::{TickRate, DEFAULT_TICK_HZ};
