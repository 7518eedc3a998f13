//! Builders for sequence descriptions and a handful of stock shapes.

use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;

use crate::sequence::{NodeDesc, ValueDesc};
use crate::shape::Shape;

pub fn to(volts: impl Into<ValueDesc>, seconds: impl Into<ValueDesc>, shape: Shape) -> NodeDesc {
    NodeDesc::To { volts: volts.into(), time: seconds.into(), shape: shape.name().to_string() }
}

pub fn seq(body: Vec<NodeDesc>) -> NodeDesc {
    NodeDesc::Seq(body)
}

/// Repeat `body` until retriggered or replaced.
pub fn looping(body: Vec<NodeDesc>) -> NodeDesc {
    NodeDesc::Loop(body)
}

/// Run `body`, then hold until released.
pub fn held(body: Vec<NodeDesc>) -> NodeDesc {
    NodeDesc::Held(body)
}

pub fn lock(body: Vec<NodeDesc>) -> NodeDesc {
    NodeDesc::Lock(body)
}

pub fn times(count: u32, body: Vec<NodeDesc>) -> NodeDesc {
    NodeDesc::Times { count, body }
}

pub fn when(cond: impl Into<ValueDesc>, body: Vec<NodeDesc>) -> NodeDesc {
    NodeDesc::If { cond: cond.into(), body }
}

/// Reference to a dynamic declared elsewhere in the sequence.
pub fn var(name: &str) -> ValueDesc {
    ValueDesc::Var { var: name.to_string(), default: None }
}

/// Reference that declares the dynamic with `default`.
pub fn var_or(name: &str, default: f32) -> ValueDesc {
    ValueDesc::Var { var: name.to_string(), default: Some(default) }
}

pub fn op(name: &str, args: Vec<ValueDesc>) -> ValueDesc {
    ValueDesc::Op { op: String::from(name), args }
}

/// Evaluate `value` and store it in the dynamic `target` refers to.
pub fn mutate(target: impl Into<ValueDesc>, value: impl Into<ValueDesc>) -> ValueDesc {
    op("mutate", vec![target.into(), value.into()])
}

/// Attack to `level`, then release to 0.
pub fn ar(attack: f32, release: f32, level: f32, shape: Shape) -> Vec<NodeDesc> {
    vec![to(level, attack, shape), to(0.0, release, shape)]
}

/// Attack and decay to `sustain * level`, hold until released, then
/// release to 0.
pub fn adsr(attack: f32, decay: f32, sustain: f32, release: f32, level: f32) -> Vec<NodeDesc> {
    vec![
        held(vec![
            to(level, attack, Shape::Log),
            to(level * sustain, decay, Shape::Exp),
        ]),
        to(0.0, release, Shape::Exp),
    ]
}

/// Free-running triangle-ish oscillation between `-level` and `level`.
pub fn lfo(period: f32, level: f32, shape: Shape) -> Vec<NodeDesc> {
    let half = period / 2.0;
    vec![looping(vec![to(level, half, shape), to(-level, half, shape)])]
}

/// Gate of `width` seconds at `level`.
pub fn pulse(width: f32, level: f32) -> Vec<NodeDesc> {
    vec![to(level, 0.0, Shape::Now), to(level, width, Shape::Now), to(0.0, 0.0, Shape::Now)]
}
