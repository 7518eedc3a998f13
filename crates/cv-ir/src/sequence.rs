//! Sequence descriptions and the compiled block form the interpreter runs.
//!
//! A [`NodeDesc`] tree is what scripts and boot configuration produce. It is
//! validated and flattened by [`Sequence::compile`] into an arena of
//! [`Block`]s; every control construct becomes a block entered from its
//! parent, so the interpreter only needs a small stack of
//! (block, position) frames to walk it.

use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::error::ConfigError;
use crate::expr::{Dynamics, Elem};
use crate::shape::Shape;

/// Deepest block nesting the interpreter can track (root included).
pub const MAX_DEPTH: usize = 8;

/// Most blocks one sequence may compile to; [`BlockId`] is 16 bits.
pub const MAX_BLOCKS: usize = u16::MAX as usize + 1;

/// Storage-side form of one sequence node.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum NodeDesc {
    /// Ramp to `volts` over `time` seconds.
    To {
        volts: ValueDesc,
        #[cfg_attr(feature = "serde", serde(default))]
        time: ValueDesc,
        #[cfg_attr(feature = "serde", serde(default = "default_shape"))]
        shape: String,
    },
    Seq(Vec<NodeDesc>),
    Loop(Vec<NodeDesc>),
    Held(Vec<NodeDesc>),
    Lock(Vec<NodeDesc>),
    Times { count: u32, body: Vec<NodeDesc> },
    If { cond: ValueDesc, body: Vec<NodeDesc> },
}

#[cfg(feature = "serde")]
fn default_shape() -> String {
    Shape::Linear.name().to_string()
}

/// Storage-side form of a step value.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum ValueDesc {
    Lit(f32),
    /// Reference to a named dynamic. Supplying a default declares it.
    Var {
        var: String,
        #[cfg_attr(feature = "serde", serde(default))]
        default: Option<f32>,
    },
    Op { op: String, args: Vec<ValueDesc> },
}

impl Default for ValueDesc {
    fn default() -> Self {
        ValueDesc::Lit(0.0)
    }
}

impl From<f32> for ValueDesc {
    fn from(v: f32) -> Self {
        ValueDesc::Lit(v)
    }
}

impl From<f64> for ValueDesc {
    fn from(v: f64) -> Self {
        ValueDesc::Lit(v as f32)
    }
}

/// Index of a block in a compiled [`Sequence`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockId(u16);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One scheduled ramp.
#[derive(Clone, Debug, PartialEq)]
pub struct ActionStep {
    pub volts: Elem,
    /// Seconds; negative results clamp to zero at schedule time.
    pub time: Elem,
    pub shape: Shape,
}

#[derive(Clone, Debug, PartialEq)]
pub enum BlockKind {
    /// Runs once.
    Plain,
    /// Restarts from its first op forever.
    Loop,
    /// Runs its body this many times.
    Times(u32),
    /// Suspends at its end until released.
    Held,
    /// Ignores triggers other than unlock while inside.
    Locked,
    /// Entered only when the condition resolves above zero.
    If(Elem),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    To(ActionStep),
    Enter(BlockId),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub kind: BlockKind,
    pub ops: Vec<Op>,
}

/// A validated, installable sequence.
#[derive(Clone, Debug, PartialEq)]
pub struct Sequence {
    blocks: Vec<Block>,
    dynamics: Dynamics,
}

impl Sequence {
    /// Validate and compile a description. Nothing is installed on error.
    pub fn compile(nodes: &[NodeDesc]) -> Result<Self, ConfigError> {
        let mut compiler = Compiler { blocks: Vec::new(), dynamics: Dynamics::new() };
        compiler.declare_all(nodes)?;
        compiler.block(BlockKind::Plain, nodes, 1, Nesting::default())?;
        Ok(Self { blocks: compiler.blocks, dynamics: compiler.dynamics })
    }

    /// A single ramp with literal values.
    pub fn single(volts: f32, seconds: f32, shape: Shape) -> Result<Self, ConfigError> {
        Self::compile(&[NodeDesc::To {
            volts: ValueDesc::Lit(volts),
            time: ValueDesc::Lit(seconds),
            shape: shape.name().to_string(),
        }])
    }

    pub fn root(&self) -> BlockId {
        BlockId(0)
    }

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.index())
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Declared dynamics at their default values.
    pub fn dynamics(&self) -> &Dynamics {
        &self.dynamics
    }

    /// Number of ramp steps across all blocks.
    pub fn step_count(&self) -> usize {
        self.blocks
            .iter()
            .flat_map(|b| b.ops.iter())
            .filter(|op| matches!(op, Op::To(_)))
            .count()
    }
}

#[derive(Clone, Copy, Default)]
struct Nesting {
    held: bool,
    locked: bool,
}

struct Compiler {
    blocks: Vec<Block>,
    dynamics: Dynamics,
}

impl Compiler {
    /// Declare every dynamic that carries a default, so references may
    /// precede the declaring node.
    fn declare_all(&mut self, nodes: &[NodeDesc]) -> Result<(), ConfigError> {
        for node in nodes {
            match node {
                NodeDesc::To { volts, time, .. } => {
                    self.declare_value(volts)?;
                    self.declare_value(time)?;
                }
                NodeDesc::If { cond, body } => {
                    self.declare_value(cond)?;
                    self.declare_all(body)?;
                }
                NodeDesc::Seq(body)
                | NodeDesc::Loop(body)
                | NodeDesc::Held(body)
                | NodeDesc::Lock(body)
                | NodeDesc::Times { body, .. } => self.declare_all(body)?,
            }
        }
        Ok(())
    }

    fn declare_value(&mut self, value: &ValueDesc) -> Result<(), ConfigError> {
        match value {
            ValueDesc::Lit(_) => Ok(()),
            ValueDesc::Var { var, default: Some(d) } => self.dynamics.declare(var, *d).map(|_| ()),
            ValueDesc::Var { default: None, .. } => Ok(()),
            ValueDesc::Op { args, .. } => args.iter().try_for_each(|a| self.declare_value(a)),
        }
    }

    fn block(
        &mut self,
        kind: BlockKind,
        body: &[NodeDesc],
        depth: usize,
        nesting: Nesting,
    ) -> Result<BlockId, ConfigError> {
        if depth > MAX_DEPTH {
            return Err(ConfigError::NestingTooDeep(MAX_DEPTH));
        }
        let id = u16::try_from(self.blocks.len())
            .map(BlockId)
            .map_err(|_| ConfigError::TooManyBlocks(MAX_BLOCKS))?;
        self.blocks.push(Block { kind, ops: Vec::new() });

        let mut ops = Vec::with_capacity(body.len());
        for node in body {
            ops.push(self.node(node, depth, nesting)?);
        }
        self.blocks[id.index()].ops = ops;
        Ok(id)
    }

    fn node(&mut self, node: &NodeDesc, depth: usize, nesting: Nesting) -> Result<Op, ConfigError> {
        let child = depth + 1;
        let id = match node {
            NodeDesc::To { volts, time, shape } => {
                let volts = self.value(volts)?;
                let time = self.value(time)?;
                if let Some(t) = time.as_literal() {
                    if t < 0.0 {
                        return Err(ConfigError::NegativeDuration(t));
                    }
                }
                let shape = Shape::parse(shape)?;
                return Ok(Op::To(ActionStep { volts, time, shape }));
            }
            NodeDesc::Seq(body) => self.block(BlockKind::Plain, body, child, nesting)?,
            NodeDesc::Loop(body) => {
                if !has_step(body) {
                    return Err(ConfigError::MalformedNesting("loop body has no steps"));
                }
                self.block(BlockKind::Loop, body, child, nesting)?
            }
            NodeDesc::Held(body) => {
                if nesting.held {
                    return Err(ConfigError::MalformedNesting("held inside held"));
                }
                self.block(BlockKind::Held, body, child, Nesting { held: true, ..nesting })?
            }
            NodeDesc::Lock(body) => {
                if nesting.locked {
                    return Err(ConfigError::MalformedNesting("lock inside lock"));
                }
                self.block(BlockKind::Locked, body, child, Nesting { locked: true, ..nesting })?
            }
            NodeDesc::Times { count, body } => {
                if *count == 0 {
                    return Err(ConfigError::MalformedNesting("times count must be positive"));
                }
                self.block(BlockKind::Times(*count), body, child, nesting)?
            }
            NodeDesc::If { cond, body } => {
                let cond = self.value(cond)?;
                self.block(BlockKind::If(cond), body, child, nesting)?
            }
        };
        Ok(Op::Enter(id))
    }

    fn value(&self, value: &ValueDesc) -> Result<Elem, ConfigError> {
        match value {
            ValueDesc::Lit(v) if v.is_finite() => Ok(Elem::Lit(*v)),
            ValueDesc::Lit(_) => Err(ConfigError::NonFiniteValue),
            ValueDesc::Var { var, .. } => self
                .dynamics
                .find(var)
                .map(Elem::Dyn)
                .ok_or_else(|| ConfigError::UnknownDynamic(var.clone())),
            ValueDesc::Op { op, args } => self.operator(op, args),
        }
    }

    fn operator(&self, op: &str, args: &[ValueDesc]) -> Result<Elem, ConfigError> {
        let expected = match op {
            "neg" => 1,
            "add" | "sub" | "mul" | "div" | "mod" | "mutate" => 2,
            _ => return Err(ConfigError::UnknownOperator(op.to_string())),
        };
        if args.len() != expected {
            return Err(ConfigError::Arity { op: op.to_string(), expected, got: args.len() });
        }
        if op == "mutate" {
            let Elem::Dyn(target) = self.value(&args[0])? else {
                return Err(ConfigError::MutateTarget);
            };
            return Ok(Elem::Mutate(target, Box::new(self.value(&args[1])?)));
        }
        let a = Box::new(self.value(&args[0])?);
        if op == "neg" {
            return Ok(Elem::Neg(a));
        }
        let b = Box::new(self.value(&args[1])?);
        Ok(match op {
            "add" => Elem::Add(a, b),
            "sub" => Elem::Sub(a, b),
            "mul" => Elem::Mul(a, b),
            "div" => Elem::Div(a, b),
            _ => Elem::Mod(a, b),
        })
    }
}

fn has_step(nodes: &[NodeDesc]) -> bool {
    nodes.iter().any(|node| match node {
        NodeDesc::To { .. } => true,
        NodeDesc::Seq(body)
        | NodeDesc::Loop(body)
        | NodeDesc::Held(body)
        | NodeDesc::Lock(body)
        | NodeDesc::Times { body, .. }
        | NodeDesc::If { body, .. } => has_step(body),
    })
}
