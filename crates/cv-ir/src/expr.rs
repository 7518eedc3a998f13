//! Step-value expressions and named dynamic cells.

use alloc::boxed::Box;
use alloc::string::{String, ToString};
use arrayvec::ArrayVec;

use crate::error::ConfigError;

/// Maximum number of dynamics a sequence can declare.
pub const MAX_DYNAMICS: usize = 16;

/// Index of a dynamic cell within its sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DynId(pub(crate) u8);

impl DynId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A compiled step value, evaluated each time the step is scheduled.
#[derive(Clone, Debug, PartialEq)]
pub enum Elem {
    Lit(f32),
    Dyn(DynId),
    Neg(Box<Elem>),
    Add(Box<Elem>, Box<Elem>),
    Sub(Box<Elem>, Box<Elem>),
    Mul(Box<Elem>, Box<Elem>),
    /// Division; a zero divisor yields 0.
    Div(Box<Elem>, Box<Elem>),
    /// Floored modulo; a zero divisor yields 0.
    Mod(Box<Elem>, Box<Elem>),
    /// Evaluates the inner expression and stores the result in the cell, so
    /// the next evaluation starts from it.
    Mutate(DynId, Box<Elem>),
}

impl Elem {
    /// Resolve against the current dynamic values, writing back any
    /// [`Elem::Mutate`] results. Never allocates.
    pub fn eval(&self, dynamics: &mut Dynamics) -> f32 {
        match self {
            Elem::Lit(v) => *v,
            Elem::Dyn(id) => dynamics.get(*id),
            Elem::Neg(a) => -a.eval(dynamics),
            Elem::Add(a, b) => a.eval(dynamics) + b.eval(dynamics),
            Elem::Sub(a, b) => a.eval(dynamics) - b.eval(dynamics),
            Elem::Mul(a, b) => a.eval(dynamics) * b.eval(dynamics),
            Elem::Div(a, b) => {
                let d = b.eval(dynamics);
                if d == 0.0 { 0.0 } else { a.eval(dynamics) / d }
            }
            Elem::Mod(a, b) => {
                let d = b.eval(dynamics);
                if d == 0.0 {
                    0.0
                } else {
                    let n = a.eval(dynamics);
                    n - d * libm::floorf(n / d)
                }
            }
            Elem::Mutate(id, a) => {
                let v = a.eval(dynamics);
                dynamics.set(*id, v);
                v
            }
        }
    }

    /// Literal value, if the expression is constant.
    pub fn as_literal(&self) -> Option<f32> {
        match self {
            Elem::Lit(v) => Some(*v),
            _ => None,
        }
    }
}

/// Named float cells belonging to one installed sequence.
///
/// Names are fixed at install; afterwards only values change, so reads and
/// writes from the tick path never allocate.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dynamics {
    names: ArrayVec<String, MAX_DYNAMICS>,
    defaults: ArrayVec<f32, MAX_DYNAMICS>,
    values: ArrayVec<f32, MAX_DYNAMICS>,
}

impl Dynamics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `name` with a default. Re-declaring an existing name keeps the
    /// first default.
    pub fn declare(&mut self, name: &str, default: f32) -> Result<DynId, ConfigError> {
        if let Some(id) = self.find(name) {
            return Ok(id);
        }
        if !default.is_finite() {
            return Err(ConfigError::NonFiniteValue);
        }
        if self.names.is_full() {
            return Err(ConfigError::TooManyDynamics(MAX_DYNAMICS));
        }
        let id = DynId(self.names.len() as u8);
        self.names.push(name.to_string());
        self.defaults.push(default);
        self.values.push(default);
        Ok(id)
    }

    pub fn find(&self, name: &str) -> Option<DynId> {
        self.names.iter().position(|n| n == name).map(|i| DynId(i as u8))
    }

    pub fn get(&self, id: DynId) -> f32 {
        self.values.get(id.index()).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, id: DynId, value: f32) {
        if let Some(slot) = self.values.get_mut(id.index()) {
            *slot = value;
        }
    }

    pub fn value_of(&self, name: &str) -> Option<f32> {
        self.find(name).map(|id| self.get(id))
    }

    /// Set a cell by name. Returns `false` when no such cell exists.
    pub fn set_named(&mut self, name: &str, value: f32) -> bool {
        match self.find(name) {
            Some(id) => {
                self.set(id, value);
                true
            }
            None => false,
        }
    }

    /// Restore every cell to its declared default.
    pub fn reset(&mut self) {
        self.values.clone_from(&self.defaults);
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> + '_ {
        self.names.iter().map(String::as_str).zip(self.values.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(v: f32) -> Box<Elem> {
        Box::new(Elem::Lit(v))
    }

    #[test]
    fn arithmetic() {
        let mut d = Dynamics::new();
        assert_eq!(Elem::Add(lit(1.0), lit(2.0)).eval(&mut d), 3.0);
        assert_eq!(Elem::Sub(lit(1.0), lit(2.0)).eval(&mut d), -1.0);
        assert_eq!(Elem::Mul(lit(1.5), lit(2.0)).eval(&mut d), 3.0);
        assert_eq!(Elem::Neg(lit(4.0)).eval(&mut d), -4.0);
        assert_eq!(Elem::Div(lit(1.0), lit(4.0)).eval(&mut d), 0.25);
    }

    #[test]
    fn zero_divisor_yields_zero() {
        let mut d = Dynamics::new();
        assert_eq!(Elem::Div(lit(3.0), lit(0.0)).eval(&mut d), 0.0);
        assert_eq!(Elem::Mod(lit(3.0), lit(0.0)).eval(&mut d), 0.0);
    }

    #[test]
    fn modulo_is_floored() {
        let mut d = Dynamics::new();
        assert_eq!(Elem::Mod(lit(7.0), lit(3.0)).eval(&mut d), 1.0);
        assert_eq!(Elem::Mod(lit(-1.0), lit(3.0)).eval(&mut d), 2.0);
    }

    #[test]
    fn dynamics_are_read_live() {
        let mut d = Dynamics::new();
        let id = d.declare("level", 1.0).unwrap();
        let e = Elem::Mul(Box::new(Elem::Dyn(id)), lit(2.0));
        assert_eq!(e.eval(&mut d), 2.0);
        d.set(id, 3.0);
        assert_eq!(e.eval(&mut d), 6.0);
        d.reset();
        assert_eq!(e.eval(&mut d), 2.0);
    }

    #[test]
    fn mutate_writes_back() {
        let mut d = Dynamics::new();
        let id = d.declare("x", 0.0).unwrap();
        let step = Elem::Add(Box::new(Elem::Dyn(id)), lit(0.5));
        let e = Elem::Mod(Box::new(Elem::Mutate(id, Box::new(step))), lit(1.0));
        assert_eq!(e.eval(&mut d), 0.5);
        assert_eq!(e.eval(&mut d), 0.0);
        assert_eq!(d.get(id), 1.0);
        assert_eq!(e.eval(&mut d), 0.5);
        assert_eq!(d.get(id), 1.5);
        d.reset();
        assert_eq!(d.get(id), 0.0);
    }

    #[test]
    fn redeclaring_keeps_first_default() {
        let mut d = Dynamics::new();
        let a = d.declare("x", 1.0).unwrap();
        let b = d.declare("x", 9.0).unwrap();
        assert_eq!(a, b);
        assert_eq!(d.value_of("x"), Some(1.0));
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn capacity_enforced() {
        let mut d = Dynamics::new();
        for i in 0..MAX_DYNAMICS {
            d.declare(&format!("d{i}"), 0.0).unwrap();
        }
        assert_eq!(d.declare("extra", 0.0), Err(ConfigError::TooManyDynamics(MAX_DYNAMICS)));
    }

    #[test]
    fn set_named_reports_missing() {
        let mut d = Dynamics::new();
        d.declare("rate", 0.5).unwrap();
        assert!(d.set_named("rate", 2.0));
        assert!(!d.set_named("missing", 2.0));
        assert_eq!(d.iter().collect::<Vec<_>>(), vec![("rate", 2.0)]);
    }
}
