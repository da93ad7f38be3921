//! Symbolic impedance expressions.
//!
//! An [`Expr`] is a node in a shared expression DAG. Elimination over
//! symbolic impedances builds these instead of numbers; once concrete
//! impedances are known the DAG is compiled to a [`Tape`] and evaluated
//! once per frequency.
//!
//! Every node carries a *sample* value: the expression evaluated with each
//! symbol replaced by a fixed pseudo-random complex number derived from its
//! name. The sample is what the solver uses to rank pivots and to recognise
//! expressions that are identically zero (e.g. `y - y`).

use num_complex::Complex64;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};
use std::sync::Arc;

use crate::error::{FilterError, Result};
use crate::field::Field;

#[derive(Clone)]
pub struct Expr(Arc<Term>);

struct Term {
    kind: TermKind,
    sample: Complex64,
}

#[derive(PartialEq)]
enum TermKind {
    Constant(Complex64),
    Symbol(String),
    Sum(Expr, Expr),
    Product(Expr, Expr),
    Negation(Expr),
    Reciprocal(Expr),
}

impl Expr {
    fn from_kind(kind: TermKind) -> Self {
        let sample = match &kind {
            TermKind::Constant(value) => *value,
            TermKind::Symbol(name) => symbol_sample(name),
            TermKind::Sum(a, b) => a.sample() + b.sample(),
            TermKind::Product(a, b) => a.sample() * b.sample(),
            TermKind::Negation(a) => -a.sample(),
            TermKind::Reciprocal(a) => a.sample().inv(),
        };
        Expr(Arc::new(Term { kind, sample }))
    }

    pub fn constant(value: Complex64) -> Self {
        Self::from_kind(TermKind::Constant(value))
    }

    pub fn real(value: f64) -> Self {
        Self::constant(Complex64::new(value, 0.0))
    }

    pub fn symbol(name: impl Into<String>) -> Self {
        Self::from_kind(TermKind::Symbol(name.into()))
    }

    /// The value of this expression if it contains no symbols.
    pub fn as_constant(&self) -> Option<Complex64> {
        match self.0.kind {
            TermKind::Constant(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        matches!(self.as_constant(), Some(c) if c.re == 0.0 && c.im == 0.0)
    }

    fn is_one(&self) -> bool {
        matches!(self.as_constant(), Some(c) if c.re == 1.0 && c.im == 0.0)
    }

    pub fn sample(&self) -> Complex64 {
        self.0.sample
    }

    /// Names of every symbol the expression depends on.
    pub fn symbols(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        let mut seen = HashSet::new();
        let mut stack = vec![self.clone()];
        while let Some(expr) = stack.pop() {
            if !seen.insert(Arc::as_ptr(&expr.0)) {
                continue;
            }
            match &expr.0.kind {
                TermKind::Constant(_) => {}
                TermKind::Symbol(name) => {
                    names.insert(name.clone());
                }
                TermKind::Sum(a, b) | TermKind::Product(a, b) => {
                    stack.push(a.clone());
                    stack.push(b.clone());
                }
                TermKind::Negation(a) | TermKind::Reciprocal(a) => stack.push(a.clone()),
            }
        }
        names
    }

    /// Substitute concrete values for every symbol and evaluate.
    pub fn evaluate(&self, values: &HashMap<String, Complex64>) -> Result<Complex64> {
        let tape = Tape::compile(std::slice::from_ref(self));
        let outputs = tape.evaluate_with(values)?;
        Ok(outputs[0])
    }

    fn write_limited(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        if depth == 0 {
            return write!(f, "...");
        }
        match &self.0.kind {
            TermKind::Constant(c) if c.im == 0.0 => write!(f, "{}", c.re),
            TermKind::Constant(c) => write!(f, "({})", c),
            TermKind::Symbol(name) => write!(f, "{}", name),
            TermKind::Sum(a, b) => {
                write!(f, "(")?;
                a.write_limited(f, depth - 1)?;
                write!(f, " + ")?;
                b.write_limited(f, depth - 1)?;
                write!(f, ")")
            }
            TermKind::Product(a, b) => {
                a.write_limited(f, depth - 1)?;
                write!(f, "*")?;
                b.write_limited(f, depth - 1)
            }
            TermKind::Negation(a) => {
                write!(f, "-")?;
                a.write_limited(f, depth - 1)
            }
            TermKind::Reciprocal(a) => {
                write!(f, "1/(")?;
                a.write_limited(f, depth - 1)?;
                write!(f, ")")
            }
        }
    }
}

/// Deterministic sample point for a symbol (FNV-1a of the name mapped onto
/// an annulus of radius 0.5..2 in the complex plane).
fn symbol_sample(name: &str) -> Complex64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in name.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    let angle = (hash & 0xffff) as f64 / 65536.0 * std::f64::consts::TAU;
    let radius = 0.5 + ((hash >> 16) & 0xffff) as f64 / 65536.0 * 1.5;
    Complex64::from_polar(radius, angle)
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0.kind == other.0.kind
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_limited(f, 8)
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_limited(f, 8)
    }
}

impl Add for Expr {
    type Output = Expr;

    fn add(self, rhs: Expr) -> Expr {
        if let (Some(a), Some(b)) = (self.as_constant(), rhs.as_constant()) {
            return Expr::constant(a + b);
        }
        if self.is_zero() {
            return rhs;
        }
        if rhs.is_zero() {
            return self;
        }
        Expr::from_kind(TermKind::Sum(self, rhs))
    }
}

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        match &self.0.kind {
            TermKind::Constant(value) => Expr::constant(-*value),
            TermKind::Negation(inner) => inner.clone(),
            _ => Expr::from_kind(TermKind::Negation(self)),
        }
    }
}

impl Sub for Expr {
    type Output = Expr;

    fn sub(self, rhs: Expr) -> Expr {
        self + (-rhs)
    }
}

impl Mul for Expr {
    type Output = Expr;

    fn mul(self, rhs: Expr) -> Expr {
        if let (Some(a), Some(b)) = (self.as_constant(), rhs.as_constant()) {
            return Expr::constant(a * b);
        }
        if self.is_zero() || rhs.is_zero() {
            return Expr::real(0.0);
        }
        if self.is_one() {
            return rhs;
        }
        if rhs.is_one() {
            return self;
        }
        Expr::from_kind(TermKind::Product(self, rhs))
    }
}

impl Field for Expr {
    // Sample magnitudes say nothing about the sizes of the real impedances,
    // so only structurally zero pivots are moved out of the way.
    const PARTIAL_PIVOTING: bool = false;

    fn zero() -> Self {
        Expr::real(0.0)
    }

    fn one() -> Self {
        Expr::real(1.0)
    }

    fn invert(&self) -> Option<Self> {
        if let Some(value) = self.as_constant() {
            return value.invert().map(Expr::constant);
        }
        let sample = self.sample();
        if sample.re == 0.0 && sample.im == 0.0 {
            return None;
        }
        if let TermKind::Reciprocal(inner) = &self.0.kind {
            return Some(inner.clone());
        }
        Some(Expr::from_kind(TermKind::Reciprocal(self.clone())))
    }

    fn magnitude(&self) -> f64 {
        self.sample().norm()
    }
}

#[derive(Debug, Clone)]
enum Instr {
    Constant(Complex64),
    Load(usize),
    Sum(usize, usize),
    Product(usize, usize),
    Negation(usize),
    Reciprocal(usize),
}

/// Straight-line program evaluating one or more expressions.
///
/// Shared sub-expressions are emitted once, so evaluation is linear in the
/// size of the DAG rather than the size of the expanded tree.
#[derive(Debug, Clone)]
pub struct Tape {
    instrs: Vec<Instr>,
    symbols: Vec<String>,
    outputs: Vec<usize>,
}

struct TapeBuilder {
    instrs: Vec<Instr>,
    symbols: Vec<String>,
    symbol_slots: HashMap<String, usize>,
    emitted: HashMap<*const Term, usize>,
}

impl TapeBuilder {
    fn emit(&mut self, expr: &Expr) -> usize {
        let key = Arc::as_ptr(&expr.0);
        if let Some(&register) = self.emitted.get(&key) {
            return register;
        }
        let instr = match &expr.0.kind {
            TermKind::Constant(value) => Instr::Constant(*value),
            TermKind::Symbol(name) => {
                let next = self.symbols.len();
                let slot = *self.symbol_slots.entry(name.clone()).or_insert(next);
                if slot == next {
                    self.symbols.push(name.clone());
                }
                Instr::Load(slot)
            }
            TermKind::Sum(a, b) => {
                let a = self.emit(a);
                let b = self.emit(b);
                Instr::Sum(a, b)
            }
            TermKind::Product(a, b) => {
                let a = self.emit(a);
                let b = self.emit(b);
                Instr::Product(a, b)
            }
            TermKind::Negation(a) => Instr::Negation(self.emit(a)),
            TermKind::Reciprocal(a) => Instr::Reciprocal(self.emit(a)),
        };
        self.instrs.push(instr);
        let register = self.instrs.len() - 1;
        self.emitted.insert(key, register);
        register
    }
}

impl Tape {
    pub fn compile(roots: &[Expr]) -> Self {
        let mut builder = TapeBuilder {
            instrs: Vec::new(),
            symbols: Vec::new(),
            symbol_slots: HashMap::new(),
            emitted: HashMap::new(),
        };
        let outputs = roots.iter().map(|root| builder.emit(root)).collect();
        Tape {
            instrs: builder.instrs,
            symbols: builder.symbols,
            outputs,
        }
    }

    /// Symbol names in input-slot order.
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    /// Run the program with `inputs[i]` bound to `symbols()[i]`.
    pub fn evaluate(&self, inputs: &[Complex64]) -> Result<Vec<Complex64>> {
        if inputs.len() != self.symbols.len() {
            return Err(FilterError::InvalidArgument(format!(
                "expected {} symbol values, got {}",
                self.symbols.len(),
                inputs.len()
            )));
        }

        let mut registers: Vec<Complex64> = Vec::with_capacity(self.instrs.len());
        for instr in &self.instrs {
            let value = match *instr {
                Instr::Constant(value) => value,
                Instr::Load(slot) => inputs[slot],
                Instr::Sum(a, b) => registers[a] + registers[b],
                Instr::Product(a, b) => registers[a] * registers[b],
                Instr::Negation(a) => -registers[a],
                Instr::Reciprocal(a) => registers[a].invert().ok_or_else(|| {
                    FilterError::SingularSystem(
                        "division by zero while evaluating a solved expression".to_string(),
                    )
                })?,
            };
            registers.push(value);
        }

        self.outputs
            .iter()
            .map(|&register| {
                let value = registers[register];
                if value.is_finite() {
                    Ok(value)
                } else {
                    Err(FilterError::SingularSystem(
                        "solved expression evaluated to a non-finite value".to_string(),
                    ))
                }
            })
            .collect()
    }

    /// Run the program, looking every symbol up by name.
    pub fn evaluate_with(&self, values: &HashMap<String, Complex64>) -> Result<Vec<Complex64>> {
        let inputs = self
            .symbols
            .iter()
            .map(|name| {
                values
                    .get(name)
                    .copied()
                    .ok_or_else(|| FilterError::UnboundSymbol(name.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        self.evaluate(&inputs)
    }
}
