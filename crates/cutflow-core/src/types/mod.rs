//! # Core Type Definitions
//!
//! This module contains the shared vocabulary of the Cutflow engine:
//! - Cut identifiers and edge tags (`CutId`, `Edge`, `FailRoute`, `Verdict`)
//! - Typed slot values (`Value`, `ValueKind`, `SlotType`, `FourVector`)
//! - Error types (`CutflowError`)
//!
//! ## Typing Rules
//!
//! Every store slot has a `ValueKind` fixed at registration time. Reads and
//! writes through `SlotType` check the kind and never coerce: an `Int` slot
//! cannot be read as `f64`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;
use thiserror::Error;

// =============================================================================
// CUT IDENTIFIERS & EDGE TAGS
// =============================================================================

/// Index of a cut inside its owning `Cutflow`.
///
/// Ids are dense and assigned in insertion order, so they double as indexes
/// into a `Tally`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CutId(pub usize);

impl CutId {
    /// Get the raw index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// One of the two exit edges of a cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edge {
    /// Followed when the predicate returns true.
    Pass,
    /// Followed when the predicate returns false.
    Fail,
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => f.write_str("pass"),
            Self::Fail => f.write_str("fail"),
        }
    }
}

/// What happens to an event that fails a cut.
///
/// This is derived from the wiring and never stored: a cut without a fail
/// child rejects, a cut with one hands the event to an alternative branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailRoute {
    /// Failing terminates the traversal with `Verdict::Rejected`.
    Reject,
    /// Failing continues into a mutually exclusive categorization branch.
    Branch,
}

/// Overall result of one traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Accepted,
    Rejected,
}

impl Verdict {
    /// Check if the event was accepted.
    #[must_use]
    pub const fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted)
    }
}

// =============================================================================
// FOUR-VECTOR
// =============================================================================

/// A Lorentz four-vector in Cartesian coordinates `(px, py, pz, E)`.
///
/// This is the opaque aggregate carried by store slots. The engine never
/// interprets it; the accessors exist for predicates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FourVector {
    pub px: f64,
    pub py: f64,
    pub pz: f64,
    pub e: f64,
}

impl FourVector {
    /// Create a four-vector from Cartesian components.
    #[must_use]
    pub const fn new(px: f64, py: f64, pz: f64, e: f64) -> Self {
        Self { px, py, pz, e }
    }

    /// Create a four-vector from transverse momentum, pseudorapidity,
    /// azimuth and mass.
    #[must_use]
    pub fn from_pt_eta_phi_m(pt: f64, eta: f64, phi: f64, m: f64) -> Self {
        let px = pt * phi.cos();
        let py = pt * phi.sin();
        let pz = pt * eta.sinh();
        let p2 = px * px + py * py + pz * pz;
        Self::new(px, py, pz, (p2 + m * m).sqrt())
    }

    /// Transverse momentum.
    #[must_use]
    pub fn pt(&self) -> f64 {
        self.px.hypot(self.py)
    }

    /// Pseudorapidity. Zero for a vector along the beam axis with no pt.
    #[must_use]
    pub fn eta(&self) -> f64 {
        let pt = self.pt();
        if pt == 0.0 {
            return 0.0;
        }
        (self.pz / pt).asinh()
    }

    /// Azimuthal angle in `(-pi, pi]`.
    #[must_use]
    pub fn phi(&self) -> f64 {
        self.py.atan2(self.px)
    }

    /// Invariant mass. Negative mass-squared (rounding) is clamped to zero.
    #[must_use]
    pub fn mass(&self) -> f64 {
        let m2 = self.e * self.e - (self.px * self.px + self.py * self.py + self.pz * self.pz);
        m2.max(0.0).sqrt()
    }
}

impl Add for FourVector {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(
            self.px + rhs.px,
            self.py + rhs.py,
            self.pz + rhs.pz,
            self.e + rhs.e,
        )
    }
}

// =============================================================================
// SLOT VALUES
// =============================================================================

/// The type tag of a store slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Ints,
    Floats,
    FourVector,
    FourVectors,
    Text,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Ints => "ints",
            Self::Floats => "floats",
            Self::FourVector => "four_vector",
            Self::FourVectors => "four_vectors",
            Self::Text => "text",
        };
        f.write_str(name)
    }
}

impl ValueKind {
    /// The empty value of this kind: zero, false, an empty vector or string.
    #[must_use]
    pub fn zero(self) -> Value {
        match self {
            Self::Bool => Value::Bool(false),
            Self::Int => Value::Int(0),
            Self::Float => Value::Float(0.0),
            Self::Ints => Value::Ints(Vec::new()),
            Self::Floats => Value::Floats(Vec::new()),
            Self::FourVector => Value::FourVector(FourVector::default()),
            Self::FourVectors => Value::FourVectors(Vec::new()),
            Self::Text => Value::Text(String::new()),
        }
    }
}

/// A dynamically typed slot value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Ints(Vec<i64>),
    Floats(Vec<f64>),
    FourVector(FourVector),
    FourVectors(Vec<FourVector>),
    Text(String),
}

impl Value {
    /// The kind tag of this value.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Ints(_) => ValueKind::Ints,
            Self::Floats(_) => ValueKind::Floats,
            Self::FourVector(_) => ValueKind::FourVector,
            Self::FourVectors(_) => ValueKind::FourVectors,
            Self::Text(_) => ValueKind::Text,
        }
    }

    /// Numeric view of a scalar value (`Bool` maps to 0/1).
    ///
    /// Returns `None` for vectors, four-vectors and text.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Int(i) => Some(*i as f64),
            Self::Float(x) => Some(*x),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Ints(v) => write!(f, "{:?}", v),
            Self::Floats(v) => write!(f, "{:?}", v),
            Self::FourVector(p) => write!(f, "({}, {}, {}, {})", p.px, p.py, p.pz, p.e),
            Self::FourVectors(v) => write!(f, "[{} four-vectors]", v.len()),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Rust types that can live in a store slot.
///
/// Implemented for every payload of `Value`; conversion is exact and keyed
/// on `KIND`.
pub trait SlotType: Sized {
    /// The slot kind this type reads from and writes to.
    const KIND: ValueKind;

    /// Wrap into a `Value`.
    fn into_value(self) -> Value;

    /// Borrowing extraction. `None` if the kind differs.
    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! impl_slot_type {
    ($ty:ty, $variant:ident) => {
        impl SlotType for $ty {
            const KIND: ValueKind = ValueKind::$variant;

            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant(inner) => Some(inner.clone()),
                    _ => None,
                }
            }
        }

        impl From<$ty> for Value {
            fn from(inner: $ty) -> Self {
                Value::$variant(inner)
            }
        }
    };
}

impl_slot_type!(bool, Bool);
impl_slot_type!(i64, Int);
impl_slot_type!(f64, Float);
impl_slot_type!(Vec<i64>, Ints);
impl_slot_type!(Vec<f64>, Floats);
impl_slot_type!(FourVector, FourVector);
impl_slot_type!(Vec<FourVector>, FourVectors);
impl_slot_type!(String, Text);

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the Cutflow engine.
///
/// - Configuration errors (`DuplicateName`, `InvalidName`, `NotFound`,
///   `EdgeOccupied`, `TypeMismatch`) are fatal at setup time
/// - Usage errors raised while an event is processed abort the whole run
/// - The engine never panics; every failure surfaces as a `CutflowError`
#[derive(Debug, Error)]
pub enum CutflowError {
    /// A cut, variable or column with this name is already registered.
    #[error("Duplicate name: {0}")]
    DuplicateName(String),

    /// The name cannot be stored in a `.cflow` summary (empty, `null`, or
    /// containing the delimiter or a line break).
    #[error("Invalid cut name: '{0}'")]
    InvalidName(String),

    /// No cut, variable or column with this name is registered.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The parent cut already has a child on this edge.
    #[error("Cut '{parent}' already has a {edge} child")]
    EdgeOccupied { parent: String, edge: Edge },

    /// A slot was read or written with the wrong type.
    #[error("Type mismatch for '{name}': registered as {expected}, got {found}")]
    TypeMismatch {
        name: String,
        expected: ValueKind,
        found: ValueKind,
    },

    /// The record table was finalized; no more rows can be appended.
    #[error("Record table is finalized")]
    TableFinalized,

    /// Columns cannot be added once rows have been flushed.
    #[error("Cannot register column '{0}' after rows were flushed")]
    SchemaFrozen(String),

    /// Graph construction failed earlier; the graph must not be traversed.
    #[error("Cutflow construction failed; refusing to run")]
    GraphPoisoned,

    /// A predicate, weight or side effect signalled an internal error.
    #[error("Cut '{cut}' faulted: {message}")]
    PredicateFault { cut: String, message: String },

    /// Two cutflows with different networks cannot be merged.
    #[error("Inconsistent cutflows: {0}")]
    InconsistentCutflows(String),

    /// A cutflow summary is malformed.
    #[error("Invalid cutflow summary: {0}")]
    InvalidSummary(String),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),

    /// The embedded database reported an error.
    #[error("Storage error: {0}")]
    StorageError(String),
}

impl CutflowError {
    /// Build a `PredicateFault` for the named cut.
    pub fn fault(cut: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::PredicateFault {
            cut: cut.into(),
            message: message.to_string(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
