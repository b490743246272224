// src/core/error.rs
//! Closed error taxonomy for the evaluation core.
//!
//! Every failure the core can produce is one of these variants; all of
//! them abort the statement being evaluated and surface to the caller
//! with enough context (scope/function/variable/builtin) to diagnose.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Read of an undeclared scope/function/variable/index.
    MemoryLookup {
        scope: String,
        func: String,
        var: String,
    },
    /// Dispatch on a builtin name absent from the table.
    UnknownBuiltin { name: String },
    /// Reduction requested for an unrecognized target type.
    UnsupportedReduction { target: String },
    /// Duplicate qubit index within one gate, control/target arity
    /// mismatch, or an index outside the register width.
    InvalidGate(String),
    /// Operator applied to an incompatible value-type combination.
    TypeMismatch {
        op: String,
        left: String,
        right: String,
    },
    /// Simulation back-end failure (malformed assembly, bad counts).
    Simulation(String),
    /// Evaluator bookkeeping violation; indicates a bug, not user error.
    Internal(String),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::MemoryLookup { scope, func, var } => {
                write!(f, "Memory Lookup Error: no '{}' in {}::{}", var, scope, func)
            }
            CoreError::UnknownBuiltin { name } => {
                write!(f, "Unknown Builtin Error: '{}'", name)
            }
            CoreError::UnsupportedReduction { target } => {
                write!(f, "Unsupported Reduction Error: target type '{}'", target)
            }
            CoreError::InvalidGate(msg) => write!(f, "Invalid Gate Error: {}", msg),
            CoreError::TypeMismatch { op, left, right } => {
                write!(f, "Type Mismatch Error: '{}' on {} and {}", op, left, right)
            }
            CoreError::Simulation(msg) => write!(f, "Simulation Error: {}", msg),
            CoreError::Internal(msg) => write!(f, "Internal Error: {}", msg),
        }
    }
}

impl std::error::Error for CoreError {}

impl CoreError {
    pub fn memory_lookup(scope: impl fmt::Display, func: &str, var: &str) -> Self {
        CoreError::MemoryLookup {
            scope: scope.to_string(),
            func: func.to_string(),
            var: var.to_string(),
        }
    }
    pub fn unknown_builtin(name: &str) -> Self {
        CoreError::UnknownBuiltin { name: name.to_string() }
    }
    pub fn unsupported_reduction(target: impl fmt::Display) -> Self {
        CoreError::UnsupportedReduction { target: target.to_string() }
    }
    pub fn invalid_gate(msg: impl Into<String>) -> Self {
        CoreError::InvalidGate(msg.into())
    }
    pub fn type_mismatch(op: &str, left: impl fmt::Display, right: impl fmt::Display) -> Self {
        CoreError::TypeMismatch {
            op: op.to_string(),
            left: left.to_string(),
            right: right.to_string(),
        }
    }
    pub fn simulation(msg: impl Into<String>) -> Self {
        CoreError::Simulation(msg.into())
    }
    pub fn internal(msg: impl Into<String>) -> Self {
        CoreError::Internal(msg.into())
    }
}
