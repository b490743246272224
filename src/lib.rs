// src/lib.rs
//! arqon: evaluation core of a small hybrid classical/quantum language.
//!
//! Scoped typed memory, an AST-walking evaluator threading an owned
//! context, builtin operator/gate dispatch with three application
//! modes, and an OpenQASM 2.0 bridge with a local statevector
//! simulator.

pub mod config;
pub mod core;

pub use crate::core::ast::{AstNode, CallTarget, IndexSpec, Literal, NodeKind, Param};
pub use crate::core::error::CoreError;
pub use crate::core::evaluator::{Evaluator, Outcome, SectionKey, Stats};
pub use crate::core::gate::{Fragment, Gate, GateArray, GateOp, IndexTuple};
pub use crate::core::memory::{Key, Memory, ScopeKind, Slot, SlotData};
pub use crate::core::qasm::{
    compile, reduce, Distribution, LocalSimulator, Reduced, Simulator, READ_SHOTS, STMT_SHOTS,
};
pub use crate::core::value::{TypeTag, Value};
pub use crate::config::Config;
