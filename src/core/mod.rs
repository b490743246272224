// src/core/mod.rs

pub mod ast;
pub mod builtins;
pub mod debug;
pub mod error;
pub mod evaluator;
pub mod gate;
pub mod memory;
pub mod qasm;
pub mod value;
