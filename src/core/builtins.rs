// src/core/builtins.rs
//! Builtin table: every callable operator/gate the language ships,
//! keyed by name, each carrying its application mode.
//!
//! Morpher builtins fold their arguments with the current cell value
//! and write back per index. Appender builtins turn index tuples into
//! circuit fragments. Nuller builtins read for side effect only.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::core::error::CoreError;
use crate::core::gate::GateOp;
use crate::core::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    Morpher,
    Appender,
    Nuller,
}

pub type ClassicalFn = fn(&Value, &Value) -> Result<Value, CoreError>;

#[derive(Debug, Clone, Copy)]
pub enum BuiltinKind {
    /// Binary value combiner, folded left over the argument list.
    Classical(ClassicalFn),
    /// Unary value transform.
    Unary(fn(&Value) -> Result<Value, CoreError>),
    Gate(GateOp),
    Print,
}

#[derive(Debug, Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub mode: ApplyMode,
    pub kind: BuiltinKind,
}

fn cmp_gt(a: &Value, b: &Value) -> Result<Value, CoreError> {
    Ok(Value::Bool(a.cmp_value(b, "gt")?.is_gt()))
}
fn cmp_gte(a: &Value, b: &Value) -> Result<Value, CoreError> {
    Ok(Value::Bool(a.cmp_value(b, "gte")?.is_ge()))
}
fn cmp_lt(a: &Value, b: &Value) -> Result<Value, CoreError> {
    Ok(Value::Bool(a.cmp_value(b, "lt")?.is_lt()))
}
fn cmp_lte(a: &Value, b: &Value) -> Result<Value, CoreError> {
    Ok(Value::Bool(a.cmp_value(b, "lte")?.is_le()))
}
fn cmp_eq(a: &Value, b: &Value) -> Result<Value, CoreError> {
    Ok(Value::Bool(a.eq_value(b)?))
}
fn cmp_neq(a: &Value, b: &Value) -> Result<Value, CoreError> {
    Ok(Value::Bool(!a.eq_value(b)?))
}

static TABLE: Lazy<HashMap<&'static str, Builtin>> = Lazy::new(|| {
    let mut t = HashMap::new();
    let mut put = |name: &'static str, mode: ApplyMode, kind: BuiltinKind| {
        t.insert(name, Builtin { name, mode, kind });
    };

    // Classical transforms.
    put("add", ApplyMode::Morpher, BuiltinKind::Classical(Value::add));
    put("times", ApplyMode::Morpher, BuiltinKind::Classical(Value::times));
    put("div", ApplyMode::Morpher, BuiltinKind::Classical(Value::div));
    put("pow", ApplyMode::Morpher, BuiltinKind::Classical(Value::pow));
    put("sqrt", ApplyMode::Morpher, BuiltinKind::Unary(Value::sqrt));
    put("eq", ApplyMode::Morpher, BuiltinKind::Classical(cmp_eq));
    put("neq", ApplyMode::Morpher, BuiltinKind::Classical(cmp_neq));
    put("gt", ApplyMode::Morpher, BuiltinKind::Classical(cmp_gt));
    put("gte", ApplyMode::Morpher, BuiltinKind::Classical(cmp_gte));
    put("lt", ApplyMode::Morpher, BuiltinKind::Classical(cmp_lt));
    put("lte", ApplyMode::Morpher, BuiltinKind::Classical(cmp_lte));
    put("and", ApplyMode::Morpher, BuiltinKind::Classical(Value::logical_and));
    put("or", ApplyMode::Morpher, BuiltinKind::Classical(Value::logical_or));
    put("not", ApplyMode::Morpher, BuiltinKind::Unary(Value::logical_not));

    // Gates.
    put("@h", ApplyMode::Appender, BuiltinKind::Gate(GateOp::H));
    put("@x", ApplyMode::Appender, BuiltinKind::Gate(GateOp::X));
    put("@z", ApplyMode::Appender, BuiltinKind::Gate(GateOp::Z));
    put("@cnot", ApplyMode::Appender, BuiltinKind::Gate(GateOp::Cnot));
    put("@swap", ApplyMode::Appender, BuiltinKind::Gate(GateOp::Swap));
    put("@cz", ApplyMode::Appender, BuiltinKind::Gate(GateOp::Cz));
    put("@toffoli", ApplyMode::Appender, BuiltinKind::Gate(GateOp::Toffoli));

    // Side effects.
    put("print", ApplyMode::Nuller, BuiltinKind::Print);

    t
});

pub fn lookup(name: &str) -> Result<Builtin, CoreError> {
    TABLE
        .get(name)
        .copied()
        .ok_or_else(|| CoreError::unknown_builtin(name))
}

pub fn is_builtin(name: &str) -> bool {
    TABLE.contains_key(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_are_static_per_builtin() {
        assert_eq!(lookup("add").unwrap().mode, ApplyMode::Morpher);
        assert_eq!(lookup("@h").unwrap().mode, ApplyMode::Appender);
        assert_eq!(lookup("print").unwrap().mode, ApplyMode::Nuller);
    }

    #[test]
    fn unknown_name_is_an_error() {
        let err = lookup("frobnicate").unwrap_err();
        assert!(matches!(err, CoreError::UnknownBuiltin { .. }));
    }

    #[test]
    fn gate_builtins_carry_their_operator() {
        match lookup("@cnot").unwrap().kind {
            BuiltinKind::Gate(op) => assert_eq!(op, GateOp::Cnot),
            _ => panic!("expected gate builtin"),
        }
    }

    #[test]
    fn classical_fold_applies() {
        match lookup("add").unwrap().kind {
            BuiltinKind::Classical(f) => {
                assert_eq!(f(&Value::Int(3), &Value::Int(4)).unwrap(), Value::Int(7));
            }
            _ => panic!("expected classical builtin"),
        }
    }
}
