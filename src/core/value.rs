// src/core/value.rs
//! Value model: tagged scalar values with per-type operator semantics.
//!
//! Booleans follow the language's algebra: `add` is conjunction and
//! `times` is disjunction. Strings concatenate under `add`. Numeric
//! values mix int/float by widening to float.

use std::fmt;

use crate::core::error::CoreError;

/// Declared type of a memory slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Bool,
    Int,
    Float,
    Str,
    Atomic,
    Hashmap,
    Measurement,
    Circuit,
    Null,
}

impl TypeTag {
    pub fn parse(name: &str) -> Option<TypeTag> {
        match name {
            "bool" => Some(TypeTag::Bool),
            "int" => Some(TypeTag::Int),
            "float" => Some(TypeTag::Float),
            "str" => Some(TypeTag::Str),
            "atomic" => Some(TypeTag::Atomic),
            "hashmap" => Some(TypeTag::Hashmap),
            "measurement" => Some(TypeTag::Measurement),
            "circuit" => Some(TypeTag::Circuit),
            "null" => Some(TypeTag::Null),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TypeTag::Bool => "bool",
            TypeTag::Int => "int",
            TypeTag::Float => "float",
            TypeTag::Str => "str",
            TypeTag::Atomic => "atomic",
            TypeTag::Hashmap => "hashmap",
            TypeTag::Measurement => "measurement",
            TypeTag::Circuit => "circuit",
            TypeTag::Null => "null",
        }
    }

    /// Default cell value used when a slot is created or resized.
    pub fn default_value(&self) -> Value {
        match self {
            TypeTag::Bool => Value::Bool(false),
            TypeTag::Int => Value::Int(0),
            TypeTag::Float => Value::Float(0.0),
            TypeTag::Str => Value::Str(String::new()),
            TypeTag::Atomic => Value::Atomic(String::new()),
            _ => Value::Null,
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Atomic(String),
}

impl Value {
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Null => TypeTag::Null,
            Value::Bool(_) => TypeTag::Bool,
            Value::Int(_) => TypeTag::Int,
            Value::Float(_) => TypeTag::Float,
            Value::Str(_) => TypeTag::Str,
            Value::Atomic(_) => TypeTag::Atomic,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn add(&self, other: &Value) -> Result<Value, CoreError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a
                .checked_add(*b)
                .map(Value::Int)
                .ok_or_else(|| CoreError::type_mismatch("add", "int", "overflow")),
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a && *b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => Ok(Value::Float(x + y)),
                _ => Err(CoreError::type_mismatch("add", a.type_tag(), b.type_tag())),
            },
        }
    }

    pub fn times(&self, other: &Value) -> Result<Value, CoreError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a
                .checked_mul(*b)
                .map(Value::Int)
                .ok_or_else(|| CoreError::type_mismatch("times", "int", "overflow")),
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a || *b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => Ok(Value::Float(x * y)),
                _ => Err(CoreError::type_mismatch("times", a.type_tag(), b.type_tag())),
            },
        }
    }

    pub fn div(&self, other: &Value) -> Result<Value, CoreError> {
        match (self, other) {
            (Value::Int(_), Value::Int(0)) => {
                Err(CoreError::type_mismatch("div", "int", "zero"))
            }
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a / b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => Ok(Value::Float(x / y)),
                _ => Err(CoreError::type_mismatch("div", a.type_tag(), b.type_tag())),
            },
        }
    }

    pub fn pow(&self, other: &Value) -> Result<Value, CoreError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) if *b >= 0 => u32::try_from(*b)
                .ok()
                .and_then(|e| a.checked_pow(e))
                .map(Value::Int)
                .ok_or_else(|| CoreError::type_mismatch("pow", "int", "overflow")),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => Ok(Value::Float(x.powf(y))),
                _ => Err(CoreError::type_mismatch("pow", a.type_tag(), b.type_tag())),
            },
        }
    }

    pub fn sqrt(&self) -> Result<Value, CoreError> {
        match self.as_f64() {
            Some(x) if x >= 0.0 => Ok(Value::Float(x.sqrt())),
            _ => Err(CoreError::type_mismatch("sqrt", self.type_tag(), "non-negative number")),
        }
    }

    pub fn logical_and(&self, other: &Value) -> Result<Value, CoreError> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a && *b)),
            (a, b) => Err(CoreError::type_mismatch("and", a.type_tag(), b.type_tag())),
        }
    }

    pub fn logical_or(&self, other: &Value) -> Result<Value, CoreError> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a || *b)),
            (a, b) => Err(CoreError::type_mismatch("or", a.type_tag(), b.type_tag())),
        }
    }

    pub fn logical_not(&self) -> Result<Value, CoreError> {
        match self {
            Value::Bool(a) => Ok(Value::Bool(!a)),
            other => Err(CoreError::type_mismatch("not", other.type_tag(), "bool")),
        }
    }

    /// Structural equality; comparable types only.
    pub fn eq_value(&self, other: &Value) -> Result<bool, CoreError> {
        match (self, other) {
            (Value::Null, Value::Null) => Ok(true),
            (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
            (Value::Str(a), Value::Str(b)) => Ok(a == b),
            (Value::Atomic(a), Value::Atomic(b)) => Ok(a == b),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => Ok(x == y),
                _ => Err(CoreError::type_mismatch("eq", a.type_tag(), b.type_tag())),
            },
        }
    }

    /// Numeric/string ordering; anything else is a type mismatch.
    pub fn cmp_value(&self, other: &Value, op: &str) -> Result<std::cmp::Ordering, CoreError> {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x
                    .partial_cmp(&y)
                    .ok_or_else(|| CoreError::type_mismatch(op, "nan", "number")),
                _ => Err(CoreError::type_mismatch(op, a.type_tag(), b.type_tag())),
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(true) => write!(f, "T"),
            Value::Bool(false) => write!(f, "F"),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
            Value::Atomic(s) => write!(f, "{}", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_add_and_times() {
        assert_eq!(Value::Int(3).add(&Value::Int(5)).unwrap(), Value::Int(8));
        assert_eq!(Value::Int(3).times(&Value::Int(5)).unwrap(), Value::Int(15));
    }

    #[test]
    fn mixed_numeric_widens_to_float() {
        assert_eq!(
            Value::Int(1).add(&Value::Float(0.5)).unwrap(),
            Value::Float(1.5)
        );
    }

    #[test]
    fn bool_algebra_add_is_conjunction() {
        assert_eq!(
            Value::Bool(true).add(&Value::Bool(false)).unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            Value::Bool(true).times(&Value::Bool(false)).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn int_overflow_is_an_error() {
        let err = Value::Int(i64::MAX).add(&Value::Int(1)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Type Mismatch Error: 'add' on int and overflow"
        );
        assert!(Value::Int(i64::MAX).times(&Value::Int(2)).is_err());
        assert!(Value::Int(2).pow(&Value::Int(64)).is_err());
        assert!(Value::Int(2).pow(&Value::Int(i64::MAX)).is_err());
    }

    #[test]
    fn str_add_concatenates() {
        assert_eq!(
            Value::Str("ab".into()).add(&Value::Str("cd".into())).unwrap(),
            Value::Str("abcd".into())
        );
    }

    #[test]
    fn incompatible_add_is_type_mismatch() {
        let err = Value::Bool(true).add(&Value::Str("x".into())).unwrap_err();
        assert!(matches!(err, CoreError::TypeMismatch { .. }));
    }

    #[test]
    fn resize_defaults_per_type() {
        assert_eq!(TypeTag::Int.default_value(), Value::Int(0));
        assert_eq!(TypeTag::Str.default_value(), Value::Str(String::new()));
        assert_eq!(TypeTag::Bool.default_value(), Value::Bool(false));
    }
}
