//! Runtime value representation flowing between graph nodes.
//!
//! [`Value`] is the dynamic currency of the composer: every node produces a
//! `Value` and consumes the `Value`s of its resolved predecessors. The enum is
//! closed and serde-serializable, which is what lets cache backends persist
//! results and hash parameter values canonically.
//!
//! [`ValueType`] is the static counterpart used by parameter declarations.
//! The only implicit conversion in the system is integer widening: a declared
//! `Float` parameter accepts an `Int` value.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A runtime value produced or consumed by a graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    /// String-keyed mapping. `BTreeMap` keeps the encoding canonical, which
    /// content signatures rely on.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Returns the [`ValueType`] of this value's variant.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Unit => ValueType::Unit,
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::Str(_) => ValueType::Str,
            Value::Bytes(_) => ValueType::Bytes,
            Value::List(_) => ValueType::List,
            Value::Map(_) => ValueType::Map,
        }
    }

    /// Returns a human-readable description of the value's type.
    pub fn type_name(&self) -> &'static str {
        self.value_type().name()
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as `f64`. Integers widen.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

/// The declared type of a parameter node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    Unit,
    Bool,
    Int,
    Float,
    Str,
    Bytes,
    List,
    Map,
}

impl ValueType {
    /// The type of the given value.
    pub fn of(value: &Value) -> ValueType {
        value.value_type()
    }

    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Unit => "Unit",
            ValueType::Bool => "Bool",
            ValueType::Int => "Int",
            ValueType::Float => "Float",
            ValueType::Str => "Str",
            ValueType::Bytes => "Bytes",
            ValueType::List => "List",
            ValueType::Map => "Map",
        }
    }

    /// Returns `true` if a value of this declared type may hold `value`.
    ///
    /// `Float` admits `Int` (the value widens on [`ValueType::coerce`]).
    pub fn admits(&self, value: &Value) -> bool {
        match (self, value) {
            (ValueType::Float, Value::Int(_)) => true,
            _ => *self == value.value_type(),
        }
    }

    /// Coerces `value` to this declared type, widening `Int` to `Float`.
    ///
    /// Returns `None` when the value does not satisfy the type.
    pub fn coerce(&self, value: Value) -> Option<Value> {
        match (self, value) {
            (ValueType::Float, Value::Int(v)) => Some(Value::Float(v as f64)),
            (ty, value) if *ty == value.value_type() => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
