//! Formal parameter descriptors.
//!
//! The engine never introspects callables. Every registered function carries
//! an explicit, ordered list of [`ParamDescriptor`]s, and the resolver and
//! executor work from those alone. The descriptor names double as the
//! dependency declaration: a parameter named `a` binds to the node `a` (or a
//! namespaced shadow of it).

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// How a formal parameter receives its argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamKind {
    /// Delivered by position only.
    Positional,
    /// Delivered by position, or by name once a variadic-positional parameter
    /// precedes it in the descriptor list.
    PositionalOrKeyword,
    /// Delivered by name only.
    KeywordOnly,
    /// Collects every node whose name extends the parameter name as a prefix,
    /// as an ordered list.
    VarPositional,
    /// Collects every node whose name extends the parameter name as a prefix,
    /// as a name-keyed mapping.
    VarKeyword,
}

/// A single formal parameter of a registered function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDescriptor {
    /// Formal name, used for dependency resolution.
    pub name: String,
    pub kind: ParamKind,
    /// Default value. A parameter with a default is optional: when its name
    /// resolves to no node, the edge is dropped and the default is used at
    /// call time.
    pub default: Option<Value>,
}

impl ParamDescriptor {
    /// A required positional-or-keyword parameter. The common case.
    pub fn required(name: impl Into<String>) -> Self {
        ParamDescriptor {
            name: name.into(),
            kind: ParamKind::PositionalOrKeyword,
            default: None,
        }
    }

    /// A positional-or-keyword parameter with a default value.
    pub fn with_default(name: impl Into<String>, default: impl Into<Value>) -> Self {
        ParamDescriptor {
            name: name.into(),
            kind: ParamKind::PositionalOrKeyword,
            default: Some(default.into()),
        }
    }

    pub fn positional_only(name: impl Into<String>) -> Self {
        ParamDescriptor {
            name: name.into(),
            kind: ParamKind::Positional,
            default: None,
        }
    }

    pub fn keyword_only(name: impl Into<String>) -> Self {
        ParamDescriptor {
            name: name.into(),
            kind: ParamKind::KeywordOnly,
            default: None,
        }
    }

    /// A variadic-positional parameter (fan-in list).
    pub fn var_positional(name: impl Into<String>) -> Self {
        ParamDescriptor {
            name: name.into(),
            kind: ParamKind::VarPositional,
            default: None,
        }
    }

    /// A variadic-keyword parameter (fan-in mapping).
    pub fn var_keyword(name: impl Into<String>) -> Self {
        ParamDescriptor {
            name: name.into(),
            kind: ParamKind::VarKeyword,
            default: None,
        }
    }

    pub fn is_variadic(&self) -> bool {
        matches!(self.kind, ParamKind::VarPositional | ParamKind::VarKeyword)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_has_no_default() {
        let p = ParamDescriptor::required("a");
        assert_eq!(p.name, "a");
        assert_eq!(p.kind, ParamKind::PositionalOrKeyword);
        assert!(p.default.is_none());
        assert!(!p.is_variadic());
    }

    #[test]
    fn with_default_converts_value() {
        let p = ParamDescriptor::with_default("b", 3i64);
        assert_eq!(p.default, Some(Value::Int(3)));
    }

    #[test]
    fn variadic_kinds() {
        assert!(ParamDescriptor::var_positional("args_").is_variadic());
        assert!(ParamDescriptor::var_keyword("kwargs_").is_variadic());
        assert!(!ParamDescriptor::keyword_only("k").is_variadic());
    }
}
