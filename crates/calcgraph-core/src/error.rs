//! Core error types for calcgraph-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering graph
//! construction and registration failures. Execution-time failures live in
//! the composing crate's error type.

use thiserror::Error;

use crate::value::ValueType;

/// Errors produced while building or validating a function graph.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A requested output is not a registered node.
    #[error("'{name}' is not a composed function in this graph")]
    UnknownOutput { name: String },

    /// The graph contains a cycle; `nodes` is one representative cycle.
    #[error("cycle found [{}]; the function graph must be acyclic", nodes.join(", "))]
    Cycle { nodes: Vec<String> },

    /// A required predecessor resolves to no registered node.
    #[error("unbound function '{name}' required by [{}]", referers.join(", "))]
    Unbound {
        name: String,
        referers: Vec<String>,
    },

    /// A parameter value does not satisfy its declared type.
    #[error("parameter '{name}' expects {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: ValueType,
        actual: String,
    },

    /// A name passed to an affix-stripping update lacks the affix.
    #[error("name '{name}' does not carry the required affix '{affix}'")]
    AffixMissing { name: String, affix: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offender() {
        let err = GraphError::UnknownOutput {
            name: "nope".to_string(),
        };
        assert!(err.to_string().contains("nope"));

        let err = GraphError::Cycle {
            nodes: vec!["a".to_string(), "b".to_string()],
        };
        assert!(err.to_string().contains("a, b"));

        let err = GraphError::TypeMismatch {
            name: "p".to_string(),
            expected: ValueType::Float,
            actual: "Str".to_string(),
        };
        assert!(err.to_string().contains("Float"));
    }
}
