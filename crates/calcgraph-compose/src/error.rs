//! Execution error types with node context.
//!
//! Construction failures (unknown outputs, cycles, unbound references, type
//! mismatches) come through from calcgraph-core unchanged; execution adds
//! the two failure kinds that can only happen while running: a user function
//! returning an error and a cache backend failing mid-operation. Both carry
//! the offending node's name.

use std::collections::BTreeMap;

use thiserror::Error;

use calcgraph_cache::error::CacheError;
use calcgraph_core::error::GraphError;
use calcgraph_core::node::FnError;
use calcgraph_core::value::Value;

/// Errors surfaced by calculation and composer maintenance operations.
#[derive(Debug, Error)]
pub enum CalcError {
    /// A graph construction or validation failure.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// A registered function returned an error.
    #[error("function '{node}' failed")]
    UserFunction {
        node: String,
        #[source]
        source: FnError,
    },

    /// A cache backend operation failed.
    #[error("cache {operation} failed for node '{node}'")]
    Cache {
        node: String,
        operation: &'static str,
        #[source]
        source: CacheError,
    },
}

impl CalcError {
    /// The node this error is attached to, when there is one.
    pub fn node(&self) -> Option<&str> {
        match self {
            CalcError::Graph(_) => None,
            CalcError::UserFunction { node, .. } | CalcError::Cache { node, .. } => Some(node),
        }
    }
}

/// A captured execution failure in collect mode.
#[derive(Debug)]
pub struct Failure {
    /// The node whose step failed.
    pub node: String,
    pub error: CalcError,
}

/// The outcome of a collect-mode calculation: the results produced before
/// the failure (all of them, when `failure` is `None`).
#[derive(Debug, Default)]
pub struct Calculation {
    pub results: BTreeMap<String, Value>,
    pub failure: Option<Failure>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_failure_names_the_node() {
        let err = CalcError::UserFunction {
            node: "b".to_string(),
            source: "boom".into(),
        };
        assert_eq!(err.node(), Some("b"));
        assert!(err.to_string().contains("'b'"));
    }

    #[test]
    fn graph_errors_pass_through() {
        let err = CalcError::from(GraphError::UnknownOutput {
            name: "x".to_string(),
        });
        assert_eq!(err.node(), None);
        assert!(err.to_string().contains("'x'"));
    }
}
