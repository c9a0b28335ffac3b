//! Core data model and graph engine for the calcgraph function composer.
//!
//! This crate owns everything below execution: the dynamic [`Value`] model,
//! explicit parameter descriptors, the three-kind [`Node`] sum, namespace
//! name resolution, the derived dependency [`Dag`], and construction
//! diagnostics. Caching lives in `calcgraph-cache`; planning, execution, and
//! the composer facade live in `calcgraph-compose`.

pub mod check;
pub mod dag;
pub mod error;
pub mod node;
pub mod param;
pub mod resolve;
pub mod value;

// Re-export commonly used types
pub use check::{check_graph, unbound_references, Diagnostic};
pub use dag::Dag;
pub use error::GraphError;
pub use node::{CallArgs, FnError, Func, Link, Node, NodeFn, ParamLeaf, TestFn};
pub use param::{ParamDescriptor, ParamKind};
pub use resolve::{
    namespace_candidates, resolve_node, resolve_parameter, Binding, FaninEntry, ResolvedParam,
};
pub use value::{Value, ValueType};
