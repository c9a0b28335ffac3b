//! Composition and execution for the calcgraph function graph.
//!
//! [`Composer`] is the user-facing entry point: register named functions
//! whose parameter names declare their dependencies, attach a cache backend,
//! and pull results with `calculate`. Planning classifies every ancestor of
//! the requested outputs as calculate, retrieve, or ignore against the cache
//! state; execution walks that plan once, in deterministic topological
//! order, evicting intermediate values as their consumers finish.
//!
//! # Example
//!
//! ```
//! use calcgraph_compose::Composer;
//! use calcgraph_core::node::Func;
//! use calcgraph_core::param::ParamDescriptor;
//! use calcgraph_core::value::Value;
//!
//! let composer = Composer::new().update([
//!     Func::new("a", "a=5", vec![], |_| Ok(Value::Int(5))),
//!     Func::new("b", "b=a*5", vec![ParamDescriptor::required("a")], |args| {
//!         Ok(Value::Int(args.int("a")? * 5))
//!     }),
//! ]);
//! assert_eq!(composer.call("b").unwrap(), Value::Int(25));
//! ```

pub mod composer;
pub mod error;
pub mod event;
pub mod executor;
pub mod plan;
pub mod profile;

// Re-export commonly used types
pub use composer::{Composer, ParamSpec, TestCase, TestResult};
pub use error::{CalcError, Calculation, Failure};
pub use event::Event;
pub use executor::CalcOptions;
pub use plan::Instruction;
pub use profile::{NodeProfile, Profiler};
