//! Graph node model.
//!
//! [`Node`] is a closed sum with three kinds:
//! - [`Func`]: a named callable plus its parameter descriptors. The callable
//!   is opaque to the engine; its identity for cache purposes is the explicit
//!   content tag.
//! - [`ParamLeaf`]: a constant leaf, logically a nullary function returning
//!   its value. Tracked as its own variant so caches can hash the value
//!   rather than a tag.
//! - [`Link`]: a symbolic rename, lowered to a single-argument identity
//!   function whose only formal parameter is the link target. Resolving the
//!   target relative to the link's own name is what makes links transparent
//!   under namespacing.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::param::ParamDescriptor;
use crate::value::{Value, ValueType};

/// Error type user callables may fail with.
pub type FnError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The callable body of a function node.
pub type NodeFn = Arc<dyn Fn(&CallArgs) -> Result<Value, FnError> + Send + Sync>;

/// A registered test body. Asserts by returning an error.
pub type TestFn = Arc<dyn Fn(&CallArgs) -> Result<(), FnError> + Send + Sync>;

/// Arguments assembled for one invocation, grouped by delivery kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    /// Positionally delivered arguments, with their formal names retained.
    pub positional: Vec<(String, Value)>,
    /// Variadic-positional fan-in, sorted by producing node name.
    pub var_positional: Vec<Value>,
    /// Keyword-delivered arguments by formal name.
    pub keyword: BTreeMap<String, Value>,
    /// Variadic-keyword fan-in, keyed by the suffix after the fan-in prefix.
    pub var_keyword: BTreeMap<String, Value>,
}

impl CallArgs {
    /// Looks up a non-variadic argument by formal name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.positional
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .or_else(|| self.keyword.get(name))
    }

    /// Required argument accessor; errors name the missing formal.
    pub fn value(&self, name: &str) -> Result<&Value, FnError> {
        self.get(name)
            .ok_or_else(|| format!("missing argument '{name}'").into())
    }

    pub fn int(&self, name: &str) -> Result<i64, FnError> {
        let value = self.value(name)?;
        value
            .as_int()
            .ok_or_else(|| format!("argument '{name}' is {}, expected Int", value.type_name()).into())
    }

    /// Float accessor; integer arguments widen.
    pub fn float(&self, name: &str) -> Result<f64, FnError> {
        let value = self.value(name)?;
        value.as_float().ok_or_else(|| {
            format!("argument '{name}' is {}, expected Float", value.type_name()).into()
        })
    }

    pub fn str(&self, name: &str) -> Result<&str, FnError> {
        let value = self.value(name)?;
        value
            .as_str()
            .ok_or_else(|| format!("argument '{name}' is {}, expected Str", value.type_name()).into())
    }
}

/// A named function node.
#[derive(Clone)]
pub struct Func {
    pub name: String,
    /// Stands in for the function's source text: two functions are the same
    /// for cache validity iff their tags are equal.
    pub content_tag: String,
    pub params: Vec<ParamDescriptor>,
    pub body: NodeFn,
}

impl Func {
    pub fn new(
        name: impl Into<String>,
        content_tag: impl Into<String>,
        params: Vec<ParamDescriptor>,
        body: impl Fn(&CallArgs) -> Result<Value, FnError> + Send + Sync + 'static,
    ) -> Self {
        Func {
            name: name.into(),
            content_tag: content_tag.into(),
            params,
            body: Arc::new(body),
        }
    }

    /// Returns this function registered under a different name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// A nullary function returning a fixed value. Used to bake
    /// pre-calculated results into a composer.
    pub fn constant(
        name: impl Into<String>,
        content_tag: impl Into<String>,
        value: Value,
    ) -> Self {
        Func::new(name, content_tag, Vec::new(), move |_| Ok(value.clone()))
    }
}

impl fmt::Debug for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Func")
            .field("name", &self.name)
            .field("content_tag", &self.content_tag)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// A constant leaf node with a declared type.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamLeaf {
    pub name: String,
    pub ty: ValueType,
    pub value: Value,
}

/// A symbolic rename of one node to another.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub name: String,
    params: Vec<ParamDescriptor>,
}

impl Link {
    pub fn new(name: impl Into<String>, target: impl Into<String>) -> Self {
        Link {
            name: name.into(),
            params: vec![ParamDescriptor::required(target)],
        }
    }

    /// The target expression the link forwards to.
    pub fn target(&self) -> &str {
        &self.params[0].name
    }

    pub fn params(&self) -> &[ParamDescriptor] {
        &self.params
    }
}

/// A node in the function graph.
#[derive(Debug, Clone)]
pub enum Node {
    Function(Func),
    Parameter(ParamLeaf),
    Link(Link),
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Node::Function(f) => &f.name,
            Node::Parameter(p) => &p.name,
            Node::Link(l) => &l.name,
        }
    }

    /// The node's formal parameters. Empty for parameter leaves; the single
    /// target expression for links.
    pub fn params(&self) -> &[ParamDescriptor] {
        match self {
            Node::Function(f) => &f.params,
            Node::Parameter(_) => &[],
            Node::Link(l) => l.params(),
        }
    }

    pub fn is_link(&self) -> bool {
        matches!(self, Node::Link(_))
    }

    /// Renames the node in place. Used when merging under a namespace prefix.
    pub fn set_name(&mut self, name: String) {
        match self {
            Node::Function(f) => f.name = name,
            Node::Parameter(p) => p.name = name,
            Node::Link(l) => l.name = name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_args_lookup_prefers_positional() {
        let mut args = CallArgs::default();
        args.positional.push(("a".to_string(), Value::Int(1)));
        args.keyword.insert("b".to_string(), Value::Int(2));

        assert_eq!(args.get("a"), Some(&Value::Int(1)));
        assert_eq!(args.get("b"), Some(&Value::Int(2)));
        assert_eq!(args.get("c"), None);
        assert_eq!(args.int("a").unwrap(), 1);
        assert!(args.int("c").is_err());
    }

    #[test]
    fn call_args_float_widens() {
        let mut args = CallArgs::default();
        args.positional.push(("p".to_string(), Value::Int(4)));
        assert_eq!(args.float("p").unwrap(), 4.0);
    }

    #[test]
    fn func_invocation() {
        let f = Func::new(
            "double",
            "double:v1",
            vec![ParamDescriptor::required("a")],
            |args| Ok(Value::Int(args.int("a")? * 2)),
        );
        let mut args = CallArgs::default();
        args.positional.push(("a".to_string(), Value::Int(21)));
        assert_eq!((f.body)(&args).unwrap(), Value::Int(42));
    }

    #[test]
    fn constant_func_is_nullary() {
        let f = Func::constant("answer", "answer:baked", Value::Int(42));
        assert!(f.params.is_empty());
        assert_eq!((f.body)(&CallArgs::default()).unwrap(), Value::Int(42));
    }

    #[test]
    fn link_exposes_target_as_single_param() {
        let link = Link::new("b", "a");
        assert_eq!(link.target(), "a");
        assert_eq!(link.params().len(), 1);
        assert_eq!(link.params()[0].name, "a");

        let node = Node::Link(link);
        assert!(node.is_link());
        assert_eq!(node.params().len(), 1);
    }

    #[test]
    fn rename_updates_all_kinds() {
        let mut node = Node::Function(Func::constant("a", "t", Value::Unit));
        node.set_name("ns__a".to_string());
        assert_eq!(node.name(), "ns__a");
    }
}
