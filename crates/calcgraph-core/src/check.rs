//! Construction diagnostics: cycles and unbound references.
//!
//! `check` never fails; it yields [`Diagnostic`] records a caller may
//! escalate to [`GraphError`](crate::error::GraphError)s. The executor does
//! so before running. The `type` field of the serialized record is the
//! stable contract; message wording is not.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::dag::Dag;
use crate::node::Node;
use crate::resolve::{resolve_node, Binding};

/// One finding about a function graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Diagnostic {
    /// The graph contains a cycle; `nodes` names one representative cycle.
    Cycle { nodes: Vec<String>, message: String },
    /// A required predecessor resolves to no registered node.
    Unbound {
        name: String,
        referers: Vec<String>,
        message: String,
    },
}

impl Diagnostic {
    /// The stable record kind: `"cycle"` or `"unbound"`.
    pub fn kind(&self) -> &'static str {
        match self {
            Diagnostic::Cycle { .. } => "cycle",
            Diagnostic::Unbound { .. } => "unbound",
        }
    }

    fn cycle(nodes: Vec<String>) -> Diagnostic {
        let message = format!(
            "cycle found [{}]; the function graph must be acyclic",
            nodes.join(", ")
        );
        Diagnostic::Cycle { nodes, message }
    }

    fn unbound(name: String, referers: Vec<String>) -> Diagnostic {
        let message = format!("unbound function '{name}' required");
        Diagnostic::Unbound {
            name,
            referers,
            message,
        }
    }
}

/// Collects all unbound references among the dag's consumers.
///
/// Returns `unbound name -> sorted referring consumers`.
pub fn unbound_references(
    functions: &BTreeMap<String, Node>,
    dag: &Dag,
) -> BTreeMap<String, Vec<String>> {
    let mut unbound: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for consumer in dag.node_names() {
        for resolved in resolve_node(functions, consumer) {
            if let Binding::Unbound(name) = resolved.binding {
                unbound.entry(name).or_default().push(consumer.to_string());
            }
        }
    }
    for referers in unbound.values_mut() {
        referers.sort_unstable();
        referers.dedup();
    }
    unbound
}

/// Runs all checks over the given dag, cycle diagnostics first.
pub fn check_graph(functions: &BTreeMap<String, Node>, dag: &Dag) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    if let Some(nodes) = dag.find_cycle() {
        diagnostics.push(Diagnostic::cycle(nodes));
    }
    for (name, referers) in unbound_references(functions, dag) {
        diagnostics.push(Diagnostic::unbound(name, referers));
    }
    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Func;
    use crate::param::ParamDescriptor;
    use crate::value::Value;

    fn func(name: &str, deps: &[&str]) -> (String, Node) {
        (
            name.to_string(),
            Node::Function(Func::new(
                name,
                name,
                deps.iter().map(|d| ParamDescriptor::required(*d)).collect(),
                |_| Ok(Value::Unit),
            )),
        )
    }

    #[test]
    fn clean_graph_yields_nothing() {
        let functions: BTreeMap<String, Node> =
            [func("a", &[]), func("b", &["a"])].into_iter().collect();
        let dag = Dag::build(&functions);
        assert!(check_graph(&functions, &dag).is_empty());
    }

    #[test]
    fn cycle_reported_once_with_all_members() {
        let functions: BTreeMap<String, Node> =
            [func("a", &["c"]), func("b", &["a"]), func("c", &["b"])]
                .into_iter()
                .collect();
        let dag = Dag::build(&functions);
        let diagnostics = check_graph(&functions, &dag);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind(), "cycle");
        match &diagnostics[0] {
            Diagnostic::Cycle { nodes, .. } => {
                let mut sorted = nodes.clone();
                sorted.sort();
                assert_eq!(sorted, vec!["a", "b", "c"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn unbound_lists_every_referer() {
        let functions: BTreeMap<String, Node> =
            [func("x", &["missing"]), func("y", &["missing"])]
                .into_iter()
                .collect();
        let dag = Dag::build(&functions);
        let diagnostics = check_graph(&functions, &dag);
        assert_eq!(diagnostics.len(), 1);
        match &diagnostics[0] {
            Diagnostic::Unbound { name, referers, .. } => {
                assert_eq!(name, "missing");
                assert_eq!(referers, &["x", "y"]);
            }
            other => panic!("expected unbound, got {other:?}"),
        }
    }

    #[test]
    fn default_parameter_is_not_unbound() {
        let mut functions = BTreeMap::new();
        functions.insert(
            "f".to_string(),
            Node::Function(Func::new(
                "f",
                "f",
                vec![ParamDescriptor::with_default("missing", 1i64)],
                |_| Ok(Value::Unit),
            )),
        );
        let dag = Dag::build(&functions);
        assert!(check_graph(&functions, &dag).is_empty());
    }

    #[test]
    fn serialized_record_carries_type_tag() {
        let diagnostic = Diagnostic::unbound("q".to_string(), vec!["f".to_string()]);
        let json = serde_json::to_value(&diagnostic).unwrap();
        assert_eq!(json["type"], "unbound");
        assert_eq!(json["name"], "q");
    }
}
