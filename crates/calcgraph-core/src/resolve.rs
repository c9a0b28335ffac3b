//! Name resolution: binding formal parameter names to producer nodes.
//!
//! A consumer node named `s0__s1__...__sN` lives in the namespace
//! `s0__...__s{N-1}`. A formal parameter `p` is looked up against the
//! candidate list
//!
//! ```text
//! s0__...__s{N-1}__p,  s0__...__s{N-2}__p,  ...,  s0__p,  p
//! ```
//!
//! most-specific prefix first, so an inner namespace shadows an outer one.
//! The first candidate registered in the functions registry wins. Links are
//! registered nodes themselves (identity functions over their target), so a
//! link shadows and is shadowed exactly like any other node.
//!
//! When no candidate matches, a parameter with a default is dropped from the
//! edge set ([`Binding::Default`]); one without a default becomes an unbound
//! reference carrying the least-specific candidate name, surfaced later by
//! `check`.
//!
//! Variadic parameters fan in instead: each candidate prefix is treated as a
//! name prefix, and the first (most specific) prefix level with any matching
//! nodes contributes all of them, sorted by node name.

use std::collections::BTreeMap;

use crate::node::Node;
use crate::param::ParamDescriptor;

/// One matched producer of a variadic fan-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaninEntry {
    /// The node name with the fan-in prefix stripped.
    pub suffix: String,
    /// The producing node.
    pub node: String,
}

/// The outcome of resolving a single formal parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// Bound to a registered node.
    Node(String),
    /// No candidate matched and the parameter has a default; the edge is
    /// dropped and the default is used at call time.
    Default,
    /// No candidate matched and the parameter has no default. Carries the
    /// least-specific candidate as the placeholder name.
    Unbound(String),
    /// Variadic fan-in, sorted by node name. May be empty.
    Fanin(Vec<FaninEntry>),
}

impl Binding {
    /// Names of the producer nodes this binding contributes edges from.
    pub fn producers(&self) -> Vec<&str> {
        match self {
            Binding::Node(name) => vec![name.as_str()],
            Binding::Fanin(entries) => entries.iter().map(|e| e.node.as_str()).collect(),
            Binding::Default | Binding::Unbound(_) => Vec::new(),
        }
    }
}

/// A formal parameter together with its resolved binding.
#[derive(Debug, Clone)]
pub struct ResolvedParam<'a> {
    pub descriptor: &'a ParamDescriptor,
    pub binding: Binding,
}

/// Builds the candidate list for `param` as seen from `consumer`,
/// most-specific prefix first. The bare parameter name is always last.
pub fn namespace_candidates(consumer: &str, param: &str) -> Vec<String> {
    let segments: Vec<&str> = consumer.split("__").collect();
    let mut candidates = Vec::with_capacity(segments.len());
    for depth in (0..segments.len()).rev() {
        let mut candidate = segments[..depth].join("__");
        if !candidate.is_empty() {
            candidate.push_str("__");
        }
        candidate.push_str(param);
        candidates.push(candidate);
    }
    candidates
}

/// Resolves one formal parameter of `consumer` against the registry.
pub fn resolve_parameter(
    functions: &BTreeMap<String, Node>,
    consumer: &str,
    descriptor: &ParamDescriptor,
) -> Binding {
    if descriptor.is_variadic() {
        return resolve_fanin(functions, consumer, descriptor);
    }

    let candidates = namespace_candidates(consumer, &descriptor.name);
    for candidate in &candidates {
        if functions.contains_key(candidate) {
            return Binding::Node(candidate.clone());
        }
    }

    if descriptor.default.is_some() {
        Binding::Default
    } else {
        // The bare parameter name stands in for the missing producer.
        Binding::Unbound(candidates.last().cloned().unwrap_or_default())
    }
}

fn resolve_fanin(
    functions: &BTreeMap<String, Node>,
    consumer: &str,
    descriptor: &ParamDescriptor,
) -> Binding {
    for prefix in namespace_candidates(consumer, &descriptor.name) {
        // Range scan over the sorted registry: every key starting with the
        // prefix, already in name order.
        let entries: Vec<FaninEntry> = functions
            .range(prefix.clone()..)
            .take_while(|(name, _)| name.starts_with(&prefix))
            .filter(|(name, _)| name.as_str() != consumer)
            .map(|(name, _)| FaninEntry {
                suffix: name[prefix.len()..].to_string(),
                node: name.clone(),
            })
            .collect();
        if !entries.is_empty() {
            return Binding::Fanin(entries);
        }
    }
    Binding::Fanin(Vec::new())
}

/// Resolves every formal parameter of the named consumer.
///
/// Returns an empty list when the consumer is not registered.
pub fn resolve_node<'a>(
    functions: &'a BTreeMap<String, Node>,
    consumer: &str,
) -> Vec<ResolvedParam<'a>> {
    let Some(node) = functions.get(consumer) else {
        return Vec::new();
    };
    node.params()
        .iter()
        .map(|descriptor| ResolvedParam {
            binding: resolve_parameter(functions, consumer, descriptor),
            descriptor,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Func;
    use crate::value::Value;

    fn constant(name: &str) -> (String, Node) {
        (
            name.to_string(),
            Node::Function(Func::constant(name, name, Value::Unit)),
        )
    }

    fn registry(names: &[&str]) -> BTreeMap<String, Node> {
        names.iter().map(|n| constant(n)).collect()
    }

    #[test]
    fn candidates_walk_outward() {
        assert_eq!(
            namespace_candidates("a__b__c", "p"),
            vec!["a__b__p", "a__p", "p"]
        );
        assert_eq!(namespace_candidates("c", "p"), vec!["p"]);
    }

    #[test]
    fn inner_namespace_shadows_outer() {
        let functions = registry(&["p", "ns__p", "ns__consumer"]);
        let binding = resolve_parameter(
            &functions,
            "ns__consumer",
            &ParamDescriptor::required("p"),
        );
        assert_eq!(binding, Binding::Node("ns__p".to_string()));
    }

    #[test]
    fn falls_back_to_root() {
        let functions = registry(&["p", "ns__consumer"]);
        let binding = resolve_parameter(
            &functions,
            "ns__consumer",
            &ParamDescriptor::required("p"),
        );
        assert_eq!(binding, Binding::Node("p".to_string()));
    }

    #[test]
    fn missing_without_default_is_unbound() {
        let functions = registry(&["ns__consumer"]);
        let binding = resolve_parameter(
            &functions,
            "ns__consumer",
            &ParamDescriptor::required("q"),
        );
        assert_eq!(binding, Binding::Unbound("q".to_string()));
    }

    #[test]
    fn missing_with_default_drops_edge() {
        let functions = registry(&["consumer"]);
        let binding = resolve_parameter(
            &functions,
            "consumer",
            &ParamDescriptor::with_default("q", 3i64),
        );
        assert_eq!(binding, Binding::Default);
    }

    #[test]
    fn fanin_collects_prefix_matches_sorted() {
        let functions = registry(&["d", "d_2", "d_0", "d_1", "other"]);
        let binding = resolve_parameter(&functions, "d", &ParamDescriptor::var_positional("d_"));
        match binding {
            Binding::Fanin(entries) => {
                let nodes: Vec<&str> = entries.iter().map(|e| e.node.as_str()).collect();
                assert_eq!(nodes, vec!["d_0", "d_1", "d_2"]);
                let suffixes: Vec<&str> = entries.iter().map(|e| e.suffix.as_str()).collect();
                assert_eq!(suffixes, vec!["0", "1", "2"]);
            }
            other => panic!("expected fan-in, got {other:?}"),
        }
    }

    #[test]
    fn fanin_prefers_inner_namespace_level() {
        let functions = registry(&["ns__d", "ns__d_0", "d_0", "d_1"]);
        let binding =
            resolve_parameter(&functions, "ns__d", &ParamDescriptor::var_positional("d_"));
        match binding {
            Binding::Fanin(entries) => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].node, "ns__d_0");
            }
            other => panic!("expected fan-in, got {other:?}"),
        }
    }

    #[test]
    fn fanin_never_includes_consumer() {
        let functions = registry(&["d_", "d_0"]);
        let binding = resolve_parameter(&functions, "d_", &ParamDescriptor::var_keyword("d_"));
        match binding {
            Binding::Fanin(entries) => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].node, "d_0");
            }
            other => panic!("expected fan-in, got {other:?}"),
        }
    }

    #[test]
    fn empty_fanin_is_not_unbound() {
        let functions = registry(&["consumer"]);
        let binding =
            resolve_parameter(&functions, "consumer", &ParamDescriptor::var_keyword("kw_"));
        assert_eq!(binding, Binding::Fanin(Vec::new()));
    }

    #[test]
    fn link_participates_in_shadowing() {
        let mut functions = registry(&["a", "consumer"]);
        functions.insert("b".to_string(), Node::Link(crate::node::Link::new("b", "a")));
        let binding = resolve_parameter(&functions, "consumer", &ParamDescriptor::required("b"));
        // The link node itself is the producer; its own parameter forwards to
        // the target during execution.
        assert_eq!(binding, Binding::Node("b".to_string()));
    }

    #[test]
    fn resolve_node_covers_all_params() {
        let mut functions = registry(&["a", "b"]);
        functions.insert(
            "c".to_string(),
            Node::Function(Func::new(
                "c",
                "c:v1",
                vec![
                    ParamDescriptor::required("a"),
                    ParamDescriptor::required("b"),
                    ParamDescriptor::with_default("missing", 1i64),
                ],
                |_| Ok(Value::Unit),
            )),
        );
        let resolved = resolve_node(&functions, "c");
        assert_eq!(resolved.len(), 3);
        assert_eq!(resolved[0].binding, Binding::Node("a".to_string()));
        assert_eq!(resolved[1].binding, Binding::Node("b".to_string()));
        assert_eq!(resolved[2].binding, Binding::Default);
    }

    #[test]
    fn resolve_unregistered_consumer_is_empty() {
        let functions = registry(&["a"]);
        assert!(resolve_node(&functions, "zzz").is_empty());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_segments() -> impl Strategy<Value = Vec<String>> {
            prop::collection::vec("[a-c]{1,3}", 1..4)
        }

        proptest! {
            /// Whatever subset of candidate names is registered, resolution
            /// picks the most deeply namespaced one.
            #[test]
            fn deepest_registered_candidate_wins(
                segments in arb_segments(),
                registered in prop::collection::vec(any::<bool>(), 4),
            ) {
                let consumer = segments.join("__");
                let candidates = namespace_candidates(&consumer, "p");
                prop_assert_eq!(candidates.last().unwrap().as_str(), "p");

                let mut functions: BTreeMap<String, Node> = BTreeMap::new();
                for (candidate, keep) in candidates.iter().zip(registered.iter()) {
                    if *keep {
                        functions.insert(
                            candidate.clone(),
                            Node::Function(Func::constant(
                                candidate,
                                candidate,
                                crate::value::Value::Unit,
                            )),
                        );
                    }
                }

                let binding = resolve_parameter(
                    &functions,
                    &consumer,
                    &ParamDescriptor::required("p"),
                );
                let expected = candidates
                    .iter()
                    .zip(registered.iter())
                    .find(|(_, keep)| **keep)
                    .map(|(candidate, _)| candidate.clone());
                match expected {
                    Some(name) => prop_assert_eq!(binding, Binding::Node(name)),
                    None => prop_assert_eq!(binding, Binding::Unbound("p".to_string())),
                }
            }
        }
    }
}
