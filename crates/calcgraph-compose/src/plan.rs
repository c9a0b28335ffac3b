//! Instruction planning: deciding what to run, load, or skip.
//!
//! Given a DAG, the per-node content signatures, and a cache, every node is
//! classified:
//!
//! - `Calculate`: the node's own cache entry is stale or absent, or some
//!   ancestor's is. Invalidity propagates to all descendants because their
//!   stored values were derived from stale inputs.
//! - `Retrieve`: the cached value is valid and is actually needed, either as
//!   a requested output or as an input to a node being calculated.
//! - `Ignore`: valid and needed by nobody in this run. Pure bystanders.
//!
//! Before planning, [`maintain_cache_consistency`] reconciles backend state
//! with the propagation rule: descendants of directly invalid nodes are
//! invalidated in the backend itself. Directly invalid nodes are left alone
//! since calculation overwrites them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use calcgraph_cache::backend::CacheBackend;
use calcgraph_cache::signature::ContentSignature;
use calcgraph_core::dag::Dag;

use crate::error::CalcError;

/// What the executor should do with one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Instruction {
    Calculate,
    Retrieve,
    Ignore,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Instruction::Calculate => "calculate",
            Instruction::Retrieve => "retrieve",
            Instruction::Ignore => "ignore",
        };
        f.write_str(text)
    }
}

fn direct_invalid_nodes(
    dag: &Dag,
    signatures: &BTreeMap<String, ContentSignature>,
    cache: &dyn CacheBackend,
) -> BTreeSet<String> {
    dag.node_names()
        .filter(|node| {
            signatures
                .get(*node)
                .map_or(true, |sig| !cache.valid(node, sig))
        })
        .map(String::from)
        .collect()
}

/// Invalidates, in the backend, every descendant of a directly invalid node.
///
/// Runs over the full DAG so stale state outside the requested ancestor set
/// is reconciled too.
pub(crate) fn maintain_cache_consistency(
    dag: &Dag,
    signatures: &BTreeMap<String, ContentSignature>,
    cache: &mut dyn CacheBackend,
) -> Result<(), CalcError> {
    let direct: Vec<String> = direct_invalid_nodes(dag, signatures, cache)
        .into_iter()
        .collect();
    debug!(?direct, "directly invalid nodes");

    let mut indirect = dag.descendants_of(&direct);
    for node in &direct {
        indirect.remove(node);
    }
    debug!(?indirect, "indirectly invalid nodes");

    for node in &indirect {
        cache
            .invalidate(node)
            .map_err(|source| CalcError::Cache {
                node: node.clone(),
                operation: "invalidate",
                source,
            })?;
    }
    Ok(())
}

/// Classifies every node of `dag` in topological order.
pub(crate) fn execution_instructions(
    dag: &Dag,
    signatures: &BTreeMap<String, ContentSignature>,
    cache: &dyn CacheBackend,
    outputs: &BTreeSet<String>,
) -> Result<Vec<(String, Instruction)>, CalcError> {
    let direct: Vec<String> = direct_invalid_nodes(dag, signatures, cache)
        .into_iter()
        .collect();

    let mut invalid = dag.descendants_of(&direct);
    invalid.extend(direct);

    let must_retrieve: BTreeSet<&str> = dag
        .node_names()
        .filter(|node| {
            !invalid.contains(*node)
                && (outputs.contains(*node)
                    || dag.successors(node).iter().any(|s| invalid.contains(*s)))
        })
        .collect();

    debug!(invalid = invalid.len(), retrieve = must_retrieve.len(), "plan sets");

    let order = dag.topo_order()?;
    Ok(order
        .into_iter()
        .map(|node| {
            let instruction = if invalid.contains(&node) {
                Instruction::Calculate
            } else if must_retrieve.contains(node.as_str()) {
                Instruction::Retrieve
            } else {
                Instruction::Ignore
            };
            (node, instruction)
        })
        .collect())
}
