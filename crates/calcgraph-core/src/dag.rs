//! The derived dependency DAG.
//!
//! [`Dag`] is built from a functions registry by resolving every consumer's
//! formal parameters and adding one `producer -> consumer` edge per resolved
//! reference. Edges are parallel when a consumer references the same producer
//! through more than one formal, so edge multiplicities double as usage
//! counts for the executor's memory eviction.
//!
//! All traversal orders are deterministic: node iteration follows the sorted
//! name index, and the topological order breaks ties lexicographically.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use tracing::debug;

use crate::error::GraphError;
use crate::node::Node;
use crate::resolve::resolve_node;

/// A directed acyclic dependency graph over node names.
#[derive(Debug, Clone)]
pub struct Dag {
    graph: DiGraph<String, ()>,
    indices: BTreeMap<String, NodeIndex>,
}

impl Dag {
    /// Derives the full DAG from a functions registry.
    ///
    /// Unbound references contribute no edge; dropped-default parameters
    /// contribute no edge. Cycles are representable here and reported by
    /// [`Dag::find_cycle`] rather than at construction.
    pub fn build(functions: &BTreeMap<String, Node>) -> Dag {
        let mut graph = DiGraph::new();
        let mut indices = BTreeMap::new();

        for name in functions.keys() {
            let idx = graph.add_node(name.clone());
            indices.insert(name.clone(), idx);
        }

        for consumer in functions.keys() {
            let consumer_idx = indices[consumer];
            for resolved in resolve_node(functions, consumer) {
                for producer in resolved.binding.producers() {
                    if let Some(&producer_idx) = indices.get(producer) {
                        graph.add_edge(producer_idx, consumer_idx, ());
                    }
                }
            }
        }

        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "built dependency graph"
        );
        Dag { graph, indices }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.indices.contains_key(name)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Node names in sorted order.
    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.indices.keys().map(String::as_str)
    }

    /// All edges as `(producer, consumer)` pairs, with multiplicity.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.graph.edge_references().map(|edge| {
            (
                self.graph[edge.source()].as_str(),
                self.graph[edge.target()].as_str(),
            )
        })
    }

    /// Distinct direct successors of `name`, sorted.
    pub fn successors(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Outgoing)
    }

    /// Distinct direct predecessors of `name`, sorted.
    pub fn predecessors(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Incoming)
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Vec<&str> {
        let Some(&idx) = self.indices.get(name) else {
            return Vec::new();
        };
        let mut names: Vec<&str> = self
            .graph
            .neighbors_directed(idx, direction)
            .map(|n| self.graph[n].as_str())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// The given nodes together with all their transitive predecessors.
    ///
    /// Unknown names are ignored; callers validate requested outputs first.
    pub fn ancestors_of<S: AsRef<str>>(&self, outputs: &[S]) -> BTreeSet<String> {
        self.reachable(outputs, Direction::Incoming, true)
    }

    /// All nodes reachable from the given starts, excluding the starts
    /// themselves.
    pub fn descendants_of<S: AsRef<str>>(&self, starts: &[S]) -> BTreeSet<String> {
        self.reachable(starts, Direction::Outgoing, false)
    }

    fn reachable<S: AsRef<str>>(
        &self,
        starts: &[S],
        direction: Direction,
        include_starts: bool,
    ) -> BTreeSet<String> {
        let mut seen: BTreeSet<NodeIndex> = BTreeSet::new();
        let mut queue: VecDeque<NodeIndex> = VecDeque::new();
        for start in starts {
            if let Some(&idx) = self.indices.get(start.as_ref()) {
                queue.push_back(idx);
            }
        }
        let start_set: BTreeSet<NodeIndex> = queue.iter().copied().collect();

        while let Some(idx) = queue.pop_front() {
            for next in self.graph.neighbors_directed(idx, direction) {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }

        if include_starts {
            seen.extend(start_set.iter().copied());
        } else {
            for idx in &start_set {
                seen.remove(idx);
            }
        }
        seen.into_iter()
            .map(|idx| self.graph[idx].clone())
            .collect()
    }

    /// The induced sub-DAG over `keep`, preserving edge multiplicities.
    pub fn restrict(&self, keep: &BTreeSet<String>) -> Dag {
        let mut graph = DiGraph::new();
        let mut indices = BTreeMap::new();
        for name in keep {
            if self.indices.contains_key(name) {
                let idx = graph.add_node(name.clone());
                indices.insert(name.clone(), idx);
            }
        }
        for (source, target) in self.edges() {
            if let (Some(&s), Some(&t)) = (indices.get(source), indices.get(target)) {
                graph.add_edge(s, t, ());
            }
        }
        Dag { graph, indices }
    }

    /// Stable topological order with lexicographic tie-breaking.
    ///
    /// Fails with [`GraphError::Cycle`] naming one representative cycle when
    /// the graph is not acyclic.
    pub fn topo_order(&self) -> Result<Vec<String>, GraphError> {
        let mut in_degree: HashMap<NodeIndex, usize> = self
            .indices
            .values()
            .map(|&idx| {
                (
                    idx,
                    self.graph.edges_directed(idx, Direction::Incoming).count(),
                )
            })
            .collect();

        // Sorted ready set gives the lexicographic tie-break.
        let mut ready: BTreeSet<String> = self
            .indices
            .iter()
            .filter(|(_, idx)| in_degree[idx] == 0)
            .map(|(name, _)| name.clone())
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(name) = ready.pop_first() {
            let idx = self.indices[&name];
            order.push(name);
            for edge in self.graph.edges_directed(idx, Direction::Outgoing) {
                let successor = edge.target();
                let remaining = in_degree.get_mut(&successor).expect("known node");
                *remaining -= 1;
                if *remaining == 0 {
                    ready.insert(self.graph[successor].clone());
                }
            }
        }

        if order.len() < self.graph.node_count() {
            let nodes = self.find_cycle().unwrap_or_default();
            return Err(GraphError::Cycle { nodes });
        }
        Ok(order)
    }

    /// Finds one representative cycle via iterative DFS, or `None` when the
    /// graph is acyclic. Start nodes are visited in sorted name order so the
    /// reported cycle is deterministic.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Grey,
            Black,
        }

        let mut color: HashMap<NodeIndex, Color> = self
            .indices
            .values()
            .map(|&idx| (idx, Color::White))
            .collect();

        for &start in self.indices.values() {
            if color[&start] != Color::White {
                continue;
            }
            color.insert(start, Color::Grey);
            let mut stack: Vec<(NodeIndex, std::vec::IntoIter<NodeIndex>)> =
                vec![(start, self.sorted_successor_indices(start).into_iter())];

            while let Some((_, successors)) = stack.last_mut() {
                match successors.next() {
                    Some(next) => match color[&next] {
                        Color::White => {
                            color.insert(next, Color::Grey);
                            stack.push((next, self.sorted_successor_indices(next).into_iter()));
                        }
                        Color::Grey => {
                            // Back edge: the cycle is the grey path from
                            // `next` to the top of the stack.
                            let position = stack
                                .iter()
                                .position(|(node, _)| *node == next)
                                .expect("grey node is on the stack");
                            return Some(
                                stack[position..]
                                    .iter()
                                    .map(|(node, _)| self.graph[*node].clone())
                                    .collect(),
                            );
                        }
                        Color::Black => {}
                    },
                    None => {
                        let (done, _) = stack.pop().expect("non-empty stack");
                        color.insert(done, Color::Black);
                    }
                }
            }
        }
        None
    }

    fn sorted_successor_indices(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut successors: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .collect();
        successors.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));
        successors.dedup();
        successors
    }
}
