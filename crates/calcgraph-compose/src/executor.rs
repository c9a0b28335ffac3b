//! Single-pass execution of a planned instruction stream.
//!
//! The executor walks the planner's output once, in topological order. It
//! keeps a live `results` map and a `remaining_uses` count per producer,
//! initialised from the ancestor DAG's edge multiplicities; after each step
//! every resolved predecessor's count drops by one and entries reaching zero
//! are evicted unless they are requested outputs. With `intermediates`
//! enabled every ancestor counts as an output, which suppresses eviction
//! entirely.
//!
//! Failure handling is two-mode: fail-fast propagates the first error with
//! node context, collect mode stops at the failing node and returns the
//! partial results alongside the failure record. Construction problems
//! (unknown outputs, cycles, unbound references) abort either way. The
//! failing node's cache entry is never written.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use calcgraph_cache::signature::ContentSignature;
use calcgraph_core::error::GraphError;
use calcgraph_core::node::{CallArgs, Node};
use calcgraph_core::param::ParamKind;
use calcgraph_core::resolve::{resolve_node, Binding, ResolvedParam};
use calcgraph_core::value::Value;

use crate::composer::Composer;
use crate::error::{CalcError, Calculation, Failure};
use crate::event::Event;
use crate::plan::{execution_instructions, maintain_cache_consistency, Instruction};

/// Options controlling one calculation.
pub struct CalcOptions<'a> {
    /// Run `check` and output validation before executing. Enabled by
    /// default; disabling skips straight to planning.
    pub perform_checks: bool,
    /// Keep and return every ancestor's value instead of only the requested
    /// outputs.
    pub intermediates: bool,
    /// Synchronous progress callback. Must return promptly.
    pub on_event: Option<&'a mut dyn FnMut(&Event)>,
}

impl Default for CalcOptions<'_> {
    fn default() -> Self {
        CalcOptions {
            perform_checks: true,
            intermediates: false,
            on_event: None,
        }
    }
}

impl<'a> CalcOptions<'a> {
    pub fn perform_checks(mut self, enabled: bool) -> Self {
        self.perform_checks = enabled;
        self
    }

    pub fn intermediates(mut self, enabled: bool) -> Self {
        self.intermediates = enabled;
        self
    }

    pub fn on_event(mut self, callback: &'a mut dyn FnMut(&Event)) -> Self {
        self.on_event = Some(callback);
        self
    }

    fn emit(&mut self, event: Event) {
        if let Some(callback) = self.on_event.as_mut() {
            callback(&event);
        }
    }
}

/// Assembles the call arguments for one consumer from resolved bindings and
/// already-computed values.
///
/// Non-variadic parameters are delivered positionally until a
/// variadic-positional parameter has been seen, after which they are
/// keyword-delivered; keyword-only parameters always are. Defaults fill in
/// for dropped edges. An unbound binding is an error here: it can only be
/// reached when checks were skipped.
pub(crate) fn assemble_args(
    resolved: &[ResolvedParam<'_>],
    values: &BTreeMap<String, Value>,
    consumer: &str,
) -> Result<CallArgs, CalcError> {
    let fetch = |producer: &str| -> Result<Value, CalcError> {
        values.get(producer).cloned().ok_or_else(|| {
            CalcError::Graph(GraphError::Unbound {
                name: producer.to_string(),
                referers: vec![consumer.to_string()],
            })
        })
    };

    let mut args = CallArgs::default();
    let mut seen_var_positional = false;
    for rp in resolved {
        let descriptor = rp.descriptor;
        match descriptor.kind {
            ParamKind::VarPositional => {
                seen_var_positional = true;
                if let Binding::Fanin(entries) = &rp.binding {
                    for entry in entries {
                        args.var_positional.push(fetch(&entry.node)?);
                    }
                }
            }
            ParamKind::VarKeyword => {
                if let Binding::Fanin(entries) = &rp.binding {
                    for entry in entries {
                        args.var_keyword
                            .insert(entry.suffix.clone(), fetch(&entry.node)?);
                    }
                }
            }
            ParamKind::Positional | ParamKind::PositionalOrKeyword | ParamKind::KeywordOnly => {
                let value = match &rp.binding {
                    Binding::Node(producer) => fetch(producer)?,
                    Binding::Default => match descriptor.default.clone() {
                        Some(default) => default,
                        None => {
                            return Err(CalcError::Graph(GraphError::Unbound {
                                name: descriptor.name.clone(),
                                referers: vec![consumer.to_string()],
                            }))
                        }
                    },
                    Binding::Unbound(name) => {
                        return Err(CalcError::Graph(GraphError::Unbound {
                            name: name.clone(),
                            referers: vec![consumer.to_string()],
                        }))
                    }
                    // A variadic binding on a non-variadic kind cannot be
                    // produced by the resolver.
                    Binding::Fanin(_) => continue,
                };
                let by_keyword =
                    descriptor.kind == ParamKind::KeywordOnly || seen_var_positional;
                if by_keyword {
                    args.keyword.insert(descriptor.name.clone(), value);
                } else {
                    args.positional.push((descriptor.name.clone(), value));
                }
            }
        }
    }
    Ok(args)
}

/// Runs one calculation over the composer's graph.
pub(crate) fn run(
    composer: &Composer,
    outputs: &[String],
    opts: &mut CalcOptions<'_>,
    fail_fast: bool,
) -> Result<Calculation, CalcError> {
    opts.emit(Event::StartCalculation {
        outputs: outputs.to_vec(),
    });

    if opts.perform_checks {
        for name in outputs {
            if !composer.functions().contains_key(name) {
                return Err(GraphError::UnknownOutput { name: name.clone() }.into());
            }
        }
        let output_refs: Vec<&str> = outputs.iter().map(String::as_str).collect();
        for diagnostic in composer.check(Some(&output_refs))? {
            use calcgraph_core::check::Diagnostic;
            return Err(match diagnostic {
                Diagnostic::Cycle { nodes, .. } => GraphError::Cycle { nodes }.into(),
                Diagnostic::Unbound { name, referers, .. } => {
                    GraphError::Unbound { name, referers }.into()
                }
            });
        }
    }

    let signatures = composer.signatures()?;
    let full_dag = composer.dag();
    {
        let mut cache = composer.cache_lock();
        maintain_cache_consistency(&full_dag, &signatures, &mut *cache)?;
    }

    let dag = full_dag.restrict(&full_dag.ancestors_of(outputs));
    let output_set: BTreeSet<String> = if opts.intermediates {
        dag.node_names().map(String::from).collect()
    } else {
        outputs.iter().cloned().collect()
    };

    let instructions = {
        let cache = composer.cache_lock();
        execution_instructions(&dag, &signatures, &*cache, &output_set)?
    };
    debug!(?instructions, "execution plan");

    let mut remaining_uses: BTreeMap<String, usize> = BTreeMap::new();
    for (producer, _) in dag.edges() {
        *remaining_uses.entry(producer.to_string()).or_insert(0) += 1;
    }

    opts.emit(Event::PreparedCalculation {
        instructions: instructions.clone(),
        graph_nodes: dag.node_names().map(String::from).collect(),
        graph_edges: dag
            .edges()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect(),
    });

    let mut results: BTreeMap<String, Value> = BTreeMap::new();
    for (node, instruction) in instructions {
        opts.emit(Event::StartStep {
            name: node.clone(),
            instruction,
        });

        let resolved = resolve_node(composer.functions(), &node);
        let step = execute_step(composer, &signatures, &node, instruction, &resolved, &mut results, opts);

        if let Err(error) = step {
            opts.emit(Event::EndStep {
                name: node.clone(),
                instruction,
                result: None,
            });
            // Only execution failures are collectable; a graph problem
            // surfacing here (checks were skipped) aborts either way.
            if fail_fast || matches!(error, CalcError::Graph(_)) {
                return Err(error);
            }
            return Ok(Calculation {
                results,
                failure: Some(Failure { node, error }),
            });
        }

        // Eject values that no later step will read.
        for rp in &resolved {
            for producer in rp.binding.producers() {
                if let Some(count) = remaining_uses.get_mut(producer) {
                    *count -= 1;
                    if *count == 0 && !output_set.contains(producer) {
                        remaining_uses.remove(producer);
                        results.remove(producer);
                        debug!(producer, "ejected from memory");
                    }
                }
            }
        }

        opts.emit(Event::EndStep {
            name: node.clone(),
            instruction,
            result: results.get(&node).cloned(),
        });
    }

    Ok(Calculation {
        results,
        failure: None,
    })
}

fn execute_step(
    composer: &Composer,
    signatures: &BTreeMap<String, ContentSignature>,
    node: &str,
    instruction: Instruction,
    resolved: &[ResolvedParam<'_>],
    results: &mut BTreeMap<String, Value>,
    opts: &mut CalcOptions<'_>,
) -> Result<(), CalcError> {
    match instruction {
        Instruction::Ignore => {
            debug!(node, "ignoring");
            Ok(())
        }
        Instruction::Retrieve => {
            debug!(node, "retrieving");
            opts.emit(Event::StartCacheRetrieval {
                name: node.to_string(),
            });
            let retrieved = composer.cache_lock().get(node);
            opts.emit(Event::EndCacheRetrieval {
                name: node.to_string(),
            });
            let value = retrieved.map_err(|source| CalcError::Cache {
                node: node.to_string(),
                operation: "retrieval",
                source,
            })?;
            results.insert(node.to_string(), value);
            Ok(())
        }
        Instruction::Calculate => {
            debug!(node, "calculating");
            let args = assemble_args(resolved, results, node)?;

            opts.emit(Event::StartFunction {
                name: node.to_string(),
            });
            let produced = invoke(composer, node, &args);
            opts.emit(Event::EndFunction {
                name: node.to_string(),
            });
            let value = produced?;
            results.insert(node.to_string(), value.clone());

            opts.emit(Event::StartCacheStore {
                name: node.to_string(),
            });
            let stored = match signatures.get(node) {
                Some(signature) => composer.cache_lock().set(node, signature, &value),
                None => Ok(()),
            };
            opts.emit(Event::EndCacheStore {
                name: node.to_string(),
            });
            stored.map_err(|source| CalcError::Cache {
                node: node.to_string(),
                operation: "store",
                source,
            })
        }
    }
}

/// Produces a node's value from its assembled arguments.
fn invoke(composer: &Composer, node: &str, args: &CallArgs) -> Result<Value, CalcError> {
    let registered = composer
        .functions()
        .get(node)
        .ok_or_else(|| GraphError::UnknownOutput {
            name: node.to_string(),
        })?;
    match registered {
        Node::Parameter(leaf) => Ok(leaf.value.clone()),
        Node::Link(link) => match args.get(link.target()) {
            Some(value) => Ok(value.clone()),
            None => Err(GraphError::Unbound {
                name: link.target().to_string(),
                referers: vec![node.to_string()],
            }
            .into()),
        },
        Node::Function(func) => (func.body)(args).map_err(|source| CalcError::UserFunction {
            node: node.to_string(),
            source,
        }),
    }
}
