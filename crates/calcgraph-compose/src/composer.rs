//! The composer: an immutable builder over the function registries.
//!
//! A [`Composer`] aggregates the functions registry (function, parameter,
//! and link nodes), the typed parameter table, the test registry, the
//! source-text override map, and a shared cache backend. Every update
//! operation returns a new composer; the registries of the original are
//! never touched. The attached cache is the one deliberately shared piece
//! of state: derived composers reuse the same backend handle, which is what
//! makes content-keyed caching useful across edits.
//!
//! Replacing or removing a registered node invalidates that node and its
//! descendants in the attached cache, since their stored stamps would
//! otherwise be inconsistent with what a recalculation would produce.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;

use calcgraph_cache::backend::{CacheBackend, NullCache};
use calcgraph_cache::memory::MemoryCache;
use calcgraph_cache::persistent::PersistentCache;
use calcgraph_cache::signature::{node_signature, ContentSignature};
use calcgraph_core::check::{check_graph, Diagnostic};
use calcgraph_core::dag::Dag;
use calcgraph_core::error::GraphError;
use calcgraph_core::node::{CallArgs, FnError, Func, Link, Node, ParamLeaf, TestFn};
use calcgraph_core::param::ParamDescriptor;
use calcgraph_core::resolve::{resolve_parameter, Binding, ResolvedParam};
use calcgraph_core::value::{Value, ValueType};

use crate::error::{CalcError, Calculation};
use crate::executor::{assemble_args, run, CalcOptions};

/// A parameter declaration: either a bare value (type inferred) or a value
/// with an explicit declared type.
#[derive(Debug, Clone)]
pub enum ParamSpec {
    Bare(Value),
    Typed(ValueType, Value),
}

impl ParamSpec {
    pub fn bare(value: impl Into<Value>) -> Self {
        ParamSpec::Bare(value.into())
    }

    pub fn typed(ty: ValueType, value: impl Into<Value>) -> Self {
        ParamSpec::Typed(ty, value.into())
    }
}

/// A registered test: a body run against resolved inputs, asserting by
/// returning an error.
#[derive(Clone)]
pub struct TestCase {
    pub name: String,
    pub params: Vec<ParamDescriptor>,
    pub body: TestFn,
}

impl TestCase {
    pub fn new(
        name: impl Into<String>,
        params: Vec<ParamDescriptor>,
        body: impl Fn(&CallArgs) -> Result<(), FnError> + Send + Sync + 'static,
    ) -> Self {
        TestCase {
            name: name.into(),
            params,
            body: Arc::new(body),
        }
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// The outcome of one registered test.
#[derive(Debug)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub error: Option<FnError>,
}

/// An immutable function-graph composer.
#[derive(Clone)]
pub struct Composer {
    functions: BTreeMap<String, Node>,
    parameters: BTreeMap<String, (ValueType, Value)>,
    tests: BTreeMap<String, TestCase>,
    source_map: BTreeMap<String, String>,
    cache: Arc<Mutex<dyn CacheBackend + Send>>,
}

impl Composer {
    /// An empty composer with no caching.
    pub fn new() -> Composer {
        Composer {
            functions: BTreeMap::new(),
            parameters: BTreeMap::new(),
            tests: BTreeMap::new(),
            source_map: BTreeMap::new(),
            cache: Arc::new(Mutex::new(NullCache)),
        }
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Adds or replaces function nodes. Each function registers under its
    /// own declared name; use [`Func::named`] to override.
    pub fn update<I>(&self, funcs: I) -> Composer
    where
        I: IntoIterator<Item = Func>,
    {
        self.install(
            funcs.into_iter().map(Node::Function).collect(),
            Vec::new(),
            Vec::new(),
        )
    }

    /// Adds functions while stripping a required prefix from their names.
    /// Useful against name shadowing: register `get_price` as `price`.
    pub fn update_without_prefix<I>(&self, prefix: &str, funcs: I) -> Result<Composer, GraphError>
    where
        I: IntoIterator<Item = Func>,
    {
        let mut renamed = Vec::new();
        for func in funcs {
            let stripped =
                func.name
                    .strip_prefix(prefix)
                    .ok_or_else(|| GraphError::AffixMissing {
                        name: func.name.clone(),
                        affix: prefix.to_string(),
                    })?;
            let stripped = stripped.to_string();
            renamed.push(func.named(stripped));
        }
        Ok(self.update(renamed))
    }

    /// Adds functions while stripping a required suffix from their names.
    pub fn update_without_suffix<I>(&self, suffix: &str, funcs: I) -> Result<Composer, GraphError>
    where
        I: IntoIterator<Item = Func>,
    {
        let mut renamed = Vec::new();
        for func in funcs {
            let stripped =
                func.name
                    .strip_suffix(suffix)
                    .ok_or_else(|| GraphError::AffixMissing {
                        name: func.name.clone(),
                        affix: suffix.to_string(),
                    })?;
            let stripped = stripped.to_string();
            renamed.push(func.named(stripped));
        }
        Ok(self.update(renamed))
    }

    /// Declares constant parameters. Each entry installs both a typed table
    /// row and a parameter leaf node, so parameters resolve exactly like
    /// nullary functions. Integer values widen to a declared `Float`; any
    /// other mismatch fails.
    pub fn update_parameters<I, S>(&self, parameters: I) -> Result<Composer, GraphError>
    where
        I: IntoIterator<Item = (S, ParamSpec)>,
        S: Into<String>,
    {
        let mut leaves = Vec::new();
        for (name, spec) in parameters {
            let name: String = name.into();
            let (ty, value) = match spec {
                ParamSpec::Bare(value) => (value.value_type(), value),
                ParamSpec::Typed(ty, value) => {
                    let actual = value.type_name().to_string();
                    let coerced = ty.coerce(value).ok_or_else(|| GraphError::TypeMismatch {
                        name: name.clone(),
                        expected: ty,
                        actual,
                    })?;
                    (ty, coerced)
                }
            };
            leaves.push((name, ty, value));
        }
        let nodes = leaves
            .iter()
            .map(|(name, ty, value)| {
                Node::Parameter(ParamLeaf {
                    name: name.clone(),
                    ty: *ty,
                    value: value.clone(),
                })
            })
            .collect();
        Ok(self.install(nodes, leaves, Vec::new()))
    }

    /// Registers tests. Test parameters resolve like function parameters.
    pub fn update_tests<I>(&self, tests: I) -> Composer
    where
        I: IntoIterator<Item = TestCase>,
    {
        let mut next = self.clone();
        for test in tests {
            next.tests.insert(test.name.clone(), test);
        }
        next
    }

    /// Installs symbolic links: `link([("b", "a")])` makes anything that
    /// resolves to `b` read `a`'s value instead.
    pub fn link<I, S, T>(&self, links: I) -> Composer
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: Into<String>,
    {
        self.install(
            links
                .into_iter()
                .map(|(alias, target)| Node::Link(Link::new(alias, target)))
                .collect(),
            Vec::new(),
            Vec::new(),
        )
    }

    /// Installs source-text overrides, consulted for content signatures and
    /// display in place of a node's own content.
    pub fn update_sources<I, S, T>(&self, sources: I) -> Composer
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: Into<String>,
    {
        let mut next = self.clone();
        for (name, text) in sources {
            next.source_map.insert(name.into(), text.into());
        }
        next
    }

    /// Merges each supplied composer under a namespace prefix: every
    /// function, link, and parameter of the child registers as
    /// `<namespace>__<name>`.
    pub fn update_namespaces<I, S>(&self, namespaces: I) -> Composer
    where
        I: IntoIterator<Item = (S, Composer)>,
        S: Into<String>,
    {
        let mut nodes = Vec::new();
        let mut leaves = Vec::new();
        let mut sources = Vec::new();
        for (namespace, child) in namespaces {
            let namespace: String = namespace.into();
            for (name, node) in &child.functions {
                let mut node = node.clone();
                node.set_name(format!("{namespace}__{name}"));
                nodes.push(node);
            }
            for (name, (ty, value)) in &child.parameters {
                leaves.push((format!("{namespace}__{name}"), *ty, value.clone()));
            }
            for (name, text) in &child.source_map {
                sources.push((format!("{namespace}__{name}"), text.clone()));
            }
        }
        self.install(nodes, leaves, sources)
    }

    /// Merges functions, parameters, and tests from other composers, in
    /// order; later composers override earlier ones.
    pub fn update_from<I>(&self, composers: I) -> Composer
    where
        I: IntoIterator<Item = Composer>,
    {
        let mut merged = self.clone();
        for other in composers {
            let nodes: Vec<Node> = other.functions.values().cloned().collect();
            let leaves: Vec<(String, ValueType, Value)> = other
                .parameters
                .iter()
                .map(|(name, (ty, value))| (name.clone(), *ty, value.clone()))
                .collect();
            let sources: Vec<(String, String)> = other
                .source_map
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            merged = merged.install(nodes, leaves, sources);
            for (name, test) in &other.tests {
                merged.tests.insert(name.clone(), test.clone());
            }
        }
        merged
    }

    /// Restricts the node registries to the given names. Tests are kept;
    /// they are not nodes.
    pub fn subgraph<S: AsRef<str>>(&self, names: &[S]) -> Composer {
        let keep: BTreeSet<&str> = names.iter().map(AsRef::as_ref).collect();
        let mut next = self.clone();
        next.functions.retain(|name, _| keep.contains(name.as_str()));
        next.parameters.retain(|name, _| keep.contains(name.as_str()));
        next.source_map.retain(|name, _| keep.contains(name.as_str()));
        next
    }

    /// Calculates the outputs now and returns a composer in which each has
    /// been replaced by a constant node carrying the baked-in value.
    pub fn precalculate<S: AsRef<str>>(&self, outputs: &[S]) -> Result<Composer, CalcError> {
        let results = self.calculate(outputs)?;
        let mut baked = Vec::new();
        for (name, value) in results {
            let signature =
                ContentSignature::of_value(&value).map_err(|source| CalcError::Cache {
                    node: name.clone(),
                    operation: "hash",
                    source,
                })?;
            let tag = format!("precalculated:{}", signature.to_hex());
            baked.push(Func::constant(name, tag, value));
        }
        Ok(self.update(baked))
    }

    // -----------------------------------------------------------------------
    // Cache attachment and maintenance
    // -----------------------------------------------------------------------

    /// Attaches a cache backend, replacing the current one.
    pub fn with_cache(&self, backend: impl CacheBackend + Send + 'static) -> Composer {
        let mut next = self.clone();
        next.cache = Arc::new(Mutex::new(backend));
        next
    }

    /// Attaches a fresh in-memory cache.
    pub fn memory_cache(&self) -> Composer {
        self.with_cache(MemoryCache::new())
    }

    /// Attaches an on-disk cache named `name` under `cache_dir` (or the
    /// default cache directory).
    pub fn persistent_cache(
        &self,
        name: &str,
        cache_dir: Option<&Path>,
    ) -> Result<Composer, CalcError> {
        let backend =
            PersistentCache::new(name, cache_dir).map_err(|source| CalcError::Cache {
                node: name.to_string(),
                operation: "open",
                source,
            })?;
        Ok(self.with_cache(backend))
    }

    /// Invalidates each given node and all its descendants in the attached
    /// cache.
    pub fn cache_invalidate<S: AsRef<str>>(&self, nodes: &[S]) -> Result<(), CalcError> {
        let dag = self.dag();
        for node in nodes {
            if !dag.contains(node.as_ref()) {
                return Err(GraphError::UnknownOutput {
                    name: node.as_ref().to_string(),
                }
                .into());
            }
        }
        let mut affected = dag.descendants_of(nodes);
        affected.extend(nodes.iter().map(|n| n.as_ref().to_string()));

        let mut cache = self.cache_lock();
        for node in &affected {
            cache.invalidate(node).map_err(|source| CalcError::Cache {
                node: node.clone(),
                operation: "invalidate",
                source,
            })?;
        }
        Ok(())
    }

    /// Invalidates every node.
    pub fn cache_clear(&self) -> Result<(), CalcError> {
        let mut cache = self.cache_lock();
        for node in self.functions.keys() {
            cache.invalidate(node).map_err(|source| CalcError::Cache {
                node: node.clone(),
                operation: "invalidate",
                source,
            })?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// The full dependency DAG of this composer.
    pub fn dag(&self) -> Dag {
        Dag::build(&self.functions)
    }

    /// The sub-DAG of the outputs and all their ancestors.
    pub fn ancestor_dag<S: AsRef<str>>(&self, outputs: &[S]) -> Result<Dag, GraphError> {
        for output in outputs {
            if !self.functions.contains_key(output.as_ref()) {
                return Err(GraphError::UnknownOutput {
                    name: output.as_ref().to_string(),
                });
            }
        }
        let full = self.dag();
        Ok(full.restrict(&full.ancestors_of(outputs)))
    }

    /// Accesses a registered node by name.
    pub fn raw_node(&self, name: &str) -> Option<&Node> {
        self.functions.get(name)
    }

    /// Registered node names, sorted.
    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    /// Yields diagnostics for the full graph, or for the ancestor sub-graph
    /// of the given outputs. Cycle records come before unbound records.
    pub fn check(&self, outputs: Option<&[&str]>) -> Result<Vec<Diagnostic>, GraphError> {
        let dag = match outputs {
            None => self.dag(),
            Some(outputs) => self.ancestor_dag(outputs)?,
        };
        Ok(check_graph(&self.functions, &dag))
    }

    // -----------------------------------------------------------------------
    // Calculation
    // -----------------------------------------------------------------------

    /// Calculates the requested outputs with default options.
    pub fn calculate<S: AsRef<str>>(
        &self,
        outputs: &[S],
    ) -> Result<BTreeMap<String, Value>, CalcError> {
        self.calculate_with(outputs, CalcOptions::default())
    }

    /// Calculates with explicit options, failing fast on the first error.
    pub fn calculate_with<S: AsRef<str>>(
        &self,
        outputs: &[S],
        mut opts: CalcOptions<'_>,
    ) -> Result<BTreeMap<String, Value>, CalcError> {
        let outputs: Vec<String> = outputs.iter().map(|s| s.as_ref().to_string()).collect();
        let calculation = run(self, &outputs, &mut opts, true)?;
        Ok(calculation.results)
    }

    /// Calculates in collect mode: execution failures are captured alongside
    /// the partial results instead of aborting. Construction errors still
    /// abort.
    pub fn calculate_collect<S: AsRef<str>>(
        &self,
        outputs: &[S],
        mut opts: CalcOptions<'_>,
    ) -> Result<Calculation, CalcError> {
        let outputs: Vec<String> = outputs.iter().map(|s| s.as_ref().to_string()).collect();
        run(self, &outputs, &mut opts, false)
    }

    /// Calculates a single output and returns its value.
    pub fn call(&self, output: &str) -> Result<Value, CalcError> {
        let mut results = self.calculate(&[output])?;
        results.remove(output).ok_or_else(|| {
            GraphError::UnknownOutput {
                name: output.to_string(),
            }
            .into()
        })
    }

    /// Like [`Composer::call`], accepting `.`-separated namespace paths.
    pub fn get(&self, output: &str) -> Result<Value, CalcError> {
        self.call(&output.replace('.', "__"))
    }

    /// Runs every registered test against the calculated graph.
    ///
    /// The referenced producers are calculated once up front; failures of
    /// individual test bodies are captured per record, and the whole run
    /// only fails when that calculation itself cannot begin.
    pub fn run_tests(&self) -> Result<Vec<TestResult>, CalcError> {
        let mut referenced: BTreeSet<String> = BTreeSet::new();
        for (name, test) in &self.tests {
            for descriptor in &test.params {
                match resolve_parameter(&self.functions, name, descriptor) {
                    Binding::Node(producer) => {
                        referenced.insert(producer);
                    }
                    Binding::Fanin(entries) => {
                        referenced.extend(entries.into_iter().map(|e| e.node));
                    }
                    // Unbound names flow into the calculation so the error
                    // reports them as unknown outputs.
                    Binding::Unbound(placeholder) => {
                        referenced.insert(placeholder);
                    }
                    Binding::Default => {}
                }
            }
        }
        let referenced: Vec<String> = referenced.into_iter().collect();
        let results = if referenced.is_empty() {
            BTreeMap::new()
        } else {
            self.calculate(&referenced)?
        };

        let mut outcomes = Vec::new();
        for (name, test) in &self.tests {
            let resolved: Vec<ResolvedParam<'_>> = test
                .params
                .iter()
                .map(|descriptor| ResolvedParam {
                    binding: resolve_parameter(&self.functions, name, descriptor),
                    descriptor,
                })
                .collect();
            let args = assemble_args(&resolved, &results, name)?;
            let outcome = match (test.body)(&args) {
                Ok(()) => TestResult {
                    name: name.clone(),
                    passed: true,
                    error: None,
                },
                Err(error) => TestResult {
                    name: name.clone(),
                    passed: false,
                    error: Some(error),
                },
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    // -----------------------------------------------------------------------
    // Crate-internal plumbing
    // -----------------------------------------------------------------------

    pub(crate) fn functions(&self) -> &BTreeMap<String, Node> {
        &self.functions
    }

    pub(crate) fn cache_lock(&self) -> MutexGuard<'_, dyn CacheBackend + Send + 'static> {
        self.cache
            .lock()
            .unwrap_or_else(move |poisoned| poisoned.into_inner())
    }

    /// Current content signature per registered node.
    pub(crate) fn signatures(
        &self,
    ) -> Result<BTreeMap<String, ContentSignature>, CalcError> {
        self.functions
            .iter()
            .map(|(name, node)| {
                node_signature(node, self.source_map.get(name).map(String::as_str))
                    .map(|sig| (name.clone(), sig))
                    .map_err(|source| CalcError::Cache {
                        node: name.clone(),
                        operation: "hash",
                        source,
                    })
            })
            .collect()
    }

    /// Shared installer for node-bearing updates. Replaced names trigger
    /// descendant invalidation against the pre-update graph.
    fn install(
        &self,
        nodes: Vec<Node>,
        parameters: Vec<(String, ValueType, Value)>,
        sources: Vec<(String, String)>,
    ) -> Composer {
        let replaced: Vec<String> = nodes
            .iter()
            .map(|node| node.name().to_string())
            .filter(|name| self.functions.contains_key(name))
            .collect();
        if !replaced.is_empty() {
            self.invalidate_replaced(&replaced);
        }

        let mut next = self.clone();
        for node in nodes {
            // A non-parameter node taking over a name retires its typed row.
            if !matches!(node, Node::Parameter(_)) {
                next.parameters.remove(node.name());
            }
            next.functions.insert(node.name().to_string(), node);
        }
        for (name, ty, value) in parameters {
            next.parameters.insert(name, (ty, value));
        }
        for (name, text) in sources {
            next.source_map.insert(name, text);
        }
        next
    }

    fn invalidate_replaced(&self, nodes: &[String]) {
        let dag = self.dag();
        let mut affected = dag.descendants_of(nodes);
        affected.extend(nodes.iter().cloned());
        let mut cache = self.cache_lock();
        for node in &affected {
            if let Err(error) = cache.invalidate(node) {
                warn!(node = %node, %error, "cache invalidation for replaced node failed");
            }
        }
    }
}

impl Default for Composer {
    fn default() -> Self {
        Composer::new()
    }
}

impl fmt::Debug for Composer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composer")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .field("parameters", &self.parameters)
            .field("tests", &self.tests.keys().collect::<Vec<_>>())
            .field("source_map", &self.source_map.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
