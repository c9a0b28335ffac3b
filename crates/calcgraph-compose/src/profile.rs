//! Wall-clock profiling built on the progress event protocol.
//!
//! [`Profiler`] is an ordinary event consumer: feed it every event from a
//! calculation and it accumulates per-node timing split into execution,
//! cache retrieval, cache store, and step overhead, plus the planning time
//! between `start_calculation` and `prepared_calculation`.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::time::{Duration, Instant};

use crate::event::Event;

/// Accumulated timings for one node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeProfile {
    /// Whole-step duration, eviction bookkeeping included.
    pub total: Duration,
    /// Time inside the node's own callable.
    pub execution: Duration,
    pub cache_retrieval: Duration,
    pub cache_store: Duration,
}

impl NodeProfile {
    /// Step time not accounted for by execution or cache traffic.
    pub fn overhead(&self) -> Duration {
        self.total
            .saturating_sub(self.execution)
            .saturating_sub(self.cache_retrieval)
            .saturating_sub(self.cache_store)
    }
}

/// Collects per-node wall-clock timings from progress events.
#[derive(Debug, Default)]
pub struct Profiler {
    open: HashMap<(&'static str, String), Instant>,
    preparation_start: Option<Instant>,
    preparation: Duration,
    profiles: BTreeMap<String, NodeProfile>,
}

impl Profiler {
    pub fn new() -> Self {
        Profiler::default()
    }

    /// Feeds one event. Call from the calculation's progress callback.
    pub fn record(&mut self, event: &Event) {
        let now = Instant::now();
        match event {
            Event::StartCalculation { .. } => {
                self.preparation_start = Some(now);
            }
            Event::PreparedCalculation { .. } => {
                if let Some(started) = self.preparation_start.take() {
                    self.preparation += now - started;
                }
            }
            Event::StartStep { name, .. } => self.open_span("step", name, now),
            Event::EndStep { name, .. } => {
                let elapsed = self.close_span("step", name, now);
                self.profiles.entry(name.clone()).or_default().total += elapsed;
            }
            Event::StartFunction { name } => self.open_span("function", name, now),
            Event::EndFunction { name } => {
                let elapsed = self.close_span("function", name, now);
                self.profiles.entry(name.clone()).or_default().execution += elapsed;
            }
            Event::StartCacheRetrieval { name } => self.open_span("retrieval", name, now),
            Event::EndCacheRetrieval { name } => {
                let elapsed = self.close_span("retrieval", name, now);
                self.profiles.entry(name.clone()).or_default().cache_retrieval += elapsed;
            }
            Event::StartCacheStore { name } => self.open_span("store", name, now),
            Event::EndCacheStore { name } => {
                let elapsed = self.close_span("store", name, now);
                self.profiles.entry(name.clone()).or_default().cache_store += elapsed;
            }
        }
    }

    fn open_span(&mut self, category: &'static str, name: &str, now: Instant) {
        self.open.insert((category, name.to_string()), now);
    }

    fn close_span(&mut self, category: &'static str, name: &str, now: Instant) -> Duration {
        match self.open.remove(&(category, name.to_string())) {
            Some(started) => now - started,
            None => Duration::ZERO,
        }
    }

    /// Time spent between calculation start and plan readiness.
    pub fn preparation(&self) -> Duration {
        self.preparation
    }

    /// Per-node timings, keyed by node name.
    pub fn profiles(&self) -> &BTreeMap<String, NodeProfile> {
        &self.profiles
    }

    /// A plain-text report, slowest nodes first.
    pub fn report(&self) -> String {
        let mut rows: Vec<(&String, &NodeProfile)> = self.profiles.iter().collect();
        rows.sort_by(|a, b| b.1.total.cmp(&a.1.total).then_with(|| a.0.cmp(b.0)));

        let mut out = String::new();
        let _ = writeln!(out, "preparation: {:?}", self.preparation);
        for (name, profile) in rows {
            let _ = writeln!(
                out,
                "{name}: total {:?} (execution {:?}, retrieval {:?}, store {:?}, overhead {:?})",
                profile.total,
                profile.execution,
                profile.cache_retrieval,
                profile.cache_store,
                profile.overhead()
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composer::Composer;
    use crate::executor::CalcOptions;
    use crate::plan::Instruction;
    use calcgraph_core::node::Func;
    use calcgraph_core::param::ParamDescriptor;
    use calcgraph_core::value::Value;

    #[test]
    fn spans_pair_up() {
        let mut profiler = Profiler::new();
        profiler.record(&Event::StartStep {
            name: "a".to_string(),
            instruction: Instruction::Calculate,
        });
        profiler.record(&Event::StartFunction {
            name: "a".to_string(),
        });
        profiler.record(&Event::EndFunction {
            name: "a".to_string(),
        });
        profiler.record(&Event::EndStep {
            name: "a".to_string(),
            instruction: Instruction::Calculate,
            result: None,
        });

        let profile = profiler.profiles()["a"];
        assert!(profile.total >= profile.execution);
        assert!(profiler.open.is_empty());
    }

    #[test]
    fn unmatched_end_counts_as_zero() {
        let mut profiler = Profiler::new();
        profiler.record(&Event::EndFunction {
            name: "ghost".to_string(),
        });
        assert_eq!(profiler.profiles()["ghost"].execution, Duration::ZERO);
    }

    #[test]
    fn profiles_a_real_calculation() {
        let composer = Composer::new()
            .update([
                Func::new("a", "a=5", vec![], |_| Ok(Value::Int(5))),
                Func::new(
                    "b",
                    "b=a*2",
                    vec![ParamDescriptor::required("a")],
                    |args| Ok(Value::Int(args.int("a")? * 2)),
                ),
            ])
            .memory_cache();

        let mut profiler = Profiler::new();
        {
            let mut callback = |event: &Event| profiler.record(event);
            composer
                .calculate_with(&["b"], CalcOptions::default().on_event(&mut callback))
                .unwrap();
        }

        assert!(profiler.profiles().contains_key("a"));
        assert!(profiler.profiles().contains_key("b"));
        let report = profiler.report();
        assert!(report.contains("preparation"));
        assert!(report.contains("b: total"));
    }
}
