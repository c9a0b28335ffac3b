//! Progress events emitted during a calculation.
//!
//! A caller may observe execution through a synchronous callback; events are
//! informational and suppressing them never changes results. Every `Start*`
//! event is paired with exactly one matching `End*`, including on failure
//! paths. Each variant carries the current node's name where one applies.

use calcgraph_core::value::Value;

use crate::plan::Instruction;

/// One progress event. See the variant names for the protocol;
/// [`Event::tag`] gives the wire-style snake_case tag.
#[derive(Debug, Clone)]
pub enum Event {
    /// Calculation requested; checks and planning follow.
    StartCalculation { outputs: Vec<String> },
    /// Planning finished; execution of the instruction stream begins.
    PreparedCalculation {
        instructions: Vec<(String, Instruction)>,
        graph_nodes: Vec<String>,
        graph_edges: Vec<(String, String)>,
    },
    StartStep {
        name: String,
        instruction: Instruction,
    },
    EndStep {
        name: String,
        instruction: Instruction,
        /// The node's value if the step produced or retrieved one.
        result: Option<Value>,
    },
    StartFunction { name: String },
    EndFunction { name: String },
    StartCacheRetrieval { name: String },
    EndCacheRetrieval { name: String },
    StartCacheStore { name: String },
    EndCacheStore { name: String },
}

impl Event {
    /// The stable snake_case tag for this event.
    pub fn tag(&self) -> &'static str {
        match self {
            Event::StartCalculation { .. } => "start_calculation",
            Event::PreparedCalculation { .. } => "prepared_calculation",
            Event::StartStep { .. } => "start_step",
            Event::EndStep { .. } => "end_step",
            Event::StartFunction { .. } => "start_function",
            Event::EndFunction { .. } => "end_function",
            Event::StartCacheRetrieval { .. } => "start_cache_retrieval",
            Event::EndCacheRetrieval { .. } => "end_cache_retrieval",
            Event::StartCacheStore { .. } => "start_cache_store",
            Event::EndCacheStore { .. } => "end_cache_store",
        }
    }

    /// The node the event concerns, for per-node events.
    pub fn node(&self) -> Option<&str> {
        match self {
            Event::StartCalculation { .. } | Event::PreparedCalculation { .. } => None,
            Event::StartStep { name, .. }
            | Event::EndStep { name, .. }
            | Event::StartFunction { name }
            | Event::EndFunction { name }
            | Event::StartCacheRetrieval { name }
            | Event::EndCacheRetrieval { name }
            | Event::StartCacheStore { name }
            | Event::EndCacheStore { name } => Some(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_snake_case() {
        let event = Event::StartCacheRetrieval {
            name: "a".to_string(),
        };
        assert_eq!(event.tag(), "start_cache_retrieval");
        assert_eq!(event.node(), Some("a"));
    }

    #[test]
    fn calculation_events_have_no_node() {
        let event = Event::StartCalculation {
            outputs: vec!["c".to_string()],
        };
        assert_eq!(event.node(), None);
    }
}
