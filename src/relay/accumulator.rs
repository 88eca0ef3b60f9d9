use smallvec::SmallVec;

use crate::stream::ToolCallDelta;

/// Phase of one accumulation pass.
///
/// `Executed` is the one-shot latch: a repeated terminal marker cannot drain
/// a second batch until [`ToolCallAccumulator::finish_batch`] re-arms the
/// machine for a later tool-call round in the same stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Accumulating,
    Executed,
}

/// A partially reassembled tool call, keyed by its delta index.
///
/// The provider sends `name` once in full (replace) and `arguments`
/// incrementally (append).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Fragment {
    name: String,
    arguments: String,
}

/// A fully reassembled invocation awaiting execution. `arguments` is the
/// concatenation of all argument-text deltas for its index, not yet parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInvocation {
    pub name: String,
    pub arguments: String,
}

/// Merges per-chunk tool-call fragments into complete invocations and
/// guarantees each completed batch is drained exactly once.
pub struct ToolCallAccumulator {
    phase: Phase,
    fragments: SmallVec<[Fragment; 4]>,
}

impl ToolCallAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            fragments: SmallVec::new(),
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Merge one frame's tool-call delta entries.
    ///
    /// The fragment list grows lazily so `fragments[index]` always exists
    /// before assignment; entries may arrive in any index order.
    pub fn absorb(&mut self, deltas: &[ToolCallDelta]) {
        if deltas.is_empty() {
            return;
        }
        self.phase = Phase::Accumulating;
        for delta in deltas {
            let index = delta.index as usize;
            if index >= self.fragments.len() {
                self.fragments.resize(index + 1, Fragment::default());
            }
            let Some(function) = &delta.function else {
                continue;
            };
            let fragment = &mut self.fragments[index];
            if let Some(name) = &function.name {
                fragment.name.clone_from(name);
            }
            if let Some(arguments) = &function.arguments {
                fragment.arguments.push_str(arguments);
            }
        }
    }

    /// React to a terminal `tool_calls` marker: drain the batch exactly once.
    ///
    /// Returns `None` when nothing is accumulating — including when the
    /// marker repeats after a batch already executed. Fragments without both
    /// a name and argument text are dropped; the rest are yielded in
    /// fragment-index order.
    #[must_use]
    pub fn take_batch(&mut self) -> Option<Vec<PendingInvocation>> {
        if self.phase != Phase::Accumulating {
            return None;
        }
        self.phase = Phase::Executed;
        Some(
            self.fragments
                .iter()
                .filter(|fragment| !fragment.name.is_empty() && !fragment.arguments.is_empty())
                .map(|fragment| PendingInvocation {
                    name: fragment.name.clone(),
                    arguments: fragment.arguments.clone(),
                })
                .collect(),
        )
    }

    /// Re-arm after a drained batch has finished executing, clearing the
    /// fragment list so a later round accumulates independently.
    pub fn finish_batch(&mut self) {
        self.fragments.clear();
        self.phase = Phase::Idle;
    }
}

impl Default for ToolCallAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{FunctionDelta, ToolCallDelta};

    fn delta(index: u32, name: Option<&str>, arguments: Option<&str>) -> ToolCallDelta {
        ToolCallDelta {
            index,
            id: None,
            function: Some(FunctionDelta {
                name: name.map(str::to_string),
                arguments: arguments.map(str::to_string),
            }),
        }
    }

    #[test]
    fn test_idle_until_first_tool_call_delta() {
        let mut acc = ToolCallAccumulator::new();
        assert_eq!(acc.phase(), Phase::Idle);
        assert!(acc.take_batch().is_none());
        acc.absorb(&[delta(0, Some("calculator"), None)]);
        assert_eq!(acc.phase(), Phase::Accumulating);
    }

    #[test]
    fn test_name_replaces_arguments_append() {
        let mut acc = ToolCallAccumulator::new();
        acc.absorb(&[delta(0, Some("calculator"), Some("{\"co"))]);
        acc.absorb(&[delta(0, None, Some("de\":"))]);
        acc.absorb(&[delta(0, None, Some("\"2+2\"}"))]);
        let batch = acc.take_batch().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].name, "calculator");
        assert_eq!(batch[0].arguments, "{\"code\":\"2+2\"}");
    }

    #[test]
    fn test_arguments_may_arrive_before_name() {
        let mut acc = ToolCallAccumulator::new();
        acc.absorb(&[delta(0, None, Some("{\"city\":"))]);
        acc.absorb(&[delta(0, None, Some("\"北京\"}"))]);
        acc.absorb(&[delta(0, Some("weather_query"), None)]);
        let batch = acc.take_batch().unwrap();
        assert_eq!(batch[0].name, "weather_query");
        assert_eq!(batch[0].arguments, "{\"city\":\"北京\"}");
    }

    #[test]
    fn test_interleaved_indices_preserve_per_index_order() {
        let mut acc = ToolCallAccumulator::new();
        acc.absorb(&[
            delta(1, Some("weather_query"), Some("{\"ci")),
            delta(0, Some("calculator"), Some("{\"co")),
        ]);
        acc.absorb(&[delta(0, None, Some("de\":\"1+1\"}"))]);
        acc.absorb(&[delta(1, None, Some("ty\":\"上海\"}"))]);
        let batch = acc.take_batch().unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].name, "calculator");
        assert_eq!(batch[0].arguments, "{\"code\":\"1+1\"}");
        assert_eq!(batch[1].name, "weather_query");
        assert_eq!(batch[1].arguments, "{\"city\":\"上海\"}");
    }

    #[test]
    fn test_sparse_index_grows_fragment_list() {
        let mut acc = ToolCallAccumulator::new();
        acc.absorb(&[delta(2, Some("calculator"), Some("{}"))]);
        let batch = acc.take_batch().unwrap();
        // indices 0 and 1 never completed; only index 2 is yielded
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].name, "calculator");
    }

    #[test]
    fn test_incomplete_fragments_are_dropped() {
        let mut acc = ToolCallAccumulator::new();
        acc.absorb(&[delta(0, Some("nameless_args"), None)]);
        acc.absorb(&[delta(1, None, Some("{\"orphan\":true}"))]);
        let batch = acc.take_batch().unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn test_double_terminal_is_idempotent() {
        let mut acc = ToolCallAccumulator::new();
        acc.absorb(&[delta(0, Some("calculator"), Some("{\"code\":\"2+2\"}"))]);
        let first = acc.take_batch();
        assert_eq!(first.unwrap().len(), 1);
        assert_eq!(acc.phase(), Phase::Executed);
        // terminal marker repeats before finish_batch
        assert!(acc.take_batch().is_none());
        acc.finish_batch();
        // and again after the reset, with nothing accumulated
        assert!(acc.take_batch().is_none());
    }

    #[test]
    fn test_later_round_accumulates_independently() {
        let mut acc = ToolCallAccumulator::new();
        acc.absorb(&[delta(0, Some("calculator"), Some("{\"code\":\"1\"}"))]);
        let _ = acc.take_batch().unwrap();
        acc.finish_batch();
        assert_eq!(acc.phase(), Phase::Idle);

        acc.absorb(&[delta(0, Some("web_search"), Some("{\"query\":\"rust\"}"))]);
        let batch = acc.take_batch().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].name, "web_search");
    }
}
