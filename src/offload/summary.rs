//! Per-function offload summaries.
//!
//! Every call-graph node gets a [`FunctionSummary`] the first time the pass
//! looks at it. Summaries hold the offload kind, whether the node is the
//! accelerator-side implementation, and a non-owning handle to the paired
//! node. The store is owned by the pass and handed to each step by reference.

use hashbrown::HashMap;
use std::fmt;
use std::hash::Hash;

/// Offload role of a function.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    /// Not an offload participant.
    #[default]
    None,
    Kernel,
    Function,
}

impl FunctionKind {
    /// Two-bit encoding used by the summary stream.
    pub const fn bits(self) -> u64 {
        match self {
            FunctionKind::None => 0,
            FunctionKind::Kernel => 1,
            FunctionKind::Function => 2,
        }
    }

    pub const fn from_bits(bits: u64) -> Option<Self> {
        match bits {
            0 => Some(FunctionKind::None),
            1 => Some(FunctionKind::Kernel),
            2 => Some(FunctionKind::Function),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            FunctionKind::None => "none",
            FunctionKind::Kernel => "kernel",
            FunctionKind::Function => "function",
        }
    }
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Offload metadata for one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionSummary<N> {
    pub kind: FunctionKind,
    /// This node is the accelerator-side variant.
    pub is_accelerator_implementation: bool,
    /// Accelerator clone of a host original.
    pub bound_function: Option<N>,
}

impl<N> Default for FunctionSummary<N> {
    fn default() -> Self {
        Self {
            kind: FunctionKind::None,
            is_accelerator_implementation: false,
            bound_function: None,
        }
    }
}

impl<N> FunctionSummary<N> {
    pub fn is_participant(&self) -> bool {
        self.kind != FunctionKind::None
    }

    /// Already decided by an earlier sweep: a linked host original, or an
    /// accelerator implementation.
    pub fn is_resolved(&self) -> bool {
        self.bound_function.is_some()
            || (self.is_participant() && self.is_accelerator_implementation)
    }
}

/// Summaries of all nodes the pass has looked at.
#[derive(Debug, Clone)]
pub struct SummaryStore<N> {
    entries: HashMap<N, FunctionSummary<N>>,
}

impl<N: Copy + Eq + Hash> Default for SummaryStore<N> {
    fn default() -> Self {
        Self { entries: HashMap::new() }
    }
}

impl<N: Copy + Eq + Hash> SummaryStore<N> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Summary of `node`, or the default summary if none was created yet.
    pub fn get(&self, node: N) -> FunctionSummary<N> {
        self.entries.get(&node).copied().unwrap_or_default()
    }

    /// Summary of `node`, created on first use.
    pub fn get_mut(&mut self, node: N) -> &mut FunctionSummary<N> {
        self.entries.entry(node).or_default()
    }

    pub fn contains(&self, node: N) -> bool {
        self.entries.contains_key(&node)
    }

    /// Number of summaries created so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Make `node` an accelerator-only implementation of `kind`; no host
    /// counterpart exists.
    pub fn mark_accelerator_only(&mut self, node: N, kind: FunctionKind) {
        let summary = self.get_mut(node);
        summary.kind = kind;
        summary.is_accelerator_implementation = true;
    }

    /// Pair an accelerator clone with its host original. The host original
    /// points to the clone; the clone is recognised by its implementation flag.
    pub fn link_functions(&mut self, accelerator: N, host: N, kind: FunctionKind) {
        let clone = self.get_mut(accelerator);
        clone.kind = kind;
        clone.is_accelerator_implementation = true;
        clone.bound_function = None;

        let original = self.get_mut(host);
        original.kind = kind;
        original.is_accelerator_implementation = false;
        original.bound_function = Some(accelerator);
    }

    /// Forget `node` and every link pointing at it.
    pub fn remove_node(&mut self, node: N) {
        self.entries.remove(&node);
        for summary in self.entries.values_mut() {
            if summary.bound_function == Some(node) {
                summary.bound_function = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_creates_default_entry() {
        let mut store: SummaryStore<u32> = SummaryStore::new();
        assert!(!store.contains(7));
        assert_eq!(store.get(7).kind, FunctionKind::None);
        assert!(!store.contains(7));

        store.get_mut(7);
        assert!(store.contains(7));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn link_sets_both_sides() {
        let mut store = SummaryStore::new();
        store.link_functions(10u32, 1u32, FunctionKind::Kernel);

        let clone = store.get(10);
        let host = store.get(1);
        assert_eq!(clone.kind, FunctionKind::Kernel);
        assert!(clone.is_accelerator_implementation);
        assert_eq!(clone.bound_function, None);
        assert_eq!(host.kind, FunctionKind::Kernel);
        assert!(!host.is_accelerator_implementation);
        assert_eq!(host.bound_function, Some(10));
        assert!(clone.is_resolved() && host.is_resolved());
    }

    #[test]
    fn accelerator_only_is_resolved() {
        let mut store = SummaryStore::new();
        store.mark_accelerator_only(3u32, FunctionKind::Kernel);
        let s = store.get(3);
        assert!(s.is_accelerator_implementation);
        assert!(s.is_resolved());

        // Classified by an earlier stage but not yet cloned.
        store.get_mut(4).kind = FunctionKind::Function;
        assert!(!store.get(4).is_resolved());
    }

    #[test]
    fn removing_node_clears_links() {
        let mut store = SummaryStore::new();
        store.link_functions(2u32, 1u32, FunctionKind::Function);
        store.remove_node(2);
        assert!(!store.contains(2));
        assert_eq!(store.get(1).bound_function, None);
        assert_eq!(store.get(1).kind, FunctionKind::Function);
    }

    #[test]
    fn kind_bits_roundtrip() {
        for kind in [FunctionKind::None, FunctionKind::Kernel, FunctionKind::Function] {
            assert_eq!(FunctionKind::from_bits(kind.bits()), Some(kind));
        }
        assert_eq!(FunctionKind::from_bits(3), None);
    }
}
