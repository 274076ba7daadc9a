// This module ties the offload steps into the pass object the host pipeline drives.
// OffloadPass owns the summary store (created lazily on first use, never global) and
// exposes the pipeline interface: gate decides whether the pass runs at all, execute
// performs the candidate scan (parallel-offload mode only), the classification and
// cloning sweep and the edge-redirection sweep, and the write/read summary operations
// move the store through object-file sections at serialization checkpoints. The
// optimization-summary entry points are the same operations, used at the second
// checkpoint of whole-program compilation.

//! Accelerator offload pass.
//!
//! ```ignore
//! use offload_ipa::{OffloadPass, PassOptions, PassSession, text_ir::Module};
//! use bumpalo::Bump;
//!
//! let mut module = Module::parse(source)?;
//! let arena = Bump::new();
//! let session = PassSession::new(&arena);
//! let mut pass = OffloadPass::new(PassOptions::new().offload_requested(true));
//! if pass.gate() {
//!     pass.execute(&mut module, &session);
//! }
//! ```

pub mod classify;
pub mod codec;
pub mod eligibility;
pub mod lto;
pub mod redirect;
pub mod summary;

pub use classify::{classify, create_offload_clones, OffloadClass, CLONE_SUFFIX};
pub use codec::{read_summary, write_summary, SymtabEncoder};
pub use eligibility::{
    check_eligibility, mark_offload_candidates, CandidateScan, IneligibleReason, Verdict,
};
pub use redirect::redirect_edges;
pub use summary::{FunctionKind, FunctionSummary, SummaryStore};

use crate::core::{CallGraph, OffloadResult, PassOptions, PassSession};
use std::fmt::Write as _;

/// What one execution of the pass changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport<N> {
    /// Rejected explicit kernels removed from the call graph.
    pub removed: Vec<N>,
    /// Accelerator clones, in creation order.
    pub clones: Vec<N>,
    /// Number of call edges retargeted to accelerator clones.
    pub redirected: usize,
}

/// The interprocedural offload pass.
pub struct OffloadPass<G: CallGraph> {
    options: PassOptions,
    summaries: Option<SummaryStore<G::NodeRef>>,
}

impl<G: CallGraph> OffloadPass<G> {
    pub fn new(options: PassOptions) -> Self {
        Self { options, summaries: None }
    }

    pub fn options(&self) -> &PassOptions {
        &self.options
    }

    /// Run only when accelerator code generation was requested.
    pub fn gate(&self) -> bool {
        self.options.offload_requested
    }

    /// The summary store, if any step has created it yet.
    pub fn summaries(&self) -> Option<&SummaryStore<G::NodeRef>> {
        self.summaries.as_ref()
    }

    /// The summary store, created on first use.
    pub fn summaries_mut(&mut self) -> &mut SummaryStore<G::NodeRef> {
        self.summaries.get_or_insert_with(SummaryStore::new)
    }

    /// Scan, classify and clone, then redirect accelerator call edges.
    pub fn execute(&mut self, graph: &mut G, session: &PassSession<'_>) -> PassReport<G::NodeRef> {
        let options = self.options;
        let summaries = self.summaries.get_or_insert_with(SummaryStore::new);

        let scan = if options.parallel_offload {
            mark_offload_candidates(graph, summaries, options.verbose, session)
        } else {
            CandidateScan::default()
        };
        let clones = create_offload_clones(graph, summaries, &scan.rejected, &options, session);
        let redirected = redirect_edges(graph, summaries, session);

        log::info!(
            "Offload pass: {} clones created, {} edges redirected, {} kernels removed",
            clones.len(),
            redirected,
            scan.removed.len()
        );

        PassReport { removed: scan.removed, clones, redirected }
    }

    /// Summary stream for the partition described by `encoder`, or `None`
    /// when no summaries exist.
    pub fn write_summary_stream(
        &self,
        graph: &G,
        encoder: &SymtabEncoder<G::NodeRef>,
    ) -> Option<Vec<u8>> {
        self.summaries
            .as_ref()
            .map(|summaries| write_summary(graph, summaries, encoder))
    }

    /// Object file carrying the summary section, or `None` when no summaries
    /// exist.
    pub fn write_summary(
        &self,
        graph: &G,
        encoder: &SymtabEncoder<G::NodeRef>,
    ) -> OffloadResult<Option<Vec<u8>>> {
        self.write_summary_stream(graph, encoder)
            .map(|stream| lto::write_summary_section(&stream))
            .transpose()
    }

    /// Read a bare summary stream. Returns the number of entries read.
    pub fn read_summary_stream(
        &mut self,
        graph: &mut G,
        encoder: &SymtabEncoder<G::NodeRef>,
        stream: &[u8],
    ) -> OffloadResult<usize> {
        let summaries = self.summaries_mut();
        read_summary(graph, summaries, encoder, stream)
    }

    /// Read the summary section of every object file that has one. Returns
    /// the number of entries read.
    pub fn read_summary(
        &mut self,
        graph: &mut G,
        encoder: &SymtabEncoder<G::NodeRef>,
        files: &[&[u8]],
    ) -> OffloadResult<usize> {
        let streams = lto::read_summary_sections(files)?;
        let summaries = self.summaries_mut();
        let mut entries = 0;
        for stream in streams {
            entries += read_summary(graph, summaries, encoder, stream)?;
        }
        Ok(entries)
    }

    pub fn write_optimization_summary(
        &self,
        graph: &G,
        encoder: &SymtabEncoder<G::NodeRef>,
    ) -> OffloadResult<Option<Vec<u8>>> {
        self.write_summary(graph, encoder)
    }

    pub fn read_optimization_summary(
        &mut self,
        graph: &mut G,
        encoder: &SymtabEncoder<G::NodeRef>,
        files: &[&[u8]],
    ) -> OffloadResult<usize> {
        self.read_summary(graph, encoder, files)
    }

    /// One line per participating function, in graph order.
    pub fn dump(&self, graph: &G) -> String {
        let mut out = String::new();
        let Some(summaries) = self.summaries.as_ref() else {
            return out;
        };
        for node in graph.functions() {
            let s = summaries.get(node);
            if !s.is_participant() {
                continue;
            }
            let role = if s.is_accelerator_implementation { "accelerator" } else { "host" };
            let _ = write!(out, "Summary {}: kind={} role={}", graph.name(node), s.kind, role);
            if let Some(bound) = s.bound_function {
                let _ = write!(out, " bound={}", graph.name(bound));
            }
            out.push('\n');
        }
        out
    }
}
