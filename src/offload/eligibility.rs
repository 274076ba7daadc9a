// This module implements the offload candidate scan. For parallel-algorithm offloading
// any defined function may end up being called from accelerator code, so every
// definition that has not been linked yet is run through an ordered battery of
// disqualifying checks: declaration properties (virtual, program entry, escaping
// address, static constructor or destructor, front-end internal name), call-edge
// properties (indirect calls, throwing callees, callees with indirect calls) and an
// instruction scan looking for function addresses, global-variable addresses and
// return-slot-optimized calls. The first failing check decides the reason. Rejected
// functions lose their offload-eligibility marker; rejected explicit kernels are
// removed from the call graph after the traversal, since they could otherwise be
// neither compiled for the accelerator nor called on the host. The remaining rejected
// functions are reported back so the classifier keeps them on the host even when an
// explicit marker asks for a clone. Accepted functions receive the universal marker
// that the classifier later turns into a clone.

//! Offload candidate scan.

use crate::core::{Attribute, CallGraph, InstKind, OperandKind, PassSession, Severity};
use super::summary::SummaryStore;
use hashbrown::HashSet;
use std::fmt;
use std::hash::Hash;

/// Why a function cannot be prepared for offloading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IneligibleReason {
    VirtualFunction,
    MainFunction,
    IndirectFunction,
    HasIndirectCalls,
    StaticConstructorOrDestructor,
    CallsThrowingFunctions,
    CallsFunctionsWithIndirectCalls,
    FrontendInternal,
    TakesFunctionAddress,
    UnsupportedGlobalVariable,
    ReturnSlotOptimization,
}

impl IneligibleReason {
    pub const fn description(self) -> &'static str {
        match self {
            IneligibleReason::VirtualFunction => "virtual function",
            IneligibleReason::MainFunction => "main function",
            IneligibleReason::IndirectFunction => "indirect function",
            IneligibleReason::HasIndirectCalls => "has indirect calls",
            IneligibleReason::StaticConstructorOrDestructor => {
                "static object constructor or destructor"
            }
            IneligibleReason::CallsThrowingFunctions => "calls to functions that throw exceptions",
            IneligibleReason::CallsFunctionsWithIndirectCalls => {
                "calls to functions with indirect calls"
            }
            IneligibleReason::FrontendInternal => "C++ frontend internal function",
            IneligibleReason::TakesFunctionAddress => "takes a function's address",
            IneligibleReason::UnsupportedGlobalVariable => {
                "refers to an unsupported global variable"
            }
            IneligibleReason::ReturnSlotOptimization => "calls with return slot optimization",
        }
    }
}

impl fmt::Display for IneligibleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Outcome of the candidate checks for one function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Eligible,
    Ineligible(IneligibleReason),
}

impl Verdict {
    pub fn is_eligible(self) -> bool {
        self == Verdict::Eligible
    }
}

/// Run the ordered checks on `node`. The first failing check wins.
pub fn check_eligibility<G: CallGraph>(graph: &G, node: G::NodeRef) -> Verdict {
    use IneligibleReason::*;

    let decl = graph.decl_flags(node);
    let flags = graph.node_flags(node);
    let name = graph.name(node);
    let is_kernel = graph.has_attribute(node, Attribute::HsaKernel);

    if decl.is_virtual {
        return Verdict::Ineligible(VirtualFunction);
    }
    if name == "main" {
        return Verdict::Ineligible(MainFunction);
    }
    if flags.address_taken {
        return Verdict::Ineligible(IndirectFunction);
    }
    if graph.has_indirect_calls(node) {
        return Verdict::Ineligible(HasIndirectCalls);
    }
    if decl.static_constructor || decl.static_destructor {
        return Verdict::Ineligible(StaticConstructorOrDestructor);
    }

    // Kernels may call placeholder declarations, which look like they throw.
    for edge in graph.callees(node) {
        if !is_kernel && graph.edge_can_throw_external(edge) {
            return Verdict::Ineligible(CallsThrowingFunctions);
        }
        if graph.has_indirect_calls(graph.edge_callee(edge)) {
            return Verdict::Ineligible(CallsFunctionsWithIndirectCalls);
        }
    }

    if name.ends_with(' ') {
        return Verdict::Ineligible(FrontendInternal);
    }

    match scan_body(graph, node) {
        Some(reason) => Verdict::Ineligible(reason),
        None => Verdict::Eligible,
    }
}

/// Look for instruction patterns the accelerator back end cannot express.
fn scan_body<G: CallGraph>(graph: &G, node: G::NodeRef) -> Option<IneligibleReason> {
    for block in graph.blocks(node) {
        for inst in graph.block_insts(block) {
            match graph.inst_kind(inst) {
                InstKind::Debug => continue,
                InstKind::Call { return_slot_opt: true } => {
                    return Some(IneligibleReason::ReturnSlotOptimization);
                }
                InstKind::Call { .. } | InstKind::Other => {}
            }

            for operand in graph.inst_operands(inst) {
                match operand {
                    OperandKind::FunctionAddress => {
                        return Some(IneligibleReason::TakesFunctionAddress);
                    }
                    OperandKind::VariableAddress { global: true } => {
                        return Some(IneligibleReason::UnsupportedGlobalVariable);
                    }
                    OperandKind::VariableAddress { global: false } | OperandKind::Value => {}
                }
            }
        }
    }
    None
}

/// What a candidate scan rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateScan<N: Hash + Eq> {
    /// Rejected explicit kernels, removed from the call graph.
    pub removed: Vec<N>,
    /// Other rejected functions; they must stay host-only.
    pub rejected: HashSet<N>,
}

impl<N: Hash + Eq> Default for CandidateScan<N> {
    fn default() -> Self {
        Self { removed: Vec::new(), rejected: HashSet::new() }
    }
}

/// Mark every eligible, unlinked definition as universal.
///
/// Rejected functions lose the offload-eligibility marker. Rejected explicit
/// kernels are removed once the traversal is over.
pub fn mark_offload_candidates<G: CallGraph>(
    graph: &mut G,
    summaries: &mut SummaryStore<G::NodeRef>,
    verbose: bool,
    session: &PassSession<'_>,
) -> CandidateScan<G::NodeRef> {
    let mut nodes_to_remove = Vec::new();
    let mut rejected = HashSet::new();
    let nodes: Vec<_> = graph.defined_functions().collect();

    for node in nodes {
        log::debug!("CONSIDERING function '{}' for HSA offloading.", graph.name(node));

        if summaries.get_mut(node).bound_function.is_some() {
            continue;
        }
        session.record_considered();

        match check_eligibility(&*graph, node) {
            Verdict::Ineligible(reason) => {
                session.record_rejected();
                if verbose {
                    session.emit(
                        Severity::Note,
                        graph.name(node),
                        format_args!(
                            "Unable to prepare '{}' for HSA offloading ({}).",
                            graph.name(node),
                            reason
                        ),
                    );
                }
                graph.remove_attribute(node, Attribute::OmpDeclareTarget);
                if graph.has_attribute(node, Attribute::HsaKernel) {
                    nodes_to_remove.push(node);
                } else {
                    rejected.insert(node);
                }
            }
            Verdict::Eligible => {
                if !graph.has_attribute(node, Attribute::HsaUniversal) {
                    graph.add_attribute(node, Attribute::HsaUniversal);
                }
                log::debug!("MARKED function '{}' for HSA offloading.", graph.name(node));
            }
        }
    }

    for &node in &nodes_to_remove {
        log::debug!("Removing unsupported kernel '{}'.", graph.name(node));
        graph.remove(node);
        summaries.remove_node(node);
        session.record_removed();
    }

    CandidateScan { removed: nodes_to_remove, rejected }
}
