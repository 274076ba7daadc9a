//! Offload classification and accelerator cloning.
//!
//! Each node's markers and summary are folded into an [`OffloadClass`] once;
//! the sweep then dispatches on it. Clones are paired with their originals in
//! the summary store so the edge redirector can find them.

use crate::core::{Attribute, CallGraph, PassOptions, PassSession, Severity};
use super::summary::{FunctionKind, FunctionSummary, SummaryStore};
use hashbrown::HashSet;

/// Suffix handed to the call graph when naming accelerator clones.
pub const CLONE_SUFFIX: &str = "hsa";

/// Processing branch chosen for a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffloadClass {
    /// Linked or already an accelerator implementation; left alone.
    Resolved,
    /// Stand-in declaration for an accelerator callee bound later.
    Placeholder,
    /// Explicit accelerator entry point; becomes its own implementation.
    ExplicitKernel,
    /// Explicitly accelerator-callable (`explicit`), or classified earlier.
    Function { explicit: bool },
    /// Accepted by the candidate scan; compiled for host and accelerator.
    Universal,
    /// Offload-eligible declaration reached through target regions.
    ImplicitCallable,
    /// Host-only function.
    Host,
}

/// Fold markers and summary state of `node` into its processing branch.
pub fn classify<G: CallGraph>(
    graph: &G,
    node: G::NodeRef,
    summary: &FunctionSummary<G::NodeRef>,
) -> OffloadClass {
    let has = |attr| graph.has_attribute(node, attr);

    if summary.is_resolved() {
        OffloadClass::Resolved
    } else if has(Attribute::HsaPlaceholder) {
        OffloadClass::Placeholder
    } else if has(Attribute::HsaKernel) {
        OffloadClass::ExplicitKernel
    } else if has(Attribute::HsaFunction) {
        OffloadClass::Function { explicit: true }
    } else if summary.is_participant() {
        OffloadClass::Function { explicit: false }
    } else if has(Attribute::HsaUniversal) {
        OffloadClass::Universal
    } else if is_offload_callable(graph, node) && !graph.decl_flags(node).artificial {
        OffloadClass::ImplicitCallable
    } else {
        OffloadClass::Host
    }
}

/// Declarations inside target regions are callable from accelerator code,
/// OpenACC routines excepted.
pub fn is_offload_callable<G: CallGraph>(graph: &G, node: G::NodeRef) -> bool {
    graph.has_attribute(node, Attribute::OmpDeclareTarget)
        && !graph.has_attribute(node, Attribute::OaccFunction)
}

/// Classify every function and create the accelerator clones it needs.
///
/// Nodes created by this sweep are not visited by it. Nodes in `host_only`
/// are left untouched whatever their markers say. Returns the clones in
/// creation order.
pub fn create_offload_clones<G: CallGraph>(
    graph: &mut G,
    summaries: &mut SummaryStore<G::NodeRef>,
    host_only: &HashSet<G::NodeRef>,
    options: &PassOptions,
    session: &PassSession<'_>,
) -> Vec<G::NodeRef> {
    let mut clones = Vec::new();
    let nodes: Vec<_> = graph.functions().collect();

    for node in nodes {
        if host_only.contains(&node) {
            log::debug!("Keeping rejected function '{}' on the host.", graph.name(node));
            continue;
        }
        let summary = *summaries.get_mut(node);

        match classify(&*graph, node, &summary) {
            OffloadClass::Resolved | OffloadClass::Host => {}
            OffloadClass::Placeholder => {
                // Must reach the accelerator binary so it can be specialized.
                graph.set_public(node, true);
            }
            OffloadClass::ExplicitKernel => {
                summaries.mark_accelerator_only(node, FunctionKind::Kernel);
            }
            OffloadClass::Function { explicit } => {
                if explicit {
                    summaries.get_mut(node).kind = FunctionKind::Function;
                }
                let kind = summaries.get(node).kind;
                let public = graph.decl_flags(node).public;
                if let Some(clone) =
                    clone_and_link(graph, summaries, node, kind, public, options, session)
                {
                    clones.push(clone);
                }
            }
            OffloadClass::Universal => {
                if !graph.has_attribute(node, Attribute::OmpDeclareTarget) {
                    graph.add_attribute(node, Attribute::OmpDeclareTarget);
                }
                // The runtime looks universal clones up by symbol address.
                let public = options.parallel_offload || graph.decl_flags(node).public;
                if let Some(clone) = clone_and_link(
                    graph,
                    summaries,
                    node,
                    FunctionKind::Function,
                    public,
                    options,
                    session,
                ) {
                    clones.push(clone);
                }
            }
            OffloadClass::ImplicitCallable => {
                let public = graph.decl_flags(node).public;
                if let Some(clone) = clone_and_link(
                    graph,
                    summaries,
                    node,
                    FunctionKind::Kernel,
                    public,
                    options,
                    session,
                ) {
                    clones.push(clone);
                }
            }
        }
    }

    clones
}

/// Clone `node` for the accelerator and pair the clone with it.
///
/// Returns `None` when the function cannot be versioned.
fn clone_and_link<G: CallGraph>(
    graph: &mut G,
    summaries: &mut SummaryStore<G::NodeRef>,
    node: G::NodeRef,
    kind: FunctionKind,
    public: bool,
    options: &PassOptions,
    session: &PassSession<'_>,
) -> Option<G::NodeRef> {
    let flags = graph.node_flags(node);
    if !flags.versionable {
        if options.warn_offload {
            session.emit(
                Severity::Warning,
                graph.name(node),
                format_args!(
                    "could not emit HSAIL for function {}: function cannot be cloned",
                    graph.name(node)
                ),
            );
        }
        return None;
    }

    let clone = graph.create_virtual_clone(node, CLONE_SUFFIX);
    graph.set_public(clone, public);
    graph.set_externally_visible(clone, flags.externally_visible);
    if !flags.local {
        graph.set_force_output(clone, true);
    }
    summaries.link_functions(clone, node, kind);
    session.record_clone();

    log::debug!(
        "Created a new HSA clone: {}, type: {}",
        graph.name(clone),
        kind
    );
    Some(clone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text_ir::Module;

    fn summary_of(kind: FunctionKind) -> FunctionSummary<crate::text_ir::FuncRef> {
        FunctionSummary { kind, ..FunctionSummary::default() }
    }

    #[test]
    fn markers_choose_branch() {
        let module = Module::parse(
            r#"
ph() [hsa_placeholder, hsa_kernel] !
k() [hsa_kernel] { entry: ret }
f() [hsa_function, hsa_universal] { entry: ret }
u() [hsa_universal] { entry: ret }
t() ["omp declare target"] { entry: ret }
acc() ["omp declare target", "oacc function"] { entry: ret }
synth() ["omp declare target"] artificial { entry: ret }
h() { entry: ret }
"#,
        )
        .unwrap();
        let none = summary_of(FunctionKind::None);
        let class = |name: &str| classify(&module, module.node_by_name(name).unwrap(), &none);

        assert_eq!(class("ph"), OffloadClass::Placeholder);
        assert_eq!(class("k"), OffloadClass::ExplicitKernel);
        assert_eq!(class("f"), OffloadClass::Function { explicit: true });
        assert_eq!(class("u"), OffloadClass::Universal);
        assert_eq!(class("t"), OffloadClass::ImplicitCallable);
        assert_eq!(class("acc"), OffloadClass::Host);
        assert_eq!(class("synth"), OffloadClass::Host);
        assert_eq!(class("h"), OffloadClass::Host);
    }

    #[test]
    fn summary_state_takes_precedence() {
        let module = Module::parse("h() { entry: ret }\nk() [hsa_kernel] { entry: ret }").unwrap();
        let h = module.node_by_name("h").unwrap();
        let k = module.node_by_name("k").unwrap();

        let classified = summary_of(FunctionKind::Kernel);
        assert_eq!(classify(&module, h, &classified), OffloadClass::Function { explicit: false });

        let mut linked = summary_of(FunctionKind::Function);
        linked.bound_function = Some(h);
        assert_eq!(classify(&module, k, &linked), OffloadClass::Resolved);

        let mut implementation = summary_of(FunctionKind::Kernel);
        implementation.is_accelerator_implementation = true;
        assert_eq!(classify(&module, k, &implementation), OffloadClass::Resolved);
    }
}
