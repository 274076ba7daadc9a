//! Redirection of accelerator-to-host call edges.

use crate::core::{CallGraph, PassSession};
use super::summary::SummaryStore;

/// Point every call from an accelerator implementation to a paired host
/// function at that function's accelerator clone.
///
/// Edges are never added or removed, only retargeted. Running the sweep a
/// second time changes nothing, since a redirected edge ends in an
/// accelerator implementation. Returns the number of redirected edges.
pub fn redirect_edges<G: CallGraph>(
    graph: &mut G,
    summaries: &SummaryStore<G::NodeRef>,
    session: &PassSession<'_>,
) -> usize {
    let mut redirected = 0;
    let nodes: Vec<_> = graph.defined_functions().collect();

    for node in nodes {
        let src = summaries.get(node);
        if !src.is_participant() || !src.is_accelerator_implementation {
            continue;
        }

        let edges: Vec<_> = graph.callees(node).collect();
        for edge in edges {
            let dst = summaries.get(graph.edge_callee(edge));
            if !dst.is_participant() || dst.is_accelerator_implementation {
                continue;
            }
            let Some(target) = dst.bound_function else {
                log::debug!(
                    "Edge {}->{} has no accelerator counterpart to redirect to",
                    graph.name(node),
                    graph.name(graph.edge_callee(edge))
                );
                continue;
            };

            graph.redirect_callee(edge, target);
            redirected += 1;
            session.record_redirect();
            log::debug!(
                "Redirecting edge to HSA function: {}->{}",
                graph.name(graph.edge_caller(edge)),
                graph.name(graph.edge_callee(edge))
            );
        }
    }

    redirected
}
