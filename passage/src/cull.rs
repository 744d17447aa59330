//! Removal of unreferenced resources and passes prior to resolution.

use crate::graph::{DependencyGraph, Handle};
use tracing::trace;

/// Two-pass sweep: resources with zero edges first, then passes with zero
/// edges unless they are allowed to stand alone. Culled nodes are only
/// flagged here; deallocation is deferred to end-of-frame teardown, since
/// other nodes may still be inspected during the same sweep.
pub(crate) fn cull_unreferenced(
    graph: &mut DependencyGraph,
    passes: &[Handle],
    resources: &[Handle],
) -> Vec<Handle> {
    let mut culled = Vec::new();

    for &handle in resources {
        if graph.edge_count(handle) == 0 {
            graph.node_mut(handle).set_culled();
            culled.push(handle);
        }
    }

    for &handle in passes {
        if graph.edge_count(handle) == 0 && !graph.node(handle).as_pass().can_be_lone {
            graph.node_mut(handle).set_culled();
            culled.push(handle);
        }
    }

    if !culled.is_empty() {
        trace!(count = culled.len(), "culled unreferenced nodes");
    }
    culled
}
