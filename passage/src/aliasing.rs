//! Greedy interval-based memory aliasing.
//!
//! Two virtual textures may share one physical allocation when their
//! lifespans do not overlap. The calculator runs at compile time, after
//! culling: candidates are considered in lifespan-start order and matched
//! against aliasing chains: donors whose memory is already being shared,
//! each carrying the pass order at which its last tenant ends. The scan is
//! quadratic over the frame's textures.

use crate::{
    graph::{DependencyGraph, Handle},
    node::{Lifespan, Node},
};
use tracing::trace;

struct Candidate {
    handle: Handle,
    lifespan: Lifespan,
    size: u64,
    sample_count: u32,
}

struct AliasingChain {
    donor: Handle,
    size: u64,
    sample_count: u32,
    /// Pass order at which the chain's current tenant ends.
    last_order: u32,
}

fn compatible(size: u64, samples: u32, candidate: &Candidate) -> bool {
    samples == candidate.sample_count && size >= candidate.size
}

/// Marks textures that can reuse a donor's memory. Imported, dedicated and
/// culled textures take part on neither side. Returns the number of
/// candidates that were given a donor.
pub(crate) fn compute_aliasing(graph: &mut DependencyGraph, textures: &[Handle]) -> usize {
    let mut candidates: Vec<Candidate> = textures
        .iter()
        .filter_map(|&handle| {
            let Node::Texture(t) = graph.node(handle) else {
                return None;
            };
            if t.culled || t.imported.is_some() || t.dedicated {
                return None;
            }
            Some(Candidate {
                handle,
                lifespan: graph.lifespan(handle),
                size: t.desc.byte_size(),
                sample_count: t.desc.sample_count,
            })
        })
        .collect();
    candidates.sort_by_key(|c| (c.lifespan.from, c.lifespan.to));

    let mut chains: Vec<AliasingChain> = Vec::new();
    // processed textures that are not (yet) part of any chain
    let mut standalone: Vec<Candidate> = Vec::new();
    let mut aliased = 0;

    for candidate in candidates {
        // prefer the smallest already-aliased donor whose last tenant is done
        let mut best: Option<usize> = None;
        for (i, chain) in chains.iter().enumerate() {
            if chain.last_order < candidate.lifespan.from && compatible(chain.size, chain.sample_count, &candidate) {
                if best.map_or(true, |b| chains[b].size > chain.size) {
                    best = Some(i);
                }
            }
        }
        if let Some(i) = best {
            chains[i].last_order = candidate.lifespan.to;
            mark(graph, candidate.handle, chains[i].donor);
            aliased += 1;
            continue;
        }

        // otherwise look for a fresh donor among textures placed earlier
        let mut best: Option<usize> = None;
        for (i, prev) in standalone.iter().enumerate() {
            if prev.lifespan.to < candidate.lifespan.from && compatible(prev.size, prev.sample_count, &candidate) {
                if best.map_or(true, |b: usize| standalone[b].size > prev.size) {
                    best = Some(i);
                }
            }
        }
        if let Some(i) = best {
            let donor = standalone.remove(i);
            mark(graph, candidate.handle, donor.handle);
            chains.push(AliasingChain {
                donor: donor.handle,
                size: donor.size,
                sample_count: donor.sample_count,
                last_order: candidate.lifespan.to,
            });
            aliased += 1;
        } else {
            standalone.push(candidate);
        }
    }

    if aliased > 0 {
        trace!(aliased, "memory aliasing computed");
    }
    aliased
}

fn mark(graph: &mut DependencyGraph, handle: Handle, donor: Handle) {
    let texture = graph.node_mut(handle).as_texture_mut();
    texture.is_aliasing = true;
    texture.aliasing_source = Some(donor);
}
