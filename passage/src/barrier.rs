//! Latest-state inference and per-pass barrier batching.

use crate::{
    device::{BufferBarrier, CommandBufferId, Device, TextureBarrier},
    graph::{DependencyGraph, Handle},
    node::Node,
    resource_state::ResourceState,
};

/// State a resource is in when a pass at `before_order` is about to touch
/// it: the state requested by the chronologically nearest prior non-culled
/// pass, or the resource's initial state when no such pass exists.
///
/// Pure over the graph, so resolving the same (resource, pass) pair twice
/// within a frame yields the same answer.
pub(crate) fn latest_state(graph: &DependencyGraph, resource: Handle, before_order: u32) -> ResourceState {
    let mut latest: Option<(u32, ResourceState)> = None;
    graph.for_each_edge(resource, |slot| {
        let pass = if slot.from == resource { slot.to } else { slot.from };
        let pass = graph.node(pass).as_pass();
        if pass.culled || pass.order >= before_order {
            return;
        }
        if latest.map_or(true, |(order, _)| order < pass.order) {
            latest = Some((pass.order, slot.edge.state));
        }
    });
    match latest {
        Some((_, state)) => state,
        None => match graph.node(resource) {
            Node::Texture(t) => t.init_state,
            Node::Buffer(b) => b.init_state,
            Node::Pass(_) => panic!("latest_state is only defined for resources"),
        },
    }
}

/// Collects the transitions a pass needs so they go to the device in one
/// `cmd_barriers` call, before any of the pass's other commands.
#[derive(Default)]
pub(crate) struct BarrierBatch {
    textures: Vec<TextureBarrier>,
    buffers: Vec<BufferBarrier>,
}

impl BarrierBatch {
    /// No-op when the states already match. A batch never sees the same
    /// object twice: a pass holds at most one edge per resource, enforced
    /// when the edge is linked.
    pub(crate) fn add_texture(&mut self, barrier: TextureBarrier) {
        if barrier.src == barrier.dst {
            return;
        }
        self.textures.push(barrier);
    }

    pub(crate) fn add_buffer(&mut self, barrier: BufferBarrier) {
        if barrier.src == barrier.dst {
            return;
        }
        self.buffers.push(barrier);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.textures.is_empty() && self.buffers.is_empty()
    }

    pub(crate) fn flush(&mut self, device: &dyn Device, cmd: CommandBufferId) {
        if self.is_empty() {
            return;
        }
        device.cmd_barriers(cmd, &self.textures, &self.buffers);
        self.textures.clear();
        self.buffers.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.textures.len() + self.buffers.len()
    }
}
