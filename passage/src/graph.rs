//! Generic dependency graph of typed nodes and typed edges.
//!
//! Adjacency is tracked per node as lists of edge indices, so iterating a
//! node's edges is O(degree). Handles are plain arena indices: stable within
//! one build→execute cycle, invalidated by `clear`.

use crate::{
    arena::Arena,
    edge::Edge,
    node::{Lifespan, Node},
};

/// Stable index of a node within one build→execute cycle. Carries no
/// ownership; dereferencing after `clear` panics.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Handle(pub(crate) u32);

pub(crate) struct EdgeSlot {
    pub from: Handle,
    pub to: Handle,
    pub edge: Edge,
}

struct NodeSlot {
    node: Node,
    incoming: Vec<u32>,
    outgoing: Vec<u32>,
}

#[derive(Default)]
pub(crate) struct DependencyGraph {
    nodes: Arena<NodeSlot>,
    edges: Arena<EdgeSlot>,
}

impl DependencyGraph {
    pub(crate) fn insert(&mut self, node: Node) -> Handle {
        Handle(self.nodes.insert(NodeSlot {
            node,
            incoming: Vec::new(),
            outgoing: Vec::new(),
        }))
    }

    /// Links two nodes. Edges only ever connect a pass and a resource, and a
    /// pass holds at most one edge per resource, so each pass requests a
    /// single state for each resource it touches.
    pub(crate) fn link(&mut self, from: Handle, to: Handle, edge: Edge) -> u32 {
        assert_ne!(
            self.node(from).is_pass(),
            self.node(to).is_pass(),
            "an edge must connect exactly one pass and one resource"
        );
        let pass = if self.node(from).is_pass() { from } else { to };
        let resource = if pass == from { to } else { from };
        self.for_each_edge(pass, |slot| {
            assert!(
                slot.from != resource && slot.to != resource,
                "a pass may reference a resource through at most one edge"
            );
        });
        let index = self.edges.insert(EdgeSlot { from, to, edge });
        self.slot_mut(from).outgoing.push(index);
        self.slot_mut(to).incoming.push(index);
        index
    }

    fn slot(&self, handle: Handle) -> &NodeSlot {
        self.nodes.get(handle.0).expect("invalid node handle")
    }

    fn slot_mut(&mut self, handle: Handle) -> &mut NodeSlot {
        self.nodes.get_mut(handle.0).expect("invalid node handle")
    }

    pub(crate) fn node(&self, handle: Handle) -> &Node {
        &self.slot(handle).node
    }

    pub(crate) fn node_mut(&mut self, handle: Handle) -> &mut Node {
        &mut self.slot_mut(handle).node
    }

    pub(crate) fn try_node(&self, handle: Handle) -> Option<&Node> {
        self.nodes.get(handle.0).map(|slot| &slot.node)
    }

    pub(crate) fn edge(&self, index: u32) -> &EdgeSlot {
        self.edges.get(index).expect("invalid edge index")
    }

    pub(crate) fn edge_count(&self, handle: Handle) -> usize {
        let slot = self.slot(handle);
        slot.incoming.len() + slot.outgoing.len()
    }

    pub(crate) fn edge_indices(&self, handle: Handle) -> Vec<u32> {
        let slot = self.slot(handle);
        let mut indices = Vec::with_capacity(slot.incoming.len() + slot.outgoing.len());
        indices.extend_from_slice(&slot.incoming);
        indices.extend_from_slice(&slot.outgoing);
        indices
    }

    pub(crate) fn for_each_incoming_edge(&self, handle: Handle, mut f: impl FnMut(&EdgeSlot)) {
        for &index in &self.slot(handle).incoming {
            f(self.edge(index));
        }
    }

    pub(crate) fn for_each_outgoing_edge(&self, handle: Handle, mut f: impl FnMut(&EdgeSlot)) {
        for &index in &self.slot(handle).outgoing {
            f(self.edge(index));
        }
    }

    /// Iterates incoming then outgoing edges.
    pub(crate) fn for_each_edge(&self, handle: Handle, mut f: impl FnMut(&EdgeSlot)) {
        self.for_each_incoming_edge(handle, &mut f);
        self.for_each_outgoing_edge(handle, &mut f);
    }

    /// Removes an edge, detaching it from both endpoints.
    pub(crate) fn remove_edge(&mut self, index: u32) {
        let Some(slot) = self.edges.remove(index) else {
            return;
        };
        self.slot_mut(slot.from).outgoing.retain(|&e| e != index);
        self.slot_mut(slot.to).incoming.retain(|&e| e != index);
    }

    /// Removes a node along with any edges still attached to it. Removing an
    /// already-removed node is a no-op (culled nodes may appear both on the
    /// deferred list and in the teardown sweep).
    pub(crate) fn remove_node(&mut self, handle: Handle) {
        if self.nodes.get(handle.0).is_none() {
            return;
        }
        for index in self.edge_indices(handle) {
            self.remove_edge(index);
        }
        self.nodes.remove(handle.0);
    }

    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Invalidates every handle issued since the last clear. Arena capacity
    /// is retained for the next cycle.
    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
    }

    /// The pass-order interval during which a resource is referenced by
    /// non-culled passes. Memoized on the node; the memo dies with the node
    /// when the graph is cleared.
    pub(crate) fn lifespan(&self, resource: Handle) -> Lifespan {
        let cell = match self.node(resource) {
            Node::Texture(t) => &t.lifespan,
            Node::Buffer(b) => &b.lifespan,
            Node::Pass(_) => panic!("lifespan is only defined for resources"),
        };
        *cell.get_or_init(|| self.compute_lifespan(resource))
    }

    fn compute_lifespan(&self, resource: Handle) -> Lifespan {
        let mut span: Option<Lifespan> = None;
        self.for_each_edge(resource, |slot| {
            let pass = if slot.from == resource { slot.to } else { slot.from };
            let pass = self.node(pass).as_pass();
            if pass.culled {
                return;
            }
            let span = span.get_or_insert(Lifespan {
                from: pass.order,
                to: pass.order,
            });
            span.from = span.from.min(pass.order);
            span.to = span.to.max(pass.order);
        });
        span.expect("lifespan of a resource with no live passes")
    }
}
