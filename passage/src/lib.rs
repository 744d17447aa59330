//! A frame graph: a per-frame, dependency-driven GPU pass scheduler.
//!
//! Calling code declares passes (render/compute/copy/present) and the
//! virtual textures and buffers they read and write; the graph resolves
//! those to pooled physical backings, infers state-transition barriers,
//! culls unreferenced work, optionally aliases memory between resources
//! with disjoint lifespans, and drives recording and submission across
//! several frames in flight.
//!
//! The graph is rebuilt every frame:
//!
//! ```no_run
//! # use std::rc::Rc;
//! # use passage::*;
//! # fn demo(device: Rc<dyn Device>) {
//! let mut graph = RenderGraph::new(device, |opts| {
//!     opts.frames_in_flight = 2;
//! });
//! loop {
//!     let color = graph.create_texture(|t| {
//!         t.set_name("hdr").set_extent(1920, 1080).set_format(Format::Rgba16Float)
//!             .set_usage(TextureUsage::RENDER_TARGET | TextureUsage::SAMPLED);
//!     });
//!     graph.add_render_pass(
//!         |p| {
//!             p.set_name("forward").write(color);
//!         },
//!         move |ctx| {
//!             let _target = ctx.texture(color);
//!             // record draws against ctx.cmd
//!         },
//!     );
//!     graph.add_present_pass(
//!         |p| {
//!             p.set_name("present").present(color);
//!         },
//!         move |_ctx| {},
//!     );
//!     graph.execute(None);
//! }
//! # }
//! ```

mod aliasing;
mod arena;
mod barrier;
mod blackboard;
mod builder;
mod cull;
pub mod device;
mod edge;
mod error;
mod executor;
mod graph;
mod node;
mod pool;
mod render_graph;
mod resource_state;

pub use crate::{
    blackboard::{Blackboard, Value},
    builder::{
        BufferBuilder, ComputePassBuilder, CopyPassBuilder, PresentPassBuilder, RenderPassBuilder,
        TextureBuilder,
    },
    device::{
        BindTableEntry, BindTableId, BindTableWrite, BindingKind, BindingSlot, BufferBarrier,
        BufferDesc, BufferId, BufferUsage, CommandBufferId, CommandPoolId, Device, FenceId, Format,
        MemoryLocation, PipelineSignature, Profiler, TextureBarrier, TextureDesc, TextureId,
        TextureUsage, TextureViewDesc, TextureViewId, TextureViewKey,
    },
    error::{AliasingRejected, DeviceLost, DuplicateName},
    graph::Handle,
    node::{Lifespan, PassKind, ResourceTags},
    render_graph::{GraphOptions, PassContext, RenderGraph},
    resource_state::{is_write_state, ResourceState},
};

/// Upper bound on the configurable number of frames in flight.
pub const MAX_FRAMES_IN_FLIGHT: usize = 3;
