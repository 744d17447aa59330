//! The frame graph itself: construction entry points, `compile`, and the
//! per-frame `execute` driver.

use crate::{
    aliasing::compute_aliasing,
    barrier::{latest_state, BarrierBatch},
    blackboard::Blackboard,
    builder::{
        BufferBuilder, ComputePassBuilder, CopyPassBuilder, PassBuilder, PresentPassBuilder,
        RenderPassBuilder, TextureBuilder,
    },
    cull::cull_unreferenced,
    device::{
        BindTableEntry, BindTableId, BindTableWrite, BindingKind, BufferBarrier, BufferDesc,
        BufferId, CommandBufferId, Device, Profiler, TextureBarrier, TextureDesc, TextureId,
        TextureViewDesc, TextureViewId, TextureViewKey,
    },
    edge::EdgeKind,
    executor::FrameExecutor,
    graph::{DependencyGraph, Handle},
    node::{Node, PassExecuteCallback, PassKind, PassNode, ResourceTags},
    pool::ResourcePool,
    resource_state::ResourceState,
    MAX_FRAMES_IN_FLIGHT,
};
use std::rc::Rc;
use tracing::{debug, error, trace, trace_span};

/// Knobs fixed at graph creation.
pub struct GraphOptions {
    pub enable_memory_aliasing: bool,
    /// Frames of CPU/GPU overlap; at most [`MAX_FRAMES_IN_FLIGHT`].
    pub frames_in_flight: usize,
}

impl Default for GraphOptions {
    fn default() -> Self {
        GraphOptions {
            enable_memory_aliasing: true,
            frames_in_flight: 2,
        }
    }
}

/// Handed to each pass's deferred callback at execution time. Exposes the
/// resolved backing objects for the handles the pass declared.
pub struct PassContext<'a> {
    pub device: &'a dyn Device,
    pub cmd: CommandBufferId,
    frame: u64,
    graph: &'a DependencyGraph,
    bind_table: Option<BindTableId>,
}

impl PassContext<'_> {
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// The bind table built from the pass's named bindings, already bound to
    /// the command buffer.
    pub fn bind_table(&self) -> Option<BindTableId> {
        self.bind_table
    }

    /// Backing object of a texture the pass declared.
    pub fn texture(&self, handle: Handle) -> TextureId {
        self.graph
            .node(handle)
            .as_texture()
            .frame_texture
            .expect("texture is not resolved")
    }

    pub fn buffer(&self, handle: Handle) -> BufferId {
        self.graph
            .node(handle)
            .as_buffer()
            .frame_buffer
            .expect("buffer is not resolved")
    }
}

/// Snapshot of one pass edge, taken before resolution starts mutating nodes.
struct PassEdge {
    resource: Handle,
    kind: EdgeKind,
    state: ResourceState,
    binding: Option<String>,
}

enum RetiredBacking {
    Texture {
        desc: TextureDesc,
        id: TextureId,
        state: ResourceState,
        tags: ResourceTags,
        views: Vec<(TextureViewKey, TextureViewId)>,
        aliased: bool,
    },
    Buffer {
        desc: BufferDesc,
        id: BufferId,
        state: ResourceState,
        tags: ResourceTags,
    },
}

pub struct RenderGraph {
    device: Rc<dyn Device>,
    options: GraphOptions,
    graph: DependencyGraph,
    blackboard: Blackboard,
    passes: Vec<Handle>,
    textures: Vec<Handle>,
    buffers: Vec<Handle>,
    /// Nodes flagged by the cull sweep, deallocated at teardown.
    deferred_culled: Vec<Handle>,
    compiled: bool,
    next_pass_order: u32,
    /// Index of the last executed frame; frames are 1-based.
    frame: u64,
    executors: Vec<FrameExecutor>,
    texture_pool: ResourcePool<TextureDesc>,
    buffer_pool: ResourcePool<BufferDesc>,
    view_pool: ResourcePool<TextureViewKey>,
    destroyed: bool,
}

impl RenderGraph {
    pub fn new(device: Rc<dyn Device>, setup: impl FnOnce(&mut GraphOptions)) -> RenderGraph {
        let mut options = GraphOptions::default();
        setup(&mut options);
        assert!(
            (1..=MAX_FRAMES_IN_FLIGHT).contains(&options.frames_in_flight),
            "frames_in_flight out of range"
        );
        let executors = (0..options.frames_in_flight)
            .map(|_| FrameExecutor::new(&*device))
            .collect();
        RenderGraph {
            device,
            options,
            graph: DependencyGraph::default(),
            blackboard: Blackboard::default(),
            passes: Vec::new(),
            textures: Vec::new(),
            buffers: Vec::new(),
            deferred_culled: Vec::new(),
            compiled: false,
            next_pass_order: 0,
            frame: 0,
            executors,
            texture_pool: ResourcePool::default(),
            buffer_pool: ResourcePool::default(),
            view_pool: ResourcePool::default(),
            destroyed: false,
        }
    }

    ////////////////////////////////////////////////////////////////////////////////////////////////
    // CONSTRUCTION
    ////////////////////////////////////////////////////////////////////////////////////////////////

    fn insert_pass(&mut self, kind: PassKind, executor: PassExecuteCallback) -> Handle {
        let order = self.next_pass_order;
        self.next_pass_order += 1;
        self.compiled = false;
        let handle = self.graph.insert(Node::Pass(PassNode::new("", kind, order, executor)));
        self.passes.push(handle);
        handle
    }

    fn pass_builder(&mut self, pass: Handle) -> PassBuilder<'_> {
        PassBuilder {
            graph: &mut self.graph,
            blackboard: &mut self.blackboard,
            pass,
        }
    }

    pub fn add_render_pass(
        &mut self,
        setup: impl FnOnce(&mut RenderPassBuilder<'_>),
        execute: impl FnOnce(&mut PassContext<'_>) + 'static,
    ) -> Handle {
        let pass = self.insert_pass(PassKind::Render, Box::new(execute));
        setup(&mut RenderPassBuilder(self.pass_builder(pass)));
        pass
    }

    pub fn add_compute_pass(
        &mut self,
        setup: impl FnOnce(&mut ComputePassBuilder<'_>),
        execute: impl FnOnce(&mut PassContext<'_>) + 'static,
    ) -> Handle {
        let pass = self.insert_pass(PassKind::Compute, Box::new(execute));
        setup(&mut ComputePassBuilder(self.pass_builder(pass)));
        pass
    }

    pub fn add_copy_pass(
        &mut self,
        setup: impl FnOnce(&mut CopyPassBuilder<'_>),
        execute: impl FnOnce(&mut PassContext<'_>) + 'static,
    ) -> Handle {
        let pass = self.insert_pass(PassKind::Copy, Box::new(execute));
        setup(&mut CopyPassBuilder(self.pass_builder(pass)));
        pass
    }

    pub fn add_present_pass(
        &mut self,
        setup: impl FnOnce(&mut PresentPassBuilder<'_>),
        execute: impl FnOnce(&mut PassContext<'_>) + 'static,
    ) -> Handle {
        let pass = self.insert_pass(PassKind::Present, Box::new(execute));
        setup(&mut PresentPassBuilder(self.pass_builder(pass)));
        pass
    }

    pub fn create_texture(&mut self, setup: impl FnOnce(&mut TextureBuilder)) -> Handle {
        let mut builder = TextureBuilder::new();
        setup(&mut builder);
        let node = builder.finish();
        let name = node.name.clone();
        self.compiled = false;
        let handle = self.graph.insert(Node::Texture(node));
        if !name.is_empty() {
            self.blackboard
                .add_texture(&name, handle)
                .expect("duplicate texture name");
        }
        self.textures.push(handle);
        handle
    }

    pub fn create_buffer(&mut self, setup: impl FnOnce(&mut BufferBuilder)) -> Handle {
        let mut builder = BufferBuilder::new();
        setup(&mut builder);
        let node = builder.finish();
        let name = node.name.clone();
        self.compiled = false;
        let handle = self.graph.insert(Node::Buffer(node));
        if !name.is_empty() {
            self.blackboard
                .add_buffer(&name, handle)
                .expect("duplicate buffer name");
        }
        self.buffers.push(handle);
        handle
    }

    pub fn get_texture(&self, name: &str) -> Option<Handle> {
        self.blackboard.texture(name)
    }

    pub fn get_buffer(&self, name: &str) -> Option<Handle> {
        self.blackboard.buffer(name)
    }

    pub fn get_pass(&self, name: &str) -> Option<Handle> {
        self.blackboard.pass(name)
    }

    pub fn blackboard(&self) -> &Blackboard {
        &self.blackboard
    }

    pub fn blackboard_mut(&mut self) -> &mut Blackboard {
        &mut self.blackboard
    }

    ////////////////////////////////////////////////////////////////////////////////////////////////
    // COMPILE
    ////////////////////////////////////////////////////////////////////////////////////////////////

    /// Culls unreferenced nodes, then runs the memory-aliasing calculator if
    /// enabled. Returns whether any pass survived; an all-culled graph is
    /// not worth executing.
    pub fn compile(&mut self) -> bool {
        if !self.compiled {
            let mut resources = self.textures.clone();
            resources.extend_from_slice(&self.buffers);
            let culled = cull_unreferenced(&mut self.graph, &self.passes, &resources);
            self.deferred_culled.extend(culled);
            if self.options.enable_memory_aliasing {
                compute_aliasing(&mut self.graph, &self.textures);
            }
            trace!(nodes = self.graph.node_count(), culled = self.deferred_culled.len(), "graph compiled");
            self.compiled = true;
        }
        self.passes.iter().any(|&p| !self.graph.node(p).culled())
    }

    ////////////////////////////////////////////////////////////////////////////////////////////////
    // EXECUTE
    ////////////////////////////////////////////////////////////////////////////////////////////////

    /// Records and submits the current graph as one frame, then tears the
    /// graph down for the next cycle. Returns the 1-based frame index.
    ///
    /// Blocks only when the selected executor slot's previous frame has not
    /// retired yet, which bounds overlap to the configured frame count.
    pub fn execute(&mut self, mut profiler: Option<&mut dyn Profiler>) -> u64 {
        if !self.compiled {
            self.compile();
        }
        let device = self.device.clone();
        let frame = self.frame + 1;
        let slot = ((frame - 1) % self.executors.len() as u64) as usize;
        let frame_span = trace_span!("frame", frame).entered();

        if self.executors[slot].reset_begin(&*device).is_err() {
            self.device_lost();
        }
        let latest_finished = self.latest_finished_frame();
        let cmd = self.executors[slot].cmd();

        let passes = self.passes.clone();
        for pass in passes {
            if self.graph.node(pass).culled() {
                continue;
            }
            let (pass_name, pass_kind, pass_order, pipeline) = {
                let p = self.graph.node(pass).as_pass();
                (p.name.clone(), p.kind, p.order, p.pipeline.clone())
            };

            let mut edges: Vec<PassEdge> = Vec::new();
            self.graph.for_each_edge(pass, |e| {
                let resource = if e.from == pass { e.to } else { e.from };
                edges.push(PassEdge {
                    resource,
                    kind: e.edge.kind,
                    state: e.edge.state,
                    binding: e.edge.binding.clone(),
                });
            });

            for edge in &edges {
                self.resolve(&*device, edge.resource, slot, latest_finished);
            }

            let mut barriers = BarrierBatch::default();
            for edge in &edges {
                let current = latest_state(&self.graph, edge.resource, pass_order);
                match self.graph.node(edge.resource) {
                    Node::Texture(t) => barriers.add_texture(TextureBarrier {
                        texture: t.frame_texture.expect("texture is not resolved"),
                        src: current,
                        dst: edge.state,
                    }),
                    Node::Buffer(b) => barriers.add_buffer(BufferBarrier {
                        buffer: b.frame_buffer.expect("buffer is not resolved"),
                        src: current,
                        dst: edge.state,
                    }),
                    Node::Pass(_) => unreachable!(),
                }
            }
            barriers.flush(&*device, cmd);
            for edge in &edges {
                match self.graph.node_mut(edge.resource) {
                    Node::Texture(t) => t.frame_state = edge.state,
                    Node::Buffer(b) => b.frame_state = edge.state,
                    Node::Pass(_) => unreachable!(),
                }
            }

            let bind_table = pipeline
                .as_ref()
                .and_then(|signature| self.build_bind_table(&*device, slot, signature, &edges));
            if let Some(table) = bind_table {
                device.cmd_bind_table(cmd, table);
            }

            self.executors[slot].write_marker(&*device, &pass_name);
            if let Some(p) = profiler.as_mut() {
                p.begin_pass(frame, &pass_name);
            }
            {
                let _span = trace_span!("pass", name = pass_name.as_str(), kind = ?pass_kind).entered();
                let callback = self
                    .graph
                    .node_mut(pass)
                    .as_pass_mut()
                    .executor
                    .take()
                    .expect("pass executed twice");
                let mut ctx = PassContext {
                    device: &*device,
                    cmd,
                    frame,
                    graph: &self.graph,
                    bind_table,
                };
                callback(&mut ctx);
            }
            if let Some(p) = profiler.as_mut() {
                p.end_pass();
            }

            for edge in &edges {
                self.retire_if_last_use(edge.resource, pass_order, slot, frame);
            }
        }

        if self.executors[slot].commit(&*device, frame).is_err() {
            self.device_lost();
        }
        drop(frame_span);

        // teardown: culled nodes first, then everything the frame consumed
        for handle in std::mem::take(&mut self.deferred_culled) {
            self.graph.remove_node(handle);
        }
        // views on imported textures are never retired mid-frame; sweep them
        // back to the pool before the nodes go away
        let textures = self.textures.clone();
        for handle in textures {
            if !matches!(self.graph.try_node(handle), Some(Node::Texture(_))) {
                continue;
            }
            let (views, tags, aliased) = {
                let t = self.graph.node_mut(handle).as_texture_mut();
                (std::mem::take(&mut t.frame_views), t.tags, t.frame_aliased)
            };
            for (key, view) in views {
                if aliased {
                    self.executors[slot].register_aliased_view(view);
                } else {
                    self.view_pool.deallocate(key, view, ResourceState::UNDEFINED, tags, frame);
                }
            }
        }
        self.graph.clear();
        self.blackboard.clear();
        self.passes.clear();
        self.textures.clear();
        self.buffers.clear();
        self.next_pass_order = 0;
        self.compiled = false;
        self.frame = frame;
        frame
    }

    /// First-touch resolution of a virtual resource to a backing object.
    /// Runs at most once per resource per frame.
    fn resolve(&mut self, device: &dyn Device, resource: Handle, slot: usize, latest_finished: u64) {
        match self.graph.node(resource) {
            Node::Texture(t) if t.frame_texture.is_some() => return,
            Node::Buffer(b) if b.frame_buffer.is_some() => return,
            _ => {}
        }
        match self.graph.node(resource) {
            Node::Texture(_) => self.resolve_texture(device, resource, slot, latest_finished),
            Node::Buffer(_) => self.resolve_buffer(device, resource, latest_finished),
            Node::Pass(_) => unreachable!("passes are not resolvable"),
        }
    }

    fn resolve_texture(&mut self, device: &dyn Device, resource: Handle, slot: usize, latest_finished: u64) {
        let (imported, is_aliasing, aliasing_source, desc, name) = {
            let t = self.graph.node(resource).as_texture();
            (t.imported, t.is_aliasing, t.aliasing_source, t.desc, t.name.clone())
        };
        if let Some(id) = imported {
            self.graph.node_mut(resource).as_texture_mut().frame_texture = Some(id);
            return;
        }
        if is_aliasing {
            let donor = aliasing_source.expect("aliasing texture without a donor");
            // the donor's lifespan ends before ours starts, so it resolved
            // at an earlier pass this frame
            let donor_id = self
                .graph
                .node(donor)
                .as_texture()
                .frame_texture
                .expect("aliasing donor is not resolved");
            match device.alias_texture(donor_id, &name, &desc) {
                Ok(id) => {
                    self.executors[slot].register_aliased_texture(id);
                    let t = self.graph.node_mut(resource).as_texture_mut();
                    t.frame_texture = Some(id);
                    t.frame_aliased = true;
                    t.init_state = ResourceState::UNDEFINED;
                    return;
                }
                Err(_) => {
                    debug!(name = name.as_str(), "aliasing bind rejected, using the pool");
                    self.graph.node_mut(resource).as_texture_mut().is_aliasing = false;
                }
            }
        }
        let (id, last_state) = self.texture_pool.allocate(device, &desc, &name, latest_finished);
        let t = self.graph.node_mut(resource).as_texture_mut();
        t.frame_texture = Some(id);
        t.init_state = last_state;
    }

    fn resolve_buffer(&mut self, device: &dyn Device, resource: Handle, latest_finished: u64) {
        let (imported, desc, name) = {
            let b = self.graph.node(resource).as_buffer();
            (b.imported, b.desc, b.name.clone())
        };
        if let Some(id) = imported {
            self.graph.node_mut(resource).as_buffer_mut().frame_buffer = Some(id);
            return;
        }
        let (id, last_state) = self.buffer_pool.allocate(device, &desc, &name, latest_finished);
        let b = self.graph.node_mut(resource).as_buffer_mut();
        b.frame_buffer = Some(id);
        b.init_state = last_state;
    }

    /// Builds and fills a bind table from the pass's named bindings. A
    /// binding name missing from the signature is a construction bug.
    fn build_bind_table(
        &mut self,
        device: &dyn Device,
        slot: usize,
        signature: &Rc<crate::device::PipelineSignature>,
        edges: &[PassEdge],
    ) -> Option<BindTableId> {
        if !edges.iter().any(|e| e.binding.is_some()) {
            return None;
        }
        let table = self.executors[slot].allocate_bind_table(device, signature);
        let mut writes = Vec::new();
        for edge in edges {
            let Some(binding) = edge.binding.as_deref() else {
                continue;
            };
            let binding_slot = signature
                .slot(binding)
                .unwrap_or_else(|| panic!("binding {binding:?} not found in pipeline signature {:?}", signature.name));
            match binding_slot.kind {
                BindingKind::SampledTexture | BindingKind::StorageTexture => {
                    assert!(edge.kind.is_texture(), "binding {binding:?} expects a texture");
                }
                BindingKind::UniformBuffer | BindingKind::StorageBuffer => {
                    assert!(!edge.kind.is_texture(), "binding {binding:?} expects a buffer");
                }
            }
            let entry = if edge.kind.is_texture() {
                BindTableEntry::TextureView(self.frame_view(device, edge.resource))
            } else {
                BindTableEntry::Buffer(
                    self.graph
                        .node(edge.resource)
                        .as_buffer()
                        .frame_buffer
                        .expect("buffer is not resolved"),
                )
            };
            writes.push(BindTableWrite {
                slot: binding_slot.slot,
                entry,
            });
        }
        device.update_bind_table(table, &writes);
        Some(table)
    }

    /// Full-resource view over a texture's backing object, created once per
    /// frame and reused by later passes. Views are keyed by the backing
    /// texture id, so pooled entries are valid whenever the texture itself
    /// is; they bypass the retired-frame gate.
    fn frame_view(&mut self, device: &dyn Device, resource: Handle) -> TextureViewId {
        let key = {
            let t = self.graph.node(resource).as_texture();
            TextureViewKey {
                texture: t.frame_texture.expect("texture is not resolved"),
                desc: TextureViewDesc::default(),
            }
        };
        let existing = self
            .graph
            .node(resource)
            .as_texture()
            .frame_views
            .iter()
            .find(|(k, _)| *k == key)
            .map(|&(_, v)| v);
        if let Some(view) = existing {
            return view;
        }
        let name = self.graph.node(resource).as_texture().name.clone();
        let (view, _) = self.view_pool.allocate(device, &key, &name, u64::MAX);
        self.graph
            .node_mut(resource)
            .as_texture_mut()
            .frame_views
            .push((key, view));
        view
    }

    /// Returns a resource's backing to its pool once every pass touching it
    /// has executed. Imported backings stay with their owner; aliased ones
    /// stay with the executor until its fence proves the frame retired.
    fn retire_if_last_use(&mut self, resource: Handle, order: u32, slot: usize, frame: u64) {
        match self.graph.node(resource) {
            Node::Texture(t) if t.retired || t.imported.is_some() => return,
            Node::Buffer(b) if b.retired || b.imported.is_some() => return,
            _ => {}
        }
        if self.graph.lifespan(resource).to > order {
            return;
        }
        let retired = match self.graph.node_mut(resource) {
            Node::Texture(t) => {
                t.retired = true;
                RetiredBacking::Texture {
                    desc: t.desc,
                    id: t.frame_texture.expect("retiring an unresolved texture"),
                    state: t.frame_state,
                    tags: t.tags,
                    views: std::mem::take(&mut t.frame_views),
                    aliased: t.frame_aliased,
                }
            }
            Node::Buffer(b) => {
                b.retired = true;
                RetiredBacking::Buffer {
                    desc: b.desc,
                    id: b.frame_buffer.expect("retiring an unresolved buffer"),
                    state: b.frame_state,
                    tags: b.tags,
                }
            }
            Node::Pass(_) => unreachable!(),
        };
        match retired {
            RetiredBacking::Texture {
                desc,
                id,
                state,
                tags,
                views,
                aliased,
            } => {
                if aliased {
                    // backing and views die with the executor slot
                    for (_, view) in views {
                        self.executors[slot].register_aliased_view(view);
                    }
                } else {
                    for (key, view) in views {
                        self.view_pool.deallocate(key, view, ResourceState::UNDEFINED, tags, frame);
                    }
                    self.texture_pool.deallocate(desc, id, state, tags, frame);
                }
            }
            RetiredBacking::Buffer { desc, id, state, tags } => {
                self.buffer_pool.deallocate(desc, id, state, tags, frame);
            }
        }
    }

    ////////////////////////////////////////////////////////////////////////////////////////////////
    // PROGRESS & GC
    ////////////////////////////////////////////////////////////////////////////////////////////////

    /// Index of the last executed frame. The next `execute` runs frame
    /// `frame_index() + 1`.
    pub fn frame_index(&self) -> u64 {
        self.frame
    }

    /// Newest frame confirmed finished on the device, 0 if none. Non-blocking.
    pub fn latest_finished_frame(&self) -> u64 {
        self.executors
            .iter()
            .map(|e| e.completed_value(&*self.device))
            .max()
            .unwrap_or(0)
    }

    /// Destroys pooled backings freed at or before `critical_frame` whose
    /// tags match the per-class filters. Texture views follow the texture
    /// filters. The caller owns safety: collecting a frame the device has
    /// not retired is logged but not blocked.
    pub fn collect_garbage(
        &mut self,
        critical_frame: u64,
        tex_with_tags: ResourceTags,
        tex_without_tags: ResourceTags,
        buf_with_tags: ResourceTags,
        buf_without_tags: ResourceTags,
    ) -> usize {
        let latest = self.latest_finished_frame();
        if critical_frame > latest {
            error!(
                critical_frame,
                latest_finished = latest,
                "collecting frames the device has not retired"
            );
        }
        let device = self.device.clone();
        let mut freed = self
            .view_pool
            .collect_garbage(&*device, critical_frame, tex_with_tags, tex_without_tags);
        freed += self
            .texture_pool
            .collect_garbage(&*device, critical_frame, tex_with_tags, tex_without_tags);
        freed += self
            .buffer_pool
            .collect_garbage(&*device, critical_frame, buf_with_tags, buf_without_tags);
        freed
    }

    /// Waits for all in-flight frames, then releases every device object the
    /// graph owns. Also runs on drop.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        let device = self.device.clone();
        for executor in &self.executors {
            if executor.wait_idle(&*device).is_err() {
                error!(
                    frame = executor.submitted_frame(),
                    "device lost while draining in-flight frames"
                );
            }
        }
        self.view_pool.drain(&*device);
        self.texture_pool.drain(&*device);
        self.buffer_pool.drain(&*device);
        for executor in &mut self.executors {
            executor.destroy(&*device);
        }
    }

    fn device_lost(&self) -> ! {
        for executor in &self.executors {
            executor.dump_markers(&*self.device);
        }
        panic!("device lost");
    }
}

impl Drop for RenderGraph {
    fn drop(&mut self) {
        self.destroy();
    }
}
