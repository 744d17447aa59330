//! Fluent construction of resources and passes.
//!
//! Resource builders configure a detached node that the graph inserts once
//! the setup closure returns. Pass builders operate on an already-inserted
//! pass and link edges as they go: reads point resource→pass, writes point
//! pass→resource. Misuse (duplicate names, binding a buffer where a texture
//! is expected) is a programming error and panics.

use crate::{
    blackboard::Blackboard,
    device::{BufferId, BufferUsage, Format, MemoryLocation, PipelineSignature, TextureId, TextureUsage},
    edge::{Edge, EdgeKind},
    graph::{DependencyGraph, Handle},
    node::{BufferNode, ResourceTags, TextureNode},
    resource_state::ResourceState,
};
use std::rc::Rc;

////////////////////////////////////////////////////////////////////////////////////////////////////
// RESOURCE BUILDERS
////////////////////////////////////////////////////////////////////////////////////////////////////

pub struct TextureBuilder {
    node: TextureNode,
}

impl TextureBuilder {
    pub(crate) fn new() -> TextureBuilder {
        TextureBuilder { node: TextureNode::new() }
    }

    pub fn set_name(&mut self, name: &str) -> &mut Self {
        self.node.name = name.to_string();
        self
    }

    pub fn set_extent(&mut self, width: u32, height: u32) -> &mut Self {
        self.node.desc.width = width;
        self.node.desc.height = height;
        self
    }

    pub fn set_depth(&mut self, depth: u32) -> &mut Self {
        self.node.desc.depth = depth;
        self
    }

    pub fn set_mip_levels(&mut self, mip_levels: u32) -> &mut Self {
        self.node.desc.mip_levels = mip_levels;
        self
    }

    pub fn set_sample_count(&mut self, sample_count: u32) -> &mut Self {
        self.node.desc.sample_count = sample_count;
        self
    }

    pub fn set_format(&mut self, format: Format) -> &mut Self {
        self.node.desc.format = format;
        self
    }

    pub fn set_usage(&mut self, usage: TextureUsage) -> &mut Self {
        self.node.desc.usage = usage;
        self
    }

    pub fn set_tags(&mut self, tags: ResourceTags) -> &mut Self {
        self.node.tags = tags;
        self
    }

    /// Binds the node to an externally owned texture in `init_state`. The
    /// graph never pools, aliases or frees imported backings.
    pub fn import(&mut self, texture: TextureId, init_state: ResourceState) -> &mut Self {
        self.node.imported = Some(texture);
        self.node.init_state = init_state;
        self
    }

    /// Excludes the texture from memory aliasing, on both sides.
    pub fn set_dedicated(&mut self) -> &mut Self {
        self.node.dedicated = true;
        self
    }

    pub(crate) fn finish(mut self) -> TextureNode {
        if self.node.tags.is_empty() {
            self.node.tags = ResourceTags::DEFAULT;
        }
        self.node
    }
}

pub struct BufferBuilder {
    node: BufferNode,
}

impl BufferBuilder {
    pub(crate) fn new() -> BufferBuilder {
        BufferBuilder { node: BufferNode::new() }
    }

    pub fn set_name(&mut self, name: &str) -> &mut Self {
        self.node.name = name.to_string();
        self
    }

    pub fn set_size(&mut self, size: u64) -> &mut Self {
        self.node.desc.size = size;
        self
    }

    pub fn set_usage(&mut self, usage: BufferUsage) -> &mut Self {
        self.node.desc.usage = usage;
        self
    }

    pub fn set_memory(&mut self, memory: MemoryLocation) -> &mut Self {
        self.node.desc.memory = memory;
        self
    }

    pub fn set_tags(&mut self, tags: ResourceTags) -> &mut Self {
        self.node.tags = tags;
        self
    }

    pub fn import(&mut self, buffer: BufferId, init_state: ResourceState) -> &mut Self {
        self.node.imported = Some(buffer);
        self.node.init_state = init_state;
        self
    }

    pub(crate) fn finish(mut self) -> BufferNode {
        if self.node.tags.is_empty() {
            self.node.tags = ResourceTags::DEFAULT;
        }
        self.node
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// PASS BUILDERS
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Shared machinery behind the kind-specific pass builders.
pub(crate) struct PassBuilder<'a> {
    pub(crate) graph: &'a mut DependencyGraph,
    pub(crate) blackboard: &'a mut Blackboard,
    pub(crate) pass: Handle,
}

impl PassBuilder<'_> {
    fn set_name(&mut self, name: &str) {
        self.graph.node_mut(self.pass).as_pass_mut().name = name.to_string();
        self.blackboard
            .add_pass(name, self.pass)
            .expect("duplicate pass name");
    }

    fn set_pipeline(&mut self, signature: Rc<PipelineSignature>) {
        self.graph.node_mut(self.pass).as_pass_mut().pipeline = Some(signature);
    }

    fn set_can_be_lone(&mut self, can_be_lone: bool) {
        self.graph.node_mut(self.pass).as_pass_mut().can_be_lone = can_be_lone;
    }

    fn read_texture(&mut self, binding: Option<&str>, texture: Handle, state: ResourceState) {
        self.graph.node(texture).as_texture();
        self.graph.link(
            texture,
            self.pass,
            Edge {
                kind: EdgeKind::TextureRead,
                state,
                binding: binding.map(str::to_string),
            },
        );
    }

    fn write_texture(&mut self, texture: Handle, state: ResourceState) {
        self.graph.node(texture).as_texture();
        self.graph.link(
            self.pass,
            texture,
            Edge {
                kind: EdgeKind::TextureWrite,
                state,
                binding: None,
            },
        );
    }

    fn readwrite_texture(&mut self, binding: &str, texture: Handle) {
        self.graph.node(texture).as_texture();
        self.graph.link(
            self.pass,
            texture,
            Edge {
                kind: EdgeKind::TextureReadWrite,
                state: ResourceState::UNORDERED_ACCESS,
                binding: Some(binding.to_string()),
            },
        );
    }

    fn read_buffer(&mut self, binding: Option<&str>, buffer: Handle, state: ResourceState) {
        self.graph.node(buffer).as_buffer();
        self.graph.link(
            buffer,
            self.pass,
            Edge {
                kind: EdgeKind::BufferRead,
                state,
                binding: binding.map(str::to_string),
            },
        );
    }

    fn readwrite_buffer(&mut self, binding: &str, buffer: Handle) {
        self.graph.node(buffer).as_buffer();
        self.graph.link(
            self.pass,
            buffer,
            Edge {
                kind: EdgeKind::BufferReadWrite,
                state: ResourceState::UNORDERED_ACCESS,
                binding: Some(binding.to_string()),
            },
        );
    }

    fn pipeline_buffer(&mut self, buffer: Handle, state: ResourceState) {
        self.graph.node(buffer).as_buffer();
        self.graph.link(
            buffer,
            self.pass,
            Edge {
                kind: EdgeKind::PipelineBuffer,
                state,
                binding: None,
            },
        );
    }

    /// Render-target or depth-attachment write, picked from the format.
    fn write_attachment(&mut self, texture: Handle) {
        let state = if self.graph.node(texture).as_texture().desc.format.is_depth_stencil() {
            ResourceState::DEPTH_WRITE
        } else {
            ResourceState::RENDER_TARGET
        };
        self.write_texture(texture, state);
    }
}

pub struct RenderPassBuilder<'a>(pub(crate) PassBuilder<'a>);

impl RenderPassBuilder<'_> {
    pub fn set_name(&mut self, name: &str) -> &mut Self {
        self.0.set_name(name);
        self
    }

    pub fn set_pipeline(&mut self, signature: Rc<PipelineSignature>) -> &mut Self {
        self.0.set_pipeline(signature);
        self
    }

    pub fn set_can_be_lone(&mut self, can_be_lone: bool) -> &mut Self {
        self.0.set_can_be_lone(can_be_lone);
        self
    }

    /// Samples `texture` through the named shader binding.
    pub fn read(&mut self, binding: &str, texture: Handle) -> &mut Self {
        self.0.read_texture(Some(binding), texture, ResourceState::SHADER_RESOURCE);
        self
    }

    /// Attaches `texture` as a color or depth target, by format.
    pub fn write(&mut self, texture: Handle) -> &mut Self {
        self.0.write_attachment(texture);
        self
    }

    pub fn readwrite(&mut self, binding: &str, texture: Handle) -> &mut Self {
        self.0.readwrite_texture(binding, texture);
        self
    }

    pub fn read_buffer(&mut self, binding: &str, buffer: Handle) -> &mut Self {
        self.0.read_buffer(Some(binding), buffer, ResourceState::SHADER_RESOURCE);
        self
    }

    pub fn read_constant_buffer(&mut self, binding: &str, buffer: Handle) -> &mut Self {
        self.0.read_buffer(Some(binding), buffer, ResourceState::CONSTANT_BUFFER);
        self
    }

    pub fn readwrite_buffer(&mut self, binding: &str, buffer: Handle) -> &mut Self {
        self.0.readwrite_buffer(binding, buffer);
        self
    }

    pub fn use_vertex_buffer(&mut self, buffer: Handle) -> &mut Self {
        self.0.pipeline_buffer(buffer, ResourceState::VERTEX_BUFFER);
        self
    }

    pub fn use_index_buffer(&mut self, buffer: Handle) -> &mut Self {
        self.0.pipeline_buffer(buffer, ResourceState::INDEX_BUFFER);
        self
    }

    pub fn use_indirect_buffer(&mut self, buffer: Handle) -> &mut Self {
        self.0.pipeline_buffer(buffer, ResourceState::INDIRECT_ARGUMENT);
        self
    }
}

pub struct ComputePassBuilder<'a>(pub(crate) PassBuilder<'a>);

impl ComputePassBuilder<'_> {
    pub fn set_name(&mut self, name: &str) -> &mut Self {
        self.0.set_name(name);
        self
    }

    pub fn set_pipeline(&mut self, signature: Rc<PipelineSignature>) -> &mut Self {
        self.0.set_pipeline(signature);
        self
    }

    pub fn set_can_be_lone(&mut self, can_be_lone: bool) -> &mut Self {
        self.0.set_can_be_lone(can_be_lone);
        self
    }

    pub fn read(&mut self, binding: &str, texture: Handle) -> &mut Self {
        self.0.read_texture(Some(binding), texture, ResourceState::SHADER_RESOURCE);
        self
    }

    /// Storage-image write.
    pub fn write(&mut self, binding: &str, texture: Handle) -> &mut Self {
        self.0.graph.node(texture).as_texture();
        self.0.graph.link(
            self.0.pass,
            texture,
            Edge {
                kind: EdgeKind::TextureWrite,
                state: ResourceState::UNORDERED_ACCESS,
                binding: Some(binding.to_string()),
            },
        );
        self
    }

    pub fn readwrite(&mut self, binding: &str, texture: Handle) -> &mut Self {
        self.0.readwrite_texture(binding, texture);
        self
    }

    pub fn read_buffer(&mut self, binding: &str, buffer: Handle) -> &mut Self {
        self.0.read_buffer(Some(binding), buffer, ResourceState::SHADER_RESOURCE);
        self
    }

    pub fn read_constant_buffer(&mut self, binding: &str, buffer: Handle) -> &mut Self {
        self.0.read_buffer(Some(binding), buffer, ResourceState::CONSTANT_BUFFER);
        self
    }

    pub fn readwrite_buffer(&mut self, binding: &str, buffer: Handle) -> &mut Self {
        self.0.readwrite_buffer(binding, buffer);
        self
    }

    pub fn use_indirect_buffer(&mut self, buffer: Handle) -> &mut Self {
        self.0.pipeline_buffer(buffer, ResourceState::INDIRECT_ARGUMENT);
        self
    }
}

pub struct CopyPassBuilder<'a>(pub(crate) PassBuilder<'a>);

impl CopyPassBuilder<'_> {
    pub fn set_name(&mut self, name: &str) -> &mut Self {
        self.0.set_name(name);
        self
    }

    pub fn read(&mut self, texture: Handle) -> &mut Self {
        self.0.read_texture(None, texture, ResourceState::COPY_SRC);
        self
    }

    pub fn write(&mut self, texture: Handle) -> &mut Self {
        self.0.write_texture(texture, ResourceState::COPY_DST);
        self
    }

    pub fn read_buffer(&mut self, buffer: Handle) -> &mut Self {
        self.0.read_buffer(None, buffer, ResourceState::COPY_SRC);
        self
    }

    pub fn write_buffer(&mut self, buffer: Handle) -> &mut Self {
        self.0.graph.node(buffer).as_buffer();
        self.0.graph.link(
            self.0.pass,
            buffer,
            Edge {
                kind: EdgeKind::BufferReadWrite,
                state: ResourceState::COPY_DST,
                binding: None,
            },
        );
        self
    }
}

pub struct PresentPassBuilder<'a>(pub(crate) PassBuilder<'a>);

impl PresentPassBuilder<'_> {
    pub fn set_name(&mut self, name: &str) -> &mut Self {
        self.0.set_name(name);
        self
    }

    /// Transitions `texture` to the present state before the callback runs.
    pub fn present(&mut self, texture: Handle) -> &mut Self {
        self.0.read_texture(None, texture, ResourceState::PRESENT);
        self
    }
}
