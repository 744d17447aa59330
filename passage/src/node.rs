//! Graph nodes: virtual resources (textures, buffers) and passes.

use crate::{
    device::{BufferDesc, BufferId, PipelineSignature, TextureDesc, TextureId, TextureViewId, TextureViewKey},
    graph::Handle,
    render_graph::PassContext,
    resource_state::ResourceState,
};
use bitflags::bitflags;
use once_cell::unsync::OnceCell;
use std::rc::Rc;

bitflags! {
    /// Garbage-collection classification of a resource, used to filter
    /// explicit pool collection.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
    pub struct ResourceTags: u32 {
        /// Assigned when the builder sets no tag.
        const DEFAULT = 1 << 0;
        /// Opts the resource into same-frame pool reuse (e.g. upload
        /// buffers rewritten every frame).
        const DYNAMIC = 1 << 1;
        const USER0 = 1 << 2;
        const USER1 = 1 << 3;
        const USER2 = 1 << 4;
    }
}

/// Pass-order interval during which a resource is referenced.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Lifespan {
    pub from: u32,
    pub to: u32,
}

impl Lifespan {
    pub fn overlaps(&self, other: &Lifespan) -> bool {
        !(self.to < other.from || other.to < self.from)
    }
}

/// Determines how a pass records its work.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum PassKind {
    Render,
    Compute,
    Copy,
    Present,
}

/// The type of callback invoked when a pass is executed.
pub(crate) type PassExecuteCallback = Box<dyn FnOnce(&mut PassContext<'_>)>;

pub(crate) struct PassNode {
    /// Name of this pass, for debugging purposes.
    pub name: String,
    pub kind: PassKind,
    /// Monotonic insertion order; defines "before/after" for barriers,
    /// lifespans and aliasing.
    pub order: u32,
    /// Exempts the pass from culling when it has no edges.
    pub can_be_lone: bool,
    pub culled: bool,
    /// Deferred recording callback, taken exactly once at execution.
    pub executor: Option<PassExecuteCallback>,
    /// Binding signature the pass's bind table is built against.
    pub pipeline: Option<Rc<PipelineSignature>>,
}

impl PassNode {
    pub(crate) fn new(name: &str, kind: PassKind, order: u32, executor: PassExecuteCallback) -> PassNode {
        PassNode {
            name: name.to_string(),
            kind,
            order,
            // terminal present passes typically carry no edges
            can_be_lone: kind == PassKind::Present,
            culled: false,
            executor: Some(executor),
            pipeline: None,
        }
    }
}

pub(crate) struct TextureNode {
    pub name: String,
    pub desc: TextureDesc,
    pub tags: ResourceTags,
    /// State the backing object is in when the frame first touches it:
    /// the import state, the pooled object's last state, or UNDEFINED.
    pub init_state: ResourceState,
    /// Set for externally owned textures; the graph never pools or frees
    /// these.
    pub imported: Option<TextureId>,
    /// Excluded from memory aliasing, both as donor and candidate.
    pub dedicated: bool,
    pub culled: bool,
    /// Resolved backing object; assigned at most once per frame, on first
    /// touch.
    pub frame_texture: Option<TextureId>,
    /// Candidate donor chosen by the aliasing calculator.
    pub aliasing_source: Option<Handle>,
    pub is_aliasing: bool,
    /// Whether `frame_texture` was bound over the donor's memory this frame.
    pub frame_aliased: bool,
    /// Whether the backing was already returned to its pool (last use
    /// passed).
    pub retired: bool,
    /// State the most recent pass left the resource in.
    pub frame_state: ResourceState,
    /// Views created on the frame texture this cycle; returned with it.
    pub frame_views: Vec<(TextureViewKey, TextureViewId)>,
    pub lifespan: OnceCell<Lifespan>,
}

impl TextureNode {
    pub(crate) fn new() -> TextureNode {
        TextureNode {
            name: String::new(),
            desc: TextureDesc::default(),
            tags: ResourceTags::empty(),
            init_state: ResourceState::UNDEFINED,
            imported: None,
            dedicated: false,
            culled: false,
            frame_texture: None,
            aliasing_source: None,
            is_aliasing: false,
            frame_aliased: false,
            retired: false,
            frame_state: ResourceState::UNDEFINED,
            frame_views: Vec::new(),
            lifespan: OnceCell::new(),
        }
    }
}

pub(crate) struct BufferNode {
    pub name: String,
    pub desc: BufferDesc,
    pub tags: ResourceTags,
    pub init_state: ResourceState,
    pub imported: Option<BufferId>,
    pub culled: bool,
    pub frame_buffer: Option<BufferId>,
    pub retired: bool,
    pub frame_state: ResourceState,
    pub lifespan: OnceCell<Lifespan>,
}

impl BufferNode {
    pub(crate) fn new() -> BufferNode {
        BufferNode {
            name: String::new(),
            desc: BufferDesc::default(),
            tags: ResourceTags::empty(),
            init_state: ResourceState::UNDEFINED,
            imported: None,
            culled: false,
            frame_buffer: None,
            retired: false,
            frame_state: ResourceState::UNDEFINED,
            lifespan: OnceCell::new(),
        }
    }
}

pub(crate) enum Node {
    Texture(TextureNode),
    Buffer(BufferNode),
    Pass(PassNode),
}

impl Node {
    pub(crate) fn is_pass(&self) -> bool {
        matches!(self, Node::Pass(_))
    }

    pub(crate) fn culled(&self) -> bool {
        match self {
            Node::Texture(t) => t.culled,
            Node::Buffer(b) => b.culled,
            Node::Pass(p) => p.culled,
        }
    }

    pub(crate) fn set_culled(&mut self) {
        match self {
            Node::Texture(t) => t.culled = true,
            Node::Buffer(b) => b.culled = true,
            Node::Pass(p) => p.culled = true,
        }
    }

    pub(crate) fn as_pass(&self) -> &PassNode {
        match self {
            Node::Pass(p) => p,
            _ => panic!("expected a pass node"),
        }
    }

    pub(crate) fn as_pass_mut(&mut self) -> &mut PassNode {
        match self {
            Node::Pass(p) => p,
            _ => panic!("expected a pass node"),
        }
    }

    pub(crate) fn as_texture(&self) -> &TextureNode {
        match self {
            Node::Texture(t) => t,
            _ => panic!("expected a texture node"),
        }
    }

    pub(crate) fn as_texture_mut(&mut self) -> &mut TextureNode {
        match self {
            Node::Texture(t) => t,
            _ => panic!("expected a texture node"),
        }
    }

    pub(crate) fn as_buffer(&self) -> &BufferNode {
        match self {
            Node::Buffer(b) => b,
            _ => panic!("expected a buffer node"),
        }
    }

    pub(crate) fn as_buffer_mut(&mut self) -> &mut BufferNode {
        match self {
            Node::Buffer(b) => b,
            _ => panic!("expected a buffer node"),
        }
    }
}
