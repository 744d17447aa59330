//! Interface to the graphics device consumed by the frame graph.
//!
//! The graph never talks to a graphics API directly; everything it needs from
//! the device — backing objects, command recording, bind tables, fences — goes
//! through the [`Device`] trait. Implementations are expected to be cheap to
//! call from a single thread; the graph holds the device behind an `Rc`.

use crate::{
    error::{AliasingRejected, DeviceLost},
    resource_state::ResourceState,
};
use bitflags::bitflags;

slotmap::new_key_type! {
    /// Identifies a physical texture owned by the device.
    pub struct TextureId;

    /// Identifies a physical buffer owned by the device.
    pub struct BufferId;

    /// Identifies a texture view owned by the device.
    pub struct TextureViewId;

    /// Identifies a fence owned by the device.
    pub struct FenceId;

    /// Identifies a command pool owned by the device.
    pub struct CommandPoolId;

    /// Identifies a command buffer allocated from a command pool.
    pub struct CommandBufferId;

    /// Identifies a descriptor/bind table owned by the device.
    pub struct BindTableId;
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// DESCRIPTORS
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Texel formats understood by the graph.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Format {
    R8Unorm,
    Rg8Unorm,
    Rgba8Unorm,
    Bgra8Unorm,
    R16Float,
    Rg16Float,
    Rgba16Float,
    R32Float,
    Rg32Float,
    Rgba32Float,
    R32Uint,
    Depth32Float,
    Depth24PlusStencil8,
}

impl Format {
    /// Size of one texel in bytes.
    pub fn texel_size(self) -> u64 {
        match self {
            Format::R8Unorm => 1,
            Format::Rg8Unorm | Format::R16Float => 2,
            Format::Rgba8Unorm | Format::Bgra8Unorm | Format::Rg16Float | Format::R32Float | Format::R32Uint => 4,
            Format::Depth32Float | Format::Depth24PlusStencil8 => 4,
            Format::Rgba16Float | Format::Rg32Float => 8,
            Format::Rgba32Float => 16,
        }
    }

    pub fn is_depth_stencil(self) -> bool {
        matches!(self, Format::Depth32Float | Format::Depth24PlusStencil8)
    }
}

bitflags! {
    /// Intended uses of a texture. Must include all the ways the graph's
    /// passes touch it.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
    pub struct TextureUsage: u32 {
        const SAMPLED = 1 << 0;
        const STORAGE = 1 << 1;
        const RENDER_TARGET = 1 << 2;
        const DEPTH_STENCIL = 1 << 3;
        const COPY_SRC = 1 << 4;
        const COPY_DST = 1 << 5;
    }
}

bitflags! {
    /// Intended uses of a buffer.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
    pub struct BufferUsage: u32 {
        const VERTEX = 1 << 0;
        const INDEX = 1 << 1;
        const UNIFORM = 1 << 2;
        const STORAGE = 1 << 3;
        const INDIRECT = 1 << 4;
        const COPY_SRC = 1 << 5;
        const COPY_DST = 1 << 6;
    }
}

/// Where the memory for a buffer lives.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum MemoryLocation {
    GpuOnly,
    CpuToGpu,
    GpuToCpu,
}

/// Describes a texture to create. Doubles as the pooling key: two virtual
/// textures with equal descriptors may resolve to the same recycled backing
/// object on different frames.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub mip_levels: u32,
    pub sample_count: u32,
    pub format: Format,
    pub usage: TextureUsage,
}

impl Default for TextureDesc {
    fn default() -> Self {
        TextureDesc {
            width: 1,
            height: 1,
            depth: 1,
            mip_levels: 1,
            sample_count: 1,
            format: Format::Rgba8Unorm,
            usage: TextureUsage::SAMPLED,
        }
    }
}

impl TextureDesc {
    /// Approximate allocation size in bytes, used by the aliasing heuristic
    /// to compare donors against candidates.
    pub fn byte_size(&self) -> u64 {
        let mut total = 0u64;
        let (mut w, mut h, mut d) = (self.width.max(1) as u64, self.height.max(1) as u64, self.depth.max(1) as u64);
        for _ in 0..self.mip_levels.max(1) {
            total += w * h * d * self.format.texel_size() * self.sample_count.max(1) as u64;
            w = (w / 2).max(1);
            h = (h / 2).max(1);
            d = (d / 2).max(1);
        }
        total
    }
}

/// Describes a buffer to create. Also the buffer pooling key.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct BufferDesc {
    pub size: u64,
    pub usage: BufferUsage,
    pub memory: MemoryLocation,
}

impl Default for BufferDesc {
    fn default() -> Self {
        BufferDesc {
            size: 0,
            usage: BufferUsage::empty(),
            memory: MemoryLocation::GpuOnly,
        }
    }
}

/// Subresource range of a texture view. A zeroed count selects the remaining
/// mips/layers.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct TextureViewDesc {
    pub base_mip: u32,
    pub mip_count: u32,
    pub base_layer: u32,
    pub layer_count: u32,
}

/// Pooling key for texture views: the backing texture plus the view range.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct TextureViewKey {
    pub texture: TextureId,
    pub desc: TextureViewDesc,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// PIPELINE BINDING SIGNATURES
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Kind of resource a binding slot accepts.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum BindingKind {
    SampledTexture,
    StorageTexture,
    UniformBuffer,
    StorageBuffer,
}

/// A named, typed, indexed resource slot exposed by a pipeline.
#[derive(Clone, Debug)]
pub struct BindingSlot {
    pub name: String,
    pub kind: BindingKind,
    pub slot: u32,
}

/// Root/binding signature of a pipeline object. The `name` keys the
/// executors' transient bind-table pools.
#[derive(Clone, Debug)]
pub struct PipelineSignature {
    pub name: String,
    pub slots: Vec<BindingSlot>,
}

impl PipelineSignature {
    pub fn slot(&self, name: &str) -> Option<&BindingSlot> {
        self.slots.iter().find(|s| s.name == name)
    }
}

/// One slot update in a bind table.
#[derive(Copy, Clone, Debug)]
pub struct BindTableWrite {
    pub slot: u32,
    pub entry: BindTableEntry,
}

#[derive(Copy, Clone, Debug)]
pub enum BindTableEntry {
    TextureView(TextureViewId),
    Buffer(BufferId),
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// BARRIERS
////////////////////////////////////////////////////////////////////////////////////////////////////

/// State-transition instruction for a texture.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TextureBarrier {
    pub texture: TextureId,
    pub src: ResourceState,
    pub dst: ResourceState,
}

/// State-transition instruction for a buffer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BufferBarrier {
    pub buffer: BufferId,
    pub src: ResourceState,
    pub dst: ResourceState,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// DEVICE
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Single-graphics-queue device abstraction.
///
/// Fences are timeline-style: `submit` signals a monotonically increasing
/// value (the frame index) and `fence_completed_value` polls the latest value
/// the device has retired without blocking.
pub trait Device {
    // ------ resources ------
    fn create_texture(&self, name: &str, desc: &TextureDesc) -> TextureId;
    fn destroy_texture(&self, texture: TextureId);
    fn create_buffer(&self, name: &str, desc: &BufferDesc) -> BufferId;
    fn destroy_buffer(&self, buffer: BufferId);
    fn create_texture_view(&self, texture: TextureId, desc: &TextureViewDesc) -> TextureViewId;
    fn destroy_texture_view(&self, view: TextureViewId);

    /// Binds a new texture over the memory of `donor`. The returned texture
    /// has undefined contents and must be destroyed like any other. The
    /// device may reject the bind; rejection is recoverable.
    fn alias_texture(&self, donor: TextureId, name: &str, desc: &TextureDesc) -> Result<TextureId, AliasingRejected>;

    // ------ command recording ------
    fn create_command_pool(&self) -> CommandPoolId;
    fn destroy_command_pool(&self, pool: CommandPoolId);
    fn reset_command_pool(&self, pool: CommandPoolId);
    fn begin_command_buffer(&self, pool: CommandPoolId) -> CommandBufferId;
    fn end_command_buffer(&self, cmd: CommandBufferId);

    /// Records every barrier of a pass in one call.
    fn cmd_barriers(&self, cmd: CommandBufferId, textures: &[TextureBarrier], buffers: &[BufferBarrier]);

    /// Records a progress marker used to attribute a device loss.
    fn cmd_write_marker(&self, cmd: CommandBufferId, marker: u32);

    // ------ bind tables ------
    fn create_bind_table(&self, signature: &PipelineSignature) -> BindTableId;
    fn destroy_bind_table(&self, table: BindTableId);
    fn update_bind_table(&self, table: BindTableId, writes: &[BindTableWrite]);
    fn cmd_bind_table(&self, cmd: CommandBufferId, table: BindTableId);

    // ------ submission & synchronization ------
    fn create_fence(&self) -> FenceId;
    fn destroy_fence(&self, fence: FenceId);

    /// Latest value signaled *and* retired on the fence. Never blocks.
    fn fence_completed_value(&self, fence: FenceId) -> u64;

    /// Blocks until `value` retires on the fence.
    fn wait_fence(&self, fence: FenceId, value: u64) -> Result<(), DeviceLost>;

    /// Submits command buffers to the graphics queue and signals `fence` with
    /// `value` once they complete.
    fn submit(&self, cmds: &[CommandBufferId], fence: FenceId, value: u64) -> Result<(), DeviceLost>;

    /// Last marker value the device is known to have executed past. Only
    /// meaningful after a device loss.
    fn completed_marker(&self) -> u32;
}

/// Hooks invoked around each executed pass.
pub trait Profiler {
    fn begin_pass(&mut self, frame: u64, name: &str);
    fn end_pass(&mut self);
}
