//! Mock device used by the integration tests. Records every call so tests
//! can assert on allocation counts, barrier batches, fence waits and
//! submissions. Fences retire when waited on (or via `complete_all`), which
//! mimics a GPU that finishes work exactly when the CPU blocks for it.

use passage::{
    AliasingRejected, BindTableId, BindTableWrite, BufferBarrier, BufferDesc, BufferId,
    CommandBufferId, CommandPoolId, Device, DeviceLost, FenceId, PipelineSignature, TextureBarrier,
    TextureDesc, TextureId, TextureViewDesc, TextureViewId,
};
use slotmap::SlotMap;
use std::cell::RefCell;

#[derive(Default)]
struct Fence {
    completed: u64,
    submitted: u64,
}

#[derive(Default)]
struct Inner {
    textures: SlotMap<TextureId, TextureDesc>,
    buffers: SlotMap<BufferId, BufferDesc>,
    views: SlotMap<TextureViewId, (TextureId, TextureViewDesc)>,
    fences: SlotMap<FenceId, Fence>,
    pools: SlotMap<CommandPoolId, ()>,
    cmds: SlotMap<CommandBufferId, ()>,
    bind_tables: SlotMap<BindTableId, String>,

    created_textures: usize,
    created_buffers: usize,
    created_views: usize,
    created_bind_tables: usize,
    destroyed_textures: usize,
    alias_calls: usize,
    reject_aliasing: bool,
    lost: bool,

    /// One entry per `cmd_barriers` call.
    barrier_log: Vec<(Vec<TextureBarrier>, Vec<BufferBarrier>)>,
    markers: Vec<u32>,
    last_marker: u32,
    fence_waits: usize,
    submits: Vec<u64>,
    bind_table_writes: Vec<Vec<BindTableWrite>>,
}

#[derive(Default)]
pub struct MockDevice {
    inner: RefCell<Inner>,
}

#[allow(dead_code)] // not every test inspects every channel
impl MockDevice {
    pub fn new() -> MockDevice {
        MockDevice::default()
    }

    pub fn created_textures(&self) -> usize {
        self.inner.borrow().created_textures
    }

    pub fn created_buffers(&self) -> usize {
        self.inner.borrow().created_buffers
    }

    pub fn created_views(&self) -> usize {
        self.inner.borrow().created_views
    }

    pub fn created_bind_tables(&self) -> usize {
        self.inner.borrow().created_bind_tables
    }

    pub fn destroyed_textures(&self) -> usize {
        self.inner.borrow().destroyed_textures
    }

    pub fn alive_textures(&self) -> usize {
        self.inner.borrow().textures.len()
    }

    pub fn alive_views(&self) -> usize {
        self.inner.borrow().views.len()
    }

    pub fn alias_calls(&self) -> usize {
        self.inner.borrow().alias_calls
    }

    pub fn set_reject_aliasing(&self, reject: bool) {
        self.inner.borrow_mut().reject_aliasing = reject;
    }

    pub fn lose(&self) {
        self.inner.borrow_mut().lost = true;
    }

    pub fn fence_waits(&self) -> usize {
        self.inner.borrow().fence_waits
    }

    pub fn submits(&self) -> Vec<u64> {
        self.inner.borrow().submits.clone()
    }

    pub fn barrier_log(&self) -> Vec<(Vec<TextureBarrier>, Vec<BufferBarrier>)> {
        self.inner.borrow().barrier_log.clone()
    }

    pub fn bind_table_writes(&self) -> Vec<Vec<BindTableWrite>> {
        self.inner.borrow().bind_table_writes.clone()
    }

    /// Retires all submitted work, as if the GPU caught up.
    pub fn complete_all(&self) {
        let mut inner = self.inner.borrow_mut();
        for fence in inner.fences.values_mut() {
            fence.completed = fence.submitted;
        }
    }

    /// Registers a texture the test owns, for importing into the graph.
    pub fn make_external_texture(&self, desc: TextureDesc) -> TextureId {
        self.inner.borrow_mut().textures.insert(desc)
    }
}

impl Device for MockDevice {
    fn create_texture(&self, _name: &str, desc: &TextureDesc) -> TextureId {
        let mut inner = self.inner.borrow_mut();
        inner.created_textures += 1;
        inner.textures.insert(*desc)
    }

    fn destroy_texture(&self, texture: TextureId) {
        let mut inner = self.inner.borrow_mut();
        inner.textures.remove(texture).expect("destroying an unknown texture");
        inner.destroyed_textures += 1;
    }

    fn create_buffer(&self, _name: &str, desc: &BufferDesc) -> BufferId {
        let mut inner = self.inner.borrow_mut();
        inner.created_buffers += 1;
        inner.buffers.insert(*desc)
    }

    fn destroy_buffer(&self, buffer: BufferId) {
        self.inner.borrow_mut().buffers.remove(buffer).expect("destroying an unknown buffer");
    }

    fn create_texture_view(&self, texture: TextureId, desc: &TextureViewDesc) -> TextureViewId {
        let mut inner = self.inner.borrow_mut();
        assert!(inner.textures.contains_key(texture), "view of an unknown texture");
        inner.created_views += 1;
        inner.views.insert((texture, *desc))
    }

    fn destroy_texture_view(&self, view: TextureViewId) {
        self.inner.borrow_mut().views.remove(view).expect("destroying an unknown view");
    }

    fn alias_texture(&self, donor: TextureId, _name: &str, desc: &TextureDesc) -> Result<TextureId, AliasingRejected> {
        let mut inner = self.inner.borrow_mut();
        inner.alias_calls += 1;
        assert!(inner.textures.contains_key(donor), "aliasing over an unknown donor");
        if inner.reject_aliasing {
            return Err(AliasingRejected);
        }
        Ok(inner.textures.insert(*desc))
    }

    fn create_command_pool(&self) -> CommandPoolId {
        self.inner.borrow_mut().pools.insert(())
    }

    fn destroy_command_pool(&self, pool: CommandPoolId) {
        self.inner.borrow_mut().pools.remove(pool).expect("destroying an unknown pool");
    }

    fn reset_command_pool(&self, pool: CommandPoolId) {
        assert!(self.inner.borrow().pools.contains_key(pool));
    }

    fn begin_command_buffer(&self, pool: CommandPoolId) -> CommandBufferId {
        let mut inner = self.inner.borrow_mut();
        assert!(inner.pools.contains_key(pool));
        inner.cmds.insert(())
    }

    fn end_command_buffer(&self, cmd: CommandBufferId) {
        assert!(self.inner.borrow().cmds.contains_key(cmd));
    }

    fn cmd_barriers(&self, _cmd: CommandBufferId, textures: &[TextureBarrier], buffers: &[BufferBarrier]) {
        self.inner
            .borrow_mut()
            .barrier_log
            .push((textures.to_vec(), buffers.to_vec()));
    }

    fn cmd_write_marker(&self, _cmd: CommandBufferId, marker: u32) {
        let mut inner = self.inner.borrow_mut();
        inner.markers.push(marker);
        inner.last_marker = marker;
    }

    fn create_bind_table(&self, signature: &PipelineSignature) -> BindTableId {
        let mut inner = self.inner.borrow_mut();
        inner.created_bind_tables += 1;
        inner.bind_tables.insert(signature.name.clone())
    }

    fn destroy_bind_table(&self, table: BindTableId) {
        self.inner.borrow_mut().bind_tables.remove(table).expect("destroying an unknown bind table");
    }

    fn update_bind_table(&self, table: BindTableId, writes: &[BindTableWrite]) {
        let mut inner = self.inner.borrow_mut();
        assert!(inner.bind_tables.contains_key(table));
        inner.bind_table_writes.push(writes.to_vec());
    }

    fn cmd_bind_table(&self, _cmd: CommandBufferId, table: BindTableId) {
        assert!(self.inner.borrow().bind_tables.contains_key(table));
    }

    fn create_fence(&self) -> FenceId {
        self.inner.borrow_mut().fences.insert(Fence::default())
    }

    fn destroy_fence(&self, fence: FenceId) {
        self.inner.borrow_mut().fences.remove(fence).expect("destroying an unknown fence");
    }

    fn fence_completed_value(&self, fence: FenceId) -> u64 {
        self.inner.borrow().fences[fence].completed
    }

    fn wait_fence(&self, fence: FenceId, value: u64) -> Result<(), DeviceLost> {
        let mut inner = self.inner.borrow_mut();
        if inner.lost {
            return Err(DeviceLost);
        }
        inner.fence_waits += 1;
        let fence = &mut inner.fences[fence];
        assert!(value <= fence.submitted, "waiting for a value never submitted");
        fence.completed = fence.completed.max(value);
        Ok(())
    }

    fn submit(&self, cmds: &[CommandBufferId], fence: FenceId, value: u64) -> Result<(), DeviceLost> {
        let mut inner = self.inner.borrow_mut();
        if inner.lost {
            return Err(DeviceLost);
        }
        for cmd in cmds {
            assert!(inner.cmds.contains_key(*cmd));
        }
        inner.submits.push(value);
        inner.fences[fence].submitted = value;
        Ok(())
    }

    fn completed_marker(&self) -> u32 {
        self.inner.borrow().last_marker
    }
}
