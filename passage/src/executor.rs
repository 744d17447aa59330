//! Per-frame-in-flight execution state.
//!
//! One executor exists per in-flight slot. Each owns a fence, a command
//! pool, transient bind-table pools keyed by pipeline-signature name, the
//! progress markers written during its cycle, and the aliasing-backed
//! textures created during its cycle. `reset_begin` blocks on the
//! executor's own fence, which is what bounds CPU/GPU overlap to the
//! configured frame count.

use crate::{
    device::{
        BindTableId, CommandBufferId, CommandPoolId, Device, FenceId, PipelineSignature, TextureId,
        TextureViewId,
    },
    error::DeviceLost,
};
use fxhash::FxHashMap;
use tracing::error;

#[derive(Default)]
struct BindTablePool {
    free: Vec<BindTableId>,
    in_use: Vec<BindTableId>,
}

pub(crate) struct FrameExecutor {
    fence: FenceId,
    command_pool: CommandPoolId,
    /// Command buffer currently recording; `Some` between `reset_begin` and
    /// `commit`.
    cmd: Option<CommandBufferId>,
    /// Fence value this executor last signalled (the frame index). Zero
    /// before the first submission.
    submitted_frame: u64,
    bind_tables: FxHashMap<String, BindTablePool>,
    /// Marker value → pass name, in recording order.
    markers: Vec<(u32, String)>,
    next_marker: u32,
    /// Textures bound over donor memory this cycle, and the views created on
    /// them; destroyed when the slot is reused, after the fence wait proves
    /// the GPU is done with them.
    aliased_textures: Vec<TextureId>,
    aliased_views: Vec<TextureViewId>,
}

impl FrameExecutor {
    pub(crate) fn new(device: &dyn Device) -> FrameExecutor {
        FrameExecutor {
            fence: device.create_fence(),
            command_pool: device.create_command_pool(),
            cmd: None,
            submitted_frame: 0,
            bind_tables: FxHashMap::default(),
            markers: Vec::new(),
            next_marker: 0,
            aliased_textures: Vec::new(),
            aliased_views: Vec::new(),
        }
    }

    /// Waits for the slot's previous frame to retire, then recycles the
    /// slot's transient state and opens a fresh command buffer.
    pub(crate) fn reset_begin(&mut self, device: &dyn Device) -> Result<(), DeviceLost> {
        if self.submitted_frame > 0 {
            device.wait_fence(self.fence, self.submitted_frame)?;
        }
        for pool in self.bind_tables.values_mut() {
            pool.free.append(&mut pool.in_use);
        }
        for view in self.aliased_views.drain(..) {
            device.destroy_texture_view(view);
        }
        for texture in self.aliased_textures.drain(..) {
            device.destroy_texture(texture);
        }
        self.markers.clear();
        self.next_marker = 0;
        device.reset_command_pool(self.command_pool);
        self.cmd = Some(device.begin_command_buffer(self.command_pool));
        Ok(())
    }

    pub(crate) fn cmd(&self) -> CommandBufferId {
        self.cmd.expect("executor is not recording")
    }

    pub(crate) fn allocate_bind_table(&mut self, device: &dyn Device, signature: &PipelineSignature) -> BindTableId {
        let pool = self.bind_tables.entry(signature.name.clone()).or_default();
        let table = pool
            .free
            .pop()
            .unwrap_or_else(|| device.create_bind_table(signature));
        pool.in_use.push(table);
        table
    }

    /// Writes a progress marker attributed to `pass_name`.
    pub(crate) fn write_marker(&mut self, device: &dyn Device, pass_name: &str) {
        self.next_marker += 1;
        let marker = self.next_marker;
        device.cmd_write_marker(self.cmd(), marker);
        self.markers.push((marker, pass_name.to_string()));
    }

    pub(crate) fn register_aliased_texture(&mut self, texture: TextureId) {
        self.aliased_textures.push(texture);
    }

    pub(crate) fn register_aliased_view(&mut self, view: TextureViewId) {
        self.aliased_views.push(view);
    }

    /// Ends recording and submits, signalling the fence with `frame`.
    pub(crate) fn commit(&mut self, device: &dyn Device, frame: u64) -> Result<(), DeviceLost> {
        let cmd = self.cmd.take().expect("executor is not recording");
        device.end_command_buffer(cmd);
        device.submit(&[cmd], self.fence, frame)?;
        self.submitted_frame = frame;
        Ok(())
    }

    /// Latest frame this executor is known to have finished on the device.
    pub(crate) fn completed_value(&self, device: &dyn Device) -> u64 {
        device.fence_completed_value(self.fence)
    }

    /// Logs which of this cycle's passes the device got through, against
    /// the last marker it retired. Called on device loss.
    pub(crate) fn dump_markers(&self, device: &dyn Device) {
        let completed = device.completed_marker();
        error!(
            frame = self.submitted_frame,
            completed_marker = completed,
            "executor marker trace"
        );
        for (marker, pass) in &self.markers {
            let executed = *marker <= completed;
            error!(marker, pass = pass.as_str(), executed, "  pass marker");
        }
    }

    pub(crate) fn destroy(&mut self, device: &dyn Device) {
        for pool in self.bind_tables.values_mut() {
            for table in pool.free.drain(..).chain(pool.in_use.drain(..)) {
                device.destroy_bind_table(table);
            }
        }
        for view in self.aliased_views.drain(..) {
            device.destroy_texture_view(view);
        }
        for texture in self.aliased_textures.drain(..) {
            device.destroy_texture(texture);
        }
        device.destroy_command_pool(self.command_pool);
        device.destroy_fence(self.fence);
    }

    pub(crate) fn submitted_frame(&self) -> u64 {
        self.submitted_frame
    }

    pub(crate) fn wait_idle(&self, device: &dyn Device) -> Result<(), DeviceLost> {
        if self.submitted_frame > 0 {
            device.wait_fence(self.fence, self.submitted_frame)?;
        }
        Ok(())
    }
}
