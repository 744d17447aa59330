use bitflags::bitflags;

bitflags! {
    /// GPU state a pass requests a resource in.
    ///
    /// The empty set (`ResourceState::UNDEFINED`) stands for a resource whose
    /// previous contents are unknown, such as a freshly created texture.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
    pub struct ResourceState: u32 {
        const COMMON = 1 << 0;
        const VERTEX_BUFFER = 1 << 1;
        const INDEX_BUFFER = 1 << 2;
        const CONSTANT_BUFFER = 1 << 3;
        const INDIRECT_ARGUMENT = 1 << 4;
        const SHADER_RESOURCE = 1 << 5;
        const UNORDERED_ACCESS = 1 << 6;
        const RENDER_TARGET = 1 << 7;
        const DEPTH_WRITE = 1 << 8;
        const DEPTH_READ = 1 << 9;
        const COPY_SRC = 1 << 10;
        const COPY_DST = 1 << 11;
        const PRESENT = 1 << 12;
    }
}

impl ResourceState {
    /// Contents unknown; any transition out of this state is an initialization.
    pub const UNDEFINED: ResourceState = ResourceState::empty();
}

/// Returns whether the state implies GPU writes to the resource.
pub fn is_write_state(state: ResourceState) -> bool {
    state.intersects(
        ResourceState::UNORDERED_ACCESS
            | ResourceState::RENDER_TARGET
            | ResourceState::DEPTH_WRITE
            | ResourceState::COPY_DST,
    )
}
