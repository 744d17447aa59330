use crate::resource_state::ResourceState;

/// Relationship between a pass and a resource.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum EdgeKind {
    TextureRead,
    TextureWrite,
    TextureReadWrite,
    BufferRead,
    BufferReadWrite,
    /// Buffer consumed by the fixed-function pipeline (vertex, index,
    /// indirect arguments) rather than through a bind table.
    PipelineBuffer,
}

impl EdgeKind {
    pub(crate) fn is_texture(self) -> bool {
        matches!(self, EdgeKind::TextureRead | EdgeKind::TextureWrite | EdgeKind::TextureReadWrite)
    }
}

/// An edge always connects exactly one pass and one resource. Reads point
/// resource→pass; writes point pass→resource.
#[derive(Debug)]
pub(crate) struct Edge {
    pub kind: EdgeKind,
    /// State the pass requests the resource in.
    pub state: ResourceState,
    /// Shader binding name, for edges that feed the pass's bind table.
    pub binding: Option<String>,
}
