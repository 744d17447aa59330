/// The device stopped responding. Execution cannot continue past this.
#[derive(Copy, Clone, Debug, thiserror::Error)]
#[error("device lost")]
pub struct DeviceLost;

/// The device refused to bind a texture over the donor's memory
/// (e.g. heap incompatibility). Recoverable: the caller falls back to a
/// pooled allocation for that frame.
#[derive(Copy, Clone, Debug, thiserror::Error)]
#[error("aliasing bind rejected by the device")]
pub struct AliasingRejected;

/// A name was registered twice in the blackboard.
#[derive(Clone, Debug, thiserror::Error)]
#[error("name {0:?} is already registered")]
pub struct DuplicateName(pub String);
