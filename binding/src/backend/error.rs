//! Backend error types.

/// Errors returned by native backend calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The descriptor pool has no room left for the requested set.
    #[error("descriptor pool out of memory")]
    OutOfPoolMemory,
    /// The descriptor pool has room but is too fragmented to satisfy the request.
    #[error("descriptor pool fragmented")]
    FragmentedPool,
    /// Out of GPU or host memory.
    #[error("out of GPU memory")]
    OutOfMemory,
    /// The device was lost.
    #[error("GPU device lost")]
    DeviceLost,
    /// Any other native failure.
    #[error("native backend error: {0}")]
    Native(String),
}

impl BackendError {
    /// Whether the failure means "try another descriptor pool".
    pub fn is_pool_exhausted(&self) -> bool {
        matches!(self, Self::OutOfPoolMemory | Self::FragmentedPool)
    }
}
