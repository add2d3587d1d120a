//! Binding error types.

use crate::backend::BackendError;
use crate::reflection::{DescriptorKind, ShaderStage};

/// Errors that can occur in the binding system.
///
/// `ReflectionConflict` and `CreationFailed` are fatal: they abort construction
/// of the pipeline or material that triggered them. `UnknownBinding` and
/// `SizeMismatch` are recoverable: the offending write is skipped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindingError {
    /// Two shader stages disagree on the shape of the same binding.
    #[error(
        "reflection conflict at set {set} binding {binding} in {stage:?} stage: \
         expected {expected:?} x{expected_count}, found {found:?} x{found_count}"
    )]
    ReflectionConflict {
        /// Set index.
        set: u32,
        /// Binding index.
        binding: u32,
        /// Stage that reported the conflicting shape.
        stage: ShaderStage,
        /// Kind recorded by an earlier stage.
        expected: DescriptorKind,
        /// Array count recorded by an earlier stage.
        expected_count: u32,
        /// Kind reported by `stage`.
        found: DescriptorKind,
        /// Array count reported by `stage`.
        found_count: u32,
    },

    /// A native object could not be created.
    #[error("creation failed: {0}")]
    CreationFailed(String),

    /// A write referenced a uniform member, sampler or push-constant range
    /// that does not exist.
    #[error("unknown binding: {0}")]
    UnknownBinding(String),

    /// A write supplied a value of the wrong byte size.
    #[error("size mismatch for '{name}': expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Name of the member or range.
        name: String,
        /// Reflected byte size.
        expected: u32,
        /// Supplied byte size.
        actual: u32,
    },

    /// Shader bytecode or source could not be parsed for reflection.
    #[error("shader reflection failed: {0}")]
    ShaderReflectionFailed(String),

    /// An invalid parameter was provided.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl BindingError {
    /// Wrap a backend failure as a creation failure with context.
    pub fn creation(what: &str, err: BackendError) -> Self {
        Self::CreationFailed(format!("{what}: {err}"))
    }

    /// Whether the error aborts construction.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ReflectionConflict { .. }
                | Self::CreationFailed(_)
                | Self::ShaderReflectionFailed(_)
                | Self::InvalidParameter(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BindingError::UnknownBinding("Material.missing".to_string());
        assert_eq!(err.to_string(), "unknown binding: Material.missing");

        let err = BindingError::SizeMismatch {
            name: "Material.tint_r".to_string(),
            expected: 4,
            actual: 16,
        };
        assert_eq!(
            err.to_string(),
            "size mismatch for 'Material.tint_r': expected 4 bytes, got 16"
        );
    }

    #[test]
    fn test_creation_wraps_backend_error() {
        let err = BindingError::creation("descriptor set layout", BackendError::OutOfMemory);
        assert_eq!(
            err.to_string(),
            "creation failed: descriptor set layout: out of GPU memory"
        );
        assert!(err.is_fatal());
        assert!(!BindingError::UnknownBinding(String::new()).is_fatal());
    }
}
