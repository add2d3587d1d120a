//! Opaque native handles.

macro_rules! native_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl $name {
            /// The null handle.
            pub const NULL: Self = Self(0);

            /// Raw backend value.
            pub fn raw(self) -> u64 {
                self.0
            }

            /// Whether this is the null handle.
            pub fn is_null(self) -> bool {
                self.0 == 0
            }
        }
    };
}

native_handle!(
    /// A native descriptor set layout.
    DescriptorSetLayoutHandle
);
native_handle!(
    /// A native pipeline layout.
    PipelineLayoutHandle
);
native_handle!(
    /// A native descriptor pool.
    DescriptorPoolHandle
);
native_handle!(
    /// A native descriptor set.
    DescriptorSetHandle
);
native_handle!(
    /// A native host-visible buffer.
    BufferHandle
);
native_handle!(
    /// A native graphics pipeline.
    PipelineHandle
);
native_handle!(
    /// A native image view.
    ImageViewHandle
);
native_handle!(
    /// A native sampler.
    SamplerHandle
);

/// Render pass and subpass a pipeline is created against.
///
/// Owned by the renderer; the binding core only passes it through. The
/// default token has a null render pass, for backends that record with
/// dynamic rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderPassToken {
    /// Raw native render pass.
    pub render_pass: u64,
    /// Subpass index.
    pub subpass: u32,
    /// Number of color attachments in the subpass.
    pub color_attachment_count: u32,
    /// Whether depth testing and writing are enabled.
    pub depth_test: bool,
}

impl Default for RenderPassToken {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl RenderPassToken {
    /// Create a token for `subpass` of `render_pass` with one color attachment.
    pub fn new(render_pass: u64, subpass: u32) -> Self {
        Self {
            render_pass,
            subpass,
            color_attachment_count: 1,
            depth_test: false,
        }
    }

    /// Set the color attachment count.
    pub fn with_color_attachments(mut self, count: u32) -> Self {
        self.color_attachment_count = count;
        self
    }

    /// Enable depth testing.
    pub fn with_depth_test(mut self) -> Self {
        self.depth_test = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_handle() {
        assert!(BufferHandle::NULL.is_null());
        assert!(!DescriptorSetHandle(7).is_null());
        assert_eq!(PipelineHandle(42).raw(), 42);
    }
}
