//! Common types shared by the binding core and its backends.
//!
//! Native objects are referred to through opaque `u64` handles; buffer and
//! vertex-input descriptors are passed through to the backend unchanged.

mod buffer;
mod handles;
mod vertex;

pub use buffer::{BufferDescriptor, BufferUsage};
pub use handles::{
    BufferHandle, DescriptorPoolHandle, DescriptorSetHandle, DescriptorSetLayoutHandle,
    ImageViewHandle, PipelineHandle, PipelineLayoutHandle, RenderPassToken, SamplerHandle,
};
pub use vertex::{
    VertexAttribute, VertexAttributeFormat, VertexBufferLayout, VertexInputDescription,
    VertexStepMode,
};
