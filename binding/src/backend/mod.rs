//! GPU backend abstraction layer.
//!
//! The binding core never talks to a graphics API directly. Every native call
//! it needs goes through the [`GpuBackend`] trait, and every command it records
//! goes through a [`CommandRecorder`].
//!
//! # Available Backends
//!
//! - `dummy` (default): in-memory backend with call counters, for testing
//! - `vulkan-backend`: native Vulkan backend over a caller-supplied `ash::Device`

pub mod dummy;
mod error;

#[cfg(feature = "vulkan-backend")]
pub mod vulkan;

pub use dummy::{CommandLog, DummyBackend, DummyStats, RecordedCommand};
pub use error::BackendError;
#[cfg(feature = "vulkan-backend")]
pub use vulkan::{VulkanBackend, VulkanCommandRecorder};

use crate::pipeline::ShaderSource;
use crate::reflection::{DescriptorKind, LayoutBindingKey, PushConstantKey, ShaderStageFlags};
use crate::types::{
    BufferDescriptor, BufferHandle, DescriptorPoolHandle, DescriptorSetHandle,
    DescriptorSetLayoutHandle, ImageViewHandle, PipelineHandle, PipelineLayoutHandle,
    RenderPassToken, SamplerHandle, VertexInputDescription,
};

/// Number of descriptors of one kind reserved in a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolSize {
    /// Descriptor kind.
    pub kind: DescriptorKind,
    /// Descriptor count.
    pub count: u32,
}

/// Resource referenced by a descriptor write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingData {
    /// A buffer range (uniform or storage, static or dynamic).
    Buffer {
        /// Buffer handle.
        buffer: BufferHandle,
        /// Byte offset of the bound range.
        offset: u64,
        /// Byte size of the bound range.
        range: u64,
    },
    /// An image view and/or sampler.
    ///
    /// For a standalone sampler binding the view is null; for a sampled or
    /// storage image binding the sampler is null.
    SampledImage {
        /// Image view handle.
        view: ImageViewHandle,
        /// Sampler handle.
        sampler: SamplerHandle,
    },
}

/// One descriptor write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorWrite {
    /// Target set.
    pub set: DescriptorSetHandle,
    /// Target binding.
    pub binding: u32,
    /// First array element written.
    pub array_element: u32,
    /// Descriptor kind of the binding.
    pub kind: DescriptorKind,
    /// Resource to write.
    pub data: BindingData,
}

/// One descriptor-to-descriptor copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorCopy {
    /// Source set.
    pub src_set: DescriptorSetHandle,
    /// Destination set.
    pub dst_set: DescriptorSetHandle,
    /// Binding copied (same index in both sets).
    pub binding: u32,
    /// Number of array elements copied.
    pub count: u32,
}

/// Everything needed to create a native graphics pipeline.
#[derive(Debug, Clone, Copy)]
pub struct PipelineDescriptor<'a> {
    /// Debug label.
    pub label: Option<&'a str>,
    /// Pipeline layout.
    pub layout: PipelineLayoutHandle,
    /// Shader stages.
    pub stages: &'a [ShaderSource],
    /// Render pass and subpass the pipeline is used in.
    pub render_pass: RenderPassToken,
    /// Vertex buffers and attributes.
    pub vertex_input: &'a VertexInputDescription,
}

/// GPU backend trait for abstracting different GPU APIs.
///
/// Creation calls return [`BackendError`]; callers decide whether a failure is
/// fatal. Destruction calls take handles previously returned by the same
/// backend and never fail.
pub trait GpuBackend: Send + Sync + 'static {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Minimum alignment, in bytes, of dynamic uniform buffer offsets.
    fn min_uniform_buffer_offset_alignment(&self) -> u64;

    /// Create a descriptor set layout from canonical (sorted) bindings.
    fn create_descriptor_set_layout(
        &self,
        bindings: &[LayoutBindingKey],
    ) -> Result<DescriptorSetLayoutHandle, BackendError>;

    /// Destroy a descriptor set layout.
    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayoutHandle);

    /// Create a pipeline layout from set layouts (position = set index) and
    /// push-constant ranges.
    fn create_pipeline_layout(
        &self,
        set_layouts: &[DescriptorSetLayoutHandle],
        push_constants: &[PushConstantKey],
    ) -> Result<PipelineLayoutHandle, BackendError>;

    /// Destroy a pipeline layout.
    fn destroy_pipeline_layout(&self, layout: PipelineLayoutHandle);

    /// Create a descriptor pool holding up to `max_sets` sets.
    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        sizes: &[PoolSize],
    ) -> Result<DescriptorPoolHandle, BackendError>;

    /// Return every set allocated from `pool` to it.
    fn reset_descriptor_pool(&self, pool: DescriptorPoolHandle) -> Result<(), BackendError>;

    /// Destroy a descriptor pool and every set allocated from it.
    fn destroy_descriptor_pool(&self, pool: DescriptorPoolHandle);

    /// Allocate one set of `layout` from `pool`.
    ///
    /// Returns [`BackendError::OutOfPoolMemory`] or
    /// [`BackendError::FragmentedPool`] when the pool cannot hold another set.
    fn allocate_descriptor_set(
        &self,
        pool: DescriptorPoolHandle,
        layout: DescriptorSetLayoutHandle,
    ) -> Result<DescriptorSetHandle, BackendError>;

    /// Apply descriptor writes, then descriptor copies, in one batch.
    fn update_descriptor_sets(&self, writes: &[DescriptorWrite], copies: &[DescriptorCopy]);

    /// Create a host-visible buffer.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferHandle, BackendError>;

    /// Destroy a buffer.
    fn destroy_buffer(&self, buffer: BufferHandle);

    /// Write `data` at `offset` through a mapping and flush exactly that range.
    fn write_buffer(
        &self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), BackendError>;

    /// Copy `size` bytes within one buffer and flush the destination range.
    fn copy_buffer_range(
        &self,
        buffer: BufferHandle,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    ) -> Result<(), BackendError>;

    /// Read `size` bytes at `offset` back to the CPU.
    fn read_buffer(
        &self,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    ) -> Result<Vec<u8>, BackendError>;

    /// Create a graphics pipeline.
    fn create_graphics_pipeline(
        &self,
        descriptor: &PipelineDescriptor<'_>,
    ) -> Result<PipelineHandle, BackendError>;

    /// Destroy a graphics pipeline.
    fn destroy_pipeline(&self, pipeline: PipelineHandle);
}

/// Receives the commands the binder records for a draw.
///
/// Implementations forward them to a native command buffer; the recorder
/// never submits anything.
pub trait CommandRecorder {
    /// Bind a graphics pipeline.
    fn bind_pipeline(&mut self, pipeline: PipelineHandle);

    /// Bind `sets` starting at set index `first_set`.
    ///
    /// `dynamic_offsets` holds one entry per dynamic binding across all sets,
    /// in set then binding order.
    fn bind_descriptor_sets(
        &mut self,
        layout: PipelineLayoutHandle,
        first_set: u32,
        sets: &[DescriptorSetHandle],
        dynamic_offsets: &[u32],
    );

    /// Write push-constant data.
    fn push_constants(
        &mut self,
        layout: PipelineLayoutHandle,
        stages: ShaderStageFlags,
        offset: u32,
        data: &[u8],
    );
}
