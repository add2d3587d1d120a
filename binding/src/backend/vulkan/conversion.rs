//! Type conversions between RedLilium binding types and Vulkan types.

use ash::vk;

use crate::backend::BackendError;
use crate::reflection::{DescriptorKind, ShaderStage, ShaderStageFlags};
use crate::types::{BufferUsage, VertexAttributeFormat, VertexStepMode};

/// Convert a Vulkan result code to a backend error.
pub fn convert_result(result: vk::Result) -> BackendError {
    match result {
        vk::Result::ERROR_OUT_OF_POOL_MEMORY => BackendError::OutOfPoolMemory,
        vk::Result::ERROR_FRAGMENTED_POOL => BackendError::FragmentedPool,
        vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => {
            BackendError::OutOfMemory
        }
        vk::Result::ERROR_DEVICE_LOST => BackendError::DeviceLost,
        other => BackendError::Native(format!("{other:?}")),
    }
}

/// Convert a descriptor kind to a Vulkan descriptor type.
pub fn convert_descriptor_kind(kind: DescriptorKind) -> vk::DescriptorType {
    match kind {
        DescriptorKind::Sampler => vk::DescriptorType::SAMPLER,
        DescriptorKind::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        DescriptorKind::SampledImage => vk::DescriptorType::SAMPLED_IMAGE,
        DescriptorKind::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
        DescriptorKind::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        DescriptorKind::UniformBufferDynamic => vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
        DescriptorKind::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
        DescriptorKind::StorageBufferDynamic => vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
        DescriptorKind::InputAttachment => vk::DescriptorType::INPUT_ATTACHMENT,
    }
}

/// Image layout a descriptor of `kind` expects its image in.
pub fn descriptor_image_layout(kind: DescriptorKind) -> vk::ImageLayout {
    match kind {
        DescriptorKind::StorageImage => vk::ImageLayout::GENERAL,
        DescriptorKind::Sampler => vk::ImageLayout::UNDEFINED,
        _ => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    }
}

/// Convert stage visibility flags to Vulkan shader stage flags.
pub fn convert_shader_stage_flags(flags: ShaderStageFlags) -> vk::ShaderStageFlags {
    let mut result = vk::ShaderStageFlags::empty();
    if flags.contains(ShaderStageFlags::VERTEX) {
        result |= vk::ShaderStageFlags::VERTEX;
    }
    if flags.contains(ShaderStageFlags::FRAGMENT) {
        result |= vk::ShaderStageFlags::FRAGMENT;
    }
    if flags.contains(ShaderStageFlags::COMPUTE) {
        result |= vk::ShaderStageFlags::COMPUTE;
    }
    if flags.contains(ShaderStageFlags::GEOMETRY) {
        result |= vk::ShaderStageFlags::GEOMETRY;
    }
    result
}

/// Convert a single shader stage to its Vulkan stage bit.
pub fn convert_shader_stage(stage: ShaderStage) -> vk::ShaderStageFlags {
    convert_shader_stage_flags(stage.flag())
}

/// Convert BufferUsage flags to Vulkan buffer usage flags.
pub fn convert_buffer_usage(usage: BufferUsage) -> vk::BufferUsageFlags {
    let mut result = vk::BufferUsageFlags::empty();

    if usage.contains(BufferUsage::UNIFORM) {
        result |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    if usage.contains(BufferUsage::STORAGE) {
        result |= vk::BufferUsageFlags::STORAGE_BUFFER;
    }
    if usage.contains(BufferUsage::COPY_SRC) {
        result |= vk::BufferUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(BufferUsage::COPY_DST) {
        result |= vk::BufferUsageFlags::TRANSFER_DST;
    }

    result
}

/// Convert vertex attribute format to Vulkan format.
pub fn convert_vertex_format(format: VertexAttributeFormat) -> vk::Format {
    match format {
        VertexAttributeFormat::Float => vk::Format::R32_SFLOAT,
        VertexAttributeFormat::Float2 => vk::Format::R32G32_SFLOAT,
        VertexAttributeFormat::Float3 => vk::Format::R32G32B32_SFLOAT,
        VertexAttributeFormat::Float4 => vk::Format::R32G32B32A32_SFLOAT,
        VertexAttributeFormat::Int => vk::Format::R32_SINT,
        VertexAttributeFormat::Int2 => vk::Format::R32G32_SINT,
        VertexAttributeFormat::Int3 => vk::Format::R32G32B32_SINT,
        VertexAttributeFormat::Int4 => vk::Format::R32G32B32A32_SINT,
        VertexAttributeFormat::Uint => vk::Format::R32_UINT,
        VertexAttributeFormat::Uint2 => vk::Format::R32G32_UINT,
        VertexAttributeFormat::Uint3 => vk::Format::R32G32B32_UINT,
        VertexAttributeFormat::Uint4 => vk::Format::R32G32B32A32_UINT,
        VertexAttributeFormat::Unorm8x4 => vk::Format::R8G8B8A8_UNORM,
        VertexAttributeFormat::Snorm8x4 => vk::Format::R8G8B8A8_SNORM,
    }
}

/// Convert a vertex step mode to a Vulkan input rate.
pub fn convert_step_mode(mode: VertexStepMode) -> vk::VertexInputRate {
    match mode {
        VertexStepMode::Vertex => vk::VertexInputRate::VERTEX,
        VertexStepMode::Instance => vk::VertexInputRate::INSTANCE,
    }
}

/// Expand `offset..offset + size` to `atom`-aligned bounds.
///
/// Returns `(offset, size)` of the range to flush or invalidate. `atom` is the
/// device's `nonCoherentAtomSize`. When the aligned end would pass `limit`
/// the size is `vk::WHOLE_SIZE`, which covers the rest of the memory object.
pub fn atom_aligned_range(offset: u64, size: u64, atom: u64, limit: u64) -> (u64, u64) {
    let atom = atom.max(1);
    let start = offset - offset % atom;
    let end = (offset + size).div_ceil(atom) * atom;
    if end > limit {
        (start, vk::WHOLE_SIZE)
    } else {
        (start, end - start)
    }
}
