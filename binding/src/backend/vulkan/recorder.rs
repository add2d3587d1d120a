//! Command recording into a Vulkan command buffer.

use ash::vk;
use ash::vk::Handle;

use crate::backend::CommandRecorder;
use crate::reflection::ShaderStageFlags;
use crate::types::{DescriptorSetHandle, PipelineHandle, PipelineLayoutHandle};

use super::conversion::convert_shader_stage_flags;

/// Records binding commands into a command buffer in the recording state.
///
/// The caller owns the command buffer and its begin/end/submit lifecycle.
pub struct VulkanCommandRecorder<'a> {
    device: &'a ash::Device,
    command_buffer: vk::CommandBuffer,
    scratch: Vec<vk::DescriptorSet>,
}

impl<'a> VulkanCommandRecorder<'a> {
    /// Wrap a command buffer.
    pub fn new(device: &'a ash::Device, command_buffer: vk::CommandBuffer) -> Self {
        Self {
            device,
            command_buffer,
            scratch: Vec::new(),
        }
    }

    /// Get the wrapped command buffer.
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }
}

impl CommandRecorder for VulkanCommandRecorder<'_> {
    fn bind_pipeline(&mut self, pipeline: PipelineHandle) {
        unsafe {
            self.device.cmd_bind_pipeline(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                vk::Pipeline::from_raw(pipeline.raw()),
            );
        }
    }

    fn bind_descriptor_sets(
        &mut self,
        layout: PipelineLayoutHandle,
        first_set: u32,
        sets: &[DescriptorSetHandle],
        dynamic_offsets: &[u32],
    ) {
        self.scratch.clear();
        self.scratch
            .extend(sets.iter().map(|s| vk::DescriptorSet::from_raw(s.raw())));

        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                vk::PipelineLayout::from_raw(layout.raw()),
                first_set,
                &self.scratch,
                dynamic_offsets,
            );
        }
    }

    fn push_constants(
        &mut self,
        layout: PipelineLayoutHandle,
        stages: ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        unsafe {
            self.device.cmd_push_constants(
                self.command_buffer,
                vk::PipelineLayout::from_raw(layout.raw()),
                convert_shader_stage_flags(stages),
                offset,
                data,
            );
        }
    }
}
