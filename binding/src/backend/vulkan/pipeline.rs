//! Vulkan graphics pipeline creation.

use std::ffi::CString;

use ash::vk;
use ash::vk::Handle;

use crate::backend::{BackendError, PipelineDescriptor};

use super::conversion::{
    convert_result, convert_shader_stage, convert_step_mode, convert_vertex_format,
};

/// Create a shader module from SPIR-V words.
fn create_shader_module(
    device: &ash::Device,
    code: &[u32],
) -> Result<vk::ShaderModule, BackendError> {
    let create_info = vk::ShaderModuleCreateInfo::default().code(code);
    unsafe { device.create_shader_module(&create_info, None) }.map_err(convert_result)
}

/// Create a graphics pipeline for a subpass of a caller-owned render pass.
///
/// Viewport and scissor are dynamic. Rasterization uses fill mode with no
/// culling, and every color attachment writes RGBA without blending.
pub fn create_graphics_pipeline(
    device: &ash::Device,
    descriptor: &PipelineDescriptor<'_>,
) -> Result<vk::Pipeline, BackendError> {
    let entry_points = descriptor
        .stages
        .iter()
        .map(|stage| {
            CString::new(stage.entry_point.as_str()).map_err(|e| {
                BackendError::Native(format!(
                    "Invalid entry point name (contains null byte): {e}"
                ))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut modules = Vec::with_capacity(descriptor.stages.len());
    for stage in descriptor.stages {
        match create_shader_module(device, &stage.bytecode) {
            Ok(module) => modules.push(module),
            Err(e) => {
                destroy_modules(device, &modules);
                return Err(e);
            }
        }
    }

    let shader_stages: Vec<vk::PipelineShaderStageCreateInfo> = descriptor
        .stages
        .iter()
        .zip(&modules)
        .zip(&entry_points)
        .map(|((stage, module), entry)| {
            vk::PipelineShaderStageCreateInfo::default()
                .stage(convert_shader_stage(stage.stage))
                .module(*module)
                .name(entry)
        })
        .collect();

    let vertex_input = descriptor.vertex_input;

    let binding_descriptions: Vec<vk::VertexInputBindingDescription> = vertex_input
        .buffers
        .iter()
        .map(|buffer| {
            vk::VertexInputBindingDescription::default()
                .binding(buffer.binding)
                .stride(buffer.stride)
                .input_rate(convert_step_mode(buffer.step_mode))
        })
        .collect();

    let attribute_descriptions: Vec<vk::VertexInputAttributeDescription> = vertex_input
        .attributes
        .iter()
        .map(|attr| {
            vk::VertexInputAttributeDescription::default()
                .location(attr.location)
                .binding(attr.binding)
                .format(convert_vertex_format(attr.format))
                .offset(attr.offset)
        })
        .collect();

    let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&binding_descriptions)
        .vertex_attribute_descriptions(&attribute_descriptions);

    let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false);

    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);

    let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::NONE)
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
        .depth_bias_enable(false);

    let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    let depth_test = descriptor.render_pass.depth_test;
    let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(depth_test)
        .depth_write_enable(depth_test)
        .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL)
        .depth_bounds_test_enable(false)
        .stencil_test_enable(false);

    let color_blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = (0..descriptor
        .render_pass
        .color_attachment_count)
        .map(|_| {
            vk::PipelineColorBlendAttachmentState::default()
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .blend_enable(false)
        })
        .collect();

    let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .attachments(&color_blend_attachments);

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state =
        vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&shader_stages)
        .vertex_input_state(&vertex_input_state)
        .input_assembly_state(&input_assembly_state)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization_state)
        .multisample_state(&multisample_state)
        .depth_stencil_state(&depth_stencil_state)
        .color_blend_state(&color_blend_state)
        .dynamic_state(&dynamic_state)
        .layout(vk::PipelineLayout::from_raw(descriptor.layout.raw()))
        .render_pass(vk::RenderPass::from_raw(descriptor.render_pass.render_pass))
        .subpass(descriptor.render_pass.subpass);

    let result = unsafe {
        device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
    };

    // Modules are only needed during pipeline creation.
    destroy_modules(device, &modules);

    let pipelines = result.map_err(|(_, e)| convert_result(e))?;
    pipelines
        .into_iter()
        .next()
        .ok_or_else(|| BackendError::Native("No pipeline returned".to_string()))
}

fn destroy_modules(device: &ash::Device, modules: &[vk::ShaderModule]) {
    for module in modules {
        unsafe { device.destroy_shader_module(*module, None) };
    }
}
