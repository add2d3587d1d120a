//! # RedLilium Binding
//!
//! Resource binding and pipeline caching core for the RedLilium renderer.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`reflection`] - Merging per-stage shader reflection into per-set binding descriptions
//! - [`DescriptorSetLayoutCache`] / [`PipelineLayoutCache`] - Deduplicated native layouts
//! - [`DescriptorPoolAllocator`] - Growable descriptor pools with set reuse
//! - [`Material`] / [`MaterialInstance`] - Named uniform and texture parameters
//!   over per-frame-slot descriptor sets and dynamic uniform buffers
//! - Multiple backend support: Vulkan and Dummy (for testing)
//!
//! ## Example
//!
//! ```ignore
//! use redlilium_binding::{BindingDevice, DeviceConfig, FrameContext, MaterialDescriptor};
//!
//! let device = BindingDevice::new(backend, DeviceConfig::default())?;
//! let material = device.create_material(
//!     MaterialDescriptor::new()
//!         .with_shader(vertex)
//!         .with_shader(fragment)
//!         .with_render_pass(render_pass),
//! )?;
//!
//! let mut instance = material.create_instance()?;
//! instance.set_vec4("Material.base_color", [1.0, 0.0, 0.0, 1.0]);
//!
//! // Every frame, after the slot's fence has signaled:
//! instance.update_uniforms();
//! instance.bind(&mut FrameContext::new(slot, &mut recorder));
//! ```

pub mod backend;
pub mod cache;
pub mod config;
pub mod device;
pub mod error;
pub mod materials;
pub mod pipeline;
pub mod pool;
pub mod profiling;
pub mod reflection;
pub mod types;

// Re-export main types for convenience
pub use backend::{BackendError, CommandRecorder, DummyBackend, GpuBackend};
pub use cache::{DescriptorSetLayoutCache, PipelineLayoutCache};
pub use config::{DescriptorPoolConfig, DeviceConfig};
pub use device::BindingDevice;
pub use error::BindingError;
pub use materials::{
    FrameContext, Material, MaterialDescriptor, MaterialInstance, OuterSet, UniformMember,
};
pub use pipeline::{GraphicsPipeline, ShaderSource};
pub use pool::DescriptorPoolAllocator;
pub use reflection::{
    DescriptorKind, PipelineReflection, ShaderStage, ShaderStageFlags, StageReflection,
};
pub use types::{
    BufferHandle, DescriptorSetHandle, DescriptorSetLayoutHandle, ImageViewHandle,
    PipelineHandle, PipelineLayoutHandle, RenderPassToken, SamplerHandle, VertexInputDescription,
};

/// Binding library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the binding subsystem.
///
/// Only logs the version; there is no global state to set up.
pub fn init() {
    log::info!("RedLilium Binding v{} initialized", VERSION);
}
