//! Binding device.
//!
//! The [`BindingDevice`] owns the backend, the descriptor set layout cache and
//! the pipeline layout cache. Pipelines and materials are created through it
//! and hold a strong reference to it, so the caches outlive every object that
//! uses their handles.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::GpuBackend;
use crate::cache::{DescriptorSetLayoutCache, PipelineLayoutCache};
use crate::config::DeviceConfig;
use crate::error::BindingError;
use crate::materials::{Material, MaterialDescriptor};
use crate::pipeline::{GraphicsPipeline, ShaderSource};
use crate::reflection::{DescriptorSetDescription, PushConstantRange, aggregate};
use crate::types::{
    DescriptorSetLayoutHandle, PipelineLayoutHandle, RenderPassToken, VertexInputDescription,
};

/// Entry point for building pipelines and materials on one backend.
///
/// # Thread Safety
///
/// `BindingDevice` is `Send + Sync`. Each cache sits behind its own mutex, so
/// pipelines may be built from several threads; lookups are serialized per
/// cache.
///
/// # Example
///
/// ```ignore
/// let device = BindingDevice::new(backend, DeviceConfig::default())?;
///
/// let material = device.create_material(
///     MaterialDescriptor::new()
///         .with_shader(vertex)
///         .with_shader(fragment)
///         .with_render_pass(RenderPassToken::new(render_pass, 0))
///         .with_label("pbr"),
/// )?;
/// ```
pub struct BindingDevice {
    backend: Arc<dyn GpuBackend>,
    config: DeviceConfig,
    // Dropped before the set layouts they reference.
    pipeline_layouts: Mutex<PipelineLayoutCache>,
    set_layouts: Mutex<DescriptorSetLayoutCache>,
}

impl BindingDevice {
    /// Create a device over `backend`.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::InvalidParameter`] if `config` is invalid.
    pub fn new(backend: Arc<dyn GpuBackend>, config: DeviceConfig) -> Result<Arc<Self>, BindingError> {
        config.validate()?;

        log::info!(
            "Creating binding device on {} backend ({} frames in flight, material set {})",
            backend.name(),
            config.frames_in_flight,
            config.material_set_index
        );

        Ok(Arc::new(Self {
            pipeline_layouts: Mutex::new(PipelineLayoutCache::new(Arc::clone(&backend))),
            set_layouts: Mutex::new(DescriptorSetLayoutCache::new(Arc::clone(&backend))),
            backend,
            config,
        }))
    }

    /// Get the backend.
    pub fn backend(&self) -> &Arc<dyn GpuBackend> {
        &self.backend
    }

    /// Get the device configuration.
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Get or create the layout for a descriptor set.
    pub fn acquire_set_layout(
        &self,
        description: &DescriptorSetDescription,
    ) -> Result<DescriptorSetLayoutHandle, BindingError> {
        self.set_layouts.lock().acquire_description(description)
    }

    /// Get or create the layout with no bindings.
    pub fn acquire_empty_set_layout(&self) -> Result<DescriptorSetLayoutHandle, BindingError> {
        self.set_layouts.lock().acquire_empty()
    }

    /// Get or create a pipeline layout.
    pub fn acquire_pipeline_layout(
        &self,
        set_layouts: &[DescriptorSetLayoutHandle],
        push_constants: &[PushConstantRange],
    ) -> Result<PipelineLayoutHandle, BindingError> {
        self.pipeline_layouts
            .lock()
            .acquire(set_layouts, push_constants)
    }

    /// Number of distinct descriptor set layouts created so far.
    pub fn set_layout_count(&self) -> usize {
        self.set_layouts.lock().len()
    }

    /// Number of distinct pipeline layouts created so far.
    pub fn pipeline_layout_count(&self) -> usize {
        self.pipeline_layouts.lock().len()
    }

    /// Build a graphics pipeline, aggregating the stages' reflection.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::ReflectionConflict`] if two stages disagree on
    /// a binding, or [`BindingError::CreationFailed`] if a native object
    /// cannot be created.
    pub fn create_pipeline(
        self: &Arc<Self>,
        stages: Vec<ShaderSource>,
        render_pass: RenderPassToken,
        vertex_input: &VertexInputDescription,
    ) -> Result<GraphicsPipeline, BindingError> {
        let reflection = aggregate(stages.iter().map(|s| &s.reflection))?;
        GraphicsPipeline::new(
            Arc::clone(self),
            stages,
            reflection,
            render_pass,
            vertex_input,
        )
    }

    /// Create a material.
    ///
    /// # Errors
    ///
    /// Any fatal error during reflection or native creation aborts the
    /// material; nothing partially built is returned.
    pub fn create_material(
        self: &Arc<Self>,
        descriptor: MaterialDescriptor,
    ) -> Result<Arc<Material>, BindingError> {
        log::trace!("Creating material: {:?}", descriptor.label);
        let material = Material::new(Arc::clone(self), descriptor)?;
        Ok(Arc::new(material))
    }
}

impl std::fmt::Debug for BindingDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingDevice")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .field("set_layouts", &self.set_layout_count())
            .field("pipeline_layouts", &self.pipeline_layout_count())
            .finish()
    }
}

impl Drop for BindingDevice {
    fn drop(&mut self) {
        log::debug!(
            "Destroying binding device: {} set layouts, {} pipeline layouts",
            self.set_layouts.get_mut().len(),
            self.pipeline_layouts.get_mut().len()
        );
    }
}

static_assertions::assert_impl_all!(BindingDevice: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use crate::reflection::{BindingSlot, DescriptorKind, ShaderStageFlags};

    fn backend() -> Arc<DummyBackend> {
        Arc::new(DummyBackend::new())
    }

    #[test]
    fn test_device_rejects_invalid_config() {
        let result = BindingDevice::new(
            backend() as Arc<dyn GpuBackend>,
            DeviceConfig::default().with_frames_in_flight(0),
        );
        assert!(matches!(result, Err(BindingError::InvalidParameter(_))));
    }

    #[test]
    fn test_device_shares_set_layouts() {
        let backend = backend();
        let device =
            BindingDevice::new(backend.clone() as Arc<dyn GpuBackend>, DeviceConfig::default())
                .unwrap();

        let description = DescriptorSetDescription::from_bindings(
            1,
            vec![
                BindingSlot::new(1, 1, DescriptorKind::CombinedImageSampler)
                    .with_stages(ShaderStageFlags::FRAGMENT),
                BindingSlot::new(1, 0, DescriptorKind::UniformBufferDynamic)
                    .with_stages(ShaderStageFlags::FRAGMENT),
            ],
        );

        let a = device.acquire_set_layout(&description).unwrap();
        let b = device.acquire_set_layout(&description).unwrap();
        let empty = device.acquire_empty_set_layout().unwrap();
        assert_eq!(a, b);
        assert_ne!(a, empty);
        assert_eq!(device.set_layout_count(), 2);

        let layout = device.acquire_pipeline_layout(&[empty, a], &[]).unwrap();
        assert_eq!(
            device.acquire_pipeline_layout(&[empty, a], &[]).unwrap(),
            layout
        );
        assert_eq!(device.pipeline_layout_count(), 1);
    }

    #[test]
    fn test_device_drop_destroys_cached_layouts() {
        let backend = backend();
        let device =
            BindingDevice::new(backend.clone() as Arc<dyn GpuBackend>, DeviceConfig::default())
                .unwrap();
        let empty = device.acquire_empty_set_layout().unwrap();
        device.acquire_pipeline_layout(&[empty], &[]).unwrap();
        drop(device);

        let stats = backend.stats();
        assert_eq!(stats.set_layouts_destroyed, 1);
        assert_eq!(stats.pipeline_layouts_destroyed, 1);
    }
}
