//! Graphics pipeline construction.
//!
//! A [`GraphicsPipeline`] is built from a list of [`ShaderSource`]s and the
//! [`PipelineReflection`] aggregated from them. Construction acquires one
//! descriptor set layout per set index (unused indices get the empty layout),
//! acquires the pipeline layout from the device cache and creates the native
//! pipeline. The render pass token and vertex input are passed through to the
//! backend untouched.
//!
//! Layouts are owned by the device caches; the pipeline only owns the native
//! pipeline object and destroys it on drop.

use std::sync::Arc;

use crate::backend::PipelineDescriptor;
use crate::device::BindingDevice;
use crate::error::BindingError;
use crate::reflection::{PipelineReflection, ShaderStage, StageReflection};
use crate::types::{
    DescriptorSetLayoutHandle, PipelineHandle, PipelineLayoutHandle, RenderPassToken,
    VertexInputDescription,
};

/// One shader stage of a pipeline.
#[derive(Debug, Clone)]
pub struct ShaderSource {
    /// The shader stage.
    pub stage: ShaderStage,

    /// SPIR-V words.
    pub bytecode: Vec<u32>,

    /// Entry point function name.
    pub entry_point: String,

    /// Resources this stage declares.
    pub reflection: StageReflection,
}

impl ShaderSource {
    /// Create a shader source with an empty reflection.
    pub fn new(stage: ShaderStage, bytecode: impl Into<Vec<u32>>, entry_point: impl Into<String>) -> Self {
        Self {
            stage,
            bytecode: bytecode.into(),
            entry_point: entry_point.into(),
            reflection: StageReflection::new(stage),
        }
    }

    /// Create a vertex shader source.
    pub fn vertex(bytecode: impl Into<Vec<u32>>, entry_point: impl Into<String>) -> Self {
        Self::new(ShaderStage::Vertex, bytecode, entry_point)
    }

    /// Create a fragment shader source.
    pub fn fragment(bytecode: impl Into<Vec<u32>>, entry_point: impl Into<String>) -> Self {
        Self::new(ShaderStage::Fragment, bytecode, entry_point)
    }

    /// Create a compute shader source.
    pub fn compute(bytecode: impl Into<Vec<u32>>, entry_point: impl Into<String>) -> Self {
        Self::new(ShaderStage::Compute, bytecode, entry_point)
    }

    /// Create a shader source and reflect the resources its entry point uses.
    #[cfg(feature = "naga-reflection")]
    pub fn from_spirv(
        stage: ShaderStage,
        bytecode: impl Into<Vec<u32>>,
        entry_point: impl Into<String>,
    ) -> Result<Self, BindingError> {
        let bytecode = bytecode.into();
        let entry_point = entry_point.into();
        let reflection =
            crate::reflection::naga::reflect_spirv_words(&bytecode, stage, &entry_point)?;
        Ok(Self {
            stage,
            bytecode,
            entry_point,
            reflection,
        })
    }

    /// Replace the reflected resources of this stage.
    ///
    /// The reflection's stage is forced to match the source's stage.
    pub fn with_reflection(mut self, mut reflection: StageReflection) -> Self {
        reflection.stage = self.stage;
        self.reflection = reflection;
        self
    }
}

/// A native graphics pipeline and the layouts it was created with.
pub struct GraphicsPipeline {
    device: Arc<BindingDevice>,
    stages: Vec<ShaderSource>,
    reflection: PipelineReflection,
    set_layouts: Vec<DescriptorSetLayoutHandle>,
    layout: PipelineLayoutHandle,
    pipeline: PipelineHandle,
}

impl GraphicsPipeline {
    /// Build a pipeline from its stages and their aggregated reflection.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::CreationFailed`] if any layout or the native
    /// pipeline cannot be created. Nothing is leaked on failure: layouts
    /// already acquired remain in the device caches.
    pub fn new(
        device: Arc<BindingDevice>,
        stages: Vec<ShaderSource>,
        reflection: PipelineReflection,
        render_pass: RenderPassToken,
        vertex_input: &VertexInputDescription,
    ) -> Result<Self, BindingError> {
        Self::with_label(device, stages, reflection, render_pass, vertex_input, None)
    }

    /// Same as [`GraphicsPipeline::new`], with a debug label for the backend.
    pub fn with_label(
        device: Arc<BindingDevice>,
        stages: Vec<ShaderSource>,
        reflection: PipelineReflection,
        render_pass: RenderPassToken,
        vertex_input: &VertexInputDescription,
        label: Option<&str>,
    ) -> Result<Self, BindingError> {
        crate::profile_function!();

        if stages.is_empty() {
            return Err(BindingError::InvalidParameter(
                "a graphics pipeline needs at least one shader stage".to_string(),
            ));
        }

        let set_count = reflection.max_set_index().map_or(0, |max| max + 1);
        let mut set_layouts = Vec::with_capacity(set_count as usize);
        for index in 0..set_count {
            let layout = match reflection.set(index) {
                Some(description) => device.acquire_set_layout(description)?,
                None => device.acquire_empty_set_layout()?,
            };
            set_layouts.push(layout);
        }

        let layout = device.acquire_pipeline_layout(&set_layouts, &reflection.push_constants)?;

        let pipeline = device
            .backend()
            .create_graphics_pipeline(&PipelineDescriptor {
                label,
                layout,
                stages: &stages,
                render_pass,
                vertex_input,
            })
            .map_err(|e| {
                log::error!("Failed to create graphics pipeline {label:?}: {e}");
                BindingError::creation("graphics pipeline", e)
            })?;

        log::debug!(
            "Created graphics pipeline {:?} {:?} ({} stages, {} sets)",
            label,
            pipeline,
            stages.len(),
            set_layouts.len()
        );

        Ok(Self {
            device,
            stages,
            reflection,
            set_layouts,
            layout,
            pipeline,
        })
    }

    /// Get the native pipeline handle.
    pub fn pipeline(&self) -> PipelineHandle {
        self.pipeline
    }

    /// Get the pipeline layout handle.
    pub fn layout(&self) -> PipelineLayoutHandle {
        self.layout
    }

    /// Set layouts, indexed by set index.
    pub fn set_layouts(&self) -> &[DescriptorSetLayoutHandle] {
        &self.set_layouts
    }

    /// Layout of one set index, if the pipeline has that many sets.
    pub fn set_layout(&self, index: u32) -> Option<DescriptorSetLayoutHandle> {
        self.set_layouts.get(index as usize).copied()
    }

    /// The aggregated reflection the pipeline was built from.
    pub fn reflection(&self) -> &PipelineReflection {
        &self.reflection
    }

    /// The shader stages.
    pub fn stages(&self) -> &[ShaderSource] {
        &self.stages
    }

    /// Get the parent device.
    pub fn device(&self) -> &Arc<BindingDevice> {
        &self.device
    }
}

impl std::fmt::Debug for GraphicsPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsPipeline")
            .field("pipeline", &self.pipeline)
            .field("layout", &self.layout)
            .field("set_layouts", &self.set_layouts)
            .field("stage_count", &self.stages.len())
            .finish()
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        log::trace!("Destroying graphics pipeline {:?}", self.pipeline);
        self.device.backend().destroy_pipeline(self.pipeline);
    }
}

static_assertions::assert_impl_all!(GraphicsPipeline: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DummyBackend, GpuBackend};
    use crate::config::DeviceConfig;
    use crate::reflection::{
        DescriptorKind, MemberTree, ReflectedBinding, ReflectedPushConstant, aggregate,
    };

    fn device(backend: &Arc<DummyBackend>) -> Arc<BindingDevice> {
        BindingDevice::new(backend.clone() as Arc<dyn GpuBackend>, DeviceConfig::default()).unwrap()
    }

    fn stages() -> Vec<ShaderSource> {
        vec![
            ShaderSource::vertex(vec![0x0723_0203], "vs_main").with_reflection(
                StageReflection::new(ShaderStage::Vertex)
                    .with_binding(ReflectedBinding::uniform_block(
                        0,
                        0,
                        "Camera",
                        64,
                        vec![MemberTree::mat4("view_proj", 0)],
                    ))
                    .with_push_constant(ReflectedPushConstant::new(
                        "Push",
                        0,
                        64,
                        vec![MemberTree::mat4("model", 0)],
                    )),
            ),
            ShaderSource::fragment(vec![0x0723_0203], "fs_main").with_reflection(
                StageReflection::new(ShaderStage::Fragment)
                    .with_binding(ReflectedBinding::combined_image_sampler(2, 0, "shadow")),
            ),
        ]
    }

    #[test]
    fn test_shader_source_constructors() {
        let vs = ShaderSource::vertex(vec![1, 2, 3], "main");
        assert_eq!(vs.stage, ShaderStage::Vertex);
        assert_eq!(vs.reflection.stage, ShaderStage::Vertex);
        assert_eq!(vs.entry_point, "main");

        let fs = ShaderSource::fragment(Vec::new(), "main")
            .with_reflection(StageReflection::new(ShaderStage::Vertex));
        assert_eq!(fs.reflection.stage, ShaderStage::Fragment);
    }

    #[test]
    fn test_pipeline_fills_set_gaps() {
        let backend = Arc::new(DummyBackend::new());
        let device = device(&backend);
        let stages = stages();
        let reflection = aggregate(stages.iter().map(|s| &s.reflection)).unwrap();

        let pipeline = GraphicsPipeline::new(
            device.clone(),
            stages,
            reflection,
            RenderPassToken::new(1, 0),
            &VertexInputDescription::new(),
        )
        .unwrap();

        assert_eq!(pipeline.set_layouts().len(), 3);
        let empty = backend.set_layout_bindings(pipeline.set_layouts()[1]).unwrap();
        assert!(empty.is_empty());

        let shadow = backend.set_layout_bindings(pipeline.set_layouts()[2]).unwrap();
        assert_eq!(shadow[0].kind, DescriptorKind::CombinedImageSampler);

        let (sets, push) = backend.pipeline_layout_info(pipeline.layout()).unwrap();
        assert_eq!(sets, pipeline.set_layouts());
        assert_eq!(push.len(), 1);
        assert_eq!(push[0].size, 64);
        assert_eq!(backend.stats().pipelines_created, 1);
    }

    #[test]
    fn test_pipelines_share_layouts() {
        let backend = Arc::new(DummyBackend::new());
        let device = device(&backend);

        let build = || {
            let stages = stages();
            let reflection = aggregate(stages.iter().map(|s| &s.reflection)).unwrap();
            GraphicsPipeline::new(
                device.clone(),
                stages,
                reflection,
                RenderPassToken::new(1, 0),
                &VertexInputDescription::new(),
            )
            .unwrap()
        };

        let a = build();
        let b = build();
        assert_ne!(a.pipeline(), b.pipeline());
        assert_eq!(a.layout(), b.layout());
        assert_eq!(backend.stats().set_layouts_created, 3);
        assert_eq!(backend.stats().pipeline_layouts_created, 1);
    }

    #[test]
    fn test_pipeline_destroyed_on_drop() {
        let backend = Arc::new(DummyBackend::new());
        let device = device(&backend);
        let stages = stages();
        let reflection = aggregate(stages.iter().map(|s| &s.reflection)).unwrap();

        let pipeline = GraphicsPipeline::new(
            device,
            stages,
            reflection,
            RenderPassToken::new(1, 0),
            &VertexInputDescription::new(),
        )
        .unwrap();
        drop(pipeline);

        let stats = backend.stats();
        assert_eq!(stats.pipelines_destroyed, 1);
        // Layouts live with the device, which is gone too.
        assert_eq!(stats.set_layouts_destroyed, 3);
        assert_eq!(stats.pipeline_layouts_destroyed, 1);
    }

    #[test]
    fn test_pipeline_creation_failure_is_fatal() {
        let backend = Arc::new(DummyBackend::new());
        let device = device(&backend);
        backend.set_creation_failure(true);

        let stages = stages();
        let reflection = aggregate(stages.iter().map(|s| &s.reflection)).unwrap();
        let result = GraphicsPipeline::new(
            device,
            stages,
            reflection,
            RenderPassToken::new(1, 0),
            &VertexInputDescription::new(),
        );
        assert!(matches!(result, Err(BindingError::CreationFailed(_))));
    }

    #[test]
    fn test_pipeline_requires_stages() {
        let backend = Arc::new(DummyBackend::new());
        let result = GraphicsPipeline::new(
            device(&backend),
            Vec::new(),
            PipelineReflection::default(),
            RenderPassToken::new(1, 0),
            &VertexInputDescription::new(),
        );
        assert!(matches!(result, Err(BindingError::InvalidParameter(_))));
    }
}
