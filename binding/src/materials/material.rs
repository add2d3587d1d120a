//! Material definition.
//!
//! A [`Material`] owns the graphics pipeline, knows which descriptor set index
//! belongs to materials, and maps uniform member names and sampler names to
//! their bindings. It also owns the descriptor pool allocator its instances
//! allocate their sets from.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::device::BindingDevice;
use crate::error::BindingError;
use crate::pipeline::{GraphicsPipeline, ShaderSource};
use crate::pool::DescriptorPoolAllocator;
use crate::reflection::{DescriptorKind, NumericShape, PipelineReflection, aggregate};
use crate::types::{DescriptorSetLayoutHandle, RenderPassToken, VertexInputDescription};

use super::instance::MaterialInstance;

/// Round `size` up to a multiple of `alignment`.
///
/// A zero-sized block still occupies one aligned unit.
pub fn aligned_block_size(size: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return size;
    }
    size.div_ceil(alignment).max(1) * alignment
}

/// Descriptor for creating a material.
#[derive(Debug, Clone, Default)]
pub struct MaterialDescriptor {
    /// Shaders used by this material.
    pub shaders: Vec<ShaderSource>,

    /// Vertex input passed through to pipeline creation.
    pub vertex_input: VertexInputDescription,

    /// Render pass and subpass the material draws in.
    pub render_pass: RenderPassToken,

    /// Set index owned by the material. Falls back to the device default.
    pub material_set_index: Option<u32>,

    /// Optional label for debugging.
    pub label: Option<String>,
}

impl MaterialDescriptor {
    /// Create a new material descriptor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a shader to the material.
    pub fn with_shader(mut self, shader: ShaderSource) -> Self {
        self.shaders.push(shader);
        self
    }

    /// Set the vertex input description.
    pub fn with_vertex_input(mut self, vertex_input: VertexInputDescription) -> Self {
        self.vertex_input = vertex_input;
        self
    }

    /// Set the render pass token.
    pub fn with_render_pass(mut self, render_pass: RenderPassToken) -> Self {
        self.render_pass = render_pass;
        self
    }

    /// Override the descriptor set index owned by the material.
    pub fn with_material_set_index(mut self, index: u32) -> Self {
        self.material_set_index = Some(index);
        self
    }

    /// Set a debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Location of a named uniform member inside the material set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformMember {
    /// Binding index of the enclosing uniform block.
    pub binding: u32,
    /// Byte offset within the block.
    pub offset: u32,
    /// Byte size.
    pub size: u32,
    /// Numeric shape.
    pub shape: NumericShape,
}

/// One dynamic uniform buffer binding of the material set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct UniformBlock {
    pub binding: u32,
    /// Reflected block size.
    pub size: u64,
    /// Size rounded up to the dynamic offset alignment; stride between slots.
    pub stride: u64,
}

impl UniformBlock {
    /// Range of the descriptor write. Empty blocks cover one aligned unit.
    pub fn descriptor_range(&self) -> u64 {
        if self.size == 0 { self.stride } else { self.size }
    }
}

/// One image or sampler binding of the material set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ImageBinding {
    pub binding: u32,
    pub kind: DescriptorKind,
    pub count: u32,
}

/// A material defines the pipeline and parameter layout for rendering.
///
/// Materials are created by [`BindingDevice::create_material`] and hold a
/// strong reference to their parent device. Instances borrow the material,
/// so a material cannot be dropped while one of its instances is alive.
///
/// # Example
///
/// ```ignore
/// let material = device.create_material(
///     MaterialDescriptor::new()
///         .with_shader(ShaderSource::vertex(vs_words, "main").with_reflection(vs))
///         .with_shader(ShaderSource::fragment(fs_words, "main").with_reflection(fs))
///         .with_render_pass(RenderPassToken::new(render_pass, 0))
///         .with_label("pbr_material"),
/// )?;
///
/// let mut instance = material.create_instance()?;
/// instance.set_vec3("Material.base_color", [1.0, 0.5, 0.2]);
/// ```
pub struct Material {
    device: Arc<BindingDevice>,
    label: Option<String>,
    material_set_index: u32,
    material_layout: Option<DescriptorSetLayoutHandle>,
    uniforms: HashMap<String, UniformMember>,
    samplers: HashMap<String, u32>,
    blocks: Vec<UniformBlock>,
    images: Vec<ImageBinding>,
    binding_span: usize,
    allocator: Mutex<DescriptorPoolAllocator>,
    pipeline: GraphicsPipeline,
}

impl Material {
    /// Build a material from its descriptor.
    ///
    /// Aggregates the stages' reflection, turns every uniform buffer of the
    /// material set into a dynamic uniform buffer, and creates the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::ReflectionConflict`] or
    /// [`BindingError::CreationFailed`]. Returns
    /// [`BindingError::InvalidParameter`] if two material-set blocks declare
    /// the same uniform name or a material-set block is an array. Nothing is
    /// kept on failure.
    pub fn new(
        device: Arc<BindingDevice>,
        descriptor: MaterialDescriptor,
    ) -> Result<Self, BindingError> {
        crate::profile_function!();

        let MaterialDescriptor {
            shaders,
            vertex_input,
            render_pass,
            material_set_index,
            label,
        } = descriptor;
        let material_set_index =
            material_set_index.unwrap_or(device.config().material_set_index);

        let mut reflection = aggregate(shaders.iter().map(|s| &s.reflection))?;
        promote_uniform_buffers(&mut reflection, material_set_index);

        let pipeline = GraphicsPipeline::with_label(
            Arc::clone(&device),
            shaders,
            reflection,
            render_pass,
            &vertex_input,
            label.as_deref(),
        )?;

        let alignment = device.backend().min_uniform_buffer_offset_alignment();
        let mut uniforms = HashMap::new();
        let mut samplers = HashMap::new();
        let mut blocks = Vec::new();
        let mut images = Vec::new();
        let mut binding_span = 0;

        if let Some(set) = pipeline.reflection().set(material_set_index) {
            for slot in set.bindings() {
                binding_span = binding_span.max(slot.binding as usize + 1);

                if slot.kind == DescriptorKind::UniformBufferDynamic {
                    if slot.count > 1 {
                        return Err(BindingError::InvalidParameter(format!(
                            "material uniform block {:?} at binding {} is an array of {}; \
                             only single blocks can be dynamic",
                            slot.name, slot.binding, slot.count
                        )));
                    }
                    blocks.push(UniformBlock {
                        binding: slot.binding,
                        size: u64::from(slot.size),
                        stride: aligned_block_size(u64::from(slot.size), alignment),
                    });
                    for (name, member) in &slot.members {
                        let previous = uniforms.insert(
                            name.clone(),
                            UniformMember {
                                binding: slot.binding,
                                offset: member.offset,
                                size: member.size,
                                shape: member.shape,
                            },
                        );
                        if let Some(previous) = previous {
                            return Err(BindingError::InvalidParameter(format!(
                                "uniform {name:?} is declared by bindings {} and {}",
                                previous.binding, slot.binding
                            )));
                        }
                    }
                } else if slot.kind.is_image() {
                    images.push(ImageBinding {
                        binding: slot.binding,
                        kind: slot.kind,
                        count: slot.count,
                    });
                    samplers.insert(slot.name.clone(), slot.binding);
                } else {
                    log::debug!(
                        "Material {:?}: binding {} ({:?}) is not parameterizable",
                        label,
                        slot.binding,
                        slot.kind
                    );
                }
            }
        } else {
            log::warn!(
                "Material {:?} declares no bindings in set {}",
                label,
                material_set_index
            );
        }

        let material_layout = pipeline
            .reflection()
            .set(material_set_index)
            .and_then(|_| pipeline.set_layout(material_set_index));
        let allocator = DescriptorPoolAllocator::new(
            Arc::clone(device.backend()),
            device.config().pool.clone(),
        );

        log::debug!(
            "Created material {:?}: {} uniform members in {} blocks, {} samplers",
            label,
            uniforms.len(),
            blocks.len(),
            samplers.len()
        );

        Ok(Self {
            device,
            label,
            material_set_index,
            material_layout,
            uniforms,
            samplers,
            blocks,
            images,
            binding_span,
            allocator: Mutex::new(allocator),
            pipeline,
        })
    }

    /// Create an instance with its own per-frame-slot sets and buffers.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::CreationFailed`] if a buffer or descriptor set
    /// cannot be created. Anything created before the failure is released.
    pub fn create_instance(&self) -> Result<MaterialInstance<'_>, BindingError> {
        MaterialInstance::new(self)
    }

    /// Uniform members of the material set, by dotted name.
    pub fn uniforms(&self) -> &HashMap<String, UniformMember> {
        &self.uniforms
    }

    /// Image and sampler bindings of the material set, by name.
    pub fn samplers(&self) -> &HashMap<String, u32> {
        &self.samplers
    }

    /// Get the graphics pipeline.
    pub fn pipeline(&self) -> &GraphicsPipeline {
        &self.pipeline
    }

    /// Descriptor set index owned by the material.
    pub fn material_set_index(&self) -> u32 {
        self.material_set_index
    }

    /// Layout of the material set, if the pipeline has one.
    pub fn material_layout(&self) -> Option<DescriptorSetLayoutHandle> {
        self.material_layout
    }

    /// Aligned per-slot size of the uniform block at `binding`.
    pub fn block_stride(&self, binding: u32) -> Option<u64> {
        self.block(binding).map(|b| b.stride)
    }

    /// Get the material label, if set.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Get the parent device.
    pub fn device(&self) -> &Arc<BindingDevice> {
        &self.device
    }

    /// Number of descriptor pools the material's allocator owns.
    pub fn descriptor_pool_count(&self) -> usize {
        self.allocator.lock().pool_count()
    }

    /// Reset every descriptor pool of the material.
    ///
    /// Requires exclusive access, so no instance can be alive.
    pub fn reset_descriptor_pools(&mut self) -> Result<(), BindingError> {
        self.allocator.get_mut().reset_pools()
    }

    pub(crate) fn blocks(&self) -> &[UniformBlock] {
        &self.blocks
    }

    pub(crate) fn block(&self, binding: u32) -> Option<&UniformBlock> {
        self.blocks.iter().find(|b| b.binding == binding)
    }

    pub(crate) fn image(&self, binding: u32) -> Option<&ImageBinding> {
        self.images.iter().find(|i| i.binding == binding)
    }

    pub(crate) fn binding_span(&self) -> usize {
        self.binding_span
    }

    pub(crate) fn allocator(&self) -> &Mutex<DescriptorPoolAllocator> {
        &self.allocator
    }
}

/// Turn the uniform buffers of the material set into dynamic uniform buffers.
fn promote_uniform_buffers(reflection: &mut PipelineReflection, set_index: u32) {
    let Some(set) = reflection.set_mut(set_index) else {
        return;
    };
    for slot in set.bindings_mut() {
        if slot.kind == DescriptorKind::UniformBuffer {
            slot.kind = DescriptorKind::UniformBufferDynamic;
        }
    }
}

impl std::fmt::Debug for Material {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Material")
            .field("label", &self.label)
            .field("material_set_index", &self.material_set_index)
            .field("uniform_count", &self.uniforms.len())
            .field("sampler_count", &self.samplers.len())
            .field("pipeline", &self.pipeline.pipeline())
            .finish()
    }
}

// Ensure Material is Send + Sync
static_assertions::assert_impl_all!(Material: Send, Sync);
