//! Material instance with per-frame-slot parameter storage.
//!
//! A [`MaterialInstance`] owns one descriptor set per frame slot and one
//! dynamic uniform buffer per uniform block, sized for every slot. Multiple
//! instances can share the same [`Material`].

use fixedbitset::FixedBitSet;

use crate::backend::{BindingData, CommandRecorder, DescriptorCopy, DescriptorWrite};
use crate::error::BindingError;
use crate::reflection::DescriptorKind;
use crate::types::{
    BufferDescriptor, BufferHandle, BufferUsage, DescriptorSetHandle, ImageViewHandle,
    SamplerHandle,
};

use super::material::Material;

/// A descriptor set owned by the caller, bound alongside the material set.
///
/// Typically the per-frame set (index 0) or per-draw set (index 2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OuterSet {
    /// Set index the set is bound at.
    pub set_index: u32,
    /// The descriptor set.
    pub set: DescriptorSetHandle,
    /// Dynamic offsets of the set, in binding order.
    pub dynamic_offsets: Vec<u32>,
}

impl OuterSet {
    /// An outer set without dynamic bindings.
    pub fn new(set_index: u32, set: DescriptorSetHandle) -> Self {
        Self {
            set_index,
            set,
            dynamic_offsets: Vec::new(),
        }
    }

    /// Set the dynamic offsets.
    pub fn with_dynamic_offsets(mut self, offsets: Vec<u32>) -> Self {
        self.dynamic_offsets = offsets;
        self
    }
}

/// Per-draw state handed to [`MaterialInstance::bind`].
pub struct FrameContext<'a> {
    /// Frame slot being recorded.
    pub slot_index: u32,
    /// Receives the bind commands.
    pub recorder: &'a mut dyn CommandRecorder,
    /// Caller-owned set bound together with the material set.
    pub outer: Option<OuterSet>,
}

impl<'a> FrameContext<'a> {
    /// Create a context for `slot_index` recording into `recorder`.
    pub fn new(slot_index: u32, recorder: &'a mut dyn CommandRecorder) -> Self {
        Self {
            slot_index,
            recorder,
            outer: None,
        }
    }

    /// Bind `outer` together with the material set.
    pub fn with_outer_set(mut self, outer: OuterSet) -> Self {
        self.outer = Some(outer);
        self
    }
}

impl std::fmt::Debug for FrameContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameContext")
            .field("slot_index", &self.slot_index)
            .field("outer", &self.outer)
            .finish()
    }
}

#[derive(Debug)]
struct FrameSlot {
    set: Option<DescriptorSetHandle>,
    /// Bindings whose value must be copied in from the previous slot.
    dirty: FixedBitSet,
    /// Offset of this slot in every uniform block, in block order.
    dynamic_offsets: Vec<u32>,
}

/// Parameter values of one object drawn with a [`Material`].
///
/// Writes go to the current frame slot only. Every other slot is marked dirty
/// for the written binding and picks the value up in
/// [`update_uniforms`](Self::update_uniforms) once it becomes current, so a
/// value set once reaches every slot within `N - 1` frames.
///
/// Per frame, the caller must:
///
/// 1. wait until the GPU is done with the current slot
/// 2. call [`update_uniforms`](Self::update_uniforms)
/// 3. call setters as needed
/// 4. call [`bind`](Self::bind), which advances to the next slot
pub struct MaterialInstance<'m> {
    material: &'m Material,
    slots: Vec<FrameSlot>,
    /// One buffer per uniform block, in the order of `Material::blocks`.
    buffers: Vec<BufferHandle>,
    current: usize,
}

impl<'m> MaterialInstance<'m> {
    pub(crate) fn new(material: &'m Material) -> Result<Self, BindingError> {
        crate::profile_function!();

        let backend = material.device().backend();
        let frames = material.device().config().frames_in_flight as usize;

        let mut slot_offsets = vec![Vec::with_capacity(material.blocks().len()); frames];
        for block in material.blocks() {
            for (slot, offsets) in slot_offsets.iter_mut().enumerate() {
                let offset = u32::try_from(block.stride * slot as u64).map_err(|_| {
                    BindingError::CreationFailed(format!(
                        "dynamic offset of binding {} in frame slot {} exceeds u32 \
                         (stride {} bytes)",
                        block.binding, slot, block.stride
                    ))
                })?;
                offsets.push(offset);
            }
        }

        // Partially built instances release what they hold on drop.
        let mut instance = Self {
            material,
            slots: Vec::with_capacity(frames),
            buffers: Vec::with_capacity(material.blocks().len()),
            current: 0,
        };

        for block in material.blocks() {
            let descriptor = BufferDescriptor::new(
                block.stride * frames as u64,
                BufferUsage::UNIFORM | BufferUsage::COPY_SRC | BufferUsage::COPY_DST,
            )
            .with_label(format!(
                "{} uniforms (binding {})",
                material.label().unwrap_or("material"),
                block.binding
            ));
            let buffer = backend.create_buffer(&descriptor).map_err(|e| {
                log::error!("Failed to create material uniform buffer: {e}");
                BindingError::creation("material uniform buffer", e)
            })?;
            instance.buffers.push(buffer);
        }

        let mut writes = Vec::with_capacity(frames * material.blocks().len());
        for dynamic_offsets in slot_offsets {
            let set = match material.material_layout() {
                Some(layout) => Some(material.allocator().lock().allocate(layout)?),
                None => None,
            };
            instance.slots.push(FrameSlot {
                set,
                dirty: FixedBitSet::with_capacity(material.binding_span()),
                dynamic_offsets,
            });

            let Some(set) = set else { continue };
            for (block, &buffer) in material.blocks().iter().zip(&instance.buffers) {
                writes.push(DescriptorWrite {
                    set,
                    binding: block.binding,
                    array_element: 0,
                    kind: DescriptorKind::UniformBufferDynamic,
                    data: BindingData::Buffer {
                        buffer,
                        offset: 0,
                        range: block.descriptor_range(),
                    },
                });
            }
        }

        if !writes.is_empty() {
            backend.update_descriptor_sets(&writes, &[]);
        }

        log::trace!(
            "Created instance of material {:?} with {} frame slots",
            material.label(),
            frames
        );
        Ok(instance)
    }

    /// Get the material.
    pub fn material(&self) -> &'m Material {
        self.material
    }

    /// Slot the next write and bind target.
    pub fn current_slot(&self) -> u32 {
        self.current as u32
    }

    /// Number of frame slots.
    pub fn frames_in_flight(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Descriptor set of `slot`, if the material has a material set.
    pub fn descriptor_set(&self, slot: u32) -> Option<DescriptorSetHandle> {
        self.slots.get(slot as usize).and_then(|s| s.set)
    }

    /// Dynamic buffer of the uniform block at `binding`.
    pub fn uniform_buffer(&self, binding: u32) -> Option<BufferHandle> {
        self.block_index(binding).map(|index| self.buffers[index])
    }

    /// Whether `binding` still has to be copied into `slot`.
    pub fn is_dirty(&self, slot: u32, binding: u32) -> bool {
        self.slots
            .get(slot as usize)
            .is_some_and(|s| s.dirty.contains(binding as usize))
    }

    /// Read back the bytes of uniform member `name` in `slot`.
    pub fn read_uniform(&self, slot: u32, name: &str) -> Result<Vec<u8>, BindingError> {
        let member = self
            .material
            .uniforms()
            .get(name)
            .ok_or_else(|| BindingError::UnknownBinding(name.to_string()))?;
        let index = self
            .block_index(member.binding)
            .ok_or_else(|| BindingError::UnknownBinding(name.to_string()))?;
        if slot as usize >= self.slots.len() {
            return Err(BindingError::InvalidParameter(format!(
                "frame slot {slot} out of range ({} slots)",
                self.slots.len()
            )));
        }

        let stride = self.material.blocks()[index].stride;
        let offset = stride * u64::from(slot) + u64::from(member.offset);
        self.material
            .device()
            .backend()
            .read_buffer(self.buffers[index], offset, u64::from(member.size))
            .map_err(|e| BindingError::creation("uniform readback", e))
    }

    /// Write raw bytes to uniform member `name` in the current slot.
    ///
    /// # Errors
    ///
    /// [`BindingError::UnknownBinding`] if no member has that name and
    /// [`BindingError::SizeMismatch`] if `bytes` is not exactly the member's
    /// size. Nothing is written in either case.
    pub fn write_uniform(&mut self, name: &str, bytes: &[u8]) -> Result<(), BindingError> {
        crate::profile_scope!("write_uniform");

        let member = *self
            .material
            .uniforms()
            .get(name)
            .ok_or_else(|| BindingError::UnknownBinding(name.to_string()))?;
        if bytes.len() != member.size as usize {
            return Err(BindingError::SizeMismatch {
                name: name.to_string(),
                expected: member.size,
                actual: u32::try_from(bytes.len()).unwrap_or(u32::MAX),
            });
        }
        let index = self
            .block_index(member.binding)
            .ok_or_else(|| BindingError::UnknownBinding(name.to_string()))?;

        let stride = self.material.blocks()[index].stride;
        let offset = stride * self.current as u64 + u64::from(member.offset);
        self.material
            .device()
            .backend()
            .write_buffer(self.buffers[index], offset, bytes)
            .map_err(|e| {
                log::error!("Failed to write uniform '{name}': {e}");
                BindingError::creation("uniform write", e)
            })?;

        self.mark_other_slots_dirty(member.binding);
        Ok(())
    }

    /// Set a float member. Errors are logged and the write is skipped.
    pub fn set_scalar(&mut self, name: &str, value: f32) {
        self.set_uniform(name, &value);
    }

    /// Set a `vec2` member. Errors are logged and the write is skipped.
    pub fn set_vec2(&mut self, name: &str, value: [f32; 2]) {
        self.set_uniform(name, &value);
    }

    /// Set a `vec3` member. Errors are logged and the write is skipped.
    pub fn set_vec3(&mut self, name: &str, value: [f32; 3]) {
        self.set_uniform(name, &value);
    }

    /// Set a `vec4` member. Errors are logged and the write is skipped.
    pub fn set_vec4(&mut self, name: &str, value: [f32; 4]) {
        self.set_uniform(name, &value);
    }

    /// Set a column-major `mat4` member. Errors are logged and the write is skipped.
    pub fn set_mat4(&mut self, name: &str, value: [[f32; 4]; 4]) {
        self.set_uniform(name, &value);
    }

    /// Set a member from any plain-old-data value.
    ///
    /// Unknown names and size mismatches are logged and skipped.
    pub fn set_uniform<T: bytemuck::Pod>(&mut self, name: &str, value: &T) {
        if let Err(e) = self.write_uniform(name, bytemuck::bytes_of(value)) {
            log::warn!(
                "Material {:?}: skipping uniform write: {e}",
                self.material.label()
            );
        }
    }

    /// Bind an image view and sampler to `name` in the current slot.
    ///
    /// For standalone sampler bindings the view is ignored by the driver; for
    /// image-only bindings the sampler is.
    pub fn try_set_texture(
        &mut self,
        name: &str,
        view: ImageViewHandle,
        sampler: SamplerHandle,
    ) -> Result<(), BindingError> {
        let binding = *self
            .material
            .samplers()
            .get(name)
            .ok_or_else(|| BindingError::UnknownBinding(name.to_string()))?;
        let image = self
            .material
            .image(binding)
            .copied()
            .ok_or_else(|| BindingError::UnknownBinding(name.to_string()))?;
        let set = self.slots[self.current]
            .set
            .ok_or_else(|| BindingError::UnknownBinding(name.to_string()))?;

        self.material.device().backend().update_descriptor_sets(
            &[DescriptorWrite {
                set,
                binding,
                array_element: 0,
                kind: image.kind,
                data: BindingData::SampledImage { view, sampler },
            }],
            &[],
        );

        self.mark_other_slots_dirty(binding);
        Ok(())
    }

    /// Bind an image view and sampler. Errors are logged and the write is skipped.
    pub fn set_texture(&mut self, name: &str, view: ImageViewHandle, sampler: SamplerHandle) {
        if let Err(e) = self.try_set_texture(name, view, sampler) {
            log::warn!(
                "Material {:?}: skipping texture write: {e}",
                self.material.label()
            );
        }
    }

    /// Bring the current slot up to date with the previous one.
    ///
    /// Every binding dirty in the current slot is copied forward: uniform
    /// blocks by an in-buffer range copy, image bindings by descriptor copies
    /// batched into a single update.
    pub fn update_uniforms(&mut self) {
        crate::profile_function!();

        let frames = self.slots.len();
        let current = self.current;
        let dirty: Vec<usize> = self.slots[current].dirty.ones().collect();
        if dirty.is_empty() {
            return;
        }

        let previous = (current + frames - 1) % frames;
        let backend = self.material.device().backend();
        let mut copies = Vec::new();

        for binding in dirty {
            let binding_index = binding as u32;
            if let Some(index) = self.block_index(binding_index) {
                let block = self.material.blocks()[index];
                let result = backend.copy_buffer_range(
                    self.buffers[index],
                    block.stride * previous as u64,
                    block.stride * current as u64,
                    block.size,
                );
                if let Err(e) = result {
                    log::error!(
                        "Failed to propagate uniform binding {binding_index} into slot {current}: {e}"
                    );
                    continue;
                }
            } else if let Some(image) = self.material.image(binding_index) {
                let (Some(src_set), Some(dst_set)) =
                    (self.slots[previous].set, self.slots[current].set)
                else {
                    continue;
                };
                copies.push(DescriptorCopy {
                    src_set,
                    dst_set,
                    binding: binding_index,
                    count: image.count,
                });
            }
            self.slots[current].dirty.set(binding, false);
        }

        if !copies.is_empty() {
            backend.update_descriptor_sets(&[], &copies);
        }
    }

    /// Record the pipeline and descriptor set binds for a draw.
    ///
    /// Dynamic offsets select `frame.slot_index` in every uniform block. The
    /// material set and the optional outer set are bound in set index order,
    /// with one bind call per contiguous run of indices. Afterwards the
    /// current slot advances to `slot_index + 1`.
    pub fn bind(&mut self, frame: &mut FrameContext<'_>) {
        crate::profile_function!();

        let frames = self.slots.len();
        let slot_index = frame.slot_index as usize % frames;
        if slot_index != self.current {
            log::debug!(
                "Material {:?}: binding frame slot {} while slot {} is current",
                self.material.label(),
                slot_index,
                self.current
            );
        }

        let pipeline = self.material.pipeline();
        frame.recorder.bind_pipeline(pipeline.pipeline());

        let material_set_index = self.material.material_set_index();
        let mut sets: Vec<(u32, DescriptorSetHandle, Vec<u32>)> = Vec::with_capacity(2);
        if let Some(set) = self.slots[self.current].set {
            let offsets = self.slots[slot_index].dynamic_offsets.clone();
            sets.push((material_set_index, set, offsets));
        }
        if let Some(outer) = &frame.outer {
            if outer.set_index == material_set_index {
                log::warn!(
                    "Outer set index {} collides with the material set, ignoring it",
                    outer.set_index
                );
            } else {
                sets.push((outer.set_index, outer.set, outer.dynamic_offsets.clone()));
            }
        }
        sets.sort_by_key(|(index, _, _)| *index);

        let mut start = 0;
        while start < sets.len() {
            let mut end = start + 1;
            while end < sets.len() && sets[end].0 == sets[end - 1].0 + 1 {
                end += 1;
            }
            let run = &sets[start..end];
            let handles: Vec<DescriptorSetHandle> = run.iter().map(|(_, set, _)| *set).collect();
            let offsets: Vec<u32> = run
                .iter()
                .flat_map(|(_, _, offsets)| offsets.iter().copied())
                .collect();
            frame
                .recorder
                .bind_descriptor_sets(pipeline.layout(), run[0].0, &handles, &offsets);
            start = end;
        }

        self.current = (slot_index + 1) % frames;
    }

    /// Record a push-constant write for the range at exactly
    /// `offset..offset + data.len()`.
    ///
    /// # Errors
    ///
    /// [`BindingError::UnknownBinding`] if the pipeline has no such range.
    /// Nothing is recorded in that case.
    pub fn try_push_constants(
        &self,
        recorder: &mut dyn CommandRecorder,
        offset: u32,
        data: &[u8],
    ) -> Result<(), BindingError> {
        let size = u32::try_from(data.len()).unwrap_or(u32::MAX);
        let pipeline = self.material.pipeline();
        let range = pipeline
            .reflection()
            .push_constant(offset, size)
            .ok_or_else(|| {
                BindingError::UnknownBinding(format!(
                    "push-constant range {}..{}",
                    offset,
                    u64::from(offset) + u64::from(size)
                ))
            })?;
        recorder.push_constants(pipeline.layout(), range.stages, offset, data);
        Ok(())
    }

    /// Record a push-constant write. An unknown range is logged and skipped.
    pub fn push_constants(&self, recorder: &mut dyn CommandRecorder, offset: u32, data: &[u8]) {
        if let Err(e) = self.try_push_constants(recorder, offset, data) {
            log::warn!(
                "Material {:?}: skipping push constants: {e}",
                self.material.label()
            );
        }
    }

    fn block_index(&self, binding: u32) -> Option<usize> {
        self.material
            .blocks()
            .iter()
            .position(|block| block.binding == binding)
    }

    fn mark_other_slots_dirty(&mut self, binding: u32) {
        let current = self.current;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if index != current {
                slot.dirty.insert(binding as usize);
            }
        }
    }
}

impl std::fmt::Debug for MaterialInstance<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaterialInstance")
            .field("material", &self.material.label())
            .field("current", &self.current)
            .field("slots", &self.slots)
            .field("buffers", &self.buffers)
            .finish()
    }
}

impl Drop for MaterialInstance<'_> {
    fn drop(&mut self) {
        if let Some(layout) = self.material.material_layout() {
            let mut allocator = self.material.allocator().lock();
            for set in self.slots.iter().filter_map(|slot| slot.set) {
                allocator.free(layout, set);
            }
        }
        let backend = self.material.device().backend();
        for buffer in self.buffers.drain(..) {
            backend.destroy_buffer(buffer);
        }
    }
}

static_assertions::assert_impl_all!(MaterialInstance<'static>: Send);

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::{CommandLog, DummyBackend, GpuBackend, RecordedCommand};
    use crate::config::DeviceConfig;
    use crate::device::BindingDevice;
    use crate::materials::MaterialDescriptor;
    use crate::pipeline::ShaderSource;
    use crate::reflection::{
        MemberTree, ReflectedBinding, ReflectedPushConstant, ShaderStage, ShaderStageFlags,
        StageReflection,
    };

    fn material_with_frames(backend: &Arc<DummyBackend>, frames: u32) -> Arc<Material> {
        let device = BindingDevice::new(
            backend.clone() as Arc<dyn GpuBackend>,
            DeviceConfig::default().with_frames_in_flight(frames),
        )
        .unwrap();

        let fragment = StageReflection::new(ShaderStage::Fragment)
            .with_binding(ReflectedBinding::uniform_block(
                1,
                0,
                "Material",
                12,
                vec![
                    MemberTree::float("tint_r", 0),
                    MemberTree::float("tint_g", 4),
                    MemberTree::float("tint_b", 8),
                ],
            ))
            .with_binding(ReflectedBinding::combined_image_sampler(1, 1, "albedo"))
            .with_push_constant(ReflectedPushConstant::new(
                "Push",
                0,
                64,
                vec![MemberTree::mat4("model", 0)],
            ));

        device
            .create_material(
                MaterialDescriptor::new()
                    .with_shader(
                        ShaderSource::fragment(Vec::new(), "main").with_reflection(fragment),
                    )
                    .with_label("tint"),
            )
            .unwrap()
    }

    fn material(backend: &Arc<DummyBackend>) -> Arc<Material> {
        material_with_frames(backend, 3)
    }

    fn advance(instance: &mut MaterialInstance<'_>, log: &mut CommandLog) {
        let slot = instance.current_slot();
        instance.bind(&mut FrameContext::new(slot, log));
        instance.update_uniforms();
    }

    fn read_f32(instance: &MaterialInstance<'_>, slot: u32, name: &str) -> f32 {
        let bytes = instance.read_uniform(slot, name).unwrap();
        bytemuck::pod_read_unaligned(&bytes)
    }

    #[test]
    fn test_instance_writes_initial_descriptors() {
        let backend = Arc::new(DummyBackend::new());
        let material = material(&backend);
        let instance = material.create_instance().unwrap();

        let buffer = instance.uniform_buffer(0).unwrap();
        assert_eq!(backend.buffer_contents(buffer).unwrap().len(), 768);

        for slot in 0..3 {
            let set = instance.descriptor_set(slot).unwrap();
            assert_eq!(
                backend.descriptor(set, 0),
                Some(BindingData::Buffer {
                    buffer,
                    offset: 0,
                    range: 12,
                })
            );
        }
        let stats = backend.stats();
        assert_eq!(stats.set_allocations, 3);
        assert_eq!(stats.descriptor_updates, 1);
        assert_eq!(stats.descriptor_writes, 3);
    }

    #[test]
    fn test_value_propagates_to_every_slot_once() {
        let backend = Arc::new(DummyBackend::new());
        let material = material(&backend);
        let mut instance = material.create_instance().unwrap();
        let mut log = CommandLog::new();

        instance.set_scalar("Material.tint_r", 5.0);
        assert_eq!(read_f32(&instance, 0, "Material.tint_r"), 5.0);
        assert!(!instance.is_dirty(0, 0));
        assert!(instance.is_dirty(1, 0));
        assert!(instance.is_dirty(2, 0));
        assert_eq!(read_f32(&instance, 1, "Material.tint_r"), 0.0);

        advance(&mut instance, &mut log);
        assert_eq!(instance.current_slot(), 1);
        assert_eq!(backend.stats().buffer_copies, 1);
        assert!(!instance.is_dirty(1, 0));
        assert_eq!(read_f32(&instance, 1, "Material.tint_r"), 5.0);

        // A second update of the same slot copies nothing.
        instance.update_uniforms();
        assert_eq!(backend.stats().buffer_copies, 1);

        advance(&mut instance, &mut log);
        assert_eq!(instance.current_slot(), 2);
        assert_eq!(backend.stats().buffer_copies, 2);
        assert_eq!(read_f32(&instance, 2, "Material.tint_r"), 5.0);

        advance(&mut instance, &mut log);
        assert_eq!(instance.current_slot(), 0);
        assert_eq!(backend.stats().buffer_copies, 2);
        assert!(!instance.is_dirty(0, 0));
        assert_eq!(backend.stats().buffer_writes, 1);
    }

    #[test]
    fn test_later_write_wins_after_propagation() {
        let backend = Arc::new(DummyBackend::new());
        let material = material(&backend);
        let mut instance = material.create_instance().unwrap();
        let mut log = CommandLog::new();

        instance.set_scalar("Material.tint_g", 1.0);
        advance(&mut instance, &mut log);
        instance.set_scalar("Material.tint_g", 2.0);
        advance(&mut instance, &mut log);
        advance(&mut instance, &mut log);

        assert_eq!(instance.current_slot(), 0);
        assert_eq!(read_f32(&instance, 0, "Material.tint_g"), 2.0);
        assert_eq!(read_f32(&instance, 1, "Material.tint_g"), 2.0);
        assert_eq!(read_f32(&instance, 2, "Material.tint_g"), 2.0);
    }

    #[test]
    fn test_invalid_writes_do_not_mutate() {
        let backend = Arc::new(DummyBackend::new());
        let material = material(&backend);
        let mut instance = material.create_instance().unwrap();
        let buffer = instance.uniform_buffer(0).unwrap();
        let before = backend.buffer_contents(buffer).unwrap();

        assert_eq!(
            instance.write_uniform("Material.missing", &[0; 4]),
            Err(BindingError::UnknownBinding("Material.missing".to_string()))
        );
        assert_eq!(
            instance.write_uniform("Material.tint_r", &[0xff; 12]),
            Err(BindingError::SizeMismatch {
                name: "Material.tint_r".to_string(),
                expected: 4,
                actual: 12,
            })
        );
        instance.set_vec3("Material.tint_r", [1.0, 2.0, 3.0]);
        instance.set_scalar("tint_r", 1.0);

        assert_eq!(backend.buffer_contents(buffer).unwrap(), before);
        assert_eq!(backend.stats().buffer_writes, 0);
        assert!(!instance.is_dirty(1, 0));
    }

    #[test]
    fn test_texture_propagates_by_descriptor_copy() {
        let backend = Arc::new(DummyBackend::new());
        let material = material(&backend);
        let mut instance = material.create_instance().unwrap();
        let mut log = CommandLog::new();

        let texture = BindingData::SampledImage {
            view: ImageViewHandle(11),
            sampler: SamplerHandle(12),
        };
        instance.set_texture("albedo", ImageViewHandle(11), SamplerHandle(12));
        instance.set_scalar("Material.tint_b", 0.5);
        assert_eq!(backend.descriptor(instance.descriptor_set(0).unwrap(), 1), Some(texture));
        assert!(instance.is_dirty(1, 1));

        let updates_before = backend.stats().descriptor_updates;
        advance(&mut instance, &mut log);

        let stats = backend.stats();
        assert_eq!(stats.descriptor_updates, updates_before + 1);
        assert_eq!(stats.descriptor_copies, 1);
        assert_eq!(stats.buffer_copies, 1);
        assert_eq!(backend.descriptor(instance.descriptor_set(1).unwrap(), 1), Some(texture));
        assert!(!instance.is_dirty(1, 1));
    }

    #[test]
    fn test_unknown_texture_is_skipped() {
        let backend = Arc::new(DummyBackend::new());
        let material = material(&backend);
        let mut instance = material.create_instance().unwrap();
        let updates_before = backend.stats().descriptor_updates;

        assert!(matches!(
            instance.try_set_texture("normal", ImageViewHandle(1), SamplerHandle(2)),
            Err(BindingError::UnknownBinding(_))
        ));
        instance.set_texture("normal", ImageViewHandle(1), SamplerHandle(2));
        assert_eq!(backend.stats().descriptor_updates, updates_before);
    }

    #[test]
    fn test_bind_offsets_and_advance() {
        let backend = Arc::new(DummyBackend::new());
        let material = material(&backend);
        let mut instance = material.create_instance().unwrap();
        let mut log = CommandLog::new();

        instance.bind(&mut FrameContext::new(0, &mut log));
        instance.bind(&mut FrameContext::new(1, &mut log));

        let pipeline = material.pipeline();
        assert_eq!(
            log.commands,
            vec![
                RecordedCommand::BindPipeline(pipeline.pipeline()),
                RecordedCommand::BindDescriptorSets {
                    layout: pipeline.layout(),
                    first_set: 1,
                    sets: vec![instance.descriptor_set(0).unwrap()],
                    dynamic_offsets: vec![0],
                },
                RecordedCommand::BindPipeline(pipeline.pipeline()),
                RecordedCommand::BindDescriptorSets {
                    layout: pipeline.layout(),
                    first_set: 1,
                    sets: vec![instance.descriptor_set(1).unwrap()],
                    dynamic_offsets: vec![256],
                },
            ]
        );
        assert_eq!(instance.current_slot(), 2);
    }

    #[test]
    fn test_bind_with_outer_set() {
        let backend = Arc::new(DummyBackend::new());
        let material = material(&backend);
        let mut instance = material.create_instance().unwrap();
        let mut log = CommandLog::new();

        // Adjacent outer set: one bind call, outer offsets first.
        instance.bind(
            &mut FrameContext::new(0, &mut log)
                .with_outer_set(OuterSet::new(0, DescriptorSetHandle(900)).with_dynamic_offsets(vec![64])),
        );
        assert_eq!(
            log.commands[1],
            RecordedCommand::BindDescriptorSets {
                layout: material.pipeline().layout(),
                first_set: 0,
                sets: vec![DescriptorSetHandle(900), instance.descriptor_set(0).unwrap()],
                dynamic_offsets: vec![64, 0],
            }
        );

        // Non-adjacent outer set: two bind calls.
        log.clear();
        instance.bind(
            &mut FrameContext::new(1, &mut log)
                .with_outer_set(OuterSet::new(3, DescriptorSetHandle(901))),
        );
        assert_eq!(log.len(), 3);
        assert!(matches!(
            &log.commands[2],
            RecordedCommand::BindDescriptorSets { first_set: 3, .. }
        ));
    }

    #[test]
    fn test_push_constants_need_exact_range() {
        let backend = Arc::new(DummyBackend::new());
        let material = material(&backend);
        let instance = material.create_instance().unwrap();
        let mut log = CommandLog::new();

        instance.push_constants(&mut log, 0, &[1; 64]);
        assert_eq!(
            log.commands,
            vec![RecordedCommand::PushConstants {
                layout: material.pipeline().layout(),
                stages: ShaderStageFlags::FRAGMENT,
                offset: 0,
                data: vec![1; 64],
            }]
        );

        assert!(matches!(
            instance.try_push_constants(&mut log, 16, &[0; 16]),
            Err(BindingError::UnknownBinding(_))
        ));
        instance.push_constants(&mut log, 0, &[0; 32]);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_drop_returns_sets_for_reuse() {
        let backend = Arc::new(DummyBackend::new());
        let material = material(&backend);

        let instance = material.create_instance().unwrap();
        let mut sets: Vec<_> = (0..3).map(|s| instance.descriptor_set(s).unwrap()).collect();
        drop(instance);

        let layout = material.material_layout().unwrap();
        assert_eq!(material.allocator().lock().released_set_count(layout), 3);
        assert_eq!(backend.stats().buffers_destroyed, 1);

        let instance = material.create_instance().unwrap();
        let mut reused: Vec<_> = (0..3).map(|s| instance.descriptor_set(s).unwrap()).collect();
        sets.sort();
        reused.sort();
        assert_eq!(sets, reused);
        assert_eq!(backend.stats().set_allocations, 3);
    }

    #[test]
    fn test_failed_instance_releases_resources() {
        let backend = Arc::new(DummyBackend::new());
        let material = material(&backend);
        backend.set_pool_exhaustion(true);

        assert!(matches!(
            material.create_instance(),
            Err(BindingError::CreationFailed(_))
        ));
        let stats = backend.stats();
        assert_eq!(stats.buffers_created, 1);
        assert_eq!(stats.buffers_destroyed, 1);
    }

    #[test]
    fn test_single_frame_slot() {
        let backend = Arc::new(DummyBackend::new());
        let material = material_with_frames(&backend, 1);
        let mut instance = material.create_instance().unwrap();
        let mut log = CommandLog::new();

        instance.set_scalar("Material.tint_r", 3.0);
        assert!(!instance.is_dirty(0, 0));
        advance(&mut instance, &mut log);
        assert_eq!(instance.current_slot(), 0);
        assert_eq!(backend.stats().buffer_copies, 0);
        assert_eq!(read_f32(&instance, 0, "Material.tint_r"), 3.0);
    }

    fn single_block_material(backend: &Arc<DummyBackend>, size: u32) -> Arc<Material> {
        let device =
            BindingDevice::new(backend.clone() as Arc<dyn GpuBackend>, DeviceConfig::default())
                .unwrap();
        let fragment = StageReflection::new(ShaderStage::Fragment).with_binding(
            ReflectedBinding::uniform_block(1, 0, "Block", size, Vec::new()),
        );
        device
            .create_material(
                MaterialDescriptor::new()
                    .with_shader(ShaderSource::fragment(Vec::new(), "main").with_reflection(fragment)),
            )
            .unwrap()
    }

    #[test]
    fn test_empty_block_descriptor_covers_one_unit() {
        let backend = Arc::new(DummyBackend::new());
        let material = single_block_material(&backend, 0);
        let instance = material.create_instance().unwrap();

        let buffer = instance.uniform_buffer(0).unwrap();
        let set = instance.descriptor_set(0).unwrap();
        assert_eq!(
            backend.descriptor(set, 0),
            Some(BindingData::Buffer {
                buffer,
                offset: 0,
                range: 256,
            })
        );
    }

    #[test]
    fn test_dynamic_offset_overflow_fails_creation() {
        let backend = Arc::new(DummyBackend::new());
        let material = single_block_material(&backend, 0x8000_0000);

        let result = material.create_instance();
        assert!(matches!(result, Err(BindingError::CreationFailed(_))));
        let stats = backend.stats();
        assert_eq!(stats.buffers_created, 0);
        assert_eq!(stats.set_allocations, 0);
    }
}
