//! Native Vulkan backend implementation using ash.
//!
//! The backend borrows a device the application already created. It never
//! creates an instance, a surface, or a queue, and never submits work: the
//! binding core only needs layouts, pools, sets, host-visible buffers and
//! pipelines, plus a [`VulkanCommandRecorder`] for the commands a draw needs.

mod allocator;
mod conversion;
mod pipeline;
mod recorder;

use std::collections::HashMap;

use ash::vk;
use ash::vk::Handle;
use gpu_allocator::vulkan::{Allocation, Allocator};
use parking_lot::Mutex;

use crate::backend::{
    BackendError, BindingData, DescriptorCopy, DescriptorWrite, GpuBackend, PipelineDescriptor,
    PoolSize,
};
use crate::reflection::{LayoutBindingKey, PushConstantKey};
use crate::types::{
    BufferDescriptor, BufferHandle, DescriptorPoolHandle, DescriptorSetHandle,
    DescriptorSetLayoutHandle, PipelineHandle, PipelineLayoutHandle,
};

pub use recorder::VulkanCommandRecorder;

use self::conversion::{
    atom_aligned_range, convert_buffer_usage, convert_descriptor_kind, convert_result,
    convert_shader_stage_flags, descriptor_image_layout,
};

/// A buffer together with its memory.
struct VulkanBuffer {
    buffer: vk::Buffer,
    allocation: Allocation,
    size: u64,
}

/// Vulkan implementation of [`GpuBackend`].
pub struct VulkanBackend {
    device: ash::Device,
    allocator: Mutex<Allocator>,
    buffers: Mutex<HashMap<BufferHandle, VulkanBuffer>>,
    min_uniform_buffer_offset_alignment: u64,
    non_coherent_atom_size: u64,
}

impl VulkanBackend {
    /// Create a backend over an existing logical device.
    ///
    /// The device must outlive the backend.
    pub fn new(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
    ) -> Result<Self, BackendError> {
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let limits = properties.limits;

        let allocator = allocator::create_allocator(instance, physical_device, device.clone())?;

        log::info!(
            "Vulkan binding backend: uniform offset alignment {}, atom size {}",
            limits.min_uniform_buffer_offset_alignment,
            limits.non_coherent_atom_size
        );

        Ok(Self {
            device,
            allocator: Mutex::new(allocator),
            buffers: Mutex::new(HashMap::new()),
            min_uniform_buffer_offset_alignment: limits.min_uniform_buffer_offset_alignment,
            non_coherent_atom_size: limits.non_coherent_atom_size,
        })
    }

    /// Get the ash device.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Create a recorder that writes into `command_buffer`.
    pub fn recorder(&self, command_buffer: vk::CommandBuffer) -> VulkanCommandRecorder<'_> {
        VulkanCommandRecorder::new(&self.device, command_buffer)
    }

    /// Get the native buffer behind a handle.
    pub fn raw_buffer(&self, buffer: BufferHandle) -> Option<vk::Buffer> {
        self.buffers.lock().get(&buffer).map(|b| b.buffer)
    }

    /// Flush (or invalidate) `offset..offset + size` of a buffer's memory if it is
    /// not host-coherent.
    fn sync_range(
        &self,
        buffer: &VulkanBuffer,
        offset: u64,
        size: u64,
        invalidate: bool,
    ) -> Result<(), BackendError> {
        let allocation = &buffer.allocation;
        if allocation
            .memory_properties()
            .contains(vk::MemoryPropertyFlags::HOST_COHERENT)
        {
            return Ok(());
        }

        let base = allocation.offset();
        let (start, len) = atom_aligned_range(
            base + offset,
            size,
            self.non_coherent_atom_size,
            base + allocation.size(),
        );
        let range = vk::MappedMemoryRange::default()
            .memory(unsafe { allocation.memory() })
            .offset(start)
            .size(len);

        let result = unsafe {
            if invalidate {
                self.device.invalidate_mapped_memory_ranges(&[range])
            } else {
                self.device.flush_mapped_memory_ranges(&[range])
            }
        };
        result.map_err(convert_result)
    }
}

fn out_of_range(buffer: &VulkanBuffer, offset: u64, size: u64) -> BackendError {
    BackendError::Native(format!(
        "Range {offset}..{} is outside buffer of size {}",
        offset + size,
        buffer.size
    ))
}

fn unmapped() -> BackendError {
    BackendError::Native("Buffer memory is not host-visible".to_string())
}

impl GpuBackend for VulkanBackend {
    fn name(&self) -> &'static str {
        "Vulkan"
    }

    fn min_uniform_buffer_offset_alignment(&self) -> u64 {
        self.min_uniform_buffer_offset_alignment
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[LayoutBindingKey],
    ) -> Result<DescriptorSetLayoutHandle, BackendError> {
        let bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings
            .iter()
            .map(|entry| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(entry.binding)
                    .descriptor_type(convert_descriptor_kind(entry.kind))
                    .descriptor_count(entry.count)
                    .stage_flags(convert_shader_stage_flags(entry.stages))
            })
            .collect();

        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);

        let layout = unsafe { self.device.create_descriptor_set_layout(&create_info, None) }
            .map_err(convert_result)?;

        Ok(DescriptorSetLayoutHandle(layout.as_raw()))
    }

    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayoutHandle) {
        unsafe {
            self.device.destroy_descriptor_set_layout(
                vk::DescriptorSetLayout::from_raw(layout.raw()),
                None,
            );
        }
    }

    fn create_pipeline_layout(
        &self,
        set_layouts: &[DescriptorSetLayoutHandle],
        push_constants: &[PushConstantKey],
    ) -> Result<PipelineLayoutHandle, BackendError> {
        let set_layouts: Vec<vk::DescriptorSetLayout> = set_layouts
            .iter()
            .map(|l| vk::DescriptorSetLayout::from_raw(l.raw()))
            .collect();
        let ranges: Vec<vk::PushConstantRange> = push_constants
            .iter()
            .map(|pc| {
                vk::PushConstantRange::default()
                    .stage_flags(convert_shader_stage_flags(pc.stages))
                    .offset(pc.offset)
                    .size(pc.size)
            })
            .collect();

        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&ranges);

        let layout = unsafe { self.device.create_pipeline_layout(&create_info, None) }
            .map_err(convert_result)?;

        Ok(PipelineLayoutHandle(layout.as_raw()))
    }

    fn destroy_pipeline_layout(&self, layout: PipelineLayoutHandle) {
        unsafe {
            self.device
                .destroy_pipeline_layout(vk::PipelineLayout::from_raw(layout.raw()), None);
        }
    }

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        sizes: &[PoolSize],
    ) -> Result<DescriptorPoolHandle, BackendError> {
        let pool_sizes: Vec<vk::DescriptorPoolSize> = sizes
            .iter()
            .map(|size| {
                vk::DescriptorPoolSize::default()
                    .ty(convert_descriptor_kind(size.kind))
                    .descriptor_count(size.count)
            })
            .collect();

        // No FREE_DESCRIPTOR_SET flag: sets are recycled, never freed individually.
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(&pool_sizes);

        let pool = unsafe { self.device.create_descriptor_pool(&create_info, None) }
            .map_err(convert_result)?;

        Ok(DescriptorPoolHandle(pool.as_raw()))
    }

    fn reset_descriptor_pool(&self, pool: DescriptorPoolHandle) -> Result<(), BackendError> {
        unsafe {
            self.device.reset_descriptor_pool(
                vk::DescriptorPool::from_raw(pool.raw()),
                vk::DescriptorPoolResetFlags::empty(),
            )
        }
        .map_err(convert_result)
    }

    fn destroy_descriptor_pool(&self, pool: DescriptorPoolHandle) {
        unsafe {
            self.device
                .destroy_descriptor_pool(vk::DescriptorPool::from_raw(pool.raw()), None);
        }
    }

    fn allocate_descriptor_set(
        &self,
        pool: DescriptorPoolHandle,
        layout: DescriptorSetLayoutHandle,
    ) -> Result<DescriptorSetHandle, BackendError> {
        let layouts = [vk::DescriptorSetLayout::from_raw(layout.raw())];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(vk::DescriptorPool::from_raw(pool.raw()))
            .set_layouts(&layouts);

        let sets = unsafe { self.device.allocate_descriptor_sets(&alloc_info) }
            .map_err(convert_result)?;

        sets.first()
            .map(|set| DescriptorSetHandle(set.as_raw()))
            .ok_or_else(|| BackendError::Native("No descriptor set returned".to_string()))
    }

    fn update_descriptor_sets(&self, writes: &[DescriptorWrite], copies: &[DescriptorCopy]) {
        crate::profile_scope!("vulkan_update_descriptor_sets");

        // Infos must outlive the write structs that point into them.
        let mut buffer_infos = Vec::new();
        let mut image_infos = Vec::new();
        for write in writes {
            match write.data {
                BindingData::Buffer {
                    buffer,
                    offset,
                    range,
                } => {
                    let raw = self.raw_buffer(buffer).unwrap_or_else(vk::Buffer::null);
                    buffer_infos.push(
                        vk::DescriptorBufferInfo::default()
                            .buffer(raw)
                            .offset(offset)
                            .range(range),
                    );
                }
                BindingData::SampledImage { view, sampler } => {
                    image_infos.push(
                        vk::DescriptorImageInfo::default()
                            .image_view(vk::ImageView::from_raw(view.raw()))
                            .sampler(vk::Sampler::from_raw(sampler.raw()))
                            .image_layout(descriptor_image_layout(write.kind)),
                    );
                }
            }
        }

        let mut next_buffer = 0;
        let mut next_image = 0;
        let vk_writes: Vec<vk::WriteDescriptorSet> = writes
            .iter()
            .map(|write| {
                let base = vk::WriteDescriptorSet::default()
                    .dst_set(vk::DescriptorSet::from_raw(write.set.raw()))
                    .dst_binding(write.binding)
                    .dst_array_element(write.array_element)
                    .descriptor_type(convert_descriptor_kind(write.kind));
                match write.data {
                    BindingData::Buffer { .. } => {
                        let info = std::slice::from_ref(&buffer_infos[next_buffer]);
                        next_buffer += 1;
                        base.buffer_info(info)
                    }
                    BindingData::SampledImage { .. } => {
                        let info = std::slice::from_ref(&image_infos[next_image]);
                        next_image += 1;
                        base.image_info(info)
                    }
                }
            })
            .collect();

        let vk_copies: Vec<vk::CopyDescriptorSet> = copies
            .iter()
            .map(|copy| {
                vk::CopyDescriptorSet::default()
                    .src_set(vk::DescriptorSet::from_raw(copy.src_set.raw()))
                    .src_binding(copy.binding)
                    .src_array_element(0)
                    .dst_set(vk::DescriptorSet::from_raw(copy.dst_set.raw()))
                    .dst_binding(copy.binding)
                    .dst_array_element(0)
                    .descriptor_count(copy.count)
            })
            .collect();

        unsafe {
            self.device.update_descriptor_sets(&vk_writes, &vk_copies);
        }
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferHandle, BackendError> {
        if descriptor.size == 0 {
            return Err(BackendError::Native(
                "Buffer size must be non-zero".to_string(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(descriptor.size)
            .usage(convert_buffer_usage(descriptor.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer =
            unsafe { self.device.create_buffer(&buffer_info, None) }.map_err(convert_result)?;

        let allocation = {
            let mut allocator = self.allocator.lock();
            allocator::allocate_host_visible(
                &self.device,
                &mut allocator,
                buffer,
                descriptor.label.as_deref().unwrap_or("uniform buffer"),
            )
        };
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let handle = BufferHandle(buffer.as_raw());
        self.buffers.lock().insert(
            handle,
            VulkanBuffer {
                buffer,
                allocation,
                size: descriptor.size,
            },
        );
        Ok(handle)
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        let Some(entry) = self.buffers.lock().remove(&buffer) else {
            log::warn!("Destroying unknown buffer {:?}", buffer);
            return;
        };
        if let Err(e) = self.allocator.lock().free(entry.allocation) {
            log::error!("Failed to free buffer memory: {}", e);
        }
        unsafe { self.device.destroy_buffer(entry.buffer, None) };
    }

    fn write_buffer(
        &self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), BackendError> {
        let mut buffers = self.buffers.lock();
        let entry = buffers
            .get_mut(&buffer)
            .ok_or_else(|| BackendError::Native(format!("Unknown buffer {buffer:?}")))?;

        let size = data.len() as u64;
        if offset + size > entry.size {
            return Err(out_of_range(entry, offset, size));
        }

        let mapped = entry.allocation.mapped_slice_mut().ok_or_else(unmapped)?;
        let start = offset as usize;
        mapped[start..start + data.len()].copy_from_slice(data);

        self.sync_range(entry, offset, size, false)
    }

    fn copy_buffer_range(
        &self,
        buffer: BufferHandle,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    ) -> Result<(), BackendError> {
        let mut buffers = self.buffers.lock();
        let entry = buffers
            .get_mut(&buffer)
            .ok_or_else(|| BackendError::Native(format!("Unknown buffer {buffer:?}")))?;

        if src_offset + size > entry.size {
            return Err(out_of_range(entry, src_offset, size));
        }
        if dst_offset + size > entry.size {
            return Err(out_of_range(entry, dst_offset, size));
        }

        let mapped = entry.allocation.mapped_slice_mut().ok_or_else(unmapped)?;
        let src = src_offset as usize;
        let dst = dst_offset as usize;
        mapped.copy_within(src..src + size as usize, dst);

        self.sync_range(entry, dst_offset, size, false)
    }

    fn read_buffer(
        &self,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    ) -> Result<Vec<u8>, BackendError> {
        let buffers = self.buffers.lock();
        let entry = buffers
            .get(&buffer)
            .ok_or_else(|| BackendError::Native(format!("Unknown buffer {buffer:?}")))?;

        if offset + size > entry.size {
            return Err(out_of_range(entry, offset, size));
        }

        self.sync_range(entry, offset, size, true)?;

        let mapped = entry.allocation.mapped_slice().ok_or_else(unmapped)?;
        let start = offset as usize;
        Ok(mapped[start..start + size as usize].to_vec())
    }

    fn create_graphics_pipeline(
        &self,
        descriptor: &PipelineDescriptor<'_>,
    ) -> Result<PipelineHandle, BackendError> {
        crate::profile_scope!("vulkan_create_graphics_pipeline");

        let pipeline = pipeline::create_graphics_pipeline(&self.device, descriptor)?;
        log::debug!(
            "Created Vulkan pipeline {:?} ({} stages)",
            descriptor.label.unwrap_or("unnamed"),
            descriptor.stages.len()
        );
        Ok(PipelineHandle(pipeline.as_raw()))
    }

    fn destroy_pipeline(&self, pipeline: PipelineHandle) {
        unsafe {
            self.device
                .destroy_pipeline(vk::Pipeline::from_raw(pipeline.raw()), None);
        }
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        let buffers = std::mem::take(&mut *self.buffers.lock());
        if !buffers.is_empty() {
            log::warn!("Destroying {} leaked buffers", buffers.len());
        }
        let mut allocator = self.allocator.lock();
        for (_, entry) in buffers {
            if let Err(e) = allocator.free(entry.allocation) {
                log::error!("Failed to free buffer memory: {}", e);
            }
            unsafe { self.device.destroy_buffer(entry.buffer, None) };
        }
    }
}

static_assertions::assert_impl_all!(VulkanBackend: Send, Sync);
