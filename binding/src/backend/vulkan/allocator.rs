//! GPU memory allocator integration using gpu-allocator.

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};

use crate::backend::BackendError;

/// Create a memory allocator for the Vulkan device.
pub fn create_allocator(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
) -> Result<Allocator, BackendError> {
    Allocator::new(&AllocatorCreateDesc {
        instance: instance.clone(),
        device,
        physical_device,
        debug_settings: Default::default(),
        buffer_device_address: false,
        allocation_sizes: gpu_allocator::AllocationSizes::default(),
    })
    .map_err(|e| BackendError::Native(format!("Failed to create memory allocator: {e}")))
}

/// Allocate host-visible memory for `buffer` and bind it.
///
/// Host-visible memory lets parameter writes go through a persistent mapping
/// instead of a staging copy.
pub fn allocate_host_visible(
    device: &ash::Device,
    allocator: &mut Allocator,
    buffer: vk::Buffer,
    name: &str,
) -> Result<Allocation, BackendError> {
    let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

    let allocation = allocator
        .allocate(&AllocationCreateDesc {
            name,
            requirements,
            location: MemoryLocation::CpuToGpu,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })
        .map_err(|e| match e {
            gpu_allocator::AllocationError::OutOfMemory => BackendError::OutOfMemory,
            other => BackendError::Native(format!("Failed to allocate buffer memory: {other}")),
        })?;

    if let Err(e) =
        unsafe { device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) }
    {
        let _ = allocator.free(allocation);
        return Err(super::conversion::convert_result(e));
    }

    Ok(allocation)
}
