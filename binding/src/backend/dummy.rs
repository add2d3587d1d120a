//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't talk to a GPU. It hands out unique handles, keeps
//! buffer bytes and descriptor contents in memory, simulates descriptor pool
//! capacity, and counts every native call so tests can assert on how often the
//! driver would have been hit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::reflection::{LayoutBindingKey, PushConstantKey, ShaderStageFlags};
use crate::types::{
    BufferDescriptor, BufferHandle, DescriptorPoolHandle, DescriptorSetHandle,
    DescriptorSetLayoutHandle, PipelineHandle, PipelineLayoutHandle,
};

use super::{
    BackendError, BindingData, CommandRecorder, DescriptorCopy, DescriptorWrite, GpuBackend,
    PipelineDescriptor, PoolSize,
};

/// Default minimum dynamic uniform offset alignment reported by the dummy backend.
pub const DEFAULT_DUMMY_ALIGNMENT: u64 = 256;

/// Call counters of a [`DummyBackend`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DummyStats {
    /// Descriptor set layouts created.
    pub set_layouts_created: usize,
    /// Descriptor set layouts destroyed.
    pub set_layouts_destroyed: usize,
    /// Pipeline layouts created.
    pub pipeline_layouts_created: usize,
    /// Pipeline layouts destroyed.
    pub pipeline_layouts_destroyed: usize,
    /// Capacity of every pool created, in creation order.
    pub pool_capacities: Vec<u32>,
    /// Descriptor pools destroyed.
    pub pools_destroyed: usize,
    /// Descriptor pool resets.
    pub pool_resets: usize,
    /// Descriptor set allocation calls, including failed ones.
    pub set_allocations: usize,
    /// `update_descriptor_sets` calls.
    pub descriptor_updates: usize,
    /// Descriptor writes across all update calls.
    pub descriptor_writes: usize,
    /// Descriptor copies across all update calls.
    pub descriptor_copies: usize,
    /// Buffers created.
    pub buffers_created: usize,
    /// Buffers destroyed.
    pub buffers_destroyed: usize,
    /// Mapped buffer writes.
    pub buffer_writes: usize,
    /// In-buffer range copies.
    pub buffer_copies: usize,
    /// Graphics pipelines created.
    pub pipelines_created: usize,
    /// Graphics pipelines destroyed.
    pub pipelines_destroyed: usize,
}

impl DummyStats {
    /// Number of descriptor pools created.
    pub fn pools_created(&self) -> usize {
        self.pool_capacities.len()
    }
}

#[derive(Debug)]
struct DummyPool {
    capacity: u32,
    allocated: u32,
}

#[derive(Debug, Default)]
struct DummyState {
    stats: DummyStats,
    fail_creation: bool,
    exhaust_pools: bool,
    set_layouts: HashMap<DescriptorSetLayoutHandle, Vec<LayoutBindingKey>>,
    pipeline_layouts: HashMap<PipelineLayoutHandle, PipelineLayoutInfo>,
    pools: HashMap<DescriptorPoolHandle, DummyPool>,
    sets: HashMap<DescriptorSetHandle, DescriptorPoolHandle>,
    descriptors: HashMap<(DescriptorSetHandle, u32, u32), BindingData>,
    buffers: HashMap<BufferHandle, Vec<u8>>,
}

impl DummyState {
    fn check_creation(&self, what: &str) -> Result<(), BackendError> {
        if self.fail_creation {
            log::trace!("DummyBackend: failing creation of {what}");
            return Err(BackendError::OutOfMemory);
        }
        Ok(())
    }
}

/// Set layouts and push-constant ranges of a pipeline layout.
pub type PipelineLayoutInfo = (Vec<DescriptorSetLayoutHandle>, Vec<PushConstantKey>);

/// Dummy GPU backend.
#[derive(Debug)]
pub struct DummyBackend {
    next_handle: AtomicU64,
    alignment: u64,
    state: Mutex<DummyState>,
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DummyBackend {
    /// Create a new dummy backend with 256-byte offset alignment.
    pub fn new() -> Self {
        Self::with_alignment(DEFAULT_DUMMY_ALIGNMENT)
    }

    /// Create a dummy backend reporting the given dynamic offset alignment.
    pub fn with_alignment(alignment: u64) -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            alignment,
            state: Mutex::new(DummyState::default()),
        }
    }

    /// Make every subsequent creation call fail with `OutOfMemory`.
    pub fn set_creation_failure(&self, fail: bool) {
        self.state.lock().fail_creation = fail;
    }

    /// Make every subsequent set allocation fail with `OutOfPoolMemory`.
    pub fn set_pool_exhaustion(&self, exhausted: bool) {
        self.state.lock().exhaust_pools = exhausted;
    }

    /// Snapshot of the call counters.
    pub fn stats(&self) -> DummyStats {
        self.state.lock().stats.clone()
    }

    /// Current contents of a buffer.
    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<Vec<u8>> {
        self.state.lock().buffers.get(&buffer).cloned()
    }

    /// Current descriptor at element 0 of `binding` in `set`.
    pub fn descriptor(&self, set: DescriptorSetHandle, binding: u32) -> Option<BindingData> {
        self.state.lock().descriptors.get(&(set, binding, 0)).copied()
    }

    /// Bindings a live set layout was created with.
    pub fn set_layout_bindings(
        &self,
        layout: DescriptorSetLayoutHandle,
    ) -> Option<Vec<LayoutBindingKey>> {
        self.state.lock().set_layouts.get(&layout).cloned()
    }

    /// Set layouts and push ranges a live pipeline layout was created with.
    pub fn pipeline_layout_info(
        &self,
        layout: PipelineLayoutHandle,
    ) -> Option<PipelineLayoutInfo> {
        self.state.lock().pipeline_layouts.get(&layout).cloned()
    }

    /// Number of sets currently allocated from `pool`.
    pub fn pool_usage(&self, pool: DescriptorPoolHandle) -> Option<u32> {
        self.state.lock().pools.get(&pool).map(|p| p.allocated)
    }

    fn next(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }
}

fn byte_range(len: usize, offset: u64, size: u64) -> Result<std::ops::Range<usize>, BackendError> {
    let start = usize::try_from(offset).map_err(|e| BackendError::Native(e.to_string()))?;
    let size = usize::try_from(size).map_err(|e| BackendError::Native(e.to_string()))?;
    let end = start
        .checked_add(size)
        .filter(|end| *end <= len)
        .ok_or_else(|| {
            BackendError::Native(format!(
                "range {start}..{} out of bounds for buffer of {len} bytes",
                start.saturating_add(size)
            ))
        })?;
    Ok(start..end)
}

impl GpuBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy"
    }

    fn min_uniform_buffer_offset_alignment(&self) -> u64 {
        self.alignment
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[LayoutBindingKey],
    ) -> Result<DescriptorSetLayoutHandle, BackendError> {
        let mut state = self.state.lock();
        state.check_creation("descriptor set layout")?;
        let handle = DescriptorSetLayoutHandle(self.next());
        log::trace!(
            "DummyBackend: creating set layout {:?} ({} bindings)",
            handle,
            bindings.len()
        );
        state.set_layouts.insert(handle, bindings.to_vec());
        state.stats.set_layouts_created += 1;
        Ok(handle)
    }

    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayoutHandle) {
        let mut state = self.state.lock();
        if state.set_layouts.remove(&layout).is_none() {
            log::warn!("DummyBackend: destroying unknown set layout {layout:?}");
        }
        state.stats.set_layouts_destroyed += 1;
    }

    fn create_pipeline_layout(
        &self,
        set_layouts: &[DescriptorSetLayoutHandle],
        push_constants: &[PushConstantKey],
    ) -> Result<PipelineLayoutHandle, BackendError> {
        let mut state = self.state.lock();
        state.check_creation("pipeline layout")?;
        let handle = PipelineLayoutHandle(self.next());
        log::trace!(
            "DummyBackend: creating pipeline layout {:?} ({} sets, {} push ranges)",
            handle,
            set_layouts.len(),
            push_constants.len()
        );
        state
            .pipeline_layouts
            .insert(handle, (set_layouts.to_vec(), push_constants.to_vec()));
        state.stats.pipeline_layouts_created += 1;
        Ok(handle)
    }

    fn destroy_pipeline_layout(&self, layout: PipelineLayoutHandle) {
        let mut state = self.state.lock();
        if state.pipeline_layouts.remove(&layout).is_none() {
            log::warn!("DummyBackend: destroying unknown pipeline layout {layout:?}");
        }
        state.stats.pipeline_layouts_destroyed += 1;
    }

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        sizes: &[PoolSize],
    ) -> Result<DescriptorPoolHandle, BackendError> {
        let mut state = self.state.lock();
        state.check_creation("descriptor pool")?;
        let handle = DescriptorPoolHandle(self.next());
        log::trace!(
            "DummyBackend: creating descriptor pool {:?} ({} sets, {} kinds)",
            handle,
            max_sets,
            sizes.len()
        );
        state.pools.insert(
            handle,
            DummyPool {
                capacity: max_sets,
                allocated: 0,
            },
        );
        state.stats.pool_capacities.push(max_sets);
        Ok(handle)
    }

    fn reset_descriptor_pool(&self, pool: DescriptorPoolHandle) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        let DummyState {
            pools,
            sets,
            descriptors,
            stats,
            ..
        } = &mut *state;

        let entry = pools
            .get_mut(&pool)
            .ok_or_else(|| BackendError::Native(format!("unknown descriptor pool {pool:?}")))?;
        entry.allocated = 0;
        sets.retain(|_, owner| *owner != pool);
        descriptors.retain(|(set, _, _), _| sets.contains_key(set));
        stats.pool_resets += 1;
        Ok(())
    }

    fn destroy_descriptor_pool(&self, pool: DescriptorPoolHandle) {
        let mut state = self.state.lock();
        if state.pools.remove(&pool).is_none() {
            log::warn!("DummyBackend: destroying unknown descriptor pool {pool:?}");
        }
        let DummyState {
            sets, descriptors, ..
        } = &mut *state;
        sets.retain(|_, owner| *owner != pool);
        descriptors.retain(|(set, _, _), _| sets.contains_key(set));
        state.stats.pools_destroyed += 1;
    }

    fn allocate_descriptor_set(
        &self,
        pool: DescriptorPoolHandle,
        layout: DescriptorSetLayoutHandle,
    ) -> Result<DescriptorSetHandle, BackendError> {
        let mut state = self.state.lock();
        state.stats.set_allocations += 1;

        if !state.set_layouts.contains_key(&layout) {
            return Err(BackendError::Native(format!("unknown set layout {layout:?}")));
        }
        let exhausted = state.exhaust_pools;
        let entry = state
            .pools
            .get_mut(&pool)
            .ok_or_else(|| BackendError::Native(format!("unknown descriptor pool {pool:?}")))?;
        if exhausted || entry.allocated >= entry.capacity {
            return Err(BackendError::OutOfPoolMemory);
        }
        entry.allocated += 1;

        let handle = DescriptorSetHandle(self.next());
        state.sets.insert(handle, pool);
        Ok(handle)
    }

    fn update_descriptor_sets(&self, writes: &[DescriptorWrite], copies: &[DescriptorCopy]) {
        let mut state = self.state.lock();
        for write in writes {
            state
                .descriptors
                .insert((write.set, write.binding, write.array_element), write.data);
        }
        for copy in copies {
            for element in 0..copy.count {
                let source = state
                    .descriptors
                    .get(&(copy.src_set, copy.binding, element))
                    .copied();
                match source {
                    Some(data) => {
                        state
                            .descriptors
                            .insert((copy.dst_set, copy.binding, element), data);
                    }
                    None => log::warn!(
                        "DummyBackend: copying unwritten descriptor {:?} binding {}",
                        copy.src_set,
                        copy.binding
                    ),
                }
            }
        }
        state.stats.descriptor_updates += 1;
        state.stats.descriptor_writes += writes.len();
        state.stats.descriptor_copies += copies.len();
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferHandle, BackendError> {
        let mut state = self.state.lock();
        state.check_creation("buffer")?;
        let size = usize::try_from(descriptor.size).map_err(|e| BackendError::Native(e.to_string()))?;
        let handle = BufferHandle(self.next());
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            descriptor.label,
            descriptor.size
        );
        state.buffers.insert(handle, vec![0; size]);
        state.stats.buffers_created += 1;
        Ok(handle)
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        let mut state = self.state.lock();
        if state.buffers.remove(&buffer).is_none() {
            log::warn!("DummyBackend: destroying unknown buffer {buffer:?}");
        }
        state.stats.buffers_destroyed += 1;
    }

    fn write_buffer(
        &self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        let bytes = state
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| BackendError::Native(format!("unknown buffer {buffer:?}")))?;
        let range = byte_range(bytes.len(), offset, data.len() as u64)?;
        bytes[range].copy_from_slice(data);
        state.stats.buffer_writes += 1;
        Ok(())
    }

    fn copy_buffer_range(
        &self,
        buffer: BufferHandle,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    ) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        let bytes = state
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| BackendError::Native(format!("unknown buffer {buffer:?}")))?;
        let src = byte_range(bytes.len(), src_offset, size)?;
        let dst = byte_range(bytes.len(), dst_offset, size)?;
        bytes.copy_within(src, dst.start);
        state.stats.buffer_copies += 1;
        Ok(())
    }

    fn read_buffer(
        &self,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    ) -> Result<Vec<u8>, BackendError> {
        let state = self.state.lock();
        let bytes = state
            .buffers
            .get(&buffer)
            .ok_or_else(|| BackendError::Native(format!("unknown buffer {buffer:?}")))?;
        let range = byte_range(bytes.len(), offset, size)?;
        Ok(bytes[range].to_vec())
    }

    fn create_graphics_pipeline(
        &self,
        descriptor: &PipelineDescriptor<'_>,
    ) -> Result<PipelineHandle, BackendError> {
        let mut state = self.state.lock();
        state.check_creation("graphics pipeline")?;
        if !state.pipeline_layouts.contains_key(&descriptor.layout) {
            return Err(BackendError::Native(format!(
                "unknown pipeline layout {:?}",
                descriptor.layout
            )));
        }
        let handle = PipelineHandle(self.next());
        log::trace!(
            "DummyBackend: creating pipeline {:?} ({} stages)",
            descriptor.label,
            descriptor.stages.len()
        );
        state.stats.pipelines_created += 1;
        Ok(handle)
    }

    fn destroy_pipeline(&self, _pipeline: PipelineHandle) {
        self.state.lock().stats.pipelines_destroyed += 1;
    }
}

/// A command captured by a [`CommandLog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCommand {
    /// `bind_pipeline`.
    BindPipeline(PipelineHandle),
    /// `bind_descriptor_sets`.
    BindDescriptorSets {
        /// Pipeline layout.
        layout: PipelineLayoutHandle,
        /// First set index.
        first_set: u32,
        /// Bound sets.
        sets: Vec<DescriptorSetHandle>,
        /// Dynamic offsets.
        dynamic_offsets: Vec<u32>,
    },
    /// `push_constants`.
    PushConstants {
        /// Pipeline layout.
        layout: PipelineLayoutHandle,
        /// Stage visibility.
        stages: ShaderStageFlags,
        /// Byte offset.
        offset: u32,
        /// Pushed bytes.
        data: Vec<u8>,
    },
}

/// A [`CommandRecorder`] that stores commands for inspection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLog {
    /// Commands in recording order.
    pub commands: Vec<RecordedCommand>,
}

impl CommandLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove all recorded commands.
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Number of recorded commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl CommandRecorder for CommandLog {
    fn bind_pipeline(&mut self, pipeline: PipelineHandle) {
        self.commands.push(RecordedCommand::BindPipeline(pipeline));
    }

    fn bind_descriptor_sets(
        &mut self,
        layout: PipelineLayoutHandle,
        first_set: u32,
        sets: &[DescriptorSetHandle],
        dynamic_offsets: &[u32],
    ) {
        self.commands.push(RecordedCommand::BindDescriptorSets {
            layout,
            first_set,
            sets: sets.to_vec(),
            dynamic_offsets: dynamic_offsets.to_vec(),
        });
    }

    fn push_constants(
        &mut self,
        layout: PipelineLayoutHandle,
        stages: ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        self.commands.push(RecordedCommand::PushConstants {
            layout,
            stages,
            offset,
            data: data.to_vec(),
        });
    }
}
