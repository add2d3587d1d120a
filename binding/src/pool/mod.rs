//! Growable descriptor pool allocator.
//!
//! The allocator keeps one active pool, a list of pools known to be full
//! ("used") and a list of empty pools ready for reuse ("free"). Released sets
//! go to a per-layout [`FreeSetRegistry`] and are handed out again without a
//! driver call.
//!
//! Capacity is never tracked by counting: a pool is considered full only when
//! the driver reports `OutOfPoolMemory` or `FragmentedPool`. The active pool
//! stays active until that happens; it is then moved to the used list and the
//! allocation is retried once on another pool.

mod free_sets;

pub use free_sets::FreeSetRegistry;

use std::sync::Arc;

use crate::backend::GpuBackend;
use crate::config::DescriptorPoolConfig;
use crate::error::BindingError;
use crate::types::{DescriptorPoolHandle, DescriptorSetHandle, DescriptorSetLayoutHandle};

/// Allocates descriptor sets from a growing set of pools.
pub struct DescriptorPoolAllocator {
    backend: Arc<dyn GpuBackend>,
    config: DescriptorPoolConfig,
    active: Option<DescriptorPoolHandle>,
    used: Vec<DescriptorPoolHandle>,
    free: Vec<DescriptorPoolHandle>,
    free_sets: FreeSetRegistry,
    pools_created: u32,
}

impl DescriptorPoolAllocator {
    /// Create an allocator; no pool is created until the first allocation.
    pub fn new(backend: Arc<dyn GpuBackend>, config: DescriptorPoolConfig) -> Self {
        Self {
            backend,
            config,
            active: None,
            used: Vec::new(),
            free: Vec::new(),
            free_sets: FreeSetRegistry::new(),
            pools_created: 0,
        }
    }

    /// Allocate a set of `layout`.
    ///
    /// A previously released set of the same layout is reused first. Otherwise
    /// the set comes from the active pool; if that pool is exhausted it is
    /// demoted and the allocation is retried once on another pool. A second
    /// failure is fatal.
    pub fn allocate(
        &mut self,
        layout: DescriptorSetLayoutHandle,
    ) -> Result<DescriptorSetHandle, BindingError> {
        crate::profile_function!();

        if let Some(set) = self.free_sets.pop(layout) {
            log::trace!("Reusing released descriptor set {set:?} for layout {layout:?}");
            return Ok(set);
        }

        let pool = self.active_pool()?;
        match self.backend.allocate_descriptor_set(pool, layout) {
            Ok(set) => Ok(set),
            Err(e) if e.is_pool_exhausted() => {
                log::debug!("Descriptor pool {pool:?} exhausted ({e}), retrying with another pool");
                self.active = None;
                self.used.push(pool);

                let retry_pool = self.active_pool()?;
                self.backend
                    .allocate_descriptor_set(retry_pool, layout)
                    .map_err(|e| {
                        log::error!("Descriptor set allocation failed after retry: {e}");
                        BindingError::creation("descriptor set", e)
                    })
            }
            Err(e) => {
                log::error!("Descriptor set allocation failed: {e}");
                Err(BindingError::creation("descriptor set", e))
            }
        }
    }

    /// Release `set` for reuse by later allocations of `layout`.
    pub fn free(&mut self, layout: DescriptorSetLayoutHandle, set: DescriptorSetHandle) {
        self.free_sets.push(layout, set);
    }

    /// Reset every pool that handed out sets and move it to the free list.
    ///
    /// Every set previously returned by this allocator becomes invalid.
    pub fn reset_pools(&mut self) -> Result<(), BindingError> {
        crate::profile_function!();

        let pools: Vec<DescriptorPoolHandle> =
            self.active.take().into_iter().chain(self.used.drain(..)).collect();
        let mut result = Ok(());

        for pool in pools {
            match self.backend.reset_descriptor_pool(pool) {
                Ok(()) => self.free.push(pool),
                Err(e) => {
                    log::error!("Failed to reset descriptor pool {pool:?}: {e}");
                    if result.is_ok() {
                        result = Err(BindingError::creation("descriptor pool reset", e));
                    }
                    self.used.push(pool);
                }
            }
        }

        self.free_sets.clear();
        log::debug!("Reset descriptor pools, {} now free", self.free.len());
        result
    }

    /// Total number of pools owned.
    pub fn pool_count(&self) -> usize {
        usize::from(self.active.is_some()) + self.used.len() + self.free.len()
    }

    /// Number of pools known to be exhausted.
    pub fn used_pool_count(&self) -> usize {
        self.used.len()
    }

    /// Number of empty pools waiting for reuse.
    pub fn free_pool_count(&self) -> usize {
        self.free.len()
    }

    /// Number of released sets waiting for reuse by `layout`.
    pub fn released_set_count(&self, layout: DescriptorSetLayoutHandle) -> usize {
        self.free_sets.count(layout)
    }

    /// The pool sizing policy.
    pub fn config(&self) -> &DescriptorPoolConfig {
        &self.config
    }

    fn active_pool(&mut self) -> Result<DescriptorPoolHandle, BindingError> {
        if let Some(pool) = self.active {
            return Ok(pool);
        }
        let pool = match self.free.pop() {
            Some(pool) => pool,
            None => self.create_pool()?,
        };
        self.active = Some(pool);
        Ok(pool)
    }

    fn create_pool(&mut self) -> Result<DescriptorPoolHandle, BindingError> {
        let capacity = self.config.capacity_for(self.pools_created);
        let sizes = self.config.pool_sizes(capacity);
        let pool = self
            .backend
            .create_descriptor_pool(capacity, &sizes)
            .map_err(|e| {
                log::error!("Failed to create descriptor pool: {e}");
                BindingError::creation("descriptor pool", e)
            })?;

        self.pools_created += 1;
        log::info!(
            "Created descriptor pool #{} with capacity for {} sets",
            self.pools_created,
            capacity
        );
        crate::profile_plot!("descriptor_pools", self.pools_created);
        Ok(pool)
    }
}

impl std::fmt::Debug for DescriptorPoolAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorPoolAllocator")
            .field("active", &self.active)
            .field("used", &self.used.len())
            .field("free", &self.free.len())
            .field("released_sets", &self.free_sets.total())
            .finish()
    }
}

impl Drop for DescriptorPoolAllocator {
    fn drop(&mut self) {
        let pools = self.active.take().into_iter().chain(self.used.drain(..)).chain(self.free.drain(..));
        for pool in pools {
            self.backend.destroy_descriptor_pool(pool);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use crate::reflection::{DescriptorKind, LayoutBindingKey, ShaderStageFlags};

    fn setup(initial_sets: u32) -> (Arc<DummyBackend>, DescriptorPoolAllocator, DescriptorSetLayoutHandle) {
        let backend = Arc::new(DummyBackend::new());
        let layout = backend
            .create_descriptor_set_layout(&[LayoutBindingKey {
                binding: 0,
                kind: DescriptorKind::UniformBufferDynamic,
                count: 1,
                stages: ShaderStageFlags::FRAGMENT,
            }])
            .unwrap();
        let config = DescriptorPoolConfig::default().with_initial_sets(initial_sets);
        let allocator = DescriptorPoolAllocator::new(backend.clone(), config);
        (backend, allocator, layout)
    }

    #[test]
    fn test_first_allocation_creates_pool() {
        let (backend, mut allocator, layout) = setup(4);
        assert_eq!(allocator.pool_count(), 0);

        allocator.allocate(layout).unwrap();
        assert_eq!(allocator.pool_count(), 1);
        assert_eq!(backend.stats().pool_capacities, vec![4]);
    }

    #[test]
    fn test_pools_grow_by_factor() {
        let (backend, mut allocator, layout) = setup(4);

        // 4 + 6 fill the first two pools, the 11th set needs a third.
        for _ in 0..11 {
            allocator.allocate(layout).unwrap();
        }

        let stats = backend.stats();
        assert_eq!(stats.pool_capacities, vec![4, 6, 9]);
        assert_eq!(stats.set_allocations, 13);
        assert_eq!(allocator.used_pool_count(), 2);
    }

    #[test]
    fn test_free_then_allocate_reuses_without_driver_call() {
        let (backend, mut allocator, layout) = setup(4);
        let set = allocator.allocate(layout).unwrap();
        let calls = backend.stats().set_allocations;

        allocator.free(layout, set);
        assert_eq!(allocator.released_set_count(layout), 1);
        let again = allocator.allocate(layout).unwrap();

        assert_eq!(again, set);
        assert_eq!(backend.stats().set_allocations, calls);
    }

    #[test]
    fn test_reset_moves_pools_to_free_list() {
        let (backend, mut allocator, layout) = setup(2);
        for _ in 0..3 {
            allocator.allocate(layout).unwrap();
        }
        let set = allocator.allocate(layout).unwrap();
        allocator.free(layout, set);
        assert_eq!(allocator.pool_count(), 2);

        allocator.reset_pools().unwrap();
        assert_eq!(allocator.free_pool_count(), 2);
        assert_eq!(allocator.used_pool_count(), 0);
        assert_eq!(allocator.released_set_count(layout), 0);
        assert_eq!(backend.stats().pool_resets, 2);

        // Reset pools are reused before any new pool is created.
        for _ in 0..2 {
            allocator.allocate(layout).unwrap();
        }
        assert_eq!(backend.stats().pools_created(), 2);
    }

    #[test]
    fn test_second_failure_is_fatal() {
        let (backend, mut allocator, layout) = setup(4);
        backend.set_pool_exhaustion(true);

        let err = allocator.allocate(layout).unwrap_err();
        assert!(matches!(err, BindingError::CreationFailed(_)));
        assert_eq!(backend.stats().set_allocations, 2);
        assert_eq!(backend.stats().pools_created(), 2);
    }

    #[test]
    fn test_pool_creation_failure_is_fatal() {
        let (backend, mut allocator, layout) = setup(4);
        backend.set_creation_failure(true);
        assert!(matches!(
            allocator.allocate(layout),
            Err(BindingError::CreationFailed(_))
        ));
    }

    #[test]
    fn test_drop_destroys_every_pool() {
        let (backend, mut allocator, layout) = setup(1);
        for _ in 0..3 {
            allocator.allocate(layout).unwrap();
        }
        drop(allocator);

        let stats = backend.stats();
        assert_eq!(stats.pools_created(), 3);
        assert_eq!(stats.pools_destroyed, 3);
    }
}
