//! Pipeline layout cache.

use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::GpuBackend;
use crate::error::BindingError;
use crate::reflection::{PushConstantKey, PushConstantRange};
use crate::types::{DescriptorSetLayoutHandle, PipelineLayoutHandle};

/// Identity of a pipeline layout.
///
/// Set layouts keep their order (position is the set index); push-constant
/// ranges are sorted by offset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineLayoutKey {
    /// Set layouts, indexed by set.
    pub set_layouts: Vec<DescriptorSetLayoutHandle>,
    /// Push-constant ranges in offset order.
    pub push_constants: Vec<PushConstantKey>,
}

impl PipelineLayoutKey {
    /// Build a key, sorting the push-constant ranges.
    pub fn new(
        set_layouts: &[DescriptorSetLayoutHandle],
        mut push_constants: Vec<PushConstantKey>,
    ) -> Self {
        push_constants.sort_unstable();
        Self {
            set_layouts: set_layouts.to_vec(),
            push_constants,
        }
    }
}

/// Deduplicates pipeline layouts by (ordered set layouts, push-constant ranges).
pub struct PipelineLayoutCache {
    backend: Arc<dyn GpuBackend>,
    layouts: HashMap<PipelineLayoutKey, PipelineLayoutHandle>,
}

impl PipelineLayoutCache {
    /// Create an empty cache.
    pub fn new(backend: Arc<dyn GpuBackend>) -> Self {
        Self {
            backend,
            layouts: HashMap::new(),
        }
    }

    /// Get or create the pipeline layout for `set_layouts` and `push_constants`.
    pub fn acquire(
        &mut self,
        set_layouts: &[DescriptorSetLayoutHandle],
        push_constants: &[PushConstantRange],
    ) -> Result<PipelineLayoutHandle, BindingError> {
        let ranges = push_constants.iter().map(PushConstantRange::key).collect();
        self.acquire_key(PipelineLayoutKey::new(set_layouts, ranges))
    }

    /// Get or create the pipeline layout for a prepared key.
    pub fn acquire_key(
        &mut self,
        key: PipelineLayoutKey,
    ) -> Result<PipelineLayoutHandle, BindingError> {
        crate::profile_scope!("acquire_pipeline_layout");

        if let Some(&handle) = self.layouts.get(&key) {
            log::trace!("Pipeline layout cache hit: {handle:?}");
            return Ok(handle);
        }

        let handle = self
            .backend
            .create_pipeline_layout(&key.set_layouts, &key.push_constants)
            .map_err(|e| {
                log::error!("Failed to create pipeline layout: {e}");
                BindingError::creation("pipeline layout", e)
            })?;
        log::debug!(
            "Created pipeline layout {:?} ({} sets, {} push-constant ranges)",
            handle,
            key.set_layouts.len(),
            key.push_constants.len()
        );
        self.layouts.insert(key, handle);
        Ok(handle)
    }

    /// Number of cached pipeline layouts.
    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    /// Whether the cache holds no pipeline layouts.
    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
}

impl std::fmt::Debug for PipelineLayoutCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineLayoutCache")
            .field("backend", &self.backend.name())
            .field("layouts", &self.layouts.len())
            .finish()
    }
}

impl Drop for PipelineLayoutCache {
    fn drop(&mut self) {
        log::debug!("Destroying {} cached pipeline layouts", self.layouts.len());
        for (_, handle) in self.layouts.drain() {
            self.backend.destroy_pipeline_layout(handle);
        }
    }
}
