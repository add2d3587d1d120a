//! Descriptor set layout cache.

use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::GpuBackend;
use crate::error::BindingError;
use crate::reflection::{
    BindingSlot, DescriptorSetDescription, LayoutBindingKey, canonical_signature,
};
use crate::types::DescriptorSetLayoutHandle;

/// Deduplicates descriptor set layouts by canonical binding signature.
///
/// Bindings are sorted by index before lookup, so the order in which they were
/// discovered never affects cache hits. Stage visibility is part of the
/// signature.
pub struct DescriptorSetLayoutCache {
    backend: Arc<dyn GpuBackend>,
    layouts: HashMap<Vec<LayoutBindingKey>, DescriptorSetLayoutHandle>,
}

impl DescriptorSetLayoutCache {
    /// Create an empty cache.
    pub fn new(backend: Arc<dyn GpuBackend>) -> Self {
        Self {
            backend,
            layouts: HashMap::new(),
        }
    }

    /// Get or create the layout for `bindings` (any order).
    pub fn acquire(
        &mut self,
        bindings: &[BindingSlot],
    ) -> Result<DescriptorSetLayoutHandle, BindingError> {
        self.acquire_signature(canonical_signature(bindings))
    }

    /// Get or create the layout for a set description.
    pub fn acquire_description(
        &mut self,
        description: &DescriptorSetDescription,
    ) -> Result<DescriptorSetLayoutHandle, BindingError> {
        self.acquire_signature(description.signature())
    }

    /// Get or create the layout with no bindings, used to fill unused set indices.
    pub fn acquire_empty(&mut self) -> Result<DescriptorSetLayoutHandle, BindingError> {
        self.acquire_signature(Vec::new())
    }

    /// Get or create the layout for a signature, sorting it first.
    pub fn acquire_signature(
        &mut self,
        mut signature: Vec<LayoutBindingKey>,
    ) -> Result<DescriptorSetLayoutHandle, BindingError> {
        crate::profile_scope!("acquire_descriptor_set_layout");

        signature.sort_unstable();
        if let Some(duplicate) = signature
            .windows(2)
            .find(|pair| pair[0].binding == pair[1].binding)
        {
            return Err(BindingError::InvalidParameter(format!(
                "binding {} declared twice in one descriptor set",
                duplicate[0].binding
            )));
        }

        if let Some(&handle) = self.layouts.get(&signature) {
            log::trace!("Set layout cache hit: {handle:?}");
            return Ok(handle);
        }

        let handle = self
            .backend
            .create_descriptor_set_layout(&signature)
            .map_err(|e| {
                log::error!("Failed to create descriptor set layout: {e}");
                BindingError::creation("descriptor set layout", e)
            })?;
        log::debug!(
            "Created descriptor set layout {:?} with {} bindings",
            handle,
            signature.len()
        );
        self.layouts.insert(signature, handle);
        Ok(handle)
    }

    /// Number of cached layouts.
    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    /// Whether the cache holds no layouts.
    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
}

impl std::fmt::Debug for DescriptorSetLayoutCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorSetLayoutCache")
            .field("backend", &self.backend.name())
            .field("layouts", &self.layouts.len())
            .finish()
    }
}

impl Drop for DescriptorSetLayoutCache {
    fn drop(&mut self) {
        log::debug!("Destroying {} cached descriptor set layouts", self.layouts.len());
        for (_, handle) in self.layouts.drain() {
            self.backend.destroy_descriptor_set_layout(handle);
        }
    }
}
