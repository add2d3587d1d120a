//! Per-layout registry of released descriptor sets.

use std::collections::HashMap;

use crate::types::{DescriptorSetHandle, DescriptorSetLayoutHandle};

/// Released sets, keyed by the layout they were allocated with.
#[derive(Debug, Default)]
pub struct FreeSetRegistry {
    sets: HashMap<DescriptorSetLayoutHandle, Vec<DescriptorSetHandle>>,
}

impl FreeSetRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `set` available for reuse by `layout`.
    pub fn push(&mut self, layout: DescriptorSetLayoutHandle, set: DescriptorSetHandle) {
        self.sets.entry(layout).or_default().push(set);
    }

    /// Take the most recently released set of `layout`.
    pub fn pop(&mut self, layout: DescriptorSetLayoutHandle) -> Option<DescriptorSetHandle> {
        self.sets.get_mut(&layout)?.pop()
    }

    /// Number of released sets of `layout`.
    pub fn count(&self, layout: DescriptorSetLayoutHandle) -> usize {
        self.sets.get(&layout).map_or(0, Vec::len)
    }

    /// Number of released sets across all layouts.
    pub fn total(&self) -> usize {
        self.sets.values().map(Vec::len).sum()
    }

    /// Forget every released set.
    pub fn clear(&mut self) {
        self.sets.clear();
    }
}
