//! Deduplicating caches for native layout objects.
//!
//! Both caches create native objects lazily on first request and keep them
//! until the cache is dropped; entries are never evicted individually. Each
//! cache destroys every handle it created exactly once when dropped.

mod pipeline_layout;
mod set_layout;

pub use pipeline_layout::{PipelineLayoutCache, PipelineLayoutKey};
pub use set_layout::DescriptorSetLayoutCache;
