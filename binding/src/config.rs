//! Configuration for descriptor pools and the binding device.

use crate::backend::PoolSize;
use crate::error::BindingError;
use crate::reflection::DescriptorKind;

/// Maximum number of frames that can be in flight simultaneously.
pub const DEFAULT_FRAMES_IN_FLIGHT: u32 = 3;

/// Set index reserved for material data (0 is per-frame, 2 is per-draw).
pub const DEFAULT_MATERIAL_SET_INDEX: u32 = 1;

/// How many descriptors of one kind a pool reserves per set.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolSizeRatio {
    /// Descriptor kind.
    pub kind: DescriptorKind,
    /// Descriptors per set.
    pub ratio: f32,
}

impl PoolSizeRatio {
    /// Create a ratio entry.
    pub const fn new(kind: DescriptorKind, ratio: f32) -> Self {
        Self { kind, ratio }
    }
}

/// Sizing policy for a [`DescriptorPoolAllocator`](crate::pool::DescriptorPoolAllocator).
///
/// The `n`-th pool created (0-based) holds
/// `min(floor(initial_sets * growth_factor^n), max_sets_per_pool)` sets.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DescriptorPoolConfig {
    /// Capacity of the first pool, in sets.
    pub initial_sets: u32,
    /// Capacity multiplier applied for every additional pool.
    pub growth_factor: f32,
    /// Hard cap on the capacity of a single pool.
    pub max_sets_per_pool: u32,
    /// Descriptors reserved per set, by kind.
    pub ratios: Vec<PoolSizeRatio>,
}

impl Default for DescriptorPoolConfig {
    fn default() -> Self {
        Self {
            initial_sets: 64,
            growth_factor: 1.5,
            max_sets_per_pool: 4096,
            ratios: vec![
                PoolSizeRatio::new(DescriptorKind::Sampler, 0.5),
                PoolSizeRatio::new(DescriptorKind::CombinedImageSampler, 4.0),
                PoolSizeRatio::new(DescriptorKind::SampledImage, 4.0),
                PoolSizeRatio::new(DescriptorKind::StorageImage, 1.0),
                PoolSizeRatio::new(DescriptorKind::UniformBuffer, 2.0),
                PoolSizeRatio::new(DescriptorKind::StorageBuffer, 2.0),
                PoolSizeRatio::new(DescriptorKind::UniformBufferDynamic, 1.0),
                PoolSizeRatio::new(DescriptorKind::StorageBufferDynamic, 1.0),
                PoolSizeRatio::new(DescriptorKind::InputAttachment, 0.5),
            ],
        }
    }
}

impl DescriptorPoolConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the capacity of the first pool.
    pub fn with_initial_sets(mut self, sets: u32) -> Self {
        self.initial_sets = sets;
        self
    }

    /// Set the growth factor.
    pub fn with_growth_factor(mut self, factor: f32) -> Self {
        self.growth_factor = factor;
        self
    }

    /// Set the per-pool capacity cap.
    pub fn with_max_sets_per_pool(mut self, sets: u32) -> Self {
        self.max_sets_per_pool = sets;
        self
    }

    /// Set (or replace) the ratio for one descriptor kind.
    pub fn with_ratio(mut self, kind: DescriptorKind, ratio: f32) -> Self {
        match self.ratios.iter_mut().find(|r| r.kind == kind) {
            Some(existing) => existing.ratio = ratio,
            None => self.ratios.push(PoolSizeRatio::new(kind, ratio)),
        }
        self
    }

    /// Replace all ratios.
    pub fn with_ratios(mut self, ratios: Vec<PoolSizeRatio>) -> Self {
        self.ratios = ratios;
        self
    }

    /// Check the configuration for values no pool can be built from.
    pub fn validate(&self) -> Result<(), BindingError> {
        if self.initial_sets == 0 {
            return Err(BindingError::InvalidParameter(
                "initial_sets must be at least 1".to_string(),
            ));
        }
        if self.growth_factor.is_nan() || self.growth_factor < 1.0 {
            return Err(BindingError::InvalidParameter(format!(
                "growth_factor must be >= 1.0, got {}",
                self.growth_factor
            )));
        }
        if self.max_sets_per_pool < self.initial_sets {
            return Err(BindingError::InvalidParameter(format!(
                "max_sets_per_pool ({}) is smaller than initial_sets ({})",
                self.max_sets_per_pool, self.initial_sets
            )));
        }
        if let Some(bad) = self.ratios.iter().find(|r| r.ratio.is_nan() || r.ratio < 0.0) {
            return Err(BindingError::InvalidParameter(format!(
                "invalid pool ratio {} for {:?}",
                bad.ratio, bad.kind
            )));
        }
        Ok(())
    }

    /// Capacity, in sets, of the `pool_index`-th pool created (0-based).
    pub fn capacity_for(&self, pool_index: u32) -> u32 {
        let exponent = i32::try_from(pool_index).unwrap_or(i32::MAX);
        let grown = (self.initial_sets as f64 * (self.growth_factor as f64).powi(exponent)).floor();
        let capped = grown.min(self.max_sets_per_pool as f64);
        (capped as u32).max(1)
    }

    /// Descriptor counts to reserve for a pool holding `max_sets` sets.
    ///
    /// Kinds whose count rounds to zero are left out.
    pub fn pool_sizes(&self, max_sets: u32) -> Vec<PoolSize> {
        self.ratios
            .iter()
            .filter_map(|r| {
                let count = (r.ratio as f64 * max_sets as f64).ceil() as u32;
                (count > 0).then_some(PoolSize {
                    kind: r.kind,
                    count,
                })
            })
            .collect()
    }
}

/// Configuration of a [`BindingDevice`](crate::BindingDevice).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DeviceConfig {
    /// Number of frame slots each material instance rotates through.
    pub frames_in_flight: u32,
    /// Descriptor set index owned by materials.
    pub material_set_index: u32,
    /// Pool sizing for material descriptor allocators.
    pub pool: DescriptorPoolConfig,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
            material_set_index: DEFAULT_MATERIAL_SET_INDEX,
            pool: DescriptorPoolConfig::default(),
        }
    }
}

impl DeviceConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of frame slots.
    pub fn with_frames_in_flight(mut self, frames: u32) -> Self {
        self.frames_in_flight = frames;
        self
    }

    /// Set the material descriptor set index.
    pub fn with_material_set_index(mut self, index: u32) -> Self {
        self.material_set_index = index;
        self
    }

    /// Set the descriptor pool policy.
    pub fn with_pool(mut self, pool: DescriptorPoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Check the configuration.
    pub fn validate(&self) -> Result<(), BindingError> {
        if self.frames_in_flight == 0 {
            return Err(BindingError::InvalidParameter(
                "frames_in_flight must be at least 1".to_string(),
            ));
        }
        self.pool.validate()
    }
}
