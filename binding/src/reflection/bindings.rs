//! Binding slot definitions produced by reflection aggregation.
//!
//! A [`BindingSlot`] describes one resource slot a pipeline expects, a
//! [`DescriptorSetDescription`] groups the slots of one set index, and a
//! [`PushConstantRange`] describes one push-constant block. Slots carry the
//! flattened member map of their block (if any) so materials can address
//! individual uniform members by dotted name.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

/// Type of resource that can be bound to a descriptor slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DescriptorKind {
    /// Standalone sampler.
    Sampler,
    /// Combined image and sampler.
    CombinedImageSampler,
    /// Sampled image without a sampler.
    SampledImage,
    /// Storage image (read-write).
    StorageImage,
    /// Uniform buffer (read-only, small, frequently updated).
    UniformBuffer,
    /// Uniform buffer whose base address is offset at bind time.
    UniformBufferDynamic,
    /// Storage buffer (read-write, larger data).
    StorageBuffer,
    /// Storage buffer whose base address is offset at bind time.
    StorageBufferDynamic,
    /// Subpass input attachment.
    InputAttachment,
}

impl DescriptorKind {
    /// All descriptor kinds, in declaration order.
    pub const ALL: [DescriptorKind; 9] = [
        Self::Sampler,
        Self::CombinedImageSampler,
        Self::SampledImage,
        Self::StorageImage,
        Self::UniformBuffer,
        Self::UniformBufferDynamic,
        Self::StorageBuffer,
        Self::StorageBufferDynamic,
        Self::InputAttachment,
    ];

    /// Whether the binding is backed by a buffer with a member layout.
    pub fn is_buffer(self) -> bool {
        matches!(
            self,
            Self::UniformBuffer
                | Self::UniformBufferDynamic
                | Self::StorageBuffer
                | Self::StorageBufferDynamic
        )
    }

    /// Whether the binding references an image and/or sampler.
    pub fn is_image(self) -> bool {
        matches!(
            self,
            Self::Sampler | Self::CombinedImageSampler | Self::SampledImage | Self::StorageImage
        )
    }

    /// Whether the binding takes a dynamic offset at bind time.
    pub fn is_dynamic(self) -> bool {
        matches!(self, Self::UniformBufferDynamic | Self::StorageBufferDynamic)
    }

    /// The dynamic counterpart of a buffer kind; other kinds are unchanged.
    pub fn to_dynamic(self) -> Self {
        match self {
            Self::UniformBuffer => Self::UniformBufferDynamic,
            Self::StorageBuffer => Self::StorageBufferDynamic,
            other => other,
        }
    }
}

bitflags::bitflags! {
    /// Shader stages that can access a binding or push-constant range.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct ShaderStageFlags: u32 {
        /// Vertex shader stage.
        const VERTEX = 1 << 0;
        /// Fragment shader stage.
        const FRAGMENT = 1 << 1;
        /// Compute shader stage.
        const COMPUTE = 1 << 2;
        /// Geometry shader stage.
        const GEOMETRY = 1 << 3;
    }
}

/// A single shader stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex shader.
    Vertex,
    /// Fragment shader.
    Fragment,
    /// Compute shader.
    Compute,
    /// Geometry shader.
    Geometry,
}

impl ShaderStage {
    /// The visibility flag for this stage.
    pub fn flag(self) -> ShaderStageFlags {
        match self {
            Self::Vertex => ShaderStageFlags::VERTEX,
            Self::Fragment => ShaderStageFlags::FRAGMENT,
            Self::Compute => ShaderStageFlags::COMPUTE,
            Self::Geometry => ShaderStageFlags::GEOMETRY,
        }
    }
}

/// Numeric shape of a parameterizable block member.
///
/// Only float scalars/vectors and 4x4 float matrices can be written through
/// the material API; other shapes are dropped during flattening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericShape {
    /// Single 32-bit float.
    Float,
    /// Two-component float vector.
    Vec2,
    /// Three-component float vector.
    Vec3,
    /// Four-component float vector.
    Vec4,
    /// Column-major 4x4 float matrix.
    Mat4,
}

impl NumericShape {
    /// Tightly packed byte size of the shape.
    pub fn byte_size(self) -> u32 {
        match self {
            Self::Float => 4,
            Self::Vec2 => 8,
            Self::Vec3 => 12,
            Self::Vec4 => 16,
            Self::Mat4 => 64,
        }
    }

    /// Shape of a float vector with the given component count.
    pub fn from_components(components: u32) -> Option<Self> {
        match components {
            1 => Some(Self::Float),
            2 => Some(Self::Vec2),
            3 => Some(Self::Vec3),
            4 => Some(Self::Vec4),
            _ => None,
        }
    }
}

/// A flattened block member: absolute byte offset, size and shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemberInfo {
    /// Byte offset from the start of the block.
    pub offset: u32,
    /// Byte size of the member.
    pub size: u32,
    /// Numeric shape of the member.
    pub shape: NumericShape,
}

impl MemberInfo {
    /// Create a member description.
    pub fn new(offset: u32, size: u32, shape: NumericShape) -> Self {
        Self {
            offset,
            size,
            shape,
        }
    }

    /// End offset (offset + size).
    pub fn end(&self) -> u32 {
        self.offset + self.size
    }
}

/// Flattened member map of one block, keyed by dotted path.
pub type MemberMap = BTreeMap<String, MemberInfo>;

/// Describes a single binding slot of a descriptor set.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingSlot {
    /// Descriptor set index.
    pub set: u32,

    /// Binding index within the set.
    pub binding: u32,

    /// Name of the resource (block name for buffers, variable name otherwise).
    pub name: String,

    /// Type of resource expected at this binding.
    pub kind: DescriptorKind,

    /// Number of array elements (1 for non-arrays).
    pub count: u32,

    /// Shader stages that can access this binding.
    pub stages: ShaderStageFlags,

    /// Byte size of the block (0 for non-buffer bindings).
    pub size: u32,

    /// Flattened block members (empty for non-buffer bindings).
    pub members: MemberMap,
}

impl BindingSlot {
    /// Create a new binding slot visible to no stage yet.
    pub fn new(set: u32, binding: u32, kind: DescriptorKind) -> Self {
        Self {
            set,
            binding,
            name: String::new(),
            kind,
            count: 1,
            stages: ShaderStageFlags::empty(),
            size: 0,
            members: MemberMap::new(),
        }
    }

    /// Set the resource name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the array element count.
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    /// Set the shader stage visibility.
    pub fn with_stages(mut self, stages: ShaderStageFlags) -> Self {
        self.stages = stages;
        self
    }

    /// Set the block byte size.
    pub fn with_size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    /// Add a flattened member.
    pub fn with_member(mut self, name: impl Into<String>, member: MemberInfo) -> Self {
        self.members.insert(name.into(), member);
        self
    }

    /// The part of the slot that identifies a native layout binding.
    pub fn layout_key(&self) -> LayoutBindingKey {
        LayoutBindingKey {
            binding: self.binding,
            kind: self.kind,
            count: self.count,
            stages: self.stages,
        }
    }
}

/// Canonical identity of one layout binding.
///
/// Names, sizes and members do not affect the native layout object and are
/// left out. Stage visibility is part of the key: two layouts that differ
/// only in stage flags are distinct native objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayoutBindingKey {
    /// Binding index within the set.
    pub binding: u32,
    /// Resource kind.
    pub kind: DescriptorKind,
    /// Array element count.
    pub count: u32,
    /// Stage visibility.
    pub stages: ShaderStageFlags,
}

/// Compute the canonical layout signature of a list of bindings.
///
/// The result is sorted by binding index, so discovery order never matters.
pub fn canonical_signature(bindings: &[BindingSlot]) -> Vec<LayoutBindingKey> {
    let mut keys: Vec<LayoutBindingKey> = bindings.iter().map(BindingSlot::layout_key).collect();
    keys.sort_unstable();
    keys
}

/// All bindings of one descriptor set, kept sorted by binding index.
#[derive(Debug, Clone, Default)]
pub struct DescriptorSetDescription {
    /// Set index.
    pub set: u32,
    bindings: Vec<BindingSlot>,
}

impl DescriptorSetDescription {
    /// Create an empty set description.
    pub fn new(set: u32) -> Self {
        Self {
            set,
            bindings: Vec::new(),
        }
    }

    /// Create a set description from bindings in any order.
    pub fn from_bindings(set: u32, mut bindings: Vec<BindingSlot>) -> Self {
        bindings.sort_by_key(|slot| slot.binding);
        Self { set, bindings }
    }

    /// Bindings in ascending binding order.
    pub fn bindings(&self) -> &[BindingSlot] {
        &self.bindings
    }

    /// Mutable access to the bindings. Binding indices must not be changed.
    pub fn bindings_mut(&mut self) -> impl Iterator<Item = &mut BindingSlot> {
        self.bindings.iter_mut()
    }

    /// Look up a binding by index.
    pub fn binding(&self, binding: u32) -> Option<&BindingSlot> {
        self.bindings
            .binary_search_by_key(&binding, |slot| slot.binding)
            .ok()
            .map(|index| &self.bindings[index])
    }

    /// Look up a binding by index (mutable).
    pub fn binding_mut(&mut self, binding: u32) -> Option<&mut BindingSlot> {
        match self
            .bindings
            .binary_search_by_key(&binding, |slot| slot.binding)
        {
            Ok(index) => Some(&mut self.bindings[index]),
            Err(_) => None,
        }
    }

    /// Insert a binding, keeping canonical order.
    ///
    /// Returns the previous slot if the binding index was already present.
    pub fn insert(&mut self, slot: BindingSlot) -> Option<BindingSlot> {
        match self
            .bindings
            .binary_search_by_key(&slot.binding, |existing| existing.binding)
        {
            Ok(index) => Some(std::mem::replace(&mut self.bindings[index], slot)),
            Err(index) => {
                self.bindings.insert(index, slot);
                None
            }
        }
    }

    /// Canonical layout signature of this set.
    pub fn signature(&self) -> Vec<LayoutBindingKey> {
        canonical_signature(&self.bindings)
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether the set has no bindings.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl PartialEq for DescriptorSetDescription {
    fn eq(&self, other: &Self) -> bool {
        self.set == other.set && self.signature() == other.signature()
    }
}

impl Eq for DescriptorSetDescription {}

impl Hash for DescriptorSetDescription {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.set.hash(state);
        self.signature().hash(state);
    }
}

/// A push-constant block visible to one or more stages.
#[derive(Debug, Clone, PartialEq)]
pub struct PushConstantRange {
    /// Stages that read the range.
    pub stages: ShaderStageFlags,
    /// Byte offset of the range.
    pub offset: u32,
    /// Byte size of the range.
    pub size: u32,
    /// Flattened members of the block.
    pub members: MemberMap,
}

impl PushConstantRange {
    /// Create a range with no members.
    pub fn new(stages: ShaderStageFlags, offset: u32, size: u32) -> Self {
        Self {
            stages,
            offset,
            size,
            members: MemberMap::new(),
        }
    }

    /// Whether the range covers exactly `offset..offset + size`.
    pub fn matches(&self, offset: u32, size: u32) -> bool {
        self.offset == offset && self.size == size
    }

    /// The part of the range that identifies it in a native pipeline layout.
    pub fn key(&self) -> PushConstantKey {
        PushConstantKey {
            offset: self.offset,
            size: self.size,
            stages: self.stages,
        }
    }
}

/// Canonical identity of one push-constant range.
///
/// Ordered by offset first so a sorted list follows byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PushConstantKey {
    /// Byte offset of the range.
    pub offset: u32,
    /// Byte size of the range.
    pub size: u32,
    /// Stages that read the range.
    pub stages: ShaderStageFlags,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_slot_builder() {
        let slot = BindingSlot::new(1, 0, DescriptorKind::UniformBuffer)
            .with_name("Material")
            .with_stages(ShaderStageFlags::FRAGMENT)
            .with_size(12)
            .with_member("Material.tint_r", MemberInfo::new(0, 4, NumericShape::Float));

        assert_eq!(slot.name, "Material");
        assert_eq!(slot.count, 1);
        assert_eq!(slot.members.len(), 1);
        assert!(!slot.stages.contains(ShaderStageFlags::VERTEX));
    }

    #[test]
    fn test_description_is_sorted_by_binding() {
        let mut desc = DescriptorSetDescription::new(1);
        desc.insert(BindingSlot::new(1, 3, DescriptorKind::Sampler));
        desc.insert(BindingSlot::new(1, 0, DescriptorKind::UniformBuffer));
        desc.insert(BindingSlot::new(1, 1, DescriptorKind::CombinedImageSampler));

        let order: Vec<u32> = desc.bindings().iter().map(|b| b.binding).collect();
        assert_eq!(order, vec![0, 1, 3]);
        assert_eq!(desc.binding(1).map(|b| b.kind), Some(DescriptorKind::CombinedImageSampler));
        assert!(desc.binding(2).is_none());
    }

    #[test]
    fn test_description_equality_ignores_discovery_order() {
        let a = DescriptorSetDescription::from_bindings(
            0,
            vec![
                BindingSlot::new(0, 0, DescriptorKind::UniformBuffer),
                BindingSlot::new(0, 2, DescriptorKind::SampledImage),
            ],
        );
        let b = DescriptorSetDescription::from_bindings(
            0,
            vec![
                BindingSlot::new(0, 2, DescriptorKind::SampledImage),
                BindingSlot::new(0, 0, DescriptorKind::UniformBuffer),
            ],
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_signature_includes_stage_flags() {
        let vertex = [BindingSlot::new(0, 0, DescriptorKind::UniformBuffer)
            .with_stages(ShaderStageFlags::VERTEX)];
        let fragment = [BindingSlot::new(0, 0, DescriptorKind::UniformBuffer)
            .with_stages(ShaderStageFlags::FRAGMENT)];
        assert_ne!(canonical_signature(&vertex), canonical_signature(&fragment));
    }

    #[test]
    fn test_kind_to_dynamic() {
        assert_eq!(
            DescriptorKind::UniformBuffer.to_dynamic(),
            DescriptorKind::UniformBufferDynamic
        );
        assert_eq!(
            DescriptorKind::CombinedImageSampler.to_dynamic(),
            DescriptorKind::CombinedImageSampler
        );
        assert!(DescriptorKind::UniformBufferDynamic.is_dynamic());
        assert!(DescriptorKind::SampledImage.is_image());
    }
}
