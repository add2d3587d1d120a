//! Merging per-stage reflection into one pipeline-wide description.

use std::collections::BTreeMap;

use super::bindings::{BindingSlot, DescriptorSetDescription, MemberMap, PushConstantRange};
use super::flatten::flatten_members;
use super::{MemberTree, ReflectedBinding, ReflectedPushConstant, StageReflection};
use crate::error::BindingError;

/// Merged reflection of every stage of a pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineReflection {
    /// One description per set index used by any stage.
    pub sets: BTreeMap<u32, DescriptorSetDescription>,
    /// Push-constant ranges, one per distinct (offset, size).
    pub push_constants: Vec<PushConstantRange>,
}

impl PipelineReflection {
    /// The description of set `index`, if any stage uses it.
    pub fn set(&self, index: u32) -> Option<&DescriptorSetDescription> {
        self.sets.get(&index)
    }

    /// Mutable description of set `index`.
    pub fn set_mut(&mut self, index: u32) -> Option<&mut DescriptorSetDescription> {
        self.sets.get_mut(&index)
    }

    /// Highest set index used, or `None` when no stage declares any binding.
    pub fn max_set_index(&self) -> Option<u32> {
        self.sets.keys().next_back().copied()
    }

    /// The push-constant range covering exactly `offset..offset + size`.
    pub fn push_constant(&self, offset: u32, size: u32) -> Option<&PushConstantRange> {
        self.push_constants.iter().find(|r| r.matches(offset, size))
    }
}

/// Incrementally merges [`StageReflection`]s.
///
/// Rules:
/// - a binding seen by several stages must agree on kind and array count,
///   otherwise [`BindingError::ReflectionConflict`] is returned
/// - agreeing bindings union their stage flags, keep the largest block size
///   and gain any members they were missing
/// - push-constant blocks with identical (offset, size) union their stages;
///   any other block becomes a separate range
#[derive(Debug, Default)]
pub struct ReflectionAggregator {
    reflection: PipelineReflection,
}

impl ReflectionAggregator {
    /// Create an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one stage.
    pub fn add_stage(&mut self, stage: &StageReflection) -> Result<(), BindingError> {
        for binding in &stage.bindings {
            self.add_binding(stage, binding)?;
        }
        for block in &stage.push_constants {
            self.add_push_constant(stage, block);
        }
        Ok(())
    }

    /// Finish aggregation.
    pub fn finish(self) -> PipelineReflection {
        self.reflection
    }

    fn add_binding(
        &mut self,
        stage: &StageReflection,
        reflected: &ReflectedBinding,
    ) -> Result<(), BindingError> {
        let flag = stage.stage.flag();
        let set = self
            .reflection
            .sets
            .entry(reflected.set)
            .or_insert_with(|| DescriptorSetDescription::new(reflected.set));

        if let Some(slot) = set.binding_mut(reflected.binding) {
            if slot.kind != reflected.kind || slot.count != reflected.count {
                log::error!(
                    "Stage {:?} redeclares set {} binding {} as {:?} x{} (was {:?} x{})",
                    stage.stage,
                    reflected.set,
                    reflected.binding,
                    reflected.kind,
                    reflected.count,
                    slot.kind,
                    slot.count
                );
                return Err(BindingError::ReflectionConflict {
                    set: reflected.set,
                    binding: reflected.binding,
                    stage: stage.stage,
                    expected: slot.kind,
                    expected_count: slot.count,
                    found: reflected.kind,
                    found_count: reflected.count,
                });
            }

            slot.stages |= flag;
            slot.size = slot.size.max(reflected.size);
            if slot.name.is_empty() {
                slot.name = reflected.name.clone();
            }
            if reflected.kind.is_buffer() {
                for (path, info) in block_members(&slot.name, &reflected.members) {
                    slot.members.entry(path).or_insert(info);
                }
            }
            return Ok(());
        }

        let mut slot = BindingSlot::new(reflected.set, reflected.binding, reflected.kind)
            .with_name(reflected.name.clone())
            .with_count(reflected.count)
            .with_stages(flag)
            .with_size(reflected.size);
        if reflected.kind.is_buffer() {
            slot.members = block_members(&reflected.name, &reflected.members);
        }
        log::trace!(
            "Reflected set {} binding {} '{}' as {:?} ({:?})",
            slot.set,
            slot.binding,
            slot.name,
            slot.kind,
            stage.stage
        );
        set.insert(slot);
        Ok(())
    }

    fn add_push_constant(&mut self, stage: &StageReflection, block: &ReflectedPushConstant) {
        let flag = stage.stage.flag();
        let members = block_members(&block.name, &block.members);

        if let Some(range) = self
            .reflection
            .push_constants
            .iter_mut()
            .find(|r| r.matches(block.offset, block.size))
        {
            range.stages |= flag;
            for (path, info) in members {
                range.members.entry(path).or_insert(info);
            }
            return;
        }

        let mut range = PushConstantRange::new(flag, block.offset, block.size);
        range.members = members;
        self.reflection.push_constants.push(range);
    }
}

/// Aggregate the given stages in order.
pub fn aggregate<'a>(
    stages: impl IntoIterator<Item = &'a StageReflection>,
) -> Result<PipelineReflection, BindingError> {
    let mut aggregator = ReflectionAggregator::new();
    for stage in stages {
        aggregator.add_stage(stage)?;
    }
    Ok(aggregator.finish())
}

fn block_members(block_name: &str, members: &[MemberTree]) -> MemberMap {
    let mut out = MemberMap::new();
    flatten_members(block_name, 0, members, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflection::{
        DescriptorKind, MemberTree, NumericShape, ShaderStage, ShaderStageFlags,
    };

    fn material_block() -> ReflectedBinding {
        ReflectedBinding::uniform_block(
            1,
            0,
            "Material",
            12,
            vec![
                MemberTree::float("tint_r", 0),
                MemberTree::float("tint_g", 4),
                MemberTree::float("tint_b", 8),
            ],
        )
    }

    #[test]
    fn test_single_stage() {
        let fragment = StageReflection::new(ShaderStage::Fragment)
            .with_binding(material_block())
            .with_binding(ReflectedBinding::combined_image_sampler(1, 1, "albedo"));

        let reflection = aggregate([&fragment]).unwrap();
        let set = reflection.set(1).unwrap();
        assert_eq!(set.len(), 2);

        let block = set.binding(0).unwrap();
        assert_eq!(block.kind, DescriptorKind::UniformBuffer);
        assert_eq!(block.size, 12);
        assert_eq!(block.stages, ShaderStageFlags::FRAGMENT);
        assert_eq!(block.members["Material.tint_b"].offset, 8);
        assert_eq!(block.members["Material.tint_b"].shape, NumericShape::Float);

        assert_eq!(set.binding(1).unwrap().name, "albedo");
        assert_eq!(reflection.max_set_index(), Some(1));
    }

    #[test]
    fn test_shared_binding_unions_stages() {
        let camera = ReflectedBinding::uniform_block(
            0,
            0,
            "Camera",
            64,
            vec![MemberTree::mat4("view_proj", 0)],
        );
        let vertex = StageReflection::new(ShaderStage::Vertex).with_binding(camera.clone());
        let fragment = StageReflection::new(ShaderStage::Fragment).with_binding(camera);

        let reflection = aggregate([&vertex, &fragment]).unwrap();
        let slot = reflection.set(0).unwrap().binding(0).unwrap();
        assert_eq!(slot.stages, ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT);
        assert_eq!(slot.members.len(), 1);
    }

    #[test]
    fn test_merge_keeps_larger_size_and_missing_members() {
        let vertex = StageReflection::new(ShaderStage::Vertex).with_binding(
            ReflectedBinding::uniform_block(0, 0, "Params", 16, vec![MemberTree::vector("a", 0, 4)]),
        );
        let fragment = StageReflection::new(ShaderStage::Fragment).with_binding(
            ReflectedBinding::uniform_block(
                0,
                0,
                "Params",
                32,
                vec![MemberTree::vector("a", 0, 4), MemberTree::vector("b", 16, 4)],
            ),
        );

        let reflection = aggregate([&vertex, &fragment]).unwrap();
        let slot = reflection.set(0).unwrap().binding(0).unwrap();
        assert_eq!(slot.size, 32);
        assert!(slot.members.contains_key("Params.a"));
        assert!(slot.members.contains_key("Params.b"));
    }

    #[test]
    fn test_kind_conflict_is_fatal() {
        let vertex = StageReflection::new(ShaderStage::Vertex)
            .with_binding(ReflectedBinding::uniform_block(0, 2, "Data", 16, Vec::new()));
        let fragment = StageReflection::new(ShaderStage::Fragment).with_binding(
            ReflectedBinding::new(0, 2, "data_tex", DescriptorKind::SampledImage),
        );

        let err = aggregate([&vertex, &fragment]).unwrap_err();
        assert_eq!(
            err,
            BindingError::ReflectionConflict {
                set: 0,
                binding: 2,
                stage: ShaderStage::Fragment,
                expected: DescriptorKind::UniformBuffer,
                expected_count: 1,
                found: DescriptorKind::SampledImage,
                found_count: 1,
            }
        );
    }

    #[test]
    fn test_count_conflict_is_fatal() {
        let vertex = StageReflection::new(ShaderStage::Vertex)
            .with_binding(ReflectedBinding::combined_image_sampler(0, 0, "tex").with_count(4));
        let fragment = StageReflection::new(ShaderStage::Fragment)
            .with_binding(ReflectedBinding::combined_image_sampler(0, 0, "tex").with_count(2));

        assert!(matches!(
            aggregate([&vertex, &fragment]),
            Err(BindingError::ReflectionConflict { .. })
        ));
    }

    #[test]
    fn test_push_constants_merge_on_exact_range() {
        let vertex = StageReflection::new(ShaderStage::Vertex)
            .with_push_constant(ReflectedPushConstant::new(
                "Push",
                0,
                64,
                vec![MemberTree::mat4("model", 0)],
            ));
        let fragment = StageReflection::new(ShaderStage::Fragment)
            .with_push_constant(ReflectedPushConstant::new("Push", 0, 64, Vec::new()))
            .with_push_constant(ReflectedPushConstant::new(
                "Extra",
                64,
                16,
                vec![MemberTree::vector("color", 0, 4)],
            ));

        let reflection = aggregate([&vertex, &fragment]).unwrap();
        assert_eq!(reflection.push_constants.len(), 2);

        let shared = reflection.push_constant(0, 64).unwrap();
        assert_eq!(shared.stages, ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT);
        assert!(shared.members.contains_key("Push.model"));

        let extra = reflection.push_constant(64, 16).unwrap();
        assert_eq!(extra.stages, ShaderStageFlags::FRAGMENT);
        assert!(reflection.push_constant(0, 32).is_none());
    }

    #[test]
    fn test_empty_pipeline() {
        let reflection = aggregate(std::iter::empty()).unwrap();
        assert!(reflection.sets.is_empty());
        assert_eq!(reflection.max_set_index(), None);
    }
}
