//! Reflection adapter over [`naga`] modules.
//!
//! Validates the module, picks the entry point of the requested stage and
//! converts every resource binding and push-constant block that entry point
//! uses into the crate's [`StageReflection`] shape.

use std::collections::HashMap;

use naga::valid::{Capabilities, ModuleInfo, ValidationFlags, Validator};
use naga::{AddressSpace, ArraySize, GlobalVariable, Handle, ImageClass, Module, Type, TypeInner};

use super::{
    DescriptorKind, MemberTree, MemberType, ReflectedBinding, ReflectedPushConstant, ScalarKind,
    ShaderStage, StageReflection,
};
use crate::error::BindingError;

/// Reflect the resources used by the first `stage` entry point of `module`.
///
/// # Errors
///
/// Returns [`BindingError::ShaderReflectionFailed`] if the module does not
/// validate or has no entry point for `stage`.
pub fn reflect_module(
    module: &Module,
    stage: ShaderStage,
) -> Result<StageReflection, BindingError> {
    reflect_entry_point(module, stage, None)
}

/// Reflect the resources used by one entry point of `module`.
///
/// With `entry_point` set, the entry point must have that name and run in
/// `stage`; otherwise the first entry point of `stage` is used. Globals the
/// entry point never touches are not reported.
///
/// # Errors
///
/// Returns [`BindingError::ShaderReflectionFailed`] if the module does not
/// validate or the entry point is missing.
pub fn reflect_entry_point(
    module: &Module,
    stage: ShaderStage,
    entry_point: Option<&str>,
) -> Result<StageReflection, BindingError> {
    crate::profile_function!();

    let info = validate(module)?;
    let index = find_entry_point(module, stage, entry_point)?;
    let usage = info.get_entry_point(index);
    let shared = shared_block_types(module);

    let mut reflection = StageReflection::new(stage);

    for (handle, var) in module.global_variables.iter() {
        if usage[handle].is_empty() {
            log::trace!(
                "Skipping global {:?}: unused by entry point {:?}",
                var.name,
                module.entry_points[index].name
            );
            continue;
        }
        match var.space {
            AddressSpace::PushConstant => {
                let ty = &module.types[var.ty];
                let name = block_name(ty, var, &shared, var.ty);
                let size = ty.inner.size(module.to_ctx());
                reflection.push_constants.push(ReflectedPushConstant::new(
                    name,
                    0,
                    size,
                    struct_members(module, var.ty),
                ));
            }
            AddressSpace::Uniform | AddressSpace::Storage { .. } | AddressSpace::Handle => {
                if let Some(binding) = reflect_binding(module, var, &shared) {
                    reflection.bindings.push(binding);
                }
            }
            _ => {}
        }
    }

    log::debug!(
        "Reflected {:?} entry point {:?}: {} bindings, {} push-constant blocks",
        stage,
        module.entry_points[index].name,
        reflection.bindings.len(),
        reflection.push_constants.len()
    );

    Ok(reflection)
}

fn validate(module: &Module) -> Result<ModuleInfo, BindingError> {
    let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
    validator.validate(module).map_err(|e| {
        log::error!("Shader validation error: {e}");
        BindingError::ShaderReflectionFailed(format!("Validation error: {e}"))
    })
}

fn find_entry_point(
    module: &Module,
    stage: ShaderStage,
    name: Option<&str>,
) -> Result<usize, BindingError> {
    let Some(naga_stage) = naga_stage(stage) else {
        return Err(BindingError::ShaderReflectionFailed(format!(
            "{stage:?} shaders cannot be reflected"
        )));
    };
    module
        .entry_points
        .iter()
        .position(|ep| ep.stage == naga_stage && name.is_none_or(|name| ep.name == name))
        .ok_or_else(|| {
            BindingError::ShaderReflectionFailed(match name {
                Some(name) => format!("no {stage:?} entry point named {name:?}"),
                None => format!("no {stage:?} entry point"),
            })
        })
}

fn naga_stage(stage: ShaderStage) -> Option<naga::ShaderStage> {
    match stage {
        ShaderStage::Vertex => Some(naga::ShaderStage::Vertex),
        ShaderStage::Fragment => Some(naga::ShaderStage::Fragment),
        ShaderStage::Compute => Some(naga::ShaderStage::Compute),
        ShaderStage::Geometry => None,
    }
}

/// Block types declared by more than one buffer or push-constant global.
fn shared_block_types(module: &Module) -> HashMap<Handle<Type>, usize> {
    let mut counts = HashMap::new();
    for (_, var) in module.global_variables.iter() {
        if matches!(
            var.space,
            AddressSpace::Uniform | AddressSpace::Storage { .. } | AddressSpace::PushConstant
        ) {
            *counts.entry(var.ty).or_insert(0) += 1;
        }
    }
    counts.retain(|_, count| *count > 1);
    counts
}

/// Parse SPIR-V bytes and reflect them.
pub fn reflect_spirv(bytes: &[u8], stage: ShaderStage) -> Result<StageReflection, BindingError> {
    let module = naga::front::spv::parse_u8_slice(bytes, &spv_options()).map_err(|e| {
        log::error!("SPIR-V parse error: {e}");
        BindingError::ShaderReflectionFailed(format!("SPIR-V parse error: {e}"))
    })?;
    reflect_module(&module, stage)
}

/// Parse SPIR-V words and reflect the entry point named `entry_point`.
pub fn reflect_spirv_words(
    words: &[u32],
    stage: ShaderStage,
    entry_point: &str,
) -> Result<StageReflection, BindingError> {
    let options = spv_options();
    let module = naga::front::spv::Frontend::new(words.iter().cloned(), &options)
        .parse()
        .map_err(|e| {
            log::error!("SPIR-V parse error: {e}");
            BindingError::ShaderReflectionFailed(format!("SPIR-V parse error: {e}"))
        })?;
    reflect_entry_point(&module, stage, Some(entry_point))
}

/// Parse WGSL source and reflect it.
pub fn reflect_wgsl(source: &str, stage: ShaderStage) -> Result<StageReflection, BindingError> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| {
        log::error!("WGSL parse error: {e}");
        BindingError::ShaderReflectionFailed(format!("WGSL parse error: {e}"))
    })?;
    reflect_module(&module, stage)
}

/// Parse WGSL source and reflect the entry point named `entry_point`.
pub fn reflect_wgsl_entry(
    source: &str,
    stage: ShaderStage,
    entry_point: &str,
) -> Result<StageReflection, BindingError> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| {
        log::error!("WGSL parse error: {e}");
        BindingError::ShaderReflectionFailed(format!("WGSL parse error: {e}"))
    })?;
    reflect_entry_point(&module, stage, Some(entry_point))
}

fn spv_options() -> naga::front::spv::Options {
    naga::front::spv::Options {
        adjust_coordinate_space: true,
        strict_capabilities: false,
        block_ctx_dump_prefix: None,
    }
}

fn reflect_binding(
    module: &Module,
    var: &GlobalVariable,
    shared: &HashMap<Handle<Type>, usize>,
) -> Option<ReflectedBinding> {
    let Some(resource) = &var.binding else {
        log::debug!("Skipping global {:?} without a resource binding", var.name);
        return None;
    };

    // Binding arrays carry the element count; the element type decides the kind.
    let (element_ty, count) = match module.types[var.ty].inner {
        TypeInner::BindingArray { base, size } => (base, array_length(size).unwrap_or(1)),
        _ => (var.ty, 1),
    };

    let Some(kind) = descriptor_kind(var.space, &module.types[element_ty].inner) else {
        log::warn!(
            "Skipping global {:?} at group {} binding {}: unsupported resource type",
            var.name,
            resource.group,
            resource.binding
        );
        return None;
    };

    let ty = &module.types[element_ty];
    let mut binding = if kind.is_buffer() {
        ReflectedBinding {
            size: ty.inner.size(module.to_ctx()),
            members: struct_members(module, element_ty),
            ..ReflectedBinding::new(
                resource.group,
                resource.binding,
                block_name(ty, var, shared, var.ty),
                kind,
            )
        }
    } else {
        ReflectedBinding::new(
            resource.group,
            resource.binding,
            var.name.clone().unwrap_or_default(),
            kind,
        )
    };
    binding.count = count;
    Some(binding)
}

fn descriptor_kind(space: AddressSpace, inner: &TypeInner) -> Option<DescriptorKind> {
    match space {
        AddressSpace::Uniform => Some(DescriptorKind::UniformBuffer),
        AddressSpace::Storage { .. } => Some(DescriptorKind::StorageBuffer),
        AddressSpace::Handle => match inner {
            TypeInner::Image {
                class: ImageClass::Storage { .. },
                ..
            } => Some(DescriptorKind::StorageImage),
            TypeInner::Image { .. } => Some(DescriptorKind::SampledImage),
            TypeInner::Sampler { .. } => Some(DescriptorKind::Sampler),
            _ => None,
        },
        _ => None,
    }
}

/// Struct type name, or the variable name when several globals share the type.
fn block_name(
    ty: &Type,
    var: &GlobalVariable,
    shared: &HashMap<Handle<Type>, usize>,
    handle: Handle<Type>,
) -> String {
    let type_name = ty.name.clone().filter(|_| !shared.contains_key(&handle));
    type_name
        .or_else(|| var.name.clone())
        .or_else(|| ty.name.clone())
        .unwrap_or_default()
}

fn struct_members(module: &Module, ty: Handle<Type>) -> Vec<MemberTree> {
    match &module.types[ty].inner {
        TypeInner::Struct { members, .. } => members
            .iter()
            .enumerate()
            .filter_map(|(index, member)| {
                let name = member
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("member{index}"));
                let ty = member_type(module, member.ty)?;
                Some(MemberTree::new(name, member.offset, ty))
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn member_type(module: &Module, ty: Handle<Type>) -> Option<MemberType> {
    let converted = match module.types[ty].inner {
        TypeInner::Scalar(scalar) | TypeInner::Atomic(scalar) => {
            MemberType::Scalar(scalar_kind(scalar.kind))
        }
        TypeInner::Vector { size, scalar } => MemberType::Vector {
            kind: scalar_kind(scalar.kind),
            components: size as u32,
        },
        TypeInner::Matrix {
            columns,
            rows,
            scalar,
        } => MemberType::Matrix {
            kind: scalar_kind(scalar.kind),
            columns: columns as u32,
            rows: rows as u32,
        },
        TypeInner::Array { base, size, stride } => MemberType::Array {
            element: Box::new(member_type(module, base)?),
            length: array_length(size),
            stride,
        },
        TypeInner::Struct { .. } => MemberType::Struct(struct_members(module, ty)),
        ref other => {
            log::debug!("Skipping block member of type {other:?}");
            return None;
        }
    };
    Some(converted)
}

fn scalar_kind(kind: naga::ScalarKind) -> ScalarKind {
    match kind {
        naga::ScalarKind::Float | naga::ScalarKind::AbstractFloat => ScalarKind::Float,
        naga::ScalarKind::Uint => ScalarKind::Uint,
        naga::ScalarKind::Bool => ScalarKind::Bool,
        _ => ScalarKind::Sint,
    }
}

fn array_length(size: ArraySize) -> Option<u32> {
    match size {
        ArraySize::Constant(length) => Some(length.get()),
        _ => None,
    }
}
