//! Shader reflection input and aggregation.
//!
//! Each shader stage supplies a [`StageReflection`]: the descriptor bindings and
//! push-constant blocks it declares, with block layouts given as an abstract
//! [`MemberTree`]. The [`ReflectionAggregator`] merges the stages of one
//! pipeline into a [`PipelineReflection`]: one [`DescriptorSetDescription`] per
//! set index plus the merged push-constant ranges.
//!
//! The member tree shape is independent of any particular reflection library.
//! With the `naga-reflection` feature, [`naga`] converts a `naga::Module`
//! into this shape.

mod aggregate;
mod bindings;
mod flatten;
#[cfg(feature = "naga-reflection")]
pub mod naga;

pub use aggregate::{PipelineReflection, ReflectionAggregator, aggregate};
pub use bindings::{
    BindingSlot, DescriptorKind, DescriptorSetDescription, LayoutBindingKey, MemberInfo,
    MemberMap, NumericShape, PushConstantKey, PushConstantRange, ShaderStage, ShaderStageFlags,
    canonical_signature,
};
pub use flatten::flatten_members;

/// Scalar component kind of a block member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// 32-bit float.
    Float,
    /// Signed integer.
    Sint,
    /// Unsigned integer.
    Uint,
    /// Boolean.
    Bool,
}

/// Type of a node in a block member tree.
#[derive(Debug, Clone, PartialEq)]
pub enum MemberType {
    /// A single scalar.
    Scalar(ScalarKind),
    /// A vector of `components` scalars.
    Vector {
        /// Component kind.
        kind: ScalarKind,
        /// Component count (2..=4).
        components: u32,
    },
    /// A matrix of `columns` x `rows` scalars.
    Matrix {
        /// Component kind.
        kind: ScalarKind,
        /// Column count.
        columns: u32,
        /// Row count.
        rows: u32,
    },
    /// An array of elements (`length` is `None` for runtime-sized arrays).
    Array {
        /// Element type.
        element: Box<MemberType>,
        /// Element count.
        length: Option<u32>,
        /// Byte stride between elements.
        stride: u32,
    },
    /// A nested struct.
    Struct(Vec<MemberTree>),
}

/// A named member of a block, with its offset relative to the parent.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberTree {
    /// Member name.
    pub name: String,
    /// Byte offset relative to the enclosing struct.
    pub offset: u32,
    /// Member type.
    pub ty: MemberType,
}

impl MemberTree {
    /// Create a member of arbitrary type.
    pub fn new(name: impl Into<String>, offset: u32, ty: MemberType) -> Self {
        Self {
            name: name.into(),
            offset,
            ty,
        }
    }

    /// A 32-bit float member.
    pub fn float(name: impl Into<String>, offset: u32) -> Self {
        Self::new(name, offset, MemberType::Scalar(ScalarKind::Float))
    }

    /// A float vector member with `components` components.
    pub fn vector(name: impl Into<String>, offset: u32, components: u32) -> Self {
        Self::new(
            name,
            offset,
            MemberType::Vector {
                kind: ScalarKind::Float,
                components,
            },
        )
    }

    /// A 4x4 float matrix member.
    pub fn mat4(name: impl Into<String>, offset: u32) -> Self {
        Self::new(
            name,
            offset,
            MemberType::Matrix {
                kind: ScalarKind::Float,
                columns: 4,
                rows: 4,
            },
        )
    }

    /// A nested struct member.
    pub fn structure(name: impl Into<String>, offset: u32, members: Vec<MemberTree>) -> Self {
        Self::new(name, offset, MemberType::Struct(members))
    }
}

/// One descriptor binding declared by a shader stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ReflectedBinding {
    /// Descriptor set index.
    pub set: u32,
    /// Binding index within the set.
    pub binding: u32,
    /// Block name for buffers, variable name otherwise.
    pub name: String,
    /// Resource kind.
    pub kind: DescriptorKind,
    /// Array element count.
    pub count: u32,
    /// Byte size of the block (0 for non-buffers).
    pub size: u32,
    /// Top-level block members (empty for non-buffers).
    pub members: Vec<MemberTree>,
}

impl ReflectedBinding {
    /// Create a binding with count 1 and no block layout.
    pub fn new(set: u32, binding: u32, name: impl Into<String>, kind: DescriptorKind) -> Self {
        Self {
            set,
            binding,
            name: name.into(),
            kind,
            count: 1,
            size: 0,
            members: Vec::new(),
        }
    }

    /// A uniform block binding with the given byte size and members.
    pub fn uniform_block(
        set: u32,
        binding: u32,
        name: impl Into<String>,
        size: u32,
        members: Vec<MemberTree>,
    ) -> Self {
        Self {
            size,
            members,
            ..Self::new(set, binding, name, DescriptorKind::UniformBuffer)
        }
    }

    /// A combined image+sampler binding.
    pub fn combined_image_sampler(set: u32, binding: u32, name: impl Into<String>) -> Self {
        Self::new(set, binding, name, DescriptorKind::CombinedImageSampler)
    }

    /// Set the array element count.
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }
}

/// One push-constant block declared by a shader stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ReflectedPushConstant {
    /// Block name.
    pub name: String,
    /// Byte offset of the block.
    pub offset: u32,
    /// Byte size of the block.
    pub size: u32,
    /// Top-level block members.
    pub members: Vec<MemberTree>,
}

impl ReflectedPushConstant {
    /// Create a push-constant block.
    pub fn new(name: impl Into<String>, offset: u32, size: u32, members: Vec<MemberTree>) -> Self {
        Self {
            name: name.into(),
            offset,
            size,
            members,
        }
    }
}

/// Reflection of a single shader stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageReflection {
    /// The stage this reflection describes.
    pub stage: ShaderStage,
    /// Descriptor bindings in discovery order.
    pub bindings: Vec<ReflectedBinding>,
    /// Push-constant blocks.
    pub push_constants: Vec<ReflectedPushConstant>,
}

impl StageReflection {
    /// Create an empty reflection for `stage`.
    pub fn new(stage: ShaderStage) -> Self {
        Self {
            stage,
            bindings: Vec::new(),
            push_constants: Vec::new(),
        }
    }

    /// Add a binding.
    pub fn with_binding(mut self, binding: ReflectedBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Add a push-constant block.
    pub fn with_push_constant(mut self, block: ReflectedPushConstant) -> Self {
        self.push_constants.push(block);
        self
    }
}
