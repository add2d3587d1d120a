//! Vertex input description passed through to pipeline creation.

/// Data format of a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexAttributeFormat {
    /// Single 32-bit float.
    Float,
    /// Two 32-bit floats.
    Float2,
    /// Three 32-bit floats.
    Float3,
    /// Four 32-bit floats.
    Float4,
    /// Single 32-bit signed integer.
    Int,
    /// Two 32-bit signed integers.
    Int2,
    /// Three 32-bit signed integers.
    Int3,
    /// Four 32-bit signed integers.
    Int4,
    /// Single 32-bit unsigned integer.
    Uint,
    /// Two 32-bit unsigned integers.
    Uint2,
    /// Three 32-bit unsigned integers.
    Uint3,
    /// Four 32-bit unsigned integers.
    Uint4,
    /// Four 8-bit unsigned integers (normalized to 0.0-1.0).
    Unorm8x4,
    /// Four 8-bit signed integers (normalized to -1.0-1.0).
    Snorm8x4,
}

impl VertexAttributeFormat {
    /// Get the size in bytes of this format.
    pub fn size(&self) -> u32 {
        match self {
            Self::Float | Self::Int | Self::Uint => 4,
            Self::Float2 | Self::Int2 | Self::Uint2 => 8,
            Self::Float3 | Self::Int3 | Self::Uint3 => 12,
            Self::Float4 | Self::Int4 | Self::Uint4 => 16,
            Self::Unorm8x4 | Self::Snorm8x4 => 4,
        }
    }
}

/// How the vertex buffer advances: per-vertex or per-instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VertexStepMode {
    /// Buffer advances once per vertex (default).
    #[default]
    Vertex,
    /// Buffer advances once per instance.
    Instance,
}

/// One vertex buffer binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBufferLayout {
    /// Buffer binding slot.
    pub binding: u32,
    /// Stride in bytes between consecutive elements.
    pub stride: u32,
    /// Step mode.
    pub step_mode: VertexStepMode,
}

/// One vertex attribute read by the vertex shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Shader input location.
    pub location: u32,
    /// Buffer binding slot the attribute reads from.
    pub binding: u32,
    /// Data format.
    pub format: VertexAttributeFormat,
    /// Byte offset within the buffer element.
    pub offset: u32,
}

/// Vertex buffers and attributes of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VertexInputDescription {
    /// Vertex buffer bindings.
    pub buffers: Vec<VertexBufferLayout>,
    /// Vertex attributes.
    pub attributes: Vec<VertexAttribute>,
}

impl VertexInputDescription {
    /// Create an empty description (no vertex buffers).
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vertex buffer binding.
    pub fn with_buffer(mut self, binding: u32, stride: u32, step_mode: VertexStepMode) -> Self {
        self.buffers.push(VertexBufferLayout {
            binding,
            stride,
            step_mode,
        });
        self
    }

    /// Add an attribute at the next location, tightly packed after the
    /// previous attribute of the same buffer.
    pub fn with_attribute(mut self, binding: u32, format: VertexAttributeFormat) -> Self {
        let offset = self
            .attributes
            .iter()
            .filter(|a| a.binding == binding)
            .map(|a| a.offset + a.format.size())
            .max()
            .unwrap_or(0);
        let location = self.attributes.len() as u32;
        self.attributes.push(VertexAttribute {
            location,
            binding,
            format,
            offset,
        });
        self
    }
}
