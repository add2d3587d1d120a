//! Common utilities for binding integration tests.
//!
//! Everything here runs against the dummy backend, which records every native
//! call so tests can check exactly what the binder asked the GPU to do.

#![allow(dead_code)]

use std::sync::Arc;

use redlilium_binding::reflection::{MemberTree, ReflectedBinding, ReflectedPushConstant};
use redlilium_binding::{
    BindingDevice, DeviceConfig, DummyBackend, GpuBackend, Material, MaterialDescriptor,
    RenderPassToken, ShaderSource, ShaderStage, StageReflection,
};

/// Initialize test logging once per process.
pub fn init_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}

/// A dummy backend and a device over it.
pub struct TestContext {
    pub backend: Arc<DummyBackend>,
    pub device: Arc<BindingDevice>,
}

impl TestContext {
    /// Create a context with the default configuration.
    pub fn new() -> Self {
        Self::with_config(DeviceConfig::default())
    }

    /// Create a context with `config`.
    pub fn with_config(config: DeviceConfig) -> Self {
        init_logging();
        let backend = Arc::new(DummyBackend::new());
        let device = BindingDevice::new(backend.clone() as Arc<dyn GpuBackend>, config)
            .expect("Failed to create binding device");
        Self { backend, device }
    }

    /// Create the lit material described by [`lit_stages`].
    pub fn lit_material(&self) -> Arc<Material> {
        let (vertex, fragment) = lit_stages();
        self.device
            .create_material(
                MaterialDescriptor::new()
                    .with_shader(ShaderSource::vertex(Vec::new(), "main").with_reflection(vertex))
                    .with_shader(
                        ShaderSource::fragment(Vec::new(), "main").with_reflection(fragment),
                    )
                    .with_render_pass(RenderPassToken::new(1, 0))
                    .with_label("lit"),
            )
            .expect("Failed to create lit material")
    }
}

/// Reflection of a typical lit surface shader pair.
///
/// - set 0: per-frame camera block (vertex)
/// - set 1: material block `Surface` with color, roughness and a transform,
///   plus `albedo` and `normal_map` combined image samplers (fragment)
/// - push constants: 16 bytes of per-draw data (vertex)
pub fn lit_stages() -> (StageReflection, StageReflection) {
    let vertex = StageReflection::new(ShaderStage::Vertex)
        .with_binding(ReflectedBinding::uniform_block(
            0,
            0,
            "Camera",
            64,
            vec![MemberTree::mat4("view_proj", 0)],
        ))
        .with_binding(ReflectedBinding::uniform_block(
            1,
            0,
            "Surface",
            96,
            vec![
                MemberTree::vector("base_color", 0, 4),
                MemberTree::float("roughness", 16),
                MemberTree::mat4("uv_transform", 32),
            ],
        ))
        .with_push_constant(ReflectedPushConstant::new(
            "Draw",
            0,
            16,
            vec![MemberTree::vector("offset", 0, 4)],
        ));

    let fragment = StageReflection::new(ShaderStage::Fragment)
        .with_binding(ReflectedBinding::uniform_block(
            1,
            0,
            "Surface",
            96,
            vec![
                MemberTree::vector("base_color", 0, 4),
                MemberTree::float("roughness", 16),
                MemberTree::mat4("uv_transform", 32),
            ],
        ))
        .with_binding(ReflectedBinding::combined_image_sampler(1, 1, "albedo"))
        .with_binding(ReflectedBinding::combined_image_sampler(1, 2, "normal_map"));

    (vertex, fragment)
}

/// Bytes of a little-endian f32 slice.
pub fn f32_bytes(values: &[f32]) -> Vec<u8> {
    bytemuck::cast_slice(values).to_vec()
}
