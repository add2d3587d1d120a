use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use redlilium_binding::backend::CommandLog;
use redlilium_binding::reflection::{
    BindingSlot, DescriptorSetDescription, MemberTree, ReflectedBinding, aggregate,
};
use redlilium_binding::{
    BindingDevice, DescriptorKind, DeviceConfig, DummyBackend, FrameContext, GpuBackend,
    MaterialDescriptor, RenderPassToken, ShaderSource, ShaderStage, ShaderStageFlags,
    StageReflection,
};

fn device() -> Arc<BindingDevice> {
    let backend: Arc<dyn GpuBackend> = Arc::new(DummyBackend::new());
    BindingDevice::new(backend, DeviceConfig::default()).unwrap()
}

fn material_stages() -> Vec<ShaderSource> {
    let block = || {
        ReflectedBinding::uniform_block(
            1,
            0,
            "Surface",
            32,
            vec![
                MemberTree::vector("base_color", 0, 4),
                MemberTree::float("roughness", 16),
            ],
        )
    };
    let vertex = StageReflection::new(ShaderStage::Vertex).with_binding(block());
    let fragment = StageReflection::new(ShaderStage::Fragment)
        .with_binding(block())
        .with_binding(ReflectedBinding::combined_image_sampler(1, 1, "albedo"));
    vec![
        ShaderSource::vertex(Vec::new(), "main").with_reflection(vertex),
        ShaderSource::fragment(Vec::new(), "main").with_reflection(fragment),
    ]
}

// ---------------------------------------------------------------------------
// Reflection and caches
// ---------------------------------------------------------------------------

fn bench_aggregate_reflection(c: &mut Criterion) {
    let stages = material_stages();
    c.bench_function("aggregate_two_stages", |b| {
        b.iter(|| black_box(aggregate(stages.iter().map(|s| &s.reflection)).unwrap()));
    });
}

fn bench_set_layout_cache_hit(c: &mut Criterion) {
    let device = device();
    let description = DescriptorSetDescription::from_bindings(
        1,
        (0..8)
            .map(|binding| {
                BindingSlot::new(1, binding, DescriptorKind::CombinedImageSampler)
                    .with_stages(ShaderStageFlags::FRAGMENT)
            })
            .collect(),
    );
    device.acquire_set_layout(&description).unwrap();

    c.bench_function("set_layout_cache_hit_8_bindings", |b| {
        b.iter(|| black_box(device.acquire_set_layout(&description).unwrap()));
    });
}

fn bench_pipeline_layout_cache_hit(c: &mut Criterion) {
    let device = device();
    let empty = device.acquire_empty_set_layout().unwrap();
    let layouts = [empty, empty, empty];
    device.acquire_pipeline_layout(&layouts, &[]).unwrap();

    c.bench_function("pipeline_layout_cache_hit_3_sets", |b| {
        b.iter(|| black_box(device.acquire_pipeline_layout(&layouts, &[]).unwrap()));
    });
}

// ---------------------------------------------------------------------------
// Per-frame material work
// ---------------------------------------------------------------------------

fn bench_instance_frame(c: &mut Criterion) {
    let device = device();
    let material = device
        .create_material(
            MaterialDescriptor::new()
                .with_shader(material_stages().remove(0))
                .with_shader(material_stages().remove(1))
                .with_render_pass(RenderPassToken::new(1, 0)),
        )
        .unwrap();
    let mut instance = material.create_instance().unwrap();
    let mut log = CommandLog::new();
    let mut frame = 0u32;

    c.bench_function("material_instance_write_update_bind", |b| {
        b.iter(|| {
            instance.set_scalar("Surface.roughness", frame as f32);
            instance.update_uniforms();
            log.clear();
            instance.bind(&mut FrameContext::new(frame % 3, &mut log));
            frame = frame.wrapping_add(1);
            black_box(&log);
        });
    });
}

fn bench_create_instance(c: &mut Criterion) {
    let device = device();
    let material = device
        .create_material(
            MaterialDescriptor::new()
                .with_shader(material_stages().remove(0))
                .with_shader(material_stages().remove(1))
                .with_render_pass(RenderPassToken::new(1, 0)),
        )
        .unwrap();

    // Released sets are recycled, so after the first iteration no pool grows.
    c.bench_function("material_create_instance", |b| {
        b.iter(|| black_box(material.create_instance().unwrap()));
    });
}

criterion_group!(
    benches,
    bench_aggregate_reflection,
    bench_set_layout_cache_hit,
    bench_pipeline_layout_cache_hit,
    bench_instance_frame,
    bench_create_instance,
);
criterion_main!(benches);
