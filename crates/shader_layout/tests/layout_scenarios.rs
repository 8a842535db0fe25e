//! Integration tests for layout, serialization and delegation
//!
//! Exercises the public API end to end: declare a binding, mutate it, update
//! and inspect the resulting byte image.

use approx::assert_relative_eq;
use shader_layout::foundation::logging;
use shader_layout::foundation::math::{Mat4, Vec3};
use shader_layout::prelude::*;

fn uniform(fields: Vec<FieldDecl>) -> Binding {
    logging::init_for_tests();
    Binding::construct(
        BindingDescriptor::uniform("params", "Params"),
        fields,
        &TypeRegistry::new(),
        &LayoutConfig::default().with_layout_logging(true),
    )
    .unwrap()
}

fn f32_at(bytes: &[u8], offset: usize) -> f32 {
    bytemuck::pod_read_unaligned(&bytes[offset..offset + 4])
}

#[test]
fn scalar_then_vec3_layout() {
    let mut binding = uniform(vec![
        FieldDecl::new("a", "f32", 1.0_f32),
        FieldDecl::new("b", "vec3f", [1.0_f32, 2.0, 3.0]),
    ]);
    binding.update().unwrap();

    let rows = binding.layout();
    assert_eq!(rows[0].offset, 0);
    assert_eq!(rows[1].offset, 16);
    assert_eq!(binding.total_size(), 32);

    let bytes = binding.bytes().unwrap();
    assert_eq!(bytes.len(), 32);
    assert_relative_eq!(f32_at(&bytes, 0), 1.0);
    assert_relative_eq!(f32_at(&bytes, 16), 1.0);
    assert_relative_eq!(f32_at(&bytes, 20), 2.0);
    assert_relative_eq!(f32_at(&bytes, 24), 3.0);
    assert!(bytes[4..16].iter().all(|b| *b == 0));
}

#[test]
fn strided_scalar_array() {
    let mut binding = uniform(vec![FieldDecl::new(
        "w",
        "array<f32, 5>",
        vec![0.0_f32, 1.0, 2.0, 3.0, 4.0],
    )]);
    binding.update().unwrap();

    assert_eq!(binding.total_size(), 80);
    for i in 0..5 {
        let item = binding.read_item("w", i).unwrap();
        assert_relative_eq!(item.as_f32().unwrap(), i as f32);
    }
    let bytes = binding.bytes().unwrap();
    assert_relative_eq!(f32_at(&bytes, 48), 3.0);
}

#[test]
fn offset_child_writes_inside_parent() {
    let registry = TypeRegistry::new();
    let config = LayoutConfig::default();
    let mut parent = Binding::construct(
        BindingDescriptor::uniform("frame", "Frame").with_capacity(1024),
        vec![FieldDecl::new("time", "f32", 0.0_f32)],
        &registry,
        &config,
    )
    .unwrap();
    parent.update().unwrap();
    let before = parent.buffer_bytes().unwrap();

    let mut child = OffsetChild::at_offset(
        &mut parent,
        256,
        BindingDescriptor::uniform("light", "Light"),
        vec![FieldDecl::new("scale", "f32", 0.0_f32)],
        &registry,
        &config,
    )
    .unwrap();
    child.set("scale", 7.5_f32).unwrap();
    child.update().unwrap();

    let after = parent.buffer_bytes().unwrap();
    assert_eq!(after.len(), 1024);
    assert_relative_eq!(f32_at(&after, 256), 7.5);
    for i in (0..after.len()).filter(|i| !(256..260).contains(i)) {
        assert_eq!(after[i], before[i], "byte {} changed", i);
    }
}

#[test]
fn only_dirty_fields_are_rewritten() {
    let mut binding = uniform(vec![
        FieldDecl::new("time", "f32", 0.0_f32),
        FieldDecl::new("model", "mat4x4f", Mat4::identity()),
        FieldDecl::new("color", "vec4f", [0.1_f32, 0.2, 0.3, 1.0]),
    ]);
    binding.update().unwrap();
    let before = binding.bytes().unwrap();

    binding.set("color", [0.9_f32, 0.8, 0.7, 1.0]).unwrap();
    assert!(binding.is_field_dirty("color").unwrap());
    assert!(!binding.is_field_dirty("model").unwrap());
    binding.update().unwrap();
    let after = binding.bytes().unwrap();

    let color = binding.field_layout("color").unwrap();
    let range = color.offset..color.offset + color.size;
    for i in 0..after.len() {
        if !range.contains(&i) {
            assert_eq!(after[i], before[i], "byte {} outside color changed", i);
        }
    }
    assert_ne!(after[range.clone()], before[range]);
    assert_eq!(binding.state(), BindingState::Clean);
}

#[test]
fn alignment_holds_for_every_field() {
    let binding = Binding::construct(
        BindingDescriptor::storage("data", "Data", false),
        vec![
            FieldDecl::new("a", "f32", 0.0_f32),
            FieldDecl::new("uv", "vec2f", [0.0_f32; 2]),
            FieldDecl::new("n", "vec3i", [0_i32; 3]),
            FieldDecl::new("k", "u32", 0_u32),
            FieldDecl::new("m", "mat3x3f", FieldValue::floats(&[0.0; 9])),
            FieldDecl::new("ids", "array<u32, 3>", vec![0_u32; 3]),
            FieldDecl::new("tail", "array<vec2f>", vec![0.0_f32; 4]),
        ],
        &TypeRegistry::new(),
        &LayoutConfig::default(),
    )
    .unwrap();

    assert_eq!(binding.total_size() % 16, 0);
    for row in binding.layout() {
        assert_eq!(row.offset % row.alignment, 0, "{}", row.name);
    }
}

#[test]
fn round_trip_plain_values() {
    let mut binding = uniform(vec![
        FieldDecl::new("s", "f32", 0.25_f32),
        FieldDecl::new("i", "i32", -7_i32),
        FieldDecl::new("v", "vec3f", Vec3::new(0.5, -1.5, 2.25)),
        FieldDecl::new("m", "mat4x4f", Mat4::new_scaling(3.0)),
    ]);
    binding.update().unwrap();

    assert_relative_eq!(binding.read_field("s").unwrap().as_f32().unwrap(), 0.25);
    assert_eq!(binding.read_field("i").unwrap().to_i32s(), Some(vec![-7]));
    let v = binding.read_field("v").unwrap().to_f32s();
    assert_relative_eq!(v[1], -1.5);
    let m = binding.read_field("m").unwrap().to_f32s();
    assert_relative_eq!(m[0], 3.0);
    assert_relative_eq!(m[5], 3.0);
    assert_relative_eq!(m[15], 1.0);
    assert_relative_eq!(m[1], 0.0);
}

#[test]
fn interleaved_records_share_stride() {
    let mut binding = Binding::construct(
        BindingDescriptor::storage("mesh", "Mesh", false),
        vec![
            FieldDecl::new("count", "u32", 2_u32),
            FieldDecl::new("position", "array<vec3f, 2>", vec![1.0_f32, 2.0, 3.0, 4.0, 5.0, 6.0]).interleaved("vertices"),
            FieldDecl::new("normal", "array<vec4f, 2>", vec![0.0_f32, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0])
                .interleaved("vertices"),
        ],
        &TypeRegistry::new(),
        &LayoutConfig::default(),
    )
    .unwrap();
    binding.update().unwrap();

    let position = binding.field_layout("position").unwrap();
    let normal = binding.field_layout("normal").unwrap();
    assert_eq!(position.offset, 16);
    assert_eq!(normal.offset, 32);
    assert_eq!(binding.total_size(), 16 + 2 * 32);

    let bytes = binding.bytes().unwrap();
    assert_relative_eq!(f32_at(&bytes, 16 + 32), 4.0);
    assert_relative_eq!(f32_at(&bytes, 32 + 32 + 4), 1.0);

    binding.set_record("position", 1, [7.0_f32, 8.0, 9.0]).unwrap();
    binding.update().unwrap();
    let item = binding.read_item("position", 1).unwrap().to_f32s();
    assert_eq!(item, vec![7.0, 8.0, 9.0]);
    assert_eq!(binding.read_item("normal", 1).unwrap().to_f32s(), vec![0.0, 1.0, 0.0, 0.0]);
    assert!(binding.set_record("count", 0, 1_u32).unwrap_err().is_type_mismatch());
}

#[test]
fn clones_do_not_share_bytes() {
    let mut binding = uniform(vec![FieldDecl::new("t", "f32", 1.0_f32)]);
    binding.update().unwrap();

    let mut twin = binding.clone_with_fresh_storage(Vec::<(&str, FieldValue)>::new()).unwrap();
    twin.update().unwrap();
    twin.set("t", 2.0_f32).unwrap();
    twin.update().unwrap();

    assert_relative_eq!(binding.read_field("t").unwrap().as_f32().unwrap(), 1.0);
    assert_relative_eq!(twin.read_field("t").unwrap().as_f32().unwrap(), 2.0);
}

#[test]
fn compute_read_back() {
    let mut output = Binding::construct(
        BindingDescriptor::storage("result", "Result", true),
        vec![
            FieldDecl::new("total", "f32", 0.0_f32),
            FieldDecl::new("hits", "array<u32, 2>", vec![0_u32; 2]),
        ],
        &TypeRegistry::new(),
        &LayoutConfig::default(),
    )
    .unwrap();
    output.update().unwrap();

    let mut device = vec![0u8; output.total_size()];
    device[0..4].copy_from_slice(&12.5_f32.to_ne_bytes());
    device[16..20].copy_from_slice(&3_u32.to_ne_bytes());
    device[32..36].copy_from_slice(&9_u32.to_ne_bytes());
    output.load_bytes(&device).unwrap();

    let all = output.read_all().unwrap();
    assert_eq!(all[0].0, "total");
    assert_relative_eq!(all[0].1.as_f32().unwrap(), 12.5);
    assert_eq!(all[1].1.to_u32s(), Some(vec![3, 9]));
}

#[test]
fn binding_set_assembles_shader_text() {
    let registry = TypeRegistry::new();
    let config = LayoutConfig::default();
    let mut set = BindingSet::new();

    set.insert(
        Binding::construct(
            BindingDescriptor::uniform("camera", "Camera"),
            vec![FieldDecl::new("view_proj", "mat4x4f", Mat4::identity())],
            &registry,
            &config,
        )
        .unwrap(),
    );
    set.insert(
        Binding::construct(
            BindingDescriptor::storage("particles", "Particles", true),
            vec![FieldDecl::new("data", "array<vec4f>", vec![0.0_f32; 16])],
            &registry,
            &config,
        )
        .unwrap(),
    );

    let text = set.shader_declarations().unwrap().to_string();
    assert!(text.contains("struct Camera {\n    view_proj: mat4x4<f32>,\n}"));
    assert!(text.contains("@group(0) @binding(0) var<uniform> camera: Camera;"));
    assert!(text.contains("@group(0) @binding(1) var<storage, read_write> particles: Particles;"));
}
