//! Vertex-skinning contract: per-vertex layout descriptors for the
//! three bake-time vertex-compression layouts, and the bone-coord
//! encoding the bake step writes alongside them.
//!
//! The skinning sampling/transform logic itself lives in WGSL
//! (`shaders/skinning.wgsl`), embedded here so a vertex shader module
//! can splice it in ahead of its own entry point, the way the donor
//! composes shader modules from `include_str!` fragments
//! (`renderer/graph/passes/ibl_compute.rs`).

use crate::config::VertexCompression;

/// The skinning WGSL library: bone-pose sampling and the
/// bind-pose-to-posed-vertex transform. Concatenate this ahead of a
/// vertex shader's own source before calling
/// `Device::create_shader_module`.
pub const SKINNING_WGSL: &str = include_str!("../shaders/skinning.wgsl");

/// `(bone_index + 0.5) / num_bones`, the single-`u` bone coordinate
/// addressing the center of a bone's row pair in the animation atlas —
/// each bone occupies a `2 / (2 * num_bones)` == `1 / num_bones` wide
/// band of the atlas row (one row for position, one for rotation).
#[must_use]
pub fn bone_coord(bone_index: u32, num_bones: u32) -> f32 {
    debug_assert!(num_bones > 0);
    (bone_index as f32 + 0.5) / num_bones as f32
}

/// `wgpu::VertexFormat` pairs for position/normal-tangent/uv per
/// compression layout. Each vertex also carries the bind pose
/// (packed into `position.w`/`uv2.xy`) and the bone coordinate
/// (`uv3.x`), encoded per-layout below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexLayout {
    pub position_format: wgpu::VertexFormat,
    pub normal_tangent_format: wgpu::VertexFormat,
    pub uv_format: wgpu::VertexFormat,
    pub bone_coord_format: wgpu::VertexFormat,
    pub stride: u64,
}

#[must_use]
pub fn vertex_layout(compression: VertexCompression) -> VertexLayout {
    match compression {
        VertexCompression::High => VertexLayout {
            position_format: wgpu::VertexFormat::Float16x4,
            normal_tangent_format: wgpu::VertexFormat::Snorm8x4,
            uv_format: wgpu::VertexFormat::Unorm16x2,
            bone_coord_format: wgpu::VertexFormat::Unorm16x2,
            stride: u64::from(compression.vertex_size()),
        },
        VertexCompression::Low => VertexLayout {
            position_format: wgpu::VertexFormat::Float32x4,
            normal_tangent_format: wgpu::VertexFormat::Snorm16x4,
            uv_format: wgpu::VertexFormat::Float32x2,
            bone_coord_format: wgpu::VertexFormat::Float32x2,
            stride: u64::from(compression.vertex_size()),
        },
        VertexCompression::None => VertexLayout {
            position_format: wgpu::VertexFormat::Float32x4,
            normal_tangent_format: wgpu::VertexFormat::Float32x4,
            uv_format: wgpu::VertexFormat::Float32x2,
            bone_coord_format: wgpu::VertexFormat::Float32x2,
            stride: u64::from(compression.vertex_size()),
        },
    }
}
