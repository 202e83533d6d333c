//! Renderer configuration.
//!
//! Plain, in-process configuration — no environment variables, no CLI, no
//! persistent state. Construct once at init and mutate directly; changes
//! take effect on the next `FramePipeline::run`.

/// Vertex compression layout selected at bake time.
///
/// The runtime vertex-skinning contract is agnostic to which of these
/// produced the mesh currently bound; this only selects the layout size
/// and the encoding of the per-vertex bone coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VertexCompression {
    /// 32 B/vertex: SNorm8 normal/tangent, Float16 position, UNorm16 UV.
    #[default]
    High,
    /// 64 B/vertex: SNorm16 normal/tangent, Float32 position.
    Low,
    /// 80 B/vertex: Float32 everything.
    None,
}

impl VertexCompression {
    /// Size in bytes of one vertex under this layout.
    #[must_use]
    pub const fn vertex_size(self) -> u32 {
        match self {
            VertexCompression::High => 32,
            VertexCompression::Low => 64,
            VertexCompression::None => 80,
        }
    }
}

/// Per-process renderer configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RendererSettings {
    /// Feeds the `SHADOWS_ENABLED` pass selection in the cull shader.
    pub shadows_enabled: bool,
    /// Meters; beyond this distance an instance casts no shadow.
    pub shadow_distance: f32,
    /// Multiplier applied to LOD transition distances.
    pub lod_bias: f32,
    /// Bake-time vertex layout; informs the skinning contract only.
    pub vertex_compression: VertexCompression,
    /// Added to the camera-pass LOD to derive the shadow-pass LOD.
    pub shadow_lod_offset: u32,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            shadows_enabled: false,
            shadow_distance: 100.0,
            lod_bias: 1.0,
            vertex_compression: VertexCompression::default(),
            shadow_lod_offset: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_sizes_match_layouts() {
        assert_eq!(VertexCompression::High.vertex_size(), 32);
        assert_eq!(VertexCompression::Low.vertex_size(), 64);
        assert_eq!(VertexCompression::None.vertex_size(), 80);
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn default_settings_match_spec_defaults() {
        let s = RendererSettings::default();
        assert!(!s.shadows_enabled);
        assert_eq!(s.lod_bias, 1.0);
        assert_eq!(s.shadow_lod_offset, 0);
    }
}
