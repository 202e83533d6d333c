//! Mesh registry entries and per-mesh LOD data.

use bytemuck::{Pod, Zeroable};

use crate::errors::{RendererError, Result};

use super::limits::{MAX_LOD_COUNT, MAX_SUBMESH_COUNT};

/// World-space axis-aligned bounds, center + extents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub center: glam::Vec3,
    pub extents: glam::Vec3,
}

impl Bounds {
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.extents == glam::Vec3::ZERO
    }

    #[must_use]
    pub fn max_extent(&self) -> f32 {
        self.extents.x.max(self.extents.y).max(self.extents.z)
    }

    /// The eight corners of the box, in local space.
    #[must_use]
    pub fn corners(&self) -> [glam::Vec3; 8] {
        let c = self.center;
        let e = self.extents;
        [
            c + glam::Vec3::new(-e.x, -e.y, -e.z),
            c + glam::Vec3::new(e.x, -e.y, -e.z),
            c + glam::Vec3::new(-e.x, e.y, -e.z),
            c + glam::Vec3::new(e.x, e.y, -e.z),
            c + glam::Vec3::new(-e.x, -e.y, e.z),
            c + glam::Vec3::new(e.x, -e.y, e.z),
            c + glam::Vec3::new(-e.x, e.y, e.z),
            c + glam::Vec3::new(e.x, e.y, e.z),
        ]
    }
}

/// Per-mesh LOD configuration.
///
/// `shadow_lod_indices` packs one 3-bit shadow-LOD index per primary LOD
/// (5 entries * 3 bits = 15 bits of the `u32`) — the 3-bit width is
/// pinned, not the 4-bit in-progress variant some engines use.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LodData {
    pub lod_count: u32,
    pub screen_heights: [f32; 5],
    shadow_lod_indices: u32,
}

impl LodData {
    /// Validates and constructs LOD data. Rejects `lod_count` outside
    /// `[1, 5]` and non-monotonically-decreasing `screen_heights`.
    pub fn new(
        lod_count: u32,
        screen_heights: [f32; 5],
        shadow_lod_for_primary: impl Fn(u32) -> u32,
    ) -> Result<Self> {
        if lod_count == 0 || lod_count > MAX_LOD_COUNT {
            return Err(RendererError::Capacity {
                kind: crate::errors::CapacityKind::LodCount,
                limit: MAX_LOD_COUNT,
                requested: lod_count,
            });
        }
        for i in 1..lod_count as usize {
            if screen_heights[i] >= screen_heights[i - 1] {
                return Err(RendererError::MalformedBakeArtifact(format!(
                    "screen_heights must be strictly decreasing: [{i}]={} >= [{}]={}",
                    screen_heights[i],
                    i - 1,
                    screen_heights[i - 1]
                )));
            }
        }

        let mut shadow_lod_indices = 0u32;
        for primary in 0..lod_count {
            let shadow = shadow_lod_for_primary(primary) & 0b111;
            shadow_lod_indices |= shadow << (primary * 3);
        }

        Ok(Self {
            lod_count,
            screen_heights,
            shadow_lod_indices,
        })
    }

    /// The shadow LOD index for a given primary (camera-pass) LOD.
    #[must_use]
    pub fn shadow_lod_for(&self, primary_lod: u32) -> u32 {
        (self.shadow_lod_indices >> (primary_lod * 3)) & 0b111
    }

    /// Packs into the GPU-ABI `LodData` the cull shader reads
    /// (`lods[inst.instance_type_index]`, `shaders/cull.wgsl`).
    #[must_use]
    pub fn to_gpu(&self) -> LodDataGpu {
        LodDataGpu {
            screen_heights_lo: [
                self.screen_heights[0],
                self.screen_heights[1],
                self.screen_heights[2],
                self.screen_heights[3],
            ],
            screen_height_4: self.screen_heights[4],
            shadow_lod_indices: self.shadow_lod_indices,
            lod_count: self.lod_count,
            _pad: 0.0,
        }
    }
}

/// GPU-ABI mirror of `shaders/cull.wgsl`'s `LodData`, 32 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LodDataGpu {
    pub screen_heights_lo: [f32; 4],
    pub screen_height_4: f32,
    pub shadow_lod_indices: u32,
    pub lod_count: u32,
    _pad: f32,
}

/// The static (per-draw-call, not per-instance) portion of a submesh's
/// indexed draw: everything `DrawArgs` needs besides `instance_count`
/// and `instance_start`, which the set-draw-args pass stamps in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubMeshDrawInfo {
    pub index_count: u32,
    pub index_start: u32,
    pub base_vertex: u32,
}

/// A registered mesh: the opaque GPU mesh plus its per-LOD submesh layout.
///
/// Per-LOD submeshes are packed contiguously in the mesh's submesh list:
/// LOD-0 submeshes `0..S`, LOD-1 submeshes `S..2S`, etc, where `S` is
/// `sub_mesh_count`. `submeshes` has exactly `lod_count * sub_mesh_count`
/// entries, indexed by [`MeshEntry::packed_submesh_index`].
#[derive(Debug, Clone, PartialEq)]
pub struct MeshEntry {
    pub gpu_mesh: u64,
    pub sub_mesh_count: u32,
    pub lods: LodData,
    pub submeshes: Vec<SubMeshDrawInfo>,
}

impl MeshEntry {
    /// Validates and constructs a mesh entry. Rejects `sub_mesh_count`
    /// above `MAX_SUBMESH_COUNT` and a `submeshes` list whose length
    /// doesn't match `lods.lod_count * sub_mesh_count`, so
    /// [`Self::submesh_draw_info`] can never index out of bounds.
    pub fn new(gpu_mesh: u64, sub_mesh_count: u32, lods: LodData, submeshes: Vec<SubMeshDrawInfo>) -> Result<Self> {
        if sub_mesh_count == 0 || sub_mesh_count > MAX_SUBMESH_COUNT {
            return Err(RendererError::Capacity {
                kind: crate::errors::CapacityKind::SubmeshCount,
                limit: MAX_SUBMESH_COUNT,
                requested: sub_mesh_count,
            });
        }
        let expected = (lods.lod_count * sub_mesh_count) as usize;
        if submeshes.len() != expected {
            return Err(RendererError::MalformedBakeArtifact(format!(
                "submeshes.len() = {}, expected lod_count * sub_mesh_count = {expected}",
                submeshes.len()
            )));
        }

        Ok(Self {
            gpu_mesh,
            sub_mesh_count,
            lods,
            submeshes,
        })
    }

    /// Index of the submesh for `(lod, submesh_in_lod)` in the packed
    /// submesh list.
    #[must_use]
    pub fn packed_submesh_index(&self, lod: u32, submesh_in_lod: u32) -> u32 {
        lod * self.sub_mesh_count + submesh_in_lod
    }

    #[must_use]
    pub fn submesh_draw_info(&self, lod: u32, submesh_in_lod: u32) -> SubMeshDrawInfo {
        self.submeshes[self.packed_submesh_index(lod, submesh_in_lod) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_lod_count_out_of_range() {
        let err = LodData::new(0, [0.0; 5], |_| 0).unwrap_err();
        assert!(matches!(err, RendererError::Capacity { .. }));
        let err = LodData::new(6, [0.0; 5], |_| 0).unwrap_err();
        assert!(matches!(err, RendererError::Capacity { .. }));
    }

    #[test]
    fn rejects_non_monotonic_screen_heights() {
        let err = LodData::new(3, [1.0, 1.0, 0.5, 0.0, 0.0], |_| 0).unwrap_err();
        assert!(matches!(err, RendererError::MalformedBakeArtifact(_)));
    }

    #[test]
    fn shadow_lod_packs_and_unpacks_three_bits_per_entry() {
        let lods = LodData::new(5, [4.0, 3.0, 2.0, 1.0, 0.5], |primary| primary + 1).unwrap();
        for primary in 0..5 {
            assert_eq!(lods.shadow_lod_for(primary), primary + 1);
        }
    }

    #[test]
    fn packed_submesh_index_matches_lod_layout() {
        let mesh = MeshEntry::new(
            1,
            3,
            LodData::new(2, [2.0, 1.0, 0.0, 0.0, 0.0], |_| 0).unwrap(),
            vec![SubMeshDrawInfo { index_count: 0, index_start: 0, base_vertex: 0 }; 6],
        )
        .unwrap();
        assert_eq!(mesh.packed_submesh_index(0, 0), 0);
        assert_eq!(mesh.packed_submesh_index(0, 2), 2);
        assert_eq!(mesh.packed_submesh_index(1, 0), 3);
        assert_eq!(mesh.packed_submesh_index(1, 2), 5);
    }

    #[test]
    fn rejects_sub_mesh_count_above_max() {
        let err = MeshEntry::new(1, MAX_SUBMESH_COUNT + 1, LodData::new(1, [1.0, 0.0, 0.0, 0.0, 0.0], |_| 0).unwrap(), vec![])
            .unwrap_err();
        assert!(matches!(err, RendererError::Capacity { kind: crate::errors::CapacityKind::SubmeshCount, .. }));
    }

    #[test]
    fn rejects_submesh_list_length_mismatch() {
        let err = MeshEntry::new(
            1,
            2,
            LodData::new(2, [2.0, 1.0, 0.0, 0.0, 0.0], |_| 0).unwrap(),
            vec![SubMeshDrawInfo { index_count: 0, index_start: 0, base_vertex: 0 }; 3],
        )
        .unwrap_err();
        assert!(matches!(err, RendererError::MalformedBakeArtifact(_)));
    }
}
