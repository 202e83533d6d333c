//! CPU reimplementation of the cull + LOD-select pass (`shaders/cull.wgsl`),
//! test-only: ground truth for S5's visible-instance count without
//! standing up a GPU device. Not a CPU fallback for production culling —
//! that path does not exist (a deliberate Non-goal).

use glam::{Mat4, Vec3};

use crate::data::instance::CompressedTransform;
use crate::data::mesh::Bounds;
use crate::pipeline::CameraParams;

/// Per-instance-type LOD thresholds, mirroring `LodData` (cull.wgsl).
#[derive(Debug, Clone, Copy)]
pub struct LodTable {
    pub lod_count: u32,
    pub screen_heights: [f32; 5],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CullResult {
    pub visible: bool,
    pub lod: u32,
}

/// Camera-pass frustum cull + LOD selection, instance-by-instance.
///
/// `local_bounds` is the instance's animation-space bounds (already
/// resolved from the current animation frame, as `cull.wgsl` reads it
/// from the `AnimationData` table).
#[must_use]
pub fn cull_camera(
    transform: &CompressedTransform,
    local_bounds: Bounds,
    camera: CameraParams,
    lod_bias: f32,
    lod_table: LodTable,
) -> CullResult {
    if transform.position.iter().any(|c| c.is_nan()) || transform.scale.is_nan() {
        return CullResult { visible: false, lod: 0 };
    }

    let rot = transform.rotation();
    let position = Vec3::from(transform.position);
    let extents_scaled = local_bounds.extents.abs() * transform.scale;
    let world_center = position + rot * (local_bounds.center * transform.scale);
    let degenerate = extents_scaled == Vec3::ZERO;

    let to_camera = camera.camera_pos - world_center;
    let inside_bounds = to_camera.x.abs() <= extents_scaled.x
        && to_camera.y.abs() <= extents_scaled.y
        && to_camera.z.abs() <= extents_scaled.z;
    let forced_visible = inside_bounds || degenerate;

    let frustum_visible = forced_visible || {
        let model = Mat4::from_scale_rotation_translation(Vec3::splat(transform.scale), rot, position);
        let mvp = camera.view_proj * model;
        (0..8u32).any(|k| {
            let c = corner(local_bounds.center, local_bounds.extents.abs(), k);
            let clip = mvp * c.extend(1.0);
            clip.x.abs() <= clip.w && clip.y.abs() <= clip.w && clip.z >= 0.0 && clip.z <= clip.w
        })
    };

    let camera_distance = to_camera.length();
    let lod_distance = camera_distance / lod_bias;
    let max_extent = extents_scaled.x.max(extents_scaled.y).max(extents_scaled.z);
    let lod_factor = camera.lod_scale * max_extent;

    let mut selected_lod = 0u32;
    for k in 0..lod_table.lod_count {
        if lod_factor / lod_table.screen_heights[k as usize] < lod_distance {
            selected_lod += 1;
        }
    }
    selected_lod = selected_lod.min(lod_table.lod_count - 1);

    let cull_distance = lod_factor / lod_table.screen_heights[(lod_table.lod_count - 1) as usize];
    let lod_culled = lod_distance >= cull_distance && !forced_visible;

    CullResult {
        visible: frustum_visible && !lod_culled,
        lod: selected_lod,
    }
}

/// Shadow-pass visibility: distance-only, no frustum test (cull.wgsl's
/// `pass_is_shadow` branch).
#[must_use]
pub fn visible_in_shadow_pass(
    transform: &CompressedTransform,
    local_bounds: Bounds,
    camera_pos: Vec3,
    shadow_distance: f32,
) -> bool {
    if transform.position.iter().any(|c| c.is_nan()) || transform.scale.is_nan() {
        return false;
    }
    let rot = transform.rotation();
    let world_center =
        Vec3::from(transform.position) + rot * (local_bounds.center * transform.scale);
    (camera_pos - world_center).length() < shadow_distance
}

fn corner(center: Vec3, extents: Vec3, k: u32) -> Vec3 {
    let sx = if k & 1 != 0 { 1.0 } else { -1.0 };
    let sy = if k & 2 != 0 { 1.0 } else { -1.0 };
    let sz = if k & 4 != 0 { 1.0 } else { -1.0 };
    center + Vec3::new(sx, sy, sz) * extents
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    fn perspective_camera() -> CameraParams {
        CameraParams {
            view_proj: Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.1, 1000.0)
                * Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y),
            camera_pos: Vec3::new(0.0, 0.0, 5.0),
            lod_scale: 1.0,
        }
    }

    fn unit_bounds() -> Bounds {
        Bounds { center: Vec3::ZERO, extents: Vec3::ONE }
    }

    fn generous_lods() -> LodTable {
        // Large screen-height thresholds so ordinary S1/S2/S5 distances never LOD-cull.
        LodTable { lod_count: 1, screen_heights: [1e-6, 0.0, 0.0, 0.0, 0.0] }
    }

    #[test]
    fn s1_single_instance_at_origin_is_visible() {
        let transform = CompressedTransform::new(Vec3::ZERO, Quat::IDENTITY, 1.0);
        let result = cull_camera(&transform, unit_bounds(), perspective_camera(), 1.0, generous_lods());
        assert!(result.visible);
    }

    #[test]
    fn s2_instance_far_outside_frustum_is_culled() {
        let transform = CompressedTransform::new(Vec3::new(1000.0, 0.0, 0.0), Quat::IDENTITY, 1.0);
        let result = cull_camera(&transform, unit_bounds(), perspective_camera(), 1.0, generous_lods());
        assert!(!result.visible);
    }

    #[test]
    fn s3_lod_boundary_assigns_adjacent_instances_to_adjacent_lods() {
        // lod_factor = lod_scale(1.0) * max_extent(1.0) = 1.0. Thresholds:
        // lod 0 -> 1 at lod_distance = 1.0/2.0 = 0.5, cull at 1.0/1.0 = 1.0.
        let lods = LodTable { lod_count: 2, screen_heights: [2.0, 1.0, 0.0, 0.0, 0.0] };
        let camera = perspective_camera();
        // camera_pos = (0, 0, 5); distances chosen either side of 0.5.
        let near = CompressedTransform::new(Vec3::new(0.0, 0.0, 4.7), Quat::IDENTITY, 1.0);
        let far = CompressedTransform::new(Vec3::new(0.0, 0.0, 4.3), Quat::IDENTITY, 1.0);

        let near_result = cull_camera(&near, unit_bounds(), camera, 1.0, lods);
        let far_result = cull_camera(&far, unit_bounds(), camera, 1.0, lods);
        assert_eq!(near_result.lod, 0);
        assert_eq!(far_result.lod, 1);
    }

    #[test]
    fn s4_instance_behind_camera_is_shadow_visible_within_distance() {
        let transform = CompressedTransform::new(Vec3::new(0.0, 0.0, 20.0), Quat::IDENTITY, 1.0);
        let camera_pos = Vec3::new(0.0, 0.0, 5.0);

        let camera_result = cull_camera(
            &transform,
            unit_bounds(),
            CameraParams { camera_pos, ..perspective_camera() },
            1.0,
            generous_lods(),
        );
        assert!(!camera_result.visible, "instance behind the camera must not pass the camera pass");

        assert!(visible_in_shadow_pass(&transform, unit_bounds(), camera_pos, 100.0));
        assert!(!visible_in_shadow_pass(&transform, unit_bounds(), camera_pos, 10.0));
    }

    #[test]
    fn s5_scatter_visible_count_matches_plane_frustum_half_space() {
        // 65536 instances on a uniform x/y grid, alternating in front of
        // vs. far behind the camera along its view axis, so exactly half
        // the grid is inside the frustum.
        const N: u32 = 1 << 16;
        const SIDE: u32 = 256; // 256 * 256 = 65536
        let camera = perspective_camera();
        let bounds = Bounds { center: Vec3::ZERO, extents: Vec3::splat(0.01) };
        let lods = generous_lods();

        let mut visible_count = 0u32;
        for i in 0..N {
            let gx = (i % SIDE) as f32 * 0.001 - 0.128;
            let gy = (i / SIDE % SIDE) as f32 * 0.001 - 0.128;
            let z = if i % 2 == 0 { 0.0 } else { 2000.0 };
            let transform = CompressedTransform::new(Vec3::new(gx, gy, z), Quat::IDENTITY, 1.0);
            let result = cull_camera(&transform, bounds, camera, 1.0, lods);
            if result.visible {
                visible_count += 1;
            }
        }
        assert_eq!(visible_count, N / 2);
    }

    #[test]
    fn inside_bounds_forces_visible_regardless_of_lod_distance_property() {
        // Testable property 7: camera inside the instance's AABB is
        // always visible even with an aggressive LOD cull distance.
        let lods = LodTable { lod_count: 1, screen_heights: [1e6, 0.0, 0.0, 0.0, 0.0] };
        let camera = CameraParams { camera_pos: Vec3::ZERO, ..perspective_camera() };
        let transform = CompressedTransform::new(Vec3::ZERO, Quat::IDENTITY, 1.0);
        let result = cull_camera(&transform, unit_bounds(), camera, 1.0, lods);
        assert!(result.visible, "camera inside instance bounds must be visible despite aggressive LOD cull");
    }
}
