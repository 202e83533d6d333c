//! Per-instance GPU data: the compressed transform and the instance record.
//!
//! Mirrors the donor engine's `DynamicModelUniforms`/`Mat3Uniform` pattern
//! of packing transform data into GPU-ABI structs (see
//! `renderer/core/resources` uniform helpers), generalized here to the
//! smallest-three-compressed, single-uniform-scale transform the spec
//! pins for instance data.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec3};

/// Bits per packed quaternion component.
const COMP_BITS: u32 = 10;
const COMP_MASK: u32 = (1 << COMP_BITS) - 1;
const COMP_MAX: f32 = COMP_MASK as f32;

/// Smallest-three quaternion compression.
///
/// Drops the largest-magnitude component (recoverable from the unit
/// constraint) and stores the other three mapped from `[-1, 1]` to a
/// 10-bit integer, plus a 2-bit index of which component was dropped.
#[must_use]
pub fn compress_rotation(q: Quat) -> u32 {
    let comps = [q.x, q.y, q.z, q.w];

    let mut dropped = 0usize;
    let mut largest = comps[0].abs();
    for (i, &c) in comps.iter().enumerate().skip(1) {
        if c.abs() > largest {
            largest = c.abs();
            dropped = i;
        }
    }

    // q and -q represent the same rotation; flip so the dropped
    // component is positive and can be reconstructed with `sqrt`.
    let sign = if comps[dropped] < 0.0 { -1.0 } else { 1.0 };

    let mut packed = (dropped as u32) << 30;
    let mut shift = 20i32;
    for (i, &c) in comps.iter().enumerate() {
        if i == dropped {
            continue;
        }
        let v = (c * sign).clamp(-1.0, 1.0);
        let encoded = (((v + 1.0) * 0.5 * COMP_MAX).round() as u32).min(COMP_MASK);
        packed |= encoded << shift;
        shift -= 10;
    }
    packed
}

/// Inverse of [`compress_rotation`].
#[must_use]
pub fn decompress_rotation(packed: u32) -> Quat {
    let dropped = (packed >> 30) as usize & 0b11;

    let mut shift = 20i32;
    let mut out = [0.0f32; 4];
    let mut sum_sq = 0.0f32;
    for (i, slot) in out.iter_mut().enumerate() {
        if i == dropped {
            continue;
        }
        let encoded = (packed >> shift) & COMP_MASK;
        let v = (encoded as f32 / COMP_MAX) * 2.0 - 1.0;
        *slot = v;
        sum_sq += v * v;
        shift -= 10;
    }
    out[dropped] = (1.0 - sum_sq).max(0.0).sqrt();

    Quat::from_xyzw(out[0], out[1], out[2], out[3]).normalize()
}

/// Compressed affine transform, uniform scale: `{ position, rotation, scale }`.
///
/// GPU ABI — `repr(C)`, laid out exactly as the cull/compact shaders read
/// it: three f32 for position, one packed u32 for rotation, one f32 for
/// uniform scale.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct CompressedTransform {
    pub position: [f32; 3],
    pub rotation_packed: u32,
    pub scale: f32,
    _pad: [f32; 3],
}

impl CompressedTransform {
    #[must_use]
    pub fn new(position: Vec3, rotation: Quat, scale: f32) -> Self {
        Self {
            position: position.to_array(),
            rotation_packed: compress_rotation(rotation),
            scale,
            _pad: [0.0; 3],
        }
    }

    #[must_use]
    pub fn rotation(&self) -> Quat {
        decompress_rotation(self.rotation_packed)
    }

    /// Decompresses into a full 4x4 model matrix (used by the compaction
    /// pass).
    #[must_use]
    pub fn to_model_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            Vec3::splat(self.scale),
            self.rotation(),
            Vec3::from(self.position),
        )
    }
}

/// Per-instance GPU record, `InstanceData`.
///
/// GPU ABI — read by the cull shader.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct InstanceData {
    pub transform: CompressedTransform,
    pub lod_index_into_instance_type_table: u32,
    /// Camera-pass `count_slot` base: `count_base_index + lod` indexes
    /// `InstanceCounts`/`sort_keys`' camera-pass bin for this instance's
    /// type. Set by the caller from that type's `camera_bins.base`.
    pub count_base_index: u32,
    /// Shadow-pass equivalent of `count_base_index`, already offset into
    /// the shadow-pass half of the bin space (`MAX_BINS_PER_PASS +
    /// shadow_bins.base`). Unused (may be left 0) if shadows are disabled
    /// for this instance's type.
    pub shadow_count_base_index: u32,
    /// Base offset into the flat `AnimationData` buffer for this
    /// instance's type's animation set. Like `count_base_index`, this is
    /// stamped by the frame driver from the registry (`Registry::animation_base`),
    /// not by an `InstanceProvider` — a provider writes only `animation_index`,
    /// local to its animation set.
    pub animation_base_index: u32,
    /// Local index into the instance's animation set, provider-supplied.
    pub animation_index: u32,
    pub animation_time: f32,
    _pad: [u32; 2],
}

impl InstanceData {
    #[must_use]
    pub fn new(
        transform: CompressedTransform,
        instance_type_index: u32,
        count_base_index: u32,
        shadow_count_base_index: u32,
        animation_base_index: u32,
        animation_index: u32,
        animation_time: f32,
    ) -> Self {
        debug_assert!((0.0..1.0).contains(&animation_time) || animation_time == 0.0);
        Self {
            transform,
            lod_index_into_instance_type_table: instance_type_index,
            count_base_index,
            shadow_count_base_index,
            animation_base_index,
            animation_index,
            animation_time,
            _pad: [0; 2],
        }
    }

    /// NaN transforms are culled rather than rejected; detect them here so
    /// the CPU reference culler and the GPU shader agree on the rule.
    #[must_use]
    pub fn has_nan_transform(&self) -> bool {
        self.transform.position.iter().any(|c| c.is_nan())
            || self.transform.scale.is_nan()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::TAU;

    fn angular_error_degrees(a: Quat, b: Quat) -> f32 {
        let dot = a.dot(b).abs().clamp(-1.0, 1.0);
        2.0 * dot.acos().to_degrees()
    }

    #[test]
    fn round_trip_identity() {
        let q = Quat::IDENTITY;
        let packed = compress_rotation(q);
        let back = decompress_rotation(packed);
        assert!(angular_error_degrees(q, back) < 0.5);
    }

    #[test]
    fn round_trip_random_quaternions_within_tolerance() {
        // Matches S6: 10^4 random unit quaternions, max per-axis error < 2^-9.
        use rand::RngExt;
        let mut rng = rand::rng();
        let max_allowed_deg = TAU.to_degrees() * (1.0 / 1024.0); // ~0.35 deg, per property 5
        for _ in 0..10_000 {
            let q = Quat::from_xyzw(
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
            )
            .normalize();
            let packed = compress_rotation(q);
            let back = decompress_rotation(packed);
            let err = angular_error_degrees(q, back);
            assert!(
                err <= max_allowed_deg,
                "angular error {err} exceeds {max_allowed_deg} for {q:?}"
            );
        }
    }

    #[test]
    fn compressed_transform_round_trips_model_matrix() {
        let pos = Vec3::new(1.0, 2.0, 3.0);
        let rot = Quat::from_rotation_y(0.7);
        let ct = CompressedTransform::new(pos, rot, 2.0);
        let m = ct.to_model_matrix();
        let (scale, rotation, translation) = m.to_scale_rotation_translation();
        assert!((scale - Vec3::splat(2.0)).length() < 1e-4);
        assert!((translation - pos).length() < 1e-4);
        assert!(angular_error_degrees(rotation, rot) < 0.5);
    }

    #[test]
    fn nan_transform_is_detected() {
        let mut ct = CompressedTransform::new(Vec3::ZERO, Quat::IDENTITY, 1.0);
        ct.position[0] = f32::NAN;
        let inst = InstanceData::new(ct, 0, 0, 0, 0, 0, 0.0);
        assert!(inst.has_nan_transform());
    }
}
