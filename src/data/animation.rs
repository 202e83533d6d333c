//! Animation set registry entries.

use bytemuck::{Pod, Zeroable};

use crate::errors::{RendererError, Result};

use super::mesh::Bounds;

/// A rectangle of texels in the animation atlas, `[min, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RectU32 {
    pub min: [u32; 2],
    pub max: [u32; 2],
}

impl RectU32 {
    #[must_use]
    pub fn is_within(&self, texture_width: u32, texture_height: u32) -> bool {
        self.min[0] < self.max[0]
            && self.min[1] < self.max[1]
            && self.max[0] <= texture_width
            && self.max[1] <= texture_height
    }
}

/// A single animation clip's slice of the atlas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Animation {
    pub region: RectU32,
    pub length_seconds: f32,
    pub bounds: Bounds,
}

/// `AnimationData`: per-animation GPU record consumed by the cull
/// shader to transform and bound an instance's skeleton.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationData {
    pub bounds: Bounds,
    pub tex_region_min: glam::Vec2,
    pub tex_region_max: glam::Vec2,
}

impl From<&Animation> for AnimationData {
    fn from(anim: &Animation) -> Self {
        Self {
            bounds: anim.bounds,
            tex_region_min: glam::Vec2::new(anim.region.min[0] as f32, anim.region.min[1] as f32),
            tex_region_max: glam::Vec2::new(anim.region.max[0] as f32, anim.region.max[1] as f32),
        }
    }
}

impl AnimationData {
    /// Packs the bounds into the GPU-ABI record the cull shader reads
    /// (`animations[inst.animation_base_index + inst.animation_index]`,
    /// `shaders/cull.wgsl`). The texture region is a skinning-time
    /// concern, not a culling one, so it has no place in this record.
    #[must_use]
    pub fn to_gpu_bounds(&self) -> AnimationBoundsGpu {
        AnimationBoundsGpu {
            bounds_center: self.bounds.center.to_array(),
            _pad0: 0.0,
            bounds_extents: self.bounds.extents.to_array(),
            _pad1: 0.0,
        }
    }
}

/// GPU-ABI mirror of `shaders/cull.wgsl`'s `AnimationData`, 32 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct AnimationBoundsGpu {
    pub bounds_center: [f32; 3],
    _pad0: f32,
    pub bounds_extents: [f32; 3],
    _pad1: f32,
}

/// A registered animation set: the atlas texture plus its animation list.
#[derive(Debug, PartialEq)]
pub struct AnimationSetEntry {
    pub texture: u64,
    pub texture_size: (u32, u32),
    pub animations: Vec<Animation>,
}

impl AnimationSetEntry {
    /// Validates the bake artifact: every region must lie inside the
    /// atlas and every clip must have a strictly positive length.
    pub fn new(texture: u64, texture_size: (u32, u32), animations: Vec<Animation>) -> Result<Self> {
        let (w, h) = texture_size;
        for (i, anim) in animations.iter().enumerate() {
            if anim.length_seconds <= 0.0 {
                return Err(RendererError::MalformedBakeArtifact(format!(
                    "animation {i} has non-positive length_seconds {}",
                    anim.length_seconds
                )));
            }
            if !anim.region.is_within(w, h) {
                return Err(RendererError::MalformedBakeArtifact(format!(
                    "animation {i} region {:?} lies outside {w}x{h} atlas",
                    anim.region
                )));
            }
        }
        Ok(Self {
            texture,
            texture_size,
            animations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_bounds() -> Bounds {
        Bounds {
            center: glam::Vec3::ZERO,
            extents: glam::Vec3::ONE,
        }
    }

    #[test]
    fn rejects_non_positive_length() {
        let anim = Animation {
            region: RectU32 { min: [0, 0], max: [10, 10] },
            length_seconds: 0.0,
            bounds: dummy_bounds(),
        };
        let err = AnimationSetEntry::new(1, (64, 64), vec![anim]).unwrap_err();
        assert!(matches!(err, RendererError::MalformedBakeArtifact(_)));
    }

    #[test]
    fn rejects_region_outside_texture() {
        let anim = Animation {
            region: RectU32 { min: [0, 0], max: [100, 10] },
            length_seconds: 1.0,
            bounds: dummy_bounds(),
        };
        let err = AnimationSetEntry::new(1, (64, 64), vec![anim]).unwrap_err();
        assert!(matches!(err, RendererError::MalformedBakeArtifact(_)));
    }

    #[test]
    fn accepts_well_formed_set() {
        let anim = Animation {
            region: RectU32 { min: [0, 0], max: [32, 16] },
            length_seconds: 1.5,
            bounds: dummy_bounds(),
        };
        assert!(AnimationSetEntry::new(1, (64, 64), vec![anim]).is_ok());
    }
}
