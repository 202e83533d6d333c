//! `InstanceProperties`: the dense, post-compaction per-instance
//! record consumed by the vertex shader, written by the compact pass at
//! the position the sorted, surviving instance sorts to.

use bytemuck::{Pod, Zeroable};

/// GPU ABI — two 3x4 row-major matrices plus animation sampling state.
///
/// `model_inv` is the inverse-transpose of `model`'s upper 3x3, used for
/// normal transformation; both are stored as 3x4 (not 4x4) since the
/// bottom row of an affine matrix is always `[0, 0, 0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct InstanceProperties {
    pub model: [[f32; 4]; 3],
    pub model_inv: [[f32; 4]; 3],
    pub animation_index: u32,
    pub animation_time: f32,
    _pad: [f32; 2],
}

impl InstanceProperties {
    #[must_use]
    pub fn new(model: glam::Mat4, animation_index: u32, animation_time: f32) -> Self {
        let model_inv_3x3 = glam::Mat3::from_mat4(model).inverse().transpose();
        Self {
            model: to_3x4(model),
            model_inv: to_3x4(glam::Mat4::from_mat3(model_inv_3x3)),
            animation_index,
            animation_time,
            _pad: [0.0; 2],
        }
    }
}

fn to_3x4(m: glam::Mat4) -> [[f32; 4]; 3] {
    let cols = m.to_cols_array_2d();
    [
        [cols[0][0], cols[1][0], cols[2][0], cols[3][0]],
        [cols[0][1], cols[1][1], cols[2][1], cols[3][1]],
        [cols[0][2], cols[1][2], cols[2][2], cols[3][2]],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat4, Quat, Vec3};

    #[test]
    #[allow(clippy::float_cmp)]
    fn encodes_translation_in_last_column() {
        let m = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let props = InstanceProperties::new(m, 0, 0.0);
        assert_eq!(props.model[0][3], 1.0);
        assert_eq!(props.model[1][3], 2.0);
        assert_eq!(props.model[2][3], 3.0);
    }

    #[test]
    fn model_inv_undoes_rotation_for_normals() {
        let m = Mat4::from_rotation_translation(Quat::from_rotation_y(1.0), Vec3::ZERO);
        let props = InstanceProperties::new(m, 0, 0.0);
        // For a pure rotation the inverse-transpose of the 3x3 equals the
        // rotation itself, so model_inv's rotation part matches model's.
        for row in 0..3 {
            for col in 0..3 {
                assert!((props.model_inv[row][col] - props.model[row][col]).abs() < 1e-4);
            }
        }
    }
}
