//! `InstanceType` bookkeeping: the key that identifies a distinct
//! `(mesh, submesh-set, material-set, animation-set, lod-config)`
//! combination, and the packed `InstanceTypeData` GPU record.

use bytemuck::{Pod, Zeroable};
use smallvec::SmallVec;

use crate::registry::handles::{AnimationSetHandle, MaterialHandle, MeshHandle};

/// Identifies a distinct combination that is binned together for sorting
/// and draw submission. Hashable/comparable so the registry can dedupe
/// repeated registrations to the same instance type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceTypeKey {
    pub mesh: MeshHandle,
    pub materials: SmallVec<[MaterialHandle; 5]>,
    pub animation_set: AnimationSetHandle,
    pub lod_count: u32,
}

/// The contiguous bin range an instance type owns within one pass
/// (camera or shadow). This range lives inside a per-pass-local
/// `count_index` space bounded by
/// [`crate::data::limits::MAX_BINS_PER_PASS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinRange {
    pub base: u32,
    pub count: u32,
}

/// GPU-visible packed record: `draw_call_count << 16 | draw_args_base`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct InstanceTypeData(pub u32);

impl InstanceTypeData {
    #[must_use]
    pub fn pack(draw_call_count: u32, draw_args_base: u32) -> Self {
        debug_assert!(draw_call_count <= 0xFFFF);
        debug_assert!(draw_args_base <= 0xFFFF);
        Self((draw_call_count << 16) | (draw_args_base & 0xFFFF))
    }

    #[must_use]
    pub fn draw_call_count(self) -> u32 {
        self.0 >> 16
    }

    #[must_use]
    pub fn draw_args_base(self) -> u32 {
        self.0 & 0xFFFF
    }
}
