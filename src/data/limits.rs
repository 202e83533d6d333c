//! Fixed capacity limits from the data model invariants.

/// `instance_count_total <= 2^20`.
pub const MAX_INSTANCES: u32 = 1 << 20;
/// `instance_type_count <= 2^12`.
pub const MAX_INSTANCE_TYPES: u32 = 1 << 12;
/// `lod_count <= 5`.
pub const MAX_LOD_COUNT: u32 = 5;
/// `submeshes_per_instance <= 5`.
pub const MAX_SUBMESH_COUNT: u32 = 5;
/// Per-pass bin capacity implied by the pinned 11-bit `count_index`
/// field: camera-pass bins and shadow-pass bins are each a separate
/// range of at most `2^11` entries, selected by the sort key's `pass`
/// bit.
pub const MAX_BINS_PER_PASS: u32 = 1 << 11;
