//! `InstanceProvider`: the capability contract a caller implements to
//! feed instances into the renderer.
//!
//! Grounded on the donor's `Tracked<T>` / object-manager dirty-bit idiom
//! (`renderer/core/resources/tracked.rs`, `renderer/object_manager.rs`):
//! a provider reports which of its buckets changed since the last frame
//! so the resource manager only re-uploads what moved.

use bitflags::bitflags;

use crate::data::instance::InstanceData;
use crate::data::instance_type::InstanceTypeKey;

bitflags! {
    /// What changed on an `InstanceProvider` since its dirty flags were
    /// last cleared. The resource manager re-uploads exactly the buffers
    /// implied by the set bits and leaves the rest alone.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DirtyFlags: u32 {
        /// The provider's `instance_count()` changed; buffers may need to grow.
        const INSTANCE_COUNT    = 1 << 0;
        /// Per-instance transforms/animation state changed.
        const PER_INSTANCE_DATA = 1 << 1;
        /// The provider now points at a different mesh.
        const MESH              = 1 << 2;
        /// The submesh set for the current mesh changed.
        const SUB_MESHES        = 1 << 3;
        /// The material assignment changed.
        const MATERIALS         = 1 << 4;
        /// The LOD configuration (screen heights / shadow offsets) changed.
        const LODS              = 1 << 5;
        /// The animation set or per-instance animation routing changed.
        const ANIMATION         = 1 << 6;
    }
}

/// A source of instances for one `InstanceTypeKey`.
///
/// Implemented by callers (e.g. a scene graph, a particle system) and
/// registered with [`crate::registry::Registry::register_provider`].
/// The renderer polls `dirty_flags()`/`get_state()` once per frame and
/// calls `clear_dirty_flags()` after it has consumed the update.
pub trait InstanceProvider: Send + Sync {
    /// The `(mesh, materials, animation_set, lod_count)` combination this
    /// provider's instances share. Must stay constant across the
    /// provider's lifetime — register a new provider to change it.
    fn instance_type(&self) -> InstanceTypeKey;

    /// Number of instances currently supplied.
    fn instance_count(&self) -> u32;

    /// Writes this provider's instances into `out`
    /// (`out.len() == instance_count()`).
    fn write_instances(&self, out: &mut [InstanceData]);

    /// What changed since the last `clear_dirty_flags` call.
    fn dirty_flags(&self) -> DirtyFlags;

    /// Acknowledges the current dirty state has been consumed.
    fn clear_dirty_flags(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dirty_flags_compose() {
        let f = DirtyFlags::MESH | DirtyFlags::LODS;
        assert!(f.contains(DirtyFlags::MESH));
        assert!(f.contains(DirtyFlags::LODS));
        assert!(!f.contains(DirtyFlags::MATERIALS));
    }
}
