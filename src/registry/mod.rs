//! Registry & provider coordination.
//!
//! Owns the mesh/material/animation-set tables and the
//! `InstanceProvider` registrations, and allocates each distinct
//! `InstanceTypeKey` a contiguous bin range within the per-pass bin
//! budget. Grounded on the donor's `AssetStorage<H, T>`
//! (`assets/storage.rs`) for the generational handle tables, and its
//! `AssetTracker`/refcounted-handle pattern (`assets/handle.rs`) for
//! instance-type lifetime: a type's bins stay live as long as at least
//! one provider still references it.

pub mod handles;
pub mod provider;

use std::sync::Arc;

use rustc_hash::FxHashMap;
use slotmap::SlotMap;

use crate::data::animation::AnimationSetEntry;
use crate::data::instance_type::{BinRange, InstanceTypeKey};
use crate::data::limits::{MAX_BINS_PER_PASS, MAX_INSTANCE_TYPES};
use crate::data::mesh::MeshEntry;
use crate::errors::{CapacityKind, RendererError, Result};
use handles::{AnimationSetHandle, MaterialHandle, MeshHandle, ProviderId};
use provider::InstanceProvider;

struct InstanceTypeSlot {
    index: u32,
    refcount: u32,
    camera_bins: BinRange,
    shadow_bins: Option<BinRange>,
}

/// Mesh, material, animation-set, and instance-provider bookkeeping.
#[derive(Default)]
pub struct Registry {
    meshes: SlotMap<MeshHandle, Arc<MeshEntry>>,
    mesh_refcounts: FxHashMap<MeshHandle, u32>,
    materials: SlotMap<MaterialHandle, u64>,
    material_refcounts: FxHashMap<MaterialHandle, u32>,
    material_lookup: FxHashMap<u64, MaterialHandle>,
    animation_sets: SlotMap<AnimationSetHandle, Arc<AnimationSetEntry>>,
    animation_refcounts: FxHashMap<AnimationSetHandle, u32>,
    animation_bases: FxHashMap<AnimationSetHandle, u32>,
    providers: SlotMap<ProviderId, (InstanceTypeKey, Box<dyn InstanceProvider>)>,
    instance_types: FxHashMap<InstanceTypeKey, InstanceTypeSlot>,
    next_type_index: u32,
    next_camera_bin: u32,
    next_shadow_bin: u32,
    next_animation_base: u32,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a mesh, reference-counted: a registration whose entry is
    /// `==` to one already live bumps that entry's refcount and returns the
    /// existing handle instead of allocating a new one.
    pub fn register_mesh(&mut self, entry: MeshEntry) -> MeshHandle {
        if let Some((handle, _)) = self.meshes.iter().find(|(_, e)| e.as_ref() == &entry) {
            *self.mesh_refcounts.entry(handle).or_insert(1) += 1;
            return handle;
        }
        let handle = self.meshes.insert(Arc::new(entry));
        self.mesh_refcounts.insert(handle, 1);
        handle
    }

    /// Decrements `handle`'s refcount, freeing the entry on reaching zero.
    /// Returns whether the entry was actually freed.
    pub fn deregister_mesh(&mut self, handle: MeshHandle) -> bool {
        let Some(count) = self.mesh_refcounts.get_mut(&handle) else {
            return false;
        };
        *count -= 1;
        if *count > 0 {
            return false;
        }
        self.mesh_refcounts.remove(&handle);
        self.meshes.remove(handle);
        true
    }

    #[must_use]
    pub fn mesh(&self, handle: MeshHandle) -> Option<&Arc<MeshEntry>> {
        self.meshes.get(handle)
    }

    /// Registers a material, reference-counted on `opaque_id`: a duplicate
    /// `opaque_id` bumps the existing handle's refcount instead of
    /// allocating a new one.
    pub fn register_material(&mut self, opaque_id: u64) -> MaterialHandle {
        if let Some(&handle) = self.material_lookup.get(&opaque_id) {
            *self.material_refcounts.entry(handle).or_insert(1) += 1;
            return handle;
        }
        let handle = self.materials.insert(opaque_id);
        self.material_lookup.insert(opaque_id, handle);
        self.material_refcounts.insert(handle, 1);
        handle
    }

    /// Decrements `handle`'s refcount, freeing the entry on reaching zero.
    /// Returns whether the entry was actually freed.
    pub fn deregister_material(&mut self, handle: MaterialHandle) -> bool {
        let Some(count) = self.material_refcounts.get_mut(&handle) else {
            return false;
        };
        *count -= 1;
        if *count > 0 {
            return false;
        }
        self.material_refcounts.remove(&handle);
        if let Some(opaque_id) = self.materials.remove(handle) {
            self.material_lookup.remove(&opaque_id);
        }
        true
    }

    /// Registers an animation set, reference-counted: a registration whose
    /// entry is `==` to one already live bumps that entry's refcount and
    /// returns the existing handle. Otherwise bump-allocates it a base
    /// offset into the flat `AnimationData` buffer (never reclaimed,
    /// mirroring bin allocation — see [`Self::deregister_provider`]).
    pub fn register_animation_set(&mut self, entry: AnimationSetEntry) -> AnimationSetHandle {
        if let Some((handle, _)) = self.animation_sets.iter().find(|(_, e)| e.as_ref() == &entry) {
            *self.animation_refcounts.entry(handle).or_insert(1) += 1;
            return handle;
        }
        let base = self.next_animation_base;
        self.next_animation_base += entry.animations.len() as u32;
        let handle = self.animation_sets.insert(Arc::new(entry));
        self.animation_bases.insert(handle, base);
        self.animation_refcounts.insert(handle, 1);
        handle
    }

    /// Decrements `handle`'s refcount, freeing the entry on reaching zero.
    /// Returns whether the entry was actually freed. The bump-allocated
    /// base offset is not reclaimed, matching bin-range release.
    pub fn deregister_animation_set(&mut self, handle: AnimationSetHandle) -> bool {
        let Some(count) = self.animation_refcounts.get_mut(&handle) else {
            return false;
        };
        *count -= 1;
        if *count > 0 {
            return false;
        }
        self.animation_refcounts.remove(&handle);
        self.animation_sets.remove(handle);
        self.animation_bases.remove(&handle);
        true
    }

    #[must_use]
    pub fn animation_set(&self, handle: AnimationSetHandle) -> Option<&Arc<AnimationSetEntry>> {
        self.animation_sets.get(handle)
    }

    /// Base offset of `handle`'s animations into the flat `AnimationData`
    /// buffer. An [`InstanceProvider`] needs this to populate
    /// `InstanceData::animation_base_index` for its instances.
    #[must_use]
    pub fn animation_base(&self, handle: AnimationSetHandle) -> Option<u32> {
        self.animation_bases.get(&handle).copied()
    }

    /// Every live animation set paired with its base offset, for the
    /// frame pipeline to build the flat `AnimationData` GPU table.
    pub fn animation_sets(&self) -> impl Iterator<Item = (u32, &Arc<AnimationSetEntry>)> + '_ {
        self.animation_sets
            .iter()
            .filter_map(|(h, e)| self.animation_bases.get(&h).map(|&base| (base, e)))
    }

    /// High-water mark of the animation-base bump allocator: the minimum
    /// `AnimationData` buffer length covering every registered animation.
    #[must_use]
    pub fn animation_data_count(&self) -> u32 {
        self.next_animation_base
    }

    /// Number of distinct `InstanceTypeKey`s ever acquired; the minimum
    /// dense `LodData` buffer length, since `instance_type_index` ranges
    /// over `0..instance_type_count()`.
    #[must_use]
    pub fn instance_type_count(&self) -> u32 {
        self.next_type_index
    }

    /// Registers an instance provider, allocating bins for its
    /// `InstanceTypeKey` if this is the first provider to use it.
    pub fn register_provider(
        &mut self,
        provider: Box<dyn InstanceProvider>,
        shadows_enabled: bool,
    ) -> Result<ProviderId> {
        let key = provider.instance_type();
        self.acquire_instance_type(&key, shadows_enabled)?;
        Ok(self.providers.insert((key, provider)))
    }

    /// Unregisters a provider, releasing its instance type's bin range
    /// once no other provider references it.
    ///
    /// Bin ranges are bump-allocated and are not reclaimed for reuse when
    /// the last reference is released (DESIGN.md) — acceptable because
    /// registration is a setup-time operation, not a per-frame one.
    pub fn deregister_provider(&mut self, id: ProviderId) {
        if let Some((key, _)) = self.providers.remove(id)
            && let Some(slot) = self.instance_types.get_mut(&key)
        {
            slot.refcount -= 1;
        }
    }

    /// Key, instance type index, and bin ranges for every live
    /// `InstanceTypeKey`. Consumed by the frame pipeline to build the
    /// `InstanceTypeData`/`bin_to_type`/`DrawArgs` tables.
    pub fn instance_types(&self) -> impl Iterator<Item = (&InstanceTypeKey, u32, BinRange, Option<BinRange>)> + '_ {
        self.instance_types
            .iter()
            .map(|(key, s)| (key, s.index, s.camera_bins, s.shadow_bins))
    }

    /// Number of camera-pass bins handed out so far; the high-water mark
    /// of the bump allocator, not a count of currently-live bins.
    #[must_use]
    pub fn camera_bin_count(&self) -> u32 {
        self.next_camera_bin
    }

    /// Number of shadow-pass bins handed out so far.
    #[must_use]
    pub fn shadow_bin_count(&self) -> u32 {
        self.next_shadow_bin
    }

    /// Every live provider paired with its `InstanceTypeKey`. The frame
    /// driver uses the key to resolve the provider's bin addressing via
    /// [`Self::bins_for`] before writing its instances into the CPU
    /// staging buffer.
    pub fn providers_with_type(&self) -> impl Iterator<Item = (&InstanceTypeKey, &dyn InstanceProvider)> + '_ {
        self.providers.values().map(|(k, p)| (k, p.as_ref()))
    }

    /// Mutable version of [`Self::providers_with_type`], for the
    /// `clear_dirty_flags` call after a frame has consumed a provider's
    /// state.
    pub fn providers_with_type_mut(&mut self) -> impl Iterator<Item = (&InstanceTypeKey, &mut Box<dyn InstanceProvider>)> + '_ {
        self.providers.values_mut().map(|(k, p)| (&*k, p))
    }

    /// Resolved `(instance_type_index, camera_bins, shadow_bins)` for a
    /// live instance type key, as allocated by [`Self::acquire_instance_type`].
    #[must_use]
    pub fn bins_for(&self, key: &InstanceTypeKey) -> Option<(u32, BinRange, Option<BinRange>)> {
        self.instance_types.get(key).map(|s| (s.index, s.camera_bins, s.shadow_bins))
    }

    fn acquire_instance_type(&mut self, key: &InstanceTypeKey, shadows_enabled: bool) -> Result<()> {
        if let Some(slot) = self.instance_types.get_mut(key) {
            slot.refcount += 1;
            return Ok(());
        }

        if self.next_type_index >= MAX_INSTANCE_TYPES {
            return Err(RendererError::Capacity {
                kind: CapacityKind::InstanceTypeCount,
                limit: MAX_INSTANCE_TYPES,
                requested: self.next_type_index + 1,
            });
        }

        let camera_bins = self.alloc_bins(Pass::Camera, key.lod_count)?;
        let shadow_bins = if shadows_enabled {
            Some(self.alloc_bins(Pass::Shadow, key.lod_count)?)
        } else {
            None
        };

        let index = self.next_type_index;
        self.next_type_index += 1;
        self.instance_types.insert(
            key.clone(),
            InstanceTypeSlot {
                index,
                refcount: 1,
                camera_bins,
                shadow_bins,
            },
        );
        Ok(())
    }

    fn alloc_bins(&mut self, pass: Pass, count: u32) -> Result<BinRange> {
        let cursor = match pass {
            Pass::Camera => &mut self.next_camera_bin,
            Pass::Shadow => &mut self.next_shadow_bin,
        };
        let base = *cursor;
        let requested = base + count;
        if requested > MAX_BINS_PER_PASS {
            return Err(RendererError::Capacity {
                kind: CapacityKind::InstanceTypeCount,
                limit: MAX_BINS_PER_PASS,
                requested,
            });
        }
        *cursor = requested;
        Ok(BinRange { base, count })
    }
}

#[derive(Clone, Copy)]
enum Pass {
    Camera,
    Shadow,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::instance::InstanceData;
    use smallvec::smallvec;

    struct StubProvider {
        ty: InstanceTypeKey,
        count: u32,
    }

    impl InstanceProvider for StubProvider {
        fn instance_type(&self) -> InstanceTypeKey {
            self.ty.clone()
        }
        fn instance_count(&self) -> u32 {
            self.count
        }
        fn write_instances(&self, _out: &mut [InstanceData]) {}
        fn dirty_flags(&self) -> provider::DirtyFlags {
            provider::DirtyFlags::empty()
        }
        fn clear_dirty_flags(&mut self) {}
    }

    fn dummy_key(lod_count: u32) -> InstanceTypeKey {
        InstanceTypeKey {
            mesh: MeshHandle::default(),
            materials: smallvec![],
            animation_set: AnimationSetHandle::default(),
            lod_count,
        }
    }

    #[test]
    fn duplicate_material_registration_returns_same_handle_and_refcounts() {
        let mut reg = Registry::new();
        let a = reg.register_material(42);
        let b = reg.register_material(42);
        assert_eq!(a, b);
        assert_eq!(reg.materials.len(), 1);

        assert!(!reg.deregister_material(a), "first release of two refs must not free");
        assert!(reg.deregister_material(b), "last release must free");
        assert!(!reg.deregister_material(a), "already freed");
    }

    #[test]
    fn distinct_materials_get_distinct_handles() {
        let mut reg = Registry::new();
        let a = reg.register_material(1);
        let b = reg.register_material(2);
        assert_ne!(a, b);
    }

    #[test]
    fn duplicate_mesh_registration_returns_same_handle_and_refcounts() {
        let mut reg = Registry::new();
        let lods = crate::data::mesh::LodData::new(1, [1.0, 0.0, 0.0, 0.0, 0.0], |_| 0).unwrap();
        let mesh = || crate::data::mesh::MeshEntry::new(7, 1, lods, vec![crate::data::mesh::SubMeshDrawInfo { index_count: 3, index_start: 0, base_vertex: 0 }]).unwrap();

        let a = reg.register_mesh(mesh());
        let b = reg.register_mesh(mesh());
        assert_eq!(a, b);
        assert_eq!(reg.meshes.len(), 1);

        assert!(!reg.deregister_mesh(a));
        assert!(reg.deregister_mesh(b));
    }

    #[test]
    fn duplicate_animation_set_registration_returns_same_handle_and_refcounts() {
        use crate::data::animation::{Animation, AnimationSetEntry, RectU32};
        use crate::data::mesh::Bounds;

        fn anim_set() -> AnimationSetEntry {
            let clip = Animation {
                region: RectU32 { min: [0, 0], max: [4, 4] },
                length_seconds: 1.0,
                bounds: Bounds { center: glam::Vec3::ZERO, extents: glam::Vec3::ONE },
            };
            AnimationSetEntry::new(0, (64, 64), vec![clip]).unwrap()
        }

        let mut reg = Registry::new();
        let a = reg.register_animation_set(anim_set());
        let b = reg.register_animation_set(anim_set());
        assert_eq!(a, b);
        assert_eq!(reg.animation_data_count(), 1, "duplicate registration must not bump the base allocator");

        assert!(!reg.deregister_animation_set(a));
        assert!(reg.deregister_animation_set(b));
    }

    #[test]
    fn sharing_an_instance_type_shares_one_bin_range() {
        let mut reg = Registry::new();
        let key = dummy_key(3);
        let a = reg
            .register_provider(Box::new(StubProvider { ty: key.clone(), count: 10 }), false)
            .unwrap();
        let b = reg
            .register_provider(Box::new(StubProvider { ty: key.clone(), count: 5 }), false)
            .unwrap();
        assert_eq!(reg.instance_types().count(), 1);
        reg.deregister_provider(a);
        assert_eq!(reg.instance_types().count(), 1);
        reg.deregister_provider(b);
    }

    #[test]
    fn animation_sets_get_sequential_non_overlapping_bases() {
        use crate::data::animation::{Animation, AnimationSetEntry, RectU32};
        use crate::data::mesh::Bounds;

        fn anim_set(n: usize) -> AnimationSetEntry {
            let clip = Animation {
                region: RectU32 { min: [0, 0], max: [4, 4] },
                length_seconds: 1.0,
                bounds: Bounds { center: glam::Vec3::ZERO, extents: glam::Vec3::ONE },
            };
            AnimationSetEntry::new(0, (64, 64), vec![clip; n]).unwrap()
        }

        let mut reg = Registry::new();
        let a = reg.register_animation_set(anim_set(3));
        let b = reg.register_animation_set(anim_set(2));
        assert_eq!(reg.animation_base(a), Some(0));
        assert_eq!(reg.animation_base(b), Some(3));
        assert_eq!(reg.animation_data_count(), 5);
    }

    #[test]
    fn shadow_bins_only_allocated_when_enabled() {
        let mut reg = Registry::new();
        let key = dummy_key(2);
        reg.register_provider(Box::new(StubProvider { ty: key, count: 1 }), true)
            .unwrap();
        let (_, _, _camera, shadow) = reg.instance_types().next().unwrap();
        assert!(shadow.is_some());
    }

    #[test]
    fn distinct_lod_counts_are_distinct_instance_types() {
        let mut reg = Registry::new();
        reg.register_provider(Box::new(StubProvider { ty: dummy_key(1), count: 1 }), false)
            .unwrap();
        reg.register_provider(Box::new(StubProvider { ty: dummy_key(2), count: 1 }), false)
            .unwrap();
        assert_eq!(reg.instance_types().count(), 2);
    }
}
