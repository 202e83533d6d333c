//! Opaque registry handles.
//!
//! Generational `slotmap` keys, as the donor's `AssetStorage<H, T>` uses
//! for its asset maps (`assets/storage.rs`) — a handle from a deregistered
//! slot can never alias a freshly registered one.

use slotmap::new_key_type;

new_key_type! {
    /// Handle to a registered mesh (gpu mesh + per-LOD submesh layout).
    pub struct MeshHandle;
    /// Handle to a registered material.
    pub struct MaterialHandle;
    /// Handle to a registered animation set (atlas texture + clip list).
    pub struct AnimationSetHandle;
    /// Handle identifying an `InstanceProvider` registration.
    pub struct ProviderId;
}
