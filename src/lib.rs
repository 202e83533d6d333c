//! throng: a GPU-driven instanced animation renderer.
//!
//! The crate is organized the way a frame actually flows: [`data`] pins
//! the GPU-ABI records, [`registry`] owns mesh/material/animation-set/
//! provider bookkeeping, [`gpu`] owns the GPU-resident buffers, and
//! [`pipeline`] wires the per-frame cull/sort/compact/set-draw-args
//! compute passes together. [`Renderer`] is the process-wide object an
//! embedder constructs, drives, and shuts down.

pub mod config;
#[cfg(any(test, feature = "gpu-tests"))]
pub mod cpu_reference;
pub mod data;
pub mod errors;
pub mod gpu;
pub mod pipeline;
pub mod registry;
pub mod skinning;

use bytemuck::Zeroable;

pub use config::{RendererSettings, VertexCompression};
pub use pipeline::{CameraParams, DrawPlan, DrawSlotInfo, DrawTables};

use data::animation::AnimationSetEntry;
use data::instance::InstanceData;
use data::limits::{MAX_BINS_PER_PASS, MAX_INSTANCES};
use data::mesh::MeshEntry;
use errors::{CapacityKind, RendererError, Result};
use gpu::resource_manager::ResourceManager;
use pipeline::FramePipeline;
use registry::handles::{AnimationSetHandle, MaterialHandle, MeshHandle, ProviderId};
use registry::provider::InstanceProvider;
use registry::Registry;

/// Compute invocations per workgroup every fixed-size kernel in
/// [`pipeline`] dispatches (the set-draw-args single-group prefix-sum,
/// the radix sort's per-digit passes). A device below this has no path
/// through the frame pipeline at all.
const REQUIRED_COMPUTE_INVOCATIONS: u32 = 1024;
/// Storage buffers the vertex shader must bind to index
/// `InstanceProperties` per-instance instead of per-draw vertex
/// attributes — the thing that makes this a GPU-driven, not a
/// CPU-instanced, renderer.
const REQUIRED_VERTEX_STORAGE_BUFFERS: u32 = 2;

/// Checks the platform capabilities the renderer requires at init:
/// compute shaders wide enough for the fixed-size kernels, indirect
/// draws that honor a non-zero `first_instance`/`base_instance` (a
/// portability hazard on some backends), and per-instance
/// storage-buffer indexing in the vertex stage.
fn missing_capabilities(device: &wgpu::Device) -> Vec<&'static str> {
    let mut missing = Vec::new();
    let limits = device.limits();

    if limits.max_compute_invocations_per_workgroup < REQUIRED_COMPUTE_INVOCATIONS {
        missing.push("compute");
    }
    if !device.features().contains(wgpu::Features::INDIRECT_FIRST_INSTANCE) {
        missing.push("indirect draw");
    }
    if limits.max_storage_buffers_per_shader_stage < REQUIRED_VERTEX_STORAGE_BUFFERS {
        missing.push("instancing");
    }
    missing
}

/// GPU state allocated by [`Renderer::init`] and torn down by
/// [`Renderer::shutdown`]. Kept separate from [`Renderer`] itself so
/// `settings` survives a shutdown/re-init cycle while every GPU-backed
/// cache does not.
struct RendererState {
    registry: Registry,
    resources: ResourceManager,
    frame: FramePipeline,
    enabled: bool,
}

/// The top-level, process-wide renderer object.
///
/// Lifecycle: [`Renderer::new`] (no GPU resources) → [`Renderer::init`]
/// (fails with [`RendererError::PlatformUnsupported`] if the device
/// can't run the frame pipeline) → any number of [`Renderer::enable`]/
/// [`Renderer::disable`] cycles, interleaved with registrations and
/// [`Renderer::run_frame`] calls → [`Renderer::shutdown`]. Calling
/// `init` again after `shutdown` builds a fresh [`Registry`],
/// [`ResourceManager`], and [`pipeline::FramePipeline`] from scratch —
/// there is no static cache anywhere in this crate for a reload to miss.
pub struct Renderer {
    settings: RendererSettings,
    state: Option<RendererState>,
}

impl Renderer {
    /// Phase 1: store configuration. No GPU resources are allocated
    /// until [`Self::init`] succeeds.
    #[must_use]
    pub fn new(settings: RendererSettings) -> Self {
        Self { settings, state: None }
    }

    /// Phase 2: platform-check the device and allocate the registry,
    /// buffers, and compute pipelines. On [`RendererError::PlatformUnsupported`]
    /// the renderer stays uninitialized and every registration/
    /// [`Self::run_frame`] call becomes a no-op.
    pub fn init(&mut self, device: &wgpu::Device) -> Result<()> {
        let missing = missing_capabilities(device);
        if !missing.is_empty() {
            log::error!("renderer platform check failed, missing: {}", missing.join(", "));
            return Err(RendererError::PlatformUnsupported { missing });
        }

        self.state = Some(RendererState {
            registry: Registry::new(),
            resources: ResourceManager::new(device),
            frame: FramePipeline::new(device),
            enabled: true,
        });
        log::info!("renderer initialized");
        Ok(())
    }

    /// Tears down GPU state. `settings` survives; a later [`Self::init`]
    /// starts every cache over from empty.
    pub fn shutdown(&mut self) {
        self.state = None;
        log::info!("renderer shut down");
    }

    /// Whether the renderer is initialized and not explicitly disabled.
    /// `false` while uninitialized, after [`Self::disable`], or after
    /// [`Self::shutdown`].
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.state.as_ref().is_some_and(|s| s.enabled)
    }

    /// Resumes drawing. A no-op if uninitialized.
    pub fn enable(&mut self) {
        if let Some(state) = &mut self.state {
            state.enabled = true;
        }
    }

    /// Pauses [`Self::run_frame`] (it returns `Ok(None)`) without
    /// discarding any registered mesh/material/animation-set/provider
    /// or GPU buffer. A no-op if uninitialized.
    pub fn disable(&mut self) {
        if let Some(state) = &mut self.state {
            state.enabled = false;
        }
    }

    #[must_use]
    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut RendererSettings {
        &mut self.settings
    }

    fn require_state(&mut self) -> Result<&mut RendererState> {
        self.state
            .as_mut()
            .ok_or_else(|| RendererError::PlatformUnsupported { missing: vec!["renderer not initialized"] })
    }

    /// Registers a mesh. After a batch of mesh/provider registrations,
    /// call [`Self::rebuild_draw_tables`] before the next [`Self::run_frame`]
    /// so the `draw_args` layout reflects the new set.
    pub fn register_mesh(&mut self, entry: MeshEntry) -> Result<MeshHandle> {
        Ok(self.require_state()?.registry.register_mesh(entry))
    }

    /// Decrements `handle`'s refcount. Returns whether it actually freed
    /// the mesh (i.e. this was the last reference).
    pub fn deregister_mesh(&mut self, handle: MeshHandle) -> bool {
        self.state.as_mut().is_some_and(|state| state.registry.deregister_mesh(handle))
    }

    pub fn register_material(&mut self, opaque_id: u64) -> Result<MaterialHandle> {
        Ok(self.require_state()?.registry.register_material(opaque_id))
    }

    /// Decrements `handle`'s refcount. Returns whether it actually freed
    /// the material.
    pub fn deregister_material(&mut self, handle: MaterialHandle) -> bool {
        self.state.as_mut().is_some_and(|state| state.registry.deregister_material(handle))
    }

    pub fn register_animation_set(&mut self, entry: AnimationSetEntry) -> Result<AnimationSetHandle> {
        Ok(self.require_state()?.registry.register_animation_set(entry))
    }

    /// Decrements `handle`'s refcount. Returns whether it actually freed
    /// the animation set.
    pub fn deregister_animation_set(&mut self, handle: AnimationSetHandle) -> bool {
        self.state.as_mut().is_some_and(|state| state.registry.deregister_animation_set(handle))
    }

    /// Registers an instance provider, allocating its `InstanceTypeKey`
    /// bins if no other provider already claims that key. Call
    /// [`Self::rebuild_draw_tables`] afterward.
    pub fn register_instance_provider(&mut self, provider: Box<dyn InstanceProvider>) -> Result<ProviderId> {
        let shadows_enabled = self.settings.shadows_enabled;
        self.require_state()?.registry.register_provider(provider, shadows_enabled)
    }

    pub fn deregister_instance_provider(&mut self, id: ProviderId) {
        if let Some(state) = &mut self.state {
            state.registry.deregister_provider(id);
        }
    }

    /// Recomputes the `InstanceTypeData`/`bin_to_type`/`draw_args`
    /// static tables from the registry's current live instance types.
    /// Not part of the per-frame hot path; call it once after any batch
    /// of mesh/provider registration or deregistration, not every frame.
    pub fn rebuild_draw_tables(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<()> {
        let state = self.require_state()?;
        state.frame.rebuild_draw_tables(device, queue, &mut state.resources, &state.registry);
        Ok(())
    }

    #[must_use]
    pub fn draw_tables(&self) -> Option<&DrawTables> {
        self.state.as_ref().map(|s| s.frame.draw_tables())
    }

    /// Runs one frame: polls every provider for its current instances,
    /// stamps in the bin addressing the registry assigned its instance
    /// type, uploads, and runs cull/sort/compact/set-draw-args.
    ///
    /// Returns `Ok(None)` if uninitialized or [`Self::disable`]d — there
    /// is nothing to draw, not an error. The shadow pass, when
    /// `settings().shadows_enabled`, gates shadow casters by distance from
    /// this same `camera` — there is no separate shadow-casting viewpoint.
    pub fn run_frame(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        camera: CameraParams,
    ) -> Result<Option<DrawPlan<'_, '_>>> {
        let Some(state) = self.state.as_mut() else { return Ok(None) };
        if !state.enabled {
            return Ok(None);
        }

        let total_instance_count: u32 = state.registry.providers_with_type().map(|(_, p)| p.instance_count()).sum();
        if total_instance_count > MAX_INSTANCES {
            return Err(RendererError::Capacity {
                kind: CapacityKind::InstanceCount,
                limit: MAX_INSTANCES,
                requested: total_instance_count,
            });
        }

        let mut cpu_instances = vec![InstanceData::zeroed(); total_instance_count as usize];
        let mut cursor = 0usize;
        for (key, provider) in state.registry.providers_with_type() {
            let count = provider.instance_count() as usize;
            if count == 0 {
                continue;
            }
            let slice = &mut cpu_instances[cursor..cursor + count];
            provider.write_instances(slice);

            if let Some((type_index, camera_bins, shadow_bins)) = state.registry.bins_for(key) {
                let shadow_base = shadow_bins.map_or(0, |b| MAX_BINS_PER_PASS + b.base);
                // `animation_base_index` is purely a function of the type's
                // animation set (every instance of `key` shares one), so the
                // driver stamps it here the same way it stamps the bin
                // bases — a provider only ever writes its animation's
                // *local* index within that set.
                let animation_base = state.registry.animation_base(key.animation_set).unwrap_or(0);
                for inst in slice.iter_mut() {
                    inst.lod_index_into_instance_type_table = type_index;
                    inst.count_base_index = camera_bins.base;
                    inst.shadow_count_base_index = shadow_base;
                    inst.animation_base_index = animation_base;
                }
            }
            cursor += count;
        }
        for (_, provider) in state.registry.providers_with_type_mut() {
            provider.clear_dirty_flags();
        }

        state.resources.ensure_instance_capacity(device, total_instance_count);
        state.resources.instance_data.write(queue, 0, bytemuck::cast_slice(&cpu_instances));

        let shadow_distance = self.settings.shadows_enabled.then_some(self.settings.shadow_distance);

        let plan = state.frame.run(
            device,
            encoder,
            &mut state.resources,
            total_instance_count,
            self.settings.lod_bias,
            camera,
            shadow_distance,
        );
        Ok(Some(plan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_device() -> Option<(wgpu::Device, wgpu::Queue)> {
        pollster::block_on(async {
            let instance = wgpu::Instance::default();
            let adapter = instance.request_adapter(&wgpu::RequestAdapterOptions::default()).await.ok()?;
            adapter
                .request_device(&wgpu::DeviceDescriptor {
                    required_features: adapter.features(),
                    required_limits: adapter.limits(),
                    ..Default::default()
                })
                .await
                .ok()
        })
    }

    #[test]
    fn new_renderer_is_not_enabled_before_init() {
        let r = Renderer::new(RendererSettings::default());
        assert!(!r.is_enabled());
    }

    #[test]
    fn register_mesh_before_init_is_an_error() {
        let mut r = Renderer::new(RendererSettings::default());
        let mesh = MeshEntry {
            gpu_mesh: 0,
            sub_mesh_count: 1,
            lods: data::mesh::LodData::new(1, [0.0; 5], |_| 0).unwrap(),
            submeshes: vec![data::mesh::SubMeshDrawInfo { index_count: 0, index_start: 0, base_vertex: 0 }],
        };
        let err = r.register_mesh(mesh).unwrap_err();
        assert!(matches!(err, RendererError::PlatformUnsupported { .. }));
    }

    #[test]
    #[cfg_attr(not(feature = "gpu-tests"), ignore = "requires gpu-tests feature and a wgpu adapter")]
    fn init_enables_and_shutdown_disables() {
        let Some((device, _queue)) = test_device() else {
            log::warn!("skipping init_enables_and_shutdown_disables: no adapter available");
            return;
        };
        let mut r = Renderer::new(RendererSettings::default());
        if let Err(err) = r.init(&device) {
            log::warn!("skipping init_enables_and_shutdown_disables: device lacks required capabilities ({err})");
            return;
        }
        assert!(r.is_enabled());
        r.disable();
        assert!(!r.is_enabled());
        r.enable();
        assert!(r.is_enabled());
        r.shutdown();
        assert!(!r.is_enabled());
    }

    #[test]
    #[cfg_attr(not(feature = "gpu-tests"), ignore = "requires gpu-tests feature and a wgpu adapter")]
    fn run_frame_with_no_providers_returns_empty_plan() {
        let Some((device, queue)) = test_device() else {
            log::warn!("skipping run_frame_with_no_providers_returns_empty_plan: no adapter available");
            return;
        };
        let mut r = Renderer::new(RendererSettings::default());
        if let Err(err) = r.init(&device) {
            log::warn!("skipping run_frame_with_no_providers_returns_empty_plan: device lacks required capabilities ({err})");
            return;
        }
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor::default());
        let camera = CameraParams { view_proj: glam::Mat4::IDENTITY, camera_pos: glam::Vec3::ZERO, lod_scale: 1.0 };
        let plan = r.run_frame(&device, &queue, &mut encoder, camera).unwrap();
        assert!(plan.is_some());
        assert!(plan.unwrap().camera_slots.is_empty());
    }

    struct OneInstanceProvider {
        ty: registry::handles::AnimationSetHandle,
        mesh: MeshHandle,
    }

    impl InstanceProvider for OneInstanceProvider {
        fn instance_type(&self) -> data::instance_type::InstanceTypeKey {
            data::instance_type::InstanceTypeKey {
                mesh: self.mesh,
                materials: smallvec::smallvec![],
                animation_set: self.ty,
                lod_count: 1,
            }
        }
        fn instance_count(&self) -> u32 {
            1
        }
        fn write_instances(&self, out: &mut [InstanceData]) {
            out[0] = InstanceData::new(
                data::instance::CompressedTransform::new(glam::Vec3::ZERO, glam::Quat::IDENTITY, 1.0),
                0,
                0,
                0,
                0,
                0,
                0.0,
            );
        }
        fn dirty_flags(&self) -> registry::provider::DirtyFlags {
            registry::provider::DirtyFlags::empty()
        }
        fn clear_dirty_flags(&mut self) {}
    }

    /// End-to-end smoke test (S1): a registered mesh + animation set +
    /// provider survives `rebuild_draw_tables` and `run_frame` without
    /// panicking, and the provider's single visible instance produces a
    /// non-empty static draw-slot table. Regression coverage for the
    /// `lod_data`/`animation_data` GPU tables once silently never
    /// uploaded by `rebuild_draw_tables`.
    #[test]
    #[cfg_attr(not(feature = "gpu-tests"), ignore = "requires gpu-tests feature and a wgpu adapter")]
    fn registered_instance_survives_rebuild_and_run_frame() {
        let Some((device, queue)) = test_device() else {
            log::warn!("skipping registered_instance_survives_rebuild_and_run_frame: no adapter available");
            return;
        };
        let mut r = Renderer::new(RendererSettings::default());
        if let Err(err) = r.init(&device) {
            log::warn!(
                "skipping registered_instance_survives_rebuild_and_run_frame: device lacks required capabilities ({err})"
            );
            return;
        }

        let mesh = r
            .register_mesh(
                MeshEntry::new(
                    0,
                    1,
                    data::mesh::LodData::new(1, [1e-6, 0.0, 0.0, 0.0, 0.0], |_| 0).unwrap(),
                    vec![data::mesh::SubMeshDrawInfo { index_count: 3, index_start: 0, base_vertex: 0 }],
                )
                .unwrap(),
            )
            .unwrap();
        let anim_set = r
            .register_animation_set(
                AnimationSetEntry::new(
                    0,
                    (64, 64),
                    vec![data::animation::Animation {
                        region: data::animation::RectU32 { min: [0, 0], max: [32, 32] },
                        length_seconds: 1.0,
                        bounds: data::mesh::Bounds { center: glam::Vec3::ZERO, extents: glam::Vec3::ONE },
                    }],
                )
                .unwrap(),
            )
            .unwrap();
        r.register_instance_provider(Box::new(OneInstanceProvider { ty: anim_set, mesh })).unwrap();
        r.rebuild_draw_tables(&device, &queue).unwrap();

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor::default());
        let camera = CameraParams {
            view_proj: glam::Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.1, 1000.0)
                * glam::Mat4::look_at_rh(glam::Vec3::new(0.0, 0.0, 5.0), glam::Vec3::ZERO, glam::Vec3::Y),
            camera_pos: glam::Vec3::new(0.0, 0.0, 5.0),
            lod_scale: 1.0,
        };
        let plan = r.run_frame(&device, &queue, &mut encoder, camera).unwrap().unwrap();
        assert_eq!(plan.camera_slots.len(), 1);
        queue.submit(Some(encoder.finish()));
        device.poll(wgpu::PollType::wait_indefinitely()).unwrap();
    }

    /// Two distinct instance types (two meshes, hence two distinct
    /// camera-pass bins) both visible in the same frame. Regression
    /// coverage for the sort key's final packed field: with more than
    /// one live bin, a sort key built from the atomic's per-bin rank
    /// instead of the bin identity would alias two different bins'
    /// first survivor into the same sort bucket.
    #[test]
    #[cfg_attr(not(feature = "gpu-tests"), ignore = "requires gpu-tests feature and a wgpu adapter")]
    fn two_instance_types_both_survive_a_shared_frame() {
        let Some((device, queue)) = test_device() else {
            log::warn!("skipping two_instance_types_both_survive_a_shared_frame: no adapter available");
            return;
        };
        let mut r = Renderer::new(RendererSettings::default());
        if let Err(err) = r.init(&device) {
            log::warn!("skipping two_instance_types_both_survive_a_shared_frame: device lacks required capabilities ({err})");
            return;
        }

        let make_mesh = |gpu_mesh: u64| {
            MeshEntry::new(
                gpu_mesh,
                1,
                data::mesh::LodData::new(1, [1e-6, 0.0, 0.0, 0.0, 0.0], |_| 0).unwrap(),
                vec![data::mesh::SubMeshDrawInfo { index_count: 3, index_start: 0, base_vertex: 0 }],
            )
            .unwrap()
        };
        let mesh_a = r.register_mesh(make_mesh(0)).unwrap();
        let mesh_b = r.register_mesh(make_mesh(1)).unwrap();
        let anim_set = r
            .register_animation_set(
                AnimationSetEntry::new(
                    0,
                    (64, 64),
                    vec![data::animation::Animation {
                        region: data::animation::RectU32 { min: [0, 0], max: [32, 32] },
                        length_seconds: 1.0,
                        bounds: data::mesh::Bounds { center: glam::Vec3::ZERO, extents: glam::Vec3::ONE },
                    }],
                )
                .unwrap(),
            )
            .unwrap();
        r.register_instance_provider(Box::new(OneInstanceProvider { ty: anim_set, mesh: mesh_a })).unwrap();
        r.register_instance_provider(Box::new(OneInstanceProvider { ty: anim_set, mesh: mesh_b })).unwrap();
        r.rebuild_draw_tables(&device, &queue).unwrap();

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor::default());
        let camera = CameraParams {
            view_proj: glam::Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.1, 1000.0)
                * glam::Mat4::look_at_rh(glam::Vec3::new(0.0, 0.0, 5.0), glam::Vec3::ZERO, glam::Vec3::Y),
            camera_pos: glam::Vec3::new(0.0, 0.0, 5.0),
            lod_scale: 1.0,
        };
        let plan = r.run_frame(&device, &queue, &mut encoder, camera).unwrap().unwrap();
        assert_eq!(plan.camera_slots.len(), 2, "each mesh gets its own draw slot");
        queue.submit(Some(encoder.finish()));
        device.poll(wgpu::PollType::wait_indefinitely()).unwrap();
    }
}
