//! Frame pipeline orchestration: wires reset-counts, cull, sort,
//! compact, and set-draw-args into the per-frame GPU-driven draw
//! pipeline. Submitting the resulting indirect draws is out of scope
//! (Non-goals) — [`FramePipeline::run`] only returns a [`DrawPlan`]
//! naming which `draw_args` slots are live and what to bind for each;
//! the caller owns the render pass and the `multi_draw_indexed_indirect`
//! call.
//!
//! Grounded on the donor's `FrameGraph::execute` (`renderer/graph/mod.rs`)
//! for the "build a fixed pass list once, run it every frame" shape.

use std::ops::Range;

use bytemuck::Zeroable;

use crate::data::animation::{AnimationBoundsGpu, AnimationData};
use crate::data::draw_args::DrawArgs;
use crate::data::instance_type::InstanceTypeData;
use crate::data::limits::MAX_BINS_PER_PASS;
use crate::data::mesh::LodDataGpu;
use crate::gpu::buffer::GrowBuffer;
use crate::gpu::resource_manager::ResourceManager;
use crate::registry::handles::{MaterialHandle, MeshHandle};
use crate::registry::Registry;

use super::compact::CompactPass;
use super::cull::{CullFrameParams, CullPass};
use super::draw_args::SetDrawArgsPass;
use super::reset_counts::ResetCountsPass;
use super::sort::SortPass;

const BIN_TO_TYPE_USAGE: wgpu::BufferUsages =
    wgpu::BufferUsages::STORAGE.union(wgpu::BufferUsages::COPY_DST);

/// Per-camera frame inputs; one of these per pass (camera, and shadow if
/// enabled).
#[derive(Debug, Clone, Copy)]
pub struct CameraParams {
    pub view_proj: glam::Mat4,
    pub camera_pos: glam::Vec3,
    pub lod_scale: f32,
}

/// What to bind to submit one live `draw_args` slot's indirect draw:
/// the mesh and material the slot's `(instance type, lod, submesh)`
/// triple resolves to.
#[derive(Debug, Clone, Copy)]
pub struct DrawSlotInfo {
    pub mesh: MeshHandle,
    pub material: Option<MaterialHandle>,
    pub lod: u32,
    pub submesh_in_lod: u32,
    pub draw_args_index: u32,
}

/// The result of rebuilding the draw tables from the registry's current
/// instance types: which `draw_args` slots exist and what each draws.
/// Recomputed only when the registered instance types change, not every
/// frame.
#[derive(Debug, Clone, Default)]
pub struct DrawTables {
    pub camera_slots: Vec<DrawSlotInfo>,
    pub shadow_slots: Vec<DrawSlotInfo>,
    pub camera_draw_args_range: Range<u32>,
    pub shadow_draw_args_range: Range<u32>,
}

/// One frame's outcome: the live slot list for each active pass, paired
/// with the `draw_args` buffer they index into. `camera_properties_offset`
/// and `shadow_properties_offset` are the element offsets into
/// `instance_properties` where each pass's compacted output starts —
/// a `DrawArgs.instance_start` from one pass must be added to that
/// pass's offset before indexing the shared buffer.
pub struct DrawPlan<'res, 'tables> {
    pub draw_args_buffer: &'res wgpu::Buffer,
    pub camera_slots: &'tables [DrawSlotInfo],
    pub camera_draw_args_range: Range<u32>,
    pub camera_properties_offset: u32,
    pub shadow_slots: &'tables [DrawSlotInfo],
    pub shadow_draw_args_range: Range<u32>,
    pub shadow_properties_offset: u32,
}

/// Ties the five compute passes together and owns the `bin_to_type`
/// mapping buffer (the one GPU resource the set-draw-args pass needs
/// that isn't already in [`ResourceManager`]).
pub struct FramePipeline {
    reset_counts: ResetCountsPass,
    cull: CullPass,
    sort: SortPass,
    compact: CompactPass,
    set_draw_args: SetDrawArgsPass,
    bin_to_type: GrowBuffer,
    tables: DrawTables,
}

impl FramePipeline {
    #[must_use]
    pub fn new(device: &wgpu::Device) -> Self {
        Self {
            reset_counts: ResetCountsPass::new(device),
            cull: CullPass::new(device),
            sort: SortPass::new(device),
            compact: CompactPass::new(device),
            set_draw_args: SetDrawArgsPass::new(device),
            bin_to_type: GrowBuffer::new(device, "bin_to_type", 4, 2 * MAX_BINS_PER_PASS, BIN_TO_TYPE_USAGE),
            tables: DrawTables::default(),
        }
    }

    /// Recomputes the dense `InstanceTypeData`/`bin_to_type`/`DrawArgs`
    /// static fields, the `LodData` table (dense by `instance_type_index`)
    /// and the flat `AnimationData` table, from the registry's current
    /// live instance types and animation sets, and uploads them. Call
    /// this whenever a mesh, animation set, provider, or instance type is
    /// registered or deregistered; it is not part of the per-frame hot
    /// path.
    pub fn rebuild_draw_tables(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, resources: &mut ResourceManager, registry: &Registry) {
        let mut entries: Vec<InstanceTypeData> = Vec::new();
        let mut bin_to_type = vec![0u32; (2 * MAX_BINS_PER_PASS) as usize];
        let mut draw_args: Vec<DrawArgs> = Vec::new();
        let mut camera_slots = Vec::new();
        let mut shadow_slots = Vec::new();
        let mut lod_entries = vec![LodDataGpu::zeroed(); registry.instance_type_count() as usize];

        for (key, type_index, camera_bins, _shadow_bins) in registry.instance_types() {
            let Some(mesh) = registry.mesh(key.mesh) else { continue };
            lod_entries[type_index as usize] = mesh.lods.to_gpu();

            for lod in 0..camera_bins.count {
                let entry_index = entries.len() as u32;
                let draw_args_base = draw_args.len() as u32;
                entries.push(InstanceTypeData::pack(mesh.sub_mesh_count, draw_args_base));
                bin_to_type[(camera_bins.base + lod) as usize] = entry_index;

                for submesh_in_lod in 0..mesh.sub_mesh_count {
                    let info = mesh.submesh_draw_info(lod, submesh_in_lod);
                    draw_args.push(DrawArgs::empty(info.index_count, info.index_start, info.base_vertex));
                    camera_slots.push(DrawSlotInfo {
                        mesh: key.mesh,
                        material: key.materials.get(submesh_in_lod as usize).copied(),
                        lod,
                        submesh_in_lod,
                        draw_args_index: draw_args_base + submesh_in_lod,
                    });
                }
            }
        }
        let camera_draw_args_range = 0..draw_args.len() as u32;

        for (key, _type_index, _camera_bins, shadow_bins) in registry.instance_types() {
            let Some(bins) = shadow_bins else { continue };
            let Some(mesh) = registry.mesh(key.mesh) else { continue };

            for lod in 0..bins.count {
                let entry_index = entries.len() as u32;
                let draw_args_base = draw_args.len() as u32;
                entries.push(InstanceTypeData::pack(mesh.sub_mesh_count, draw_args_base));
                bin_to_type[(MAX_BINS_PER_PASS + bins.base + lod) as usize] = entry_index;

                for submesh_in_lod in 0..mesh.sub_mesh_count {
                    let info = mesh.submesh_draw_info(lod, submesh_in_lod);
                    draw_args.push(DrawArgs::empty(info.index_count, info.index_start, info.base_vertex));
                    shadow_slots.push(DrawSlotInfo {
                        mesh: key.mesh,
                        material: key.materials.get(submesh_in_lod as usize).copied(),
                        lod,
                        submesh_in_lod,
                        draw_args_index: draw_args_base + submesh_in_lod,
                    });
                }
            }
        }
        let shadow_draw_args_range = camera_draw_args_range.end..draw_args.len() as u32;

        let mut animation_entries = vec![AnimationBoundsGpu::zeroed(); registry.animation_data_count() as usize];
        for (base, set) in registry.animation_sets() {
            for (i, anim) in set.animations.iter().enumerate() {
                animation_entries[base as usize + i] = AnimationData::from(anim).to_gpu_bounds();
            }
        }

        resources.ensure_type_capacity(device, entries.len() as u32, MAX_BINS_PER_PASS);
        resources.ensure_draw_args_capacity(device, draw_args.len() as u32);
        resources.ensure_lod_capacity(device, lod_entries.len() as u32);
        resources.ensure_animation_capacity(device, animation_entries.len() as u32);
        self.bin_to_type.ensure_capacity(device, 2 * MAX_BINS_PER_PASS);

        resources.instance_type_data.write(queue, 0, bytemuck::cast_slice(&entries));
        resources.draw_args.write(queue, 0, bytemuck::cast_slice(&draw_args));
        resources.lod_data.write(queue, 0, bytemuck::cast_slice(&lod_entries));
        resources.animation_data.write(queue, 0, bytemuck::cast_slice(&animation_entries));
        self.bin_to_type.write(queue, 0, bytemuck::cast_slice(&bin_to_type));

        self.tables = DrawTables { camera_slots, shadow_slots, camera_draw_args_range, shadow_draw_args_range };
    }

    #[must_use]
    pub fn draw_tables(&self) -> &DrawTables {
        &self.tables
    }

    /// Runs one frame: reset counts, then camera and (if `shadow_distance`
    /// is `Some`) shadow cull/sort/compact in sequence, then the single
    /// set-draw-args stamp. The two passes reuse `sort_keys`/
    /// `sort_scratch` sequentially (only one pass's keys are live at a
    /// time) but write to disjoint fixed-stride regions of
    /// `instance_properties`, so the CPU never needs to read back either
    /// pass's live count. The shadow pass gates casters by distance from
    /// `camera` — there is no independent shadow-casting viewpoint.
    pub fn run<'res, 'tables>(
        &'tables self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        resources: &'res mut ResourceManager,
        total_instance_count: u32,
        lod_bias: f32,
        camera: CameraParams,
        shadow_distance: Option<f32>,
    ) -> DrawPlan<'res, 'tables> {
        resources.ensure_instance_capacity(device, total_instance_count);
        resources.instance_properties.ensure_capacity(device, 2 * total_instance_count);

        let bins_total = 2 * MAX_BINS_PER_PASS;
        self.reset_counts.dispatch(device, encoder, resources.instance_counts.buffer(), bins_total);

        self.run_pass(device, encoder, resources, total_instance_count, lod_bias, camera, false, 0.0, 0);

        let properties_stride = std::mem::size_of::<crate::data::properties::InstanceProperties>() as u64
            * u64::from(total_instance_count);
        if let Some(shadow_distance) = shadow_distance {
            self.run_pass(
                device,
                encoder,
                resources,
                total_instance_count,
                lod_bias,
                camera,
                true,
                shadow_distance,
                properties_stride,
            );
        }

        self.set_draw_args.dispatch(
            device,
            encoder,
            resources.instance_counts.buffer(),
            resources.instance_type_data.buffer(),
            self.bin_to_type.buffer(),
            resources.draw_args.buffer(),
            bins_total,
        );

        DrawPlan {
            draw_args_buffer: resources.draw_args.buffer(),
            camera_slots: &self.tables.camera_slots,
            camera_draw_args_range: self.tables.camera_draw_args_range.clone(),
            camera_properties_offset: 0,
            shadow_slots: &self.tables.shadow_slots,
            shadow_draw_args_range: self.tables.shadow_draw_args_range.clone(),
            shadow_properties_offset: total_instance_count,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn run_pass(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        resources: &ResourceManager,
        total_instance_count: u32,
        lod_bias: f32,
        camera: CameraParams,
        is_shadow_pass: bool,
        shadow_distance: f32,
        properties_offset_bytes: u64,
    ) {
        self.cull.dispatch(
            device,
            encoder,
            &CullFrameParams {
                view_proj: camera.view_proj,
                camera_pos: camera.camera_pos,
                lod_scale: camera.lod_scale,
                lod_bias,
                shadow_distance,
                instance_count: total_instance_count,
                is_shadow_pass,
            },
            resources.instance_data.buffer(),
            resources.animation_data.buffer(),
            resources.lod_data.buffer(),
            resources.instance_counts.buffer(),
            resources.sort_keys.buffer(),
        );
        self.sort.dispatch(device, encoder, resources.sort_keys.buffer(), resources.sort_scratch.buffer(), total_instance_count);
        self.compact.dispatch(
            device,
            encoder,
            resources.sort_scratch.buffer(),
            resources.instance_data.buffer(),
            resources.instance_properties.buffer(),
            properties_offset_bytes,
            total_instance_count,
        );
    }
}
