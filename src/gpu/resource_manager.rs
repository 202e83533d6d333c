//! Owns the nine GPU buffers the frame pipeline needs and grows them to
//! fit the current frame's instance/instance-type/bin counts.
//!
//! Grounded on the donor's `ModelBufferAllocator`
//! (`renderer/core/resources/allocator.rs`) for the "one grow-only
//! buffer per logical table, re-bind dependents on resize" policy, here
//! applied to nine tables instead of one.

use std::mem::size_of;

use crate::data::draw_args::DrawArgs;
use crate::data::instance::InstanceData;
use crate::data::instance_type::InstanceTypeData;
use crate::data::limits::MAX_BINS_PER_PASS;

use super::buffer::GrowBuffer;

const INITIAL_INSTANCES: u32 = 1024;
const INITIAL_TYPES: u32 = 64;
const INITIAL_BINS: u32 = 256;
const INITIAL_LODS: u32 = 64;
const INITIAL_ANIMATIONS: u32 = 64;

/// All GPU-resident buffers the cull/sort/compact/draw-args pipeline
/// reads and writes.
pub struct ResourceManager {
    pub lod_data: GrowBuffer,
    pub animation_data: GrowBuffer,
    pub instance_type_data: GrowBuffer,
    /// Two passes' worth of atomic counters, `2 * MAX_BINS_PER_PASS` wide
    /// at full size; grown the same way as the others.
    pub instance_counts: GrowBuffer,
    pub instance_data: GrowBuffer,
    pub sort_keys: GrowBuffer,
    pub sort_scratch: GrowBuffer,
    pub instance_properties: GrowBuffer,
    pub draw_args: GrowBuffer,
}

const STORAGE_RW: wgpu::BufferUsages = wgpu::BufferUsages::STORAGE
    .union(wgpu::BufferUsages::COPY_DST)
    .union(wgpu::BufferUsages::COPY_SRC);

const STORAGE_INDIRECT: wgpu::BufferUsages = wgpu::BufferUsages::STORAGE
    .union(wgpu::BufferUsages::INDIRECT)
    .union(wgpu::BufferUsages::COPY_DST);

impl ResourceManager {
    #[must_use]
    pub fn new(device: &wgpu::Device) -> Self {
        Self {
            lod_data: GrowBuffer::new(device, "lod_data", size_of::<[f32; 8]>() as u32, INITIAL_LODS, STORAGE_RW),
            animation_data: GrowBuffer::new(
                device,
                "animation_data",
                size_of::<[f32; 8]>() as u32,
                INITIAL_ANIMATIONS,
                STORAGE_RW,
            ),
            instance_type_data: GrowBuffer::new(
                device,
                "instance_type_data",
                size_of::<InstanceTypeData>() as u32,
                INITIAL_TYPES,
                STORAGE_RW,
            ),
            instance_counts: GrowBuffer::new(
                device,
                "instance_counts",
                size_of::<u32>() as u32,
                2 * INITIAL_BINS,
                STORAGE_RW,
            ),
            instance_data: GrowBuffer::new(
                device,
                "instance_data",
                size_of::<InstanceData>() as u32,
                INITIAL_INSTANCES,
                STORAGE_RW,
            ),
            sort_keys: GrowBuffer::new(device, "sort_keys", size_of::<u32>() as u32, INITIAL_INSTANCES, STORAGE_RW),
            sort_scratch: GrowBuffer::new(
                device,
                "sort_scratch",
                size_of::<u32>() as u32,
                INITIAL_INSTANCES,
                STORAGE_RW,
            ),
            instance_properties: GrowBuffer::new(
                device,
                "instance_properties",
                size_of::<[f32; 32]>() as u32,
                INITIAL_INSTANCES,
                STORAGE_RW,
            ),
            draw_args: GrowBuffer::new(
                device,
                "draw_args",
                size_of::<DrawArgs>() as u32,
                2 * INITIAL_BINS,
                STORAGE_INDIRECT,
            ),
        }
    }

    /// Ensures every buffer sized by instance count fits `instance_count`
    /// instances. Returns `true` if any buffer was recreated (callers
    /// must rebuild dependent bind groups when this is `true`).
    pub fn ensure_instance_capacity(&mut self, device: &wgpu::Device, instance_count: u32) -> bool {
        let a = self.instance_data.ensure_capacity(device, instance_count);
        let b = self.sort_keys.ensure_capacity(device, instance_count);
        let c = self.sort_scratch.ensure_capacity(device, instance_count);
        let d = self.instance_properties.ensure_capacity(device, instance_count);
        a || b || c || d
    }

    /// Ensures the type/bin-indexed buffers fit `type_count` dense
    /// `InstanceTypeData` entries and `bins_per_pass` bins per pass
    /// (bounded by [`MAX_BINS_PER_PASS`]). `InstanceCounts` is one entry
    /// per bin; `draw_args` is sized separately by
    /// [`Self::ensure_draw_args_capacity`] since a bin can claim more
    /// than one `DrawArgs` slot (one per submesh).
    pub fn ensure_type_capacity(&mut self, device: &wgpu::Device, type_count: u32, bins_per_pass: u32) -> bool {
        debug_assert!(bins_per_pass <= MAX_BINS_PER_PASS);
        let a = self.instance_type_data.ensure_capacity(device, type_count);
        let b = self.instance_counts.ensure_capacity(device, 2 * bins_per_pass);
        a || b
    }

    /// Ensures `draw_args` fits `count` `DrawArgs` slots (the sum, over
    /// every live bin across both passes, of that bin's submesh count).
    pub fn ensure_draw_args_capacity(&mut self, device: &wgpu::Device, count: u32) -> bool {
        self.draw_args.ensure_capacity(device, count)
    }

    pub fn ensure_lod_capacity(&mut self, device: &wgpu::Device, lod_count: u32) -> bool {
        self.lod_data.ensure_capacity(device, lod_count)
    }

    pub fn ensure_animation_capacity(&mut self, device: &wgpu::Device, animation_count: u32) -> bool {
        self.animation_data.ensure_capacity(device, animation_count)
    }
}
