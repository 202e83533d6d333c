//! Radix sort: three passes of 4 bits each over the sort key's
//! low 12 bits, each pass running the Count / CountReduce / Scan /
//! ScanAdd / Scatter kernel sequence from `shaders/radix_*.wgsl`.
//!
//! Ping-pongs between two caller-supplied buffers. Three (odd) passes
//! mean the final sorted data always lands in the *second* buffer
//! passed to [`SortPass::dispatch`] — callers pass `(sort_keys,
//! sort_scratch)` and read the result back out of `sort_scratch`.

use std::borrow::Cow;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

const NUM_BINS: u32 = 16;
const WORKGROUP_SIZE: u32 = 128;
const BLOCK_SIZE: u32 = WORKGROUP_SIZE * 4;
const MAX_GROUPS: u32 = 64;
const NUM_PASSES: u32 = 3;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct SortParamsGpu {
    num_elements: u32,
    shift: u32,
    num_groups: u32,
    blocks_per_group: u32,
}

struct Kernels {
    count: wgpu::ComputePipeline,
    count_reduce: wgpu::ComputePipeline,
    scan: wgpu::ComputePipeline,
    scan_add: wgpu::ComputePipeline,
    scatter: wgpu::ComputePipeline,
}

pub struct SortPass {
    kernels: Kernels,
    bind_group_layout: wgpu::BindGroupLayout,
}

const COMMON_WGSL: &str = include_str!("../shaders/radix_common.wgsl");

fn build_module(device: &wgpu::Device, label: &str, kernel_src: &str) -> wgpu::ShaderModule {
    let source = format!("{COMMON_WGSL}\n{kernel_src}");
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(Cow::Owned(source)),
    })
}

fn storage_entry(binding: u32, ty: wgpu::BufferBindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer { ty, has_dynamic_offset: false, min_binding_size: None },
        count: None,
    }
}

impl SortPass {
    #[must_use]
    pub fn new(device: &wgpu::Device) -> Self {
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Radix Sort BindGroup Layout"),
            entries: &[
                storage_entry(0, wgpu::BufferBindingType::Uniform),
                storage_entry(1, wgpu::BufferBindingType::Storage { read_only: true }),
                storage_entry(2, wgpu::BufferBindingType::Storage { read_only: false }),
                storage_entry(3, wgpu::BufferBindingType::Storage { read_only: false }),
                storage_entry(4, wgpu::BufferBindingType::Storage { read_only: false }),
                storage_entry(5, wgpu::BufferBindingType::Storage { read_only: false }),
                storage_entry(6, wgpu::BufferBindingType::Storage { read_only: false }),
            ],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Radix Sort Pipeline Layout"),
            bind_group_layouts: &[Some(&bind_group_layout)],
            immediate_size: 0,
        });

        let make = |label: &str, src: &str| {
            let module = build_module(device, label, src);
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&layout),
                module: &module,
                entry_point: Some("main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            })
        };

        Self {
            kernels: Kernels {
                count: make("Radix Count", include_str!("../shaders/radix_count.wgsl")),
                count_reduce: make("Radix CountReduce", include_str!("../shaders/radix_count_reduce.wgsl")),
                scan: make("Radix Scan", include_str!("../shaders/radix_scan.wgsl")),
                scan_add: make("Radix ScanAdd", include_str!("../shaders/radix_scan_add.wgsl")),
                scatter: make("Radix Scatter", include_str!("../shaders/radix_scatter.wgsl")),
            },
            bind_group_layout,
        }
    }

    /// Sorts `count` keys starting in `buf_a`, ping-ponging with `buf_b`.
    /// After the three (odd) passes, the result is in `buf_b`.
    pub fn dispatch(&self, device: &wgpu::Device, encoder: &mut wgpu::CommandEncoder, buf_a: &wgpu::Buffer, buf_b: &wgpu::Buffer, count: u32) {
        if count == 0 {
            return;
        }
        let total_blocks = count.div_ceil(BLOCK_SIZE).max(1);
        let num_groups = total_blocks.min(MAX_GROUPS);
        let blocks_per_group = total_blocks.div_ceil(num_groups);

        let sum_table = scratch_buffer(device, "Radix SumTable", u64::from(num_groups) * u64::from(NUM_BINS));
        let reduce_table = scratch_buffer(device, "Radix ReduceTable", u64::from(NUM_BINS));
        let scan_scratch = scratch_buffer(device, "Radix ScanScratch", u64::from(NUM_BINS));
        let bin_offsets = scratch_buffer(device, "Radix BinOffsets", u64::from(num_groups) * u64::from(NUM_BINS));

        let mut src = buf_a;
        let mut dst = buf_b;
        for pass in 0..NUM_PASSES {
            let params = SortParamsGpu {
                num_elements: count,
                shift: pass * 4,
                num_groups,
                blocks_per_group,
            };
            let params_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Radix Sort Params"),
                contents: bytemuck::bytes_of(&params),
                usage: wgpu::BufferUsages::UNIFORM,
            });

            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Radix Sort BindGroup"),
                layout: &self.bind_group_layout,
                entries: &[
                    entry(0, &params_buf),
                    entry(1, src),
                    entry(2, dst),
                    entry(3, &sum_table),
                    entry(4, &reduce_table),
                    entry(5, &scan_scratch),
                    entry(6, &bin_offsets),
                ],
            });

            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Radix Sort Pass"),
                timestamp_writes: None,
            });
            cpass.set_bind_group(0, &bind_group, &[]);

            cpass.set_pipeline(&self.kernels.count);
            cpass.dispatch_workgroups(num_groups, 1, 1);

            cpass.set_pipeline(&self.kernels.count_reduce);
            cpass.dispatch_workgroups(1, 1, 1);

            cpass.set_pipeline(&self.kernels.scan);
            cpass.dispatch_workgroups(1, 1, 1);

            cpass.set_pipeline(&self.kernels.scan_add);
            cpass.dispatch_workgroups(1, 1, 1);

            cpass.set_pipeline(&self.kernels.scatter);
            cpass.dispatch_workgroups(num_groups, 1, 1);

            drop(cpass);

            std::mem::swap(&mut src, &mut dst);
        }
    }
}

fn scratch_buffer(device: &wgpu::Device, label: &str, elements: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: elements.max(1) * 4,
        usage: wgpu::BufferUsages::STORAGE,
        mapped_at_creation: false,
    })
}

fn entry(binding: u32, buffer: &wgpu::Buffer) -> wgpu::BindGroupEntry<'_> {
    wgpu::BindGroupEntry { binding, resource: buffer.as_entire_binding() }
}
