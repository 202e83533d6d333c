//! Culling pass: frustum/distance cull + LOD select, one dispatch
//! per pass (camera, and shadow if enabled).
//!
//! Compute-pipeline setup follows the donor's `IBLComputePass`
//! (`renderer/graph/passes/ibl_compute.rs`): a dedicated bind group
//! layout, a pipeline layout built from it, and a single
//! `ComputePipelineDescriptor` built from an `include_str!`-embedded
//! WGSL module, prefixed with the `quat_decode.wgsl` snippet shared
//! with `compact.rs` (same concatenation scheme `sort.rs` uses for
//! `radix_common.wgsl`).

use std::borrow::Cow;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

const WORKGROUP_SIZE: u32 = 64;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct CullParamsGpu {
    view_proj: [[f32; 4]; 4],
    camera_pos: [f32; 3],
    lod_scale: f32,
    lod_bias: f32,
    shadow_distance: f32,
    instance_count: u32,
    pass_is_shadow: u32,
}

/// Per-dispatch inputs the frame pipeline computes once per pass.
pub struct CullFrameParams {
    pub view_proj: glam::Mat4,
    pub camera_pos: glam::Vec3,
    pub lod_scale: f32,
    pub lod_bias: f32,
    pub shadow_distance: f32,
    pub instance_count: u32,
    pub is_shadow_pass: bool,
}

pub struct CullPass {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl CullPass {
    #[must_use]
    pub fn new(device: &wgpu::Device) -> Self {
        const QUAT_DECODE_WGSL: &str = include_str!("../shaders/quat_decode.wgsl");
        let source = format!("{QUAT_DECODE_WGSL}\n{}", include_str!("../shaders/cull.wgsl"));
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Cull Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Owned(source)),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Cull BindGroup Layout"),
            entries: &[
                storage_entry(0, wgpu::BufferBindingType::Uniform, false),
                storage_entry(1, wgpu::BufferBindingType::Storage { read_only: true }, false),
                storage_entry(2, wgpu::BufferBindingType::Storage { read_only: true }, false),
                storage_entry(3, wgpu::BufferBindingType::Storage { read_only: true }, false),
                storage_entry(4, wgpu::BufferBindingType::Storage { read_only: false }, false),
                storage_entry(5, wgpu::BufferBindingType::Storage { read_only: false }, false),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Cull Pipeline Layout"),
            bind_group_layouts: &[Some(&bind_group_layout)],
            immediate_size: 0,
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Cull Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        Self { pipeline, bind_group_layout }
    }

    #[must_use]
    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    /// Dispatches one cull pass. `params` uniform buffer is created fresh
    /// each call; at this scale a tiny per-frame allocation is cheaper
    /// than threading a reusable uniform buffer through the caller.
    pub fn dispatch(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        params: &CullFrameParams,
        instances: &wgpu::Buffer,
        animations: &wgpu::Buffer,
        lods: &wgpu::Buffer,
        instance_counts: &wgpu::Buffer,
        sort_keys: &wgpu::Buffer,
    ) {
        if params.instance_count == 0 {
            return;
        }

        let gpu_params = CullParamsGpu {
            view_proj: params.view_proj.to_cols_array_2d(),
            camera_pos: params.camera_pos.to_array(),
            lod_scale: params.lod_scale,
            lod_bias: params.lod_bias,
            shadow_distance: params.shadow_distance,
            instance_count: params.instance_count,
            pass_is_shadow: u32::from(params.is_shadow_pass),
        };
        let uniform = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Cull Params"),
            contents: bytemuck::bytes_of(&gpu_params),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Cull BindGroup"),
            layout: &self.bind_group_layout,
            entries: &[
                buf_entry(0, &uniform),
                buf_entry(1, instances),
                buf_entry(2, animations),
                buf_entry(3, lods),
                buf_entry(4, instance_counts),
                buf_entry(5, sort_keys),
            ],
        });

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Cull Pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        let groups = params.instance_count.div_ceil(WORKGROUP_SIZE);
        pass.dispatch_workgroups(groups, 1, 1);
    }
}

fn storage_entry(binding: u32, ty: wgpu::BufferBindingType, has_dynamic_offset: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset,
            min_binding_size: None,
        },
        count: None,
    }
}

fn buf_entry(binding: u32, buffer: &wgpu::Buffer) -> wgpu::BindGroupEntry<'_> {
    wgpu::BindGroupEntry {
        binding,
        resource: buffer.as_entire_binding(),
    }
}
