//! SetDrawArgs pass: single thread-group prefix-sum that turns
//! final bin counts into indirect draw arguments. This is the one
//! serialization point in the frame pipeline.

use std::borrow::Cow;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

const THREADS: u32 = 1024;
const ELEMS_PER_THREAD: u32 = 4;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct DrawArgsParamsGpu {
    bins_total: u32,
    _pad: u32,
}

pub struct SetDrawArgsPass {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl SetDrawArgsPass {
    #[must_use]
    pub fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("SetDrawArgs Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!("../shaders/set_draw_args.wgsl"))),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("SetDrawArgs BindGroup Layout"),
            entries: &[
                entry(0, wgpu::BufferBindingType::Uniform),
                entry(1, wgpu::BufferBindingType::Storage { read_only: true }),
                entry(2, wgpu::BufferBindingType::Storage { read_only: true }),
                entry(3, wgpu::BufferBindingType::Storage { read_only: true }),
                entry(4, wgpu::BufferBindingType::Storage { read_only: false }),
            ],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("SetDrawArgs Pipeline Layout"),
            bind_group_layouts: &[Some(&bind_group_layout)],
            immediate_size: 0,
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("SetDrawArgs Pipeline"),
            layout: Some(&layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        Self { pipeline, bind_group_layout }
    }

    /// `bins_total` must not exceed `ELEMS_PER_THREAD * THREADS` (the
    /// fixed single thread-group's shared-memory prefix-sum capacity).
    #[allow(clippy::too_many_arguments)]
    pub fn dispatch(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        instance_counts: &wgpu::Buffer,
        instance_type_data: &wgpu::Buffer,
        bin_to_type: &wgpu::Buffer,
        draw_args: &wgpu::Buffer,
        bins_total: u32,
    ) {
        debug_assert!(
            bins_total <= ELEMS_PER_THREAD * THREADS,
            "bins_total exceeds the fixed single-group prefix-sum capacity"
        );
        if bins_total == 0 {
            return;
        }

        let params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("SetDrawArgs Params"),
            contents: bytemuck::bytes_of(&DrawArgsParamsGpu { bins_total, _pad: 0 }),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("SetDrawArgs BindGroup"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: params.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: instance_counts.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: instance_type_data.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: bin_to_type.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 4, resource: draw_args.as_entire_binding() },
            ],
        });

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("SetDrawArgs Pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(1, 1, 1);
    }
}

fn entry(binding: u32, ty: wgpu::BufferBindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer { ty, has_dynamic_offset: false, min_binding_size: None },
        count: None,
    }
}
