use super::{build_checked, quad_layout, QUAD_CORNERS};
use crate::data::types::{CloudGpu, PointVertex};
use crate::error::SetupError;
use crate::shaders;
use wgpu::util::DeviceExt;

/// Instanced quad sprites, one instance per point of the tree.
pub struct SpiritPipeline {
    pub pipeline: wgpu::RenderPipeline,
    quad_vb: wgpu::Buffer,
}

impl SpiritPipeline {
    /// Compiles `body` (the point program, without the uniform prelude).
    pub fn new(
        device: &wgpu::Device,
        uniform_layout: &wgpu::BindGroupLayout,
        color_fmt: wgpu::TextureFormat,
        depth_fmt: wgpu::TextureFormat,
        body: &str,
    ) -> Result<Self, SetupError> {
        let source = shaders::compose(body);

        let quad_vb = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Spirit Quad VB"),
            contents: bytemuck::cast_slice(&QUAD_CORNERS),
            usage: wgpu::BufferUsages::VERTEX,
        });

        // Instance attributes; offsets follow `PointVertex`.
        let instance_attrs = [
            // position
            wgpu::VertexAttribute {
                shader_location: 1,
                offset: 0,
                format: wgpu::VertexFormat::Float32x3,
            },
            // color
            wgpu::VertexAttribute {
                shader_location: 2,
                offset: 12,
                format: wgpu::VertexFormat::Float32x3,
            },
            // role
            wgpu::VertexAttribute {
                shader_location: 3,
                offset: 24,
                format: wgpu::VertexFormat::Uint32,
            },
            // index
            wgpu::VertexAttribute {
                shader_location: 4,
                offset: 28,
                format: wgpu::VertexFormat::Uint32,
            },
            // offset
            wgpu::VertexAttribute {
                shader_location: 5,
                offset: 32,
                format: wgpu::VertexFormat::Float32x3,
            },
        ];

        let vbuf_layouts = [
            quad_layout(),
            wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<PointVertex>() as u64,
                step_mode: wgpu::VertexStepMode::Instance,
                attributes: &instance_attrs,
            },
        ];

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Spirit PipelineLayout"),
            bind_group_layouts: &[uniform_layout],
            push_constant_ranges: &[],
        });

        let pipeline = build_checked(device, "spirit points", || {
            let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("shaders/spirit_points.wgsl"),
                source: wgpu::ShaderSource::Wgsl(source.as_str().into()),
            });

            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Spirit Points Pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: "vs_main",
                    buffers: &vbuf_layouts,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                // Translucent sprites test against depth but do not write it.
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: depth_fmt,
                    depth_write_enabled: false,
                    depth_compare: wgpu::CompareFunction::LessEqual,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: "fs_main",
                    targets: &[Some(wgpu::ColorTargetState {
                        format: color_fmt,
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            })
        })?;

        Ok(Self { pipeline, quad_vb })
    }

    pub fn draw<'a>(
        &'a self,
        rpass: &mut wgpu::RenderPass<'a>,
        uniforms: &'a wgpu::BindGroup,
        cloud: &'a CloudGpu,
    ) {
        rpass.set_pipeline(&self.pipeline);
        rpass.set_bind_group(0, uniforms, &[]);
        rpass.set_vertex_buffer(0, self.quad_vb.slice(..));
        rpass.set_vertex_buffer(1, cloud.vtx.slice(..));
        rpass.draw(0..6, 0..cloud.instances_len);
    }
}
