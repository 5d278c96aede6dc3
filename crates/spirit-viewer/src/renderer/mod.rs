//! The rendering orchestrator. Owns the GPU context, the depth target, the
//! shared uniform block and the pipelines.

pub mod context;
pub mod pipelines;
pub mod targets;
pub mod uniforms;

use self::{
    context::GfxContext,
    pipelines::{reticle::ReticlePipeline, spirit::SpiritPipeline},
    targets::Targets,
    uniforms::UniformBlock,
};
use crate::{data::types::CloudGpu, error::SetupError, registry::UniformRegistry};
use std::sync::Arc;
use winit::window::Window;

/// Night-sky backdrop drawn where the camera feed would be.
const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.010,
    g: 0.012,
    b: 0.020,
    a: 1.0,
};

pub struct Renderer {
    pub gfx: GfxContext,
    pub targets: Targets,
    pub uniforms: UniformBlock,
    pub reticle: ReticlePipeline,
    /// `None` until the point program compiled.
    pub spirit: Option<SpiritPipeline>,
    pub egui_renderer: egui_wgpu::Renderer,
}

impl Renderer {
    pub async fn new(window: Arc<Window>, registry: &UniformRegistry) -> anyhow::Result<Self> {
        let gfx = GfxContext::new(window).await?;
        let size = gfx.size;

        let targets = Targets::new(&gfx.device, size);
        let uniforms = UniformBlock::new(&gfx.device, &gfx.queue, registry);
        let reticle = ReticlePipeline::new(
            &gfx.device,
            &uniforms.layout,
            gfx.config.format,
            targets.depth_fmt,
        )?;

        let egui_renderer = egui_wgpu::Renderer::new(&gfx.device, gfx.config.format, None, 1);

        Ok(Self {
            gfx,
            targets,
            uniforms,
            reticle,
            spirit: None,
            egui_renderer,
        })
    }

    /// Builds the point pipeline from a program body. On failure the points
    /// stay undrawn and the error is handed back for the status line.
    pub fn build_spirit(&mut self, registry: &UniformRegistry, body: &str) -> Result<(), SetupError> {
        crate::shaders::check_references(registry, "spirit points", body)?;
        let pipeline = SpiritPipeline::new(
            &self.gfx.device,
            &self.uniforms.layout,
            self.gfx.config.format,
            self.targets.depth_fmt,
            body,
        )?;
        self.spirit = Some(pipeline);
        Ok(())
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.gfx.resize(new_size);
            self.targets.resize(&self.gfx.device, new_size);
        }
    }

    /// Uploads the registry and draws the scene into `swap_view`.
    pub fn render(
        &mut self,
        swap_view: &wgpu::TextureView,
        registry: &UniformRegistry,
        cloud: Option<&CloudGpu>,
        reticle_visible: bool,
    ) {
        self.uniforms.upload(&self.gfx.device, &self.gfx.queue, registry);

        let mut encoder = self
            .gfx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: swap_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.targets.depth,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            // Reticle first so the tree draws over it.
            if reticle_visible {
                self.reticle.draw(&mut pass, &self.uniforms.bind_group);
            }

            if let (Some(spirit), Some(cloud)) = (&self.spirit, cloud) {
                spirit.draw(&mut pass, &self.uniforms.bind_group, cloud);
            }
        }

        self.gfx.queue.submit(std::iter::once(encoder.finish()));
    }
}
