use crate::{
    camera::{Camera, CameraController},
    config::Config,
    data::{AssetOptions, CloudGpu, MeshTransform, PointCloudAsset},
    driver::{FrameReport, SceneDriver, ViewState},
    error::SetupError,
    placement::{PlacementSession, SessionOptions},
    registry::UniformRegistry,
    renderer::Renderer,
    shaders,
    tracking::{
        emulated::{FloorEmulator, PrintedMarker},
        EndReason, TrackingBackend,
    },
    ui::{self, HudState},
};
use anyhow::{Context, Result};
use glam::{Vec2, Vec3};
use std::{sync::Arc, time::Instant};
use winit::{
    event::{ElementState, MouseButton, WindowEvent},
    window::Window,
};

/// Where the emulated printed marker lies, right in front of the start pose.
const MARKER_CENTER: Vec3 = Vec3::new(0.0, 0.0, -0.8);
const MARKER_RADIUS_M: f32 = 0.35;

/// Longest frame step fed to the animation, so a stall does not jump the fade.
const MAX_DT_S: f32 = 0.1;

pub struct App {
    pub renderer: Renderer,
    pub camera: Camera,
    pub camera_controller: CameraController,
    pub egui_ctx: egui::Context,
    pub egui_state: egui_winit::State,
    driver: SceneDriver,
    tracker: FloorEmulator,
    cloud: Option<CloudGpu>,
    hud: HudState,
    report: Option<FrameReport>,
    last_frame: Instant,
}

impl App {
    /// Sets everything up. Only a missing GPU or a bad `--set` aborts; asset,
    /// shader and session failures end up on the status line instead.
    pub async fn new(window: Arc<Window>, config: &Config) -> Result<Self> {
        let mut registry = UniformRegistry::new();
        registry
            .apply_overrides(&config.overrides)
            .context("applying --set overrides")?;

        let mut renderer = Renderer::new(window.clone(), &registry).await?;
        let camera = Camera::new(renderer.gfx.aspect());

        let egui_ctx = egui::Context::default();
        let egui_state = egui_winit::State::new(
            egui_ctx.clone(),
            egui_ctx.viewport_id(),
            &*window,
            None,
            None,
        );

        let mut hud = HudState::default();
        let mut cloud = None;
        let mut transform = MeshTransform::default();

        let loaded = prepare_scene(&mut renderer, &registry, config);
        match loaded {
            Ok(asset) => {
                transform = MeshTransform::fit(asset.bounds(), config.footprint_m, config.z_up);
                hud.points = asset.len();
                hud.fireflies = asset.firefly_count();
                cloud = Some(asset.upload(&renderer.gfx.device));
            }
            Err(err) => {
                log::error!("{}", err);
                hud.fatal = Some(err.status_line());
            }
        }

        let session = PlacementSession::new(
            SessionOptions {
                seek_marker: config.marker,
                marker_patterns: config.marker_patterns.clone(),
                floor_offset_m: config.floor_offset_m,
                light_estimation: !config.no_light_estimation,
            },
            transform,
        );
        let mut driver = SceneDriver::new(registry, session);

        let mut tracker = FloorEmulator::new();
        if let Some(pattern) = config.marker_patterns.first() {
            tracker = tracker.with_marker(PrintedMarker {
                pattern: pattern.clone(),
                center: MARKER_CENTER,
                radius_m: MARKER_RADIUS_M,
            });
        }

        if hud.fatal.is_none() {
            if let Err(err) = driver.start(&mut tracker) {
                hud.fatal = Some(err.status_line());
            }
        }

        Ok(Self {
            renderer,
            camera,
            camera_controller: CameraController::new(),
            egui_ctx,
            egui_state,
            driver,
            tracker,
            cloud,
            hud,
            report: None,
            last_frame: Instant::now(),
        })
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.renderer.resize(new_size);
            self.camera.set_aspect(self.renderer.gfx.aspect());
        }
    }

    pub fn handle_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        let response = self.egui_state.on_window_event(window, event);
        if response.consumed {
            return true;
        }

        if let WindowEvent::MouseInput {
            button: MouseButton::Left,
            state: ElementState::Pressed,
            ..
        } = event
        {
            self.tracker.select();
            return true;
        }

        if self.camera_controller.handle_event(event, &mut self.camera) {
            return true;
        }

        if let WindowEvent::Resized(physical_size) = event {
            self.resize(*physical_size);
        }

        false
    }

    /// Ends the AR session. Returns `false` if there was none left to end.
    pub fn end_session(&mut self) -> bool {
        if !self.tracker.is_running() {
            return false;
        }
        self.tracker.request_end(EndReason::UserExit);
        true
    }

    /// One host step: tracking, placement, uniforms.
    pub fn update(&mut self) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame).as_secs_f32().min(MAX_DT_S);
        self.last_frame = now;

        self.camera_controller.update(dt, &mut self.camera);

        let size = self.renderer.gfx.size;
        let view = ViewState {
            view_proj: self.camera.view_proj(),
            viewport: Vec2::new(size.width.max(1) as f32, size.height.max(1) as f32),
            ray: self.camera.center_ray(),
        };

        self.tracker.pump(&view.ray);
        let report = self.driver.tick(dt, &view);

        if report.ended_now {
            log::info!("Session over; resetting the overlay");
        }
        if self.hud.fatal.is_none() {
            self.hud.status = report.status.to_string();
        }
        self.report = Some(report);
    }

    pub fn render(&mut self, window: &Window) -> Result<(), wgpu::SurfaceError> {
        let frame = self.renderer.gfx.surface.get_current_texture()?;
        let swap_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let reticle_visible = self.report.as_ref().is_some_and(|r| r.reticle_visible);
        self.renderer.render(
            &swap_view,
            self.driver.registry(),
            self.cloud.as_ref(),
            reticle_visible,
        );

        let egui_input = self.egui_state.take_egui_input(window);
        self.egui_ctx.begin_frame(egui_input);
        ui::draw_hud(&self.egui_ctx, &self.hud);
        let egui_output = self.egui_ctx.end_frame();

        self.egui_state
            .handle_platform_output(window, egui_output.platform_output);

        let shapes = self
            .egui_ctx
            .tessellate(egui_output.shapes, self.egui_ctx.pixels_per_point());

        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [
                self.renderer.gfx.config.width,
                self.renderer.gfx.config.height,
            ],
            pixels_per_point: self.egui_ctx.pixels_per_point(),
        };

        let mut encoder = self
            .renderer
            .gfx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("UI Encoder"),
            });

        for (id, delta) in &egui_output.textures_delta.set {
            self.renderer.egui_renderer.update_texture(
                &self.renderer.gfx.device,
                &self.renderer.gfx.queue,
                *id,
                delta,
            );
        }

        self.renderer.egui_renderer.update_buffers(
            &self.renderer.gfx.device,
            &self.renderer.gfx.queue,
            &mut encoder,
            &shapes,
            &screen_descriptor,
        );

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("EGUI Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &swap_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            self.renderer
                .egui_renderer
                .render(&mut render_pass, &shapes, &screen_descriptor);
        }

        for id in &egui_output.textures_delta.free {
            self.renderer.egui_renderer.free_texture(id);
        }

        self.renderer
            .gfx
            .queue
            .submit(std::iter::once(encoder.finish()));
        frame.present();

        Ok(())
    }
}

/// Loads the asset and compiles the point program. Either failure is fatal
/// to the visual pipeline.
fn prepare_scene(
    renderer: &mut Renderer,
    registry: &UniformRegistry,
    config: &Config,
) -> Result<PointCloudAsset, SetupError> {
    let options = AssetOptions {
        firefly_ratio: config.firefly_ratio,
        ..AssetOptions::default()
    };
    let asset = PointCloudAsset::load(&config.asset, &options)?;

    let body = shaders::load_point_program(config.shader.as_deref())?;
    renderer.build_spirit(registry, &body)?;

    Ok(asset)
}
