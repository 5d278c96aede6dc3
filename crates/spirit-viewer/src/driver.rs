//! Per-frame host step, independent of the GPU.
//!
//! Each tick drains the tracking inbox, advances the placement session and
//! commits exactly one uniform batch. The renderer only ever reads the
//! registry afterwards.

use crate::error::SetupError;
use crate::placement::{PlacementSession, PlacementState};
use crate::registry::{UniformRegistry, UniformValue};
use crate::tracking::{TrackingBackend, ViewRay};
use glam::{Mat4, Vec2, Vec3};

/// Radius of the placement ring, in meters.
pub const RETICLE_RADIUS_M: f32 = 0.15;

/// Camera state of the frame about to be drawn.
#[derive(Debug, Clone, Copy)]
pub struct ViewState {
    pub view_proj: Mat4,
    /// Surface size in physical pixels.
    pub viewport: Vec2,
    /// Ray from the view center.
    pub ray: ViewRay,
}

/// What the host needs from one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub state: PlacementState,
    pub status: &'static str,
    pub reticle_visible: bool,
    pub placed_now: bool,
    /// Set on the tick the session ended; the host resets its UI.
    pub ended_now: bool,
    pub opacity: f32,
}

pub struct SceneDriver {
    registry: UniformRegistry,
    session: PlacementSession,
    clock: f32,
}

impl SceneDriver {
    pub fn new(registry: UniformRegistry, session: PlacementSession) -> Self {
        Self {
            registry,
            session,
            clock: 0.0,
        }
    }

    pub fn start(&mut self, backend: &mut dyn TrackingBackend) -> Result<(), SetupError> {
        self.session.start(backend)
    }

    pub fn tick(&mut self, dt: f32, view: &ViewState) -> FrameReport {
        let advance = self.session.pump();
        // The fade starts from zero on the frame of placement.
        if !advance.placed_now {
            self.session.tick(dt);
        }
        self.clock += dt.max(0.0);

        let ended = self.session.state().is_ended();
        if ended {
            self.registry.reset_neutral();
        }

        let reticle = self.session.reticle();
        let opacity = self.session.opacity();

        let mut batch = self.registry.batch();
        batch
            .float("time", self.clock)
            .mat4("view_proj", view.view_proj)
            .set("viewport", UniformValue::Vec2(view.viewport));

        if !ended {
            let light = self.session.light();
            let reticle_model = reticle
                .map(|pose| pose.to_mat4() * Mat4::from_scale(Vec3::splat(RETICLE_RADIUS_M)))
                .unwrap_or(Mat4::IDENTITY);

            batch
                .mat4("model", self.session.model_matrix())
                .mat4("reticle_model", reticle_model)
                .float("reticle_opacity", if reticle.is_some() { 1.0 } else { 0.0 })
                .set("ambient_color", UniformValue::Color(light.color))
                .float("ambient_intensity", light.intensity)
                .float("opacity", opacity);
        }

        if let Err(err) = batch.commit() {
            log::error!("Uniform update rejected: {}", err);
        }

        let state = self.session.state().clone();
        FrameReport {
            status: state.status_line(),
            state,
            reticle_visible: reticle.is_some(),
            placed_now: advance.placed_now,
            ended_now: advance.ended_now,
            opacity,
        }
    }

    pub fn registry(&self) -> &UniformRegistry {
        &self.registry
    }

    pub fn session(&self) -> &PlacementSession {
        &self.session
    }

    /// Confirmation coming from the host itself rather than the tracking side.
    pub fn confirm(&mut self) -> bool {
        self.session.confirm()
    }
}
