//! Desktop stand-in for an AR runtime: a flat floor at a fixed height, an
//! optional printed marker lying on it, and a constant light estimate.

use super::{
    Capability, EndReason, LightEstimate, Pose, TrackingBackend, TrackingCommand, TrackingError,
    TrackingEvent, TrackingFrame, TrackingPort, ViewRay,
};
use glam::{Quat, Vec3};

/// A planar pattern printed on the floor.
#[derive(Debug, Clone)]
pub struct PrintedMarker {
    pub pattern: String,
    pub center: Vec3,
    pub radius_m: f32,
}

pub struct FloorEmulator {
    floor_y: f32,
    max_range_m: f32,
    marker: Option<PrintedMarker>,
    light: Option<LightEstimate>,
    capability: Capability,
    port: Option<TrackingPort>,
    hit_testing: bool,
}

impl Default for FloorEmulator {
    fn default() -> Self {
        Self::new()
    }
}

impl FloorEmulator {
    /// Floor at `y = 0`, hits up to 8 m away, warm room light.
    pub fn new() -> Self {
        Self {
            floor_y: 0.0,
            max_range_m: 8.0,
            marker: None,
            light: Some(LightEstimate {
                color: Vec3::new(1.0, 0.92, 0.82),
                intensity: 0.9,
            }),
            capability: Capability::Supported,
            port: None,
            hit_testing: false,
        }
    }

    pub fn with_marker(mut self, marker: PrintedMarker) -> Self {
        self.marker = Some(marker);
        self
    }

    /// `None` emulates a device without light estimation.
    pub fn with_light(mut self, light: Option<LightEstimate>) -> Self {
        self.light = light;
        self
    }

    /// Lets tests emulate devices that under-report their capabilities.
    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capability = capability;
        self
    }

    pub fn is_running(&self) -> bool {
        self.port.is_some()
    }

    pub fn is_hit_testing(&self) -> bool {
        self.is_running() && self.hit_testing
    }

    fn intersect_floor(&self, ray: &ViewRay) -> Option<Vec3> {
        let dir = ray.direction.normalize_or_zero();
        // Parallel to, or pointing away from, the floor.
        if dir.y.abs() < 1e-6 {
            return None;
        }
        let t = (self.floor_y - ray.origin.y) / dir.y;
        if t <= 0.0 || t > self.max_range_m {
            return None;
        }
        Some(ray.origin + dir * t)
    }

    fn apply_commands(&mut self) {
        let commands = match &self.port {
            Some(port) => port.commands(),
            None => return,
        };
        for command in commands {
            match command {
                TrackingCommand::CancelHitTest => {
                    log::debug!("Emulator: hit-testing cancelled");
                    self.hit_testing = false;
                }
                TrackingCommand::EndSession => {
                    log::info!("Emulator: session released");
                    self.port = None;
                    self.hit_testing = false;
                    return;
                }
            }
        }
    }
}

impl TrackingBackend for FloorEmulator {
    fn capability(&self) -> Capability {
        self.capability
    }

    fn start(&mut self, port: TrackingPort) -> Result<(), TrackingError> {
        if self.port.is_some() {
            return Err(TrackingError::AlreadyRunning);
        }
        log::info!("Emulator: floor tracking started (floor y = {:.2} m)", self.floor_y);
        self.port = Some(port);
        self.hit_testing = true;
        Ok(())
    }

    fn pump(&mut self, view: &ViewRay) {
        self.apply_commands();

        let floor_point = self.intersect_floor(view);

        let hits = match floor_point {
            Some(point) if self.hit_testing => {
                // Face the content toward the viewer.
                let yaw = (-view.direction.x).atan2(-view.direction.z);
                vec![Pose::new(point, Quat::from_rotation_y(yaw))]
            }
            _ => Vec::new(),
        };

        let marker = match (&self.marker, floor_point) {
            (Some(m), Some(point)) if point.distance(m.center) <= m.radius_m => Some(m.pattern.clone()),
            _ => None,
        };

        let frame = TrackingFrame {
            hits,
            light: self.light,
            marker,
        };

        let delivered = self
            .port
            .as_ref()
            .is_some_and(|port| port.emit(TrackingEvent::Frame(frame)));
        if !delivered {
            self.port = None;
        }
    }

    fn select(&mut self) {
        if let Some(port) = &self.port {
            port.emit(TrackingEvent::Select);
        }
    }

    fn request_end(&mut self, reason: EndReason) {
        if let Some(port) = &self.port {
            port.emit(TrackingEvent::SessionEnded(reason));
        }
    }
}
