//! Boundary between the placement state machine and whatever supplies world
//! tracking (a WebXR bridge, a native AR runtime, or the desktop emulator).
//!
//! The two sides talk through a pair of channels: the tracking side emits
//! [`TrackingEvent`]s into a [`TrackingPort`], the session drains them from
//! its [`TrackingLink`] once per frame and answers with [`TrackingCommand`]s.

pub mod emulated;

use crossbeam_channel::{Receiver, Sender};
use glam::{Mat4, Quat, Vec3};
use thiserror::Error;

/// Position and orientation of a tracked surface or device, in world meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Pose {
    pub const IDENTITY: Pose = Pose {
        position: Vec3::ZERO,
        orientation: Quat::IDENTITY,
    };

    pub fn new(position: Vec3, orientation: Quat) -> Self {
        Self {
            position,
            orientation,
        }
    }

    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.orientation, self.position)
    }

    /// Heading around world +Y, in radians.
    pub fn yaw(&self) -> f32 {
        let forward = self.orientation * Vec3::NEG_Z;
        (-forward.x).atan2(-forward.z)
    }
}

/// Ambient lighting sampled from the camera feed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightEstimate {
    pub color: Vec3,
    pub intensity: f32,
}

impl LightEstimate {
    /// Used whenever no estimate is available.
    pub const NEUTRAL: LightEstimate = LightEstimate {
        color: Vec3::ONE,
        intensity: 1.0,
    };
}

/// Everything the tracking side learned during one presented frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackingFrame {
    /// Surface hits along the view-center ray, closest first.
    pub hits: Vec<Pose>,
    pub light: Option<LightEstimate>,
    /// Identifier of a planar pattern seen in the camera image.
    pub marker: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    UserExit,
    Backgrounded,
    CameraRevoked,
    StartFailed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrackingEvent {
    Frame(TrackingFrame),
    /// Explicit user confirmation (tap / click).
    Select,
    SessionEnded(EndReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingCommand {
    /// Stop spending work on hit-testing.
    CancelHitTest,
    /// Release the session and its camera.
    EndSession,
}

/// Answer to "is world tracking with surface hit-testing supported".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Supported,
    Unsupported,
    /// The platform could not answer (emulators often under-report).
    Unknown,
}

#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("a tracking session is already running")]
    AlreadyRunning,
    #[error("the platform rejected the session: {0}")]
    Rejected(String),
}

/// Ray from the view center, used for the per-frame hit test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewRay {
    pub origin: Vec3,
    pub direction: Vec3,
}

/// A source of world tracking.
pub trait TrackingBackend {
    fn capability(&self) -> Capability;

    /// Starts the session; events flow into `port` from now on.
    fn start(&mut self, port: TrackingPort) -> Result<(), TrackingError>;

    /// Produces the tracking data of the frame about to be drawn.
    fn pump(&mut self, view: &ViewRay);

    /// Forwards a user confirmation.
    fn select(&mut self);

    /// Ends the session from the outside (user exit, OS revocation).
    fn request_end(&mut self, reason: EndReason);
}

/// Session side of the channel pair.
#[derive(Debug)]
pub struct TrackingLink {
    events: Receiver<TrackingEvent>,
    commands: Sender<TrackingCommand>,
}

impl TrackingLink {
    /// Events received since the last call, in arrival order.
    pub fn drain(&self) -> Vec<TrackingEvent> {
        self.events.try_iter().collect()
    }

    pub fn send(&self, command: TrackingCommand) {
        if self.commands.send(command).is_err() {
            log::debug!("Tracking side gone; dropped {:?}", command);
        }
    }
}

/// Tracking side of the channel pair.
#[derive(Debug)]
pub struct TrackingPort {
    events: Sender<TrackingEvent>,
    commands: Receiver<TrackingCommand>,
}

impl TrackingPort {
    /// Queues an event; returns `false` once the session side is gone.
    pub fn emit(&self, event: TrackingEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// Commands issued by the session since the last call.
    pub fn commands(&self) -> Vec<TrackingCommand> {
        self.commands.try_iter().collect()
    }
}

/// Creates a connected link/port pair.
pub fn link() -> (TrackingLink, TrackingPort) {
    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    let (command_tx, command_rx) = crossbeam_channel::unbounded();
    (
        TrackingLink {
            events: event_rx,
            commands: command_tx,
        },
        TrackingPort {
            events: event_tx,
            commands: command_rx,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_and_commands_cross_the_link() {
        let (link, port) = link();

        assert!(port.emit(TrackingEvent::Select));
        assert!(port.emit(TrackingEvent::Frame(TrackingFrame::default())));
        assert_eq!(link.drain().len(), 2);
        assert!(link.drain().is_empty());

        link.send(TrackingCommand::CancelHitTest);
        assert_eq!(port.commands(), vec![TrackingCommand::CancelHitTest]);

        drop(link);
        assert!(!port.emit(TrackingEvent::Select));
    }

    #[test]
    fn yaw_of_a_turned_pose() {
        let pose = Pose::new(Vec3::ZERO, Quat::from_rotation_y(0.75));
        assert!((pose.yaw() - 0.75).abs() < 1e-5);
        assert!(Pose::IDENTITY.yaw().abs() < 1e-6);
    }
}
