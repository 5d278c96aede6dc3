//! Placement state machine.
//!
//! A session walks `Idle -> MarkerSeeking (optional) -> WorldTrackingScanning
//! <-> AwaitingUserConfirm -> Placed -> Ended`. It never talks to the tracking
//! side directly; it only reacts to the events drained from its
//! [`TrackingLink`] and answers with [`TrackingCommand`]s.

use crate::data::MeshTransform;
use crate::error::SetupError;
use crate::tracking::{
    link, Capability, EndReason, LightEstimate, Pose, TrackingBackend, TrackingCommand,
    TrackingEvent, TrackingFrame, TrackingLink,
};
use glam::Mat4;

/// Length of the fade-in after placement, in seconds.
pub const FADE_DURATION_S: f32 = 2.5;

/// Default vertical lift applied on top of the hit pose, in meters.
pub const DEFAULT_FLOOR_OFFSET_M: f32 = 0.02;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementState {
    Idle,
    MarkerSeeking,
    WorldTrackingScanning,
    AwaitingUserConfirm,
    Placed,
    Ended(EndReason),
}

impl PlacementState {
    pub fn is_ended(&self) -> bool {
        matches!(self, PlacementState::Ended(_))
    }

    /// Text for the status line.
    pub fn status_line(&self) -> &'static str {
        match self {
            PlacementState::Idle => "Loading the spirit tree…",
            PlacementState::MarkerSeeking => "Point the camera at the floor marker.",
            PlacementState::WorldTrackingScanning => "Move the phone slowly to find the floor.",
            PlacementState::AwaitingUserConfirm => "Tap to place the spirit tree.",
            PlacementState::Placed => "",
            PlacementState::Ended(EndReason::StartFailed) => "AR could not start on this device.",
            PlacementState::Ended(_) => "The AR session has ended.",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Require a known floor marker before world tracking takes over.
    pub seek_marker: bool,
    /// Pattern ids accepted as the floor marker.
    pub marker_patterns: Vec<String>,
    pub floor_offset_m: f32,
    /// Ignore any light estimate the tracking side reports.
    pub light_estimation: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            seek_marker: false,
            marker_patterns: vec!["spirit-floor".to_string()],
            floor_offset_m: DEFAULT_FLOOR_OFFSET_M,
            light_estimation: true,
        }
    }
}

/// Fixed-duration opacity ramp started at placement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeIn {
    elapsed: f32,
    duration: f32,
}

impl FadeIn {
    pub fn new(duration: f32) -> Self {
        Self {
            elapsed: 0.0,
            duration,
        }
    }

    pub fn advance(&mut self, dt: f32) {
        self.elapsed = (self.elapsed + dt.max(0.0)).min(self.duration);
    }

    pub fn is_done(&self) -> bool {
        self.elapsed >= self.duration
    }

    /// Opacity in 0..1.
    pub fn opacity(&self) -> f32 {
        if self.duration <= 0.0 {
            return 1.0;
        }
        ease_in_out_cubic(self.elapsed / self.duration)
    }
}

pub fn ease_in_out_cubic(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

/// What a single call to [`PlacementSession::advance`] changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Advance {
    pub placed_now: bool,
    pub ended_now: bool,
}

pub struct PlacementSession {
    state: PlacementState,
    options: SessionOptions,
    candidate: Option<Pose>,
    /// Reticle pose; `None` when hidden or torn down.
    reticle: Option<Pose>,
    reticle_released: bool,
    fade: Option<FadeIn>,
    light: LightEstimate,
    transform: MeshTransform,
    link: Option<TrackingLink>,
}

impl PlacementSession {
    pub fn new(options: SessionOptions, transform: MeshTransform) -> Self {
        Self {
            state: PlacementState::Idle,
            options,
            candidate: None,
            reticle: None,
            reticle_released: false,
            fade: None,
            light: LightEstimate::NEUTRAL,
            transform,
            link: None,
        }
    }

    /// Starts tracking on `backend`. An unconfirmed capability only warns;
    /// the start itself is what decides.
    pub fn start(&mut self, backend: &mut dyn TrackingBackend) -> Result<(), SetupError> {
        if self.state != PlacementState::Idle {
            log::warn!("Session start ignored in state {:?}", self.state);
            return Ok(());
        }

        match backend.capability() {
            Capability::Supported => {}
            other => log::warn!(
                "World tracking capability reported as {:?}; trying anyway",
                other
            ),
        }

        let (link, port) = link();
        if let Err(err) = backend.start(port) {
            log::error!("AR session failed to start: {}", err);
            self.state = PlacementState::Ended(EndReason::StartFailed);
            return Err(SetupError::SessionStart(err));
        }

        self.link = Some(link);
        self.state = if self.options.seek_marker {
            PlacementState::MarkerSeeking
        } else {
            PlacementState::WorldTrackingScanning
        };
        log::info!("AR session started -> {:?}", self.state);
        Ok(())
    }

    /// Pulls every pending event from the tracking side and applies it.
    pub fn pump(&mut self) -> Advance {
        let events = match &self.link {
            Some(link) => link.drain(),
            None => Vec::new(),
        };
        self.advance(events)
    }

    /// Applies events in arrival order.
    pub fn advance(&mut self, events: Vec<TrackingEvent>) -> Advance {
        let mut out = Advance::default();
        for event in events {
            if self.state.is_ended() {
                break;
            }
            match event {
                TrackingEvent::Frame(frame) => self.on_frame(frame),
                TrackingEvent::Select => out.placed_now |= self.confirm(),
                TrackingEvent::SessionEnded(reason) => {
                    self.end(reason);
                    out.ended_now = true;
                }
            }
        }
        out
    }

    fn on_frame(&mut self, frame: TrackingFrame) {
        self.light = match frame.light {
            Some(light) if self.options.light_estimation => light,
            _ => LightEstimate::NEUTRAL,
        };

        match self.state {
            PlacementState::MarkerSeeking => {
                let known = frame
                    .marker
                    .as_ref()
                    .filter(|m| self.options.marker_patterns.iter().any(|p| p == *m));
                if let Some(pattern) = known {
                    log::info!("Floor marker '{}' recognized", pattern);
                    self.state = PlacementState::WorldTrackingScanning;
                }
            }
            PlacementState::WorldTrackingScanning | PlacementState::AwaitingUserConfirm => {
                // Closest hit only.
                self.candidate = frame.hits.first().copied();
                self.reticle = self.candidate;

                let next = if self.candidate.is_some() {
                    PlacementState::AwaitingUserConfirm
                } else {
                    log::trace!("No surface hit this frame");
                    PlacementState::WorldTrackingScanning
                };
                if next != self.state {
                    log::debug!("{:?} -> {:?}", self.state, next);
                    self.state = next;
                }
            }
            PlacementState::Idle | PlacementState::Placed | PlacementState::Ended(_) => {}
        }
    }

    /// Handles a user confirmation. Returns `true` only for the one that
    /// places the tree.
    pub fn confirm(&mut self) -> bool {
        if self.state != PlacementState::AwaitingUserConfirm {
            return false;
        }
        let Some(pose) = self.candidate else {
            return false;
        };

        if let Err(err) = self.transform.anchor(&pose, self.options.floor_offset_m) {
            log::warn!("Placement ignored: {}", err);
            return false;
        }

        self.state = PlacementState::Placed;
        self.candidate = None;
        self.release_reticle();
        self.send(TrackingCommand::CancelHitTest);
        self.fade = Some(FadeIn::new(FADE_DURATION_S));
        log::info!(
            "Spirit tree placed at ({:.2}, {:.2}, {:.2})",
            pose.position.x,
            pose.position.y,
            pose.position.z
        );
        true
    }

    /// The single teardown path. Safe to call more than once.
    pub fn end(&mut self, reason: EndReason) {
        if self.state.is_ended() {
            return;
        }
        log::info!("AR session ended ({:?}) in state {:?}", reason, self.state);

        self.release_reticle();
        self.candidate = None;
        self.send(TrackingCommand::CancelHitTest);
        self.send(TrackingCommand::EndSession);
        self.link = None;
        self.light = LightEstimate::NEUTRAL;
        self.state = PlacementState::Ended(reason);
    }

    fn release_reticle(&mut self) {
        self.reticle = None;
        self.reticle_released = true;
    }

    fn send(&self, command: TrackingCommand) {
        if let Some(link) = &self.link {
            link.send(command);
        }
    }

    /// Moves the fade ramp forward.
    pub fn tick(&mut self, dt: f32) {
        if let Some(fade) = &mut self.fade {
            fade.advance(dt);
        }
    }

    pub fn state(&self) -> &PlacementState {
        &self.state
    }

    pub fn candidate(&self) -> Option<Pose> {
        self.candidate
    }

    pub fn is_placed(&self) -> bool {
        self.transform.is_anchored()
    }

    pub fn reticle(&self) -> Option<Pose> {
        self.reticle
    }

    /// True once the reticle geometry has been torn down for good.
    pub fn reticle_released(&self) -> bool {
        self.reticle_released
    }

    pub fn light(&self) -> LightEstimate {
        self.light
    }

    pub fn transform(&self) -> &MeshTransform {
        &self.transform
    }

    pub fn model_matrix(&self) -> Mat4 {
        self.transform.matrix()
    }

    /// Opacity of the tree: zero until placed, then the fade ramp.
    pub fn opacity(&self) -> f32 {
        match (&self.state, &self.fade) {
            (PlacementState::Placed, Some(fade)) => fade.opacity(),
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::{emulated::FloorEmulator, TrackingError, TrackingPort, ViewRay};
    use glam::{Quat, Vec3};

    fn hit(x: f32) -> TrackingEvent {
        TrackingEvent::Frame(TrackingFrame {
            hits: vec![
                Pose::new(Vec3::new(x, 0.0, -1.0), Quat::IDENTITY),
                Pose::new(Vec3::new(x, 0.0, -5.0), Quat::IDENTITY),
            ],
            light: None,
            marker: None,
        })
    }

    fn miss() -> TrackingEvent {
        TrackingEvent::Frame(TrackingFrame::default())
    }

    fn scanning_session() -> PlacementSession {
        let mut session = PlacementSession::new(SessionOptions::default(), MeshTransform::default());
        let mut emu = FloorEmulator::new();
        session.start(&mut emu).unwrap();
        session
    }

    #[test]
    fn repeated_confirms_place_once() {
        let mut session = scanning_session();
        session.advance(vec![hit(0.5)]);

        let placed: Vec<bool> = (0..5).map(|_| session.confirm()).collect();
        assert_eq!(placed, vec![true, false, false, false, false]);
        assert_eq!(session.state(), &PlacementState::Placed);

        // The closest hit was used.
        let origin = session.model_matrix().transform_point3(Vec3::ZERO);
        assert!((origin - Vec3::new(0.5, DEFAULT_FLOOR_OFFSET_M, -1.0)).length() < 1e-6);

        // Later hits no longer move anything.
        session.advance(vec![hit(3.0), TrackingEvent::Select]);
        let after = session.model_matrix().transform_point3(Vec3::ZERO);
        assert_eq!(origin, after);
        assert!(session.reticle().is_none());
    }

    #[test]
    fn miss_clears_candidate_and_hides_reticle() {
        let mut session = scanning_session();
        let mut seen = Vec::new();
        for event in [hit(0.0), miss(), hit(1.0), hit(2.0), miss()] {
            session.advance(vec![event]);
            seen.push((session.reticle().is_some(), session.candidate().is_some()));
        }
        assert_eq!(
            seen,
            vec![(true, true), (false, false), (true, true), (true, true), (false, false)]
        );
        assert_eq!(session.state(), &PlacementState::WorldTrackingScanning);
    }

    #[test]
    fn confirm_without_candidate_is_a_no_op() {
        let mut session = scanning_session();
        assert!(!session.confirm());

        session.advance(vec![hit(0.0), miss(), TrackingEvent::Select]);
        assert!(!session.is_placed());
        assert_eq!(session.state(), &PlacementState::WorldTrackingScanning);
    }

    #[test]
    fn marker_seeking_waits_for_a_known_pattern() {
        let options = SessionOptions {
            seek_marker: true,
            ..SessionOptions::default()
        };
        let mut session = PlacementSession::new(options, MeshTransform::default());
        session.start(&mut FloorEmulator::new()).unwrap();
        assert_eq!(session.state(), &PlacementState::MarkerSeeking);

        let seen = |pattern: &str| {
            TrackingEvent::Frame(TrackingFrame {
                hits: vec![Pose::IDENTITY],
                light: None,
                marker: Some(pattern.to_string()),
            })
        };

        session.advance(vec![hit(0.0), seen("poster"), TrackingEvent::Select]);
        assert_eq!(session.state(), &PlacementState::MarkerSeeking);
        assert!(session.reticle().is_none());

        session.advance(vec![seen("spirit-floor")]);
        assert_eq!(session.state(), &PlacementState::WorldTrackingScanning);

        session.advance(vec![hit(0.0)]);
        assert_eq!(session.state(), &PlacementState::AwaitingUserConfirm);
    }

    #[test]
    fn fade_ramps_after_placement() {
        let mut session = scanning_session();
        session.tick(1.0);
        assert_eq!(session.opacity(), 0.0);

        session.advance(vec![hit(0.0), TrackingEvent::Select]);
        assert_eq!(session.opacity(), 0.0);

        session.tick(FADE_DURATION_S / 2.0);
        assert!((session.opacity() - 0.5).abs() < 1e-6);

        session.tick(FADE_DURATION_S);
        assert_eq!(session.opacity(), 1.0);
    }

    #[test]
    fn end_is_terminal_and_releases_everything() {
        let (test_link, port) = crate::tracking::link();
        let mut session = scanning_session();
        // Swap in a link we can observe.
        session.link = Some(test_link);

        session.advance(vec![hit(0.0), TrackingEvent::SessionEnded(EndReason::Backgrounded)]);
        assert_eq!(session.state(), &PlacementState::Ended(EndReason::Backgrounded));
        assert!(session.reticle().is_none());
        assert!(session.reticle_released());
        assert_eq!(
            port.commands(),
            vec![TrackingCommand::CancelHitTest, TrackingCommand::EndSession]
        );

        session.advance(vec![hit(1.0), TrackingEvent::Select]);
        assert!(!session.is_placed());
        session.end(EndReason::UserExit);
        assert_eq!(session.state(), &PlacementState::Ended(EndReason::Backgrounded));
    }

    struct Refusing;

    impl TrackingBackend for Refusing {
        fn capability(&self) -> Capability {
            Capability::Unknown
        }
        fn start(&mut self, _port: TrackingPort) -> Result<(), TrackingError> {
            Err(TrackingError::Rejected("no camera".into()))
        }
        fn pump(&mut self, _view: &ViewRay) {}
        fn select(&mut self) {}
        fn request_end(&mut self, _reason: EndReason) {}
    }

    #[test]
    fn failed_start_is_fatal() {
        let mut session = PlacementSession::new(SessionOptions::default(), MeshTransform::default());
        let err = session.start(&mut Refusing).unwrap_err();
        assert!(matches!(err, SetupError::SessionStart(_)));
        assert_eq!(session.state(), &PlacementState::Ended(EndReason::StartFailed));
    }

    #[test]
    fn unknown_capability_still_starts() {
        let mut session = PlacementSession::new(SessionOptions::default(), MeshTransform::default());
        let mut emu = FloorEmulator::new().with_capability(Capability::Unknown);
        session.start(&mut emu).unwrap();
        assert!(emu.is_running());
        assert_eq!(session.state(), &PlacementState::WorldTrackingScanning);
    }
}
