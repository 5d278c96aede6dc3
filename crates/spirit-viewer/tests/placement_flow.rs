use glam::{Mat4, Vec2, Vec3};
use spirit_viewer::{
    data::{AssetOptions, MeshTransform, PointCloudAsset},
    driver::{FrameReport, SceneDriver, ViewState},
    placement::{PlacementSession, PlacementState, SessionOptions, FADE_DURATION_S},
    registry::{UniformRegistry, UniformValue},
    tracking::{
        emulated::{FloorEmulator, PrintedMarker},
        EndReason, TrackingBackend, ViewRay,
    },
};

const DT: f32 = 1.0 / 60.0;

fn looking_at(target: Vec3) -> ViewState {
    let origin = Vec3::new(0.0, 1.6, 1.0);
    ViewState {
        view_proj: Mat4::IDENTITY,
        viewport: Vec2::new(720.0, 1280.0),
        ray: ViewRay {
            origin,
            direction: target - origin,
        },
    }
}

fn sky() -> ViewState {
    let mut view = looking_at(Vec3::ZERO);
    view.ray.direction = Vec3::new(0.0, 1.0, -1.0);
    view
}

fn tree() -> PointCloudAsset {
    let cloud = pcloud::PointCloud {
        positions: (0..200)
            .map(|i| {
                let t = i as f32 / 200.0;
                [t.cos() * 0.5, t * 3.0, t.sin() * 0.5]
            })
            .collect(),
        colors: None,
    };
    PointCloudAsset::from_cloud(cloud, &AssetOptions::default())
}

fn driver(options: SessionOptions) -> SceneDriver {
    let asset = tree();
    let transform = MeshTransform::fit(asset.bounds(), 1.2, false);
    SceneDriver::new(UniformRegistry::new(), PlacementSession::new(options, transform))
}

fn step(emu: &mut FloorEmulator, driver: &mut SceneDriver, view: &ViewState) -> FrameReport {
    emu.pump(&view.ray);
    driver.tick(DT, view)
}

#[test]
fn scan_place_and_fade_in() {
    let mut emu = FloorEmulator::new();
    let mut driver = driver(SessionOptions::default());
    driver.start(&mut emu).unwrap();

    // Looking up: nothing to place on.
    let report = step(&mut emu, &mut driver, &sky());
    assert_eq!(report.state, PlacementState::WorldTrackingScanning);
    assert!(!report.reticle_visible);
    assert_eq!(driver.registry().float("reticle_opacity"), Some(0.0));

    // A click before any floor hit does nothing.
    emu.select();
    step(&mut emu, &mut driver, &sky());
    assert!(!driver.session().is_placed());

    let spot = Vec3::new(0.3, 0.0, -1.0);
    let report = step(&mut emu, &mut driver, &looking_at(spot));
    assert_eq!(report.state, PlacementState::AwaitingUserConfirm);
    assert!(report.reticle_visible);

    // Several clicks: only one placement.
    for _ in 0..5 {
        emu.select();
    }
    let report = step(&mut emu, &mut driver, &looking_at(spot));
    assert!(report.placed_now);
    assert_eq!(report.state, PlacementState::Placed);
    assert!(!report.reticle_visible);
    assert_eq!(report.opacity, 0.0);

    let model = match driver.registry().get("model") {
        Some(UniformValue::Mat4(m)) => m,
        other => panic!("unexpected model uniform {other:?}"),
    };
    // The footprint center of the trunk base sits on the spot, just above the floor.
    let b = tree().bounds();
    let pivot = Vec3::new(b.center().x, b.min.y, b.center().z);
    let base = model.transform_point3(pivot);
    assert!((base - (spot + Vec3::Y * 0.02)).length() < 1e-4, "{base:?}");

    // Looking elsewhere no longer moves the tree, and hit-testing has stopped.
    step(&mut emu, &mut driver, &looking_at(Vec3::new(-2.0, 0.0, -3.0)));
    assert_eq!(driver.registry().get("model"), Some(UniformValue::Mat4(model)));
    assert!(!emu.is_hit_testing());

    // Opacity climbs to 1 over the fade.
    let mut last = 0.0;
    let frames = (FADE_DURATION_S / DT) as usize + 5;
    for _ in 0..frames {
        let report = step(&mut emu, &mut driver, &sky());
        assert!(report.opacity >= last);
        last = report.opacity;
    }
    assert_eq!(driver.registry().float("opacity"), Some(1.0));
}

#[test]
fn marker_gates_world_tracking() {
    let mut emu = FloorEmulator::new().with_marker(PrintedMarker {
        pattern: "spirit-floor".into(),
        center: Vec3::new(0.0, 0.0, -1.0),
        radius_m: 0.3,
    });
    let mut driver = driver(SessionOptions {
        seek_marker: true,
        ..SessionOptions::default()
    });
    driver.start(&mut emu).unwrap();

    let away = looking_at(Vec3::new(2.0, 0.0, -1.0));
    let report = step(&mut emu, &mut driver, &away);
    assert_eq!(report.state, PlacementState::MarkerSeeking);
    assert!(!report.reticle_visible);

    let report = step(&mut emu, &mut driver, &looking_at(Vec3::new(0.0, 0.0, -1.0)));
    assert_eq!(report.state, PlacementState::WorldTrackingScanning);

    let report = step(&mut emu, &mut driver, &away);
    assert_eq!(report.state, PlacementState::AwaitingUserConfirm);
}

#[test]
fn ending_resets_the_registry() {
    let mut emu = FloorEmulator::new();
    let mut driver = driver(SessionOptions::default());
    driver.start(&mut emu).unwrap();

    let spot = looking_at(Vec3::new(0.0, 0.0, -1.0));
    step(&mut emu, &mut driver, &spot);
    emu.select();
    step(&mut emu, &mut driver, &spot);
    for _ in 0..30 {
        step(&mut emu, &mut driver, &spot);
    }
    assert!(driver.registry().float("opacity").unwrap() > 0.0);
    assert_ne!(
        driver.registry().get("ambient_color"),
        Some(UniformValue::Color(Vec3::ONE))
    );

    emu.request_end(EndReason::Backgrounded);
    let report = step(&mut emu, &mut driver, &spot);
    assert!(report.ended_now);
    assert_eq!(report.state, PlacementState::Ended(EndReason::Backgrounded));

    assert_eq!(driver.registry().float("opacity"), Some(0.0));
    assert_eq!(driver.registry().float("reticle_opacity"), Some(0.0));
    assert_eq!(
        driver.registry().get("ambient_color"),
        Some(UniformValue::Color(Vec3::ONE))
    );
    assert_eq!(driver.registry().float("ambient_intensity"), Some(1.0));

    // Later input changes nothing.
    emu.select();
    let report = step(&mut emu, &mut driver, &spot);
    assert!(!report.ended_now);
    assert!(report.state.is_ended());
    assert!(!emu.is_running(), "the session should release tracking");
}
