use crate::tracking::ViewRay;
use glam::{Mat4, Vec3};
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Standing eye height of the emulated handheld device, in meters.
pub const EYE_HEIGHT_M: f32 = 1.6;

const NEAR_M: f32 = 0.01;
const FAR_M: f32 = 100.0;

/// The viewer's device in world meters. `y` is up, the floor is `y = 0`.
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    /// Heading around +Y (radians); 0 looks down -Z.
    pub yaw_rad: f32,
    /// Tilt from horizontal (radians); negative looks down.
    pub pitch_rad: f32,
    pub proj: Mat4,
}

impl Camera {
    /// A device held at eye height, tilted toward the floor in front.
    pub fn new(aspect: f32) -> Self {
        Self {
            position: Vec3::new(0.0, EYE_HEIGHT_M, 1.5),
            yaw_rad: 0.0,
            pitch_rad: -35f32.to_radians(),
            proj: Self::projection(aspect),
        }
    }

    /// wgpu uses 0..1 depth; `perspective_rh` already targets it.
    pub fn projection(aspect: f32) -> Mat4 {
        Mat4::perspective_rh(60f32.to_radians(), aspect.max(1e-3), NEAR_M, FAR_M)
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.proj = Self::projection(aspect);
    }

    pub fn forward(&self) -> Vec3 {
        let (sy, cy) = self.yaw_rad.sin_cos();
        let (sp, cp) = self.pitch_rad.sin_cos();
        Vec3::new(-sy * cp, sp, -cy * cp)
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward(), Vec3::Y)
    }

    pub fn view_proj(&self) -> Mat4 {
        self.proj * self.view()
    }

    /// Ray through the center of the screen, used for hit-testing.
    pub fn center_ray(&self) -> ViewRay {
        ViewRay {
            origin: self.position,
            direction: self.forward(),
        }
    }
}

/// Desktop stand-in for moving a phone around: WASD walks, the right mouse
/// button looks around.
#[derive(Default)]
pub struct CameraController {
    look_down: bool,
    last_mouse: Option<(f64, f64)>,
    forward: f32,
    strafe: f32,
    keys: [bool; 4],
}

impl CameraController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles window events; returns `true` if the event was used.
    pub fn handle_event(&mut self, event: &WindowEvent, camera: &mut Camera) -> bool {
        match event {
            WindowEvent::MouseInput { button, state, .. } if *button == MouseButton::Right => {
                self.look_down = *state == ElementState::Pressed;
                true
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.handle_cursor_look((position.x, position.y), camera);
                false
            }
            WindowEvent::KeyboardInput { event, .. } => {
                let slot = match event.physical_key {
                    PhysicalKey::Code(KeyCode::KeyW) => 0,
                    PhysicalKey::Code(KeyCode::KeyS) => 1,
                    PhysicalKey::Code(KeyCode::KeyA) => 2,
                    PhysicalKey::Code(KeyCode::KeyD) => 3,
                    _ => return false,
                };
                self.keys[slot] = event.state == ElementState::Pressed;
                self.forward = axis(self.keys[0], self.keys[1]);
                self.strafe = axis(self.keys[3], self.keys[2]);
                true
            }
            _ => false,
        }
    }

    /// Walks the camera along the floor at 1 m/s.
    pub fn update(&self, dt: f32, camera: &mut Camera) {
        if self.forward == 0.0 && self.strafe == 0.0 {
            return;
        }
        let (sy, cy) = camera.yaw_rad.sin_cos();
        let ahead = Vec3::new(-sy, 0.0, -cy);
        let right = Vec3::new(cy, 0.0, -sy);
        camera.position += (ahead * self.forward + right * self.strafe) * dt;
    }

    fn handle_cursor_look(&mut self, xy: (f64, f64), camera: &mut Camera) {
        if let Some(last) = self.last_mouse {
            if self.look_down {
                let dx = ((xy.0 - last.0) * 0.004) as f32;
                let dy = ((last.1 - xy.1) * 0.004) as f32;

                camera.yaw_rad -= dx;
                camera.pitch_rad = (camera.pitch_rad + dy)
                    .clamp(-89f32.to_radians(), 89f32.to_radians());
            }
        }
        self.last_mouse = Some(xy);
    }
}

fn axis(positive: bool, negative: bool) -> f32 {
    positive as i32 as f32 - negative as i32 as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_view_ray_hits_the_floor_ahead() {
        let cam = Camera::new(16.0 / 9.0);
        let ray = cam.center_ray();
        assert!(ray.direction.y < 0.0);
        assert!(ray.direction.z < 0.0);
        assert!((ray.direction.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn view_proj_puts_the_looked_at_point_in_the_center() {
        let cam = Camera::new(1.0);
        let target = cam.position + cam.forward() * 2.0;
        let clip = cam.view_proj() * target.extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
        assert!((0.0..=1.0).contains(&ndc.z));
    }
}
