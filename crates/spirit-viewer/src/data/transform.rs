use crate::data::types::Bounds;
use crate::tracking::Pose;
use glam::{Mat4, Quat, Vec3};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TransformError {
    #[error("the point cloud is already anchored")]
    AlreadyAnchored,
}

/// The one transform applied to the whole point cloud.
///
/// `fit` centers the cloud on its horizontal footprint, rests its base on
/// `y = 0` and scales it to a target width. `anchor` then moves the fitted
/// cloud onto a floor pose, once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshTransform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: f32,
    anchored: bool,
}

impl Default for MeshTransform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: 1.0,
            anchored: false,
        }
    }
}

impl MeshTransform {
    /// Fits local-space `bounds` into `footprint_m` meters of floor.
    /// `z_up` turns a Z-up asset upright first.
    pub fn fit(bounds: Bounds, footprint_m: f32, z_up: bool) -> Self {
        let rotation = if z_up {
            Quat::from_rotation_x(-std::f32::consts::FRAC_PI_2)
        } else {
            Quat::IDENTITY
        };

        // Bounds as seen after the rotation.
        let upright = bounds
            .corners()
            .iter()
            .map(|&c| rotation * c)
            .fold(Bounds::EMPTY, |acc, p| acc.union(Bounds { min: p, max: p }));

        let extent = upright.extent();
        let width = extent.x.max(extent.z);
        let scale = if width > f32::EPSILON && footprint_m > 0.0 {
            footprint_m / width
        } else {
            1.0
        };

        let center = upright.center();
        let pivot = Vec3::new(center.x, upright.min.y, center.z);

        Self {
            translation: -pivot * scale,
            rotation,
            scale,
            anchored: false,
        }
    }

    /// Places the fitted cloud on `pose`, raised by `floor_offset_m`.
    /// Only the heading of the pose is used so the tree stays upright.
    pub fn anchor(&mut self, pose: &Pose, floor_offset_m: f32) -> Result<(), TransformError> {
        if self.anchored {
            return Err(TransformError::AlreadyAnchored);
        }

        let heading = Quat::from_rotation_y(pose.yaw());
        self.translation = pose.position + Vec3::Y * floor_offset_m + heading * self.translation;
        self.rotation = heading * self.rotation;
        self.anchored = true;
        Ok(())
    }

    pub fn is_anchored(&self) -> bool {
        self.anchored
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(Vec3::splat(self.scale), self.rotation, self.translation)
    }
}
