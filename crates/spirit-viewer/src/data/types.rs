//! Core data types for the spirit viewer, focused on GPU data representation.

use glam::Vec3;

/// Animation variant a point follows.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// Bulk of the tree: slow breathing motion.
    Body = 0,
    /// Animated subset: orbits, bobs and glows brighter.
    Firefly = 1,
}

/// Per-point data uploaded to the GPU instance buffer.
/// Must match the instance inputs of `vs_main` in `spirit_points.wgsl`.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable, Debug, PartialEq)]
pub struct PointVertex {
    /// Local-space position, exactly as stored in the asset.
    pub position: [f32; 3],
    /// Linear RGB in 0..1.
    pub color: [f32; 3],
    /// `Role as u32`.
    pub role: u32,
    /// Index of the point in the source file.
    pub index: u32,
    /// Reserved for per-point force integration; always zero for now.
    pub offset: [f32; 3],
}

/// Axis-aligned bounds in local space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    pub const EMPTY: Bounds = Bounds {
        min: Vec3::INFINITY,
        max: Vec3::NEG_INFINITY,
    };

    #[inline]
    pub fn union(self, other: Bounds) -> Bounds {
        Bounds {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    #[inline]
    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }
}

/// GPU resources of the loaded cloud.
#[derive(Debug)]
pub struct CloudGpu {
    pub instances_len: u32,

    /// Vertex buffer containing `PointVertex` data.
    pub vtx: wgpu::Buffer,
}
