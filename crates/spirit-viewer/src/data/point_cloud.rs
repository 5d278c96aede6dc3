use crate::data::types::{Bounds, CloudGpu, PointVertex, Role};
use crate::error::SetupError;
use glam::Vec3;
use pcloud::PointCloud;
use rayon::prelude::*;
use std::path::Path;
use wgpu::util::DeviceExt;

/// Seed of the role hash. Changing it reshuffles which points are fireflies.
pub const ROLE_SEED: u32 = 0x5EED_7EE5;

/// Color used for every point when the asset carries none.
pub const NEUTRAL_GRAY: [f32; 3] = [0.5, 0.5, 0.5];

/// Upper bound on points inspected when guessing the color encoding.
const COLOR_SAMPLES: usize = 1024;

#[derive(Debug, Clone, Copy)]
pub struct AssetOptions {
    pub seed: u32,
    /// Fraction of points that become fireflies, 0..1.
    pub firefly_ratio: f32,
}

impl Default for AssetOptions {
    fn default() -> Self {
        Self {
            seed: ROLE_SEED,
            firefly_ratio: 0.08,
        }
    }
}

/// murmur3 finalizer.
#[inline(always)]
pub fn mix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

/// Role of the point at `index`; a pure function of its inputs.
#[inline]
pub fn role_for_index(index: u32, seed: u32, firefly_ratio: f32) -> Role {
    let h = mix32(index.wrapping_mul(0x9e37_79b9) ^ seed);
    // Top 24 bits as a uniform value in [0, 1).
    let unit = (h >> 8) as f32 / (1u32 << 24) as f32;
    if unit < firefly_ratio {
        Role::Firefly
    } else {
        Role::Body
    }
}

pub fn assign_roles(count: usize, seed: u32, firefly_ratio: f32) -> Vec<Role> {
    (0..count as u32)
        .into_par_iter()
        .map(|i| role_for_index(i, seed, firefly_ratio))
        .collect()
}

/// True when a sample of the buffer holds values above 1, i.e. 0–255 bytes.
pub fn looks_like_byte_colors(colors: &[[f32; 3]]) -> bool {
    colors
        .iter()
        .step_by(color_sample_stride(colors.len()))
        .any(|c| c.iter().any(|&v| v > 1.0))
}

/// Step between inspected points so that at most `COLOR_SAMPLES` are read.
fn color_sample_stride(len: usize) -> usize {
    len.div_ceil(COLOR_SAMPLES).max(1)
}

/// Brings colors into 0..1. A buffer already in range is left untouched, so
/// applying this twice is the same as applying it once.
/// Returns whether the buffer was rescaled.
pub fn normalize_colors(colors: &mut [[f32; 3]]) -> bool {
    if !looks_like_byte_colors(colors) {
        return false;
    }
    colors.par_iter_mut().for_each(|c| {
        for v in c.iter_mut() {
            *v = (*v / 255.0).clamp(0.0, 1.0);
        }
    });
    true
}

pub fn compute_bounds(positions: &[[f32; 3]]) -> Bounds {
    positions
        .par_iter()
        .map(|&p| Bounds {
            min: Vec3::from(p),
            max: Vec3::from(p),
        })
        .reduce(|| Bounds::EMPTY, Bounds::union)
}

/// Immutable per-point buffer of the spirit tree.
#[derive(Debug, Clone)]
pub struct PointCloudAsset {
    vertices: Vec<PointVertex>,
    bounds: Bounds,
    /// Whether the source carried colors.
    pub had_color: bool,
    /// Whether source colors were 0–255 and got rescaled.
    pub rescaled_colors: bool,
}

impl PointCloudAsset {
    pub fn from_cloud(cloud: PointCloud, options: &AssetOptions) -> Self {
        let PointCloud { positions, colors } = cloud;

        let had_color = colors.is_some();
        let (colors, rescaled_colors) = match colors {
            Some(mut colors) => {
                let rescaled = normalize_colors(&mut colors);
                (colors, rescaled)
            }
            None => (vec![NEUTRAL_GRAY; positions.len()], false),
        };

        let roles = assign_roles(positions.len(), options.seed, options.firefly_ratio);
        let bounds = compute_bounds(&positions);

        let vertices = positions
            .par_iter()
            .zip(colors.par_iter())
            .zip(roles.par_iter())
            .enumerate()
            .map(|(i, ((&position, &color), &role))| PointVertex {
                position,
                color,
                role: role as u32,
                index: i as u32,
                offset: [0.0; 3],
            })
            .collect();

        Self {
            vertices,
            bounds,
            had_color,
            rescaled_colors,
        }
    }

    /// Reads the asset file. Failure is fatal to the experience.
    pub fn load(path: &Path, options: &AssetOptions) -> Result<Self, SetupError> {
        let cloud = pcloud::read_file(path).map_err(|source| SetupError::AssetLoad {
            path: path.to_path_buf(),
            source,
        })?;

        if cloud.is_empty() {
            return Err(SetupError::EmptyAsset(path.to_path_buf()));
        }

        let asset = Self::from_cloud(cloud, options);

        log::info!(
            "Loaded {} points from {} ({} fireflies, color: {}).",
            asset.len(),
            path.display(),
            asset.firefly_count(),
            match (asset.had_color, asset.rescaled_colors) {
                (false, _) => "none, using gray",
                (true, true) => "0-255, rescaled",
                (true, false) => "0-1",
            }
        );
        log::debug!(
            "Asset bounds min=({:.3},{:.3},{:.3}) max=({:.3},{:.3},{:.3})",
            asset.bounds.min.x,
            asset.bounds.min.y,
            asset.bounds.min.z,
            asset.bounds.max.x,
            asset.bounds.max.y,
            asset.bounds.max.z
        );

        Ok(asset)
    }

    pub fn vertices(&self) -> &[PointVertex] {
        &self.vertices
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn firefly_count(&self) -> usize {
        self.vertices
            .iter()
            .filter(|v| v.role == Role::Firefly as u32)
            .count()
    }

    /// Uploads the instance buffer.
    pub fn upload(&self, device: &wgpu::Device) -> CloudGpu {
        let vtx = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Spirit Points"),
            contents: bytemuck::cast_slice(&self.vertices),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });

        CloudGpu {
            instances_len: self.vertices.len() as u32,
            vtx,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_colors_are_scaled_once() {
        let mut colors = vec![[255.0, 128.0, 0.0]];
        assert!(normalize_colors(&mut colors));

        let c = colors[0];
        assert_eq!(c[0], 1.0);
        assert!((c[1] - 0.502).abs() < 1e-3);
        assert_eq!(c[2], 0.0);

        // Second pass is a no-op.
        let before = colors.clone();
        assert!(!normalize_colors(&mut colors));
        assert_eq!(colors, before);
    }

    #[test]
    fn color_sampling_stays_within_budget() {
        for len in [0, 1, 1023, 1024, 1025, 2047, 6000, 1_000_003] {
            let stride = color_sample_stride(len);
            assert!(len.div_ceil(stride) <= COLOR_SAMPLES, "{len} points, stride {stride}");
        }
        // A byte-colored point anywhere on the sampled grid is found.
        let mut colors = vec![[0.2f32; 3]; 2047];
        colors[2046] = [200.0, 10.0, 10.0];
        assert!(looks_like_byte_colors(&colors));
    }

    #[test]
    fn unit_colors_are_untouched() {
        let mut colors = vec![[0.5, 0.2, 0.9]];
        assert!(!normalize_colors(&mut colors));
        assert_eq!(colors, vec![[0.5, 0.2, 0.9]]);
    }

    #[test]
    fn roles_are_reproducible() {
        let a = assign_roles(10_000, ROLE_SEED, 0.08);
        let b = assign_roles(10_000, ROLE_SEED, 0.08);
        assert_eq!(a, b);

        // The ratio is roughly honored and both roles occur.
        let fireflies = a.iter().filter(|r| **r == Role::Firefly).count();
        assert!((500..1100).contains(&fireflies), "got {fireflies}");

        let other_seed = assign_roles(10_000, ROLE_SEED ^ 1, 0.08);
        assert_ne!(a, other_seed);
    }

    #[test]
    fn asset_without_color_is_gray_and_unscaled() {
        let cloud = PointCloud {
            positions: vec![[0.0, 0.0, 0.0], [1.0, 2.0, 3.0]],
            colors: None,
        };
        let asset = PointCloudAsset::from_cloud(cloud, &AssetOptions::default());

        assert!(!asset.had_color);
        assert!(asset.vertices().iter().all(|v| v.color == NEUTRAL_GRAY));
        assert_eq!(asset.vertices()[1].position, [1.0, 2.0, 3.0]);
        assert_eq!(asset.vertices()[1].index, 1);
        assert_eq!(asset.vertices()[1].offset, [0.0; 3]);
        assert_eq!(asset.bounds().max, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn vertex_roles_match_the_hash() {
        let cloud = PointCloud {
            positions: vec![[0.0; 3]; 500],
            colors: Some(vec![[10.0, 20.0, 30.0]; 500]),
        };
        let options = AssetOptions::default();
        let asset = PointCloudAsset::from_cloud(cloud, &options);

        assert!(asset.rescaled_colors);
        for v in asset.vertices() {
            let expected = role_for_index(v.index, options.seed, options.firefly_ratio);
            assert_eq!(v.role, expected as u32);
        }
    }
}
