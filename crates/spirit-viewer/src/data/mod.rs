// src/data/mod.rs
//! Point-cloud data for the spirit viewer.
//!
//! This module provides functionality for:
//! - Loading a PLY point cloud and preparing per-point attributes (colors, roles).
//! - The single mesh-level transform that fits and anchors the cloud.
//! - Defining the data structures for GPU buffers.

pub mod point_cloud;
pub mod transform;
pub mod types;

// Re-export commonly used types for convenience.
pub use self::point_cloud::{AssetOptions, PointCloudAsset};
pub use self::transform::MeshTransform;
pub use self::types::{Bounds, CloudGpu, PointVertex, Role};
