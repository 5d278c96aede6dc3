// src/lib.rs
//! Spirit tree viewer library.
//!
//! A point-cloud tree anchored to the floor through a placement state
//! machine, animated on the GPU from a small registry of named uniforms.

pub mod app;
pub mod camera;
pub mod config;
pub mod data;
pub mod driver;
pub mod error;
pub mod placement;
pub mod registry;
pub mod renderer;
pub mod shaders;
pub mod tracking;
pub mod ui;
