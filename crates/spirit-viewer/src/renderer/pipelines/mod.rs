//! Render pipelines. All of them read the same `Uniforms` block at group 0.

pub mod reticle;
pub mod spirit;

use crate::error::SetupError;

/// Two-triangle quad over `[-1, 1]²`, shared by the sprite and ring pipelines.
pub const QUAD_CORNERS: [[f32; 2]; 6] = [
    [-1.0, -1.0],
    [1.0, -1.0],
    [1.0, 1.0],
    [-1.0, -1.0],
    [1.0, 1.0],
    [-1.0, 1.0],
];

pub fn quad_layout() -> wgpu::VertexBufferLayout<'static> {
    const ATTRS: [wgpu::VertexAttribute; 1] = [wgpu::VertexAttribute {
        shader_location: 0,
        offset: 0,
        format: wgpu::VertexFormat::Float32x2,
    }];
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<[f32; 2]>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &ATTRS,
    }
}

/// Runs `build` inside a validation error scope so a bad WGSL module (or a
/// pipeline that does not match it) comes back as an error instead of
/// tripping the device's uncaptured-error handler.
pub fn build_checked<T>(
    device: &wgpu::Device,
    label: &str,
    build: impl FnOnce() -> T,
) -> Result<T, SetupError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let built = build();
    match pollster::block_on(device.pop_error_scope()) {
        None => Ok(built),
        Some(err) => {
            log::error!("Shader '{}' rejected: {}", label, err);
            Err(SetupError::ShaderCompile {
                label: label.to_string(),
                message: err.to_string(),
            })
        }
    }
}
