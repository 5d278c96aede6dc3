//! The one bind group every pipeline uses: the uniform buffer filled from the
//! registry, plus the sprite mask texture its `sprite_mask` handle selects.

use crate::registry::{TextureHandle, UniformRegistry};
use wgpu::util::DeviceExt;

/// Edge length of the generated mask textures, in texels.
pub const MASK_SIZE: u32 = 64;

/// Sprite shapes a `sprite_mask` handle can select; the handle is the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskShape {
    /// Disc with a feathered rim.
    Soft,
    /// Disc with a hard edge.
    Disc,
}

pub const MASK_SHAPES: [MaskShape; 2] = [MaskShape::Soft, MaskShape::Disc];

/// Single-channel coverage of `shape` on a `size` x `size` grid, row-major.
pub fn mask_texels(shape: MaskShape, size: u32) -> Vec<u8> {
    let half = size as f32 * 0.5;
    let mut out = Vec::with_capacity((size * size) as usize);
    for y in 0..size {
        for x in 0..size {
            let dx = (x as f32 + 0.5 - half) / half;
            let dy = (y as f32 + 0.5 - half) / half;
            let r = (dx * dx + dy * dy).sqrt();
            let coverage = match shape {
                MaskShape::Soft => 1.0 - smoothstep(0.6, 1.0, r),
                MaskShape::Disc => (r <= 1.0) as u8 as f32,
            };
            out.push((coverage * 255.0).round() as u8);
        }
    }
    out
}

fn smoothstep(lo: f32, hi: f32, x: f32) -> f32 {
    let t = ((x - lo) / (hi - lo)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Mask slot for a handle; `None` when the handle names no generated mask.
pub fn mask_slot(handle: TextureHandle, available: usize) -> Option<usize> {
    let slot = handle.0 as usize;
    (slot < available).then_some(slot)
}

pub struct UniformBlock {
    pub layout: wgpu::BindGroupLayout,
    pub bind_group: wgpu::BindGroup,
    buffer: wgpu::Buffer,
    size: u64,
    masks: Vec<wgpu::TextureView>,
    sampler: wgpu::Sampler,
    /// Handle the bind group was last built for.
    bound: TextureHandle,
}

impl UniformBlock {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, registry: &UniformRegistry) -> Self {
        let size = registry.packed_size() as u64;

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Spirit Uniform Buffer"),
            size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let masks: Vec<wgpu::TextureView> = MASK_SHAPES
            .iter()
            .map(|&shape| create_mask(device, queue, shape))
            .collect();

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Sprite Mask Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Spirit Uniform Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(size),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let bound = current_mask(registry);
        let bind_group = build_bind_group(device, &layout, &buffer, &masks, &sampler, bound);

        Self {
            layout,
            bind_group,
            buffer,
            size,
            masks,
            sampler,
            bound,
        }
    }

    /// Copies the committed registry state into the buffer, rebinding the
    /// mask when its handle changed.
    pub fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, registry: &UniformRegistry) {
        let handle = current_mask(registry);
        if handle != self.bound {
            self.rebind(device, handle);
        }

        let bytes = registry.pack();
        debug_assert_eq!(bytes.len() as u64, self.size);
        queue.write_buffer(&self.buffer, 0, &bytes);
    }

    fn rebind(&mut self, device: &wgpu::Device, handle: TextureHandle) {
        self.bound = handle;
        self.bind_group = build_bind_group(
            device,
            &self.layout,
            &self.buffer,
            &self.masks,
            &self.sampler,
            handle,
        );
    }
}

fn build_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    buffer: &wgpu::Buffer,
    masks: &[wgpu::TextureView],
    sampler: &wgpu::Sampler,
    handle: TextureHandle,
) -> wgpu::BindGroup {
    let slot = mask_slot(handle, masks.len()).unwrap_or_else(|| {
        log::warn!("No sprite mask in slot {}; using the soft disc", handle.0);
        0
    });
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Spirit Uniform Bind Group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&masks[slot]),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

fn current_mask(registry: &UniformRegistry) -> TextureHandle {
    registry
        .textures()
        .find(|(name, _)| *name == "sprite_mask")
        .map(|(_, handle)| handle)
        .unwrap_or(TextureHandle(0))
}

fn create_mask(device: &wgpu::Device, queue: &wgpu::Queue, shape: MaskShape) -> wgpu::TextureView {
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some("Sprite Mask"),
            size: wgpu::Extent3d {
                width: MASK_SIZE,
                height: MASK_SIZE,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        &mask_texels(shape, MASK_SIZE),
    );
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_are_round_and_opaque_in_the_middle() {
        for shape in MASK_SHAPES {
            let texels = mask_texels(shape, MASK_SIZE);
            assert_eq!(texels.len(), (MASK_SIZE * MASK_SIZE) as usize);

            let mid = (MASK_SIZE / 2 * MASK_SIZE + MASK_SIZE / 2) as usize;
            assert_eq!(texels[mid], 255, "{shape:?} center");
            assert_eq!(texels[0], 0, "{shape:?} corner");
        }

        // Feathered rim: the soft disc has partial coverage the hard one lacks.
        let soft = mask_texels(MaskShape::Soft, MASK_SIZE);
        assert!(soft.iter().any(|&t| t > 0 && t < 255));
        let disc = mask_texels(MaskShape::Disc, MASK_SIZE);
        assert!(disc.iter().all(|&t| t == 0 || t == 255));
    }

    #[test]
    fn unknown_handle_has_no_slot() {
        assert_eq!(mask_slot(TextureHandle(1), MASK_SHAPES.len()), Some(1));
        assert_eq!(mask_slot(TextureHandle(7), MASK_SHAPES.len()), None);
    }

    #[test]
    fn registry_default_selects_the_soft_mask() {
        let registry = UniformRegistry::new();
        let handle = current_mask(&registry);
        assert_eq!(mask_slot(handle, MASK_SHAPES.len()), Some(0));
        assert_eq!(MASK_SHAPES[0], MaskShape::Soft);
    }
}
