//! Named uniform registry.
//!
//! The registry is the only path by which host code changes shader-visible
//! state. Every uniform is declared once, in buffer order, and must mirror
//! `struct Uniforms` in `shaders/uniforms.wgsl`. Writes made during a frame
//! go through a [`UniformBatch`] so they land together before the draw.

use glam::{Mat4, Vec2, Vec3};
use std::collections::HashMap;
use thiserror::Error;

/// Opaque reference to a GPU texture slot. Not packed into the uniform buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    Float,
    Vec2,
    Vec3,
    Color,
    Mat4,
    Texture,
}

impl UniformKind {
    /// `(align, size)` in bytes under WGSL uniform address-space rules.
    /// `None` for kinds bound outside the uniform buffer.
    pub fn layout(self) -> Option<(usize, usize)> {
        match self {
            UniformKind::Float => Some((4, 4)),
            UniformKind::Vec2 => Some((8, 8)),
            UniformKind::Vec3 | UniformKind::Color => Some((16, 12)),
            UniformKind::Mat4 => Some((16, 64)),
            UniformKind::Texture => None,
        }
    }

    /// The WGSL type a struct member of this kind must have.
    pub fn wgsl_type(self) -> Option<&'static str> {
        match self {
            UniformKind::Float => Some("f32"),
            UniformKind::Vec2 => Some("vec2<f32>"),
            UniformKind::Vec3 | UniformKind::Color => Some("vec3<f32>"),
            UniformKind::Mat4 => Some("mat4x4<f32>"),
            UniformKind::Texture => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    /// Linear RGB in 0..1.
    Color(Vec3),
    Mat4(Mat4),
    Texture(TextureHandle),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Float(_) => UniformKind::Float,
            UniformValue::Vec2(_) => UniformKind::Vec2,
            UniformValue::Vec3(_) => UniformKind::Vec3,
            UniformValue::Color(_) => UniformKind::Color,
            UniformValue::Mat4(_) => UniformKind::Mat4,
            UniformValue::Texture(_) => UniformKind::Texture,
        }
    }

    /// Parses a startup override such as `3.5`, `0.2,0.4` or `1,0.5,0.2`.
    pub fn parse(kind: UniformKind, text: &str) -> Option<Self> {
        let nums: Option<Vec<f32>> = text
            .split(',')
            .map(|s| s.trim().parse::<f32>().ok())
            .collect();
        let nums = nums?;

        match (kind, nums.as_slice()) {
            (UniformKind::Float, [x]) => Some(UniformValue::Float(*x)),
            (UniformKind::Vec2, [x, y]) => Some(UniformValue::Vec2(Vec2::new(*x, *y))),
            (UniformKind::Vec3, [x, y, z]) => Some(UniformValue::Vec3(Vec3::new(*x, *y, *z))),
            (UniformKind::Color, [r, g, b]) => Some(UniformValue::Color(Vec3::new(*r, *g, *b))),
            (UniformKind::Texture, [slot]) if *slot >= 0.0 && slot.fract() == 0.0 => {
                Some(UniformValue::Texture(TextureHandle(*slot as u32)))
            }
            _ => None,
        }
    }

    fn write_to(&self, out: &mut [u8]) {
        match self {
            UniformValue::Float(v) => out.copy_from_slice(bytemuck::bytes_of(v)),
            UniformValue::Vec2(v) => out.copy_from_slice(bytemuck::cast_slice(&v.to_array())),
            UniformValue::Vec3(v) | UniformValue::Color(v) => {
                out.copy_from_slice(bytemuck::cast_slice(&v.to_array()))
            }
            UniformValue::Mat4(m) => out.copy_from_slice(bytemuck::cast_slice(&m.to_cols_array())),
            UniformValue::Texture(_) => {}
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("uniform '{0}' is not declared")]
    UnknownUniform(String),
    #[error("uniform '{name}' holds {expected:?}, refusing {got:?}")]
    KindMismatch {
        name: String,
        expected: UniformKind,
        got: UniformKind,
    },
    #[error("uniform '{0}' is already declared")]
    AlreadyDeclared(String),
    #[error("cannot read '{text}' as {kind:?} for uniform '{name}'")]
    BadOverride {
        name: String,
        kind: UniformKind,
        text: String,
    },
}

/// Every uniform the shaders may read, in buffer order, with its neutral value.
pub const DECLARATIONS: &[(&str, UniformValue)] = &[
    ("view_proj", UniformValue::Mat4(Mat4::IDENTITY)),
    ("model", UniformValue::Mat4(Mat4::IDENTITY)),
    ("reticle_model", UniformValue::Mat4(Mat4::IDENTITY)),
    ("ambient_color", UniformValue::Color(Vec3::ONE)),
    ("ambient_intensity", UniformValue::Float(1.0)),
    ("viewport", UniformValue::Vec2(Vec2::ONE)),
    ("time", UniformValue::Float(0.0)),
    ("point_size", UniformValue::Float(4.0)),
    ("point_size_min", UniformValue::Float(1.0)),
    ("point_size_max", UniformValue::Float(24.0)),
    ("noise_scale", UniformValue::Float(1.5)),
    ("noise_amplitude", UniformValue::Float(0.015)),
    ("flock_speed", UniformValue::Float(0.6)),
    ("flock_spread", UniformValue::Float(0.12)),
    ("drift_speed", UniformValue::Float(0.4)),
    ("drift_height", UniformValue::Float(0.05)),
    ("glow_intensity", UniformValue::Float(1.2)),
    ("glow_radius", UniformValue::Float(0.6)),
    ("firefly_boost", UniformValue::Float(2.5)),
    ("opacity", UniformValue::Float(0.0)),
    ("reticle_opacity", UniformValue::Float(0.0)),
    ("sprite_mask", UniformValue::Texture(TextureHandle(0))),
];

#[derive(Debug, Clone)]
struct Entry {
    name: &'static str,
    value: UniformValue,
    /// Value restored by `reset_neutral`: the declared default plus startup overrides.
    baseline: UniformValue,
    /// Byte offset inside the packed buffer, if packed.
    offset: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct UniformRegistry {
    entries: Vec<Entry>,
    index: HashMap<&'static str, usize>,
    packed_len: usize,
    commits: u64,
}

impl Default for UniformRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl UniformRegistry {
    /// Registry holding the standard declarations.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        for &(name, value) in DECLARATIONS {
            // DECLARATIONS has unique names; a duplicate is caught by the tests.
            let _ = registry.declare(name, value);
        }
        registry
    }

    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            packed_len: 0,
            commits: 0,
        }
    }

    /// Appends a uniform. Packed members are laid out after all previous ones.
    pub fn declare(&mut self, name: &'static str, value: UniformValue) -> Result<(), RegistryError> {
        if self.index.contains_key(name) {
            return Err(RegistryError::AlreadyDeclared(name.to_string()));
        }

        let offset = value.kind().layout().map(|(align, size)| {
            let at = self.packed_len.next_multiple_of(align);
            self.packed_len = at + size;
            at
        });

        self.index.insert(name, self.entries.len());
        self.entries.push(Entry {
            name,
            value,
            baseline: value,
            offset,
        });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<UniformValue> {
        self.index.get(name).map(|&i| self.entries[i].value)
    }

    /// Scalar accessor; `None` if missing or not a float.
    pub fn float(&self, name: &str) -> Option<f32> {
        match self.get(name)? {
            UniformValue::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn set(&mut self, name: &str, value: UniformValue) -> Result<(), RegistryError> {
        let i = self.slot_for(name, &value)?;
        self.entries[i].value = value;
        Ok(())
    }

    fn slot_for(&self, name: &str, value: &UniformValue) -> Result<usize, RegistryError> {
        let &i = self
            .index
            .get(name)
            .ok_or_else(|| RegistryError::UnknownUniform(name.to_string()))?;

        let expected = self.entries[i].value.kind();
        if expected != value.kind() {
            return Err(RegistryError::KindMismatch {
                name: name.to_string(),
                expected,
                got: value.kind(),
            });
        }
        Ok(i)
    }

    /// Starts collecting the writes of one frame.
    pub fn batch(&mut self) -> UniformBatch<'_> {
        UniformBatch {
            registry: self,
            writes: Vec::new(),
        }
    }

    /// Number of committed batches so far.
    pub fn commits(&self) -> u64 {
        self.commits
    }

    /// Applies `name=value` overrides to both the live values and the baseline.
    /// Called once at startup, before the first frame.
    pub fn apply_overrides(&mut self, overrides: &[(String, String)]) -> Result<(), RegistryError> {
        for (name, text) in overrides {
            let &i = self
                .index
                .get(name.as_str())
                .ok_or_else(|| RegistryError::UnknownUniform(name.clone()))?;

            let kind = self.entries[i].value.kind();
            let value = UniformValue::parse(kind, text).ok_or_else(|| RegistryError::BadOverride {
                name: name.clone(),
                kind,
                text: text.clone(),
            })?;

            let entry = &mut self.entries[i];
            entry.value = value;
            entry.baseline = value;
            log::info!("Uniform override {} = {:?}", name, value);
        }
        Ok(())
    }

    /// Restores every entry to its baseline.
    pub fn reset_neutral(&mut self) {
        for entry in &mut self.entries {
            entry.value = entry.baseline;
        }
    }

    /// Declared names, in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|e| e.name)
    }

    /// Declared `(name, kind)` pairs of the entries that live in the uniform buffer.
    pub fn packed_members(&self) -> impl Iterator<Item = (&'static str, UniformKind)> + '_ {
        self.entries
            .iter()
            .filter(|e| e.offset.is_some())
            .map(|e| (e.name, e.value.kind()))
    }

    /// Texture entries with their current handles, in declaration order.
    pub fn textures(&self) -> impl Iterator<Item = (&'static str, TextureHandle)> + '_ {
        self.entries.iter().filter_map(|e| match e.value {
            UniformValue::Texture(handle) => Some((e.name, handle)),
            _ => None,
        })
    }

    /// Size of the packed buffer, rounded up to the 16-byte struct alignment.
    pub fn packed_size(&self) -> usize {
        self.packed_len.next_multiple_of(16)
    }

    /// Serializes all packed entries for `queue.write_buffer`.
    pub fn pack(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.packed_size()];
        for entry in &self.entries {
            if let (Some(offset), Some((_, size))) = (entry.offset, entry.value.kind().layout()) {
                entry.value.write_to(&mut out[offset..offset + size]);
            }
        }
        out
    }
}

/// Writes gathered during one frame, applied together by [`UniformBatch::commit`].
pub struct UniformBatch<'r> {
    registry: &'r mut UniformRegistry,
    writes: Vec<(&'static str, UniformValue)>,
}

impl UniformBatch<'_> {
    pub fn set(&mut self, name: &'static str, value: UniformValue) -> &mut Self {
        self.writes.push((name, value));
        self
    }

    pub fn float(&mut self, name: &'static str, v: f32) -> &mut Self {
        self.set(name, UniformValue::Float(v))
    }

    pub fn mat4(&mut self, name: &'static str, m: Mat4) -> &mut Self {
        self.set(name, UniformValue::Mat4(m))
    }

    /// Validates every write, then applies all of them. Nothing is applied on error.
    pub fn commit(self) -> Result<(), RegistryError> {
        let mut slots = Vec::with_capacity(self.writes.len());
        for (name, value) in &self.writes {
            slots.push(self.registry.slot_for(name, value)?);
        }

        for (i, (_, value)) in slots.into_iter().zip(self.writes) {
            self.registry.entries[i].value = value;
        }
        self.registry.commits += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declarations_are_unique() {
        let registry = UniformRegistry::new();
        assert_eq!(registry.names().count(), DECLARATIONS.len());
    }

    #[test]
    fn set_checks_kind_only() {
        let mut registry = UniformRegistry::new();

        registry.set("opacity", UniformValue::Float(-3.0)).unwrap();
        assert_eq!(registry.float("opacity"), Some(-3.0));

        let err = registry
            .set("ambient_color", UniformValue::Vec3(Vec3::ZERO))
            .unwrap_err();
        assert!(matches!(err, RegistryError::KindMismatch { .. }));

        assert_eq!(
            registry.set("nope", UniformValue::Float(1.0)),
            Err(RegistryError::UnknownUniform("nope".into()))
        );

        registry
            .set("sprite_mask", UniformValue::Texture(TextureHandle(3)))
            .unwrap();
        assert!(registry
            .set("sprite_mask", UniformValue::Float(3.0))
            .is_err());
        assert_eq!(
            registry.textures().collect::<Vec<_>>(),
            vec![("sprite_mask", TextureHandle(3))]
        );
    }

    #[test]
    fn texture_override_takes_a_whole_slot() {
        let mut registry = UniformRegistry::new();
        registry
            .apply_overrides(&[("sprite_mask".into(), "1".into())])
            .unwrap();
        assert_eq!(
            registry.get("sprite_mask"),
            Some(UniformValue::Texture(TextureHandle(1)))
        );

        for bad in ["-1", "0.5", "1,2"] {
            let err = registry
                .apply_overrides(&[("sprite_mask".into(), bad.into())])
                .unwrap_err();
            assert!(matches!(err, RegistryError::BadOverride { .. }), "{bad}");
        }
    }

    #[test]
    fn failed_batch_applies_nothing() {
        let mut registry = UniformRegistry::new();
        let mut batch = registry.batch();
        batch.float("time", 9.0).float("missing", 1.0);
        assert!(batch.commit().is_err());

        assert_eq!(registry.float("time"), Some(0.0));
        assert_eq!(registry.commits(), 0);
    }

    #[test]
    fn pack_follows_wgsl_alignment() {
        let mut registry = UniformRegistry::new();
        registry.set("time", UniformValue::Float(2.5)).unwrap();
        registry
            .set("ambient_color", UniformValue::Color(Vec3::new(0.1, 0.2, 0.3)))
            .unwrap();

        let bytes = registry.pack();
        assert_eq!(bytes.len() % 16, 0);
        assert_eq!(bytes.len(), registry.packed_size());

        let floats: Vec<f32> = bytemuck::pod_collect_to_vec(&bytes);
        // Three mat4s, then ambient_color at 192 and ambient_intensity right after it.
        assert_eq!(&floats[48..52], &[0.1, 0.2, 0.3, 1.0]);
        // viewport at 208, time at 216.
        assert_eq!(floats[54], 2.5);
    }

    #[test]
    fn overrides_become_baseline() {
        let mut registry = UniformRegistry::new();
        registry
            .apply_overrides(&[
                ("point_size".into(), "6".into()),
                ("ambient_color".into(), "1, 0.9, 0.8".into()),
            ])
            .unwrap();

        registry.set("point_size", UniformValue::Float(1.0)).unwrap();
        registry.reset_neutral();
        assert_eq!(registry.float("point_size"), Some(6.0));

        let err = registry
            .apply_overrides(&[("point_size".into(), "big".into())])
            .unwrap_err();
        assert!(matches!(err, RegistryError::BadOverride { .. }));
    }
}
