//! Shader/Uniform Adapter (C9, spec §4.9).
//!
//! A shader handle plus reflection metadata (name→location for
//! uniforms, name→binding for samplers and uniform buffer blocks).
//! Narrower than `original_source`'s SPIR-V-Cross-driven
//! `ShaderReflection` (that extracts reflection from compiled
//! bytecode — out of scope per the Non-goal on shader languages);
//! here reflection is supplied by the caller and this module is only
//! the name-validated binding surface.

use rustc_hash::FxHashMap;

use vx_core::Result;

use crate::backend::RendererBackend;
use crate::types::{BufferHandle, BufferTarget, ShaderHandle, TextureHandle};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Int(i32),
    Mat4([f32; 16]),
}

/// Reflection metadata for one compiled program.
#[derive(Debug, Clone, Default)]
pub struct ShaderReflectionData {
    pub uniform_locations: FxHashMap<String, u32>,
    pub sampler_bindings: FxHashMap<String, u32>,
    pub uniform_buffer_bindings: FxHashMap<String, u32>,
}

/// A compiled program plus its reflection data (spec §4.9).
pub struct ShaderProgram {
    handle: ShaderHandle,
    reflection: ShaderReflectionData,
    staged_uniforms: FxHashMap<String, UniformValue>,
}

impl ShaderProgram {
    #[must_use]
    pub fn new(handle: ShaderHandle, reflection: ShaderReflectionData) -> Self {
        Self { handle, reflection, staged_uniforms: FxHashMap::default() }
    }

    #[must_use]
    pub fn handle(&self) -> ShaderHandle {
        self.handle
    }

    #[must_use]
    pub fn reflection(&self) -> &ShaderReflectionData {
        &self.reflection
    }

    pub fn bind(&self, backend: &mut dyn RendererBackend) -> Result<()> {
        backend.bind_shader(self.handle)
    }

    /// Stages `value` for `name`. Warns (does not error) if `name`
    /// isn't present in reflection — spec §4.9's explicit leniency.
    pub fn set_uniform(&mut self, name: &str, value: UniformValue) {
        if !self.reflection.uniform_locations.contains_key(name) {
            log::warn!("shader: set_uniform to unreflected name {name:?}");
        }
        self.staged_uniforms.insert(name.to_string(), value);
    }

    #[must_use]
    pub fn staged_uniform(&self, name: &str) -> Option<&UniformValue> {
        self.staged_uniforms.get(name)
    }

    pub fn clear_staged_uniforms(&mut self) {
        self.staged_uniforms.clear();
    }

    pub fn set_texture(&self, backend: &mut dyn RendererBackend, name: &str, texture: TextureHandle, slot: u32) -> Result<()> {
        if !self.reflection.sampler_bindings.contains_key(name) {
            log::warn!("shader: set_texture to unreflected sampler {name:?}");
        }
        backend.bind_texture(slot, texture)
    }

    pub fn set_uniform_buffer(&self, backend: &mut dyn RendererBackend, name: &str, buffer: BufferHandle, binding: u32) -> Result<()> {
        if !self.reflection.uniform_buffer_bindings.contains_key(name) {
            log::warn!("shader: set_uniform_buffer to unreflected block {name:?}");
        }
        backend.bind_buffer_base(BufferTarget::Uniform, binding, buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;
    use crate::types::BufferTarget;
    use slotmap::SlotMap;

    fn program() -> ShaderProgram {
        let mut shaders: SlotMap<ShaderHandle, ()> = SlotMap::with_key();
        let handle = shaders.insert(());
        let mut reflection = ShaderReflectionData::default();
        reflection.uniform_locations.insert("u_camera".to_string(), 0);
        reflection.sampler_bindings.insert("u_tex".to_string(), 0);
        ShaderProgram::new(handle, reflection)
    }

    #[test]
    fn unknown_uniform_name_only_warns() {
        let mut shader = program();
        shader.set_uniform("u_unknown", UniformValue::Float(1.0));
        assert!(shader.staged_uniform("u_unknown").is_some());
    }

    #[test]
    fn known_uniform_is_staged() {
        let mut shader = program();
        shader.set_uniform("u_camera", UniformValue::Mat4([0.0; 16]));
        assert_eq!(shader.staged_uniform("u_camera"), Some(&UniformValue::Mat4([0.0; 16])));
    }

    #[test]
    fn set_uniform_buffer_binds_at_the_requested_point() {
        let mut backend = NullBackend::new();
        let shader = program();
        let buffers = backend.gen_buffers(1).unwrap();
        backend.bind_buffer(BufferTarget::Uniform, buffers[0]).unwrap();
        shader.set_uniform_buffer(&mut backend, "u_block", buffers[0], 2).unwrap();
    }
}
