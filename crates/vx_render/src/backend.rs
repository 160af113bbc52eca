//! Renderer Backend Abstraction (C5, spec §4.5).
//!
//! A thin, stateful surface implemented per graphics API. This crate
//! never implements a specific API (spec Non-goals) — it defines the
//! trait plus [`NullBackend`], a reference/test implementation that
//! tracks state exactly like a real backend would, issuing no GPU
//! calls at all. `original_source`'s `RendererAPI.h` is the source of
//! the GL-shaped, opaque-handle surface this mirrors.

use std::collections::HashMap;

use slotmap::SlotMap;
use vx_core::{EngineError, Result};

use crate::types::{
    BlendState, BufferHandle, BufferTarget, BufferUsage, ClearFlags, CullState, DepthState,
    FenceHandle, FenceWaitStatus, FramebufferAttachment, FramebufferHandle, IndexType,
    MapAccessFlags, PrimitiveTopology, ShaderHandle, TextureHandle, TextureParam, TextureTarget,
    VertexArrayHandle, VertexAttribComponentType,
};

/// Diagnostic-only tag identifying which concrete backend is active;
/// never branched on for correctness (spec §9: "one narrow backend
/// interface is the only polymorphism point").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Null,
    OpenGl,
    Vulkan,
    Metal,
    Direct3D12,
    WebGpu,
}

/// The API-neutral drawing/state/resource surface (§4.5).
///
/// Not thread-safe: only the render thread may call it, except
/// through [`crate::queue::RenderCommandQueue`]'s immediate path,
/// which takes the queue's execution mutex first.
#[allow(clippy::too_many_arguments)]
pub trait RendererBackend: Send {
    fn name(&self) -> &str;
    fn kind(&self) -> BackendKind;

    fn clear(&mut self, flags: ClearFlags, color: [f32; 4], depth: f32, stencil: i32) -> Result<()>;
    fn set_viewport(&mut self, x: u32, y: u32, width: u32, height: u32) -> Result<()>;
    fn set_scissor(&mut self, x: u32, y: u32, width: u32, height: u32) -> Result<()>;

    fn draw_arrays(&mut self, topology: PrimitiveTopology, first: u32, count: u32, instances: u32) -> Result<()>;
    fn draw_indexed(
        &mut self,
        topology: PrimitiveTopology,
        index_count: u32,
        instances: u32,
        first_index: u32,
        base_vertex: i32,
        base_instance: u32,
    ) -> Result<()>;

    fn gen_buffers(&mut self, count: usize) -> Result<Vec<BufferHandle>>;
    fn delete_buffers(&mut self, handles: &[BufferHandle]) -> Result<()>;
    fn bind_buffer(&mut self, target: BufferTarget, handle: BufferHandle) -> Result<()>;
    fn bind_buffer_base(&mut self, target: BufferTarget, binding: u32, handle: BufferHandle) -> Result<()>;
    fn bind_index_buffer(&mut self, handle: BufferHandle, index_type: IndexType, offset: usize) -> Result<()>;
    fn buffer_data(&mut self, target: BufferTarget, data: &[u8], usage: BufferUsage) -> Result<()>;
    fn buffer_sub_data(&mut self, target: BufferTarget, offset: usize, data: &[u8]) -> Result<()>;
    fn buffer_storage(&mut self, target: BufferTarget, size: usize, data: Option<&[u8]>, flags: MapAccessFlags) -> Result<()>;

    fn map_buffer_range(&mut self, target: BufferTarget, offset: usize, length: usize, access: MapAccessFlags) -> Result<*mut u8>;
    fn unmap_buffer(&mut self, target: BufferTarget) -> Result<()>;

    fn fence_sync(&mut self) -> Result<FenceHandle>;
    fn client_wait_sync(&mut self, fence: FenceHandle, flags: u32, timeout_ns: u64) -> Result<FenceWaitStatus>;
    fn delete_sync(&mut self, fence: FenceHandle) -> Result<()>;

    fn vertex_attrib_pointer(&mut self, location: u32, components: u32, ty: VertexAttribComponentType, normalized: bool, stride: u32, offset: u32) -> Result<()>;
    fn vertex_attrib_ipointer(&mut self, location: u32, components: u32, ty: VertexAttribComponentType, stride: u32, offset: u32) -> Result<()>;
    fn vertex_attrib_divisor(&mut self, location: u32, divisor: u32) -> Result<()>;
    fn enable_vertex_attrib_array(&mut self, location: u32) -> Result<()>;

    fn gen_vertex_arrays(&mut self, count: usize) -> Result<Vec<VertexArrayHandle>>;
    fn delete_vertex_arrays(&mut self, handles: &[VertexArrayHandle]) -> Result<()>;
    fn bind_vertex_array(&mut self, handle: VertexArrayHandle) -> Result<()>;

    fn bind_shader(&mut self, handle: ShaderHandle) -> Result<()>;

    fn gen_textures(&mut self, count: usize) -> Result<Vec<TextureHandle>>;
    fn delete_textures(&mut self, handles: &[TextureHandle]) -> Result<()>;
    fn bind_texture_target(&mut self, target: TextureTarget, handle: TextureHandle) -> Result<()>;
    fn bind_texture(&mut self, slot: u32, handle: TextureHandle) -> Result<()>;
    fn tex_image_2d(&mut self, target: TextureTarget, level: u32, width: u32, height: u32, data: Option<&[u8]>) -> Result<()>;
    fn tex_parameter_i(&mut self, target: TextureTarget, param: TextureParam, value: i32) -> Result<()>;
    fn generate_mipmap(&mut self, target: TextureTarget) -> Result<()>;

    fn gen_framebuffers(&mut self, count: usize) -> Result<Vec<FramebufferHandle>>;
    fn delete_framebuffers(&mut self, handles: &[FramebufferHandle]) -> Result<()>;
    fn bind_framebuffer(&mut self, handle: Option<FramebufferHandle>) -> Result<()>;
    fn framebuffer_texture_2d(&mut self, attachment: FramebufferAttachment, texture: TextureHandle, level: u32) -> Result<()>;
    fn check_framebuffer_status(&mut self) -> Result<()>;
    fn set_draw_buffers(&mut self, attachments: &[FramebufferAttachment]) -> Result<()>;

    fn set_depth_state(&mut self, state: DepthState) -> Result<()>;
    fn set_blend_state(&mut self, state: BlendState) -> Result<()>;
    fn set_cull_state(&mut self, state: CullState) -> Result<()>;

    fn push_debug_group(&mut self, label: &str) -> Result<()>;
    fn pop_debug_group(&mut self) -> Result<()>;
}

/// Tracked shadow of bound program/textures/state, used by
/// [`NullBackend`] to elide redundant calls — the "Renderer State
/// Cache" of spec §3.
#[derive(Default)]
struct StateCache {
    bound_shader: Option<ShaderHandle>,
    bound_textures: HashMap<u32, TextureHandle>,
    bound_index_buffer: Option<(BufferHandle, IndexType, usize)>,
    bound_vertex_array: Option<VertexArrayHandle>,
    bound_framebuffer: Option<FramebufferHandle>,
    depth: DepthState,
    blend: BlendState,
    cull: CullState,
}

struct BufferResource {
    data: Vec<u8>,
    mapped: bool,
}

/// Reference [`RendererBackend`] that issues no real GPU calls.
///
/// Tracks resources in `slotmap`s so handles behave like real opaque
/// API handles (stale handles fail with [`EngineError::InvalidParameter`]
/// instead of aliasing), and counts elided calls per op so tests can
/// assert the "at most one underlying GPU call" round-trip laws of
/// spec §8.
pub struct NullBackend {
    buffers: SlotMap<BufferHandle, BufferResource>,
    vertex_arrays: SlotMap<VertexArrayHandle, ()>,
    textures: SlotMap<TextureHandle, ()>,
    framebuffers: SlotMap<FramebufferHandle, ()>,
    shaders: SlotMap<ShaderHandle, ()>,
    fences: SlotMap<FenceHandle, bool>,
    bound_buffer_targets: HashMap<BufferTarget, BufferHandle>,
    cache: StateCache,
    pub call_counts: HashMap<&'static str, u32>,
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl NullBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffers: SlotMap::with_key(),
            vertex_arrays: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            framebuffers: SlotMap::with_key(),
            shaders: SlotMap::with_key(),
            fences: SlotMap::with_key(),
            bound_buffer_targets: HashMap::new(),
            cache: StateCache::default(),
            call_counts: HashMap::new(),
        }
    }

    fn count(&mut self, op: &'static str) {
        *self.call_counts.entry(op).or_insert(0) += 1;
    }

    #[must_use]
    pub fn calls(&self, op: &str) -> u32 {
        self.call_counts.get(op).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn depth_state(&self) -> DepthState {
        self.cache.depth
    }

    #[must_use]
    pub fn blend_state(&self) -> BlendState {
        self.cache.blend
    }

    #[must_use]
    pub fn cull_state(&self) -> CullState {
        self.cache.cull
    }

    /// Allocates a shader handle directly, bypassing compilation (which
    /// is out of this crate's scope — see spec Non-goals on shader
    /// languages). Exists so tests and the reference backend's callers
    /// can obtain a valid handle for `bind_shader`.
    pub fn debug_alloc_shader(&mut self) -> ShaderHandle {
        self.shaders.insert(())
    }

    fn resolve_buffer(&self, target: BufferTarget) -> Result<BufferHandle> {
        self.bound_buffer_targets
            .get(&target)
            .copied()
            .ok_or_else(|| EngineError::InvalidState(format!("no buffer bound to target {target:?}")))
    }
}

impl RendererBackend for NullBackend {
    fn name(&self) -> &str {
        "null"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Null
    }

    fn clear(&mut self, _flags: ClearFlags, _color: [f32; 4], _depth: f32, _stencil: i32) -> Result<()> {
        self.count("clear");
        Ok(())
    }

    fn set_viewport(&mut self, _x: u32, _y: u32, _width: u32, _height: u32) -> Result<()> {
        self.count("set_viewport");
        Ok(())
    }

    fn set_scissor(&mut self, _x: u32, _y: u32, _width: u32, _height: u32) -> Result<()> {
        self.count("set_scissor");
        Ok(())
    }

    fn draw_arrays(&mut self, _topology: PrimitiveTopology, _first: u32, _count: u32, _instances: u32) -> Result<()> {
        self.count("draw_arrays");
        Ok(())
    }

    fn draw_indexed(
        &mut self,
        _topology: PrimitiveTopology,
        _index_count: u32,
        _instances: u32,
        _first_index: u32,
        _base_vertex: i32,
        _base_instance: u32,
    ) -> Result<()> {
        if self.cache.bound_index_buffer.is_none() {
            return Err(EngineError::InvalidState("draw_indexed with no bound index buffer".into()));
        }
        self.count("draw_indexed");
        Ok(())
    }

    fn gen_buffers(&mut self, count: usize) -> Result<Vec<BufferHandle>> {
        Ok((0..count).map(|_| self.buffers.insert(BufferResource { data: Vec::new(), mapped: false })).collect())
    }

    fn delete_buffers(&mut self, handles: &[BufferHandle]) -> Result<()> {
        for handle in handles {
            self.buffers.remove(*handle);
            self.bound_buffer_targets.retain(|_, bound| bound != handle);
        }
        Ok(())
    }

    fn bind_buffer(&mut self, target: BufferTarget, handle: BufferHandle) -> Result<()> {
        if !self.buffers.contains_key(handle) {
            return Err(EngineError::InvalidParameter("bind_buffer: stale buffer handle".into()));
        }
        self.bound_buffer_targets.insert(target, handle);
        self.count("bind_buffer");
        Ok(())
    }

    fn bind_buffer_base(&mut self, target: BufferTarget, _binding: u32, handle: BufferHandle) -> Result<()> {
        self.bind_buffer(target, handle)
    }

    fn bind_index_buffer(&mut self, handle: BufferHandle, index_type: IndexType, offset: usize) -> Result<()> {
        if !self.buffers.contains_key(handle) {
            return Err(EngineError::InvalidParameter("bind_index_buffer: stale buffer handle".into()));
        }
        self.cache.bound_index_buffer = Some((handle, index_type, offset));
        self.count("bind_index_buffer");
        Ok(())
    }

    fn buffer_data(&mut self, target: BufferTarget, data: &[u8], _usage: BufferUsage) -> Result<()> {
        let handle = self.resolve_buffer(target)?;
        self.buffers[handle].data = data.to_vec();
        self.count("buffer_data");
        Ok(())
    }

    fn buffer_sub_data(&mut self, target: BufferTarget, offset: usize, data: &[u8]) -> Result<()> {
        let handle = self.resolve_buffer(target)?;
        let buffer = &mut self.buffers[handle];
        if offset + data.len() > buffer.data.len() {
            buffer.data.resize(offset + data.len(), 0);
        }
        buffer.data[offset..offset + data.len()].copy_from_slice(data);
        self.count("buffer_sub_data");
        Ok(())
    }

    fn buffer_storage(&mut self, target: BufferTarget, size: usize, data: Option<&[u8]>, _flags: MapAccessFlags) -> Result<()> {
        let handle = self.resolve_buffer(target)?;
        let mut bytes = vec![0u8; size];
        if let Some(data) = data {
            bytes[..data.len().min(size)].copy_from_slice(&data[..data.len().min(size)]);
        }
        self.buffers[handle].data = bytes;
        self.count("buffer_storage");
        Ok(())
    }

    fn map_buffer_range(&mut self, target: BufferTarget, offset: usize, length: usize, _access: MapAccessFlags) -> Result<*mut u8> {
        let handle = self.resolve_buffer(target)?;
        let buffer = &mut self.buffers[handle];
        if offset + length > buffer.data.len() {
            buffer.data.resize(offset + length, 0);
        }
        buffer.mapped = true;
        self.count("map_buffer_range");
        Ok(buffer.data[offset..].as_mut_ptr())
    }

    fn unmap_buffer(&mut self, target: BufferTarget) -> Result<()> {
        let handle = self.resolve_buffer(target)?;
        self.buffers[handle].mapped = false;
        self.count("unmap_buffer");
        Ok(())
    }

    fn fence_sync(&mut self) -> Result<FenceHandle> {
        self.count("fence_sync");
        Ok(self.fences.insert(true))
    }

    fn client_wait_sync(&mut self, fence: FenceHandle, _flags: u32, _timeout_ns: u64) -> Result<FenceWaitStatus> {
        if !self.fences.contains_key(fence) {
            return Err(EngineError::InvalidParameter("client_wait_sync: stale fence handle".into()));
        }
        self.count("client_wait_sync");
        Ok(FenceWaitStatus::AlreadySignaled)
    }

    fn delete_sync(&mut self, fence: FenceHandle) -> Result<()> {
        self.fences.remove(fence);
        Ok(())
    }

    fn vertex_attrib_pointer(&mut self, _location: u32, _components: u32, _ty: VertexAttribComponentType, _normalized: bool, _stride: u32, _offset: u32) -> Result<()> {
        self.count("vertex_attrib_pointer");
        Ok(())
    }

    fn vertex_attrib_ipointer(&mut self, _location: u32, _components: u32, _ty: VertexAttribComponentType, _stride: u32, _offset: u32) -> Result<()> {
        self.count("vertex_attrib_ipointer");
        Ok(())
    }

    fn vertex_attrib_divisor(&mut self, _location: u32, _divisor: u32) -> Result<()> {
        self.count("vertex_attrib_divisor");
        Ok(())
    }

    fn enable_vertex_attrib_array(&mut self, _location: u32) -> Result<()> {
        self.count("enable_vertex_attrib_array");
        Ok(())
    }

    fn gen_vertex_arrays(&mut self, count: usize) -> Result<Vec<VertexArrayHandle>> {
        Ok((0..count).map(|_| self.vertex_arrays.insert(())).collect())
    }

    fn delete_vertex_arrays(&mut self, handles: &[VertexArrayHandle]) -> Result<()> {
        for handle in handles {
            self.vertex_arrays.remove(*handle);
        }
        Ok(())
    }

    fn bind_vertex_array(&mut self, handle: VertexArrayHandle) -> Result<()> {
        if !self.vertex_arrays.contains_key(handle) {
            return Err(EngineError::InvalidParameter("bind_vertex_array: stale handle".into()));
        }
        if self.cache.bound_vertex_array == Some(handle) {
            return Ok(());
        }
        self.cache.bound_vertex_array = Some(handle);
        self.count("bind_vertex_array");
        Ok(())
    }

    fn bind_shader(&mut self, handle: ShaderHandle) -> Result<()> {
        if !self.shaders.contains_key(handle) {
            return Err(EngineError::InvalidParameter("bind_shader: stale handle".into()));
        }
        if self.cache.bound_shader == Some(handle) {
            return Ok(());
        }
        self.cache.bound_shader = Some(handle);
        self.count("bind_shader");
        Ok(())
    }

    fn gen_textures(&mut self, count: usize) -> Result<Vec<TextureHandle>> {
        Ok((0..count).map(|_| self.textures.insert(())).collect())
    }

    fn delete_textures(&mut self, handles: &[TextureHandle]) -> Result<()> {
        for handle in handles {
            self.textures.remove(*handle);
            self.cache.bound_textures.retain(|_, bound| bound != handle);
        }
        Ok(())
    }

    fn bind_texture_target(&mut self, _target: TextureTarget, handle: TextureHandle) -> Result<()> {
        if !self.textures.contains_key(handle) {
            return Err(EngineError::InvalidParameter("bind_texture_target: stale handle".into()));
        }
        self.count("bind_texture_target");
        Ok(())
    }

    fn bind_texture(&mut self, slot: u32, handle: TextureHandle) -> Result<()> {
        if !self.textures.contains_key(handle) {
            return Err(EngineError::InvalidParameter("bind_texture: stale handle".into()));
        }
        if self.cache.bound_textures.get(&slot) == Some(&handle) {
            return Ok(());
        }
        self.cache.bound_textures.insert(slot, handle);
        self.count("bind_texture");
        Ok(())
    }

    fn tex_image_2d(&mut self, _target: TextureTarget, _level: u32, _width: u32, _height: u32, _data: Option<&[u8]>) -> Result<()> {
        self.count("tex_image_2d");
        Ok(())
    }

    fn tex_parameter_i(&mut self, _target: TextureTarget, _param: TextureParam, _value: i32) -> Result<()> {
        self.count("tex_parameter_i");
        Ok(())
    }

    fn generate_mipmap(&mut self, _target: TextureTarget) -> Result<()> {
        self.count("generate_mipmap");
        Ok(())
    }

    fn gen_framebuffers(&mut self, count: usize) -> Result<Vec<FramebufferHandle>> {
        Ok((0..count).map(|_| self.framebuffers.insert(())).collect())
    }

    fn delete_framebuffers(&mut self, handles: &[FramebufferHandle]) -> Result<()> {
        for handle in handles {
            self.framebuffers.remove(*handle);
        }
        Ok(())
    }

    fn bind_framebuffer(&mut self, handle: Option<FramebufferHandle>) -> Result<()> {
        if let Some(handle) = handle {
            if !self.framebuffers.contains_key(handle) {
                return Err(EngineError::InvalidParameter("bind_framebuffer: stale handle".into()));
            }
        }
        if self.cache.bound_framebuffer == handle {
            return Ok(());
        }
        self.cache.bound_framebuffer = handle;
        self.count("bind_framebuffer");
        Ok(())
    }

    fn framebuffer_texture_2d(&mut self, _attachment: FramebufferAttachment, texture: TextureHandle, _level: u32) -> Result<()> {
        if !self.textures.contains_key(texture) {
            return Err(EngineError::InvalidParameter("framebuffer_texture_2d: stale texture handle".into()));
        }
        self.count("framebuffer_texture_2d");
        Ok(())
    }

    fn check_framebuffer_status(&mut self) -> Result<()> {
        self.count("check_framebuffer_status");
        Ok(())
    }

    fn set_draw_buffers(&mut self, _attachments: &[FramebufferAttachment]) -> Result<()> {
        self.count("set_draw_buffers");
        Ok(())
    }

    fn set_depth_state(&mut self, state: DepthState) -> Result<()> {
        if self.cache.depth == state {
            return Ok(());
        }
        self.cache.depth = state;
        self.count("set_depth_state");
        Ok(())
    }

    fn set_blend_state(&mut self, state: BlendState) -> Result<()> {
        if self.cache.blend == state {
            return Ok(());
        }
        self.cache.blend = state;
        self.count("set_blend_state");
        Ok(())
    }

    fn set_cull_state(&mut self, state: CullState) -> Result<()> {
        if self.cache.cull == state {
            return Ok(());
        }
        self.cache.cull = state;
        self.count("set_cull_state");
        Ok(())
    }

    fn push_debug_group(&mut self, _label: &str) -> Result<()> {
        self.count("push_debug_group");
        Ok(())
    }

    fn pop_debug_group(&mut self) -> Result<()> {
        self.count("pop_debug_group");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BufferTarget;

    #[test]
    fn redundant_bind_shader_issues_one_call() {
        let mut backend = NullBackend::new();
        let shader = backend.shaders.insert(());
        backend.bind_shader(shader).unwrap();
        backend.bind_shader(shader).unwrap();
        assert_eq!(backend.calls("bind_shader"), 1);
    }

    #[test]
    fn redundant_depth_state_issues_one_call() {
        let mut backend = NullBackend::new();
        let state = DepthState { test_enabled: false, write_enabled: false, compare: crate::types::DepthCompareFunc::Less };
        backend.set_depth_state(state).unwrap();
        backend.set_depth_state(state).unwrap();
        assert_eq!(backend.calls("set_depth_state"), 1);
    }

    #[test]
    fn stale_buffer_handle_is_rejected() {
        let mut backend = NullBackend::new();
        let handles = backend.gen_buffers(1).unwrap();
        backend.delete_buffers(&handles).unwrap();
        assert!(backend.bind_buffer(BufferTarget::Vertex, handles[0]).is_err());
    }
}
