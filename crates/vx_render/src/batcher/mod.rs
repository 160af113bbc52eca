//! 2D Instanced Batcher (C8, spec §4.8).
//!
//! Grounded on `original_source`'s `Renderer2D.h`: a ring of
//! persistently-mapped instance-data chunks, one per frame in flight,
//! fenced so the CPU never overwrites a chunk the GPU hasn't finished
//! reading. Quads accumulate into the active chunk and flush either
//! when it fills, when the texture-slot table runs out of room, or at
//! `end_scene`.

mod rotation_cache;

use bytemuck::{Pod, Zeroable};
use glam::Vec2;
use rustc_hash::FxHashMap;
use vx_core::{EngineError, Result};

use crate::backend::RendererBackend;
use crate::shader::{ShaderProgram, UniformValue};
use crate::types::{
    BufferHandle, BufferTarget, FenceWaitStatus, MapAccessFlags, PrimitiveTopology, TextureHandle,
    VertexAttribComponentType,
};

/// Default view-projection matrix before `set_camera` is ever called:
/// the identity, so vertices pass through unmodified.
const IDENTITY_MAT4: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

pub use rotation_cache::RotationCache;

/// One instance's worth of per-quad data uploaded to the GPU.
///
/// Field layout follows `original_source`'s `QuadInstance`: center and
/// half-extent in world units, a packed RGBA8 tint, a texture-array
/// slot index, a precomputed `(sin, cos)` for the Z rotation, and a
/// depth/sort key. All fields are 4-byte aligned so the natural,
/// unpadded size is exactly 36 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct InstanceRecord {
    pub center: Vec2,
    pub half_size: Vec2,
    pub color_rgba8: u32,
    pub tex_index: u32,
    pub rot_sin_cos: Vec2,
    pub z: f32,
}

const RECORD_SIZE: usize = std::mem::size_of::<InstanceRecord>();

/// Parameters for one `draw_quad` call.
#[derive(Debug, Clone, Copy)]
pub struct QuadParams {
    pub center: Vec2,
    pub half_size: Vec2,
    pub color: [f32; 4],
    pub texture: TextureHandle,
    /// Euler rotation in radians; only the Z component feeds the
    /// instance record, but all three key the rotation cache.
    pub rotation_euler: [f32; 3],
    pub depth: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct BatcherConfig {
    /// Number of ring chunks (>= 2 so the CPU can write one while the
    /// GPU reads another).
    pub frames_in_flight: usize,
    pub max_quads_per_chunk: usize,
    /// Total sampler slots available for the reserved white texture
    /// plus user textures combined.
    pub max_texture_slots: usize,
    pub pixel_snap: bool,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self { frames_in_flight: 3, max_quads_per_chunk: 10_000, max_texture_slots: 32, pixel_snap: false }
    }
}

fn pack_rgba8(color: [f32; 4]) -> u32 {
    let channel = |value: f32| -> u32 { (value * 255.0).round().clamp(0.0, 255.0) as u32 };
    channel(color[0]) | (channel(color[1]) << 8) | (channel(color[2]) << 16) | (channel(color[3]) << 24)
}

/// Ring-buffered, persistently-mapped instanced quad batcher.
pub struct Batcher {
    config: BatcherConfig,
    vertex_buffer: BufferHandle,
    mapped_ptr: *mut u8,
    chunk_fences: Vec<Option<crate::types::FenceHandle>>,
    active_chunk: usize,
    write_offset: usize,
    chunk_base: usize,
    texture_slots: FxHashMap<TextureHandle, u32>,
    next_free_slot: u32,
    white_texture: TextureHandle,
    rotation_cache: RotationCache,
    frame_number: u64,
    scene_active: bool,
    /// How many of this chunk's written records have already been
    /// covered by a flush this scene.
    flushed_up_to: usize,
    total_draw_calls_this_scene: u32,
    view_projection: [f32; 16],
    viewport_size: Vec2,
}

// SAFETY: `mapped_ptr` points into a buffer this `Batcher` owns for its
// whole lifetime (backed by the same `Send` backend's storage); no
// other thread touches it concurrently since only the render thread
// drives the batcher.
unsafe impl Send for Batcher {}

impl Batcher {
    /// Allocates the ring buffer (persistently mapped) and the
    /// reserved 1x1 white texture.
    pub fn new(backend: &mut dyn RendererBackend, config: BatcherConfig) -> Result<Self> {
        let frames_in_flight = config.frames_in_flight.max(2);
        let config = BatcherConfig { frames_in_flight, ..config };
        let chunk_bytes = config.max_quads_per_chunk * RECORD_SIZE;
        let total_bytes = chunk_bytes * frames_in_flight;

        let vertex_buffer = backend.gen_buffers(1)?[0];
        backend.bind_buffer(BufferTarget::Vertex, vertex_buffer)?;
        let persistent = MapAccessFlags::WRITE | MapAccessFlags::PERSISTENT | MapAccessFlags::COHERENT;
        backend.buffer_storage(BufferTarget::Vertex, total_bytes, None, persistent)?;
        let mapped_ptr = backend.map_buffer_range(BufferTarget::Vertex, 0, total_bytes, persistent)?;

        let white_texture = backend.gen_textures(1)?[0];

        let mut texture_slots = FxHashMap::default();
        texture_slots.insert(white_texture, 0);

        Ok(Self {
            config,
            vertex_buffer,
            mapped_ptr,
            chunk_fences: vec![None; frames_in_flight],
            active_chunk: frames_in_flight - 1,
            write_offset: 0,
            chunk_base: 0,
            texture_slots,
            next_free_slot: 1,
            white_texture,
            rotation_cache: RotationCache::new(32),
            frame_number: 0,
            scene_active: false,
            flushed_up_to: 0,
            total_draw_calls_this_scene: 0,
            view_projection: IDENTITY_MAT4,
            viewport_size: Vec2::ZERO,
        })
    }

    /// Sets the view-projection matrix uploaded as `u_ViewProjection`
    /// on every flush until the next call.
    pub fn set_camera(&mut self, view_projection: [f32; 16]) {
        self.view_projection = view_projection;
    }

    /// Sets the viewport size (in pixels) uploaded as `u_ViewportSize`,
    /// used by the shader's pixel-snap correction.
    pub fn set_viewport_size(&mut self, size: Vec2) {
        self.viewport_size = size;
    }

    #[must_use]
    pub fn white_texture(&self) -> TextureHandle {
        self.white_texture
    }

    #[must_use]
    pub fn is_scene_active(&self) -> bool {
        self.scene_active
    }

    #[must_use]
    pub fn rotation_cache_len(&self) -> usize {
        self.rotation_cache.len()
    }

    #[must_use]
    pub fn draw_calls_this_scene(&self) -> u32 {
        self.total_draw_calls_this_scene
    }

    /// Advances to the next ring chunk, waiting on its fence if the GPU
    /// hasn't finished consuming it yet, and rebinds the vertex
    /// attribute pointers at its base offset. Used both once per
    /// `begin_scene` and mid-scene when a chunk fills up, matching
    /// `original_source`'s `StartNewBatch` rotating to the next frame
    /// chunk when `FrameInstanceOffset >= MaxQuads`.
    fn advance_to_next_chunk(&mut self, backend: &mut dyn RendererBackend) -> Result<()> {
        self.active_chunk = (self.active_chunk + 1) % self.config.frames_in_flight;

        if let Some(fence) = self.chunk_fences[self.active_chunk].take() {
            let status = backend.client_wait_sync(fence, 0, u64::MAX)?;
            if matches!(status, FenceWaitStatus::WaitFailed) {
                log::error!("batcher: client_wait_sync failed for chunk {}", self.active_chunk);
            }
            backend.delete_sync(fence)?;
        }

        self.chunk_base = self.active_chunk * self.config.max_quads_per_chunk;
        self.write_offset = self.chunk_base;
        self.flushed_up_to = 0;
        self.rebind_vertex_attributes(backend, 0)
    }

    fn reset_texture_slots(&mut self) {
        self.texture_slots.clear();
        self.texture_slots.insert(self.white_texture, 0);
        self.next_free_slot = 1;
    }

    pub fn begin_scene(&mut self, backend: &mut dyn RendererBackend) -> Result<()> {
        if self.scene_active {
            return Err(EngineError::InvalidState("begin_scene called while a scene is already active".into()));
        }
        self.advance_to_next_chunk(backend)?;
        self.reset_texture_slots();
        self.total_draw_calls_this_scene = 0;
        self.scene_active = true;
        Ok(())
    }

    /// Rebinds the per-instance vertex attributes so they start at
    /// `record_offset` records into the active chunk. The backend
    /// trait has no `base_instance` for `draw_arrays`, so a mid-scene
    /// flush re-points the attribute pointers instead, matching how a
    /// GL-shaped backend would read `gl_InstanceID` relative to them.
    fn rebind_vertex_attributes(&self, backend: &mut dyn RendererBackend, record_offset: usize) -> Result<()> {
        backend.bind_buffer(BufferTarget::Vertex, self.vertex_buffer)?;
        let base_offset = ((self.chunk_base + record_offset) * RECORD_SIZE) as u32;
        let stride = RECORD_SIZE as u32;

        let field = |offset: usize| base_offset + offset as u32;
        backend.vertex_attrib_pointer(2, 2, VertexAttribComponentType::F32, false, stride, field(0))?;
        backend.vertex_attrib_pointer(3, 2, VertexAttribComponentType::F32, false, stride, field(8))?;
        backend.vertex_attrib_ipointer(4, 1, VertexAttribComponentType::U32, stride, field(16))?;
        backend.vertex_attrib_ipointer(5, 1, VertexAttribComponentType::U32, stride, field(20))?;
        backend.vertex_attrib_pointer(6, 2, VertexAttribComponentType::F32, false, stride, field(24))?;
        backend.vertex_attrib_pointer(7, 1, VertexAttribComponentType::F32, false, stride, field(32))?;
        for location in 2..=7 {
            backend.enable_vertex_attrib_array(location)?;
            backend.vertex_attrib_divisor(location, 1)?;
        }
        Ok(())
    }

    fn user_slots_used(&self) -> usize {
        self.texture_slots.len().saturating_sub(1)
    }

    fn resolve_texture_slot(&mut self, backend: &mut dyn RendererBackend, shader: &mut ShaderProgram, texture: TextureHandle) -> Result<u32> {
        if let Some(&slot) = self.texture_slots.get(&texture) {
            return Ok(slot);
        }
        if self.user_slots_used() >= self.config.max_texture_slots.saturating_sub(1) {
            self.flush(backend, shader)?;
            self.reset_texture_slots();
        }
        let slot = self.next_free_slot;
        self.next_free_slot += 1;
        self.texture_slots.insert(texture, slot);
        Ok(slot)
    }

    /// Writes one quad into the active chunk's mapped region, flushing
    /// and rotating to the next ring chunk first if this one is full,
    /// or flushing and resetting the slot table if the texture-slot
    /// table is. Never fails on capacity alone — only `n / MaxQuads`
    /// additional draws and, once every ring chunk has been used, a
    /// wait on the GPU to catch up.
    pub fn draw_quad(&mut self, backend: &mut dyn RendererBackend, shader: &mut ShaderProgram, quad: QuadParams) -> Result<()> {
        if !self.scene_active {
            return Err(EngineError::InvalidState("draw_quad called outside begin_scene/end_scene".into()));
        }

        if self.write_offset - self.chunk_base >= self.config.max_quads_per_chunk {
            self.flush(backend, shader)?;
            self.advance_to_next_chunk(backend)?;
            self.reset_texture_slots();
        }

        let slot = self.resolve_texture_slot(backend, shader, quad.texture)?;

        let rotation_euler = (quad.rotation_euler[0], quad.rotation_euler[1], quad.rotation_euler[2]);
        let (sin, cos) = self.rotation_cache.get_or_insert(rotation_euler, self.frame_number);

        let record = InstanceRecord {
            center: quad.center,
            half_size: quad.half_size,
            color_rgba8: pack_rgba8(quad.color),
            tex_index: slot,
            rot_sin_cos: Vec2::new(sin, cos),
            z: quad.depth,
        };

        // SAFETY: `write_offset` stays within the mapped region's
        // record capacity (checked above); the pointer is valid for
        // the batcher's whole lifetime.
        unsafe {
            let dst = self.mapped_ptr.add(self.write_offset * RECORD_SIZE).cast::<InstanceRecord>();
            dst.write_unaligned(record);
        }

        self.write_offset += 1;
        Ok(())
    }

    fn pending_instance_count(&self) -> usize {
        (self.write_offset - self.chunk_base) - self.flushed_up_to
    }

    /// Issues one instanced draw for every quad written since the last
    /// flush, staging the camera/viewport/pixel-snap uniforms and
    /// binding the occupied texture slots first, then records a fence
    /// for the active chunk (replacing any prior one, so flushing
    /// several times per scene never leaks fence handles). No-op if
    /// nothing is pending.
    pub fn flush(&mut self, backend: &mut dyn RendererBackend, shader: &mut ShaderProgram) -> Result<()> {
        let pending = self.pending_instance_count();
        if pending == 0 {
            return Ok(());
        }

        shader.set_uniform("u_ViewProjection", UniformValue::Mat4(self.view_projection));
        shader.set_uniform("u_ViewportSize", UniformValue::Vec2([self.viewport_size.x, self.viewport_size.y]));
        shader.set_uniform("u_PixelSnap", UniformValue::Int(self.config.pixel_snap as i32));

        shader.bind(backend)?;
        for (&texture, &slot) in &self.texture_slots {
            backend.bind_texture(slot, texture)?;
        }
        self.rebind_vertex_attributes(backend, self.flushed_up_to)?;

        backend.draw_arrays(PrimitiveTopology::TriangleStrip, 0, 4, pending as u32)?;
        self.flushed_up_to += pending;
        self.total_draw_calls_this_scene += 1;

        if let Some(old_fence) = self.chunk_fences[self.active_chunk].take() {
            backend.delete_sync(old_fence)?;
        }
        self.chunk_fences[self.active_chunk] = Some(backend.fence_sync()?);
        Ok(())
    }

    /// Flushes any remaining quads, recording a fence for the active
    /// chunk. If nothing was drawn this scene, `flush` is a no-op and
    /// no fence is recorded.
    pub fn end_scene(&mut self, backend: &mut dyn RendererBackend, shader: &mut ShaderProgram) -> Result<()> {
        if !self.scene_active {
            return Err(EngineError::InvalidState("end_scene called without a matching begin_scene".into()));
        }
        self.flush(backend, shader)?;
        self.scene_active = false;
        self.frame_number += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;
    use crate::shader::ShaderReflectionData;

    fn shader(backend: &mut NullBackend) -> ShaderProgram {
        ShaderProgram::new(backend.debug_alloc_shader(), ShaderReflectionData::default())
    }

    fn quad(texture: TextureHandle) -> QuadParams {
        QuadParams {
            center: Vec2::ZERO,
            half_size: Vec2::ONE,
            color: [1.0, 1.0, 1.0, 1.0],
            texture,
            rotation_euler: [0.0, 0.0, 0.0],
            depth: 0.0,
        }
    }

    #[test]
    fn single_draw_batch_for_same_texture_quads() {
        let mut backend = NullBackend::new();
        let mut shader = shader(&mut backend);
        let mut batcher = Batcher::new(&mut backend, BatcherConfig::default()).unwrap();
        let white = batcher.white_texture();

        batcher.begin_scene(&mut backend).unwrap();
        for _ in 0..100 {
            batcher.draw_quad(&mut backend, &mut shader, quad(white)).unwrap();
        }
        batcher.end_scene(&mut backend, &mut shader).unwrap();

        assert_eq!(backend.calls("draw_arrays"), 1);
        assert_eq!(backend.calls("fence_sync"), 1);
    }

    #[test]
    fn zero_draws_issues_zero_draw_calls_and_zero_fences() {
        let mut backend = NullBackend::new();
        let mut shader = shader(&mut backend);
        let mut batcher = Batcher::new(&mut backend, BatcherConfig::default()).unwrap();

        batcher.begin_scene(&mut backend).unwrap();
        batcher.end_scene(&mut backend, &mut shader).unwrap();

        assert_eq!(backend.calls("draw_arrays"), 0);
        assert_eq!(backend.calls("fence_sync"), 0);
    }

    #[test]
    fn texture_slot_rollover_splits_the_batch() {
        let mut backend = NullBackend::new();
        let mut shader = shader(&mut backend);
        let config = BatcherConfig { max_texture_slots: 4, ..BatcherConfig::default() };
        let mut batcher = Batcher::new(&mut backend, config).unwrap();
        let textures = backend.gen_textures(5).unwrap();

        batcher.begin_scene(&mut backend).unwrap();
        for &texture in &textures {
            batcher.draw_quad(&mut backend, &mut shader, quad(texture)).unwrap();
        }
        batcher.end_scene(&mut backend, &mut shader).unwrap();

        assert_eq!(backend.calls("draw_arrays"), 2);
    }

    #[test]
    fn exceeding_max_quads_per_chunk_flushes_and_rotates_instead_of_erroring() {
        let mut backend = NullBackend::new();
        let mut shader = shader(&mut backend);
        let config = BatcherConfig { max_quads_per_chunk: 4, ..BatcherConfig::default() };
        let mut batcher = Batcher::new(&mut backend, config).unwrap();
        let white = batcher.white_texture();

        let quad_count = 10; // ceil(10 / 4) == 3 draws
        batcher.begin_scene(&mut backend).unwrap();
        for _ in 0..quad_count {
            batcher.draw_quad(&mut backend, &mut shader, quad(white)).unwrap();
        }
        batcher.end_scene(&mut backend, &mut shader).unwrap();

        assert_eq!(backend.calls("draw_arrays"), 3);
    }

    #[test]
    fn flush_stages_camera_and_pixel_snap_uniforms() {
        let mut backend = NullBackend::new();
        let mut shader = shader(&mut backend);
        let config = BatcherConfig { pixel_snap: true, ..BatcherConfig::default() };
        let mut batcher = Batcher::new(&mut backend, config).unwrap();
        let white = batcher.white_texture();
        batcher.set_viewport_size(Vec2::new(1920.0, 1080.0));

        batcher.begin_scene(&mut backend).unwrap();
        batcher.draw_quad(&mut backend, &mut shader, quad(white)).unwrap();
        batcher.end_scene(&mut backend, &mut shader).unwrap();

        assert_eq!(shader.staged_uniform("u_ViewProjection"), Some(&UniformValue::Mat4(IDENTITY_MAT4)));
        assert_eq!(shader.staged_uniform("u_ViewportSize"), Some(&UniformValue::Vec2([1920.0, 1080.0])));
        assert_eq!(shader.staged_uniform("u_PixelSnap"), Some(&UniformValue::Int(1)));
    }
}
