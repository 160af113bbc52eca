//! Render Command (C3, spec §3 & §4.3).
//!
//! A self-describing record with one `execute` arm per variant — a
//! closed sum type, not a virtual hierarchy, per spec §9's note on
//! "deep inheritance in source".

use vx_core::Result;

use crate::backend::RendererBackend;
use crate::types::{
    BlendState, BufferHandle, BufferTarget, BufferUsage, ClearFlags, CullState, DepthState,
    FenceHandle, FramebufferAttachment, FramebufferHandle, IndexType, MapAccessFlags,
    PrimitiveTopology, ShaderHandle, TextureHandle, TextureParam, TextureTarget,
    VertexArrayHandle, VertexAttribComponentType,
};

/// An upload command's data, owned or caller-guaranteed-resident.
///
/// Data-carrying commands must be safe to execute after the submitter
/// returns (spec §4.3). The default is an owned inline payload; the
/// immediate-mode path may instead promise residency until execution
/// — `Borrowed` upholds that promise at the type level by requiring
/// `unsafe` construction and carrying the submission's contract in
/// its doc comment instead of copying.
pub enum Payload {
    Owned(Box<[u8]>),
    /// # Safety
    /// The caller guarantees `ptr..ptr+len` stays valid and is not
    /// mutated until this command executes. Only valid on commands
    /// submitted with `immediate = true`.
    Borrowed { ptr: *const u8, len: usize },
}

// SAFETY: `Borrowed` is only ever constructed by a caller that holds
// the execution mutex for the command's lifetime (spec §4.4), so the
// pointed-to memory is never concurrently mutated while in flight.
unsafe impl Send for Payload {}

impl Payload {
    #[must_use]
    pub fn owned(bytes: &[u8]) -> Self {
        Payload::Owned(bytes.to_vec().into_boxed_slice())
    }

    /// # Safety
    /// See [`Payload::Borrowed`].
    #[must_use]
    pub unsafe fn borrowed(ptr: *const u8, len: usize) -> Self {
        Payload::Borrowed { ptr, len }
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Payload::Owned(bytes) => bytes,
            // SAFETY: contract documented on `Borrowed`.
            Payload::Borrowed { ptr, len } => unsafe { std::slice::from_raw_parts(*ptr, *len) },
        }
    }

    #[must_use]
    pub fn is_borrowed(&self) -> bool {
        matches!(self, Payload::Borrowed { .. })
    }
}

/// One self-contained GPU-side operation (spec §3's closed variant set).
pub enum RenderCommand {
    Clear { flags: ClearFlags, color: [f32; 4], depth: f32, stencil: i32 },
    SetViewport { x: u32, y: u32, width: u32, height: u32 },
    SetScissor { x: u32, y: u32, width: u32, height: u32 },

    DrawArrays { topology: PrimitiveTopology, first: u32, count: u32, instances: u32 },
    DrawIndexed { topology: PrimitiveTopology, index_count: u32, instances: u32, first_index: u32, base_vertex: i32, base_instance: u32 },

    BindVertexBuffer { target: BufferTarget, handle: BufferHandle },
    BindIndexBuffer { handle: BufferHandle, index_type: IndexType, offset: usize },
    BindVertexArray { handle: VertexArrayHandle },
    BindShader { handle: ShaderHandle },
    BindTexture { slot: u32, handle: TextureHandle },
    BindBuffer { target: BufferTarget, handle: BufferHandle },
    BindBufferBase { target: BufferTarget, binding: u32, handle: BufferHandle },
    BindTextureTarget { target: TextureTarget, handle: TextureHandle },
    BindFramebuffer { handle: Option<FramebufferHandle> },

    BufferData { target: BufferTarget, payload: Payload, usage: BufferUsage },
    BufferSubData { target: BufferTarget, offset: usize, payload: Payload },
    BufferStorage { target: BufferTarget, size: usize, payload: Option<Payload>, flags: MapAccessFlags },
    MapBufferRange { target: BufferTarget, offset: usize, length: usize, access: MapAccessFlags },
    UnmapBuffer { target: BufferTarget },

    FenceSync,
    ClientWaitSync { fence: FenceHandle, flags: u32, timeout_ns: u64 },
    DeleteSync { fence: FenceHandle },

    VertexAttribPointer { location: u32, components: u32, ty: VertexAttribComponentType, normalized: bool, stride: u32, offset: u32 },
    VertexAttribIPointer { location: u32, components: u32, ty: VertexAttribComponentType, stride: u32, offset: u32 },
    VertexAttribDivisor { location: u32, divisor: u32 },
    EnableVertexAttribArray { location: u32 },

    GenBuffers { count: usize },
    DeleteBuffers { handles: Vec<BufferHandle> },
    GenVertexArrays { count: usize },
    DeleteVertexArrays { handles: Vec<VertexArrayHandle> },
    GenTextures { count: usize },
    DeleteTextures { handles: Vec<TextureHandle> },

    TexImage2D { target: TextureTarget, level: u32, width: u32, height: u32, payload: Option<Payload> },
    TexParameteri { target: TextureTarget, param: TextureParam, value: i32 },
    GenerateMipmap { target: TextureTarget },

    GenFramebuffers { count: usize },
    DeleteFramebuffers { handles: Vec<FramebufferHandle> },
    FramebufferTexture2D { attachment: FramebufferAttachment, texture: TextureHandle, level: u32 },
    CheckFramebufferStatus,
    SetDrawBuffers { attachments: Vec<FramebufferAttachment> },

    SetDepthState { state: DepthState },
    SetBlendState { state: BlendState },
    SetCullState { state: CullState },

    PushDebugGroup { label: String },
    PopDebugGroup,
}

impl RenderCommand {
    /// Runs this command's one backend call. Backend failures are the
    /// caller's (`RenderCommandQueue::process`'s) concern to log and
    /// skip; this just surfaces the `Result`.
    pub fn execute(&self, backend: &mut dyn RendererBackend) -> Result<()> {
        match self {
            RenderCommand::Clear { flags, color, depth, stencil } => backend.clear(*flags, *color, *depth, *stencil),
            RenderCommand::SetViewport { x, y, width, height } => backend.set_viewport(*x, *y, *width, *height),
            RenderCommand::SetScissor { x, y, width, height } => backend.set_scissor(*x, *y, *width, *height),

            RenderCommand::DrawArrays { topology, first, count, instances } => backend.draw_arrays(*topology, *first, *count, *instances),
            RenderCommand::DrawIndexed { topology, index_count, instances, first_index, base_vertex, base_instance } => {
                backend.draw_indexed(*topology, *index_count, *instances, *first_index, *base_vertex, *base_instance)
            }

            RenderCommand::BindVertexBuffer { target, handle } => backend.bind_buffer(*target, *handle),
            RenderCommand::BindIndexBuffer { handle, index_type, offset } => backend.bind_index_buffer(*handle, *index_type, *offset),
            RenderCommand::BindVertexArray { handle } => backend.bind_vertex_array(*handle),
            RenderCommand::BindShader { handle } => backend.bind_shader(*handle),
            RenderCommand::BindTexture { slot, handle } => backend.bind_texture(*slot, *handle),
            RenderCommand::BindBuffer { target, handle } => backend.bind_buffer(*target, *handle),
            RenderCommand::BindBufferBase { target, binding, handle } => backend.bind_buffer_base(*target, *binding, *handle),
            RenderCommand::BindTextureTarget { target, handle } => backend.bind_texture_target(*target, *handle),
            RenderCommand::BindFramebuffer { handle } => backend.bind_framebuffer(*handle),

            RenderCommand::BufferData { target, payload, usage } => backend.buffer_data(*target, payload.as_slice(), *usage),
            RenderCommand::BufferSubData { target, offset, payload } => backend.buffer_sub_data(*target, *offset, payload.as_slice()),
            RenderCommand::BufferStorage { target, size, payload, flags } => {
                backend.buffer_storage(*target, *size, payload.as_ref().map(Payload::as_slice), *flags)
            }
            RenderCommand::MapBufferRange { target, offset, length, access } => {
                backend.map_buffer_range(*target, *offset, *length, *access).map(|_ptr| ())
            }
            RenderCommand::UnmapBuffer { target } => backend.unmap_buffer(*target),

            RenderCommand::FenceSync => backend.fence_sync().map(|_| ()),
            RenderCommand::ClientWaitSync { fence, flags, timeout_ns } => backend.client_wait_sync(*fence, *flags, *timeout_ns).map(|_| ()),
            RenderCommand::DeleteSync { fence } => backend.delete_sync(*fence),

            RenderCommand::VertexAttribPointer { location, components, ty, normalized, stride, offset } => {
                backend.vertex_attrib_pointer(*location, *components, *ty, *normalized, *stride, *offset)
            }
            RenderCommand::VertexAttribIPointer { location, components, ty, stride, offset } => {
                backend.vertex_attrib_ipointer(*location, *components, *ty, *stride, *offset)
            }
            RenderCommand::VertexAttribDivisor { location, divisor } => backend.vertex_attrib_divisor(*location, *divisor),
            RenderCommand::EnableVertexAttribArray { location } => backend.enable_vertex_attrib_array(*location),

            RenderCommand::GenBuffers { count } => backend.gen_buffers(*count).map(|_| ()),
            RenderCommand::DeleteBuffers { handles } => backend.delete_buffers(handles),
            RenderCommand::GenVertexArrays { count } => backend.gen_vertex_arrays(*count).map(|_| ()),
            RenderCommand::DeleteVertexArrays { handles } => backend.delete_vertex_arrays(handles),
            RenderCommand::GenTextures { count } => backend.gen_textures(*count).map(|_| ()),
            RenderCommand::DeleteTextures { handles } => backend.delete_textures(handles),

            RenderCommand::TexImage2D { target, level, width, height, payload } => {
                backend.tex_image_2d(*target, *level, *width, *height, payload.as_ref().map(Payload::as_slice))
            }
            RenderCommand::TexParameteri { target, param, value } => backend.tex_parameter_i(*target, *param, *value),
            RenderCommand::GenerateMipmap { target } => backend.generate_mipmap(*target),

            RenderCommand::GenFramebuffers { count } => backend.gen_framebuffers(*count).map(|_| ()),
            RenderCommand::DeleteFramebuffers { handles } => backend.delete_framebuffers(handles),
            RenderCommand::FramebufferTexture2D { attachment, texture, level } => backend.framebuffer_texture_2d(*attachment, *texture, *level),
            RenderCommand::CheckFramebufferStatus => backend.check_framebuffer_status(),
            RenderCommand::SetDrawBuffers { attachments } => backend.set_draw_buffers(attachments),

            RenderCommand::SetDepthState { state } => backend.set_depth_state(*state),
            RenderCommand::SetBlendState { state } => backend.set_blend_state(*state),
            RenderCommand::SetCullState { state } => backend.set_cull_state(*state),

            RenderCommand::PushDebugGroup { label } => backend.push_debug_group(label),
            RenderCommand::PopDebugGroup => backend.pop_debug_group(),
        }
    }

    /// Cheap metadata for profiling/future batching — never consulted
    /// for correctness (spec §4.3).
    #[must_use]
    pub fn debug_name(&self) -> &'static str {
        match self {
            RenderCommand::Clear { .. } => "Clear",
            RenderCommand::SetViewport { .. } => "SetViewport",
            RenderCommand::SetScissor { .. } => "SetScissor",
            RenderCommand::DrawArrays { .. } => "DrawArrays",
            RenderCommand::DrawIndexed { .. } => "DrawIndexed",
            RenderCommand::BindVertexBuffer { .. } => "BindVertexBuffer",
            RenderCommand::BindIndexBuffer { .. } => "BindIndexBuffer",
            RenderCommand::BindVertexArray { .. } => "BindVertexArray",
            RenderCommand::BindShader { .. } => "BindShader",
            RenderCommand::BindTexture { .. } => "BindTexture",
            RenderCommand::BindBuffer { .. } => "BindBuffer",
            RenderCommand::BindBufferBase { .. } => "BindBufferBase",
            RenderCommand::BindTextureTarget { .. } => "BindTextureTarget",
            RenderCommand::BindFramebuffer { .. } => "BindFramebuffer",
            RenderCommand::BufferData { .. } => "BufferData",
            RenderCommand::BufferSubData { .. } => "BufferSubData",
            RenderCommand::BufferStorage { .. } => "BufferStorage",
            RenderCommand::MapBufferRange { .. } => "MapBufferRange",
            RenderCommand::UnmapBuffer { .. } => "UnmapBuffer",
            RenderCommand::FenceSync => "FenceSync",
            RenderCommand::ClientWaitSync { .. } => "ClientWaitSync",
            RenderCommand::DeleteSync { .. } => "DeleteSync",
            RenderCommand::VertexAttribPointer { .. } => "VertexAttribPointer",
            RenderCommand::VertexAttribIPointer { .. } => "VertexAttribIPointer",
            RenderCommand::VertexAttribDivisor { .. } => "VertexAttribDivisor",
            RenderCommand::EnableVertexAttribArray { .. } => "EnableVertexAttribArray",
            RenderCommand::GenBuffers { .. } => "GenBuffers",
            RenderCommand::DeleteBuffers { .. } => "DeleteBuffers",
            RenderCommand::GenVertexArrays { .. } => "GenVertexArrays",
            RenderCommand::DeleteVertexArrays { .. } => "DeleteVertexArrays",
            RenderCommand::GenTextures { .. } => "GenTextures",
            RenderCommand::DeleteTextures { .. } => "DeleteTextures",
            RenderCommand::TexImage2D { .. } => "TexImage2D",
            RenderCommand::TexParameteri { .. } => "TexParameteri",
            RenderCommand::GenerateMipmap { .. } => "GenerateMipmap",
            RenderCommand::GenFramebuffers { .. } => "GenFramebuffers",
            RenderCommand::DeleteFramebuffers { .. } => "DeleteFramebuffers",
            RenderCommand::FramebufferTexture2D { .. } => "FramebufferTexture2D",
            RenderCommand::CheckFramebufferStatus => "CheckFramebufferStatus",
            RenderCommand::SetDrawBuffers { .. } => "SetDrawBuffers",
            RenderCommand::SetDepthState { .. } => "SetDepthState",
            RenderCommand::SetBlendState { .. } => "SetBlendState",
            RenderCommand::SetCullState { .. } => "SetCullState",
            RenderCommand::PushDebugGroup { .. } => "PushDebugGroup",
            RenderCommand::PopDebugGroup => "PopDebugGroup",
        }
    }

    /// Rough relative cost, used only for profiling/batching heuristics.
    #[must_use]
    pub fn estimated_cost(&self) -> f32 {
        match self {
            RenderCommand::DrawArrays { .. } | RenderCommand::DrawIndexed { .. } => 10.0,
            RenderCommand::BufferData { .. } | RenderCommand::BufferSubData { .. } | RenderCommand::BufferStorage { .. } | RenderCommand::TexImage2D { .. } => 5.0,
            RenderCommand::Clear { .. } | RenderCommand::FenceSync | RenderCommand::ClientWaitSync { .. } => 2.0,
            _ => 1.0,
        }
    }

    /// True if this command holds a [`Payload::Borrowed`] and
    /// therefore may only be submitted through the queue's immediate
    /// path (spec §4.4).
    #[must_use]
    pub fn requires_immediate(&self) -> bool {
        match self {
            RenderCommand::BufferData { payload, .. } | RenderCommand::BufferSubData { payload, .. } => payload.is_borrowed(),
            RenderCommand::BufferStorage { payload, .. } | RenderCommand::TexImage2D { payload, .. } => {
                payload.as_ref().is_some_and(Payload::is_borrowed)
            }
            _ => false,
        }
    }
}
