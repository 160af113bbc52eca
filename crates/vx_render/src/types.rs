//! Shared enums and opaque resource handles for the render backend surface (§3, §4.5).
//!
//! Handles are `slotmap` keys rather than raw integers: a stale handle
//! (deleted resource reused by name) fails the slot's generation check
//! instead of silently aliasing a new resource.

use bitflags::bitflags;

slotmap::new_key_type! {
    pub struct BufferHandle;
    pub struct VertexArrayHandle;
    pub struct TextureHandle;
    pub struct FramebufferHandle;
    pub struct ShaderHandle;
    pub struct FenceHandle;
}

bitflags! {
    /// Matches `ClearCommand::ClearFlags` in the original backend.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u32 {
        const COLOR   = 0b001;
        const DEPTH   = 0b010;
        const STENCIL = 0b100;
    }
}

bitflags! {
    /// `map_buffer_range` access flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MapAccessFlags: u32 {
        const READ               = 0b0000_0001;
        const WRITE               = 0b0000_0010;
        const PERSISTENT          = 0b0000_0100;
        const COHERENT            = 0b0000_1000;
        const UNSYNCHRONIZED      = 0b0001_0000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    Points,
    Lines,
    LineStrip,
    Triangles,
    TriangleStrip,
    TriangleFan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    Vertex,
    Index,
    Uniform,
    ShaderStorage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    StaticDraw,
    DynamicDraw,
    StreamDraw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexType {
    U16,
    U32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexAttribComponentType {
    F32,
    I32,
    U32,
    I16,
    U16,
    I8,
    U8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureTarget {
    Texture2D,
    TextureCubeMap,
    Texture2DArray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureParam {
    MinFilter,
    MagFilter,
    WrapS,
    WrapT,
    WrapR,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FramebufferAttachment {
    Color(u32),
    Depth,
    DepthStencil,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthCompareFunc {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

impl Default for DepthCompareFunc {
    fn default() -> Self {
        DepthCompareFunc::Less
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
    SrcColor,
    OneMinusSrcColor,
    DstAlpha,
    OneMinusDstAlpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendOp {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrontFace {
    Clockwise,
    CounterClockwise,
}

/// Result of `client_wait_sync`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FenceWaitStatus {
    AlreadySignaled,
    ConditionSatisfied,
    TimeoutExpired,
    WaitFailed,
}

/// Tracked depth/blend/cull state, diffed by the backend's state cache
/// and restored to these exact values at `RenderPass::end` (§4.6).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthState {
    pub test_enabled: bool,
    pub write_enabled: bool,
    pub compare: DepthCompareFunc,
}

impl Default for DepthState {
    fn default() -> Self {
        Self { test_enabled: true, write_enabled: true, compare: DepthCompareFunc::Less }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendState {
    pub enabled: bool,
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
    pub op: BlendOp,
}

impl Default for BlendState {
    fn default() -> Self {
        Self {
            enabled: false,
            src_factor: BlendFactor::SrcAlpha,
            dst_factor: BlendFactor::OneMinusSrcAlpha,
            op: BlendOp::Add,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CullState {
    pub mode: CullMode,
    pub front_face: FrontFace,
}

impl Default for CullState {
    fn default() -> Self {
        Self { mode: CullMode::None, front_face: FrontFace::CounterClockwise }
    }
}
