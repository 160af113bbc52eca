#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

//! Render command pipeline: commands, queue, backend abstraction,
//! passes, graph, and 2D instanced batcher (C3–C9 of the engine core).
//!
//! Application code never talks to a concrete GPU API directly. It
//! submits [`command::RenderCommand`]s to a [`queue::RenderCommandQueue`],
//! which a single render thread drains against a [`backend::RendererBackend`]
//! implementation — the one polymorphism point in this crate (spec §9).
//! [`pass::RenderPass`] and [`graph::RenderGraph`] sequence passes within
//! a frame; [`batcher::Batcher`] amortizes per-sprite draw calls into
//! instanced batches on top of the same backend trait.

pub mod backend;
pub mod batcher;
pub mod command;
pub mod graph;
pub mod pass;
pub mod queue;
pub mod shader;
pub mod types;

pub use backend::{BackendKind, NullBackend, RendererBackend};
pub use batcher::{Batcher, BatcherConfig, InstanceRecord, QuadParams, RotationCache};
pub use command::{Payload, RenderCommand};
pub use graph::{FrameStats, RenderGraph};
pub use pass::{RenderPass, RenderPassSpec, SortMode};
pub use queue::{RenderCommandQueue, RenderQueueConfig, RenderQueueStatsSnapshot};
pub use shader::{ShaderProgram, ShaderReflectionData, UniformValue};
pub use types::*;
