#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

//! Vortex engine core: a priority-based cooperative task scheduler
//! plus a render command pipeline, wired together by [`Engine`].
//!
//! This crate re-exports [`vx_core`], [`vx_tasks`], and [`vx_render`]
//! and composes them the way the teacher's `engine.rs` composes a
//! renderer and scene manager — a pure, windowless coordinator that
//! different frontends (native loop, editor, headless tooling) can
//! drive.

pub use vx_core::{
    AssetSystem, Clock, EngineError, EventSource, Logger, Priority, Result, SystemClock, VsyncMode,
    WindowSurface,
};
pub use vx_render::{
    BackendKind, Batcher, BatcherConfig, FrameStats, NullBackend, QuadParams, RenderCommand,
    RenderCommandQueue, RenderGraph, RenderPass, RenderPassSpec, RenderQueueConfig,
    RendererBackend, ShaderProgram, SortMode,
};
pub use vx_tasks::{Scheduler, SchedulerConfig, SchedulerStatsSnapshot, Task, TaskContext};

use std::time::Duration;

/// Top-level configuration for one [`Engine`] instance.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub scheduler: SchedulerConfig,
    pub render_queue: RenderQueueConfig,
    pub batcher: BatcherConfig,
}

/// The pure, windowless coordinator tying the task scheduler to the
/// render command pipeline.
///
/// `Engine` owns no GPU context and opens no window: it is driven by a
/// frontend that supplies a [`RendererBackend`] and calls
/// [`Engine::process_frame`] once per tick, mirroring the teacher's
/// `Engine` (itself a pure coordinator a windowing frontend
/// initializes separately).
pub struct Engine {
    pub scheduler: Scheduler,
    pub render_queue: RenderCommandQueue,
    pub graph: RenderGraph,

    clock: SystemClock,
    frame_count: u64,
    time: f32,
}

impl Engine {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            scheduler: Scheduler::new(config.scheduler),
            render_queue: RenderCommandQueue::new(config.render_queue),
            graph: RenderGraph::new(),
            clock: SystemClock,
            frame_count: 0,
            time: 0.0,
        }
    }

    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    #[must_use]
    pub fn time(&self) -> f32 {
        self.time
    }

    /// Drives one frame: processes scheduler work up to `budget`, then
    /// drains and executes every queued render command against
    /// `backend`, then runs the render graph's frame lifecycle.
    ///
    /// Returns `(tasks_resumed, commands_executed)`.
    pub fn process_frame(&mut self, dt: f32, budget: Duration, backend: &mut dyn RendererBackend) -> (usize, usize) {
        self.time += dt;
        self.frame_count += 1;

        let tasks_resumed = self.scheduler.process_frame(budget);
        let commands_executed = self.render_queue.flush_all(backend);

        self.graph.begin(&self.clock);
        if let Err(err) = self.graph.execute(backend, &self.clock) {
            log::error!("engine: render graph execute failed: {err}");
        }

        (tasks_resumed, commands_executed)
    }

    pub fn shutdown(&mut self) {
        self.scheduler.shutdown();
        self.render_queue.clear_queue();
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_frame_advances_time_and_frame_count() {
        let mut engine = Engine::default();
        let mut backend = NullBackend::new();
        engine.process_frame(1.0 / 60.0, Duration::from_millis(4), &mut backend);
        assert_eq!(engine.frame_count(), 1);
        assert!(engine.time() > 0.0);
    }

    #[test]
    fn shutdown_drains_scheduler_and_queue() {
        let mut engine = Engine::default();
        engine.render_queue.submit_set_viewport(0, 0, 1, 1);
        engine.shutdown();
        assert!(!engine.scheduler.is_running());
    }
}
