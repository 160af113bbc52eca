//! Render Command Queue (C4, spec §4.4).
//!
//! A thread-safe MPSC queue feeding a single render thread. `flume`
//! (the teacher's channel crate for cross-thread handoff in
//! `myth_render`) backs the FIFO; the "drop oldest incoming" overflow
//! policy is layered on top of its bounded `try_send` by popping one
//! entry via `try_recv` before retrying the send.

use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::backend::RendererBackend;
use crate::command::RenderCommand;

#[derive(Debug, Clone, Copy)]
pub struct RenderQueueConfig {
    pub capacity: usize,
    pub warn_on_drop: bool,
}

impl Default for RenderQueueConfig {
    fn default() -> Self {
        Self { capacity: 4096, warn_on_drop: true }
    }
}

#[derive(Default)]
struct QueueStats {
    dropped: std::sync::atomic::AtomicU64,
    processed: std::sync::atomic::AtomicU64,
    processed_this_frame: std::sync::atomic::AtomicU64,
    per_command: Mutex<FxHashMap<&'static str, u64>>,
}

#[derive(Debug, Clone, Default)]
pub struct RenderQueueStatsSnapshot {
    pub queued: usize,
    pub dropped: u64,
    pub processed: u64,
    pub processed_this_frame: u64,
    pub per_command: FxHashMap<&'static str, u64>,
}

/// The render command queue: one FIFO, one execution mutex, a
/// snapshot of which thread is "the render thread".
pub struct RenderCommandQueue {
    config: RenderQueueConfig,
    sender: flume::Sender<RenderCommand>,
    receiver: flume::Receiver<RenderCommand>,
    execution_mutex: Mutex<()>,
    render_thread: ThreadId,
    stats: QueueStats,
}

impl RenderCommandQueue {
    /// Designates the calling thread as the render thread.
    #[must_use]
    pub fn new(config: RenderQueueConfig) -> Self {
        let (sender, receiver) = flume::bounded(config.capacity.max(1));
        Self {
            config,
            sender,
            receiver,
            execution_mutex: Mutex::new(()),
            render_thread: thread::current().id(),
            stats: QueueStats::default(),
        }
    }

    #[must_use]
    pub fn render_thread_id(&self) -> ThreadId {
        self.render_thread
    }

    #[must_use]
    pub fn is_render_thread(&self) -> bool {
        thread::current().id() == self.render_thread
    }

    #[must_use]
    pub fn stats(&self) -> RenderQueueStatsSnapshot {
        RenderQueueStatsSnapshot {
            queued: self.sender.len(),
            dropped: self.stats.dropped.load(std::sync::atomic::Ordering::Relaxed),
            processed: self.stats.processed.load(std::sync::atomic::Ordering::Relaxed),
            processed_this_frame: self.stats.processed_this_frame.load(std::sync::atomic::Ordering::Relaxed),
            per_command: self.stats.per_command.lock().clone(),
        }
    }

    fn reset_frame_stats(&self) {
        self.stats.processed_this_frame.store(0, std::sync::atomic::Ordering::Relaxed);
    }

    /// Queued submission. Must be called from the render thread; a
    /// call from elsewhere is a contract violation (spec §4.4).
    pub fn submit(&self, command: RenderCommand) -> bool {
        debug_assert!(
            self.is_render_thread(),
            "RenderCommandQueue::submit called off the render thread; use submit_immediate"
        );
        if !self.is_render_thread() {
            log::error!("render command queue: queued submit from non-render thread, dropping");
            return false;
        }
        self.enqueue(command)
    }

    /// Submits a batch in order; returns how many were actually enqueued.
    pub fn submit_batch(&self, commands: impl IntoIterator<Item = RenderCommand>) -> usize {
        debug_assert!(self.is_render_thread(), "submit_batch called off the render thread");
        let mut accepted = 0;
        for command in commands {
            if self.enqueue(command) {
                accepted += 1;
            }
        }
        accepted
    }

    /// Takes the execution mutex and runs `command` synchronously on
    /// the calling thread. For object-lifetime operations that must be
    /// serialized with the render thread from any caller.
    pub fn submit_immediate(&self, command: RenderCommand, backend: &mut dyn RendererBackend) {
        let _guard = self.execution_mutex.lock();
        self.run_one(&command, backend);
    }

    fn enqueue(&self, command: RenderCommand) -> bool {
        match self.sender.try_send(command) {
            Ok(()) => true,
            Err(flume::TrySendError::Full(command)) => {
                if self.receiver.try_recv().is_ok() {
                    self.stats.dropped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    if self.config.warn_on_drop {
                        log::warn!("render command queue full, dropping oldest incoming command");
                    }
                }
                match self.sender.try_send(command) {
                    Ok(()) => true,
                    Err(_) => {
                        self.stats.dropped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        false
                    }
                }
            }
            Err(flume::TrySendError::Disconnected(_)) => false,
        }
    }

    fn run_one(&self, command: &RenderCommand, backend: &mut dyn RendererBackend) {
        let name = command.debug_name();
        if let Err(err) = command.execute(backend) {
            log::error!("render command {name} failed: {err}");
        }
        self.stats.processed.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.stats.processed_this_frame.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        *self.stats.per_command.lock().entry(name).or_insert(0) += 1;
    }

    /// Pops and executes up to `max_commands` in FIFO order. Intended
    /// to be called on the render thread once per frame.
    pub fn process(&self, max_commands: usize, backend: &mut dyn RendererBackend) -> usize {
        self.reset_frame_stats();
        let mut processed = 0;
        while processed < max_commands {
            match self.receiver.try_recv() {
                Ok(command) => {
                    self.run_one(&command, backend);
                    processed += 1;
                }
                Err(_) => break,
            }
        }
        processed
    }

    /// Drains and executes every currently queued command, blocking
    /// until the FIFO is empty.
    pub fn flush_all(&self, backend: &mut dyn RendererBackend) -> usize {
        self.process(usize::MAX, backend)
    }

    /// Discards every currently queued command without executing it
    /// (used at shutdown, spec §4.4/§7).
    pub fn clear_queue(&self) -> usize {
        let mut dropped = 0;
        while self.receiver.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }

    // -------------------------------------------------------------
    // Convenience submitters (original_source's RenderCommandQueue.h)
    // -------------------------------------------------------------

    pub fn submit_clear(&self, flags: crate::types::ClearFlags, color: [f32; 4], depth: f32, stencil: i32) -> bool {
        self.submit(RenderCommand::Clear { flags, color, depth, stencil })
    }

    pub fn submit_set_viewport(&self, x: u32, y: u32, width: u32, height: u32) -> bool {
        self.submit(RenderCommand::SetViewport { x, y, width, height })
    }

    pub fn submit_draw_indexed(
        &self,
        topology: crate::types::PrimitiveTopology,
        index_count: u32,
        instances: u32,
        first_index: u32,
        base_vertex: i32,
        base_instance: u32,
    ) -> bool {
        self.submit(RenderCommand::DrawIndexed { topology, index_count, instances, first_index, base_vertex, base_instance })
    }

    pub fn submit_bind_shader(&self, handle: crate::types::ShaderHandle) -> bool {
        self.submit(RenderCommand::BindShader { handle })
    }

    pub fn push_debug_group(&self, label: impl Into<String>) -> bool {
        self.submit(RenderCommand::PushDebugGroup { label: label.into() })
    }

    pub fn pop_debug_group(&self) -> bool {
        self.submit(RenderCommand::PopDebugGroup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;
    use crate::types::ClearFlags;

    #[test]
    fn queue_overflow_drops_oldest() {
        let queue = RenderCommandQueue::new(RenderQueueConfig { capacity: 2, warn_on_drop: false });
        assert!(queue.submit(RenderCommand::SetViewport { x: 0, y: 0, width: 1, height: 1 }));
        assert!(queue.submit(RenderCommand::SetViewport { x: 0, y: 0, width: 2, height: 2 }));
        assert!(queue.submit(RenderCommand::SetViewport { x: 0, y: 0, width: 3, height: 3 }));
        assert_eq!(queue.stats().dropped, 1);

        let mut backend = NullBackend::new();
        let processed = queue.process(10, &mut backend);
        assert_eq!(processed, 2);
        assert_eq!(backend.calls("set_viewport"), 2);
    }

    #[test]
    fn submission_order_is_preserved() {
        let queue = RenderCommandQueue::new(RenderQueueConfig::default());
        for i in 0..5u32 {
            queue.submit(RenderCommand::SetViewport { x: i, y: 0, width: 1, height: 1 });
        }
        let mut backend = NullBackend::new();
        let processed = queue.process(10, &mut backend);
        assert_eq!(processed, 5);
    }

    #[test]
    fn flush_all_drains_everything() {
        let queue = RenderCommandQueue::new(RenderQueueConfig::default());
        for _ in 0..10 {
            queue.submit(RenderCommand::Clear { flags: ClearFlags::COLOR, color: [0.0; 4], depth: 1.0, stencil: 0 });
        }
        let mut backend = NullBackend::new();
        assert_eq!(queue.flush_all(&mut backend), 10);
        assert_eq!(queue.stats().queued, 0);
    }

    #[test]
    fn clear_queue_discards_without_executing() {
        let queue = RenderCommandQueue::new(RenderQueueConfig::default());
        queue.submit(RenderCommand::Clear { flags: ClearFlags::COLOR, color: [0.0; 4], depth: 1.0, stencil: 0 });
        assert_eq!(queue.clear_queue(), 1);
        let mut backend = NullBackend::new();
        assert_eq!(queue.process(10, &mut backend), 0);
        assert_eq!(backend.calls("clear"), 0);
    }
}
