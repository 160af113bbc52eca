//! Render Graph (C7, spec §4.7).
//!
//! An ordered, name-addressable list of [`RenderPass`]es composing one
//! frame, grounded on the teacher's transient-per-frame
//! `renderer/graph/graph.rs` (reused here as a persistent, owned list
//! since passes are reconfigurable rather than purely transient) and
//! `original_source`'s `RenderGraph.h` for the exact operation set and
//! per-pass timing stats.

use std::time::Instant;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use vx_core::{Clock, Result};

use crate::backend::RendererBackend;
use crate::pass::{RenderPass, RenderPassSpec};
use crate::types::{FramebufferAttachment, FramebufferHandle, TextureHandle, TextureTarget};

/// Most frame graphs use a handful of passes (shadow, opaque,
/// transparent, post, UI); inlining up to 8 avoids a heap allocation
/// for the common case, the same trade-off the teacher makes for its
/// per-frame node list (`renderer/graph/graph.rs`'s `SmallVec<[...; 8]>`).
type PassList = SmallVec<[RenderPass; 8]>;

/// Per-frame statistics, published once `execute()` completes
/// (original_source's `RenderGraph::FrameStatistics`).
#[derive(Debug, Clone, Default)]
pub struct FrameStats {
    pub frame_number: u64,
    pub passes_executed: u32,
    pub executed_pass_names: Vec<String>,
    pub pass_timings_ms: FxHashMap<String, f32>,
    pub total_frame_time_ms: f32,
}

pub struct RenderGraph {
    passes: PassList,
    index_by_name: FxHashMap<String, usize>,
    current_pass: Option<usize>,
    output_target: Option<FramebufferHandle>,
    pass_framebuffers: FxHashMap<String, FramebufferHandle>,
    pass_framebuffer_textures: FxHashMap<String, TextureHandle>,
    width: u32,
    height: u32,
    frame_active: bool,
    frame_counter: u64,
    frame_start: Option<Instant>,
    pass_start: Option<Instant>,
    current_stats: FrameStats,
    last_stats: FrameStats,
}

impl Default for RenderGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderGraph {
    #[must_use]
    pub fn new() -> Self {
        Self {
            passes: PassList::new(),
            index_by_name: FxHashMap::default(),
            current_pass: None,
            output_target: None,
            pass_framebuffers: FxHashMap::default(),
            pass_framebuffer_textures: FxHashMap::default(),
            width: 0,
            height: 0,
            frame_active: false,
            frame_counter: 0,
            frame_start: None,
            pass_start: None,
            current_stats: FrameStats::default(),
            last_stats: FrameStats::default(),
        }
    }

    #[must_use]
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    #[must_use]
    pub fn last_frame_stats(&self) -> &FrameStats {
        &self.last_stats
    }

    pub fn set_output_target(&mut self, target: Option<FramebufferHandle>) {
        self.output_target = target;
    }

    fn rebuild_index(&mut self) {
        self.index_by_name.clear();
        for (i, pass) in self.passes.iter().enumerate() {
            self.index_by_name.insert(pass.name().to_string(), i);
        }
    }

    /// Appends a pass. Returns `false` (logged) if the name is
    /// already in use.
    pub fn add_pass(&mut self, spec: RenderPassSpec) -> bool {
        if self.index_by_name.contains_key(&spec.name) {
            log::warn!("render graph: duplicate pass name {:?}, ignoring add_pass", spec.name);
            return false;
        }
        self.index_by_name.insert(spec.name.clone(), self.passes.len());
        self.passes.push(RenderPass::new(spec));
        true
    }

    pub fn insert_before(&mut self, before: &str, spec: RenderPassSpec) -> bool {
        let Some(&index) = self.index_by_name.get(before) else {
            log::warn!("render graph: insert_before unknown pass {before:?}");
            return false;
        };
        self.passes.insert(index, RenderPass::new(spec));
        self.rebuild_index();
        true
    }

    pub fn insert_after(&mut self, after: &str, spec: RenderPassSpec) -> bool {
        let Some(&index) = self.index_by_name.get(after) else {
            log::warn!("render graph: insert_after unknown pass {after:?}");
            return false;
        };
        self.passes.insert(index + 1, RenderPass::new(spec));
        self.rebuild_index();
        true
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let Some(index) = self.index_by_name.get(name).copied() else {
            log::warn!("render graph: remove unknown pass {name:?}");
            return false;
        };
        self.passes.remove(index);
        self.pass_framebuffers.remove(name);
        self.pass_framebuffer_textures.remove(name);
        self.rebuild_index();
        true
    }

    /// Allocates a framebuffer with a sized color attachment and binds
    /// it as the named pass's render target.
    pub fn create_pass_framebuffer(&mut self, name: &str, width: u32, height: u32, backend: &mut dyn RendererBackend) -> Result<FramebufferHandle> {
        let width = width.max(self.width).max(1);
        let height = height.max(self.height).max(1);

        let handle = backend.gen_framebuffers(1)?[0];
        let color_texture = backend.gen_textures(1)?[0];

        backend.bind_texture_target(TextureTarget::Texture2D, color_texture)?;
        backend.tex_image_2d(TextureTarget::Texture2D, 0, width, height, None)?;

        backend.bind_framebuffer(Some(handle))?;
        backend.framebuffer_texture_2d(FramebufferAttachment::Color(0), color_texture, 0)?;
        backend.check_framebuffer_status()?;

        self.pass_framebuffers.insert(name.to_string(), handle);
        self.pass_framebuffer_textures.insert(name.to_string(), color_texture);
        if let Some(&index) = self.index_by_name.get(name) {
            self.passes[index].set_target(Some(handle));
        }
        Ok(handle)
    }

    pub fn pass_framebuffer(&self, name: &str) -> Option<FramebufferHandle> {
        self.pass_framebuffers.get(name).copied()
    }

    /// Rebuilds every per-pass framebuffer (and its color attachment)
    /// at the new size.
    pub fn resize(&mut self, width: u32, height: u32, backend: &mut dyn RendererBackend) -> Result<()> {
        self.width = width;
        self.height = height;
        let names: Vec<String> = self.pass_framebuffers.keys().cloned().collect();
        for name in names {
            if let Some(old) = self.pass_framebuffers.get(&name).copied() {
                backend.delete_framebuffers(&[old])?;
            }
            if let Some(old_texture) = self.pass_framebuffer_textures.get(&name).copied() {
                backend.delete_textures(&[old_texture])?;
            }
            self.create_pass_framebuffer(&name, width, height, backend)?;
        }
        Ok(())
    }

    /// Starts a new frame: clears per-frame statistics and records the
    /// start time.
    pub fn begin(&mut self, clock: &dyn Clock) {
        self.current_stats = FrameStats { frame_number: self.frame_counter, ..FrameStats::default() };
        self.frame_start = Some(clock.now());
        self.frame_active = true;
    }

    /// Ends the active pass (if any), then begins the named one.
    pub fn begin_pass(&mut self, name: &str, backend: &mut dyn RendererBackend, clock: &dyn Clock) -> bool {
        if self.current_pass.is_some() {
            log::debug!("render graph: begin_pass({name}) implicitly ends the previous pass");
            self.end_pass(backend, clock);
        }
        let Some(&index) = self.index_by_name.get(name) else {
            log::warn!("render graph: begin_pass unknown pass {name:?}");
            return false;
        };
        let target_size = (self.width, self.height);
        if let Err(err) = self.passes[index].begin(backend, target_size) {
            log::error!("render graph: pass {name:?} failed to begin: {err}");
            return false;
        }
        self.current_pass = Some(index);
        self.pass_start = Some(clock.now());
        true
    }

    /// Ends the active pass and records its elapsed time. No-op with
    /// a warning if no pass is active.
    pub fn end_pass(&mut self, backend: &mut dyn RendererBackend, clock: &dyn Clock) {
        let Some(index) = self.current_pass.take() else {
            log::warn!("render graph: end_pass called with no active pass");
            return;
        };
        if let Err(err) = self.passes[index].end(backend) {
            log::error!("render graph: pass {:?} failed to end: {err}", self.passes[index].name());
        }
        let elapsed_ms = self
            .pass_start
            .take()
            .map_or(0.0, |start| clock.now().duration_since(start).as_secs_f32() * 1000.0);
        let name = self.passes[index].name().to_string();
        self.current_stats.passes_executed += 1;
        self.current_stats.executed_pass_names.push(name.clone());
        self.current_stats.pass_timings_ms.insert(name, elapsed_ms);
    }

    /// Ends any active pass, binds the output target, finalizes and
    /// publishes statistics, and marks the frame inactive.
    pub fn execute(&mut self, backend: &mut dyn RendererBackend, clock: &dyn Clock) -> Result<()> {
        if !self.frame_active {
            log::warn!("render graph: execute called with no active frame");
            return Ok(());
        }
        if self.current_pass.is_some() {
            self.end_pass(backend, clock);
        }
        backend.bind_framebuffer(self.output_target)?;

        self.current_stats.total_frame_time_ms = self
            .frame_start
            .take()
            .map_or(0.0, |start| clock.now().duration_since(start).as_secs_f32() * 1000.0);
        self.last_stats = std::mem::take(&mut self.current_stats);
        self.frame_counter += 1;
        self.frame_active = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;
    use vx_core::SystemClock;

    #[test]
    fn unknown_pass_name_is_a_no_op() {
        let mut graph = RenderGraph::new();
        let mut backend = NullBackend::new();
        let clock = SystemClock::default();
        assert!(!graph.begin_pass("missing", &mut backend, &clock));
    }

    #[test]
    fn duplicate_pass_name_is_rejected() {
        let mut graph = RenderGraph::new();
        assert!(graph.add_pass(RenderPassSpec::new("world2d")));
        assert!(!graph.add_pass(RenderPassSpec::new("world2d")));
        assert_eq!(graph.pass_count(), 1);
    }

    #[test]
    fn create_pass_framebuffer_allocates_and_attaches_a_sized_texture() {
        let mut graph = RenderGraph::new();
        let mut backend = NullBackend::new();
        graph.create_pass_framebuffer("shadow", 512, 512, &mut backend).unwrap();

        assert_eq!(backend.calls("tex_image_2d"), 1);
        assert_eq!(backend.calls("framebuffer_texture_2d"), 1);
        assert_eq!(backend.calls("check_framebuffer_status"), 1);
    }

    #[test]
    fn resize_recreates_the_attachment_at_the_new_size() {
        let mut graph = RenderGraph::new();
        let mut backend = NullBackend::new();
        graph.create_pass_framebuffer("shadow", 256, 256, &mut backend).unwrap();
        graph.resize(512, 512, &mut backend).unwrap();

        assert_eq!(backend.calls("tex_image_2d"), 2);
        assert_eq!(backend.calls("framebuffer_texture_2d"), 2);
    }

    #[test]
    fn begin_pass_implicitly_ends_previous_pass() {
        let mut graph = RenderGraph::new();
        let clock = SystemClock::default();
        let mut backend = NullBackend::new();
        graph.add_pass(RenderPassSpec::new("a"));
        graph.add_pass(RenderPassSpec::new("b"));
        graph.begin(&clock);
        assert!(graph.begin_pass("a", &mut backend, &clock));
        assert!(graph.begin_pass("b", &mut backend, &clock));
        graph.execute(&mut backend, &clock).unwrap();
        assert_eq!(graph.last_frame_stats().passes_executed, 2);
        assert_eq!(graph.last_frame_stats().executed_pass_names, vec!["a", "b"]);
    }
}
