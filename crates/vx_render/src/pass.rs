//! Render Pass (C6, spec §4.6).
//!
//! A scoped binding of target + clear + state, grounded on
//! `original_source`'s `RenderPass`/`RenderPassSpec` (`RenderPass.h`).

use vx_core::Result;

use crate::backend::RendererBackend;
use crate::types::{BlendState, ClearFlags, CullState, DepthState, FramebufferHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortMode {
    None,
    FrontToBack,
    BackToFront,
}

/// Configuration for one pass (spec §3's "Render Pass Spec").
#[derive(Debug, Clone)]
pub struct RenderPassSpec {
    pub name: String,
    /// Render domain tag; opaque to the pass itself, used by
    /// application code to route draws to the right pass.
    pub domain: String,
    pub target: Option<FramebufferHandle>,
    pub clear_flags: ClearFlags,
    pub clear_color: [f32; 4],
    pub clear_depth: f32,
    pub clear_stencil: i32,
    pub depth: DepthState,
    pub blend: BlendState,
    pub cull: CullState,
    pub sort_mode: SortMode,
    /// `Some((x, y, w, h))` overrides the target's own size.
    pub viewport_override: Option<(u32, u32, u32, u32)>,
}

impl RenderPassSpec {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            domain: "default".to_string(),
            target: None,
            clear_flags: ClearFlags::empty(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            clear_depth: 1.0,
            clear_stencil: 0,
            depth: DepthState::default(),
            blend: BlendState::default(),
            cull: CullState::default(),
            sort_mode: SortMode::None,
            viewport_override: None,
        }
    }
}

/// Engine-default state a pass restores on `end` regardless of its
/// own configuration (spec §4.6, tested by §8 scenario 6).
#[must_use]
pub fn default_depth_state() -> DepthState {
    DepthState::default()
}

#[must_use]
pub fn default_blend_state() -> BlendState {
    BlendState::default()
}

#[must_use]
pub fn default_cull_state() -> CullState {
    CullState::default()
}

pub struct RenderPass {
    spec: RenderPassSpec,
    active: bool,
}

impl RenderPass {
    #[must_use]
    pub fn new(spec: RenderPassSpec) -> Self {
        Self { spec, active: false }
    }

    #[must_use]
    pub fn spec(&self) -> &RenderPassSpec {
        &self.spec
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_target(&mut self, target: Option<FramebufferHandle>) {
        self.spec.target = target;
    }

    /// Viewport size to use when binding: the target's own size
    /// unless the spec overrides it.
    #[must_use]
    pub fn viewport_size(&self, target_size: (u32, u32)) -> (u32, u32, u32, u32) {
        match self.spec.viewport_override {
            Some(rect) => rect,
            None => (0, 0, target_size.0, target_size.1),
        }
    }

    /// Binds target, clears, and applies state (§4.6 `begin`).
    pub fn begin(&mut self, backend: &mut dyn RendererBackend, target_size: (u32, u32)) -> Result<()> {
        if let Some(target) = self.spec.target {
            backend.bind_framebuffer(Some(target))?;
            let (x, y, w, h) = self.viewport_size(target_size);
            backend.set_viewport(x, y, w, h)?;
        } else if let Some((x, y, w, h)) = self.spec.viewport_override {
            backend.set_viewport(x, y, w, h)?;
        }

        if !self.spec.clear_flags.is_empty() {
            backend.clear(self.spec.clear_flags, self.spec.clear_color, self.spec.clear_depth, self.spec.clear_stencil)?;
        }

        backend.set_depth_state(self.spec.depth)?;
        backend.set_blend_state(self.spec.blend)?;
        backend.set_cull_state(self.spec.cull)?;

        self.active = true;
        Ok(())
    }

    /// Restores engine defaults and marks inactive (§4.6 `end`).
    pub fn end(&mut self, backend: &mut dyn RendererBackend) -> Result<()> {
        backend.set_depth_state(default_depth_state())?;
        backend.set_blend_state(default_blend_state())?;
        backend.set_cull_state(default_cull_state())?;
        self.active = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;

    #[test]
    fn begin_then_end_restores_engine_defaults() {
        let mut backend = NullBackend::new();
        let mut spec = RenderPassSpec::new("world2d");
        spec.blend.enabled = true;
        spec.depth.test_enabled = false;
        spec.depth.write_enabled = false;
        spec.cull.mode = crate::types::CullMode::Back;
        let mut pass = RenderPass::new(spec);

        pass.begin(&mut backend, (800, 600)).unwrap();
        assert!(pass.is_active());
        pass.end(&mut backend).unwrap();

        assert!(!pass.is_active());
        assert_eq!(backend.depth_state(), default_depth_state());
        assert_eq!(backend.blend_state(), default_blend_state());
        assert_eq!(backend.cull_state(), default_cull_state());
    }

    #[test]
    fn no_target_leaves_framebuffer_binding_untouched() {
        let mut backend = NullBackend::new();
        let spec = RenderPassSpec::new("overlay");
        let mut pass = RenderPass::new(spec);
        pass.begin(&mut backend, (800, 600)).unwrap();
        assert_eq!(backend.calls("bind_framebuffer"), 0);
    }
}
