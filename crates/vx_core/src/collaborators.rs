//! External collaborator interfaces (spec §6).
//!
//! The core does not implement a window, an asset pipeline, an input
//! system, or a logging backend — those are out of scope (spec §1).
//! What the core *does* define is the narrow interface it expects from
//! each collaborator, so that application code can plug in SDL/winit,
//! a glTF loader, or `env_logger` without the core knowing about any
//! of them concretely.

/// Presentation interval policy requested from the graphics context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VsyncMode {
    Disabled,
    Enabled,
    Adaptive,
    Fast,
    Mailbox,
}

impl Default for VsyncMode {
    fn default() -> Self {
        VsyncMode::Enabled
    }
}

/// A native window surface.
///
/// The core calls [`present`](WindowSurface::present) exactly once at
/// the end of a frame, after the render graph has bound the output
/// target. It never otherwise touches the window.
pub trait WindowSurface {
    /// Current surface size in physical pixels, `(width, height)`.
    fn size(&self) -> (u32, u32);

    /// Performs a buffer swap.
    fn present(&mut self);
}

/// Producer of asset handles (textures, shaders, ...) resolved
/// asynchronously through the scheduler.
///
/// The associated `Handle` is whatever opaque id type the render
/// backend tracks (spec §4.5: "the backend owns no application
/// resources; it produces opaque integer handles"). `vx_tasks::Task`
/// is the concrete return type application code will see; this trait
/// is generic over it only to keep `vx_core` free of a dependency on
/// `vx_tasks`.
pub trait AssetSystem {
    type Handle;
    type Pending;

    /// Kicks off an asynchronous load, returning a pending handle the
    /// caller awaits through the scheduler.
    fn load(&self, path: &str) -> Self::Pending;
}

/// Pushes window/input events into the application loop.
///
/// The core never interprets events; it only needs a way for the
/// application to drain them once per frame before running game
/// logic.
pub trait EventSource<E> {
    /// Drains and returns all events queued since the last call.
    fn drain(&mut self) -> Vec<E>;
}

/// Sink for core-level warnings and errors.
///
/// In practice this is just the `log` crate's global logger; the
/// trait exists so tests can assert on emitted diagnostics without
/// installing a real logger.
pub trait Logger {
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

/// A [`Logger`] that forwards to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct FacadeLogger;

impl Logger for FacadeLogger {
    fn warn(&self, message: &str) {
        log::warn!("{message}");
    }

    fn error(&self, message: &str) {
        log::error!("{message}");
    }
}
