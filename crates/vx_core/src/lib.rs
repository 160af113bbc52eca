#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

//! Shared foundation for the Vortex engine core.
//!
//! This crate has no GPU or threading logic of its own. It holds the
//! vocabulary every other core crate builds on: the [`Priority`] scale,
//! the [`EngineError`] taxonomy, the [`Clock`] abstraction used for
//! scheduling and timing, and the minimal collaborator traits (§6 of the
//! design) that the scheduler and render pipeline consume but do not
//! implement — window surfaces, asset systems, event sources, loggers.

pub mod clock;
pub mod collaborators;
pub mod error;
pub mod priority;

pub use clock::{Clock, SystemClock};
pub use collaborators::{AssetSystem, EventSource, Logger, VsyncMode, WindowSurface};
pub use error::{EngineError, Result};
pub use priority::Priority;
