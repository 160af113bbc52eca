#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

//! Priority-based cooperative task scheduler.
//!
//! This crate implements C1 (Task/Awaitable) and C2 (Coroutine
//! Scheduler) of the engine core. A [`Task`] is a handle to a
//! suspendable computation; it is driven to its next suspension point
//! by a worker thread calling [`async_task::Runnable::run`] exactly
//! once per pickup, matching the design's "resume to next suspension
//! point" semantics without hand-rolling a generator machine.
//!
//! Suspension points are explicit: [`TaskContext::sleep`],
//! [`TaskContext::yield_now`], [`TaskContext::switch_to_thread`], and
//! `.await` on another [`Task`]. There is no implicit preemption.
//!
//! The scheduler is an explicit, cheaply-cloneable handle
//! ([`Scheduler`]) rather than a process-wide singleton — application
//! code threads it through an `Engine`-level execution context, per
//! the design's note on avoiding hidden globals.

pub mod awaitable;
pub mod scheduler;
pub mod task;

pub use awaitable::await_all;
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerStats, SchedulerStatsSnapshot, TaskContext};
pub use task::Task;
pub use vx_core::Priority;
