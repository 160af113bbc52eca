//! `Task<T>` — a handle to a suspendable computation.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};

use vx_core::EngineError;

/// A handle to a suspendable computation that will eventually produce
/// one value of type `T` or one stored failure.
///
/// `Task<T>` implements [`Future`], so `.await` is the `await()`
/// operation from the design: it registers the awaiting context as
/// the task's single continuation and suspends until the task
/// completes, then yields the stored value or the stored failure —
/// `completed ⇒ exactly one of {value, failure} is set`, matching
/// `original_source`'s `TaskPromise` (`m_Value` xor `m_Exception`).
/// [`Task::is_completed`] and [`Task::get_blocking`] round out the
/// three operations the design calls for.
///
/// A `Task` is owned exclusively by whoever holds it; dropping it
/// detaches the underlying computation (it keeps running, but nothing
/// observes its result) rather than cancelling it, matching
/// `async_task`'s handle semantics.
pub struct Task<T> {
    inner: async_task::Task<Result<T, EngineError>>,
}

impl<T> Task<T> {
    pub(crate) fn new(inner: async_task::Task<Result<T, EngineError>>) -> Self {
        Self { inner }
    }

    /// Non-blocking completion check.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.inner.is_finished()
    }

    /// Blocks the calling OS thread until the task completes, yielding
    /// OS-thread time in between polls.
    ///
    /// Intended for synchronous call sites that cannot `.await`.
    pub fn get_blocking(self) -> Result<T, EngineError> {
        futures_lite::future::block_on(self)
    }
}

impl<T> Future for Task<T> {
    type Output = Result<T, EngineError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner).poll(cx)
    }
}

/// Wraps `future` so a panic during any single `poll` is caught and
/// turned into `Err(EngineError::TaskPanicked)` instead of unwinding
/// through the executor, leaving the task's output slot unset
/// forever. Mirrors `original_source`'s `unhandled_exception()`
/// capturing `std::current_exception` into the promise rather than
/// letting it escape the coroutine frame.
pub(crate) struct CatchUnwind<Fut> {
    inner: Fut,
}

impl<Fut> CatchUnwind<Fut> {
    pub(crate) fn new(inner: Fut) -> Self {
        Self { inner }
    }
}

impl<Fut, T> Future for CatchUnwind<Fut>
where
    Fut: Future<Output = T>,
{
    type Output = Result<T, EngineError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // SAFETY: `inner` is never moved out of; it is only ever
        // polled in place, same as the standard pin-projection idiom.
        let inner = unsafe { self.map_unchecked_mut(|s| &mut s.inner) };
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| inner.poll(cx)));
        match result {
            Ok(Poll::Ready(value)) => Poll::Ready(Ok(value)),
            Ok(Poll::Pending) => Poll::Pending,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "task panicked".to_string());
                Poll::Ready(Err(EngineError::TaskPanicked(message)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::scheduler::Scheduler;
    use vx_core::Priority;

    #[test]
    fn is_completed_reflects_finished_state() {
        let scheduler = Scheduler::new(Default::default());
        let task = scheduler.spawn_with_priority(|_ctx| async { 7 }, Priority::Normal);
        let result = task.get_blocking().unwrap();
        assert_eq!(result, 7);
        scheduler.shutdown();
    }

    #[test]
    fn a_panicking_task_yields_a_stored_failure_instead_of_hanging() {
        let scheduler = Scheduler::new(Default::default());
        let task = scheduler.spawn_with_priority(
            |_ctx| async {
                panic!("boom");
                #[allow(unreachable_code)]
                0
            },
            Priority::Normal,
        );
        let result = task.get_blocking();
        assert!(result.is_err());
        scheduler.shutdown();
    }
}
