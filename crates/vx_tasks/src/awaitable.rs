//! Suspension primitives exposed through [`crate::scheduler::TaskContext`].
//!
//! Each of these is a tiny hand-written [`Future`]; none of them poll
//! in a busy loop — they register a waker with the scheduler and
//! return `Pending` until that waker fires.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use vx_core::{EngineError, Priority};

use crate::scheduler::{push_delayed_waker, Inner, TaskState};
use crate::task::Task;

/// Future returned by `TaskContext::sleep`.
pub struct Sleep {
    scheduler: Arc<Inner>,
    duration: Duration,
    wake_time: Option<Instant>,
}

impl Sleep {
    pub(crate) fn new(scheduler: Arc<Inner>, duration: Duration) -> Self {
        Self { scheduler, duration, wake_time: None }
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let wake_time = *self.wake_time.get_or_insert_with(|| Instant::now() + self.duration);
        if Instant::now() >= wake_time {
            return Poll::Ready(());
        }
        push_delayed_waker(&self.scheduler, wake_time, cx.waker().clone());
        Poll::Pending
    }
}

/// Future returned by `TaskContext::yield_now`.
///
/// The first poll applies the new priority and immediately re-wakes
/// itself, which re-enqueues the task through its `async_task`
/// schedule closure at the new priority; the second poll (run from
/// wherever that re-enqueue was picked up) completes.
pub struct YieldNow {
    state: Arc<TaskState>,
    priority: Priority,
    requested: bool,
}

impl YieldNow {
    pub(crate) fn new(state: Arc<TaskState>, priority: Priority) -> Self {
        Self { state, priority, requested: false }
    }
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.requested {
            return Poll::Ready(());
        }
        self.state.set_priority(self.priority);
        self.requested = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

/// Future returned by `TaskContext::switch_to_thread`.
pub struct SwitchToThread {
    state: Arc<TaskState>,
    target: ThreadId,
    requested: bool,
}

impl SwitchToThread {
    pub(crate) fn new(state: Arc<TaskState>, target: ThreadId) -> Self {
        Self { state, target, requested: false }
    }
}

impl Future for SwitchToThread {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if thread::current().id() == self.target {
            self.state.set_pinned_thread(None);
            return Poll::Ready(());
        }
        if self.requested {
            // Woken on the wrong thread (spurious or pre-pin wake);
            // keep waiting for the pinned queue to actually run us.
            return Poll::Pending;
        }
        self.state.set_pinned_thread(Some(self.target));
        self.requested = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

/// A join over every task in `tasks`, completed when every input is
/// completed. Failure of any input propagates the first observed
/// failure.
///
/// Every task is polled on each wake (they progress independently
/// once scheduled; this only observes completion), and an
/// [`AtomicUsize`] tracks how many remain. Each completing poll
/// decrements it, so regardless of which worker thread wakes this
/// future last, the countdown reaching zero is published exactly
/// once, matching the design's "implementations must use atomic
/// counting" requirement.
struct JoinAll<T> {
    tasks: Vec<Option<Task<T>>>,
    results: Vec<Option<T>>,
    remaining: AtomicUsize,
    failure: Mutex<Option<EngineError>>,
}

impl<T> Future for JoinAll<T> {
    type Output = Result<Vec<T>, EngineError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // SAFETY: `JoinAll` is never constructed behind an existing
        // pin, never moved once polled, and each element is dropped
        // in place (replaced with `None`) rather than relocated — the
        // same projection argument `futures`'s `JoinAll`/`SelectAll`
        // combinators use for a `Vec` of non-`Unpin` sub-futures.
        let this = unsafe { self.get_unchecked_mut() };

        for (slot, result_slot) in this.tasks.iter_mut().zip(this.results.iter_mut()) {
            let Some(task) = slot else { continue };
            let task = unsafe { Pin::new_unchecked(task) };
            match task.poll(cx) {
                Poll::Pending => {}
                Poll::Ready(outcome) => {
                    *slot = None;
                    match outcome {
                        Ok(value) => *result_slot = Some(value),
                        Err(err) => {
                            this.failure.lock().unwrap().get_or_insert(err);
                        }
                    }
                    this.remaining.fetch_sub(1, AtomicOrdering::AcqRel);
                }
            }
        }

        if this.remaining.load(AtomicOrdering::Acquire) != 0 {
            return Poll::Pending;
        }

        if let Some(err) = this.failure.lock().unwrap().take() {
            return Poll::Ready(Err(err));
        }
        let values = this.results.iter_mut().map(|slot| slot.take().unwrap()).collect();
        Poll::Ready(Ok(values))
    }
}

/// Awaits every task in `tasks`, returning their results in the same
/// order, or the first observed failure if any task failed.
pub async fn await_all<T>(tasks: Vec<Task<T>>) -> Result<Vec<T>, EngineError> {
    let remaining = AtomicUsize::new(tasks.len());
    let results = tasks.iter().map(|_| None).collect();
    let tasks = tasks.into_iter().map(Some).collect();
    JoinAll { tasks, results, remaining, failure: Mutex::new(None) }.await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{Scheduler, SchedulerConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn await_all_collects_in_order() {
        let scheduler = Scheduler::new(SchedulerConfig::default());
        let tasks: Vec<_> = (0..5)
            .map(|i| scheduler.spawn_with_priority(move |_ctx| async move { i * 2 }, Priority::Normal))
            .collect();
        let results = futures_lite::future::block_on(await_all(tasks)).unwrap();
        assert_eq!(results, vec![0, 2, 4, 6, 8]);
        scheduler.shutdown();
    }

    #[test]
    fn await_all_propagates_the_first_failure() {
        let scheduler = Scheduler::new(SchedulerConfig::default());
        let ok_task = scheduler.spawn_with_priority(|_ctx| async { 1 }, Priority::Normal);
        let panicking_task = scheduler.spawn_with_priority(
            |_ctx| async {
                panic!("boom");
                #[allow(unreachable_code)]
                2
            },
            Priority::Normal,
        );
        let result = futures_lite::future::block_on(await_all(vec![ok_task, panicking_task]));
        assert!(result.is_err());
        scheduler.shutdown();
    }

    #[test]
    fn yield_now_changes_effective_priority() {
        let scheduler = Scheduler::new(SchedulerConfig::default());
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let task = scheduler.spawn_with_priority(
            move |ctx| async move {
                ctx.yield_now(Priority::High).await;
                c.fetch_add(1, Ordering::SeqCst);
            },
            Priority::Low,
        );
        task.get_blocking().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        scheduler.shutdown();
    }
}
