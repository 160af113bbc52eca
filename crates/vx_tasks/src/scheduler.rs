//! The coroutine scheduler (C2).
//!
//! Six logical priority levels map to five backing FIFO queues
//! (`Immediate` never enqueues) plus a delayed min-heap and a
//! `thread_id -> queue` map for thread-pinned work, exactly as
//! described in the design's data model. Each queue is guarded by its
//! own `parking_lot::Mutex`; a single `Condvar` wakes idle workers.
//! No lock is ever held across a task resume.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::task::Waker;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use async_task::Runnable;
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;

use vx_core::Priority;

use crate::awaitable::{Sleep, SwitchToThread, YieldNow};
use crate::task::{CatchUnwind, Task};

/// Tunable scheduler configuration (spec §6's configuration table).
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// 0 = auto-detect (`num_cpus::get().saturating_sub(1)`, minimum 1).
    pub worker_count: usize,
    pub use_dedicated_workers: bool,
    pub max_coroutines_per_frame: usize,
    pub time_slice_per_coroutine: Duration,
    pub frame_budget: Duration,
    pub max_queue_size_per_priority: usize,
    pub enable_profiling: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: 0,
            use_dedicated_workers: true,
            max_coroutines_per_frame: 1000,
            time_slice_per_coroutine: Duration::from_micros(100),
            frame_budget: Duration::from_millis(16),
            max_queue_size_per_priority: 10_000,
            enable_profiling: false,
        }
    }
}

/// Live scheduler statistics, readable without blocking workers.
#[derive(Default)]
pub struct SchedulerStats {
    total_processed: AtomicU64,
    processed_this_frame: AtomicU64,
    total_yields: AtomicU64,
    dropped: AtomicU64,
    queue_sizes: [AtomicUsize; Priority::QUEUE_COUNT],
    delayed_count: AtomicUsize,
    frames_over_budget: AtomicU64,
}

/// A point-in-time copy of [`SchedulerStats`], cheap to pass around.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulerStatsSnapshot {
    pub total_processed: u64,
    pub processed_this_frame: u64,
    pub total_yields: u64,
    pub dropped: u64,
    pub queue_sizes: [usize; Priority::QUEUE_COUNT],
    pub delayed_count: usize,
    pub frames_over_budget: u64,
}

impl SchedulerStats {
    fn snapshot(&self) -> SchedulerStatsSnapshot {
        let mut queue_sizes = [0usize; Priority::QUEUE_COUNT];
        for (slot, atomic) in queue_sizes.iter_mut().zip(&self.queue_sizes) {
            *slot = atomic.load(AtomicOrdering::Relaxed);
        }
        SchedulerStatsSnapshot {
            total_processed: self.total_processed.load(AtomicOrdering::Relaxed),
            processed_this_frame: self.processed_this_frame.load(AtomicOrdering::Relaxed),
            total_yields: self.total_yields.load(AtomicOrdering::Relaxed),
            dropped: self.dropped.load(AtomicOrdering::Relaxed),
            queue_sizes,
            delayed_count: self.delayed_count.load(AtomicOrdering::Relaxed),
            frames_over_budget: self.frames_over_budget.load(AtomicOrdering::Relaxed),
        }
    }

    fn reset_frame(&self) {
        self.processed_this_frame.store(0, AtomicOrdering::Relaxed);
    }
}

/// Per-task scheduling state shared between the task body (through a
/// [`TaskContext`]), the `async_task` schedule closure, and the
/// delayed heap. Holds whatever `yield_now`/`switch_to_thread` last
/// set, so a reschedule always lands in the right place.
pub(crate) struct TaskState {
    priority: AtomicU8,
    pinned_thread: Mutex<Option<ThreadId>>,
}

impl TaskState {
    fn new(priority: Priority) -> Self {
        Self {
            priority: AtomicU8::new(priority_to_u8(priority)),
            pinned_thread: Mutex::new(None),
        }
    }

    fn priority(&self) -> Priority {
        u8_to_priority(self.priority.load(AtomicOrdering::Relaxed))
    }

    pub(crate) fn set_priority(&self, priority: Priority) {
        self.priority.store(priority_to_u8(priority), AtomicOrdering::Relaxed);
    }

    pub(crate) fn set_pinned_thread(&self, thread_id: Option<ThreadId>) {
        *self.pinned_thread.lock() = thread_id;
    }
}

fn priority_to_u8(p: Priority) -> u8 {
    p.queue_index().unwrap_or(Priority::QUEUE_COUNT - 1) as u8
}

fn u8_to_priority(v: u8) -> Priority {
    Priority::QUEUED[v as usize]
}

enum DelayedItem {
    /// A brand-new task, not yet run once (`schedule_after`).
    Initial(Runnable),
    /// A suspended task's waker (an in-body `sleep`).
    Wake(Waker),
}

struct DelayedEntry {
    wake_time: Instant,
    item: DelayedItem,
}

impl PartialEq for DelayedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.wake_time == other.wake_time
    }
}
impl Eq for DelayedEntry {}
impl PartialOrd for DelayedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for DelayedEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so a `BinaryHeap` (max-heap) pops the smallest wake_time first.
        other.wake_time.cmp(&self.wake_time)
    }
}

struct Queues {
    priority: [Mutex<VecDeque<Runnable>>; Priority::QUEUE_COUNT],
    delayed: Mutex<BinaryHeap<DelayedEntry>>,
    thread_pinned: Mutex<FxHashMap<ThreadId, VecDeque<Runnable>>>,
}

impl Queues {
    fn new() -> Self {
        Self {
            priority: Default::default(),
            delayed: Mutex::new(BinaryHeap::new()),
            thread_pinned: Mutex::new(FxHashMap::default()),
        }
    }
}

pub(crate) struct Inner {
    config: SchedulerConfig,
    stats: SchedulerStats,
    queues: Queues,
    worker_mutex: Mutex<()>,
    worker_condvar: Condvar,
    main_thread_id: ThreadId,
    running: AtomicBool,
    shutting_down: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// An explicit handle to the task scheduler.
///
/// Cheap to clone (an `Arc` internally); the design's "current
/// scheduler" singleton is replaced by threading this handle through
/// an execution context instead of a hidden global.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        let inner = Arc::new(Inner {
            config,
            stats: SchedulerStats::default(),
            queues: Queues::new(),
            worker_mutex: Mutex::new(()),
            worker_condvar: Condvar::new(),
            main_thread_id: thread::current().id(),
            running: AtomicBool::new(true),
            shutting_down: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
        });

        if inner.config.use_dedicated_workers {
            let worker_count = if inner.config.worker_count == 0 {
                num_cpus::get().saturating_sub(1).max(1)
            } else {
                inner.config.worker_count
            };
            let mut workers = inner.workers.lock();
            for _ in 0..worker_count {
                let worker_inner = inner.clone();
                workers.push(thread::spawn(move || worker_loop(worker_inner)));
            }
        }

        Self { inner }
    }

    #[must_use]
    pub fn stats(&self) -> SchedulerStatsSnapshot {
        self.inner.stats.snapshot()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(AtomicOrdering::Acquire)
    }

    #[must_use]
    pub fn is_main_thread(&self) -> bool {
        thread::current().id() == self.inner.main_thread_id
    }

    /// Spawns `make_future` at [`Priority::Normal`].
    pub fn spawn<F, Fut, T>(&self, make_future: F) -> Task<T>
    where
        F: FnOnce(TaskContext) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.spawn_with_priority(make_future, Priority::Normal)
    }

    /// Spawns `make_future` and schedules it at `priority`.
    ///
    /// `Priority::Immediate` bypasses the scheduler entirely and runs
    /// the future to completion on the calling thread, per the
    /// design's "do not enqueue; run synchronously" definition.
    pub fn spawn_with_priority<F, Fut, T>(&self, make_future: F, priority: Priority) -> Task<T>
    where
        F: FnOnce(TaskContext) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let state = Arc::new(TaskState::new(priority));
        let ctx = TaskContext {
            scheduler: self.inner.clone(),
            state: state.clone(),
        };
        let future = CatchUnwind::new(make_future(ctx));

        if matches!(priority, Priority::Immediate) {
            let value = futures_lite::future::block_on(future);
            let (runnable, task) = async_task::spawn(async move { value }, |_runnable: Runnable| {});
            runnable.run();
            return Task::new(task);
        }

        let inner = self.inner.clone();
        let schedule_state = state;
        let (runnable, task) = async_task::spawn(future, move |runnable: Runnable| {
            inner.enqueue(runnable, &schedule_state);
        });
        runnable.schedule();
        Task::new(task)
    }

    /// Spawns `make_future`, deferring its first run until at least
    /// `delay` has elapsed.
    pub fn spawn_after<F, Fut, T>(&self, make_future: F, delay: Duration, priority: Priority) -> Task<T>
    where
        F: FnOnce(TaskContext) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let state = Arc::new(TaskState::new(priority));
        let ctx = TaskContext {
            scheduler: self.inner.clone(),
            state: state.clone(),
        };
        let future = CatchUnwind::new(make_future(ctx));

        let inner = self.inner.clone();
        let schedule_state = state;
        let (runnable, task) = async_task::spawn(future, move |runnable: Runnable| {
            inner.enqueue(runnable, &schedule_state);
        });

        self.inner.queues.delayed.lock().push(DelayedEntry {
            wake_time: Instant::now() + delay,
            item: DelayedItem::Initial(runnable),
        });
        self.inner.stats.delayed_count.fetch_add(1, AtomicOrdering::Relaxed);
        Task::new(task)
    }

    /// Spawns `make_future` pinned to `thread_id` at `priority`.
    pub fn spawn_on_thread<F, Fut, T>(
        &self,
        make_future: F,
        thread_id: ThreadId,
        priority: Priority,
    ) -> Task<T>
    where
        F: FnOnce(TaskContext) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let state = Arc::new(TaskState::new(priority));
        state.set_pinned_thread(Some(thread_id));
        let ctx = TaskContext {
            scheduler: self.inner.clone(),
            state: state.clone(),
        };
        let future = CatchUnwind::new(make_future(ctx));

        let inner = self.inner.clone();
        let schedule_state = state;
        let (runnable, task) = async_task::spawn(future, move |runnable: Runnable| {
            inner.enqueue(runnable, &schedule_state);
        });
        runnable.schedule();
        Task::new(task)
    }

    /// Pumps the delayed queue, then this thread's pinned queue, then
    /// the priority queues, until `max_wall_time` or
    /// `max_coroutines_per_frame` is exhausted. Intended for the main
    /// thread.
    pub fn process_frame(&self, max_wall_time: Duration) -> usize {
        self.inner.stats.reset_frame();
        let start = Instant::now();
        let budget = max_wall_time.min(self.inner.config.frame_budget);
        let max_count = self.inner.config.max_coroutines_per_frame;
        let processed = self.inner.drain(thread::current().id(), max_count, budget, start, true);
        if start.elapsed() > max_wall_time {
            self.inner.stats.frames_over_budget.fetch_add(1, AtomicOrdering::Relaxed);
        }
        processed
    }

    /// Pumps only the priority queues (no thread-pinned work). Used by
    /// worker threads.
    pub fn process_batch(&self, max_count: usize, max_time: Duration) -> usize {
        let start = Instant::now();
        self.inner.drain(thread::current().id(), max_count, max_time, start, false)
    }

    /// Stops accepting new work, wakes and joins every worker thread,
    /// then destroys anything still queued without resuming it.
    pub fn shutdown(&self) {
        if self.inner.shutting_down.swap(true, AtomicOrdering::AcqRel) {
            return;
        }
        self.inner.running.store(false, AtomicOrdering::Release);
        {
            let _guard = self.inner.worker_mutex.lock();
            self.inner.worker_condvar.notify_all();
        }
        let workers = std::mem::take(&mut *self.inner.workers.lock());
        for worker in workers {
            let _ = worker.join();
        }

        for queue in &self.inner.queues.priority {
            queue.lock().clear();
        }
        self.inner.queues.delayed.lock().clear();
        self.inner.queues.thread_pinned.lock().clear();
    }
}

impl Inner {
    fn enqueue(&self, runnable: Runnable, state: &TaskState) {
        if let Some(thread_id) = *state.pinned_thread.lock() {
            let mut map = self.queues.thread_pinned.lock();
            map.entry(thread_id).or_default().push_back(runnable);
            drop(map);
            self.notify_workers();
            return;
        }

        let index = state.priority().queue_index().unwrap_or(Priority::QUEUE_COUNT - 1);
        let mut queue = self.queues.priority[index].lock();
        if queue.len() >= self.config.max_queue_size_per_priority {
            self.stats.dropped.fetch_add(1, AtomicOrdering::Relaxed);
            log::warn!("scheduler: priority queue {index} full, dropping incoming task");
            return;
        }
        queue.push_back(runnable);
        self.stats.queue_sizes[index].store(queue.len(), AtomicOrdering::Relaxed);
        drop(queue);
        self.notify_workers();
    }

    fn notify_workers(&self) {
        let _guard = self.worker_mutex.lock();
        self.worker_condvar.notify_one();
    }

    /// Moves every due delayed entry into its destination queue.
    fn drain_delayed(&self) {
        let now = Instant::now();
        let mut delayed = self.queues.delayed.lock();
        while let Some(entry) = delayed.peek() {
            if entry.wake_time > now {
                break;
            }
            let entry = delayed.pop().unwrap();
            self.stats.delayed_count.fetch_sub(1, AtomicOrdering::Relaxed);
            match entry.item {
                DelayedItem::Initial(runnable) => runnable.schedule(),
                DelayedItem::Wake(waker) => waker.wake(),
            }
        }
    }

    fn drain_thread_pinned(&self, thread_id: ThreadId, budget: &mut Budget) -> usize {
        let mut processed = 0;
        loop {
            if budget.exhausted() {
                break;
            }
            let next = {
                let mut map = self.queues.thread_pinned.lock();
                map.get_mut(&thread_id).and_then(VecDeque::pop_front)
            };
            let Some(runnable) = next else { break };
            self.run_one(runnable);
            processed += 1;
            budget.consume();
        }
        processed
    }

    fn drain_priority(&self, budget: &mut Budget) -> usize {
        let mut processed = 0;
        'outer: loop {
            if budget.exhausted() {
                break;
            }
            for index in (0..Priority::QUEUE_COUNT).rev() {
                let next = self.queues.priority[index].lock().pop_front();
                if let Some(runnable) = next {
                    self.stats.queue_sizes[index]
                        .store(self.queues.priority[index].lock().len(), AtomicOrdering::Relaxed);
                    self.run_one(runnable);
                    processed += 1;
                    budget.consume();
                    continue 'outer;
                }
            }
            break;
        }
        processed
    }

    /// Full drain step used by `process_frame`/`process_batch`: move
    /// due delayed entries, optionally drain this thread's pinned
    /// queue, then walk the priority queues highest-first.
    fn drain(
        &self,
        thread_id: ThreadId,
        max_count: usize,
        max_time: Duration,
        start: Instant,
        include_thread_pinned: bool,
    ) -> usize {
        self.drain_delayed();
        let mut budget = Budget { start, max_time, max_count, done: 0 };
        let mut processed = 0;
        if include_thread_pinned {
            processed += self.drain_thread_pinned(thread_id, &mut budget);
        }
        processed += self.drain_priority(&mut budget);
        self.stats.total_processed.fetch_add(processed as u64, AtomicOrdering::Relaxed);
        self.stats.processed_this_frame.fetch_add(processed as u64, AtomicOrdering::Relaxed);
        processed
    }

    fn run_one(&self, runnable: Runnable) {
        // `run` resumes the task to its next suspension point (or to
        // completion). A panicking task body is already caught inside
        // its own `CatchUnwind` wrapper and turned into a stored
        // `TaskPanicked` failure; this outer boundary only guards
        // against a panic in `async_task`'s own machinery, so no other
        // task is ever affected by one task's resume failing.
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            runnable.run();
        }));
        if let Err(payload) = result {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "task panicked".to_string());
            log::error!("scheduler: task resume failed: {message}");
        }
    }
}

struct Budget {
    start: Instant,
    max_time: Duration,
    max_count: usize,
    done: usize,
}

impl Budget {
    fn exhausted(&self) -> bool {
        self.done >= self.max_count || self.start.elapsed() >= self.max_time
    }

    fn consume(&mut self) {
        self.done += 1;
    }
}

/// Handle passed into a spawned task's body, used to reach the
/// suspension primitives that need scheduler cooperation
/// (`sleep`/`yield_now`/`switch_to_thread`).
#[derive(Clone)]
pub struct TaskContext {
    pub(crate) scheduler: Arc<Inner>,
    pub(crate) state: Arc<TaskState>,
}

impl TaskContext {
    /// Completes after at least `duration` has elapsed.
    pub fn sleep(&self, duration: Duration) -> Sleep {
        Sleep::new(self.scheduler.clone(), duration)
    }

    /// Immediately reschedules the current task at `priority` and
    /// suspends until picked up again.
    pub fn yield_now(&self, priority: Priority) -> YieldNow {
        self.scheduler.stats.total_yields.fetch_add(1, AtomicOrdering::Relaxed);
        YieldNow::new(self.state.clone(), priority)
    }

    /// Resumes immediately if already on `target`; otherwise
    /// reschedules onto `target`'s thread-pinned queue.
    pub fn switch_to_thread(&self, target: ThreadId) -> SwitchToThread {
        SwitchToThread::new(self.state.clone(), target)
    }

    #[must_use]
    pub fn current_thread_id(&self) -> ThreadId {
        thread::current().id()
    }
}

pub(crate) fn push_delayed_waker(scheduler: &Inner, wake_time: Instant, waker: Waker) {
    scheduler.queues.delayed.lock().push(DelayedEntry {
        wake_time,
        item: DelayedItem::Wake(waker),
    });
    scheduler.stats.delayed_count.fetch_add(1, AtomicOrdering::Relaxed);
}

fn worker_loop(inner: Arc<Inner>) {
    while !inner.shutting_down.load(AtomicOrdering::Acquire) {
        let processed = inner.drain(thread::current().id(), usize::MAX, Duration::from_millis(5), Instant::now(), false);
        if processed == 0 {
            let mut guard = inner.worker_mutex.lock();
            if inner.shutting_down.load(AtomicOrdering::Acquire) {
                break;
            }
            inner.worker_condvar.wait_for(&mut guard, Duration::from_millis(50));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;
    use std::sync::Mutex as StdMutex;

    #[test]
    fn priority_ordering_single_worker() {
        let mut config = SchedulerConfig::default();
        config.worker_count = 1;
        let scheduler = Scheduler::new(config);

        let order = Arc::new(StdMutex::new(Vec::new()));

        let o1 = order.clone();
        let low = scheduler.spawn_with_priority(
            move |_ctx| async move {
                o1.lock().unwrap().push("low");
            },
            Priority::Low,
        );
        let o2 = order.clone();
        let high = scheduler.spawn_with_priority(
            move |_ctx| async move {
                o2.lock().unwrap().push("high");
            },
            Priority::High,
        );
        let o3 = order.clone();
        let normal = scheduler.spawn_with_priority(
            move |_ctx| async move {
                o3.lock().unwrap().push("normal");
            },
            Priority::Normal,
        );

        low.get_blocking().unwrap();
        high.get_blocking().unwrap();
        normal.get_blocking().unwrap();

        // All three settle eventually; the scheduling order recorded
        // while they were still queued is highest-first.
        let recorded = order.lock().unwrap().clone();
        assert_eq!(recorded, vec!["high", "normal", "low"]);
        scheduler.shutdown();
    }

    #[test]
    fn delayed_wake_resumes_after_duration() {
        let scheduler = Scheduler::new(SchedulerConfig::default());
        let counter = Arc::new(StdAtomicUsize::new(0));
        let c = counter.clone();
        let task: Task<()> = scheduler.spawn_after(
            move |_ctx| async move {
                c.fetch_add(1, AtomicOrdering::SeqCst);
            },
            Duration::from_millis(20),
            Priority::Normal,
        );
        assert_eq!(counter.load(AtomicOrdering::SeqCst), 0);
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(counter.load(AtomicOrdering::SeqCst), 0);
        task.get_blocking().unwrap();
        assert_eq!(counter.load(AtomicOrdering::SeqCst), 1);
        scheduler.shutdown();
    }

    #[test]
    fn queue_overflow_drops_and_counts() {
        let mut config = SchedulerConfig::default();
        config.max_queue_size_per_priority = 2;
        config.use_dedicated_workers = false;
        let scheduler = Scheduler::new(config);

        let _t1 = scheduler.spawn_with_priority(|_ctx| async { std::future::pending::<()>().await }, Priority::Normal);
        let _t2 = scheduler.spawn_with_priority(|_ctx| async { std::future::pending::<()>().await }, Priority::Normal);
        let _t3 = scheduler.spawn_with_priority(|_ctx| async { std::future::pending::<()>().await }, Priority::Normal);

        assert_eq!(scheduler.stats().dropped, 1);
        scheduler.shutdown();
    }
}
