//! Scheduling priority.

/// Scheduling priority, ordered highest-first.
///
/// `Immediate` is special: it means "do not enqueue, run synchronously
/// on the caller" and is never stored in a scheduler queue. The
/// remaining five levels each map to one of the scheduler's FIFO
/// queues (see `vx_tasks::scheduler`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Priority {
    /// Lowest priority; picked up only when nothing else is runnable.
    Idle,
    Low,
    Normal,
    High,
    Critical,
    /// Run synchronously on the calling thread; never queued.
    Immediate,
}

impl Priority {
    /// The priorities that are actually backed by a scheduler queue,
    /// ordered from lowest index (Idle) to highest (Critical).
    pub const QUEUED: [Priority; 5] = [
        Priority::Idle,
        Priority::Low,
        Priority::Normal,
        Priority::High,
        Priority::Critical,
    ];

    /// Number of queued priority levels (excludes `Immediate`).
    pub const QUEUE_COUNT: usize = Self::QUEUED.len();

    /// Index into a `[T; Priority::QUEUE_COUNT]` array of per-priority
    /// state, or `None` for `Immediate` which has no backing queue.
    #[must_use]
    pub fn queue_index(self) -> Option<usize> {
        match self {
            Priority::Idle => Some(0),
            Priority::Low => Some(1),
            Priority::Normal => Some(2),
            Priority::High => Some(3),
            Priority::Critical => Some(4),
            Priority::Immediate => None,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_highest_first_by_variant_value() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
        assert!(Priority::Low > Priority::Idle);
        assert!(Priority::Immediate > Priority::Critical);
    }

    #[test]
    fn queue_index_excludes_immediate() {
        assert_eq!(Priority::Immediate.queue_index(), None);
        assert_eq!(Priority::Idle.queue_index(), Some(0));
        assert_eq!(Priority::Critical.queue_index(), Some(4));
    }
}
