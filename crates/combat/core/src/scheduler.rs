//! Deadline-ordered timer queue for deferred work.
//!
//! Timers cannot be retracted. Each task carries enough identity (a
//! generation or a never-reused id) for its handler to detect that the state
//! it was scheduled for is gone, in which case firing it is a no-op.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::ability::ChainId;
use crate::condition::ConditionId;
use crate::entity::EntityId;
use crate::stats::ModifierId;
use crate::time::Timestamp;

/// Deferred work item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TimerTask {
    /// Remove a timed stat modifier. Modifier ids are never reused.
    ExpireModifier {
        entity: EntityId,
        modifier: ModifierId,
    },
    /// Backstop expiry for a condition instance.
    ExpireCondition {
        entity: EntityId,
        condition: ConditionId,
        generation: u64,
    },
    /// Periodic cast progress notification.
    CastProgress { entity: EntityId, generation: u64 },
    /// Cast time elapsed.
    CastComplete { entity: EntityId, generation: u64 },
    /// Chain window closed.
    ChainTimeout {
        entity: EntityId,
        chain: ChainId,
        generation: u64,
    },
}

/// Handle identifying a scheduled timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerHandle(pub u64);

#[derive(Debug)]
struct Scheduled {
    deadline: Timestamp,
    handle: TimerHandle,
    task: TimerTask,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.handle == other.handle
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    // Reversed so the max-heap pops the earliest deadline first, FIFO on ties.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.handle.cmp(&self.handle))
    }
}

/// Min-heap of timers keyed by `(deadline, scheduling order)`.
#[derive(Debug, Default)]
pub struct TimerQueue {
    heap: BinaryHeap<Scheduled>,
    next_handle: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `task` to fire once `deadline` is reached.
    pub fn schedule(&mut self, deadline: Timestamp, task: TimerTask) -> TimerHandle {
        self.next_handle += 1;
        let handle = TimerHandle(self.next_handle);
        self.heap.push(Scheduled {
            deadline,
            handle,
            task,
        });
        handle
    }

    /// Pops the earliest timer whose deadline is at or before `now`.
    pub fn pop_due(&mut self, now: Timestamp) -> Option<(Timestamp, TimerTask)> {
        if self.heap.peek()?.deadline > now {
            return None;
        }
        self.heap.pop().map(|s| (s.deadline, s.task))
    }

    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.heap.peek().map(|s| s.deadline)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
