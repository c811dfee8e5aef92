//! Cooperative scheduler.
//!
//! A priority queue of `(due-time, action)` pairs drained by a
//! single-threaded loop: pop the earliest action, sleep until it is due,
//! invoke it. Actions receive the scheduler so they can schedule follow-ups,
//! which is how polling loops and keep-alive timers sustain themselves.
//! The loop ends when the queue runs dry.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

type Action = Box<dyn FnOnce(&mut Scheduler)>;

struct Entry {
    due: Instant,
    sequence: u64,
    action: Action,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.sequence == other.sequence
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // BinaryHeap is a max-heap; reverse so the earliest due time (then the
    // earliest insertion) pops first.
    fn cmp(&self, other: &Self) -> Ordering {
        (other.due, other.sequence).cmp(&(self.due, self.sequence))
    }
}

/// The single-threaded event loop.
pub struct Scheduler {
    queue: BinaryHeap<Entry>,
    sequence: u64,
    started: Instant,
    idle: Duration,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Creates an empty scheduler.
    pub fn new() -> Self {
        Self {
            queue: BinaryHeap::new(),
            sequence: 0,
            started: Instant::now(),
            idle: Duration::ZERO,
        }
    }

    /// Schedules `action` to run after `delay`. Actions due at the same
    /// instant run in the order they were scheduled.
    pub fn set_timeout(&mut self, delay: Duration, action: impl FnOnce(&mut Scheduler) + 'static) {
        let sequence = self.sequence;
        self.sequence += 1;
        self.queue.push(Entry {
            due: Instant::now() + delay,
            sequence,
            action: Box::new(action),
        });
    }

    /// Schedules `action` to run as soon as the loop is free.
    pub fn invoke(&mut self, action: impl FnOnce(&mut Scheduler) + 'static) {
        self.set_timeout(Duration::ZERO, action);
    }

    /// Runs scheduled actions until none remain, sleeping while the next
    /// one is not yet due.
    pub fn run(&mut self) {
        while let Some(entry) = self.queue.pop() {
            let now = Instant::now();
            if entry.due > now {
                let wait = entry.due - now;
                std::thread::sleep(wait);
                self.idle += wait;
            }
            (entry.action)(self);
        }
    }

    /// The busy fraction of wall time since the scheduler was created:
    /// zero means fully idle, one fully busy.
    pub fn utilization(&self) -> f64 {
        let wall = self.started.elapsed();
        if wall.is_zero() {
            return 0.0;
        }
        (wall.saturating_sub(self.idle)).as_secs_f64() / wall.as_secs_f64()
    }
}
