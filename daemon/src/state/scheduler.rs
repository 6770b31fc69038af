//! One-shot timers guarded by the state that armed them
//!
//! Timers are not callbacks: the owner polls `next_due` on its own timeline
//! and gets the action back. A timer only fires if the owner is still in the
//! guard state and no `cancel_all` happened since it was armed.

use std::time::{Duration, Instant};

use tracing::debug;

#[derive(Debug)]
struct Pending<S, A> {
    id: u64,
    deadline: Instant,
    guard: S,
    generation: u64,
    action: A,
}

#[derive(Debug)]
pub struct Scheduler<S, A> {
    generation: u64,
    next_id: u64,
    pending: Vec<Pending<S, A>>,
}

impl<S, A> Scheduler<S, A>
where
    S: Copy + PartialEq + std::fmt::Debug,
{
    pub fn new() -> Self {
        Self {
            generation: 0,
            next_id: 0,
            pending: Vec::new(),
        }
    }

    /// Arm a timer that yields `action` once `after` has elapsed, if the
    /// owner is still in `guard` by then
    pub fn schedule_once(&mut self, now: Instant, after: Duration, guard: S, action: A) {
        let id = self.next_id;
        self.next_id += 1;

        self.pending.push(Pending {
            id,
            deadline: now + after,
            guard,
            generation: self.generation,
            action,
        });

        debug!(id, ?guard, after_ms = after.as_millis() as u64, "timer armed");
    }

    /// Disarm everything armed before this call
    pub fn cancel_all(&mut self) {
        self.generation += 1;
        self.pending.clear();
    }

    /// Pop the earliest timer whose deadline has passed
    ///
    /// Due timers whose guard no longer matches `current` are discarded.
    pub fn next_due(&mut self, current: S, now: Instant) -> Option<A> {
        loop {
            let index = self
                .pending
                .iter()
                .enumerate()
                .filter(|(_, t)| t.deadline <= now)
                .min_by_key(|(_, t)| t.deadline)
                .map(|(i, _)| i)?;

            let timer = self.pending.swap_remove(index);
            if timer.guard == current && timer.generation == self.generation {
                debug!(id = timer.id, guard = ?timer.guard, "timer fired");
                return Some(timer.action);
            }

            debug!(id = timer.id, guard = ?timer.guard, ?current, "stale timer dropped");
        }
    }

    /// Number of armed timers
    #[cfg(test)]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl<S, A> Default for Scheduler<S, A>
where
    S: Copy + PartialEq + std::fmt::Debug,
{
    fn default() -> Self {
        Self::new()
    }
}
