//! Majority-vote smoothing of the per-frame classifier output
//!
//! The classifier is noisy frame to frame. The smoother keeps the last N
//! votes, picks the majority class and only accepts a new stable class when
//! the majority is strong enough and the previous change is older than the
//! debounce interval.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::FlowConfig;
use crate::error::CLASS_COUNT;

use super::sample::{ClassificationSample, PresenceClass};

/// Votes per class over the current buffer, indexed by class id - 1
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCounts([usize; CLASS_COUNT]);

impl VoteCounts {
    pub fn get(&self, class: PresenceClass) -> usize {
        self.0[class.index()]
    }
}

/// Outcome of feeding one vote into the smoother
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothingResult {
    /// Debounced class after this vote
    pub stable_class: PresenceClass,
    /// True when this vote changed the stable class
    pub changed: bool,
    /// Majority count divided by buffer length
    pub confidence_ratio: f64,
    pub vote_counts: VoteCounts,
}

/// Debounced majority voter over a bounded prediction buffer
pub struct SignalSmoother {
    buffer: VecDeque<PresenceClass>,
    capacity: usize,
    majority_threshold: f64,
    min_confidence: f32,
    debounce: Duration,
    stable: PresenceClass,
    last_change_at: Option<Instant>,
}

impl SignalSmoother {
    pub fn new(config: &FlowConfig) -> Self {
        let capacity = config.prediction_buffer_size.max(1);
        Self {
            buffer: VecDeque::with_capacity(capacity + 1),
            capacity,
            majority_threshold: config.majority_threshold,
            min_confidence: config.min_confidence_threshold,
            debounce: config.state_debounce(),
            stable: PresenceClass::default(),
            last_change_at: None,
        }
    }

    /// Current debounced class
    #[cfg(test)]
    pub fn stable_class(&self) -> PresenceClass {
        self.stable
    }

    /// Number of votes currently buffered
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Feed one classifier sample
    ///
    /// Samples below the minimum confidence vote for the current stable
    /// class instead of their own.
    pub fn ingest(&mut self, sample: ClassificationSample, now: Instant) -> SmoothingResult {
        let class = if sample.confidence < self.min_confidence {
            debug!(
                class = %sample.class,
                confidence = sample.confidence,
                "low-confidence sample, voting for stable class"
            );
            self.stable
        } else {
            sample.class
        };
        self.vote(class, now)
    }

    /// Record a status-quo vote for a tick without usable input
    pub fn hold(&mut self, now: Instant) -> SmoothingResult {
        self.vote(self.stable, now)
    }

    /// Drop all votes and return to the empty class
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.stable = PresenceClass::default();
        self.last_change_at = None;
    }

    fn vote(&mut self, class: PresenceClass, now: Instant) -> SmoothingResult {
        self.buffer.push_back(class);
        while self.buffer.len() > self.capacity {
            self.buffer.pop_front();
        }

        let vote_counts = self.count_votes();
        let (majority, majority_count) = self.majority(&vote_counts);
        let confidence_ratio = majority_count as f64 / self.buffer.len() as f64;

        let debounced = self
            .last_change_at
            .map_or(true, |at| now.saturating_duration_since(at) > self.debounce);

        let changed = majority != self.stable
            && confidence_ratio >= self.majority_threshold
            && debounced;

        if changed {
            info!(
                from = %self.stable,
                to = %majority,
                confidence_ratio,
                "stable class changed"
            );
            self.stable = majority;
            self.last_change_at = Some(now);
        }

        SmoothingResult {
            stable_class: self.stable,
            changed,
            confidence_ratio,
            vote_counts,
        }
    }

    fn count_votes(&self) -> VoteCounts {
        let mut counts = [0usize; CLASS_COUNT];
        for class in &self.buffer {
            counts[class.index()] += 1;
        }
        VoteCounts(counts)
    }

    /// Highest count wins; ties keep the stable class when it is tied,
    /// otherwise the lowest class id
    fn majority(&self, counts: &VoteCounts) -> (PresenceClass, usize) {
        let best = PresenceClass::ALL
            .iter()
            .map(|class| counts.get(*class))
            .max()
            .unwrap_or(0);

        if counts.get(self.stable) == best {
            return (self.stable, best);
        }

        let winner = PresenceClass::ALL
            .into_iter()
            .find(|class| counts.get(*class) == best)
            .unwrap_or(self.stable);
        (winner, best)
    }
}
