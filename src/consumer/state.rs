//! Accumulation state machine behind `get_items`.
//!
//! The poll loop is driven entirely by [`BatchProgress::state_at`], so the
//! boundary behaviour (full batch, expired budget, first read) can be tested
//! without a broker or a clock.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

/// Where a batch currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// More entries are wanted and the budget is not spent.
    Accumulating,
    /// The wall-clock budget ran out before the batch filled up.
    DeadlineExceeded,
    /// The consumer owns at least `batch_size` entries.
    Satisfied,
}

impl BatchState {
    /// Returns whether the poll loop should stop.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BatchState::Accumulating)
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchState::Accumulating => write!(f, "accumulating"),
            BatchState::DeadlineExceeded => write!(f, "deadline_exceeded"),
            BatchState::Satisfied => write!(f, "satisfied"),
        }
    }
}

/// Progress of one batch assembly.
#[derive(Debug, Clone)]
pub struct BatchProgress {
    batch_size: usize,
    assigned: usize,
    hard_stop: Instant,
    reads: u32,
}

impl BatchProgress {
    /// Starts a batch at `started` with a budget of `max_wait`.
    ///
    /// `already_assigned` is the number of entries the consumer still owns
    /// from earlier batches; they count toward this one.
    pub fn start(
        batch_size: usize,
        already_assigned: usize,
        started: Instant,
        max_wait: Duration,
    ) -> Self {
        Self {
            batch_size: batch_size.max(1),
            assigned: already_assigned,
            hard_stop: started + max_wait,
            reads: 0,
        }
    }

    /// Evaluates the state at `now`.
    ///
    /// A full batch wins over an expired budget. The budget is only checked
    /// after the first read attempt, so a zero budget still reads once.
    pub fn state_at(&self, now: Instant) -> BatchState {
        if self.assigned >= self.batch_size {
            BatchState::Satisfied
        } else if self.reads > 0 && now > self.hard_stop {
            BatchState::DeadlineExceeded
        } else {
            BatchState::Accumulating
        }
    }

    /// Records the outcome of a read attempt. Failed reads count as zero
    /// received entries.
    pub fn record_read(&mut self, received: usize) {
        self.reads = self.reads.saturating_add(1);
        self.assigned = self.assigned.saturating_add(received);
    }

    /// Number of entries the next read should ask for.
    pub fn requested(&self) -> usize {
        self.batch_size.saturating_sub(self.assigned).max(1)
    }

    /// Time left before the deadline.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.hard_stop.saturating_duration_since(now)
    }

    /// Entries the consumer owns so far.
    pub fn assigned(&self) -> usize {
        self.assigned
    }

    /// Read attempts made so far.
    pub fn reads(&self) -> u32 {
        self.reads
    }

    /// Target size of the batch.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_accumulating() {
        let now = Instant::now();
        let progress = BatchProgress::start(3, 0, now, Duration::from_millis(100));

        assert_eq!(progress.state_at(now), BatchState::Accumulating);
        assert_eq!(progress.requested(), 3);
    }

    #[test]
    fn test_already_assigned_counts() {
        let now = Instant::now();
        let progress = BatchProgress::start(2, 2, now, Duration::from_millis(100));

        assert_eq!(progress.state_at(now), BatchState::Satisfied);
        assert_eq!(progress.reads(), 0);
    }

    #[test]
    fn test_satisfied_after_reads() {
        let now = Instant::now();
        let mut progress = BatchProgress::start(3, 1, now, Duration::from_millis(100));

        progress.record_read(1);
        assert_eq!(progress.state_at(now), BatchState::Accumulating);
        assert_eq!(progress.requested(), 1);

        progress.record_read(1);
        assert_eq!(progress.state_at(now), BatchState::Satisfied);
    }

    #[test]
    fn test_deadline_only_after_first_read() {
        let now = Instant::now();
        let mut progress = BatchProgress::start(2, 0, now, Duration::ZERO);
        let later = now + Duration::from_millis(5);

        assert_eq!(progress.state_at(later), BatchState::Accumulating);
        progress.record_read(0);
        assert_eq!(progress.state_at(later), BatchState::DeadlineExceeded);
    }

    #[test]
    fn test_deadline_boundary_is_inclusive() {
        let now = Instant::now();
        let budget = Duration::from_millis(50);
        let mut progress = BatchProgress::start(2, 0, now, budget);
        progress.record_read(0);

        assert_eq!(progress.state_at(now + budget), BatchState::Accumulating);
        assert_eq!(
            progress.state_at(now + budget + Duration::from_millis(1)),
            BatchState::DeadlineExceeded
        );
    }

    #[test]
    fn test_full_batch_beats_deadline() {
        let now = Instant::now();
        let mut progress = BatchProgress::start(1, 0, now, Duration::ZERO);
        progress.record_read(1);

        assert_eq!(
            progress.state_at(now + Duration::from_secs(1)),
            BatchState::Satisfied
        );
    }

    #[test]
    fn test_requested_never_zero() {
        let now = Instant::now();
        let progress = BatchProgress::start(2, 5, now, Duration::ZERO);
        assert_eq!(progress.requested(), 1);
        assert_eq!(BatchProgress::start(0, 0, now, Duration::ZERO).batch_size(), 1);
    }

    #[test]
    fn test_remaining_saturates() {
        let now = Instant::now();
        let progress = BatchProgress::start(2, 0, now, Duration::from_millis(10));
        assert_eq!(progress.remaining(now), Duration::from_millis(10));
        assert_eq!(
            progress.remaining(now + Duration::from_secs(1)),
            Duration::ZERO
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(!BatchState::Accumulating.is_terminal());
        assert!(BatchState::DeadlineExceeded.is_terminal());
        assert!(BatchState::Satisfied.is_terminal());
        assert_eq!(BatchState::DeadlineExceeded.to_string(), "deadline_exceeded");
    }
}
