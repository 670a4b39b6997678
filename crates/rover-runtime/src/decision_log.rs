//! [`DecisionLog`] – bounded, append-only decision history.
//!
//! Keeps the last *capacity* [`Decision`]s in insertion order.  Once full,
//! every new record evicts the oldest one (FIFO).  There is no removal and no
//! reordering; a log lives exactly as long as one autopilot run.
//!
//! ```rust
//! use rover_runtime::decision_log::DecisionLog;
//! use rover_types::{Command, Decision};
//!
//! let mut log = DecisionLog::new(2);
//! log.record(Decision::command(Command::Forward, "clear"));
//! log.record(Decision::command(Command::Left, "wall"));
//! log.record(Decision::error("timeout"));
//!
//! assert_eq!(log.len(), 2);
//! assert_eq!(log.recent(1)[0].reason, "timeout");
//! ```

use std::collections::VecDeque;

use rover_types::Decision;

/// Entries retained per run.
pub const DEFAULT_CAPACITY: usize = 20;

/// Entries exposed in a status snapshot.
pub const DEFAULT_STATUS_WINDOW: usize = 10;

#[derive(Debug, Clone)]
pub struct DecisionLog {
    capacity: usize,
    entries: VecDeque<Decision>,
}

impl DecisionLog {
    /// Create an empty log.  A `capacity` of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Append `decision`, evicting the oldest entry when over capacity.
    pub fn record(&mut self, decision: Decision) {
        self.entries.push_back(decision);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// The last `n` entries, oldest of the window first.
    pub fn recent(&self, n: usize) -> Vec<Decision> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for DecisionLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_types::Command;

    fn numbered(i: usize) -> Decision {
        Decision::command(Command::Forward, format!("#{i}"))
    }

    fn reasons(entries: &[Decision]) -> Vec<String> {
        entries.iter().map(|d| d.reason.clone()).collect()
    }

    #[test]
    fn starts_empty() {
        let log = DecisionLog::default();
        assert!(log.is_empty());
        assert_eq!(log.capacity(), DEFAULT_CAPACITY);
        assert!(log.recent(DEFAULT_STATUS_WINDOW).is_empty());
    }

    #[test]
    fn keeps_last_capacity_entries_in_order() {
        let mut log = DecisionLog::new(20);
        for i in 0..25 {
            log.record(numbered(i));
        }
        assert_eq!(log.len(), 20);
        let all = log.recent(usize::MAX);
        let expected: Vec<String> = (5..25).map(|i| format!("#{i}")).collect();
        assert_eq!(reasons(&all), expected);
    }

    #[test]
    fn recent_returns_newest_window_oldest_first() {
        let mut log = DecisionLog::new(20);
        for i in 0..15 {
            log.record(numbered(i));
        }
        let window = log.recent(10);
        let expected: Vec<String> = (5..15).map(|i| format!("#{i}")).collect();
        assert_eq!(reasons(&window), expected);
    }

    #[test]
    fn recent_larger_than_len_returns_everything() {
        let mut log = DecisionLog::new(5);
        log.record(numbered(0));
        log.record(numbered(1));
        assert_eq!(reasons(&log.recent(10)), vec!["#0", "#1"]);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let mut log = DecisionLog::new(0);
        log.record(numbered(0));
        log.record(numbered(1));
        assert_eq!(log.len(), 1);
        assert_eq!(reasons(&log.recent(1)), vec!["#1"]);
    }

    #[test]
    fn error_and_command_entries_share_the_log() {
        let mut log = DecisionLog::new(3);
        log.record(Decision::error("no reply"));
        log.record(numbered(1));
        let entries = log.recent(2);
        assert!(entries[0].is_error());
        assert_eq!(entries[1].as_command(), Some(Command::Forward));
    }
}
