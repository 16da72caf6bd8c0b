//! Recent-activity log fed by the state stream.

use std::collections::VecDeque;

use crate::state::SystemState;

pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

/// Most recent distinct `detail` strings, newest first.
///
/// A detail is only compared with the newest entry, so `a, b, a` keeps all
/// three while `a, a` keeps one.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    entries: VecDeque<String>,
    capacity: usize,
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record the detail of `state`. Returns `true` if an entry was added.
    pub fn record(&mut self, state: &SystemState) -> bool {
        self.push(&state.detail)
    }

    pub fn push(&mut self, detail: &str) -> bool {
        if detail.is_empty() || self.capacity == 0 {
            return false;
        }
        if self.entries.front().is_some_and(|newest| newest == detail) {
            return false;
        }
        self.entries.push_front(detail.to_string());
        self.entries.truncate(self.capacity);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn newest(&self) -> Option<&str> {
        self.entries.front().map(String::as_str)
    }

    /// Entries from newest to oldest.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(log: &HistoryLog) -> Vec<&str> {
        log.iter().collect()
    }

    #[test]
    fn newest_first_with_adjacent_dedup() {
        let mut log = HistoryLog::new();
        assert!(log.push("a"));
        assert!(!log.push("a"));
        assert!(log.push("b"));
        assert!(log.push("a"));

        assert_eq!(entries(&log), vec!["a", "b", "a"]);
        assert_eq!(log.newest(), Some("a"));
    }

    #[test]
    fn empty_details_are_ignored() {
        let mut log = HistoryLog::new();
        assert!(!log.push(""));
        assert!(log.is_empty());
    }

    #[test]
    fn capped_at_twenty_dropping_oldest() {
        let mut log = HistoryLog::new();
        for index in 0..25 {
            log.push(&format!("step {index}"));
        }

        assert_eq!(log.len(), DEFAULT_HISTORY_CAPACITY);
        assert_eq!(log.newest(), Some("step 24"));
        assert_eq!(log.iter().last(), Some("step 5"));
    }

    #[test]
    fn records_state_details() {
        let mut log = HistoryLog::with_capacity(2);
        let mut state = SystemState::booting();
        assert!(log.record(&state));
        state.detail = "Listening".to_string();
        assert!(log.record(&state));
        assert!(!log.record(&state));
        state.detail = "Thinking".to_string();
        assert!(log.record(&state));

        assert_eq!(entries(&log), vec!["Thinking", "Listening"]);
    }
}
