/*!
Bounded history of executed commands, kept for display only.
*/

use std::collections::VecDeque;

/// Number of entries retained in the history
pub const COMMAND_LOG_CAPACITY: usize = 30;

/// Fixed-capacity command history that evicts the oldest entry when full.
///
/// An entry identical to the most recent one is not stored again, so a
/// client polling the same command does not flush the history.
#[derive(Debug, Clone)]
pub struct CommandLog {
    entries: VecDeque<String>,
    capacity: usize,
}

impl CommandLog {
    /// Create an empty log with the given capacity
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "CommandLog capacity must be greater than 0");
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an entry unless it repeats the previous one.
    ///
    /// Returns true if the entry was stored.
    pub fn push(&mut self, entry: impl Into<String>) -> bool {
        let entry = entry.into();
        if self.entries.back() == Some(&entry) {
            return false;
        }
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
        true
    }

    /// The newest `n` entries, oldest first
    pub fn tail(&self, n: usize) -> Vec<String> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }
}

#[cfg(test)]
impl CommandLog {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most recent entry
    pub fn last(&self) -> Option<&str> {
        self.entries.back().map(String::as_str)
    }

    /// Entries from oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}

impl Default for CommandLog {
    fn default() -> Self {
        Self::with_capacity(COMMAND_LOG_CAPACITY)
    }
}
