//! Session-wide record keys for cross-source deduplication.

use std::collections::HashSet;

/// Keys of every record admitted during one session, across all sources.
#[derive(Debug, Default)]
pub struct SeenSet {
    keys: HashSet<String>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `key` and report whether it was new. Blank keys are never admitted.
    pub fn admit(&mut self, key: &str) -> bool {
        let key = key.trim();
        if key.is_empty() {
            return false;
        }
        self.keys.insert(key.to_string())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }
}
