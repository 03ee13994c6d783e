//! Bounded sink for "soft" failures that spec.md says to record rather than
//! raise: unknown remote-database menu item types (§4.5), unknown ANLZ
//! section tags (§4.7, §9), unknown PDB page types (§4.7).
//!
//! A caller who cares can drain [`Diagnostics::snapshot`]; one who doesn't
//! pays only the cost of a bounded ring buffer. Nothing here ever panics or
//! propagates — that would defeat the point of being "best-effort-discard"
//! (spec.md §7).

use std::collections::VecDeque;
use std::sync::Mutex;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Diagnostic {
    pub component: &'static str,
    pub message: String,
}

pub struct Diagnostics {
    entries: Mutex<VecDeque<Diagnostic>>,
    capacity: usize,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Diagnostics {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn record(&self, component: &'static str, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(component, %message, "recorded diagnostic");
        let mut entries = self.entries.lock().expect("diagnostics mutex poisoned");
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(Diagnostic { component, message });
    }

    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.entries
            .lock()
            .expect("diagnostics mutex poisoned")
            .iter()
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.entries.lock().expect("diagnostics mutex poisoned").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_when_full() {
        let diagnostics = Diagnostics::new(2);
        diagnostics.record("a", "first");
        diagnostics.record("a", "second");
        diagnostics.record("a", "third");
        let snapshot = diagnostics.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].message, "second");
        assert_eq!(snapshot[1].message, "third");
    }
}
