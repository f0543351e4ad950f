use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Shared map from fragment file name to "fully written".
///
/// Written by the watcher thread, read by `FragmentRingBuffer::drain`.
/// May hold entries for files that were never (or are no longer) buffered,
/// since a write can complete before the producer calls `put`.
#[derive(Debug, Clone, Default)]
pub struct ReadinessTable {
    entries: Arc<Mutex<HashMap<String, bool>>>,
}

impl ReadinessTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_ready(&self, name: &str) {
        self.entries.lock().insert(name.to_string(), true);
    }

    pub fn is_ready(&self, name: &str) -> bool {
        self.entries.lock().get(name).copied().unwrap_or(false)
    }

    /// Whether every name in `names` is marked ready, checked under one lock.
    pub fn all_ready<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> bool {
        let entries = self.entries.lock();
        names
            .into_iter()
            .all(|name| entries.get(name).copied().unwrap_or(false))
    }

    pub fn remove(&self, name: &str) {
        self.entries.lock().remove(name);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_names_are_not_ready() {
        let table = ReadinessTable::new();
        assert!(!table.is_ready("fragment_0.ccf"));
        table.mark_ready("fragment_0.ccf");
        assert!(table.is_ready("fragment_0.ccf"));
        assert!(!table.all_ready(["fragment_0.ccf", "fragment_1.ccf"]));
    }

    #[test]
    fn clones_share_entries() {
        let table = ReadinessTable::new();
        let writer = table.clone();
        std::thread::spawn(move || writer.mark_ready("a.ccf"))
            .join()
            .unwrap();
        assert!(table.is_ready("a.ccf"));
        table.remove("a.ccf");
        assert!(table.is_empty());
    }
}
