//! Bounded notification history.

use std::collections::VecDeque;

use anchorline_session::{ClientStorage, StorageSlot};

use crate::{NotificationEnvelope, NotifyError};

/// The most recent notifications, oldest first.
///
/// Appending past capacity evicts the oldest entry.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<NotificationEnvelope>,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Restores the persisted history, keeping at most `capacity` of the
    /// newest entries. A missing slot yields an empty history.
    pub fn load(
        storage: &dyn ClientStorage,
        capacity: usize,
    ) -> Result<Self, NotifyError> {
        let mut history = Self::new(capacity);
        if let Some(raw) = storage.load(StorageSlot::NotificationHistory)? {
            let entries: Vec<NotificationEnvelope> = serde_json::from_str(&raw)?;
            for entry in entries {
                history.push(entry);
            }
        }
        Ok(history)
    }

    /// Writes the history to its storage slot.
    pub fn persist(&self, storage: &dyn ClientStorage) -> Result<(), NotifyError> {
        let raw = serde_json::to_string(&self.entries)?;
        storage.save(StorageSlot::NotificationHistory, &raw)?;
        Ok(())
    }

    /// Appends `entry`. Returns `false` (and changes nothing) if an
    /// entry with the same id is already held.
    pub fn push(&mut self, entry: NotificationEnvelope) -> bool {
        if self.capacity == 0 || self.contains(&entry.id) {
            return false;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    /// Marks one entry read. Returns `true` if it was unread.
    pub fn mark_read(&mut self, id: &str) -> bool {
        match self.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) if !entry.read => {
                entry.read = true;
                true
            }
            _ => false,
        }
    }

    /// Marks every entry read. Returns how many changed.
    pub fn mark_all_read(&mut self) -> usize {
        let mut changed = 0;
        for entry in self.entries.iter_mut().filter(|e| !e.read) {
            entry.read = true;
            changed += 1;
        }
        changed
    }

    pub fn unread_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.read).count()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
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

    /// Oldest first.
    pub fn to_vec(&self) -> Vec<NotificationEnvelope> {
        self.entries.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use anchorline_session::MemoryStorage;

    use super::*;
    use crate::Severity;

    fn env(id: &str) -> NotificationEnvelope {
        NotificationEnvelope::new(id, "system", Severity::Info, "m")
    }

    #[test]
    fn test_push_evicts_oldest_past_capacity() {
        let mut history = History::new(3);

        for i in 0..5 {
            history.push(env(&format!("n-{i}")));
        }

        let ids: Vec<_> = history.to_vec().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, ["n-2", "n-3", "n-4"]);
    }

    #[test]
    fn test_push_duplicate_id_is_rejected() {
        let mut history = History::new(10);

        assert!(history.push(env("n-1")));
        assert!(!history.push(env("n-1")));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_mark_read_and_unread_count() {
        let mut history = History::new(10);
        history.push(env("a"));
        history.push(env("b"));
        history.push(env("c"));

        assert!(history.mark_read("b"));
        assert!(!history.mark_read("b"));
        assert!(!history.mark_read("missing"));
        assert_eq!(history.unread_count(), 2);
        assert_eq!(history.mark_all_read(), 2);
        assert_eq!(history.unread_count(), 0);
    }

    #[test]
    fn test_persist_and_load_round_trip() {
        let storage = MemoryStorage::new();
        let mut history = History::new(10);
        history.push(env("a"));
        history.push(env("b"));
        history.mark_read("a");

        history.persist(&storage).unwrap();
        let restored = History::load(&storage, 10).unwrap();

        assert_eq!(restored.to_vec(), history.to_vec());
    }

    #[test]
    fn test_load_missing_slot_is_empty() {
        let history = History::load(&MemoryStorage::new(), 10).unwrap();

        assert!(history.is_empty());
    }

    #[test]
    fn test_load_trims_to_capacity() {
        let storage = MemoryStorage::new();
        let mut big = History::new(10);
        for i in 0..10 {
            big.push(env(&format!("n-{i}")));
        }
        big.persist(&storage).unwrap();

        let small = History::load(&storage, 4).unwrap();

        assert_eq!(small.len(), 4);
        assert_eq!(small.to_vec()[0].id, "n-6");
    }
}
