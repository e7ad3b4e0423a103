//! Client-local persisted storage.
//!
//! The client keeps two things across restarts: the credential (so a
//! restarted client can resume its session) and the notification
//! history. Both live behind [`ClientStorage`], so an embedding app can
//! put them wherever it keeps its own state; [`FileStorage`] and
//! [`MemoryStorage`] cover the common cases.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::StorageError;

/// The named slots the client persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageSlot {
    Credential,
    NotificationHistory,
}

impl StorageSlot {
    /// Every slot. Logout clears all of them.
    pub const ALL: [StorageSlot; 2] =
        [StorageSlot::Credential, StorageSlot::NotificationHistory];

    /// Stable key used by storage backends.
    pub fn key(self) -> &'static str {
        match self {
            Self::Credential => "credential",
            Self::NotificationHistory => "notification-history",
        }
    }
}

/// A small string key-value store scoped to this client.
pub trait ClientStorage: Send + Sync + 'static {
    /// Reads a slot. `Ok(None)` means it was never written (or cleared).
    fn load(&self, slot: StorageSlot) -> Result<Option<String>, StorageError>;

    /// Overwrites a slot.
    fn save(&self, slot: StorageSlot, value: &str) -> Result<(), StorageError>;

    /// Removes a slot. Removing an empty slot is not an error.
    fn remove(&self, slot: StorageSlot) -> Result<(), StorageError>;

    /// Removes every slot.
    fn clear(&self) -> Result<(), StorageError> {
        for slot in StorageSlot::ALL {
            self.remove(slot)?;
        }
        Ok(())
    }
}

/// Storage that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    slots: Mutex<HashMap<StorageSlot, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClientStorage for MemoryStorage {
    fn load(&self, slot: StorageSlot) -> Result<Option<String>, StorageError> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(slots.get(&slot).cloned())
    }

    fn save(&self, slot: StorageSlot, value: &str) -> Result<(), StorageError> {
        let mut slots =
            self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.insert(slot, value.to_owned());
        Ok(())
    }

    fn remove(&self, slot: StorageSlot) -> Result<(), StorageError> {
        let mut slots =
            self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.remove(&slot);
        Ok(())
    }
}

/// Storage backed by one file per slot inside a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Opens (creating if needed) the storage directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, slot: StorageSlot) -> PathBuf {
        self.dir.join(slot.key())
    }
}

impl ClientStorage for FileStorage {
    fn load(&self, slot: StorageSlot) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(self.path(slot)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, slot: StorageSlot, value: &str) -> Result<(), StorageError> {
        // Write-then-rename so a crash never leaves a half-written slot.
        let path = self.path(slot);
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, slot: StorageSlot) -> Result<(), StorageError> {
        match std::fs::remove_file(self.path(slot)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
