//! In-memory dataman mock
//!
//! Backs the mission manager in host tests. Records are stored per
//! (namespace, slot); failure switches let tests exercise the storage error
//! paths without a real filesystem.

use super::{Dataman, Namespace, PersistClass, Result, StorageError};
use heapless::{FnvIndexMap, Vec};

/// Largest record the mock can hold (the mission item record).
const MAX_RECORD: usize = 96;

/// Slot capacity of the mock store (power of two, shared by all namespaces).
const MAX_SLOTS: usize = 512;

type SlotKey = (Namespace, u16);

/// In-memory slot store with fault injection.
pub struct MockDataman {
    slots: FnvIndexMap<SlotKey, Vec<u8, MAX_RECORD>, MAX_SLOTS>,
    locked: Option<Namespace>,
    fail_reads: bool,
    fail_writes: bool,
    fail_locks: bool,
    write_count: u32,
}

impl Default for MockDataman {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDataman {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            slots: FnvIndexMap::new(),
            locked: None,
            fail_reads: false,
            fail_writes: false,
            fail_locks: false,
            write_count: 0,
        }
    }

    /// Make every subsequent read fail with an I/O error.
    pub fn set_fail_reads(&mut self, fail: bool) {
        self.fail_reads = fail;
    }

    /// Make every subsequent write fail with an I/O error.
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Make lock acquisition fail.
    pub fn set_fail_locks(&mut self, fail: bool) {
        self.fail_locks = fail;
    }

    /// Namespace currently holding the advisory lock, if any.
    pub fn locked(&self) -> Option<Namespace> {
        self.locked
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> u32 {
        self.write_count
    }

    /// Whether a record exists at the given slot.
    pub fn contains(&self, ns: Namespace, slot: u16) -> bool {
        self.slots.contains_key(&(ns, slot))
    }
}

impl Dataman for MockDataman {
    fn read(&mut self, ns: Namespace, slot: u16, buf: &mut [u8]) -> Result<usize> {
        if self.fail_reads {
            return Err(StorageError::Io);
        }

        let record = self.slots.get(&(ns, slot)).ok_or(StorageError::NotFound)?;
        if record.len() != buf.len() {
            return Err(StorageError::SizeMismatch);
        }

        buf.copy_from_slice(record);
        Ok(buf.len())
    }

    fn write(
        &mut self,
        ns: Namespace,
        slot: u16,
        _persist: PersistClass,
        buf: &[u8],
    ) -> Result<usize> {
        if self.fail_writes {
            return Err(StorageError::Io);
        }

        let mut record = Vec::new();
        record.extend_from_slice(buf).map_err(|_| StorageError::Io)?;
        self.slots.insert((ns, slot), record).map_err(|_| StorageError::Io)?;
        self.write_count += 1;
        Ok(buf.len())
    }

    fn lock(&mut self, ns: Namespace) -> Result<()> {
        if self.fail_locks || self.locked.is_some() {
            return Err(StorageError::LockBusy);
        }
        self.locked = Some(ns);
        Ok(())
    }

    fn unlock(&mut self, ns: Namespace) {
        if self.locked == Some(ns) {
            self.locked = None;
        }
    }
}
