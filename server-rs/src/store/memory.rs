use std::sync::Mutex;

use super::{RecordStore, Records, StoreError};

/// Process-local store. Each instance is isolated, which is what tests and
/// throwaway runs want.
pub struct MemoryStore<T> {
    records: Mutex<Records<T>>,
}

impl<T> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Records::new()),
        }
    }
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send> RecordStore<T> for MemoryStore<T> {
    fn load(&self) -> Records<T> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn save(&self, records: &Records<T>) -> Result<(), StoreError> {
        *self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = records.clone();
        Ok(())
    }
}
