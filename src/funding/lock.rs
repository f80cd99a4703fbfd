use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::types::Subject;

/// per-subject mutual exclusion for check-then-commit sequences
///
/// A slot lives only while some caller holds or waits on it, so the map
/// is bounded by the number of subjects with a call in flight.
#[derive(Debug, Default)]
pub struct SubjectLocks {
    slots: Mutex<HashMap<Subject, Arc<Mutex<()>>>>,
}

impl SubjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// run `f` while holding the lock of `subject`
    pub fn with_lock<T>(&self, subject: &Subject, f: impl FnOnce() -> T) -> T {
        let slot = self.slot(subject);
        let result = {
            let _guard = slot.lock().unwrap_or_else(|e| e.into_inner());
            f()
        };
        drop(slot);
        self.release(subject);
        result
    }

    fn slot(&self, subject: &Subject) -> Arc<Mutex<()>> {
        // the map holds no invariant a panic could break
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.entry(*subject).or_default().clone()
    }

    /// forget the slot once nobody else references it
    fn release(&self, subject: &Subject) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if slots
            .get(subject)
            .map_or(false, |slot| Arc::strong_count(slot) == 1)
        {
            slots.remove(subject);
        }
    }

    /// subjects with a call in flight
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
