//! Per-project mutual exclusion.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// One lock per project name.
///
/// Operations on different projects never contend; operations on the same
/// project run one at a time.
#[derive(Debug, Default)]
pub struct ProjectLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ProjectLocks {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, project: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        locks
            .entry(project.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Runs `f` while holding the lock of `project`.
    ///
    /// Blocks the calling thread until the lock is free; async callers must
    /// run this on a blocking thread.
    pub fn exclusive<T>(&self, project: &str, f: impl FnOnce() -> T) -> T {
        let lock = self.lock_for(project);
        let _held = lock.lock();
        f()
    }

    /// Returns the number of projects that have been locked so far.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    /// Returns true if no project has been locked yet.
    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}
