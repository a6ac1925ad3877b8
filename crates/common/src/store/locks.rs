use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::deadline::{Deadline, TimedOut};
use crate::path::ResourcePath;

pub type ReadGuard = OwnedRwLockReadGuard<()>;
pub type WriteGuard = OwnedRwLockWriteGuard<()>;

/// Number of table entries after which dead locks are swept.
const SWEEP_THRESHOLD: usize = 1024;

/// A table of per-path reader/writer locks.
///
/// Entries are held weakly, so a path's lock lives exactly as long as
/// some guard (or waiter) holds it. Callers acquire in ancestor before
/// descendant order to stay deadlock free.
#[derive(Debug, Default)]
pub struct PathLocks {
    table: Mutex<HashMap<ResourcePath, Weak<RwLock<()>>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, path: &ResourcePath) -> Arc<RwLock<()>> {
        let mut table = self.table.lock();
        if let Some(lock) = table.get(path).and_then(Weak::upgrade) {
            return lock;
        }
        if table.len() >= SWEEP_THRESHOLD {
            table.retain(|_, weak| weak.strong_count() > 0);
        }
        let lock = Arc::new(RwLock::new(()));
        table.insert(path.clone(), Arc::downgrade(&lock));
        lock
    }

    pub async fn read(&self, path: &ResourcePath, deadline: &Deadline) -> Result<ReadGuard, TimedOut> {
        let lock = self.lock_for(path);
        deadline.run(lock.read_owned()).await
    }

    pub async fn write(&self, path: &ResourcePath, deadline: &Deadline) -> Result<WriteGuard, TimedOut> {
        let lock = self.lock_for(path);
        deadline.run(lock.write_owned()).await
    }

    #[cfg(test)]
    fn live_entries(&self) -> usize {
        self.table
            .lock()
            .values()
            .filter(|w| w.strong_count() > 0)
            .count()
    }
}
