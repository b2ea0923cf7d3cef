//! Per-class serialization of reconciliations within one process.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Hands out one async mutex per class id.
///
/// This only orders callers inside the same process. Callers in other
/// processes are kept consistent by the store's conditional writes.
#[derive(Default)]
pub struct ClassLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ClassLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets or creates the lock for the given class.
    pub fn get(&self, class_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(class_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drops locks nobody is holding or waiting on.
    pub fn prune_idle(&self) {
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_class_shares_lock() {
        let locks = ClassLocks::new();
        let a = locks.get("c1");
        let b = locks.get("c1");
        let c = locks.get("c2");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(locks.locks.len(), 2);
    }

    #[test]
    fn test_prune_keeps_held_locks() {
        let locks = ClassLocks::new();
        let held = locks.get("c1");
        drop(locks.get("c2"));

        locks.prune_idle();

        assert_eq!(locks.locks.len(), 1);
        assert!(Arc::ptr_eq(&held, &locks.get("c1")));
    }
}
