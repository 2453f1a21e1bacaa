//! Per-project-code mutual exclusion.
//!
//! The snapshot read-check-write for one project code runs under that
//! code's lock. Different codes never contend. An entry lives only while
//! some caller holds or waits on it, so the registry stays bounded by the
//! number of codes in flight.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Registry of one mutex per project code.
#[derive(Debug, Default)]
pub struct ProjectLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ProjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, project_code: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            locks
                .entry(project_code.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Run `f` while holding the lock for `project_code`.
    pub fn with_lock<T>(&self, project_code: &str, f: impl FnOnce() -> T) -> T {
        let lock = self.lock_for(project_code);
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };
        self.release(project_code, lock);
        result
    }

    /// Drop the registry entry once no other caller holds a clone of it.
    fn release(&self, project_code: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One count for the registry, one for `lock`.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(project_code);
        }
    }

    /// Number of codes currently held or awaited.
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn same_code_is_serialized() {
        let locks = Arc::new(ProjectLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                thread::spawn(move || {
                    locks.with_lock("GMP-P1", || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(2));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    })
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[test]
    fn different_codes_get_different_locks() {
        let locks = ProjectLocks::new();
        // Nested acquisition would deadlock if the codes shared a mutex.
        let value = locks.with_lock("A-P1", || {
            locks.with_lock("B-P1", || {
                assert_eq!(locks.len(), 2);
                42
            })
        });
        assert_eq!(value, 42);
        assert!(locks.is_empty());
    }
}
