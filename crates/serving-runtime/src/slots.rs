//! Decode slot accounting.
//!
//! Every in-flight request (blocking or streaming) holds one slot. Admission
//! never waits: when the pool is empty the request is refused so callers can
//! back off instead of piling up behind a lock.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Fixed-capacity pool of decode slots.
#[derive(Debug)]
pub struct SlotPool {
    capacity: usize,
    permits: Arc<Semaphore>,
}

/// A held slot. Dropping it returns the permit to the pool.
#[derive(Debug)]
pub struct SlotGuard {
    _permit: OwnedSemaphorePermit,
}

impl SlotPool {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            permits: Arc::new(Semaphore::new(capacity)),
        })
    }

    /// Take a slot without blocking. Returns `None` at capacity.
    pub fn try_acquire(&self) -> Option<SlotGuard> {
        let permit = Arc::clone(&self.permits).try_acquire_owned().ok()?;
        Some(SlotGuard { _permit: permit })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_use(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_until_exhausted() {
        let pool = SlotPool::new(2);
        let a = pool.try_acquire().unwrap();
        let _b = pool.try_acquire().unwrap();
        assert!(pool.try_acquire().is_none());
        assert_eq!(pool.available(), 0);

        drop(a);
        assert_eq!(pool.available(), 1);
        assert!(pool.try_acquire().is_some());
    }

    #[test]
    fn zero_capacity_admits_nothing() {
        let pool = SlotPool::new(0);
        assert!(pool.try_acquire().is_none());
    }

    #[test]
    fn concurrent_acquire_never_exceeds_capacity() {
        let pool = SlotPool::new(4);
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || pool.try_acquire())
            })
            .collect();
        let held: Vec<SlotGuard> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(held.len(), 4);
        assert_eq!(pool.in_use(), 4);
        drop(held);
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn guard_released_from_another_thread() {
        let pool = SlotPool::new(1);
        let guard = pool.try_acquire().unwrap();
        assert_eq!(pool.in_use(), 1);
        std::thread::spawn(move || drop(guard)).join().unwrap();
        assert_eq!(pool.available(), 1);
        assert_eq!(pool.capacity(), 1);
    }
}
