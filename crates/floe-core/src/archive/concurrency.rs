use std::sync::{Condvar, Mutex};

/// Counting semaphore bounding concurrent in-flight blob uploads.
///
/// One token is held per chunk from dispatch until its upload finishes;
/// the pool is shared across all files so the global upload parallelism
/// never exceeds `capacity`.
pub(crate) struct TokenPool {
    available: Mutex<usize>,
    freed: Condvar,
}

impl TokenPool {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            available: Mutex::new(capacity.max(1)),
            freed: Condvar::new(),
        }
    }

    /// Block until a token is free, then take it. The token is returned
    /// to the pool when the guard drops.
    pub(crate) fn acquire(&self) -> BlobToken<'_> {
        let mut available = self.available.lock().unwrap();
        while *available == 0 {
            available = self.freed.wait(available).unwrap();
        }
        *available -= 1;
        BlobToken { pool: self }
    }
}

/// RAII guard for one upload slot.
pub(crate) struct BlobToken<'a> {
    pool: &'a TokenPool,
}

impl Drop for BlobToken<'_> {
    fn drop(&mut self) {
        let mut available = self.pool.available.lock().unwrap();
        *available += 1;
        self.pool.freed.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn acquire_and_release() {
        let pool = TokenPool::new(2);
        let t1 = pool.acquire();
        let t2 = pool.acquire();
        drop(t1);
        let t3 = pool.acquire();
        drop(t2);
        drop(t3);
        // All tokens back: capacity acquisitions succeed without blocking.
        let _a = pool.acquire();
        let _b = pool.acquire();
    }

    #[test]
    fn zero_capacity_is_clamped_to_one() {
        let pool = TokenPool::new(0);
        let token = pool.acquire();
        drop(token);
        let _again = pool.acquire();
    }

    #[test]
    fn blocked_acquire_wakes_on_release() {
        let pool = Arc::new(TokenPool::new(1));
        let held = pool.acquire();

        let acquired = Arc::new(AtomicUsize::new(0));
        let acquired2 = Arc::clone(&acquired);
        let pool2 = Arc::clone(&pool);
        let handle = std::thread::spawn(move || {
            let _token = pool2.acquire();
            acquired2.store(1, Ordering::SeqCst);
        });

        std::thread::sleep(std::time::Duration::from_millis(30));
        assert_eq!(acquired.load(Ordering::SeqCst), 0, "should be blocked");

        drop(held);
        handle.join().unwrap();
        assert_eq!(acquired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn pool_enforces_concurrency_cap() {
        let cap = 4usize;
        let pool = Arc::new(TokenPool::new(cap));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let pool = Arc::clone(&pool);
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            handles.push(std::thread::spawn(move || {
                for _ in 0..50 {
                    let _token = pool.acquire();
                    let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(current, Ordering::Relaxed);
                    std::thread::yield_now();
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        assert!(
            peak.load(Ordering::SeqCst) <= cap,
            "peak {} exceeded cap {}",
            peak.load(Ordering::SeqCst),
            cap
        );
    }
}
