//! Admission control.
//!
//! A bounded semaphore sized `max_connections`. The accept loop acquires a
//! permit before handing a connection to a worker thread; the permit rides
//! with the job and releases on drop, so the ceiling holds across success,
//! error, and panic paths. Exhaustion logs once per throttling episode.

use std::sync::{Arc, Condvar, Mutex};

use tracing::info;

pub struct AdmissionControl {
    permits: Mutex<usize>,
    available: Condvar,
}

impl AdmissionControl {
    pub fn new(max_connections: usize) -> Self {
        Self {
            permits: Mutex::new(max_connections.max(1)),
            available: Condvar::new(),
        }
    }

    /// Block until a permit is free. Logs a single "waiting" line per
    /// throttling episode, not per wakeup.
    pub fn acquire(self: &Arc<Self>) -> AdmissionPermit {
        let mut permits = self.permits.lock().expect("admission lock poisoned");
        if *permits == 0 {
            info!("connection ceiling reached, waiting for current requests to finish");
            while *permits == 0 {
                permits = self
                    .available
                    .wait(permits)
                    .expect("admission lock poisoned");
            }
        }
        *permits -= 1;
        AdmissionPermit {
            control: Arc::clone(self),
        }
    }

    /// Non-blocking acquire, used by tests.
    pub fn try_acquire(self: &Arc<Self>) -> Option<AdmissionPermit> {
        let mut permits = self.permits.lock().expect("admission lock poisoned");
        if *permits == 0 {
            return None;
        }
        *permits -= 1;
        Some(AdmissionPermit {
            control: Arc::clone(self),
        })
    }

    pub fn available(&self) -> usize {
        *self.permits.lock().expect("admission lock poisoned")
    }

    fn release(&self) {
        let mut permits = self.permits.lock().expect("admission lock poisoned");
        *permits += 1;
        self.available.notify_one();
    }
}

/// Releases its slot when dropped.
pub struct AdmissionPermit {
    control: Arc<AdmissionControl>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.control.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_permits_bound_concurrency() {
        let control = Arc::new(AdmissionControl::new(2));
        let p1 = control.try_acquire().unwrap();
        let _p2 = control.try_acquire().unwrap();
        assert!(control.try_acquire().is_none());

        drop(p1);
        assert!(control.try_acquire().is_some());
    }

    #[test]
    fn test_acquire_blocks_until_release() {
        let control = Arc::new(AdmissionControl::new(1));
        let held = control.try_acquire().unwrap();

        let waiter = {
            let control = Arc::clone(&control);
            thread::spawn(move || {
                let _permit = control.acquire();
            })
        };

        // The waiter cannot finish while the permit is held.
        thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());

        drop(held);
        waiter.join().unwrap();
        assert_eq!(control.available(), 1);
    }

    #[test]
    fn test_zero_ceiling_is_clamped_to_one() {
        let control = Arc::new(AdmissionControl::new(0));
        assert!(control.try_acquire().is_some());
    }
}
