//! Striped locks serializing writes to the same key.

use std::fmt::{self, Debug, Formatter};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Number of stripes, one per possible trailing key byte.
pub const STRIPES: usize = 256;

/// A fixed set of mutexes, selected by the last byte of a key.
///
/// Distinct keys ending with the same byte share a stripe and contend with
/// each other.
pub struct StripedLocks {
    locks: [Mutex<()>; STRIPES],
}

impl StripedLocks {
    pub fn new() -> Self {
        Self {
            locks: std::array::from_fn(|_| Mutex::new(())),
        }
    }

    /// Index of the stripe guarding `key`, the empty key maps to 0.
    pub fn index_for(key: &[u8]) -> usize {
        key.last().copied().unwrap_or(0) as usize
    }

    /// Block until the stripe guarding `key` is free, and hold it until the guard drops.
    pub fn lock(&self, key: &[u8]) -> MutexGuard<'_, ()> {
        // The mutex guards no data, a panicking holder can't leave anything inconsistent.
        self.locks[Self::index_for(key)]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for StripedLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for StripedLocks {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "StripedLocks({})", self.locks.len())
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn stripe_index() {
        assert_eq!(StripedLocks::index_for(b""), 0);
        assert_eq!(StripedLocks::index_for(&[1, 2, 255]), 255);
        assert_eq!(StripedLocks::index_for(b"/v/a"), b'a' as usize);
    }

    #[test]
    fn same_stripe_is_serialized() {
        let locks = Arc::new(StripedLocks::new());
        let acquired = Arc::new(AtomicBool::new(false));

        let guard = locks.lock(b"first-x");

        let handle = {
            let locks = locks.clone();
            let acquired = acquired.clone();

            thread::spawn(move || {
                let _guard = locks.lock(b"other-x");
                acquired.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!acquired.load(Ordering::SeqCst));

        drop(guard);
        handle.join().unwrap();

        assert!(acquired.load(Ordering::SeqCst));
    }

    #[test]
    fn different_stripes_are_independent() {
        let locks = StripedLocks::new();

        let _a = locks.lock(b"key-a");
        let _b = locks.lock(b"key-b");
    }
}
