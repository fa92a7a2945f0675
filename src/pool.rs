//! Process-wide pools of scratch buffers and string builders.
//!
//! Compression, encryption and copying all need short-lived scratch space.
//! Rather than allocating per call, they rent a buffer from [`buffers()`]
//! and the [`Pooled`] guard hands it back when dropped, including on early
//! returns and unwinding.
//!
//! # Example
//!
//! ```rust
//! use zipwright::pool;
//!
//! let mut buf = pool::buffers().rent();
//! buf.extend_from_slice(b"scratch");
//! assert_eq!(&buf[..], b"scratch");
//! drop(buf); // cleared and returned to the pool
//! ```

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Maximum number of idle objects a shared pool keeps around.
const DEFAULT_RETAINED: usize = 16;

/// Buffers larger than this are dropped instead of retained.
const MAX_RETAINED_CAPACITY: usize = 1 << 20;

/// Acquires a mutex lock, recovering from poisoning if necessary.
///
/// The pooled objects are reset before reuse, so a panic while the lock was
/// held cannot leave them in a state that matters.
pub(crate) fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        log::warn!("pool mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

/// An object that can be cleared and handed out again.
pub trait Reusable: Default + Send {
    /// Clears the contents, keeping any allocation.
    fn reset(&mut self);

    /// Allocated capacity in bytes, used to avoid retaining huge objects.
    fn retained_capacity(&self) -> usize {
        0
    }
}

impl Reusable for Vec<u8> {
    fn reset(&mut self) {
        self.clear();
    }

    fn retained_capacity(&self) -> usize {
        self.capacity()
    }
}

impl Reusable for String {
    fn reset(&mut self) {
        self.clear();
    }

    fn retained_capacity(&self) -> usize {
        self.capacity()
    }
}

/// Statistics for pool usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Rents served from an idle object.
    pub hits: u64,
    /// Rents that had to allocate a new object.
    pub misses: u64,
}

impl PoolStats {
    /// Returns the hit ratio.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// A thread-safe pool of reusable objects.
///
/// Checkout is a short critical section: an object is removed from the idle
/// list while rented, so two rents never hand out the same object.
pub struct Pool<T: Reusable> {
    idle: Mutex<Vec<T>>,
    max_retained: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T: Reusable> Pool<T> {
    /// Creates an empty pool that keeps at most `max_retained` idle objects.
    pub const fn new(max_retained: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            max_retained,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Rents a cleared object.
    pub fn rent(&self) -> Pooled<'_, T> {
        let reused = lock_or_recover(&self.idle).pop();
        let item = match reused {
            Some(item) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                item
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                T::default()
            }
        };
        Pooled {
            item: Some(item),
            pool: self,
        }
    }

    /// Returns the number of idle objects.
    pub fn idle_count(&self) -> usize {
        lock_or_recover(&self.idle).len()
    }

    /// Returns the pool statistics.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn give_back(&self, mut item: T) {
        if item.retained_capacity() > MAX_RETAINED_CAPACITY {
            return;
        }
        item.reset();
        let mut idle = lock_or_recover(&self.idle);
        if idle.len() < self.max_retained {
            idle.push(item);
        }
    }
}

impl<T: Reusable> std::fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("idle", &self.idle_count())
            .field("max_retained", &self.max_retained)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Scoped guard around a rented object.
///
/// Dereferences to the object; dropping the guard clears it and returns it
/// to its pool.
pub struct Pooled<'a, T: Reusable> {
    item: Option<T>,
    pool: &'a Pool<T>,
}

impl<T: Reusable> Pooled<'_, T> {
    /// Takes the object out of the pool's custody.
    pub fn detach(mut self) -> T {
        self.item.take().unwrap_or_default()
    }
}

impl<T: Reusable> Deref for Pooled<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only `detach` and `drop` take the item, and both consume the guard.
        self.item.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl<T: Reusable> DerefMut for Pooled<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.item.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl<T: Reusable> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool.give_back(item);
        }
    }
}

impl<T: Reusable + std::fmt::Debug> std::fmt::Debug for Pooled<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Pooled").field(&self.item).finish()
    }
}

static BUFFERS: Pool<Vec<u8>> = Pool::new(DEFAULT_RETAINED);
static STRINGS: Pool<String> = Pool::new(DEFAULT_RETAINED);

/// The shared byte-buffer pool.
pub fn buffers() -> &'static Pool<Vec<u8>> {
    &BUFFERS
}

/// The shared string-builder pool.
pub fn strings() -> &'static Pool<String> {
    &STRINGS
}

/// Rents a zero-filled buffer of exactly `len` bytes.
pub(crate) fn rent_buffer(len: usize) -> Pooled<'static, Vec<u8>> {
    let mut buf = BUFFERS.rent();
    buf.resize(len, 0);
    buf
}
