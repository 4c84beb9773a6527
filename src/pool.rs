//! Thread-local pool of dense tangent buffers.
//!
//! Hands out owned buffers rather than arena indices: a [`DenseTangent`]
//! claims a buffer from the current thread's pool on creation and returns it
//! exactly once in `Drop`. Ownership rules out double returns and
//! use-after-return, so the pool needs no generation checks.
//!
//! Buffers are bucketed by width (the `N` of `Ds<N>`), reused as-is and
//! overwritten before they are exposed.
//!
//! A `Ds` may be sent to another thread. Its buffer then returns to the pool
//! of the thread that drops it, which counts it as adopted.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing pool activity on the current thread.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffers ever allocated from the system allocator.
    pub allocated: usize,
    /// Buffers handed out (fresh or reused).
    pub claimed: usize,
    /// Buffers handed out by this pool and given back to it.
    pub released: usize,
    /// Buffers handed out by another thread's pool and dropped here.
    pub adopted: usize,
    /// Idle buffers discarded by [`shrink`].
    pub freed: usize,
}

impl PoolStats {
    /// Buffers handed out by this pool and not given back to it.
    ///
    /// Includes buffers whose values moved to, and were dropped on, another
    /// thread.
    pub fn live(&self) -> usize {
        self.claimed - self.released
    }

    /// Buffers sitting in the free lists.
    pub fn idle(&self) -> usize {
        self.allocated + self.adopted - self.live() - self.freed
    }
}

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(0);

struct TangentPool {
    id: u64,
    free: HashMap<usize, Vec<Box<[f64]>>>,
    stats: PoolStats,
}

impl Default for TangentPool {
    fn default() -> Self {
        TangentPool {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            free: HashMap::new(),
            stats: PoolStats::default(),
        }
    }
}

impl TangentPool {
    fn claim(&mut self, width: usize) -> Box<[f64]> {
        self.stats.claimed += 1;
        match self.free.get_mut(&width).and_then(Vec::pop) {
            Some(buf) => buf,
            None => {
                self.stats.allocated += 1;
                vec![0.0; width].into_boxed_slice()
            }
        }
    }

    fn release(&mut self, buf: Box<[f64]>, home: u64) {
        if home == self.id {
            self.stats.released += 1;
        } else {
            self.stats.adopted += 1;
        }
        self.free.entry(buf.len()).or_default().push(buf);
    }
}

thread_local! {
    static POOL: RefCell<TangentPool> = RefCell::new(TangentPool::default());
}

/// Snapshot of the current thread's pool counters.
pub fn stats() -> PoolStats {
    POOL.with(|pool| pool.borrow().stats)
}

/// Drop every idle buffer of the current thread's pool.
///
/// Live buffers are unaffected and still return to the pool when dropped.
pub fn shrink() {
    POOL.with(|pool| {
        let mut pool = pool.borrow_mut();
        let idle: usize = pool.free.values().map(Vec::len).sum();
        pool.free.clear();
        pool.stats.freed += idle;
    });
}

/// Dense tangent vector of width `N`, backed by a pooled buffer.
pub struct DenseTangent<const N: usize> {
    buf: Box<[f64]>,
    /// Id of the pool the buffer was claimed from.
    home: u64,
}

impl<const N: usize> DenseTangent<N> {
    /// Claim a buffer and fill every lane with `f(lane)`.
    #[inline]
    pub fn from_fn(mut f: impl FnMut(usize) -> f64) -> Self {
        let (mut buf, home) = POOL.with(|pool| {
            let mut pool = pool.borrow_mut();
            (pool.claim(N), pool.id)
        });
        for (k, slot) in buf.iter_mut().enumerate() {
            *slot = f(k);
        }
        DenseTangent { buf, home }
    }

    /// Lanes as a slice of length `N`.
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.buf
    }

    /// Mutable lanes.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.buf
    }

    /// Copy the lanes out into a fixed-size array.
    pub fn to_array(&self) -> [f64; N] {
        std::array::from_fn(|k| self.buf[k])
    }
}

impl<const N: usize> Clone for DenseTangent<N> {
    fn clone(&self) -> Self {
        Self::from_fn(|k| self.buf[k])
    }
}

impl<const N: usize> Drop for DenseTangent<N> {
    fn drop(&mut self) {
        let buf = std::mem::take(&mut self.buf);
        // The pool may already be gone during thread teardown; the buffer is
        // then freed normally.
        let home = self.home;
        let _ = POOL.try_with(|pool| pool.borrow_mut().release(buf, home));
    }
}

impl<const N: usize> fmt::Debug for DenseTangent<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.buf.iter()).finish()
    }
}
