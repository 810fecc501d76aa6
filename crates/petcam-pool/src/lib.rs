//! Zero-allocation object pool for per-process frame and bitstream staging buffers.
//!
//! Neither the NV12 ring nor the H.264 ring lives in this crate — those are
//! [`petcam_core::shm`] regions mapped directly from shared memory. This pool covers the
//! scratch buffers a capture pipeline or consumer needs *within its own process*: the
//! gamma-correction working copy of a Y plane, the encoder's accumulated NAL output, the
//! detection shim's locally-imported copy of a zero-copy descriptor. Per-frame heap
//! allocation for an 8 MB NV12 frame at 30 fps is a real cost; this pool removes it.
//!
//! # Design
//!
//! - [`Pool<T>`]: pre-allocated slots, a semaphore tracking availability, and a lock-free
//!   free list. The `RwLock` on the slot vector is only taken on `acquire` (to cache a
//!   slot pointer) and on `grow` (rare); steady-state access through [`Loaned`] never
//!   locks.
//!
//! # Safety Model
//!
//! 1. The semaphore holds exactly as many permits as there are free slots.
//! 2. The lock-free free list holds exactly the indices not currently loaned.
//! 3. A [`Loaned<T>`] caches its slot's raw pointer at acquire time, so `get`/`get_mut`
//!    never touch the `RwLock` — only `grow()` and `release()` do.
#![allow(unsafe_code)]

pub mod frame_buffer;

pub use frame_buffer::FrameBuffer;

use crossbeam_queue::SegQueue;
use parking_lot::RwLock;
use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{error, warn};

type ResetFn<T> = Box<dyn Fn(&mut T) + Send + Sync>;
type FactoryFn<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// Generic pool of pre-allocated objects with lock-free steady-state access.
pub struct Pool<T> {
    slots: RwLock<Vec<Box<UnsafeCell<T>>>>,
    free_indices: SegQueue<usize>,
    semaphore: Semaphore,
    reset_fn: Option<ResetFn<T>>,
    factory: FactoryFn<T>,
    initial_size: usize,
    current_size: AtomicUsize,
}

// SAFETY: every slot is reachable through at most one outstanding `Loaned<T>` at a time
// (the semaphore permit count equals the free-list length equals slots.len() - outstanding
// loans), and T: Send lets the pooled value cross threads.
unsafe impl<T: Send> Send for Pool<T> {}
unsafe impl<T: Send> Sync for Pool<T> {}

impl<T: Send + 'static> Pool<T> {
    /// Create a pool with `size` pre-allocated slots.
    ///
    /// # Panics
    /// Panics if `size` is 0.
    pub fn new<F, R>(size: usize, factory: F, reset: Option<R>) -> Arc<Self>
    where
        F: Fn() -> T + Send + Sync + 'static,
        R: Fn(&mut T) + Send + Sync + 'static,
    {
        assert!(size > 0, "pool size must be greater than 0");

        let slots: Vec<Box<UnsafeCell<T>>> = (0..size)
            .map(|_| Box::new(UnsafeCell::new(factory())))
            .collect();

        let free_indices = SegQueue::new();
        for i in 0..size {
            free_indices.push(i);
        }

        Arc::new(Self {
            slots: RwLock::new(slots),
            free_indices,
            semaphore: Semaphore::new(size),
            reset_fn: reset.map(|f| Box::new(f) as ResetFn<T>),
            factory: Arc::new(factory),
            initial_size: size,
            current_size: AtomicUsize::new(size),
        })
    }

    /// Create a pool without a reset function.
    pub fn new_simple<F>(size: usize, factory: F) -> Arc<Self>
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::new(size, factory, None::<fn(&mut T)>)
    }

    /// Create a pool with a reset function, run on every release.
    pub fn new_with_reset<F, R>(size: usize, factory: F, reset: R) -> Arc<Self>
    where
        F: Fn() -> T + Send + Sync + 'static,
        R: Fn(&mut T) + Send + Sync + 'static,
    {
        Self::new(size, factory, Some(reset))
    }

    fn grow(&self, count: usize) {
        let mut slots = self.slots.write();
        let old_size = slots.len();
        let new_size = old_size + count;

        error!(
            pool_type = std::any::type_name::<T>(),
            old_size, new_size, "pool exhausted, growing — producer is outrunning consumers"
        );

        for _ in 0..count {
            slots.push(Box::new(UnsafeCell::new((self.factory)())));
        }
        for i in old_size..new_size {
            self.free_indices.push(i);
        }

        self.current_size.store(new_size, Ordering::Release);
        self.semaphore.add_permits(count);
    }

    /// Acquire a slot, waiting if none are free.
    pub async fn acquire(self: &Arc<Self>) -> Loaned<T> {
        let permit = self
            .semaphore
            .acquire()
            .await
            .expect("semaphore closed unexpectedly");
        permit.forget();

        let idx = self
            .free_indices
            .pop()
            .expect("free list empty after permit acquired");

        let slot_ptr = {
            let slots = self.slots.read();
            slots[idx].as_ref().get()
        };

        Loaned {
            pool: Arc::clone(self),
            idx,
            slot_ptr,
        }
    }

    /// Try to acquire a slot without waiting.
    #[must_use]
    pub fn try_acquire(self: &Arc<Self>) -> Option<Loaned<T>> {
        let permit = self.semaphore.try_acquire().ok()?;
        permit.forget();

        let idx = self
            .free_indices
            .pop()
            .expect("free list empty after permit acquired");

        let slot_ptr = {
            let slots = self.slots.read();
            slots[idx].as_ref().get()
        };

        Some(Loaned {
            pool: Arc::clone(self),
            idx,
            slot_ptr,
        })
    }

    /// Acquire a slot with a bounded wait, returning `None` on timeout.
    ///
    /// A capture pipeline uses this rather than `acquire` so that pool exhaustion shows
    /// up as a dropped frame (logged, counted) instead of a stall on the hot loop.
    pub async fn try_acquire_timeout(self: &Arc<Self>, timeout: Duration) -> Option<Loaned<T>> {
        let permit = match tokio::time::timeout(timeout, self.semaphore.acquire()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return None,
            Err(_) => {
                warn!(
                    timeout_ms = timeout.as_millis(),
                    available = self.available(),
                    size = self.size(),
                    "pool acquire timed out"
                );
                return None;
            }
        };
        permit.forget();

        let idx = self
            .free_indices
            .pop()
            .expect("free list empty after permit acquired");

        let slot_ptr = {
            let slots = self.slots.read();
            slots[idx].as_ref().get()
        };

        Some(Loaned {
            pool: Arc::clone(self),
            idx,
            slot_ptr,
        })
    }

    fn acquire_or_grow(self: &Arc<Self>) -> Loaned<T> {
        if let Some(loaned) = self.try_acquire() {
            return loaned;
        }
        let current = self.current_size.load(Ordering::Acquire);
        self.grow(current.max(8));
        self.try_acquire().expect("acquire failed right after grow")
    }

    fn release(&self, idx: usize) {
        if let Some(reset_fn) = &self.reset_fn {
            // SAFETY: the caller (Loaned::drop) holds the only outstanding reference to
            // this slot; no other Loaned can observe it concurrently.
            let slots = self.slots.read();
            let item = unsafe { &mut *slots[idx].as_ref().get() };
            reset_fn(item);
        }
        self.free_indices.push(idx);
        self.semaphore.add_permits(1);
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.current_size.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    #[must_use]
    pub fn initial_size(&self) -> usize {
        self.initial_size
    }
}

/// RAII loan of a pool slot; returns the slot on drop.
///
/// `get`/`get_mut` are lock-free: the slot pointer is cached once at `acquire`.
pub struct Loaned<T: Send + 'static> {
    pool: Arc<Pool<T>>,
    idx: usize,
    slot_ptr: *mut T,
}

// SAFETY: the semaphore guarantees exclusive ownership of `idx` for the lifetime of this
// loan, so accessing `*slot_ptr` races with nothing.
unsafe impl<T: Send + 'static> Send for Loaned<T> {}
unsafe impl<T: Send + 'static> Sync for Loaned<T> {}

impl<T: Send + 'static> Loaned<T> {
    #[inline]
    #[must_use]
    pub fn get(&self) -> &T {
        // SAFETY: see the impl block's Send/Sync rationale above.
        unsafe { &*self.slot_ptr }
    }

    #[inline]
    #[must_use]
    pub fn get_mut(&mut self) -> &mut T {
        // SAFETY: &mut self guarantees no other reference to this slot is live.
        unsafe { &mut *self.slot_ptr }
    }

    #[must_use]
    pub fn pool(&self) -> &Arc<Pool<T>> {
        &self.pool
    }

    #[must_use]
    pub fn slot_index(&self) -> usize {
        self.idx
    }
}

impl<T: Clone + Send + 'static> Loaned<T> {
    /// Clone the contents out, releasing this loan immediately.
    #[must_use]
    pub fn clone_item(self) -> T {
        self.get().clone()
    }

    /// Clone into a freshly-acquired slot, or `None` if the pool is exhausted.
    #[must_use]
    pub fn try_clone(&self) -> Option<Self> {
        let mut new_loan = self.pool.try_acquire()?;
        *new_loan.get_mut() = self.get().clone();
        Some(new_loan)
    }
}

impl<T: Send + 'static> Deref for Loaned<T> {
    type Target = T;
    #[inline]
    fn deref(&self) -> &Self::Target {
        self.get()
    }
}

impl<T: Send + 'static> DerefMut for Loaned<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.get_mut()
    }
}

impl<T: Clone + Send + 'static> Clone for Loaned<T> {
    fn clone(&self) -> Self {
        if let Some(cloned) = self.try_clone() {
            return cloned;
        }
        let mut new_loan = self.pool.acquire_or_grow();
        *new_loan.get_mut() = self.get().clone();
        new_loan
    }
}

impl<T: Send + 'static> Drop for Loaned<T> {
    fn drop(&mut self) {
        self.pool.release(self.idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reset_runs_on_release() {
        let pool = Pool::new_with_reset(2, || vec![0u8; 16], |v| v.fill(0));

        let mut item = pool.acquire().await;
        item[0] = 42;
        drop(item);

        let item2 = pool.acquire().await;
        assert_eq!(item2[0], 0);
    }

    #[tokio::test]
    async fn try_acquire_exhausts_and_recovers() {
        let pool = Pool::new_simple(1, || 0i32);

        let first = pool.try_acquire().unwrap();
        assert!(pool.try_acquire().is_none());
        drop(first);
        assert!(pool.try_acquire().is_some());
    }

    #[tokio::test]
    async fn timeout_reports_backpressure() {
        let pool = Pool::new_simple(1, || 0i32);
        let _held = pool.acquire().await;

        let result = pool.try_acquire_timeout(Duration::from_millis(10)).await;
        assert!(result.is_none());
    }
}
