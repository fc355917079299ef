//! ## swen-core::ring
//! **Lock-free single-producer single-consumer ring queue**
//!
//! Fixed-capacity circular buffer shared between an interrupt-side producer
//! and a task-side consumer. The original firmware relied on single-byte
//! index arithmetic being atomic with respect to one interrupt level; this
//! implementation replaces that assumption with explicit atomic loads and
//! stores using acquire/release ordering.
//!
//! One slot is reserved to disambiguate full from empty, so a ring of
//! capacity `n` holds at most `n - 1` items.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::CoreError;

/// Cache-line aligned atomic index to prevent false sharing between the
/// producer and consumer sides.
#[repr(align(64))]
struct AlignedIndex(AtomicUsize);

impl AlignedIndex {
    #[inline]
    fn new(value: usize) -> Self {
        Self(AtomicUsize::new(value))
    }
}

struct Inner<T> {
    buffer: Box<[UnsafeCell<Option<T>>]>,
    head: AlignedIndex,
    tail: AlignedIndex,
    mask: usize,
}

// SAFETY: the producer only writes slots between tail and head, the consumer
// only reads slots the producer has published via the release store on head.
unsafe impl<T: Send> Send for Inner<T> {}
unsafe impl<T: Send> Sync for Inner<T> {}

/// Single-producer single-consumer ring queue.
///
/// `share()` hands out additional handles to the same ring; the caller is
/// responsible for keeping exactly one producer and one consumer side.
pub struct SpscRing<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for SpscRing<T> {
    fn clone(&self) -> Self {
        self.share()
    }
}

impl<T> SpscRing<T> {
    /// Creates a ring with the given capacity.
    ///
    /// `capacity` must be a power of two; usable capacity is `capacity - 1`.
    pub fn with_capacity(capacity: usize) -> Result<Self, CoreError> {
        if !capacity.is_power_of_two() || capacity < 2 {
            return Err(CoreError::InvalidCapacity);
        }

        let buffer = (0..capacity)
            .map(|_| UnsafeCell::new(None))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            inner: Arc::new(Inner {
                buffer,
                head: AlignedIndex::new(0),
                tail: AlignedIndex::new(0),
                mask: capacity - 1,
            }),
        })
    }

    /// Creates a new handle to the shared ring.
    #[inline]
    pub fn share(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Attempts to push a value, returning it back if the ring is full.
    #[inline]
    pub fn try_push(&self, value: T) -> Result<(), T> {
        let head = self.inner.head.0.load(Ordering::Relaxed);
        let tail = self.inner.tail.0.load(Ordering::Acquire);

        if (head + 1) & self.inner.mask == tail {
            return Err(value);
        }

        // SAFETY: exclusive write access to this slot is ensured by the
        // reserved-slot full check and the single-producer contract.
        unsafe {
            *self.inner.buffer[head].get() = Some(value);
        }

        self.inner
            .head
            .0
            .store((head + 1) & self.inner.mask, Ordering::Release);
        Ok(())
    }

    /// Attempts to pop the oldest value. Returns `None` if the ring is empty.
    #[inline]
    pub fn try_pop(&self) -> Option<T> {
        let tail = self.inner.tail.0.load(Ordering::Relaxed);
        let head = self.inner.head.0.load(Ordering::Acquire);

        if head == tail {
            return None;
        }

        // SAFETY: exclusive read access to this slot is ensured by the
        // single-consumer contract and the release store on head.
        let value = unsafe { (*self.inner.buffer[tail].get()).take() };

        self.inner
            .tail
            .0
            .store((tail + 1) & self.inner.mask, Ordering::Release);
        value
    }

    /// Number of items currently queued.
    #[inline]
    pub fn len(&self) -> usize {
        let head = self.inner.head.0.load(Ordering::Acquire);
        let tail = self.inner.tail.0.load(Ordering::Acquire);
        (head.wrapping_sub(tail)) & self.inner.mask
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() == self.inner.mask
    }

    /// Usable capacity (one slot is reserved).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.mask
    }
}
