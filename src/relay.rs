//! Fixed-capacity byte relay between a connection's reader task and the
//! shell poll loop.
//!
//! One [`RingRelay`] exists per connection. Its reader task is the only
//! producer and the shell loop the only consumer. Both sides take the same
//! short-lived mutex; pushes are small and infrequent relative to the poll
//! cadence, so contention is negligible.

use parking_lot::Mutex;

/// Circular byte store with all-or-nothing writes.
///
/// Invariant: `0 <= count <= capacity`, `tail == (head + count) % capacity`.
#[derive(Debug)]
pub struct RingBuffer {
    data: Box<[u8]>,
    head: usize,
    tail: usize,
    count: usize,
}

impl RingBuffer {
    /// Create a buffer holding up to `capacity` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    #[must_use]
    pub fn free(&self) -> usize {
        self.capacity() - self.count
    }

    /// Append `bytes` if they fit entirely; otherwise leave the buffer untouched.
    pub fn push(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() > self.free() {
            return false;
        }
        let cap = self.capacity();
        let first = bytes.len().min(cap - self.tail);
        self.data[self.tail..self.tail + first].copy_from_slice(&bytes[..first]);
        self.data[..bytes.len() - first].copy_from_slice(&bytes[first..]);
        self.tail = (self.tail + bytes.len()) % cap;
        self.count += bytes.len();
        true
    }

    /// Remove and return up to `max` bytes, oldest first.
    pub fn drain(&mut self, max: usize) -> Vec<u8> {
        let n = max.min(self.count);
        let mut out = Vec::with_capacity(n);
        if n == 0 {
            return out;
        }
        let cap = self.capacity();
        let first = n.min(cap - self.head);
        out.extend_from_slice(&self.data[self.head..self.head + first]);
        out.extend_from_slice(&self.data[..n - first]);
        self.head = (self.head + n) % cap;
        self.count -= n;
        out
    }
}

/// Thread-safe handle around a connection's [`RingBuffer`].
#[derive(Debug)]
pub struct RingRelay {
    inner: Mutex<RingBuffer>,
}

impl RingRelay {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(RingBuffer::new(capacity)),
        }
    }

    /// Producer side. Fails atomically when there is not enough free space.
    pub fn push(&self, bytes: &[u8]) -> bool {
        self.inner.lock().push(bytes)
    }

    /// Consumer side. Never blocks on data; returns an empty vec when idle.
    pub fn drain(&self, max: usize) -> Vec<u8> {
        self.inner.lock().drain(max)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    #[must_use]
    pub fn free(&self) -> usize {
        self.inner.lock().free()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity()
    }
}
