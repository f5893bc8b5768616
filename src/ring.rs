//! Lock-free single-producer single-consumer byte ring buffer.
//!
//! [`ring_buffer`] splits a fixed-capacity buffer into a [`RingWriter`]
//! (producer half) and a [`RingReader`] (consumer half). The write cursor is
//! mutated only through the writer, the read cursor only through the reader;
//! cursor publication uses Release/Acquire so the halves may live on
//! genuinely parallel execution contexts without any lock in the hot path.
//!
//! Cursors are monotonic; the physical index is `position % capacity`, so
//! `filled = write - read` ranges over the full `0..=capacity` with no slot
//! kept empty.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct RingShared {
    data: Box<[UnsafeCell<u8>]>,
    /// Monotonic byte position. Written only by the producer half.
    write_pos: AtomicUsize,
    /// Monotonic byte position. Written only by the consumer half.
    read_pos: AtomicUsize,
}

// The protocol keeps the two halves on disjoint regions: the writer touches
// [write, read + capacity), the reader [read, write). Cursor stores use
// Release and the opposite half loads with Acquire, so a region is handed
// over only after its bytes are visible.
unsafe impl Send for RingShared {}
unsafe impl Sync for RingShared {}

impl RingShared {
    fn capacity(&self) -> usize {
        self.data.len()
    }

    unsafe fn slice_mut(&self, index: usize, len: usize) -> &mut [u8] {
        let base = self.data.as_ptr() as *mut u8;
        std::slice::from_raw_parts_mut(base.add(index), len)
    }

    unsafe fn slice(&self, index: usize, len: usize) -> &[u8] {
        let base = self.data.as_ptr() as *const u8;
        std::slice::from_raw_parts(base.add(index), len)
    }
}

/// Create a ring buffer of `capacity` bytes, split into its two halves.
pub fn ring_buffer(capacity: usize) -> (RingWriter, RingReader) {
    assert!(capacity > 0, "ring buffer capacity must be non-zero");

    let data: Box<[UnsafeCell<u8>]> = (0..capacity).map(|_| UnsafeCell::new(0)).collect();
    let shared = Arc::new(RingShared {
        data,
        write_pos: AtomicUsize::new(0),
        read_pos: AtomicUsize::new(0),
    });

    let writer = RingWriter {
        shared: Arc::clone(&shared),
        last_span: 0,
    };
    let reader = RingReader { shared };

    (writer, reader)
}

/// Producer half: fill free spans, then commit them.
pub struct RingWriter {
    shared: Arc<RingShared>,
    /// Length returned by the most recent `free_span`, the commit bound.
    last_span: usize,
}

impl RingWriter {
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    /// Number of committed bytes not yet released.
    #[inline]
    pub fn filled_len(&self) -> usize {
        let write = self.shared.write_pos.load(Ordering::Relaxed);
        let read = self.shared.read_pos.load(Ordering::Acquire);
        write - read
    }

    /// Number of bytes that can still be committed.
    #[inline]
    pub fn free_len(&self) -> usize {
        self.capacity() - self.filled_len()
    }

    /// Contiguous writable region bounded by the physical end of the buffer.
    ///
    /// A caller that wants to fill across the wrap commits this span and
    /// calls again. The span stays valid across consumer releases: its start
    /// is fixed until `commit` and releases only lengthen it.
    pub fn free_span(&mut self) -> &mut [u8] {
        let capacity = self.capacity();
        let write = self.shared.write_pos.load(Ordering::Relaxed);
        let read = self.shared.read_pos.load(Ordering::Acquire);
        let free = capacity - (write - read);
        let index = write % capacity;
        let len = free.min(capacity - index);
        self.last_span = len;
        // Sound: only this half writes, and the consumer never touches
        // positions in [write, read + capacity).
        unsafe { self.shared.slice_mut(index, len) }
    }

    /// Publish `n` bytes previously written into the free span.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds the length returned by the immediately
    /// preceding [`free_span`](Self::free_span) call. That is a caller bug,
    /// not a runtime condition.
    pub fn commit(&mut self, n: usize) {
        assert!(
            n <= self.last_span,
            "commit of {n} bytes exceeds the preceding free span of {} bytes",
            self.last_span
        );
        self.last_span = 0;
        let write = self.shared.write_pos.load(Ordering::Relaxed);
        self.shared.write_pos.store(write + n, Ordering::Release);
    }
}

/// Consumer half: read committed chunks, then release them.
pub struct RingReader {
    shared: Arc<RingShared>,
}

impl RingReader {
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    /// Number of committed bytes not yet released.
    #[inline]
    pub fn filled_len(&self) -> usize {
        let write = self.shared.write_pos.load(Ordering::Acquire);
        let read = self.shared.read_pos.load(Ordering::Relaxed);
        write - read
    }

    /// Contiguous readable region of exactly `n` bytes at the read cursor.
    ///
    /// # Panics
    ///
    /// Panics if fewer than `n` bytes are committed, or if the region would
    /// straddle the physical end of the buffer (which cannot happen when the
    /// capacity is a multiple of the caller's chunk size).
    #[inline]
    pub fn chunk(&self, n: usize) -> &[u8] {
        let capacity = self.capacity();
        let read = self.shared.read_pos.load(Ordering::Relaxed);
        let write = self.shared.write_pos.load(Ordering::Acquire);
        assert!(
            n <= write - read,
            "chunk of {n} bytes exceeds {} filled bytes",
            write - read
        );
        let index = read % capacity;
        assert!(
            index + n <= capacity,
            "chunk of {n} bytes straddles the buffer's physical end"
        );
        // Sound: only this half reads released-to-us bytes, and the producer
        // never touches positions in [read, write).
        unsafe { self.shared.slice(index, n) }
    }

    /// Advance the read cursor past `n` consumed bytes.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds the filled length.
    pub fn release(&mut self, n: usize) {
        let read = self.shared.read_pos.load(Ordering::Relaxed);
        let write = self.shared.write_pos.load(Ordering::Acquire);
        assert!(
            n <= write - read,
            "release of {n} bytes exceeds {} filled bytes",
            write - read
        );
        self.shared.read_pos.store(read + n, Ordering::Release);
    }
}
