//! Fixed-capacity ring buffer of recent frames

use crate::camera::Frame;
use parking_lot::Mutex;

/// Fixed-capacity FIFO that overwrites its oldest element when full.
///
/// Storage is allocated once; pushes never reallocate.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    /// Index of the oldest element
    head: usize,
    len: usize,
}

impl<T> RingBuffer<T> {
    /// Create a ring buffer holding at most `capacity` elements (minimum 1)
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots, head: 0, len: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Append an element, returning the evicted oldest one if the buffer was full
    pub fn push(&mut self, value: T) -> Option<T> {
        let capacity = self.capacity();
        if self.len < capacity {
            let tail = (self.head + self.len) % capacity;
            self.slots[tail] = Some(value);
            self.len += 1;
            None
        } else {
            let evicted = self.slots[self.head].replace(value);
            self.head = (self.head + 1) % capacity;
            evicted
        }
    }

    /// Newest element
    pub fn latest(&self) -> Option<&T> {
        if self.len == 0 {
            return None;
        }
        let idx = (self.head + self.len - 1) % self.capacity();
        self.slots[idx].as_ref()
    }

    /// Oldest element
    pub fn oldest(&self) -> Option<&T> {
        if self.len == 0 {
            return None;
        }
        self.slots[self.head].as_ref()
    }

    /// Iterate oldest-first
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        let capacity = self.capacity();
        (0..self.len).filter_map(move |i| self.slots[(self.head + i) % capacity].as_ref())
    }

    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Owned copy of all elements, oldest-first
    pub fn snapshot(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

/// One captured frame with its capture time (seconds since epoch)
#[derive(Debug, Clone)]
pub struct FrameEntry {
    pub timestamp: f64,
    pub frame: Frame,
}

/// Lock-guarded frame ring shared between the producer and readers.
///
/// Every operation holds the lock only for the copy in or out.
#[derive(Debug)]
pub struct FrameBuffer {
    inner: Mutex<RingBuffer<FrameEntry>>,
}

impl FrameBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(RingBuffer::with_capacity(capacity)),
        }
    }

    pub fn push(&self, timestamp: f64, frame: Frame) {
        self.inner.lock().push(FrameEntry { timestamp, frame });
    }

    /// Copy of the newest entry
    pub fn latest(&self) -> Option<FrameEntry> {
        self.inner.lock().latest().cloned()
    }

    /// Timestamp of the newest entry, without copying pixels
    pub fn latest_timestamp(&self) -> Option<f64> {
        self.inner.lock().latest().map(|e| e.timestamp)
    }

    /// Copy of every entry, oldest-first
    pub fn snapshot(&self) -> Vec<FrameEntry> {
        self.inner.lock().snapshot()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity()
    }
}
