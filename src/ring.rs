//! Fixed-capacity ring buffer.
//!
//! Stores the newest N items in arrival order; pushing into a full buffer
//! displaces the oldest item.

use parking_lot::RwLock;
use std::collections::VecDeque;

/// A thread-safe circular buffer with overwrite-on-full semantics.
///
/// Items are kept in arrival order, oldest first. `push` and the read
/// methods take an internal lock, so a shared `RingBuffer` needs no
/// external coordination; readers always observe a consistent view.
pub struct RingBuffer<T> {
    items: RwLock<VecDeque<T>>,
    cap: usize,
}

impl<T: Clone> RingBuffer<T> {
    /// Create a buffer holding at most `cap` items.
    ///
    /// # Panics
    ///
    /// Panics if `cap` is zero.
    pub fn new(cap: usize) -> Self {
        assert!(cap > 0, "ring buffer capacity must be positive");
        Self {
            items: RwLock::new(VecDeque::with_capacity(cap)),
            cap,
        }
    }

    /// Append an item, displacing the oldest one when the buffer is full.
    pub fn push(&self, item: T) {
        let mut items = self.items.write();
        if items.len() == self.cap {
            items.pop_front();
        }
        items.push_back(item);
    }

    /// Current number of stored items, in `0..=cap()`.
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// True when no items are stored.
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Maximum number of items the buffer can hold.
    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Item at position `i`, where `0` is the oldest and `len() - 1` the
    /// newest.
    ///
    /// # Panics
    ///
    /// Panics if `i` is not in `0..len()`; indexing past the stored items
    /// is a programmer error.
    pub fn at(&self, i: usize) -> T {
        let items = self.items.read();
        match items.get(i) {
            Some(item) => item.clone(),
            None => panic!("ring buffer index {i} out of range for length {}", items.len()),
        }
    }

    /// Copy of all stored items, oldest to newest.
    pub fn snapshot(&self) -> Vec<T> {
        self.items.read().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_push_within_capacity() {
        let rb = RingBuffer::new(3);
        rb.push(1);
        rb.push(2);

        assert_eq!(rb.len(), 2);
        assert_eq!(rb.cap(), 3);
        assert_eq!(rb.snapshot(), vec![1, 2]);
    }

    #[test]
    fn test_overwrite_on_full() {
        let rb = RingBuffer::new(3);
        for i in 1..=4 {
            rb.push(i);
        }

        assert_eq!(rb.len(), 3);
        assert_eq!(rb.snapshot(), vec![2, 3, 4]);
    }

    #[test]
    fn test_retains_min_of_pushes_and_capacity() {
        for cap in 1..6usize {
            for pushes in 0..10usize {
                let rb = RingBuffer::new(cap);
                for i in 0..pushes {
                    rb.push(i);
                }
                assert_eq!(rb.len(), pushes.min(cap));
                let snap = rb.snapshot();
                if pushes > 0 {
                    assert_eq!(*snap.last().unwrap(), pushes - 1);
                }
                // Oldest-to-newest order.
                for w in snap.windows(2) {
                    assert!(w[0] < w[1]);
                }
            }
        }
    }

    #[test]
    fn test_capacity_one_keeps_newest() {
        let rb = RingBuffer::new(1);
        rb.push("a");
        rb.push("b");

        assert_eq!(rb.snapshot(), vec!["b"]);
    }

    #[test]
    fn test_at_by_index() {
        let rb = RingBuffer::new(2);
        rb.push(10);
        rb.push(20);
        rb.push(30);

        assert_eq!(rb.at(0), 20);
        assert_eq!(rb.at(1), 30);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_at_out_of_range_panics() {
        let rb = RingBuffer::new(3);
        rb.push(1);
        let _ = rb.at(1);
    }

    #[test]
    #[should_panic(expected = "capacity must be positive")]
    fn test_zero_capacity_panics() {
        let _ = RingBuffer::<i32>::new(0);
    }

    #[test]
    fn test_concurrent_push() {
        let rb = Arc::new(RingBuffer::new(64));
        let mut handles = vec![];
        for t in 0..4 {
            let rb = Arc::clone(&rb);
            handles.push(std::thread::spawn(move || {
                for i in 0..100 {
                    rb.push(t * 100 + i);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(rb.len(), 64);
    }
}
