//! Monotonic release queues (spec §4.7): each queue appends items with
//! an ever-increasing sequence number, hands out a [`Checkpoint`]
//! marking "everything appended so far," and later releases (drains)
//! the prefix up to a checkpoint once the snapshot that covers it has
//! landed. This is append-then-confirm, the same shape
//! `magnetar::migration`'s dual-write uses for a cutover point, applied
//! to a single in-memory queue instead of two backends.

use std::collections::VecDeque;

/// Opaque cookie marking a prefix of a [`ReleaseQueue`] as of the moment
/// it was taken. Only meaningful against the queue that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Checkpoint(pub u64);

#[derive(Debug, Clone)]
pub struct ReleaseQueue<T> {
    items: VecDeque<(u64, T)>,
    next_seq: u64,
}

impl<T> Default for ReleaseQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ReleaseQueue<T> {
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
            next_seq: 0,
        }
    }

    /// Appends an item, returning its sequence number.
    pub fn push(&mut self, item: T) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.items.push_back((seq, item));
        seq
    }

    /// A cookie covering every item appended so far.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.next_seq)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drains and returns every item appended strictly before
    /// `checkpoint` was taken. Items pushed after the checkpoint stay
    /// queued.
    pub fn release_through(&mut self, checkpoint: Checkpoint) -> Vec<T> {
        let mut released = Vec::new();
        while let Some((seq, _)) = self.items.front() {
            if *seq >= checkpoint.0 {
                break;
            }
            let (_, item) = self.items.pop_front().unwrap();
            released.push(item);
        }
        released
    }
}
