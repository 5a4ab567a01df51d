//! Ordered completion queue.
//!
//! Operations are submitted in order and complete in whatever order the
//! network produces. The queue releases payloads strictly in submission order:
//! a completion for anything but the head is parked (the item is marked
//! blocked and its payload stashed) until every item before it has been
//! released, at which point the whole run of parked items cascades out.
//!
//! Not thread-safe. One owner drives it; see the runtime's queue actor.

use std::collections::VecDeque;
use std::fmt::Debug;

use crate::types::QueueError;

#[derive(Debug)]
struct QueueItem<K, T> {
    key: K,
    /// Completed out of order and waiting for its predecessors.
    blocked: bool,
    saved: Option<T>,
}

/// FIFO release of out-of-order completions.
#[derive(Debug)]
pub struct OrderedQueue<K, T> {
    items: VecDeque<QueueItem<K, T>>,
}

impl<K, T> Default for OrderedQueue<K, T> {
    fn default() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }
}

impl<K: PartialEq + Debug, T> OrderedQueue<K, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pending operation. Identities must be unique among pending items.
    pub fn submit(&mut self, key: K) -> Result<(), QueueError> {
        if self.position(&key).is_some() {
            return Err(QueueError::Duplicate(format!("{key:?}")));
        }
        self.items.push_back(QueueItem {
            key,
            blocked: false,
            saved: None,
        });
        Ok(())
    }

    /// Record a completion and return every item that is now releasable, in order.
    ///
    /// The returned vector is empty when the completion belongs to an item that
    /// still has unreleased predecessors.
    pub fn complete(&mut self, key: &K, payload: T) -> Result<Vec<(K, T)>, QueueError> {
        let index = self
            .position(key)
            .ok_or_else(|| QueueError::Unknown(format!("{key:?}")))?;

        if self.items[index].blocked {
            return Err(QueueError::AlreadyCompleted(format!("{key:?}")));
        }

        if index != 0 {
            let item = &mut self.items[index];
            item.blocked = true;
            item.saved = Some(payload);
            return Ok(Vec::new());
        }

        let mut released = Vec::new();
        if let Some(head) = self.items.pop_front() {
            released.push((head.key, payload));
        }
        while self.items.front().is_some_and(|item| item.blocked) {
            if let Some(item) = self.items.pop_front() {
                if let Some(saved) = item.saved {
                    released.push((item.key, saved));
                }
            }
        }
        Ok(released)
    }

    /// Number of items not yet released.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether `key` is submitted and not yet released.
    pub fn is_pending(&self, key: &K) -> bool {
        self.position(key).is_some()
    }

    /// Number of items that completed but are held behind an earlier item.
    pub fn blocked_count(&self) -> usize {
        self.items.iter().filter(|item| item.blocked).count()
    }

    fn position(&self, key: &K) -> Option<usize> {
        self.items.iter().position(|item| &item.key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(order: &[&'static str]) -> Vec<&'static str> {
        let mut queue = OrderedQueue::new();
        for key in ["a", "b", "c"] {
            queue.submit(key).unwrap();
        }
        let mut delivered = Vec::new();
        for key in order {
            for (k, payload) in queue.complete(key, format!("body-{key}")).unwrap() {
                assert_eq!(payload, format!("body-{k}"));
                delivered.push(k);
            }
        }
        assert!(queue.is_empty());
        delivered
    }

    #[test]
    fn test_in_order_completion() {
        assert_eq!(drive(&["a", "b", "c"]), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_out_of_order_completion() {
        assert_eq!(drive(&["b", "c", "a"]), vec!["a", "b", "c"]);
        assert_eq!(drive(&["c", "b", "a"]), vec!["a", "b", "c"]);
        assert_eq!(drive(&["a", "c", "b"]), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_cascade_stops_at_unblocked_item() {
        let mut queue = OrderedQueue::new();
        for key in 0..4u32 {
            queue.submit(key).unwrap();
        }
        assert!(queue.complete(&1, "one").unwrap().is_empty());
        assert!(queue.complete(&3, "three").unwrap().is_empty());
        assert_eq!(queue.blocked_count(), 2);

        let released = queue.complete(&0, "zero").unwrap();
        assert_eq!(released, vec![(0, "zero"), (1, "one")]);
        assert!(queue.is_pending(&2));
        assert!(queue.is_pending(&3));

        let released = queue.complete(&2, "two").unwrap();
        assert_eq!(released, vec![(2, "two"), (3, "three")]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_rejections_leave_queue_intact() {
        let mut queue = OrderedQueue::new();
        queue.submit("a").unwrap();
        queue.submit("b").unwrap();

        assert_eq!(
            queue.submit("a"),
            Err(QueueError::Duplicate("\"a\"".to_string()))
        );
        assert!(matches!(
            queue.complete(&"zz", 1),
            Err(QueueError::Unknown(_))
        ));
        assert!(queue.complete(&"b", 2).unwrap().is_empty());
        assert!(matches!(
            queue.complete(&"b", 3),
            Err(QueueError::AlreadyCompleted(_))
        ));

        assert_eq!(queue.complete(&"a", 1).unwrap(), vec![("a", 1), ("b", 2)]);
    }

    #[test]
    fn test_identity_reusable_after_release() {
        let mut queue = OrderedQueue::new();
        queue.submit("a").unwrap();
        assert_eq!(queue.complete(&"a", ()).unwrap().len(), 1);
        queue.submit("a").unwrap();
        assert_eq!(queue.len(), 1);
    }
}
