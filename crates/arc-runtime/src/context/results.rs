//! Published pipes, keyed by invocation.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use uuid::Uuid;

use arc_core::Pipe;

const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Default)]
struct Slots {
    last_pre: Option<Pipe>,
    latest: Option<Uuid>,
    by_id: HashMap<Uuid, Pipe>,
    order: VecDeque<Uuid>,
}

/// Bounded store of finished pipes. The oldest result is evicted first.
#[derive(Debug)]
pub struct ResultSlots {
    slots: Mutex<Slots>,
    capacity: usize,
}

impl Default for ResultSlots {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl ResultSlots {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Mutex::new(Slots::default()),
            capacity: capacity.max(1),
        }
    }

    /// Pipe as it left the most recent pre-hook.
    pub fn publish_pre(&self, pipe: &Pipe) {
        self.lock().last_pre = Some(pipe.clone());
    }

    pub fn publish(&self, invocation: Uuid, pipe: &Pipe) {
        let mut slots = self.lock();
        if slots.by_id.insert(invocation, pipe.clone()).is_none() {
            slots.order.push_back(invocation);
        }
        slots.latest = Some(invocation);
        while slots.order.len() > self.capacity {
            if let Some(evicted) = slots.order.pop_front() {
                slots.by_id.remove(&evicted);
            }
        }
    }

    pub fn get(&self, invocation: &Uuid) -> Option<Pipe> {
        self.lock().by_id.get(invocation).cloned()
    }

    pub fn last_pre(&self) -> Option<Pipe> {
        self.lock().last_pre.clone()
    }

    /// Most recently published result, with its invocation id.
    pub fn latest(&self) -> Option<(Uuid, Pipe)> {
        let slots = self.lock();
        let id = slots.latest?;
        slots.by_id.get(&id).cloned().map(|pipe| (id, pipe))
    }

    pub fn len(&self) -> usize {
        self.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyed_by_invocation() {
        let slots = ResultSlots::default();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        slots.publish(a, &Pipe::new("first"));
        slots.publish(b, &Pipe::new("second"));

        assert_eq!(slots.get(&a).unwrap().model, "first");
        assert_eq!(slots.get(&b).unwrap().model, "second");
        let (latest, pipe) = slots.latest().unwrap();
        assert_eq!(latest, b);
        assert_eq!(pipe.model, "second");
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let slots = ResultSlots::with_capacity(2);
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            slots.publish(*id, &Pipe::new("m"));
        }
        assert_eq!(slots.len(), 2);
        assert!(slots.get(&ids[0]).is_none());
        assert!(slots.get(&ids[2]).is_some());
    }

    #[test]
    fn test_last_pre() {
        let slots = ResultSlots::default();
        assert!(slots.last_pre().is_none());
        slots.publish_pre(&Pipe::new("m"));
        assert_eq!(slots.last_pre().unwrap().model, "m");
        assert!(slots.is_empty());
    }
}
