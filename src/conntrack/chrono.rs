//! The chronological list (`spec.md` §3, invariant I2).
//!
//! Doubly-linked, ordered by the time a record was first observed. A record is a
//! member iff it has no twin yet or it is the primary of a pair (the twin itself is
//! addressable only through the pair pointer, never through this list) — invariant
//! I4. Because insertion is always at the tail in creation order, the list is
//! non-decreasingly ordered by `start`, letting the expiration sweep stop at the
//! first non-expired record.

use crate::conntrack::arena::{Arena, RecordId};

pub(super) struct ChronoList {
    head: Option<RecordId>,
    tail: Option<RecordId>,
}

impl ChronoList {
    pub fn new() -> Self {
        ChronoList {
            head: None,
            tail: None,
        }
    }

    pub fn first(&self) -> Option<RecordId> {
        self.head
    }

    pub fn append(&mut self, arena: &mut Arena, id: RecordId) {
        match self.tail {
            None => {
                self.head = Some(id);
                self.tail = Some(id);
            }
            Some(tail) => {
                arena.get_mut(tail).chrono_next = Some(id);
                arena.get_mut(id).chrono_prev = Some(tail);
                self.tail = Some(id);
            }
        }
    }

    pub fn remove(&mut self, arena: &mut Arena, id: RecordId) {
        let (prev, next) = {
            let slot = arena.get(id);
            (slot.chrono_prev, slot.chrono_next)
        };
        if self.head == Some(id) {
            self.head = next;
        }
        if self.tail == Some(id) {
            self.tail = prev;
        }
        if let Some(p) = prev {
            arena.get_mut(p).chrono_next = next;
        }
        if let Some(n) = next {
            arena.get_mut(n).chrono_prev = prev;
        }
        let slot = arena.get_mut(id);
        slot.chrono_prev = None;
        slot.chrono_next = None;
    }

    #[cfg(test)]
    pub fn iter<'a>(&self, arena: &'a Arena) -> Vec<RecordId> {
        let mut out = Vec::new();
        let mut cur = self.head;
        while let Some(id) = cur {
            out.push(id);
            cur = arena.get(id).chrono_next;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conntrack::flow_key::FlowKey;
    use crate::conntrack::record::FlowRecord;

    fn key() -> FlowKey {
        FlowKey {
            sa: 1,
            da: 2,
            sp: 3,
            dp: 4,
            pr: 6,
        }
    }

    #[test]
    fn append_preserves_order() {
        let mut arena = Arena::new();
        let mut list = ChronoList::new();
        let a = arena.insert(FlowRecord::new(key()));
        let b = arena.insert(FlowRecord::new(key()));
        let c = arena.insert(FlowRecord::new(key()));
        list.append(&mut arena, a);
        list.append(&mut arena, b);
        list.append(&mut arena, c);
        assert_eq!(list.iter(&arena), vec![a, b, c]);
    }

    #[test]
    fn remove_head_updates_head_and_new_heads_prev() {
        let mut arena = Arena::new();
        let mut list = ChronoList::new();
        let a = arena.insert(FlowRecord::new(key()));
        let b = arena.insert(FlowRecord::new(key()));
        list.append(&mut arena, a);
        list.append(&mut arena, b);
        list.remove(&mut arena, a);
        assert_eq!(list.first(), Some(b));
        assert!(arena.get(b).chrono_prev.is_none());
    }

    #[test]
    fn remove_tail_updates_tail() {
        let mut arena = Arena::new();
        let mut list = ChronoList::new();
        let a = arena.insert(FlowRecord::new(key()));
        let b = arena.insert(FlowRecord::new(key()));
        list.append(&mut arena, a);
        list.append(&mut arena, b);
        list.remove(&mut arena, b);
        assert_eq!(list.iter(&arena), vec![a]);
        list.remove(&mut arena, a);
        assert_eq!(list.iter(&arena), vec![]);
        assert!(list.head.is_none() && list.tail.is_none());
    }
}
