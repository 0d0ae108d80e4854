//! Stable-index storage for flow records.
//!
//! `spec.md` §9 suggests two equivalent renderings of the original's raw
//! pointer-linked records: arena-allocated nodes addressed by a stable index, or
//! ownership in a primary container with non-owning handles elsewhere. We need two
//! independent secondary orderings (the hash-bucket chain and the chronological
//! list), so a single owning container is not enough; this arena is the backing
//! store both [`crate::conntrack::index::Index`] and
//! [`crate::conntrack::chrono::ChronoList`] address into via [`RecordId`].

use crate::conntrack::record::FlowRecord;

/// A stable handle to a slot in the arena. Never reused while the slot it names is
/// occupied; a stale `RecordId` dereferenced after its slot is freed is a detected
/// programming error (`spec.md` §5's "crash promptly on stale pointer" policy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId(u32);

pub(super) struct Slot {
    pub record: FlowRecord,
    pub bucket_prev: Option<RecordId>,
    pub bucket_next: Option<RecordId>,
    pub chrono_prev: Option<RecordId>,
    pub chrono_next: Option<RecordId>,
    pub twin: Option<RecordId>,
    /// Whether this slot is the member of its twin pair held in the chronological
    /// list (invariant I4): exactly one side of a pair is ever a member, namely
    /// whichever was created first.
    pub in_chrono: bool,
}

/// Arena of `Slot`s addressed by [`RecordId`], with a free list for reuse.
pub(super) struct Arena {
    slots: Vec<Option<Slot>>,
    free: Vec<u32>,
}

impl Arena {
    pub fn new() -> Self {
        Arena {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub fn insert(&mut self, record: FlowRecord) -> RecordId {
        let slot = Slot {
            record,
            bucket_prev: None,
            bucket_next: None,
            chrono_prev: None,
            chrono_next: None,
            twin: None,
            in_chrono: false,
        };
        if let Some(idx) = self.free.pop() {
            self.slots[idx as usize] = Some(slot);
            RecordId(idx)
        } else {
            self.slots.push(Some(slot));
            RecordId((self.slots.len() - 1) as u32)
        }
    }

    /// Removes and returns the slot at `id`. Panics if `id` is stale or already
    /// removed — an arena corruption signal, per `spec.md` §7's treatment of
    /// bucket/chrono-list mismatches as fatal.
    pub fn remove(&mut self, id: RecordId) -> Slot {
        let slot = self.slots[id.0 as usize]
            .take()
            .expect("removed a RecordId that is not occupied");
        self.free.push(id.0);
        slot
    }

    pub fn get(&self, id: RecordId) -> &Slot {
        self.slots[id.0 as usize]
            .as_ref()
            .expect("dereferenced a stale RecordId")
    }

    pub fn get_mut(&mut self, id: RecordId) -> &mut Slot {
        self.slots[id.0 as usize]
            .as_mut()
            .expect("dereferenced a stale RecordId")
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.slots
            .get(id.0 as usize)
            .map(|s| s.is_some())
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conntrack::flow_key::FlowKey;

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
    fn insert_remove_reuses_slot() {
        let mut arena = Arena::new();
        let a = arena.insert(FlowRecord::new(key()));
        assert_eq!(arena.len(), 1);
        arena.remove(a);
        assert_eq!(arena.len(), 0);
        let b = arena.insert(FlowRecord::new(key()));
        assert!(!arena.contains(a) || a == b);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    #[should_panic]
    fn double_remove_panics() {
        let mut arena = Arena::new();
        let a = arena.insert(FlowRecord::new(key()));
        arena.remove(a);
        arena.remove(a);
    }
}
