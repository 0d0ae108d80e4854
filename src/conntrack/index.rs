//! The bucketed hash index (`spec.md` §3 Index, §4.2).
//!
//! A fixed-size array of bucket heads; within a bucket, records form a doubly-linked
//! list with insertion at the head. Maintains invariant I1: a record is in exactly
//! one bucket, namely `bucket(hash(record.key))`.

use crate::conntrack::arena::{Arena, RecordId};
use crate::conntrack::flow_key::{FlowKey, MatchMethod, NUM_BUCKETS};

pub(super) struct Index {
    heads: Vec<Option<RecordId>>,
}

impl Index {
    pub fn new() -> Self {
        Index {
            heads: vec![None; NUM_BUCKETS],
        }
    }

    fn bucket(&self, key: &FlowKey, method: MatchMethod) -> usize {
        key.hash(method) as usize
    }

    /// Finds the record in `key`'s bucket whose key equals `key` exactly.
    pub fn find_by_key(&self, arena: &Arena, key: &FlowKey, method: MatchMethod) -> Option<RecordId> {
        let mut cur = self.heads[self.bucket(key, method)];
        while let Some(id) = cur {
            let slot = arena.get(id);
            if slot.record.key == *key {
                return Some(id);
            }
            cur = slot.bucket_next;
        }
        None
    }

    /// Scans `key`'s bucket for a record whose key is `key`'s twin (used in
    /// [`MatchMethod::Near`] mode, where twins share a bucket; `spec.md` §4.1).
    pub fn find_twin_by_key(
        &self,
        arena: &Arena,
        key: &FlowKey,
        method: MatchMethod,
    ) -> Option<RecordId> {
        let mut cur = self.heads[self.bucket(key, method)];
        while let Some(id) = cur {
            let slot = arena.get(id);
            if key.is_twin_of(&slot.record.key, method) {
                return Some(id);
            }
            cur = slot.bucket_next;
        }
        None
    }

    /// Inserts `id` at the head of its bucket (I1: the record must already carry the
    /// key it will be found by).
    pub fn prepend(&mut self, arena: &mut Arena, id: RecordId, method: MatchMethod) {
        let key = arena.get(id).record.key;
        let bucket = self.bucket(&key, method);
        let old_head = self.heads[bucket];
        {
            let slot = arena.get_mut(id);
            slot.bucket_prev = None;
            slot.bucket_next = old_head;
        }
        if let Some(head) = old_head {
            arena.get_mut(head).bucket_prev = Some(id);
        }
        self.heads[bucket] = Some(id);
    }

    /// Unlinks `id` from its bucket. Asserts on a head/record mismatch, which would
    /// indicate arena corruption (`spec.md` §7).
    pub fn remove(&mut self, arena: &mut Arena, id: RecordId, method: MatchMethod) {
        let key = arena.get(id).record.key;
        let bucket = self.bucket(&key, method);
        let (prev, next) = {
            let slot = arena.get(id);
            (slot.bucket_prev, slot.bucket_next)
        };

        match prev {
            Some(p) => arena.get_mut(p).bucket_next = next,
            None => {
                assert_eq!(
                    self.heads[bucket],
                    Some(id),
                    "bucket head does not match record being removed: arena corruption"
                );
                self.heads[bucket] = next;
            }
        }
        if let Some(n) = next {
            arena.get_mut(n).bucket_prev = prev;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conntrack::record::FlowRecord;

    fn key(sp: u16) -> FlowKey {
        FlowKey {
            sa: 1,
            da: 2,
            sp,
            dp: 80,
            pr: 6,
        }
    }

    #[test]
    fn prepend_then_find() {
        let mut arena = Arena::new();
        let mut index = Index::new();
        let id = arena.insert(FlowRecord::new(key(1)));
        index.prepend(&mut arena, id, MatchMethod::Exact);
        assert_eq!(
            index.find_by_key(&arena, &key(1), MatchMethod::Exact),
            Some(id)
        );
        assert_eq!(index.find_by_key(&arena, &key(2), MatchMethod::Exact), None);
    }

    #[test]
    fn remove_updates_head_and_clears_new_head_prev() {
        let mut arena = Arena::new();
        let mut index = Index::new();
        // Force a collision by using the near-match hash which only depends on
        // ports/protocol, identical here.
        let a = arena.insert(FlowRecord::new(key(1)));
        let b = arena.insert(FlowRecord::new(key(1)));
        index.prepend(&mut arena, a, MatchMethod::Exact);
        index.prepend(&mut arena, b, MatchMethod::Exact);
        // b is now head, a is next.
        index.remove(&mut arena, b, MatchMethod::Exact);
        assert!(arena.get(a).bucket_prev.is_none());
        assert_eq!(
            index.find_by_key(&arena, &key(1), MatchMethod::Exact),
            Some(a)
        );
    }

    #[test]
    fn near_mode_twin_scan_finds_same_bucket_entry() {
        let mut arena = Arena::new();
        let mut index = Index::new();
        let fwd = FlowKey {
            sa: 0x0101_0101,
            da: 0x0202_0202,
            sp: 5000,
            dp: 80,
            pr: 6,
        };
        let id = arena.insert(FlowRecord::new(fwd));
        index.prepend(&mut arena, id, MatchMethod::Near);

        let nat_reverse = FlowKey {
            sa: 0x0909_0909,
            da: 0x0303_0303,
            sp: 80,
            dp: 5000,
            pr: 6,
        };
        assert_eq!(
            index.find_twin_by_key(&arena, &nat_reverse, MatchMethod::Near),
            Some(id)
        );
    }
}
