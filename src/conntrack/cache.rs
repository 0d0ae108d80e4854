//! The flow cache (`spec.md` §3, §4): lookup-or-insert, twin pairing, extractor
//! dispatch, and expiration.

use crate::collaborators::Collaborators;
use crate::config::FlowCacheConfig;
use crate::conntrack::arena::{Arena, RecordId};
use crate::conntrack::chrono::ChronoList;
use crate::conntrack::expiration::{expiration_of, is_past_active_expiration};
use crate::conntrack::flow_key::{FlowKey, MatchMethod};
use crate::conntrack::index::Index;
use crate::conntrack::record::{ExpType, FlowRecord};
use crate::packet::Packet;
use crate::stats::CacheStats;
use crate::timestamp::Timestamp;

/// A flow removed from the cache, ready for emission.
///
/// `record` and `twin` are not ordered by direction — [`crate::emit`] picks
/// whichever side started first as the primary when serializing (`spec.md` §4.7).
#[derive(Debug)]
pub struct ExpiredFlow {
    pub record: FlowRecord,
    pub twin: Option<FlowRecord>,
}

/// The central flow cache: a bucketed hash index and a chronological list, both
/// addressing into a shared arena of [`FlowRecord`]s (`spec.md` §3, §9).
pub struct FlowCache {
    arena: Arena,
    index: Index,
    chrono: ChronoList,
    cfg: FlowCacheConfig,
    pub collaborators: Collaborators,
    pub stats: CacheStats,
}

impl FlowCache {
    pub fn new(cfg: FlowCacheConfig) -> Self {
        FlowCache::with_collaborators(cfg, Collaborators::default())
    }

    pub fn with_collaborators(cfg: FlowCacheConfig, collaborators: Collaborators) -> Self {
        FlowCache {
            arena: Arena::new(),
            index: Index::new(),
            chrono: ChronoList::new(),
            cfg,
            collaborators,
            stats: CacheStats::default(),
        }
    }

    pub fn config(&self) -> &FlowCacheConfig {
        &self.cfg
    }

    /// Feeds one packet into the cache (`spec.md` §4.2-§4.4): finds or creates the
    /// owning record, forcing an early expiration first if the matched record (and
    /// its twin) has already exceeded its maximum lifetime, then aggregates the
    /// packet into it and runs the feature extractors.
    ///
    /// Returns the forced-out flow, if the embedded lifetime check fired. If the
    /// packet would require a brand new record and the cache is at its configured
    /// capacity (`spec.md` §7 "allocation failure"), the packet is dropped:
    /// `stats.malloc_fail` is incremented and `process` returns `None` without
    /// aggregating it anywhere.
    pub fn process(&mut self, pkt: &Packet) -> Option<ExpiredFlow> {
        self.stats.num_packets += 1;
        self.stats.num_bytes += pkt.payload.len() as u64;

        let method = self.cfg.flow_key_match_method;
        let mut forced = None;

        let id = match self.index.find_by_key(&self.arena, &pkt.key, method) {
            Some(existing) => {
                let twin_id = self.arena.get(existing).twin;
                let past = {
                    let r = &self.arena.get(existing).record;
                    let t = twin_id.map(|t| &self.arena.get(t).record);
                    is_past_active_expiration(r, t, self.cfg.active_max())
                };
                if past {
                    forced = Some(self.expire_and_remove(existing, ExpType::Active));
                    match self.lookup_or_insert(pkt.key, method) {
                        Some(id) => id,
                        None => return forced,
                    }
                } else {
                    existing
                }
            }
            None => match self.lookup_or_insert(pkt.key, method) {
                Some(id) => id,
                None => return None,
            },
        };

        self.aggregate_packet(id, pkt);
        forced
    }

    /// Whether the arena already holds `max_records` resident records, per
    /// [`FlowCacheConfig::max_records`]. Always `false` when unset.
    fn at_capacity(&self) -> bool {
        self.cfg
            .max_records
            .map_or(false, |max| self.arena.len() >= max)
    }

    /// Finds or creates the record for `key`. Returns `None` (bumping
    /// `stats.malloc_fail`) if a new record is needed but the cache is full.
    fn lookup_or_insert(&mut self, key: FlowKey, method: MatchMethod) -> Option<RecordId> {
        if self.at_capacity() {
            self.stats.malloc_fail += 1;
            log::warn!(
                "flow table at capacity ({} records); dropping packet for {:?}",
                self.arena.len(),
                key,
            );
            return None;
        }

        if !self.cfg.bidir {
            return Some(self.create_standalone(key));
        }

        let twin_candidate = match method {
            MatchMethod::Exact => self.index.find_by_key(&self.arena, &key.swapped(), method),
            MatchMethod::Near => self.index.find_twin_by_key(&self.arena, &key, method),
        };

        match twin_candidate {
            Some(twin_id) if self.arena.get(twin_id).twin.is_none() => {
                let new_id = self.arena.insert(FlowRecord::new(key));
                self.index.prepend(&mut self.arena, new_id, method);
                self.arena.get_mut(new_id).twin = Some(twin_id);
                self.arena.get_mut(twin_id).twin = Some(new_id);
                self.stats.num_records_in_table += 1;
                Some(new_id)
            }
            Some(twin_id) => {
                log::warn!(
                    "refusing to pair {:?} as a third twin of the already-paired flow {:?}",
                    key,
                    self.arena.get(twin_id).record.key,
                );
                Some(self.create_standalone(key))
            }
            None => Some(self.create_standalone(key)),
        }
    }

    fn create_standalone(&mut self, key: FlowKey) -> RecordId {
        let id = self.arena.insert(FlowRecord::new(key));
        self.index
            .prepend(&mut self.arena, id, self.cfg.flow_key_match_method);
        self.chrono.append(&mut self.arena, id);
        self.arena.get_mut(id).in_chrono = true;
        self.stats.num_records_in_table += 1;
        id
    }

    fn aggregate_packet(&mut self, id: RecordId, pkt: &Packet) {
        let slot = self.arena.get_mut(id);
        slot.record.aggregate(pkt, &self.cfg);

        if self.cfg.include_tls {
            self.collaborators.tls.update(&mut slot.record.tls, pkt);
        }
        if self.cfg.report_dns && (pkt.key.sp == 53 || pkt.key.dp == 53) {
            self.collaborators
                .dns
                .update(&mut slot.record.dns_names, pkt);
        }
        if self.cfg.report_wht {
            self.collaborators.wht.update(&mut slot.record.wht, pkt);
        }
        if self.cfg.report_hd {
            self.collaborators.hd.update(&mut slot.record.hd, pkt);
        }
    }

    fn cutoffs(&self, now: Timestamp) -> (Timestamp, Timestamp) {
        let active_secs = now
            .secs
            .saturating_sub(self.cfg.active_timeout + self.cfg.active_timeout_grace);
        let inactive_secs = now.secs.saturating_sub(self.cfg.active_timeout);
        (
            Timestamp::new(active_secs, now.micros),
            Timestamp::new(inactive_secs, now.micros),
        )
    }

    /// Expires every record (and twin, if present) past its active or inactive
    /// timeout, walking the chronological list from its head. The list is ordered
    /// non-decreasingly by `start`, so the scan stops at the first record that is
    /// not yet expired (`spec.md` §4.6, §9).
    pub fn sweep(&mut self, now: Timestamp) -> Vec<ExpiredFlow> {
        let (active_cutoff, inactive_cutoff) = self.cutoffs(now);
        let mut out = Vec::new();
        loop {
            let id = match self.chrono.first() {
                Some(id) => id,
                None => break,
            };
            let twin_id = self.arena.get(id).twin;
            let exp = {
                let r = &self.arena.get(id).record;
                let t = twin_id.map(|t| &self.arena.get(t).record);
                expiration_of(r, t, active_cutoff, inactive_cutoff)
            };
            match exp {
                Some(exp_type) => out.push(self.expire_and_remove(id, exp_type)),
                None => break,
            }
        }
        out
    }

    /// Force-expires every resident record regardless of timeout, for a clean
    /// shutdown (`spec.md` §5).
    pub fn drain(&mut self) -> Vec<ExpiredFlow> {
        let mut out = Vec::new();
        while let Some(id) = self.chrono.first() {
            out.push(self.expire_and_remove(id, ExpType::Active));
        }
        out
    }

    fn expire_and_remove(&mut self, id: RecordId, exp_type: ExpType) -> ExpiredFlow {
        let method = self.cfg.flow_key_match_method;
        let twin_id = self.arena.get(id).twin;

        self.index.remove(&mut self.arena, id, method);
        if self.arena.get(id).in_chrono {
            self.chrono.remove(&mut self.arena, id);
        }
        let mut slot = self.arena.remove(id);
        slot.record.exp_type = Some(exp_type);
        self.stats.num_records_in_table -= 1;
        self.stats.num_records_output += 1;

        let twin = twin_id.map(|tid| {
            self.index.remove(&mut self.arena, tid, method);
            if self.arena.get(tid).in_chrono {
                self.chrono.remove(&mut self.arena, tid);
            }
            let mut tslot = self.arena.remove(tid);
            tslot.record.exp_type = Some(exp_type);
            self.stats.num_records_in_table -= 1;
            tslot.record
        });

        ExpiredFlow {
            record: slot.record,
            twin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::TcpInfo;

    fn pkt(key: FlowKey, t: u64, payload: &[u8]) -> Packet<'_> {
        Packet {
            key,
            timestamp: Timestamp::new(t, 0),
            ttl: 64,
            payload,
            tcp: Some(TcpInfo::default()),
            tls_record_type: None,
        }
    }

    fn fwd() -> FlowKey {
        FlowKey::new("10.0.0.1".parse().unwrap(), "10.0.0.2".parse().unwrap(), 1234, 80, 6)
    }

    fn rev() -> FlowKey {
        fwd().swapped()
    }

    #[test]
    fn unidirectional_flow_has_no_twin_on_expiration() {
        let mut cache = FlowCache::new(FlowCacheConfig::default());
        cache.process(&pkt(fwd(), 1, &[1, 2, 3]));
        let expired = cache.drain();
        assert_eq!(expired.len(), 1);
        assert!(expired[0].twin.is_none());
        assert_eq!(expired[0].record.op, 1);
    }

    #[test]
    fn reverse_packet_pairs_as_twin() {
        let mut cache = FlowCache::new(FlowCacheConfig::default());
        cache.process(&pkt(fwd(), 1, &[1, 2, 3]));
        cache.process(&pkt(rev(), 2, &[4, 5]));
        let expired = cache.drain();
        assert_eq!(expired.len(), 1);
        assert!(expired[0].twin.is_some());
    }

    #[test]
    fn third_flow_on_already_paired_near_twin_refuses_and_stands_alone() {
        // Near mode pairs on sorted ports/protocol alone, so a third, differently
        // addressed flow sharing the same ports as an already-paired pair must not
        // attach as a third twin.
        let mut cfg = FlowCacheConfig::default();
        cfg.flow_key_match_method = MatchMethod::Near;
        let mut cache = FlowCache::new(cfg);
        cache.process(&pkt(fwd(), 1, &[1]));
        cache.process(&pkt(rev(), 2, &[2]));
        let third = FlowKey::new("10.0.0.9".parse().unwrap(), "10.0.0.8".parse().unwrap(), 1234, 80, 6);
        cache.process(&pkt(third, 3, &[3]));
        let expired = cache.drain();
        assert_eq!(expired.len(), 2);
        let paired = expired.iter().find(|f| f.twin.is_some()).unwrap();
        let standalone = expired.iter().find(|f| f.twin.is_none()).unwrap();
        assert_eq!(paired.record.op + paired.twin.as_ref().unwrap().op, 2);
        assert_eq!(standalone.record.op, 1);
    }

    #[test]
    fn sweep_expires_inactive_flow_and_stops_at_first_unexpired() {
        // Default timeouts: W=10, A=20, so active_cutoff = now-30, inactive_cutoff = now-10.
        let mut cache = FlowCache::new(FlowCacheConfig::default());
        cache.process(&pkt(fwd(), 1, &[1]));
        let fresh_key = FlowKey::new("10.0.0.3".parse().unwrap(), "10.0.0.4".parse().unwrap(), 1, 2, 6);
        cache.process(&pkt(fresh_key, 195, &[1]));

        let expired = cache.sweep(Timestamp::new(200, 0));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].record.key, fwd());
        assert_eq!(cache.stats.num_records_in_table, 1);
    }

    #[test]
    fn embedded_lifetime_check_forces_early_expiration() {
        let mut cfg = FlowCacheConfig::default();
        cfg.active_timeout = 1;
        cfg.active_timeout_grace = 1;
        let mut cache = FlowCache::new(cfg);
        cache.process(&pkt(fwd(), 0, &[1]));
        // Pushes the record's own observed duration (end - start) past active_max=2.
        cache.process(&pkt(fwd(), 10, &[2]));
        let forced = cache.process(&pkt(fwd(), 11, &[3]));
        let forced = forced.expect("duration exceeding active_max must force expiration");
        assert_eq!(forced.record.op, 2);
        // the third packet started a brand new record for the same key
        let expired = cache.drain();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].record.op, 1);
    }

    #[test]
    fn capacity_bounded_cache_drops_and_counts_past_max_records() {
        let mut cfg = FlowCacheConfig::default();
        cfg.max_records = Some(1);
        let mut cache = FlowCache::new(cfg);

        cache.process(&pkt(fwd(), 1, &[1]));
        assert_eq!(cache.stats.num_records_in_table, 1);
        assert_eq!(cache.stats.malloc_fail, 0);

        let other_key = FlowKey::new("10.0.0.5".parse().unwrap(), "10.0.0.6".parse().unwrap(), 1, 2, 6);
        let result = cache.process(&pkt(other_key, 2, &[2]));
        assert!(result.is_none());
        assert_eq!(cache.stats.malloc_fail, 1);
        assert_eq!(cache.stats.num_records_in_table, 1);

        // The resident flow is unaffected and still aggregates normally.
        cache.process(&pkt(fwd(), 3, &[3]));
        let expired = cache.drain();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].record.op, 2);
    }
}
