//! The active/inactive expiration state machine (`spec.md` §4.6).

use crate::conntrack::record::{ExpType, FlowRecord};
use crate::timestamp::Timestamp;

/// `true` iff `r` (with optional twin `t`) is active-expired at `now`: `r.start`
/// (and `t.start`, if present) precede `active_cutoff = now - W - A`. The
/// both-sides condition is essential — a quiet back-channel must not prematurely
/// expire an active forward channel.
pub fn is_active_expired(r: &FlowRecord, t: Option<&FlowRecord>, active_cutoff: Timestamp) -> bool {
    r.start.precedes(&active_cutoff) && t.map_or(true, |t| t.start.precedes(&active_cutoff))
}

/// `true` iff `r` (with optional twin `t`) is inactive-expired at `now`: `r.end`
/// (and `t.end`, if present) precede `inactive_cutoff = now - W`.
pub fn is_inactive_expired(r: &FlowRecord, t: Option<&FlowRecord>, inactive_cutoff: Timestamp) -> bool {
    r.end.precedes(&inactive_cutoff) && t.map_or(true, |t| t.end.precedes(&inactive_cutoff))
}

/// Combined check used by the sweeper: active expiration takes priority (sets
/// [`ExpType::Active`]); otherwise falls back to the inactive check.
pub fn expiration_of(
    r: &FlowRecord,
    t: Option<&FlowRecord>,
    active_cutoff: Timestamp,
    inactive_cutoff: Timestamp,
) -> Option<ExpType> {
    if is_active_expired(r, t, active_cutoff) {
        Some(ExpType::Active)
    } else if is_inactive_expired(r, t, inactive_cutoff) {
        Some(ExpType::Inactive)
    } else {
        None
    }
}

/// The second, lookup-embedded active check (`spec.md` §4.3 step 2, §4.6): `true`
/// iff `r`'s (and, if present, `t`'s) total lifetime exceeds `active_max = W + A`,
/// measured from each record's own start/end rather than against a wall-clock
/// cutoff. Prevents indefinitely long flows from starving the periodic sweeper.
pub fn is_past_active_expiration(r: &FlowRecord, t: Option<&FlowRecord>, active_max: u64) -> bool {
    r.duration_secs() > active_max && t.map_or(true, |t| t.duration_secs() > active_max)
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

    fn record_at(start: u64, end: u64) -> FlowRecord {
        let mut r = FlowRecord::new(key());
        r.start = Timestamp::new(start, 0);
        r.end = Timestamp::new(end, 0);
        r
    }

    #[test]
    fn active_expiration_requires_both_sides_past_cutoff() {
        let r = record_at(0, 5);
        let quiet_twin = record_at(50, 50); // twin started recently: not expired.
        let cutoff = Timestamp::new(30, 0);
        assert!(is_active_expired(&r, None, cutoff));
        assert!(!is_active_expired(&r, Some(&quiet_twin), cutoff));
    }

    #[test]
    fn inactive_expiration_unidirectional() {
        let r = record_at(1, 1);
        assert!(is_inactive_expired(&r, None, Timestamp::new(12, 0)));
        assert!(!is_inactive_expired(&r, None, Timestamp::new(1, 0)));
    }

    #[test]
    fn past_active_expiration_uses_duration_not_wall_clock() {
        let r = record_at(0, 31);
        assert!(is_past_active_expiration(&r, None, 30));
        let short = record_at(0, 20);
        assert!(!is_past_active_expiration(&short, None, 30));
    }
}
