//! JSON emission (`spec.md` §4.7): turns a primary record, its optional twin, and
//! the configured feature flags/collaborators into one `{"flow": {...}}` object.
//!
//! Serialization streams directly to the [`serde_json`] `Serializer` rather than
//! building an intermediate DOM: the per-packet sequence (`non_norm_stats`) can run
//! to `2*L` entries per flow, and a deployment emitting flows continuously should
//! not pay for a throwaway buffer per flow.

use crate::collaborators::Collaborators;
use crate::config::FlowCacheConfig;
use crate::conntrack::record::FlowRecord;
use crate::conntrack::ExpiredFlow;
use crate::timestamp::Timestamp;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// Picks the earlier-starting side as the primary (`rec` in the original source):
/// its fields are printed unprefixed / as `o*`, the other side's as `i*`.
fn select_primary(flow: &ExpiredFlow) -> (&FlowRecord, Option<&FlowRecord>) {
    match &flow.twin {
        Some(twin) if twin.start < flow.record.start => (twin, Some(&flow.record)),
        Some(twin) => (&flow.record, Some(twin)),
        None => (&flow.record, None),
    }
}

/// Wraps one expired flow for serialization into a single newline-delimited JSON
/// record (`spec.md` §6).
pub struct FlowEmission<'a> {
    pub flow: &'a ExpiredFlow,
    pub cfg: &'a FlowCacheConfig,
    pub collaborators: &'a Collaborators,
}

impl<'a> FlowEmission<'a> {
    pub fn new(flow: &'a ExpiredFlow, cfg: &'a FlowCacheConfig, collaborators: &'a Collaborators) -> Self {
        FlowEmission {
            flow,
            cfg,
            collaborators,
        }
    }
}

impl<'a> Serialize for FlowEmission<'a> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut outer = serializer.serialize_map(Some(1))?;
        outer.serialize_entry(
            "flow",
            &FlowBody {
                flow: self.flow,
                cfg: self.cfg,
                collaborators: self.collaborators,
            },
        )?;
        outer.end()
    }
}

struct FlowBody<'a> {
    flow: &'a ExpiredFlow,
    cfg: &'a FlowCacheConfig,
    collaborators: &'a Collaborators,
}

impl<'a> Serialize for FlowBody<'a> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let (primary, twin) = select_primary(self.flow);
        let cfg = self.cfg;
        let collab = self.collaborators;

        let mut map = serializer.serialize_map(None)?;

        if let Some(anon) = collab.anonymizer.as_ref().and_then(|a| a.anonymize(primary.key.sa())) {
            map.serialize_entry("sa", &anon)?;
        } else {
            map.serialize_entry("sa", &primary.key.sa().to_string())?;
        }
        if let Some(anon) = collab.anonymizer.as_ref().and_then(|a| a.anonymize(primary.key.da())) {
            map.serialize_entry("da", &anon)?;
        } else {
            map.serialize_entry("da", &primary.key.da().to_string())?;
        }
        map.serialize_entry("pr", &primary.key.pr)?;
        map.serialize_entry("sp", &primary.key.sp)?;
        map.serialize_entry("dp", &primary.key.dp)?;

        if cfg.num_subnets > 0 {
            if let Some(labeler) = &collab.subnet_labeler {
                let sa_labels = labeler.labels(primary.key.sa());
                if !sa_labels.is_empty() {
                    map.serialize_entry("sa_labels", &sa_labels)?;
                }
                let da_labels = labeler.labels(primary.key.da());
                if !da_labels.is_empty() {
                    map.serialize_entry("da_labels", &da_labels)?;
                }
            }
        }

        map.serialize_entry("ob", &primary.ob)?;
        map.serialize_entry("op", &primary.np)?;
        if let Some(twin) = twin {
            map.serialize_entry("ib", &twin.ob)?;
            map.serialize_entry("ip", &twin.np)?;
        }

        let ts = match twin {
            Some(twin) => primary.start.min(twin.start),
            None => primary.start,
        };
        // `spec.md` §4.7 defines `te` as the later of the two ends. The original
        // source actually takes the *earlier* end here; spec.md's text is treated
        // as authoritative (see DESIGN.md).
        let te = match twin {
            Some(twin) => primary.end.max(twin.end),
            None => primary.end,
        };
        map.serialize_entry("ts", &ts.to_string())?;
        map.serialize_entry("te", &te.to_string())?;

        map.serialize_entry("ottl", &primary.ttl)?;
        if let Some(twin) = twin {
            map.serialize_entry("ittl", &twin.ttl)?;
        }

        if primary.tcp_initial_window_size != 0 {
            map.serialize_entry("otcp_win", &primary.tcp_initial_window_size)?;
        }
        if let Some(twin) = twin {
            if twin.tcp_initial_window_size != 0 {
                map.serialize_entry("itcp_win", &twin.tcp_initial_window_size)?;
            }
        }
        if primary.tcp_syn_size != 0 {
            map.serialize_entry("otcp_syn", &primary.tcp_syn_size)?;
        }
        if let Some(twin) = twin {
            if twin.tcp_syn_size != 0 {
                map.serialize_entry("itcp_syn", &twin.tcp_syn_size)?;
            }
        }
        serialize_tcp_option_counts(&mut map, "o", &primary.tcp_options)?;
        if let Some(twin) = twin {
            serialize_tcp_option_counts(&mut map, "i", &twin.tcp_options)?;
        }

        map.serialize_entry(
            "non_norm_stats",
            &NonNormStats {
                primary,
                twin,
                limit: cfg.num_pkt_len,
                ts_start: ts,
            },
        )?;

        if cfg.needs_byte_distribution() {
            let (total, counts, mean, stdev) = match twin {
                Some(twin) => crate::aggregate::ByteDistribution::merge_stats(&primary.byte_dist, &twin.byte_dist),
                None => (
                    primary.byte_dist.n,
                    primary.byte_dist.counts,
                    primary.byte_dist.mean(),
                    primary.byte_dist.stdev(),
                ),
            };
            if cfg.byte_distribution {
                map.serialize_entry("bd", &counts.to_vec())?;
                if total != 0 {
                    map.serialize_entry("bd_mean", &mean)?;
                    map.serialize_entry("bd_std", &stdev)?;
                }
            }
            if cfg.report_entropy && total != 0 {
                let entropy = crate::aggregate::shannon_entropy(&counts, total);
                map.serialize_entry("be", &entropy)?;
                map.serialize_entry("tbe", &(entropy * total as f64))?;
            }
        }

        if cfg.include_classifier {
            if let Some(classifier) = &collab.classifier {
                let score = classifier.score(primary, twin);
                map.serialize_entry("p_malware", &score)?;
            }
        }

        if cfg.report_wht {
            map.serialize_entry("wht", &primary.wht.coefficients)?;
        }

        if cfg.report_hd {
            map.serialize_entry("hd", &primary.hd.description)?;
        }

        if cfg.include_os {
            if let Some(fp) = &collab.os_fingerprinter {
                if let Some(os) = fp.identify(primary.ttl, primary.tcp_initial_window_size) {
                    map.serialize_entry("os", &os)?;
                }
            }
        }

        if cfg.include_tls {
            serialize_tls(&mut map, primary, twin)?;
        }

        if cfg.report_idp {
            if let Some(idp) = &primary.idp {
                map.serialize_entry("oidp", &hex::encode(idp))?;
            }
            if let Some(twin) = twin {
                if let Some(idp) = &twin.idp {
                    map.serialize_entry("iidp", &hex::encode(idp))?;
                }
            }
        }

        if cfg.report_dns && (primary.key.sp == 53 || primary.key.dp == 53) {
            map.serialize_entry("dns", &DnsNames { primary, twin })?;
        }

        let mut retrans = primary.retrans;
        let mut invalid = primary.invalid;
        if let Some(twin) = twin {
            retrans += twin.retrans;
            invalid += twin.invalid;
        }
        if retrans != 0 {
            map.serialize_entry("rtn", &retrans)?;
        }
        if invalid != 0 {
            map.serialize_entry("inv", &invalid)?;
        }
        if let Some(name) = primary.process_name.as_ref().or(twin.and_then(|t| t.process_name.as_ref())) {
            map.serialize_entry("exe", name)?;
        }

        if let Some(exp_type) = primary.exp_type {
            map.serialize_entry("x", exp_type.as_str())?;
        }

        map.end()
    }
}

fn serialize_tcp_option_counts<M: SerializeMap>(
    map: &mut M,
    prefix: &str,
    counts: &crate::conntrack::record::TcpOptionCounts,
) -> Result<(), M::Error> {
    if counts.nop != 0 {
        map.serialize_entry(&format!("{prefix}tcp_nop"), &counts.nop)?;
    }
    if counts.mss != 0 {
        map.serialize_entry(&format!("{prefix}tcp_mss"), &counts.mss)?;
    }
    if counts.wscale != 0 {
        map.serialize_entry(&format!("{prefix}tcp_wscale"), &counts.wscale)?;
    }
    if counts.sack != 0 {
        map.serialize_entry(&format!("{prefix}tcp_sack"), &counts.sack)?;
    }
    if counts.tstamp != 0 {
        map.serialize_entry(&format!("{prefix}tcp_tstamp"), &counts.tstamp)?;
    }
    Ok(())
}

fn serialize_tls<M: SerializeMap>(map: &mut M, primary: &FlowRecord, twin: Option<&FlowRecord>) -> Result<(), M::Error> {
    struct Tls<'a> {
        primary: &'a FlowRecord,
        twin: Option<&'a FlowRecord>,
    }
    impl<'a> Serialize for Tls<'a> {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            let mut m = serializer.serialize_map(None)?;
            if let Some(v) = self.primary.tls.version {
                m.serialize_entry("ov", &v)?;
            }
            if let Some(v) = self.twin.and_then(|t| t.tls.version) {
                m.serialize_entry("iv", &v)?;
            }
            if let Some(v) = self.primary.tls.client_key_length.or(self.twin.and_then(|t| t.tls.client_key_length)) {
                m.serialize_entry("client_key_length", &v)?;
            }
            if self.primary.tls.num_ciphersuites.is_some() {
                if let Some(r) = self.primary.tls.random {
                    m.serialize_entry("orandom", &hex::encode(r))?;
                }
            }
            if let Some(twin) = self.twin {
                if twin.tls.num_ciphersuites.is_some() {
                    if let Some(r) = twin.tls.random {
                        m.serialize_entry("irandom", &hex::encode(r))?;
                    }
                }
            }
            if let Some(sni) = self.primary.tls.sni.as_ref().or(self.twin.and_then(|t| t.tls.sni.as_ref())) {
                m.serialize_entry("sni", sni)?;
            }
            m.end()
        }
    }
    let has_any = primary.tls.version.is_some()
        || twin.map_or(false, |t| t.tls.version.is_some())
        || primary.tls.client_key_length.is_some()
        || primary.tls.sni.is_some();
    if has_any {
        map.serialize_entry("tls", &Tls { primary, twin })?;
    }
    Ok(())
}

struct DnsNames<'a> {
    primary: &'a FlowRecord,
    twin: Option<&'a FlowRecord>,
}

impl<'a> Serialize for DnsNames<'a> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(None)?;
        let count = match self.twin {
            Some(twin) => self.primary.dns_names.names.len().max(twin.dns_names.names.len()),
            None => self.primary.dns_names.names.len(),
        };
        for i in 0..count {
            let q = self.primary.dns_names.names.get(i).cloned().unwrap_or_default();
            match self.twin {
                Some(twin) => {
                    let r = twin.dns_names.names.get(i).cloned().unwrap_or_default();
                    seq.serialize_element(&DnsEntry { qn: q, rn: Some(r) })?;
                }
                None => seq.serialize_element(&DnsEntry { qn: q, rn: None })?,
            }
        }
        seq.end()
    }
}

#[derive(Serialize)]
struct DnsEntry {
    qn: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    rn: Option<String>,
}

/// Streams the merged (if bidirectional) per-packet `{b|rep, dir, ipt}` sequence
/// (`spec.md` §4.7), without collecting into an intermediate `Vec`.
struct NonNormStats<'a> {
    primary: &'a FlowRecord,
    twin: Option<&'a FlowRecord>,
    limit: usize,
    ts_start: Timestamp,
}

impl<'a> Serialize for NonNormStats<'a> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(None)?;
        match self.twin {
            None => {
                let imax = self.primary.pkt_len.len().min(self.limit);
                let mut prev: Option<Timestamp> = None;
                for i in 0..imax {
                    let ts = self.primary.pkt_time[i];
                    let ipt = prev.map_or(0, |p| ts.delta_millis(&p));
                    seq.serialize_element(&PacketEntry {
                        len: self.primary.pkt_len[i],
                        dir: "<",
                        ipt,
                    })?;
                    prev = Some(ts);
                }
            }
            Some(twin) => {
                let imax = self.primary.pkt_len.len().min(self.limit);
                let jmax = twin.pkt_len.len().min(self.limit);
                let (mut i, mut j) = (0usize, 0usize);
                let mut prev = self.ts_start;
                while i < imax || j < jmax {
                    let take_primary = if i >= imax {
                        false
                    } else if j >= jmax {
                        true
                    } else {
                        self.primary.pkt_time[i] < twin.pkt_time[j]
                    };
                    let (ts, len, dir) = if take_primary {
                        let v = (self.primary.pkt_time[i], self.primary.pkt_len[i], ">");
                        i += 1;
                        v
                    } else {
                        let v = (twin.pkt_time[j], twin.pkt_len[j], "<");
                        j += 1;
                        v
                    };
                    let ipt = ts.delta_millis(&prev);
                    seq.serialize_element(&PacketEntry { len, dir, ipt })?;
                    prev = ts;
                }
            }
        }
        seq.end()
    }
}

struct PacketEntry {
    len: u32,
    dir: &'static str,
    ipt: u64,
}

impl Serialize for PacketEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut m = serializer.serialize_map(Some(3))?;
        if self.len < 32768 {
            m.serialize_entry("b", &self.len)?;
        } else {
            m.serialize_entry("rep", &(65536u32 - self.len))?;
        }
        m.serialize_entry("dir", self.dir)?;
        m.serialize_entry("ipt", &self.ipt)?;
        m.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conntrack::flow_key::FlowKey;

    fn key() -> FlowKey {
        FlowKey::new("10.0.0.1".parse().unwrap(), "10.0.0.2".parse().unwrap(), 1234, 80, 6)
    }

    fn record_with_packets(start: u64, lens_times: &[(u32, u64)]) -> FlowRecord {
        let mut r = FlowRecord::new(key());
        r.start = Timestamp::new(start, 0);
        for &(len, t) in lens_times {
            r.pkt_len.push(len);
            r.pkt_time.push(Timestamp::new(t, 0));
            r.np += 1;
            r.op += 1;
            r.ob += len as u64;
            r.end = Timestamp::new(t, 0);
        }
        r
    }

    #[test]
    fn unidirectional_emission_has_no_ib_ip_and_dir_out() {
        let record = record_with_packets(1, &[(100, 1)]);
        let twin: Option<FlowRecord> = None;
        let flow = ExpiredFlow { record, twin };
        let cfg = FlowCacheConfig::default();
        let collab = Collaborators::default();
        let json = serde_json::to_value(FlowEmission::new(&flow, &cfg, &collab)).unwrap();
        let f = &json["flow"];
        assert!(f.get("ib").is_none());
        assert_eq!(f["non_norm_stats"][0]["dir"], "<");
        assert_eq!(f["non_norm_stats"][0]["b"], 100);
    }

    #[test]
    fn bidirectional_emission_merges_by_timestamp() {
        let record = record_with_packets(1, &[(100, 1), (50, 3)]);
        let twin = Some(record_with_packets(1, &[(40, 2)]));
        let flow = ExpiredFlow { record, twin };
        let cfg = FlowCacheConfig::default();
        let collab = Collaborators::default();
        let json = serde_json::to_value(FlowEmission::new(&flow, &cfg, &collab)).unwrap();
        let f = &json["flow"];
        assert_eq!(f["ib"], 40);
        let stats = f["non_norm_stats"].as_array().unwrap();
        assert_eq!(stats.len(), 3);
        assert_eq!(stats[0]["dir"], ">");
        assert_eq!(stats[1]["dir"], "<");
        assert_eq!(stats[2]["dir"], ">");
    }

    #[test]
    fn payload_at_or_above_32768_is_encoded_as_rep() {
        let record = record_with_packets(1, &[(40000, 1)]);
        let flow = ExpiredFlow { record, twin: None };
        let cfg = FlowCacheConfig::default();
        let collab = Collaborators::default();
        let json = serde_json::to_value(FlowEmission::new(&flow, &cfg, &collab)).unwrap();
        let entry = &json["flow"]["non_norm_stats"][0];
        assert!(entry.get("b").is_none());
        assert_eq!(entry["rep"], 65536 - 40000);
    }

    #[test]
    fn exp_type_marker_is_a_or_i() {
        let mut record = record_with_packets(1, &[(1, 1)]);
        record.exp_type = Some(crate::conntrack::record::ExpType::Inactive);
        let flow = ExpiredFlow { record, twin: None };
        let cfg = FlowCacheConfig::default();
        let collab = Collaborators::default();
        let json = serde_json::to_value(FlowEmission::new(&flow, &cfg, &collab)).unwrap();
        assert_eq!(json["flow"]["x"], "i");
    }
}
