//! The per-flow mutable aggregate (`spec.md` §3).

use crate::aggregate::ByteDistribution;
use crate::config::FlowCacheConfig;
use crate::extractors::{DnsNames, HdState, TlsInfo, WhtState};
use crate::conntrack::flow_key::FlowKey;
use crate::packet::Packet;
use crate::timestamp::Timestamp;

/// Why a record was removed from the cache, printed as the `x` field at emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpType {
    Active,
    Inactive,
}

impl ExpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpType::Active => "a",
            ExpType::Inactive => "i",
        }
    }
}

/// Per-option TCP anomaly counters (`spec.md` §3 "TCP anomalies").
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpOptionCounts {
    pub nop: u32,
    pub mss: u32,
    pub wscale: u32,
    pub sack: u32,
    pub tstamp: u32,
}

/// One direction's worth of aggregated observations for a five-tuple.
///
/// A bidirectional conversation is represented as *two* `FlowRecord`s linked as
/// twins (see [`crate::conntrack::cache::FlowCache`]); this type never stores its
/// own twin's data, only its own direction's.
#[derive(Debug, Clone)]
pub struct FlowRecord {
    // --- identity ---
    pub key: FlowKey,
    pub start: Timestamp,
    pub end: Timestamp,
    /// Minimum TTL seen on this direction.
    pub ttl: u8,

    // --- counts ---
    /// Total packets observed, including those with no payload.
    pub np: u64,
    /// Packets that carried payload.
    pub op: u64,
    /// Total payload bytes.
    pub ob: u64,

    // --- per-packet arrays, valid in 0..min(op, L) ---
    pub pkt_len: Vec<u32>,
    pub pkt_time: Vec<Timestamp>,
    pub pkt_tcp_flags: Vec<u8>,
    pub pkt_tls_type: Vec<Option<u8>>,

    // --- byte distribution ---
    pub byte_dist: ByteDistribution,

    // --- TCP anomalies ---
    pub retrans: u32,
    pub invalid: u32,
    pub tcp_initial_window_size: u16,
    pub tcp_syn_size: u16,
    pub tcp_options: TcpOptionCounts,

    // --- extractor-owned sub-records ---
    pub tls: TlsInfo,
    pub wht: WhtState,
    pub hd: HdState,
    pub dns_names: DnsNames,
    pub idp: Option<Vec<u8>>,
    pub process_name: Option<String>,

    // --- state ---
    pub first_switched_found: bool,
    pub exp_type: Option<ExpType>,
}

impl FlowRecord {
    /// Creates a zero-initialized record for `key`, as if freshly allocated
    /// (`flow_record_init` in the original source).
    pub fn new(key: FlowKey) -> Self {
        FlowRecord {
            key,
            start: Timestamp::ZERO,
            end: Timestamp::ZERO,
            ttl: u8::MAX,
            np: 0,
            op: 0,
            ob: 0,
            pkt_len: Vec::new(),
            pkt_time: Vec::new(),
            pkt_tcp_flags: Vec::new(),
            pkt_tls_type: Vec::new(),
            byte_dist: ByteDistribution::new(),
            retrans: 0,
            invalid: 0,
            tcp_initial_window_size: 0,
            tcp_syn_size: 0,
            tcp_options: TcpOptionCounts::default(),
            tls: TlsInfo::default(),
            wht: WhtState::default(),
            hd: HdState::default(),
            dns_names: DnsNames::default(),
            idp: None,
            process_name: None,
            first_switched_found: false,
            exp_type: None,
        }
    }

    /// Number of valid slots in the bounded per-packet arrays.
    pub fn recorded_packets(&self) -> usize {
        self.pkt_len.len()
    }

    /// Total lifetime in whole seconds: `end - start`, used by the second active
    /// check embedded in lookup (`spec.md` §4.6).
    pub fn duration_secs(&self) -> u64 {
        self.end.saturating_sub_secs(&self.start)
    }

    /// Folds one packet into this direction's counters, arrays, byte distribution,
    /// and TCP anomaly fields (`spec.md` §4.4). Extractor dispatch happens
    /// separately in [`crate::conntrack::cache::FlowCache::process`].
    pub fn aggregate(&mut self, pkt: &Packet, cfg: &FlowCacheConfig) {
        if self.np == 0 {
            self.start = pkt.timestamp;
            self.first_switched_found = true;
        }
        self.np += 1;
        self.end = pkt.timestamp;
        self.ttl = self.ttl.min(pkt.ttl);

        let include = pkt.has_payload() || cfg.include_zeroes;
        if include {
            if (self.pkt_len.len() as u64) < cfg.num_pkt_len as u64 {
                self.pkt_len.push(pkt.payload.len() as u32);
                self.pkt_time.push(pkt.timestamp);
                self.pkt_tcp_flags
                    .push(pkt.tcp.map(|t| t.flags).unwrap_or(0));
                self.pkt_tls_type.push(pkt.tls_record_type);
            }
        }
        if pkt.has_payload() {
            self.op += 1;
            self.ob += pkt.payload.len() as u64;

            if self.idp.is_none() {
                self.idp = Some(pkt.payload.to_vec());
            }

            if cfg.byte_distribution || cfg.report_entropy {
                for &b in pkt.payload {
                    self.byte_dist.update(b);
                }
            }
        }

        if let Some(tcp) = pkt.tcp {
            self.invalid += tcp.invalid as u32;
            self.retrans += tcp.retransmission as u32;
            if tcp.syn {
                self.tcp_initial_window_size = tcp.window;
                self.tcp_syn_size = pkt.payload.len() as u16;
            }
            self.tcp_options.nop += tcp.options.nop;
            self.tcp_options.mss += tcp.options.mss;
            self.tcp_options.wscale += tcp.options.wscale;
            self.tcp_options.sack += tcp.options.sack;
            self.tcp_options.tstamp += tcp.options.tstamp;
        }
    }
}
