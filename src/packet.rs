//! The packet view contract the flow cache consumes.
//!
//! `spec.md` §1 places packet decoding (Ethernet/IP/TCP/UDP parsing) out of scope and
//! treats it as an external collaborator. `Packet` is the narrow view the decoder
//! hands to [`crate::conntrack::FlowCache`]; everything downstream of it (aggregation,
//! extractor dispatch, expiration) only ever reads through this type.

use crate::conntrack::flow_key::FlowKey;
use crate::timestamp::Timestamp;

/// A single observed packet, already reduced to the fields the flow cache needs.
#[derive(Debug, Clone)]
pub struct Packet<'a> {
    /// Five-tuple identity as observed (not yet canonicalized to originator/responder).
    pub key: FlowKey,
    pub timestamp: Timestamp,
    pub ttl: u8,
    /// Transport-layer payload (empty for a pure-ACK or header-only segment).
    pub payload: &'a [u8],
    /// Present for TCP segments, `None` for UDP datagrams.
    pub tcp: Option<TcpInfo>,
    /// TLS record content/handshake type code, when the payload begins a TLS record
    /// and TLS tracking is enabled by the caller's decoder.
    pub tls_record_type: Option<u8>,
}

impl<'a> Packet<'a> {
    pub fn has_payload(&self) -> bool {
        !self.payload.is_empty()
    }
}

/// Per-option and anomaly bookkeeping a TCP-options parser (external collaborator)
/// has already extracted for this segment; the cache only accumulates counters from
/// it (`spec.md` §4.4, §7).
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpInfo {
    pub flags: u8,
    pub window: u16,
    pub syn: bool,
    pub options: TcpOptionCounts,
    /// Set by the reassembler/options parser when this segment looks retransmitted.
    pub retransmission: bool,
    /// Set when the segment failed a structural sanity check upstream.
    pub invalid: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TcpOptionCounts {
    pub nop: u32,
    pub mss: u32,
    pub wscale: u32,
    pub sack: u32,
    pub tstamp: u32,
}

pub const SYN: u8 = 0x02;
pub const ACK: u8 = 0x10;
pub const RST: u8 = 0x04;
pub const FIN: u8 = 0x01;
