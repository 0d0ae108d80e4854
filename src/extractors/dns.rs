use crate::packet::Packet;

/// Up to `L` DNS names observed on the flow, slot-aligned with the per-packet
/// length/time arrays (`spec.md` §3).
#[derive(Debug, Clone, Default)]
pub struct DnsNames {
    pub names: Vec<String>,
}

/// Drives [`DnsNames`] from DNS message bytes. The real name extractor (DNS message
/// parsing) is an external collaborator; this trait is the seam it plugs into.
pub trait DnsExtractor {
    fn update(&self, state: &mut DnsNames, pkt: &Packet);
}

#[derive(Debug, Default)]
pub struct NoopDnsExtractor;

impl DnsExtractor for NoopDnsExtractor {
    fn update(&self, _state: &mut DnsNames, _pkt: &Packet) {}
}
