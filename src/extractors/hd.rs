use crate::packet::Packet;
use serde::Serialize;

/// Header-fingerprint accumulator state (`report_hd`). The header-description
/// algorithm that decides which header fields to track is an external collaborator
/// (`spec.md` §1); this struct is the zero-initialized state it accumulates into.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HdState {
    pub description: Vec<String>,
}

pub trait HdExtractor {
    fn update(&self, state: &mut HdState, pkt: &Packet);
}

#[derive(Debug, Default)]
pub struct NoopHdExtractor;

impl HdExtractor for NoopHdExtractor {
    fn update(&self, _state: &mut HdState, _pkt: &Packet) {}
}
