use crate::packet::Packet;
use serde::Serialize;

/// Walsh-Hadamard transform accumulator state for one direction of a flow.
///
/// The transform itself (applied to the packet-length sequence) is an external
/// collaborator (`spec.md` §1); the cache only owns the zero-initialized
/// accumulator and routes packets to it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WhtState {
    pub coefficients: Vec<f64>,
}

pub trait WhtExtractor {
    fn update(&self, state: &mut WhtState, pkt: &Packet);
}

#[derive(Debug, Default)]
pub struct NoopWhtExtractor;

impl WhtExtractor for NoopWhtExtractor {
    fn update(&self, _state: &mut WhtState, _pkt: &Packet) {}
}
