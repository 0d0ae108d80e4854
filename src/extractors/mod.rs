//! Contracts for the per-protocol feature extractors `spec.md` §1 and §6 treat as
//! external collaborators (TLS handshake parser, DNS name extractor, Walsh-Hadamard
//! transform, header fingerprinter, OS fingerprint, inline classifier, address
//! anonymization and subnet-label tries).
//!
//! Each extractor owns a small, zero-initializable sub-record embedded in
//! [`crate::conntrack::record::FlowRecord`] and is driven by the cache through
//! `init`/`update`/`delete`, per the contract in `spec.md` §6. The cache never
//! interprets extractor state itself; it only creates it, routes packet views to
//! it, and destroys it alongside the owning record.

mod dns;
mod hd;
mod tls;
mod wht;

pub use dns::{DnsExtractor, DnsNames};
pub use hd::{HdExtractor, HdState};
pub use tls::{TlsExtractor, TlsInfo};
pub use wht::{WhtExtractor, WhtState};

use crate::conntrack::record::FlowRecord;
use std::net::Ipv4Addr;

/// Substitutes an anonymized hex pseudonym for addresses that require it
/// (`spec.md` §6). Implemented by the out-of-scope address-anonymization trie.
pub trait AddressAnonymizer {
    fn anonymize(&self, addr: Ipv4Addr) -> Option<String>;
}

/// Looks up subnet labels for an address (`spec.md` §6, `num_subnets`). Implemented
/// by the out-of-scope subnet-label trie.
pub trait SubnetLabeler {
    fn labels(&self, addr: Ipv4Addr) -> Vec<String>;
}

/// Maps an observed (TTL, TCP initial window) pair to a guessed OS name. Implemented
/// by the out-of-scope OS fingerprint database.
pub trait OsFingerprinter {
    fn identify(&self, ttl: u8, window: u16) -> Option<String>;
}

/// Scores a (possibly paired) flow record for malware likelihood. Implemented by
/// the out-of-scope inline classifier.
pub trait Classifier {
    fn score(&self, primary: &FlowRecord, twin: Option<&FlowRecord>) -> f32;
}
