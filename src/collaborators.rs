//! The bundle of external-collaborator implementations a [`crate::conntrack::FlowCache`]
//! is built with (`spec.md` §1, §6).
//!
//! Packet decoding, protocol parsing, anonymization and classification are all kept
//! out of this crate's core; it only defines the seams (traits) they plug into. A
//! deployment wires in real implementations here. Defaults to every trait's no-op
//! implementation, so a cache built with [`Collaborators::default`] behaves exactly
//! as if every optional feature flag in [`crate::config::FlowCacheConfig`] were off.

use crate::extractors::{
    DnsExtractor, HdExtractor, NoopDnsExtractor, NoopHdExtractor, NoopTlsExtractor,
    NoopWhtExtractor, TlsExtractor, WhtExtractor,
};
use crate::extractors::{AddressAnonymizer, Classifier, OsFingerprinter, SubnetLabeler};

pub struct Collaborators {
    pub tls: Box<dyn TlsExtractor>,
    pub dns: Box<dyn DnsExtractor>,
    pub wht: Box<dyn WhtExtractor>,
    pub hd: Box<dyn HdExtractor>,
    pub anonymizer: Option<Box<dyn AddressAnonymizer>>,
    pub subnet_labeler: Option<Box<dyn SubnetLabeler>>,
    pub os_fingerprinter: Option<Box<dyn OsFingerprinter>>,
    pub classifier: Option<Box<dyn Classifier>>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Collaborators {
            tls: Box::new(NoopTlsExtractor),
            dns: Box::new(NoopDnsExtractor),
            wht: Box::new(NoopWhtExtractor),
            hd: Box::new(NoopHdExtractor),
            anonymizer: None,
            subnet_labeler: None,
            os_fingerprinter: None,
            classifier: None,
        }
    }
}
