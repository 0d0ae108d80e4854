#![allow(clippy::needless_doctest_main)]

//! A flow cache that turns a stream of decoded packets into newline-delimited JSON
//! flow records, suitable for ML and traffic-analysis pipelines.
//!
//! Packet decoding (Ethernet/IP/TCP/UDP parsing) and protocol-specific feature
//! extraction (TLS, DNS, header fingerprinting, classification) are out of scope:
//! this crate treats them as external collaborators, plugged in through the traits
//! in [`extractors`] and bundled in a [`collaborators::Collaborators`].
//!
//! ```rust
//! use flowtrace_core::config::default_config;
//! use flowtrace_core::conntrack::FlowCache;
//! use flowtrace_core::packet::Packet;
//! use flowtrace_core::timestamp::Timestamp;
//!
//! let mut cache = FlowCache::new(default_config());
//! let key = flowtrace_core::conntrack::flow_key::FlowKey::new(
//!     "10.0.0.1".parse().unwrap(),
//!     "10.0.0.2".parse().unwrap(),
//!     1234,
//!     443,
//!     6,
//! );
//! cache.process(&Packet {
//!     key,
//!     timestamp: Timestamp::new(0, 0),
//!     ttl: 64,
//!     payload: &[1, 2, 3],
//!     tcp: None,
//!     tls_record_type: None,
//! });
//! let flows = cache.drain();
//! assert_eq!(flows.len(), 1);
//! ```

pub mod aggregate;
pub mod collaborators;
pub mod config;
pub mod conntrack;
pub mod emit;
pub mod error;
pub mod extractors;
pub mod packet;
pub mod stats;
pub mod timestamp;

pub use collaborators::Collaborators;
pub use conntrack::{ExpiredFlow, FlowCache};
pub use packet::Packet;
pub use timestamp::Timestamp;
