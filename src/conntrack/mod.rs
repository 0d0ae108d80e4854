//! The flow cache and its supporting data structures (`spec.md` §3, §4).
//!
//! [`FlowCache`] is the single entry point: a caller with a decoded [`crate::packet::Packet`]
//! calls [`FlowCache::process`], and periodically calls [`FlowCache::sweep`] (or
//! [`FlowCache::drain`] at shutdown) to collect expired, emission-ready flows. The
//! submodules below are internal plumbing `FlowCache` is built from.

mod arena;
mod cache;
mod chrono;
mod expiration;
pub mod flow_key;
mod index;
pub mod record;

pub use cache::{ExpiredFlow, FlowCache};
