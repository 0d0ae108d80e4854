//! Configuration options.
//!
//! A flow cache deployment is free to define its own command-line arguments, but
//! the cache itself is driven by a single [`FlowCacheConfig`] loaded from a TOML
//! file: which optional features to compute, the two expiration timeouts, and the
//! bounded per-packet array length. See `demos/replay` for an example invocation.

use crate::conntrack::flow_key::MatchMethod;
use crate::error::ConfigError;

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Loads a configuration file from `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<FlowCacheConfig, ConfigError> {
    let config_str = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.as_ref().display().to_string(),
        source,
    })?;
    let config: FlowCacheConfig = toml::from_str(&config_str).map_err(|source| ConfigError::Parse {
        path: path.as_ref().display().to_string(),
        source,
    })?;

    if config.num_pkt_len == 0 {
        log::error!("invalid config, num_pkt_len must be at least 1: {:#?}", config);
        return Err(ConfigError::Invalid("num_pkt_len must be at least 1"));
    }
    Ok(config)
}

/// The default configuration, matching the original source's built-in constants.
///
/// ```toml
/// active_timeout = 10
/// active_timeout_grace = 20
/// bidir = true
/// flow_key_match_method = "exact"
/// num_pkt_len = 50
/// ```
pub fn default_config() -> FlowCacheConfig {
    FlowCacheConfig::default()
}

/* --------------------------------------------------------------------------------- */

/// Runtime configuration for the flow cache (`spec.md` §6).
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct FlowCacheConfig {
    /// Active timeout `W`, in seconds: maximum quiet time before a flow is
    /// considered inactive. Defaults to `10`.
    pub active_timeout: u64,

    /// Additional grace period `A`, in seconds, added to `W` for the hard active
    /// (lifetime) expiration check. Defaults to `20`.
    pub active_timeout_grace: u64,

    /// Whether to attempt twin pairing at all. When `false`, every flow is
    /// emitted unidirectionally and [`FlowCacheConfig::flow_key_match_method`] is
    /// unused. Defaults to `true`.
    pub bidir: bool,

    /// Which hash/twin-matching rule to apply (`spec.md` §4.1). Defaults to
    /// [`MatchMethod::Exact`].
    pub flow_key_match_method: MatchMethod,

    /// Bounded length `L` of the per-packet arrays kept per direction. Defaults
    /// to `50`.
    pub num_pkt_len: usize,

    /// Include zero-payload packets (pure ACKs, bare SYNs) in the per-packet
    /// arrays. Packet and byte *counts* always include them regardless of this
    /// flag. Defaults to `false`.
    pub include_zeroes: bool,

    /// Compute and report the 256-bin byte distribution (`bd`, `bd_mean`,
    /// `bd_std`). Defaults to `false`.
    pub byte_distribution: bool,

    /// Compute and report Shannon entropy (`be`, `tbe`). Implies payload-byte
    /// accumulation even when `byte_distribution` is off. Defaults to `false`.
    pub report_entropy: bool,

    /// Run the Walsh-Hadamard transform extractor and report `wht`. Defaults to
    /// `false`.
    pub report_wht: bool,

    /// Report the raw initial data packet (`oidp`/`iidp`) as hex. Defaults to
    /// `false`.
    pub report_idp: bool,

    /// Run the header-fingerprint extractor and report `hd`. Defaults to `false`.
    pub report_hd: bool,

    /// Run the DNS name extractor and report `dns` for port-53 flows. Defaults
    /// to `false`.
    pub report_dns: bool,

    /// Run the TLS extractor and report the nested `tls` object. Defaults to
    /// `false`.
    pub include_tls: bool,

    /// Run the inline classifier and report `p_malware`. Defaults to `false`.
    pub include_classifier: bool,

    /// Run the OS fingerprinter and report `os`. Defaults to `false`.
    pub include_os: bool,

    /// Number of subnet-label tries to consult, if any are configured. `0`
    /// disables subnet labeling entirely. Defaults to `0`.
    pub num_subnets: u32,

    /// Caps the number of resident records the arena will hold at once. A
    /// packet that would require a new record while the cache is at this
    /// limit is dropped and `stats.malloc_fail` is incremented instead
    /// (`spec.md` §7, "allocation failure"). `None` (the default) means
    /// unbounded, matching a deployment with no practical memory ceiling.
    pub max_records: Option<usize>,

    /// NetFlow v9 capture port. Retained as an inert field: NetFlow collection
    /// is an external collaborator's concern and out of scope for this crate
    /// (`spec.md` Non-goals), but the field is kept so deployments that set it
    /// alongside a real collector still parse. Defaults to `None`.
    pub nfv9_capture_port: Option<u16>,

    /// Upload key for an external flow-record sink. Inert, for the same reason
    /// as `nfv9_capture_port`. Defaults to `None`.
    pub upload_key: Option<String>,
}

impl Default for FlowCacheConfig {
    fn default() -> Self {
        FlowCacheConfig {
            active_timeout: 10,
            active_timeout_grace: 20,
            bidir: true,
            flow_key_match_method: MatchMethod::Exact,
            num_pkt_len: 50,
            include_zeroes: false,
            byte_distribution: false,
            report_entropy: false,
            report_wht: false,
            report_idp: false,
            report_hd: false,
            report_dns: false,
            include_tls: false,
            include_classifier: false,
            include_os: false,
            num_subnets: 0,
            max_records: None,
            nfv9_capture_port: None,
            upload_key: None,
        }
    }
}

impl FlowCacheConfig {
    /// `W + A`: the duration past which a flow is forcibly expired even without a
    /// wall-clock sweep reaching it (`spec.md` §4.3, §4.6).
    pub fn active_max(&self) -> u64 {
        self.active_timeout + self.active_timeout_grace
    }

    /// Whether any per-payload byte accumulation is needed at all.
    pub fn needs_byte_distribution(&self) -> bool {
        self.byte_distribution || self.report_entropy
    }
}
