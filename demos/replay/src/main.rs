//! Replays a newline-delimited JSON packet trace through a [`FlowCache`] and prints
//! one JSON flow record per expired flow.
//!
//! Real packet capture and decoding are out of scope for the core crate (an
//! external collaborator's job); this binary stands in for that decoder with a
//! simple line-oriented packet format, so the cache can be exercised end to end
//! without a capture library.

use flowtrace_core::collaborators::Collaborators;
use flowtrace_core::config::load_config;
use flowtrace_core::conntrack::flow_key::FlowKey;
use flowtrace_core::emit::FlowEmission;
use flowtrace_core::packet::{Packet, TcpInfo};
use flowtrace_core::timestamp::Timestamp;
use flowtrace_core::FlowCache;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
struct Args {
    /// TOML flow cache configuration. Uses built-in defaults if omitted.
    #[clap(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Newline-delimited JSON packet trace; reads stdin if omitted.
    #[clap(short, long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Destination for emitted flow records; writes stdout if omitted.
    #[clap(short, long, value_name = "FILE")]
    outfile: Option<PathBuf>,
}

/// One line of the replay trace format.
#[derive(Deserialize)]
struct TraceLine {
    sa: std::net::Ipv4Addr,
    da: std::net::Ipv4Addr,
    sp: u16,
    dp: u16,
    pr: u8,
    ts_secs: u64,
    #[serde(default)]
    ts_micros: u32,
    #[serde(default = "default_ttl")]
    ttl: u8,
    #[serde(default)]
    payload_hex: String,
    #[serde(default)]
    tcp_flags: Option<u8>,
    #[serde(default)]
    tcp_window: u16,
    #[serde(default)]
    tcp_syn: bool,
}

fn default_ttl() -> u8 {
    64
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let cfg = match &args.config {
        Some(path) => load_config(path).with_context(|| format!("loading {}", path.display()))?,
        None => flowtrace_core::config::default_config(),
    };

    let mut cache = FlowCache::with_collaborators(cfg, Collaborators::default());

    let reader: Box<dyn BufRead> = match &args.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("opening {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let mut writer: Box<dyn Write> = match &args.outfile {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout())),
    };

    let mut emit_flow = |flow: &flowtrace_core::ExpiredFlow, cache: &FlowCache, writer: &mut dyn Write| -> Result<()> {
        let emission = FlowEmission::new(flow, cache.config(), &cache.collaborators);
        serde_json::to_writer(&mut *writer, &emission)?;
        writer.write_all(b"\n")?;
        Ok(())
    };

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let trace: TraceLine = serde_json::from_str(&line).context("parsing trace line")?;
        let payload = hex::decode(&trace.payload_hex).context("decoding payload_hex")?;
        let key = FlowKey::new(trace.sa, trace.da, trace.sp, trace.dp, trace.pr);
        let tcp = trace.tcp_flags.map(|flags| TcpInfo {
            flags,
            window: trace.tcp_window,
            syn: trace.tcp_syn,
            ..Default::default()
        });
        let pkt = Packet {
            key,
            timestamp: Timestamp::new(trace.ts_secs, trace.ts_micros),
            ttl: trace.ttl,
            payload: &payload,
            tcp,
            tls_record_type: None,
        };
        if let Some(forced) = cache.process(&pkt) {
            emit_flow(&forced, &cache, &mut writer)?;
        }
        let expired = cache.sweep(pkt.timestamp);
        for flow in &expired {
            emit_flow(flow, &cache, &mut writer)?;
        }
    }

    for flow in cache.drain() {
        emit_flow(&flow, &cache, &mut writer)?;
    }
    writer.flush()?;
    Ok(())
}
