//! The second-pass, on-demand packet-stream API .
//!
//! Re-reads the capture independently of the aggregation pass and
//! maintains its own per-flow seen-segment cache. Deliberately *not*
//! shared with [`crate::conntrack::FlowTable`]'s tracker — the design
//! notes the two may diverge on boundary cases (a segment exactly at
//! TTL) and keeps this pass one-shot rather than threading state between
//! passes.

pub mod filter;

use std::collections::HashMap;
use std::path::Path;

use crate::bundle::{PacketMeta, PacketPage, TcpFlagsMeta};
use crate::conntrack::seen_cache::SeenSegmentCache;
use crate::conntrack::{Direction, FlowAgg, FlowKey};
use crate::error::Result;
use crate::protocols::packet::{decode, DecodeOutcome, PacketInfo};
use crate::reader;
use crate::utils::{ts_micros_to_rfc3339, CancellationToken};

struct PerFlowState {
    seen_cache: SeenSegmentCache,
    syn_seen: [bool; 2],
    last_pure_ack: [Option<u32>; 2],
}

impl PerFlowState {
    fn new(cache_capacity: usize, cache_ttl_micros: i64) -> Self {
        PerFlowState {
            seen_cache: SeenSegmentCache::new(cache_capacity, cache_ttl_micros),
            syn_seen: [false, false],
            last_pure_ack: [None, None],
        }
    }
}

fn dir_index(direction: Direction) -> usize {
    match direction {
        Direction::Forward => 0,
        Direction::Reverse => 1,
    }
}

/// Builds a `(packet flow key) -> canonical table key` index from the
/// finalized flow list, so a re-decoded packet can be matched back to its
/// flow without re-running the aggregation pass's lookup-then-create
/// logic (every key here is already known to exist).
fn build_key_index(flows: &[FlowAgg]) -> HashMap<FlowKey, FlowKey> {
    let mut index = HashMap::with_capacity(flows.len() * 2);
    for flow in flows {
        index.insert(flow.key, flow.key);
        index.insert(flow.key.reversed(), flow.key);
    }
    index
}

/// Runs the second pass: re-reads `capture_path`, labels each packet with
/// error tags, applies `query`, and returns one page of results.
pub fn stream_packets(
    capture_path: &Path,
    flows: &[FlowAgg],
    query: &str,
    offset: u64,
    limit: u64,
    cache_capacity: usize,
    cache_ttl_micros: i64,
    cancel: &CancellationToken,
) -> Result<PacketPage> {
    let predicate = filter::parse(query);
    let key_index = build_key_index(flows);
    let stream_ids: HashMap<FlowKey, Option<u32>> = flows.iter().map(|f| (f.key, f.stream_id)).collect();

    let mut source = reader::open(capture_path)?;
    let mut flow_states: HashMap<FlowKey, PerFlowState> = HashMap::new();

    let mut matched = Vec::new();
    let mut total_count: u64 = 0;
    let mut packet_index: u32 = 0;

    while let Some(record) = source.next_record()? {
        if cancel.is_canceled() {
            return Err(crate::error::CoreError::Canceled);
        }
        packet_index += 1;

        let outcome = decode(record.link_type, &record.frame, record.wire_len, record.ts_micros);
        let info = match outcome {
            DecodeOutcome::Parsed { info, .. } => info,
            DecodeOutcome::Skipped { .. } => continue,
        };

        let fwd_key = FlowKey::from_packet(&info);
        let canonical = key_index.get(&fwd_key).copied().unwrap_or(fwd_key);
        let direction = if canonical == fwd_key { Direction::Forward } else { Direction::Reverse };

        let error_tags = label_errors(&mut flow_states, canonical, direction, &info, cache_capacity, cache_ttl_micros);

        let meta = build_packet_meta(
            packet_index,
            &info,
            error_tags,
            stream_ids.get(&canonical).copied().flatten(),
        );

        if predicate.matches(&meta) {
            total_count += 1;
            if total_count > offset && (matched.len() as u64) < limit {
                matched.push(meta);
            }
        }
    }

    Ok(PacketPage { packets: matched, total_count })
}

fn label_errors(
    flow_states: &mut HashMap<FlowKey, PerFlowState>,
    canonical: FlowKey,
    direction: Direction,
    info: &PacketInfo,
    cache_capacity: usize,
    cache_ttl_micros: i64,
) -> Vec<String> {
    let state = flow_states
        .entry(canonical)
        .or_insert_with(|| PerFlowState::new(cache_capacity, cache_ttl_micros));
    let mut tags = Vec::new();

    if info.flags.rst {
        tags.push("rst".to_string());
    }

    if info.flags.syn && !info.flags.ack {
        let idx = dir_index(direction);
        if state.syn_seen[idx] {
            tags.push("syn_retransmission".to_string());
        }
        state.syn_seen[idx] = true;
    } else if info.payload_len > 0 {
        let is_retransmission = state.seen_cache.probe(direction, info.seq, info.payload_len, info.ts_micros);
        if is_retransmission {
            tags.push("retransmission".to_string());
        }
    }

    if info.flags.ack && !info.flags.syn && info.payload_len == 0 {
        let idx = dir_index(direction);
        if state.last_pure_ack[idx] == Some(info.ack) {
            tags.push("dup_ack".to_string());
        }
        state.last_pure_ack[idx] = Some(info.ack);
    }

    if let Some(tls) = &info.tls {
        if tls.alert {
            tags.push("tls_alert".to_string());
        }
    }

    tags
}

fn build_packet_meta(index: u32, info: &PacketInfo, error_tags: Vec<String>, stream_id: Option<u32>) -> PacketMeta {
    PacketMeta {
        index,
        timestamp: ts_micros_to_rfc3339(info.ts_micros).unwrap_or_default(),
        protocol: info.protocol.to_string(),
        src_ip: info.src_ip.to_string(),
        dst_ip: info.dst_ip.to_string(),
        src_port: info.src_port,
        dst_port: info.dst_port,
        length: info.wire_len,
        info: describe(info),
        error_tags,
        tcp_flags: TcpFlagsMeta::from(info.flags),
        seq: info.seq,
        ack: info.ack,
        window: info.window,
        stream_id,
        sni: info.tls.as_ref().and_then(|t| t.sni.clone()),
        http_method: info.http.as_ref().and_then(|h| h.method.clone()),
        http_host: info.http.as_ref().and_then(|h| h.host.clone()),
    }
}

/// Builds the short human-readable descriptor the design requires for
/// `PacketMeta::info` (e.g. `"SYN, ACK"`, `"TLS ClientHello"`,
/// `"HTTP GET example.com"`).
fn describe(info: &PacketInfo) -> String {
    if let Some(tls) = &info.tls {
        if tls.client_hello {
            return "TLS ClientHello".to_string();
        }
        if tls.server_hello {
            return "TLS ServerHello".to_string();
        }
        if tls.alert {
            return "TLS Alert".to_string();
        }
    }
    if let Some(http) = &info.http {
        if let (Some(method), Some(host)) = (&http.method, &http.host) {
            return format!("HTTP {method} {host}");
        }
        if let Some(method) = &http.method {
            return format!("HTTP {method}");
        }
    }
    let mut flags = Vec::new();
    if info.flags.syn {
        flags.push("SYN");
    }
    if info.flags.ack {
        flags.push("ACK");
    }
    if info.flags.fin {
        flags.push("FIN");
    }
    if info.flags.rst {
        flags.push("RST");
    }
    if info.flags.psh {
        flags.push("PSH");
    }
    if info.flags.urg {
        flags.push("URG");
    }
    if flags.is_empty() {
        info.protocol.to_string()
    } else {
        flags.join(", ")
    }
}
