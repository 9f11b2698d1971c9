//! Top-level coordinator: drives the first pass, reports progress,
//! assigns stable TCP stream ids, and assembles the result bundle
//! .

use std::path::Path;

use log::{debug, info};

use crate::bundle::ResultBundle;
use crate::config::AnalysisConfig;
use crate::conntrack::{FlowAgg, FlowKey, FlowTable};
use crate::error::{CoreError, Result};
use crate::protocols::packet::{decode, DecodeOutcome, TransportProtocol};
use crate::reader;
use crate::stats;
use crate::stats::timeseries::{CaptureTimeseries, CaptureTimeseriesBuilder, DirectionalTimeseries, StreamTimeseriesBuilder};
use crate::triage::{self, RuleSet};
use crate::utils::CancellationToken;

/// Receives progress updates during a pass. A CLI might print to stdout,
/// a service might forward them over a channel; anything implementing
/// this trait (a progress bar, a channel sender, a no-op) works the same way.
pub trait ProgressSink {
    fn on_progress(&mut self, fraction_complete: f64);
}

/// A [`ProgressSink`] that drops every update.
pub struct NullProgressSink;
impl ProgressSink for NullProgressSink {
    fn on_progress(&mut self, _fraction_complete: f64) {}
}

/// Runs the full first pass over `config.capture` and returns the
/// assembled result bundle.
pub fn analyze(
    config: &AnalysisConfig,
    rules: &RuleSet,
    progress: &mut dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<ResultBundle> {
    let file_size = std::fs::metadata(&config.capture)
        .map_err(|e| CoreError::InvalidCaptureFormat(format!("cannot stat capture: {e}")))?
        .len();

    let mut source = reader::open(&config.capture)?;
    let mut table = FlowTable::new(
        config.seen_segment_cache.capacity,
        config.seen_segment_cache.ttl_ms * 1000,
        config.evidence_cap,
    );

    let mut last_reported_pct = -1.0f64;
    let mut packets_seen: u64 = 0;
    let mut packets_parsed: u64 = 0;

    loop {
        if cancel.is_canceled() {
            return Err(CoreError::Canceled);
        }
        let record = match source.next_record()? {
            Some(r) => r,
            None => break,
        };
        packets_seen += 1;

        match decode(record.link_type, &record.frame, record.wire_len, record.ts_micros) {
            DecodeOutcome::Parsed { info, .. } => {
                packets_parsed += 1;
                table.update(&info);
            }
            DecodeOutcome::Skipped { .. } => {}
        }

        if file_size > 0 {
            let pct = (source.bytes_read() as f64 / file_size as f64) * 100.0;
            if pct - last_reported_pct >= config.progress_granularity_pct {
                progress.on_progress((pct / 100.0).min(1.0));
                last_reported_pct = pct;
            }
        }
    }
    progress.on_progress(1.0);
    debug!("pass complete: {packets_seen} records read, {packets_parsed} decoded into flows");

    let mut flows = table.finalize_all();
    flows.sort_by(|a, b| {
        (a.key.protocol, a.key.src_ip, a.key.dst_ip, a.key.src_port, a.key.dst_port).cmp(&(
            b.key.protocol,
            b.key.src_ip,
            b.key.dst_ip,
            b.key.src_port,
            b.key.dst_port,
        ))
    });
    assign_stream_ids(&mut flows);

    let (findings, warnings) = triage::evaluate(&flows, rules);
    let computed_stats = stats::compute(&flows);

    info!(
        "analyzed {} flows, {} findings, {} rule warnings",
        flows.len(),
        findings.len(),
        warnings.len()
    );

    Ok(ResultBundle {
        flows,
        findings,
        stats: computed_stats,
        rule_warnings: warnings.into_iter().map(|w| format!("{}: {}", w.rule_id, w.reason)).collect(),
    })
}

/// Assigns stable TCP stream ids by sorting on `(first_seen, client_ip,
/// client_port, server_ip, server_port, src_ip)` and numbering from 0
/// . UDP flows are left unassigned.
fn assign_stream_ids(flows: &mut [FlowAgg]) {
    let mut tcp_indexes: Vec<usize> = flows
        .iter()
        .enumerate()
        .filter(|(_, f)| f.key.protocol == TransportProtocol::Tcp)
        .map(|(i, _)| i)
        .collect();

    tcp_indexes.sort_by(|&a, &b| {
        let fa = &flows[a];
        let fb = &flows[b];
        let (ca, cpa, sa, spa) = client_server_tuple(fa);
        let (cb, cpb, sb, spb) = client_server_tuple(fb);
        (fa.first_seen_micros, ca, cpa, sa, spa, fa.key.src_ip).cmp(&(
            fb.first_seen_micros,
            cb,
            cpb,
            sb,
            spb,
            fb.key.src_ip,
        ))
    });

    for (stream_id, &idx) in tcp_indexes.iter().enumerate() {
        flows[idx].stream_id = Some(stream_id as u32);
    }
}

fn client_server_tuple(flow: &FlowAgg) -> (std::net::IpAddr, u16, std::net::IpAddr, u16) {
    if flow.client_is_forward {
        (flow.key.src_ip, flow.key.src_port, flow.key.dst_ip, flow.key.dst_port)
    } else {
        (flow.key.dst_ip, flow.key.dst_port, flow.key.src_ip, flow.key.src_port)
    }
}

/// Re-reads the capture to build the capture-wide packets/bytes-per-second
/// series (a supplementary on-demand output). Every record
/// contributes, including frames the decoder skips .
pub fn capture_timeseries(capture_path: &Path, cancel: &CancellationToken) -> Result<CaptureTimeseries> {
    let mut source = reader::open(capture_path)?;
    let mut builder = CaptureTimeseriesBuilder::new();
    while let Some(record) = source.next_record()? {
        if cancel.is_canceled() {
            return Err(CoreError::Canceled);
        }
        builder.record(record.ts_micros, record.wire_len);
    }
    Ok(builder.build())
}

/// Re-reads the capture to build a per-second, per-direction byte series
/// for a single TCP stream, keyed by the stable stream id [`analyze`]
/// assigns ("per-stream timeseries").
pub fn stream_timeseries(
    capture_path: &Path,
    flows: &[FlowAgg],
    stream_id: u32,
    cancel: &CancellationToken,
) -> anyhow::Result<DirectionalTimeseries> {
    let flow = flows
        .iter()
        .find(|f| f.stream_id == Some(stream_id))
        .ok_or_else(|| anyhow::anyhow!("no flow with stream id {stream_id}"))?;

    let fwd_key = flow.key;
    let rev_key = flow.key.reversed();
    let client_is_forward = flow.client_is_forward;

    let mut source = reader::open(capture_path)?;
    let mut builder = StreamTimeseriesBuilder::new();

    while let Some(record) = source.next_record()? {
        if cancel.is_canceled() {
            return Err(CoreError::Canceled.into());
        }
        let info = match decode(record.link_type, &record.frame, record.wire_len, record.ts_micros) {
            DecodeOutcome::Parsed { info, .. } => info,
            DecodeOutcome::Skipped { .. } => continue,
        };
        if info.protocol != TransportProtocol::Tcp || info.payload_len == 0 {
            continue;
        }
        let this_key = FlowKey::from_packet(&info);
        let is_forward = if this_key == fwd_key {
            true
        } else if this_key == rev_key {
            false
        } else {
            continue;
        };
        builder.record(info.ts_micros, info.payload_len, is_forward == client_is_forward);
    }

    Ok(builder.build())
}

/// Re-reads the capture for the on-demand packet-stream API (the design
/// §4.8), reusing the flow list from a prior [`analyze`] call.
pub fn stream_packets(
    capture_path: &Path,
    flows: &[FlowAgg],
    query: &str,
    offset: u64,
    limit: u64,
    cache_capacity: usize,
    cache_ttl_micros: i64,
    cancel: &CancellationToken,
) -> Result<crate::bundle::PacketPage> {
    crate::packetstream::stream_packets(capture_path, flows, query, offset, limit, cache_capacity, cache_ttl_micros, cancel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conntrack::FlowKey;
    use std::net::{IpAddr, Ipv4Addr};

    fn flow(src: u8, first_seen: i64, client_is_forward: bool, proto: TransportProtocol) -> FlowAgg {
        FlowAgg {
            key: FlowKey {
                protocol: proto,
                src_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, src)),
                dst_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 99)),
                src_port: 1111,
                dst_port: 443,
            },
            stream_id: None,
            first_seen_micros: first_seen,
            last_seen_micros: first_seen,
            packet_count: 1,
            bytes_sent: 0,
            bytes_recv: 0,
            bytes_client_to_server: 0,
            bytes_server_to_client: 0,
            client_is_forward,
            syn_retransmits: 0,
            retransmits: 0,
            retrans_size_count: Default::default(),
            out_of_order: 0,
            dup_acks: 0,
            rst_count: 0,
            fragment_count: 0,
            mss: None,
            sni: None,
            tls_version: None,
            alpn: None,
            tls_client_hello_seen: false,
            tls_server_hello_seen: false,
            tls_alert_seen: false,
            tls_alert_code: None,
            handshake_failure_candidate: false,
            http_method: None,
            http_host: None,
            syn_time_micros: None,
            syn_ack_time_micros: None,
            ack_time_micros: None,
            rtt_ms: None,
            app_bytes: 0,
            evidence_overflow: false,
            syn_indexes: vec![],
            retransmit_indexes: vec![],
            dup_ack_indexes: vec![],
            client_hello_indexes: vec![],
            alert_indexes: vec![],
            rst_indexes: vec![],
        }
    }

    #[test]
    fn stream_ids_assigned_by_first_seen_order_tcp_only() {
        let mut flows = vec![
            flow(2, 1000, true, TransportProtocol::Tcp),
            flow(1, 500, true, TransportProtocol::Tcp),
            flow(3, 0, true, TransportProtocol::Udp),
        ];
        assign_stream_ids(&mut flows);
        assert_eq!(flows[1].stream_id, Some(0)); // first_seen=500
        assert_eq!(flows[0].stream_id, Some(1)); // first_seen=1000
        assert_eq!(flows[2].stream_id, None); // UDP
    }
}
