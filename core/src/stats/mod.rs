//! Derived statistics over a finalized flow list .

pub mod histogram;
pub mod timeseries;
pub mod topk;

use std::collections::HashMap;

use serde::Serialize;

use crate::conntrack::FlowAgg;

pub use histogram::{Quantiles, RttHistogram};
pub use topk::{TopEntry, TopK};

const TOP_K: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub top_talkers: Vec<TopEntry>,
    pub top_flows: Vec<TopEntry>,
    pub rtt_buckets: Vec<u64>,
    pub rtt_counts: Vec<u64>,
    pub rtt_overflow: u64,
    pub rtt_quantiles: Quantiles,
}

/// Computes top-K talkers/flows and the RTT histogram for `flows`.
///
/// Talker attribution: for each flow, its (pre-direction) source IP
/// gains `bytes_sent` and its destination IP gains `bytes_recv` — this
/// mirrors the raw forward/reverse byte counters, not the
/// client/server-normalized ones, matching this "src-IP gains
/// bytes_sent; dst-IP gains bytes_recv".
pub fn compute(flows: &[FlowAgg]) -> Stats {
    let mut talker_bytes: HashMap<String, u64> = HashMap::new();
    let mut histogram = RttHistogram::new();

    let mut top_flows = TopK::new(TOP_K);

    for flow in flows {
        *talker_bytes.entry(flow.key.src_ip.to_string()).or_insert(0) += flow.bytes_sent;
        *talker_bytes.entry(flow.key.dst_ip.to_string()).or_insert(0) += flow.bytes_recv;

        let total_bytes = flow.bytes_sent + flow.bytes_recv;
        top_flows.push(flow.key.to_string(), total_bytes);

        if let Some(rtt) = flow.rtt_ms {
            histogram.observe(rtt);
        }
    }

    let mut top_talkers = TopK::new(TOP_K);
    for (ip, bytes) in talker_bytes {
        top_talkers.push(ip, bytes);
    }

    Stats {
        top_talkers: top_talkers.into_sorted(),
        top_flows: top_flows.into_sorted(),
        rtt_buckets: histogram::BUCKET_BOUNDS_MS.to_vec(),
        rtt_counts: histogram.buckets().to_vec(),
        rtt_overflow: histogram.overflow_count(),
        rtt_quantiles: histogram.quantiles(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conntrack::FlowKey;
    use crate::protocols::packet::TransportProtocol;
    use std::net::{IpAddr, Ipv4Addr};

    fn flow(src: u8, bytes_sent: u64, bytes_recv: u64, rtt_ms: Option<f64>) -> FlowAgg {
        FlowAgg {
            key: FlowKey {
                protocol: TransportProtocol::Tcp,
                src_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, src)),
                dst_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 99)),
                src_port: 1111,
                dst_port: 443,
            },
            stream_id: Some(0),
            first_seen_micros: 0,
            last_seen_micros: 0,
            packet_count: 1,
            bytes_sent,
            bytes_recv,
            bytes_client_to_server: bytes_sent,
            bytes_server_to_client: bytes_recv,
            client_is_forward: true,
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
            rtt_ms,
            app_bytes: bytes_sent + bytes_recv,
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
    fn top_talkers_aggregate_across_flows() {
        let flows = vec![flow(1, 1000, 0, None), flow(1, 2000, 0, None), flow(2, 500, 0, None)];
        let stats = compute(&flows);
        assert_eq!(stats.top_talkers[0].label, "10.0.0.1");
        assert_eq!(stats.top_talkers[0].bytes, 3000);
    }

    #[test]
    fn rtt_quantiles_ordering_holds() {
        let flows = vec![
            flow(1, 0, 0, Some(5.0)),
            flow(2, 0, 0, Some(50.0)),
            flow(3, 0, 0, Some(900.0)),
        ];
        let stats = compute(&flows);
        assert!(stats.rtt_quantiles.p95 >= stats.rtt_quantiles.p50);
        assert!(stats.rtt_quantiles.p99 >= stats.rtt_quantiles.p95);
    }
}
