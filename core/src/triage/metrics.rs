//! The dynamic metric bag rule conditions and templates are evaluated
//! against ("dynamic metric bag").

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};

use crate::conntrack::FlowAgg;
use crate::utils::ts_micros_to_rfc3339;

/// A tagged value a [`super::rule::ConditionGroup`] leaf can compare
/// against, or a template placeholder can render.
///
/// Numeric comparison coerces `Int`/`Float` uniformly; `Bool` and `Str`
/// support only equality, per this design Serializes as its bare JSON
/// value (no variant tag) so a rendered metric snapshot reads naturally
/// in the result bundle.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl Serialize for MetricValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MetricValue::Int(i) => serializer.serialize_i64(*i),
            MetricValue::Float(f) => serializer.serialize_f64(*f),
            MetricValue::Bool(b) => serializer.serialize_bool(*b),
            MetricValue::Str(s) => serializer.serialize_str(s),
        }
    }
}

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Int(i) => Some(*i as f64),
            MetricValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn render(&self) -> String {
        match self {
            MetricValue::Int(i) => i.to_string(),
            MetricValue::Float(f) => format!("{f}"),
            MetricValue::Bool(b) => b.to_string(),
            MetricValue::Str(s) => s.clone(),
        }
    }
}

/// A flow's metrics, keyed by the well-known names the design enumerates
/// exhaustively. Optional metrics (duration, stream id, timestamps, RTT)
/// are absent from the map rather than present with a null value — a
/// missing key and an absent optional both evaluate leaves to `false`.
pub type MetricSnapshot = BTreeMap<String, MetricValue>;

/// Builds the metric snapshot for one finalized flow.
pub fn snapshot(flow: &FlowAgg) -> MetricSnapshot {
    let mut m = MetricSnapshot::new();
    let (client_ip, client_port, server_ip, server_port) = if flow.client_is_forward {
        (flow.key.src_ip, flow.key.src_port, flow.key.dst_ip, flow.key.dst_port)
    } else {
        (flow.key.dst_ip, flow.key.dst_port, flow.key.src_ip, flow.key.src_port)
    };

    m.insert("protocol".into(), MetricValue::Str(flow.key.protocol.to_string()));
    m.insert("client_ip".into(), MetricValue::Str(client_ip.to_string()));
    m.insert("client_port".into(), MetricValue::Int(client_port as i64));
    m.insert("server_ip".into(), MetricValue::Str(server_ip.to_string()));
    m.insert("server_port".into(), MetricValue::Int(server_port as i64));
    m.insert("packet_count".into(), MetricValue::Int(flow.packet_count as i64));
    m.insert(
        "bytes_client_to_server".into(),
        MetricValue::Int(flow.bytes_client_to_server as i64),
    );
    m.insert(
        "bytes_server_to_client".into(),
        MetricValue::Int(flow.bytes_server_to_client as i64),
    );
    m.insert(
        "tcp_syn_retransmissions".into(),
        MetricValue::Int(flow.syn_retransmits as i64),
    );
    m.insert("tcp_retransmissions".into(), MetricValue::Int(flow.retransmits as i64));
    m.insert("out_of_order".into(), MetricValue::Int(flow.out_of_order as i64));
    m.insert("dup_acks".into(), MetricValue::Int(flow.dup_acks as i64));
    m.insert(
        "tls_client_hello_seen".into(),
        MetricValue::Bool(flow.tls_client_hello_seen),
    );
    m.insert(
        "tls_server_hello_seen".into(),
        MetricValue::Bool(flow.tls_server_hello_seen),
    );
    m.insert("tls_alert_seen".into(), MetricValue::Bool(flow.tls_alert_seen));
    if let Some(code) = flow.tls_alert_code {
        m.insert("tls_alert_code".into(), MetricValue::Int(code as i64));
    }
    m.insert("app_bytes".into(), MetricValue::Int(flow.app_bytes as i64));

    let duration_micros = flow.last_seen_micros - flow.first_seen_micros;
    if duration_micros > 0 {
        m.insert(
            "duration_ms".into(),
            MetricValue::Float(duration_micros as f64 / 1000.0),
        );
    }
    if let Some(stream_id) = flow.stream_id {
        m.insert("tcp_stream".into(), MetricValue::Int(stream_id as i64));
    }
    if flow.app_bytes > 0 {
        if let Some(ts) = ts_micros_to_rfc3339(flow.first_seen_micros) {
            m.insert("first_payload_ts".into(), MetricValue::Str(ts));
        }
        if let Some(ts) = ts_micros_to_rfc3339(flow.last_seen_micros) {
            m.insert("last_payload_ts".into(), MetricValue::Str(ts));
        }
    }
    if let Some(rtt) = flow.rtt_ms {
        m.insert("handshake_rtt_ms_estimate".into(), MetricValue::Float(rtt));
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conntrack::FlowKey;
    use crate::protocols::packet::TransportProtocol;
    use std::net::{IpAddr, Ipv4Addr};

    fn flow() -> FlowAgg {
        FlowAgg {
            key: FlowKey {
                protocol: TransportProtocol::Tcp,
                src_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
                dst_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
                src_port: 1234,
                dst_port: 443,
            },
            stream_id: Some(0),
            first_seen_micros: 0,
            last_seen_micros: 1_000_000,
            packet_count: 10,
            bytes_sent: 500,
            bytes_recv: 200,
            bytes_client_to_server: 500,
            bytes_server_to_client: 200,
            client_is_forward: true,
            syn_retransmits: 0,
            retransmits: 55,
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
            app_bytes: 700,
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
    fn snapshot_carries_retransmit_count() {
        let snap = snapshot(&flow());
        assert_eq!(snap.get("tcp_retransmissions"), Some(&MetricValue::Int(55)));
        assert_eq!(snap.get("client_ip"), Some(&MetricValue::Str("10.0.0.1".into())));
    }

    #[test]
    fn missing_rtt_is_absent_not_null() {
        let snap = snapshot(&flow());
        assert!(!snap.contains_key("handshake_rtt_ms_estimate"));
    }
}
