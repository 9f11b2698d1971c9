//! The finalized, per-flow aggregate (`FlowAgg`) and the
//! in-progress tracker that builds it up one packet at a time.

use serde::Serialize;

use crate::protocols::packet::{PacketInfo, TcpFlags, TransportProtocol};
use crate::protocols::stream::tls::TlsVersion;

use super::conn_id::{Direction, FlowKey};
use super::seen_cache::SeenSegmentCache;
use super::seq_state::SeqState;

/// The finalized metrics, evidence, and first-seen application-layer fields
/// for one bidirectional conversation. Serialized verbatim into the result
/// bundle .
#[derive(Debug, Clone, Serialize)]
pub struct FlowAgg {
    pub key: FlowKey,
    /// Stable 0-based TCP stream id assigned by the orchestrator after
    /// finalization; `None` for UDP flows and before assignment.
    pub stream_id: Option<u32>,

    pub first_seen_micros: i64,
    pub last_seen_micros: i64,
    pub packet_count: u64,

    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub bytes_client_to_server: u64,
    pub bytes_server_to_client: u64,

    /// `true` if the flow's forward direction (the key stored in the
    /// table) is the client.
    pub client_is_forward: bool,

    pub syn_retransmits: u32,
    pub retransmits: u32,
    /// Retransmitted payload length → occurrence count (scenario 2).
    pub retrans_size_count: std::collections::BTreeMap<u32, u32>,
    pub out_of_order: u32,
    pub dup_acks: u32,
    pub rst_count: u32,
    pub fragment_count: u32,

    pub mss: Option<u16>,
    pub sni: Option<String>,
    pub tls_version: Option<TlsVersion>,
    pub alpn: Option<String>,
    pub tls_client_hello_seen: bool,
    pub tls_server_hello_seen: bool,
    pub tls_alert_seen: bool,
    pub tls_alert_code: Option<u8>,
    pub handshake_failure_candidate: bool,

    pub http_method: Option<String>,
    pub http_host: Option<String>,

    pub syn_time_micros: Option<i64>,
    pub syn_ack_time_micros: Option<i64>,
    pub ack_time_micros: Option<i64>,
    pub rtt_ms: Option<f64>,

    pub app_bytes: u64,

    /// `true` once any evidence list has hit `evidence_cap`; the triage
    /// engine treats this as "range includes all packets" .
    pub evidence_overflow: bool,

    pub syn_indexes: Vec<u32>,
    pub retransmit_indexes: Vec<u32>,
    pub dup_ack_indexes: Vec<u32>,
    pub client_hello_indexes: Vec<u32>,
    pub alert_indexes: Vec<u32>,
    pub rst_indexes: Vec<u32>,
}

/// Handshake-visibility state machine .
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TlsObservation {
    NoHandshake,
    ClientHelloSeen,
    HandshakeVisible,
}

/// The mutable, in-progress state for one flow during the first pass.
/// Holds the [`FlowAgg`] plus the bookkeeping that never leaves the table
/// (seen-segment cache, per-direction sequence state).
#[derive(Debug)]
pub(crate) struct FlowTracker {
    pub(crate) agg: FlowAgg,
    seen_cache: SeenSegmentCache,
    seq_fwd: SeqState,
    seq_rev: SeqState,
    last_pure_ack_fwd: Option<u32>,
    last_pure_ack_rev: Option<u32>,
    client_direction: Option<Direction>,
    tls_state: TlsObservation,
    evidence_cap: usize,
}

impl FlowTracker {
    pub(crate) fn new(key: FlowKey, cache_capacity: usize, cache_ttl_micros: i64, evidence_cap: usize) -> Self {
        FlowTracker {
            agg: FlowAgg {
                key,
                stream_id: None,
                first_seen_micros: 0,
                last_seen_micros: 0,
                packet_count: 0,
                bytes_sent: 0,
                bytes_recv: 0,
                bytes_client_to_server: 0,
                bytes_server_to_client: 0,
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
                rtt_ms: None,
                app_bytes: 0,
                evidence_overflow: false,
                syn_indexes: Vec::new(),
                retransmit_indexes: Vec::new(),
                dup_ack_indexes: Vec::new(),
                client_hello_indexes: Vec::new(),
                alert_indexes: Vec::new(),
                rst_indexes: Vec::new(),
            },
            seen_cache: SeenSegmentCache::new(cache_capacity, cache_ttl_micros),
            seq_fwd: SeqState::default(),
            seq_rev: SeqState::default(),
            last_pure_ack_fwd: None,
            last_pure_ack_rev: None,
            client_direction: None,
            tls_state: TlsObservation::NoHandshake,
            evidence_cap,
        }
    }

    fn push_index(list: &mut Vec<u32>, idx: u32, cap: usize, overflow: &mut bool) {
        if list.len() < cap {
            list.push(idx);
        } else {
            *overflow = true;
        }
    }

    /// Applies one packet observed in `direction` to this flow's state.
    /// `packet_index` is the 1-based index of this packet within the flow.
    pub(crate) fn update(&mut self, direction: Direction, info: &PacketInfo, packet_index: u32) {
        let agg = &mut self.agg;
        if agg.packet_count == 0 {
            agg.first_seen_micros = info.ts_micros;
        }
        agg.last_seen_micros = info.ts_micros;
        agg.packet_count += 1;

        if info.is_fragment {
            agg.fragment_count += 1;
        }
        if info.flags.rst {
            agg.rst_count += 1;
            Self::push_index(&mut agg.rst_indexes, packet_index, self.evidence_cap, &mut agg.evidence_overflow);
        }

        if agg.mss.is_none() {
            agg.mss = info.mss;
        }

        if let Some(tls) = &info.tls {
            if agg.sni.is_none() {
                agg.sni = tls.sni.clone();
            }
            if agg.tls_version.is_none() {
                agg.tls_version = tls.version;
            }
            if agg.alpn.is_none() {
                agg.alpn = tls.alpn.clone();
            }
            if tls.client_hello {
                if !agg.tls_client_hello_seen {
                    agg.tls_client_hello_seen = true;
                    self.tls_state = TlsObservation::ClientHelloSeen;
                }
                Self::push_index(
                    &mut agg.client_hello_indexes,
                    packet_index,
                    self.evidence_cap,
                    &mut agg.evidence_overflow,
                );
            }
            if tls.server_hello {
                agg.tls_server_hello_seen = true;
                if self.tls_state == TlsObservation::ClientHelloSeen {
                    self.tls_state = TlsObservation::HandshakeVisible;
                }
            }
            if tls.alert {
                agg.tls_alert_seen = true;
                if agg.tls_alert_code.is_none() {
                    agg.tls_alert_code = tls.alert_code;
                }
                Self::push_index(&mut agg.alert_indexes, packet_index, self.evidence_cap, &mut agg.evidence_overflow);
                if self.tls_state == TlsObservation::ClientHelloSeen {
                    agg.handshake_failure_candidate = true;
                }
            }
        }
        if info.flags.rst && self.tls_state == TlsObservation::ClientHelloSeen {
            agg.handshake_failure_candidate = true;
        }

        if let Some(http) = &info.http {
            if agg.http_method.is_none() {
                agg.http_method = http.method.clone();
            }
            if agg.http_host.is_none() {
                agg.http_host = http.host.clone();
            }
        }

        // Handshake timestamps.
        if info.flags.syn && !info.flags.ack {
            if agg.syn_time_micros.is_none() {
                agg.syn_time_micros = Some(info.ts_micros);
                self.client_direction = Some(direction);
            }
            if self.client_direction == Some(direction) {
                Self::push_index(&mut agg.syn_indexes, packet_index, self.evidence_cap, &mut agg.evidence_overflow);
            }
        } else if info.flags.syn && info.flags.ack && agg.syn_ack_time_micros.is_none() {
            agg.syn_ack_time_micros = Some(info.ts_micros);
            if let Some(syn_time) = agg.syn_time_micros {
                agg.rtt_ms = Some((info.ts_micros - syn_time) as f64 / 1000.0);
            }
        } else if info.flags.ack
            && !info.flags.syn
            && agg.ack_time_micros.is_none()
            && agg.syn_ack_time_micros.is_some()
        {
            agg.ack_time_micros = Some(info.ts_micros);
        }

        // Payload-bearing segments: byte credit, retransmission, out-of-order.
        if info.protocol == TransportProtocol::Tcp && info.payload_len > 0 {
            let is_retransmission = self
                .seen_cache
                .probe(direction, info.seq, info.payload_len, info.ts_micros);
            match direction {
                Direction::Forward => agg.bytes_sent += info.payload_len as u64,
                Direction::Reverse => agg.bytes_recv += info.payload_len as u64,
            }
            agg.app_bytes += info.payload_len as u64;
            if is_retransmission {
                agg.retransmits += 1;
                *agg.retrans_size_count.entry(info.payload_len).or_insert(0) += 1;
                Self::push_index(
                    &mut agg.retransmit_indexes,
                    packet_index,
                    self.evidence_cap,
                    &mut agg.evidence_overflow,
                );
            } else {
                let seq_state = match direction {
                    Direction::Forward => &mut self.seq_fwd,
                    Direction::Reverse => &mut self.seq_rev,
                };
                if seq_state.observe(info.seq, info.payload_len) {
                    agg.out_of_order += 1;
                }
            }
        }

        // Duplicate ACK: zero-payload, ACK set, SYN clear, same ack number
        // as the previous such segment in the same direction.
        if is_pure_ack(&info.flags) && info.payload_len == 0 {
            let last = match direction {
                Direction::Forward => &mut self.last_pure_ack_fwd,
                Direction::Reverse => &mut self.last_pure_ack_rev,
            };
            if *last == Some(info.ack) {
                agg.dup_acks += 1;
                Self::push_index(&mut agg.dup_ack_indexes, packet_index, self.evidence_cap, &mut agg.evidence_overflow);
            }
            *last = Some(info.ack);
        }
    }

    /// Finalizes the flow after the capture is fully consumed. Idempotent
    /// only by contract — callers must invoke this exactly once
    /// (`FlowAgg` lifecycle).
    pub(crate) fn finalize(mut self) -> FlowAgg {
        let agg = &mut self.agg;
        let client_is_forward = match self.client_direction {
            Some(Direction::Forward) => true,
            Some(Direction::Reverse) => false,
            // No SYN observed: first-seen (forward) direction is client.
            None => true,
        };
        agg.client_is_forward = client_is_forward;
        if client_is_forward {
            agg.bytes_client_to_server = agg.bytes_sent;
            agg.bytes_server_to_client = agg.bytes_recv;
        } else {
            agg.bytes_client_to_server = agg.bytes_recv;
            agg.bytes_server_to_client = agg.bytes_sent;
        }
        agg.syn_retransmits = (agg.syn_indexes.len() as u32).saturating_sub(1);
        self.agg
    }
}

fn is_pure_ack(flags: &TcpFlags) -> bool {
    flags.ack && !flags.syn
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::packet::{PacketInfo, TransportProtocol};
    use pretty_assertions::assert_eq;
    use std::net::{IpAddr, Ipv4Addr};

    fn key() -> FlowKey {
        FlowKey {
            protocol: TransportProtocol::Tcp,
            src_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            dst_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            src_port: 1234,
            dst_port: 443,
        }
    }

    fn packet(ts_micros: i64, seq: u32, ack: u32, flags: TcpFlags, payload_len: u32) -> PacketInfo {
        PacketInfo {
            ts_micros,
            protocol: TransportProtocol::Tcp,
            src_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            dst_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            src_port: 1234,
            dst_port: 443,
            wire_len: 60 + payload_len,
            payload_len,
            seq,
            ack,
            window: 65535,
            flags,
            mss: None,
            is_fragment: false,
            tls: None,
            http: None,
            payload_offset: 0,
        }
    }

    #[test]
    fn three_way_handshake_sets_rtt() {
        let mut tracker = FlowTracker::new(key(), 2048, 3_000_000, 4096);
        let syn = packet(0, 1000, 0, TcpFlags { syn: true, ..Default::default() }, 0);
        tracker.update(Direction::Forward, &syn, 1);

        let synack = packet(
            10_000,
            2000,
            1001,
            TcpFlags { syn: true, ack: true, ..Default::default() },
            0,
        );
        tracker.update(Direction::Reverse, &synack, 2);

        let ack = packet(20_000, 1001, 2001, TcpFlags { ack: true, ..Default::default() }, 0);
        tracker.update(Direction::Forward, &ack, 3);

        let agg = tracker.finalize();
        assert_eq!(agg.syn_time_micros, Some(0));
        assert_eq!(agg.syn_ack_time_micros, Some(10_000));
        assert_eq!(agg.ack_time_micros, Some(20_000));
        assert_eq!(agg.rtt_ms, Some(10.0));
        assert!(agg.client_is_forward);
    }

    #[test]
    fn retransmission_only_counts_second_occurrence() {
        let mut tracker = FlowTracker::new(key(), 2048, 3_000_000, 4096);
        let seg = packet(0, 42, 0, TcpFlags { ack: true, ..Default::default() }, 200);
        tracker.update(Direction::Forward, &seg, 1);
        let seg2 = packet(1_000_000, 42, 0, TcpFlags { ack: true, ..Default::default() }, 200);
        tracker.update(Direction::Forward, &seg2, 2);

        let agg = tracker.finalize();
        assert_eq!(agg.retransmits, 1);
        assert_eq!(agg.retrans_size_count.get(&200), Some(&1));
        assert_eq!(agg.out_of_order, 0);
    }

    #[test]
    fn syn_retransmission_counted_after_finalize() {
        let mut tracker = FlowTracker::new(key(), 2048, 3_000_000, 4096);
        let syn1 = packet(0, 1000, 0, TcpFlags { syn: true, ..Default::default() }, 0);
        tracker.update(Direction::Forward, &syn1, 1);
        let syn2 = packet(5_000, 1000, 0, TcpFlags { syn: true, ..Default::default() }, 0);
        tracker.update(Direction::Forward, &syn2, 2);

        let agg = tracker.finalize();
        assert_eq!(agg.syn_retransmits, 1);
    }

    #[test]
    fn byte_totals_are_conserved_after_finalize() {
        let mut tracker = FlowTracker::new(key(), 2048, 3_000_000, 4096);
        let fwd = packet(0, 1, 0, TcpFlags { ack: true, ..Default::default() }, 100);
        tracker.update(Direction::Forward, &fwd, 1);
        let rev = packet(1, 1, 101, TcpFlags { ack: true, ..Default::default() }, 50);
        tracker.update(Direction::Reverse, &rev, 2);

        let agg = tracker.finalize();
        assert_eq!(
            agg.bytes_client_to_server + agg.bytes_server_to_client,
            agg.bytes_sent + agg.bytes_recv
        );
    }

    #[test]
    fn dup_ack_on_repeated_ack_number() {
        let mut tracker = FlowTracker::new(key(), 2048, 3_000_000, 4096);
        let a1 = packet(0, 1, 500, TcpFlags { ack: true, ..Default::default() }, 0);
        tracker.update(Direction::Forward, &a1, 1);
        let a2 = packet(1, 1, 500, TcpFlags { ack: true, ..Default::default() }, 0);
        tracker.update(Direction::Forward, &a2, 2);

        let agg = tracker.finalize();
        assert_eq!(agg.dup_acks, 1);
    }
}
