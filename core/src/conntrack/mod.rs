//! Bidirectional flow aggregation .
//!
//! Adapted from the teacher's `conntrack::ConnTracker<T>`, which keeps a
//! `HashMap<FiveTuple, T>` of live connections behind an LRU timeout policy.
//! This table is simpler: a single offline pass never needs a timeout sweep,
//! only direction resolution and insertion-order-stable finalization.

pub mod conn_id;
pub mod flow;
pub mod seen_cache;
pub mod seq_state;

use hashlink::LinkedHashMap;

use crate::protocols::packet::PacketInfo;

pub use conn_id::{Direction, FlowKey};
pub use flow::FlowAgg;
use flow::FlowTracker;

/// Aggregates a capture's packets into per-flow state.
///
/// Insertion order is preserved (via [`LinkedHashMap`]) so that, given the
/// same input, [`FlowTable::finalize_all`] always returns flows in the order
/// their first packet was observed — a prerequisite for the deterministic
/// output the design requires.
pub struct FlowTable {
    flows: LinkedHashMap<FlowKey, FlowTracker>,
    packet_counts: LinkedHashMap<FlowKey, u32>,
    cache_capacity: usize,
    cache_ttl_micros: i64,
    evidence_cap: usize,
}

impl FlowTable {
    pub fn new(cache_capacity: usize, cache_ttl_micros: i64, evidence_cap: usize) -> Self {
        FlowTable {
            flows: LinkedHashMap::new(),
            packet_counts: LinkedHashMap::new(),
            cache_capacity,
            cache_ttl_micros,
            evidence_cap,
        }
    }

    /// Feeds one decoded packet into the table, creating a new flow entry
    /// if neither the forward nor reverse key is already tracked.
    ///
    /// Returns the resolved [`FlowKey`] (the table's canonical, forward key
    /// for this conversation) so callers can assign stream ids later.
    pub fn update(&mut self, info: &PacketInfo) -> FlowKey {
        let fwd_key = FlowKey::from_packet(info);
        let (table_key, direction) = if self.flows.contains_key(&fwd_key) {
            (fwd_key, Direction::Forward)
        } else {
            let rev_key = fwd_key.reversed();
            if self.flows.contains_key(&rev_key) {
                (rev_key, Direction::Reverse)
            } else {
                (fwd_key, Direction::Forward)
            }
        };

        let tracker = self.flows.entry(table_key).or_insert_with(|| {
            FlowTracker::new(table_key, self.cache_capacity, self.cache_ttl_micros, self.evidence_cap)
        });
        let count = self.packet_counts.entry(table_key).or_insert(0);
        *count += 1;
        tracker.update(direction, info, *count);
        table_key
    }

    /// Number of distinct flows observed so far.
    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// Consumes the table, finalizing every flow in first-seen order.
    pub fn finalize_all(self) -> Vec<FlowAgg> {
        self.flows.into_iter().map(|(_, tracker)| tracker.finalize()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::packet::{PacketInfo, TcpFlags, TransportProtocol};
    use std::net::{IpAddr, Ipv4Addr};

    fn packet(src_port: u16, dst_port: u16, flags: TcpFlags, seq: u32, ack: u32, payload_len: u32) -> PacketInfo {
        PacketInfo {
            ts_micros: 0,
            protocol: TransportProtocol::Tcp,
            src_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            dst_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            src_port,
            dst_port,
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
    fn reverse_direction_joins_same_flow() {
        let mut table = FlowTable::new(2048, 3_000_000, 4096);
        let syn = packet(1234, 443, TcpFlags { syn: true, ..Default::default() }, 0, 0, 0);
        table.update(&syn);

        let mut synack = packet(443, 1234, TcpFlags { syn: true, ack: true, ..Default::default() }, 0, 0, 0);
        synack.src_ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));
        synack.dst_ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        table.update(&synack);

        assert_eq!(table.len(), 1);
        let flows = table.finalize_all();
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].packet_count, 2);
    }

    #[test]
    fn packet_count_matches_update_calls() {
        let mut table = FlowTable::new(2048, 3_000_000, 4096);
        for i in 0..5u32 {
            let p = packet(1234, 443, TcpFlags { ack: true, ..Default::default() }, i * 100, 0, 100);
            table.update(&p);
        }
        let flows = table.finalize_all();
        assert_eq!(flows[0].packet_count, 5);
    }

    #[test]
    fn distinct_five_tuples_create_distinct_flows() {
        let mut table = FlowTable::new(2048, 3_000_000, 4096);
        table.update(&packet(1234, 443, TcpFlags::default(), 0, 0, 0));
        table.update(&packet(5555, 443, TcpFlags::default(), 0, 0, 0));
        assert_eq!(table.len(), 2);
    }
}
