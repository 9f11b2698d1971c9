//! Flow identifiers.
//!
//! Adapted from the teacher's `conntrack::conn_id::FiveTuple`: a directional
//! 5-tuple plus a `reversed()` helper, but without the non-directional
//! `ConnId` the teacher additionally keeps for table lookups — this
//! system's [`FlowTable`](super::FlowTable) looks up the forward key, then
//! falls back to the reverse explicitly (step 1), rather than
//! normalizing up front.

use std::fmt;
use std::net::IpAddr;

use serde::Serialize;

use crate::protocols::packet::{PacketInfo, TransportProtocol};

/// A directional flow identifier: (protocol, src, dst) as observed on the
/// packet that first created the table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FlowKey {
    pub protocol: TransportProtocol,
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
}

impl FlowKey {
    pub fn from_packet(info: &PacketInfo) -> Self {
        FlowKey {
            protocol: info.protocol,
            src_ip: info.src_ip,
            dst_ip: info.dst_ip,
            src_port: info.src_port,
            dst_port: info.dst_port,
        }
    }

    /// The key for the opposite direction of the same conversation.
    pub fn reversed(&self) -> FlowKey {
        FlowKey {
            protocol: self.protocol,
            src_ip: self.dst_ip,
            dst_ip: self.src_ip,
            src_port: self.dst_port,
            dst_port: self.src_port,
        }
    }
}

impl fmt::Display for FlowKey {
    /// `"src:sport -> dst:dport (proto)"`, the flow label the design
    /// requires for top-flow statistics.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{} ({})",
            self.src_ip, self.src_port, self.dst_ip, self.dst_port, self.protocol
        )
    }
}

/// Which direction of a flow a packet belongs to.
///
/// Forward is the direction of the flow's first-observed packet; see the
/// GLOSSARY in the design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Direction {
    Forward,
    Reverse,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn reversed_swaps_endpoints() {
        let key = FlowKey {
            protocol: TransportProtocol::Tcp,
            src_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            dst_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            src_port: 1234,
            dst_port: 443,
        };
        let rev = key.reversed();
        assert_eq!(rev.src_ip, key.dst_ip);
        assert_eq!(rev.dst_ip, key.src_ip);
        assert_eq!(rev.src_port, key.dst_port);
        assert_eq!(rev.dst_port, key.src_port);
        assert_eq!(rev.reversed(), key);
    }

    #[test]
    fn display_matches_flow_label_format() {
        let key = FlowKey {
            protocol: TransportProtocol::Tcp,
            src_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            dst_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            src_port: 1234,
            dst_port: 443,
        };
        assert_eq!(format!("{}", key), "10.0.0.1:1234 -> 10.0.0.2:443 (TCP)");
    }
}
