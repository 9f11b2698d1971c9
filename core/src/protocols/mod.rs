//! Protocol parsing: packet-level (Ethernet/IPv4/IPv6/TCP/UDP) and
//! stream-level (TLS, HTTP) dissectors.
//!
//! The structure mirrors the teacher's `protocols` module split, adapted
//! from DPDK `Mbuf`-backed zero-copy headers to plain byte slices, since
//! this crate parses whole frames read from a capture file rather than
//! packets arriving in mempool buffers.

pub mod packet;
pub mod stream;
