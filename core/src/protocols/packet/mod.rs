//! Types for parsing packet-level network protocols from a raw frame.
//!
//! Each submodule parses a single header from a byte slice and returns the
//! header plus the offset of its payload, in the style of the teacher's
//! `protocols::packet` module (itself adapted from
//! [pnet::packet](https://docs.rs/pnet/latest/pnet/packet/index.html)), but
//! over a `&[u8]` rather than a DPDK `Mbuf` — there is no live capture or
//! mempool here, only frames already materialized from the reader.

pub mod decoder;
pub mod ethernet;
pub mod ipv4;
pub mod ipv6;
pub mod tcp;
pub mod udp;

pub use decoder::{decode, DecodeOutcome, PacketInfo, TcpFlags, TransportProtocol};

use thiserror::Error;

/// Errors raised while walking a single frame's headers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketParseError {
    #[error("packet buffer too short to contain the expected header")]
    InvalidRead,
    #[error("unrecognized or unsupported protocol")]
    InvalidProtocol,
}

pub type Result<T> = std::result::Result<T, PacketParseError>;
