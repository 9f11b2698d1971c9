//! Frame decoding: Ethernet/IPv4/IPv6 → TCP/UDP → [`PacketInfo`].
//!
//! Unlike the per-protocol `parse` functions this module calls, decoding a
//! whole frame never fails loudly: an unrecognized link type, a truncated
//! header, an IP payload that isn't TCP/UDP, or a fragment all resolve to
//! [`DecodeOutcome::Skipped`] (§7 `ParseSkip`) so the caller
//! can still credit the frame's wire bytes to the capture-wide timeseries.

use std::net::IpAddr;

use super::{ethernet, ipv4, ipv6, tcp, udp};

/// DLT values this decoder understands; anything else is skipped.
pub const LINKTYPE_ETHERNET: u16 = 1;
pub const LINKTYPE_RAW_IP: u16 = 101;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum_macros::Display)]
pub enum TransportProtocol {
    #[strum(serialize = "TCP")]
    Tcp,
    #[strum(serialize = "UDP")]
    Udp,
}

/// The 8 TCP control bits the `PacketInfo` enumerates explicitly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct TcpFlags {
    pub syn: bool,
    pub ack: bool,
    pub fin: bool,
    pub rst: bool,
    pub psh: bool,
    pub urg: bool,
}

impl From<u8> for TcpFlags {
    fn from(flags: u8) -> Self {
        TcpFlags {
            syn: flags & tcp::SYN != 0,
            ack: flags & tcp::ACK != 0,
            fin: flags & tcp::FIN != 0,
            rst: flags & tcp::RST != 0,
            psh: flags & tcp::PSH != 0,
            urg: flags & tcp::URG != 0,
        }
    }
}

/// An immutable decoded snapshot of a single packet.
///
/// TLS/HTTP fields are filled in by the stream dissectors after this struct
/// is produced; the decoder itself only ever sets the link/transport
/// fields.
#[derive(Debug, Clone)]
pub struct PacketInfo {
    pub ts_micros: i64,
    pub protocol: TransportProtocol,
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    /// Full length of the frame as it appeared on the wire.
    pub wire_len: u32,
    /// Length of the transport payload (TCP/UDP payload bytes) only.
    pub payload_len: u32,
    pub seq: u32,
    pub ack: u32,
    pub window: u16,
    pub flags: TcpFlags,
    pub mss: Option<u16>,
    pub is_fragment: bool,
    pub tls: Option<crate::protocols::stream::tls::TlsFields>,
    pub http: Option<crate::protocols::stream::http::HttpFields>,
    /// Offset of the transport payload within the original frame, for
    /// dissectors that need to re-read it (TLS/HTTP).
    pub(crate) payload_offset: usize,
}

pub enum DecodeOutcome {
    Parsed {
        info: PacketInfo,
        /// Transport payload slice, valid only within the lifetime of the
        /// original frame buffer the caller owns.
        payload_range: (usize, usize),
    },
    /// Not TCP/UDP over IP, a fragment, or a header that didn't parse.
    /// `wire_len` is always known even when nothing else could be decoded.
    Skipped { wire_len: u32 },
}

/// Decodes a single frame captured with DLT `link_type`.
pub fn decode(link_type: u16, frame: &[u8], wire_len: u32, ts_micros: i64) -> DecodeOutcome {
    let ip_offset = match link_type {
        LINKTYPE_ETHERNET => match ethernet::parse(frame) {
            Ok(hdr) => hdr.header_len,
            Err(_) => return DecodeOutcome::Skipped { wire_len },
        },
        LINKTYPE_RAW_IP => 0,
        _ => return DecodeOutcome::Skipped { wire_len },
    };
    if frame.len() <= ip_offset {
        return DecodeOutcome::Skipped { wire_len };
    }
    let ip_data = &frame[ip_offset..];
    let version = (ip_data[0] & 0xf0) >> 4;
    let (src_ip, dst_ip, next_proto, is_fragment, is_continuation_fragment, l4_offset, l4_len) = match version {
        4 => match ipv4::parse(ip_data) {
            Ok(hdr) => {
                let l4_len = (hdr.total_len as usize).saturating_sub(hdr.header_len);
                (
                    IpAddr::V4(hdr.src),
                    IpAddr::V4(hdr.dst),
                    hdr.protocol,
                    hdr.is_fragment,
                    hdr.frag_offset > 0,
                    hdr.header_len,
                    l4_len,
                )
            }
            Err(_) => return DecodeOutcome::Skipped { wire_len },
        },
        6 => match ipv6::parse(ip_data) {
            Ok(hdr) => (
                IpAddr::V6(hdr.src),
                IpAddr::V6(hdr.dst),
                hdr.next_header,
                false,
                false,
                ipv6::IPV6_HEADER_LEN,
                hdr.payload_len as usize,
            ),
            Err(_) => return DecodeOutcome::Skipped { wire_len },
        },
        _ => return DecodeOutcome::Skipped { wire_len },
    };

    if is_continuation_fragment {
        // Only the first fragment carries a transport header; reassembly of
        // later fragments is a non-goal, so they resolve to wire bytes only.
        return DecodeOutcome::Skipped { wire_len };
    }

    if ip_data.len() < l4_offset {
        return DecodeOutcome::Skipped { wire_len };
    }
    let l4_data_full = &ip_data[l4_offset..];
    let l4_data = if l4_len > 0 && l4_len <= l4_data_full.len() {
        &l4_data_full[..l4_len]
    } else {
        l4_data_full
    };

    let abs_l4_offset = ip_offset + l4_offset;

    match next_proto {
        ipv4::TCP_PROTOCOL => match tcp::parse(l4_data) {
            Ok(hdr) => {
                let payload_start = abs_l4_offset + hdr.header_len;
                let payload_len = l4_data.len().saturating_sub(hdr.header_len) as u32;
                let payload_end = (payload_start + payload_len as usize).min(frame.len());
                let payload = frame.get(payload_start..payload_end).unwrap_or(&[]);
                let info = PacketInfo {
                    ts_micros,
                    protocol: TransportProtocol::Tcp,
                    src_ip,
                    dst_ip,
                    src_port: hdr.src_port,
                    dst_port: hdr.dst_port,
                    wire_len,
                    payload_len,
                    seq: hdr.seq_no,
                    ack: hdr.ack_no,
                    window: hdr.window,
                    flags: TcpFlags::from(hdr.flags),
                    mss: hdr.mss,
                    is_fragment,
                    tls: crate::protocols::stream::tls::dissect(payload),
                    http: crate::protocols::stream::http::sniff(payload),
                    payload_offset: payload_start,
                };
                DecodeOutcome::Parsed {
                    info,
                    payload_range: (payload_start, payload_end),
                }
            }
            Err(_) => DecodeOutcome::Skipped { wire_len },
        },
        ipv4::UDP_PROTOCOL => match udp::parse(l4_data) {
            Ok(hdr) => {
                let payload_start = abs_l4_offset + udp::UDP_HEADER_LEN;
                let payload_len = (hdr.length as usize).saturating_sub(udp::UDP_HEADER_LEN) as u32;
                let payload_end = payload_start + payload_len as usize;
                let info = PacketInfo {
                    ts_micros,
                    protocol: TransportProtocol::Udp,
                    src_ip,
                    dst_ip,
                    src_port: hdr.src_port,
                    dst_port: hdr.dst_port,
                    wire_len,
                    payload_len,
                    seq: 0,
                    ack: 0,
                    window: 0,
                    flags: TcpFlags::default(),
                    mss: None,
                    is_fragment,
                    tls: None,
                    http: None,
                    payload_offset: payload_start,
                };
                DecodeOutcome::Parsed {
                    info,
                    payload_range: (payload_start, payload_end.min(frame.len())),
                }
            }
            Err(_) => DecodeOutcome::Skipped { wire_len },
        },
        _ => DecodeOutcome::Skipped { wire_len },
    }
}
