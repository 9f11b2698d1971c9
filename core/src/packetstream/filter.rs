//! Filter predicate parsing and matching for the packet-stream API
//! (§6 "filter grammar").

use std::net::IpAddr;

use crate::bundle::PacketMeta;

#[derive(Debug, Clone, Default)]
pub struct FilterPredicate {
    ip: Option<IpAddr>,
    src: Option<IpAddr>,
    dst: Option<IpAddr>,
    port: Option<u16>,
    src_port: Option<u16>,
    dst_port: Option<u16>,
    proto: Option<String>,
    sni: Option<String>,
    stream: Option<u32>,
    flags: Vec<String>,
    pair: bool,
}

/// Parses space-separated `key:value` tokens; unrecognized keys are
/// silently ignored .
pub fn parse(query: &str) -> FilterPredicate {
    let mut predicate = FilterPredicate::default();
    for token in query.split_whitespace() {
        let Some((key, value)) = token.split_once(':') else { continue };
        match key {
            "ip" => predicate.ip = value.parse().ok(),
            "src" => predicate.src = value.parse().ok(),
            "dst" => predicate.dst = value.parse().ok(),
            "port" => predicate.port = value.parse().ok(),
            "src_port" => predicate.src_port = value.parse().ok(),
            "dst_port" => predicate.dst_port = value.parse().ok(),
            "proto" => predicate.proto = Some(value.to_uppercase()),
            "sni" => predicate.sni = Some(value.to_lowercase()),
            "stream" => predicate.stream = value.parse().ok(),
            "flags" => predicate.flags = value.split(',').map(|s| s.to_uppercase()).collect(),
            "pair" => predicate.pair = value.eq_ignore_ascii_case("true"),
            _ => {}
        }
    }
    predicate
}

impl FilterPredicate {
    pub fn matches(&self, packet: &PacketMeta) -> bool {
        let src_ip: Option<IpAddr> = packet.src_ip.parse().ok();
        let dst_ip: Option<IpAddr> = packet.dst_ip.parse().ok();

        if let Some(ip) = self.ip {
            if src_ip != Some(ip) && dst_ip != Some(ip) {
                return false;
            }
        }
        if self.pair && self.src.is_some() && self.dst.is_some() {
            let forward = src_ip == self.src && dst_ip == self.dst;
            let reverse = src_ip == self.dst && dst_ip == self.src;
            if !forward && !reverse {
                return false;
            }
        } else {
            if let Some(src) = self.src {
                if src_ip != Some(src) {
                    return false;
                }
            }
            if let Some(dst) = self.dst {
                if dst_ip != Some(dst) {
                    return false;
                }
            }
        }
        if let Some(port) = self.port {
            if packet.src_port != port && packet.dst_port != port {
                return false;
            }
        }
        if let Some(p) = self.src_port {
            if packet.src_port != p {
                return false;
            }
        }
        if let Some(p) = self.dst_port {
            if packet.dst_port != p {
                return false;
            }
        }
        if let Some(proto) = &self.proto {
            if &packet.protocol != proto {
                return false;
            }
        }
        if let Some(sni) = &self.sni {
            match &packet.sni {
                Some(actual) if actual.to_lowercase().contains(sni) => {}
                _ => return false,
            }
        }
        if let Some(stream) = self.stream {
            if packet.stream_id != Some(stream) {
                return false;
            }
        }
        if !self.flags.is_empty() {
            let flags = &packet.tcp_flags;
            for flag in &self.flags {
                let set = match flag.as_str() {
                    "SYN" => flags.syn,
                    "ACK" => flags.ack,
                    "FIN" => flags.fin,
                    "RST" => flags.rst,
                    "PSH" => flags.psh,
                    "URG" => flags.urg,
                    _ => false,
                };
                if !set {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::TcpFlagsMeta;

    fn packet() -> PacketMeta {
        PacketMeta {
            index: 1,
            timestamp: "2026-01-01T00:00:00Z".into(),
            protocol: "TCP".into(),
            src_ip: "10.0.0.1".into(),
            dst_ip: "10.0.0.2".into(),
            src_port: 1234,
            dst_port: 443,
            length: 60,
            info: "SYN".into(),
            error_tags: vec![],
            tcp_flags: TcpFlagsMeta { syn: true, ..Default::default() },
            seq: 0,
            ack: 0,
            window: 0,
            stream_id: Some(0),
            sni: None,
            http_method: None,
            http_host: None,
        }
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let predicate = parse("bogus:whatever port:443");
        assert!(predicate.matches(&packet()));
    }

    #[test]
    fn pair_matches_either_direction() {
        let forward = parse("pair:true src:10.0.0.1 dst:10.0.0.2");
        let reverse = parse("pair:true src:10.0.0.2 dst:10.0.0.1");
        assert!(forward.matches(&packet()));
        assert!(reverse.matches(&packet()));
    }

    #[test]
    fn flags_require_all_present() {
        let predicate = parse("flags:SYN,ACK");
        assert!(!predicate.matches(&packet()));
    }
}
