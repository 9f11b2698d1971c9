//! TLS record and handshake dissection.
//!
//! A hand-rolled mini-parser rather than a wrapped `tls-parser` crate: the
//! extraction surface is deliberately narrow (— SNI, ALPN, the
//! negotiated version, and the alert description code only), and the
//! teacher's own `protocols::stream::tls::handshake` types
//! (`ClientHello`/`ServerHello`/`KeyShareEntry`, ...) model far more of the
//! handshake than this system needs. The struct names below echo that
//! module's naming without importing its scope.

pub mod parser;

use serde::Serialize;

/// Negotiated or observed TLS protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
pub enum TlsVersion {
    #[strum(serialize = "TLS1.0")]
    Tls1_0,
    #[strum(serialize = "TLS1.1")]
    Tls1_1,
    #[strum(serialize = "TLS1.2")]
    Tls1_2,
    #[strum(serialize = "TLS1.3")]
    Tls1_3,
}

impl TlsVersion {
    /// Maps the two version bytes per this design; unknown values leave
    /// the version unset rather than guessing.
    pub fn from_bytes(hi: u8, lo: u8) -> Option<TlsVersion> {
        match (hi, lo) {
            (0x03, 0x01) => Some(TlsVersion::Tls1_0),
            (0x03, 0x02) => Some(TlsVersion::Tls1_1),
            (0x03, 0x03) => Some(TlsVersion::Tls1_2),
            (0x03, 0x04) => Some(TlsVersion::Tls1_3),
            _ => None,
        }
    }
}

/// Per-packet TLS signals extracted from a single TCP payload.
///
/// Any field may be absent: a payload can carry several TLS records, only
/// some of which are recognized or fully in-bounds.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TlsFields {
    pub sni: Option<String>,
    pub version: Option<TlsVersion>,
    pub alpn: Option<String>,
    pub client_hello: bool,
    pub server_hello: bool,
    pub alert: bool,
    /// Alert description byte (level is not retained, per this design).
    pub alert_code: Option<u8>,
}

impl TlsFields {
    fn is_empty(&self) -> bool {
        self.sni.is_none()
            && self.version.is_none()
            && self.alpn.is_none()
            && !self.client_hello
            && !self.server_hello
            && !self.alert
            && self.alert_code.is_none()
    }
}

/// Dissects TLS records from a single TCP payload.
///
/// Returns `None` if no field could be extracted at all (including the
/// case where the first record's header doesn't even parse). A bounds
/// failure partway through a payload silently stops dissection of that
/// payload, keeping whatever fields were already extracted — it never
/// clears previously-extracted fields.
pub fn dissect(payload: &[u8]) -> Option<TlsFields> {
    let mut fields = TlsFields::default();
    let mut rest = payload;
    while let Some((record_type, version, body, remainder)) = parser::read_record(rest) {
        parser::apply_record(record_type, version, body, &mut fields);
        rest = remainder;
    }
    if fields.is_empty() {
        None
    } else {
        Some(fields)
    }
}
