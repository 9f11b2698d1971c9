//! Byte-level TLS record/handshake walking.
//!
//! All functions here are careful to bounds-check before indexing and to
//! return early (dropping only the current record/message/extension, never
//! touching fields already populated by an earlier record) on any length
//! mismatch, per this design

use super::{TlsFields, TlsVersion};

const CONTENT_CHANGE_CIPHER_SPEC: u8 = 20;
const CONTENT_ALERT: u8 = 21;
const CONTENT_HANDSHAKE: u8 = 22;
const CONTENT_APPLICATION_DATA: u8 = 23;

const HANDSHAKE_CLIENT_HELLO: u8 = 1;
const HANDSHAKE_SERVER_HELLO: u8 = 2;

const EXT_SERVER_NAME: u16 = 0;
const EXT_ALPN: u16 = 16;

/// Reads one TLS record header off the front of `data`.
///
/// Returns `(content_type, version, body, remainder)`, or `None` if the
/// 5-byte header or the declared body don't fit in `data`.
pub(super) fn read_record(data: &[u8]) -> Option<(u8, (u8, u8), &[u8], &[u8])> {
    if data.len() < 5 {
        return None;
    }
    let content_type = data[0];
    let version = (data[1], data[2]);
    let length = u16::from_be_bytes([data[3], data[4]]) as usize;
    if data.len() < 5 + length {
        return None;
    }
    Some((content_type, version, &data[5..5 + length], &data[5 + length..]))
}

pub(super) fn apply_record(content_type: u8, version: (u8, u8), body: &[u8], fields: &mut TlsFields) {
    match content_type {
        CONTENT_HANDSHAKE => parse_handshake(body, fields),
        CONTENT_ALERT => {
            if body.len() >= 2 {
                fields.alert = true;
                fields.alert_code = Some(body[1]);
            }
        }
        CONTENT_APPLICATION_DATA => {
            if fields.version.is_none() {
                if let Some(v) = TlsVersion::from_bytes(version.0, version.1) {
                    fields.version = Some(v);
                }
            }
        }
        CONTENT_CHANGE_CIPHER_SPEC => {}
        _ => {}
    }
}

fn parse_handshake(mut body: &[u8], fields: &mut TlsFields) {
    while body.len() >= 4 {
        let hs_type = body[0];
        let length = ((body[1] as usize) << 16) | ((body[2] as usize) << 8) | body[3] as usize;
        if body.len() < 4 + length {
            return;
        }
        let hs_body = &body[4..4 + length];
        match hs_type {
            HANDSHAKE_CLIENT_HELLO => {
                fields.client_hello = true;
                parse_client_hello(hs_body, fields);
            }
            HANDSHAKE_SERVER_HELLO => {
                fields.server_hello = true;
                parse_server_hello(hs_body, fields);
            }
            _ => {}
        }
        body = &body[4 + length..];
    }
}

fn parse_client_hello(body: &[u8], fields: &mut TlsFields) {
    let mut pos = 0usize;
    if body.len() < pos + 2 {
        return;
    }
    if let Some(v) = TlsVersion::from_bytes(body[0], body[1]) {
        fields.version = Some(v);
    }
    pos += 2;
    pos += 32; // client random
    if body.len() < pos + 1 {
        return;
    }
    let session_id_len = body[pos] as usize;
    pos += 1;
    if body.len() < pos + session_id_len {
        return;
    }
    pos += session_id_len;
    if body.len() < pos + 2 {
        return;
    }
    let cipher_suites_len = u16::from_be_bytes([body[pos], body[pos + 1]]) as usize;
    pos += 2;
    if body.len() < pos + cipher_suites_len {
        return;
    }
    pos += cipher_suites_len;
    if body.len() < pos + 1 {
        return;
    }
    let compression_len = body[pos] as usize;
    pos += 1;
    if body.len() < pos + compression_len {
        return;
    }
    pos += compression_len;
    if body.len() < pos + 2 {
        // No extensions present; not an error, just nothing more to read.
        return;
    }
    let ext_total_len = u16::from_be_bytes([body[pos], body[pos + 1]]) as usize;
    pos += 2;
    if body.len() < pos + ext_total_len {
        return;
    }
    parse_extensions(&body[pos..pos + ext_total_len], fields);
}

fn parse_server_hello(body: &[u8], fields: &mut TlsFields) {
    let mut pos = 0usize;
    if body.len() < pos + 2 {
        return;
    }
    if let Some(v) = TlsVersion::from_bytes(body[0], body[1]) {
        fields.version = Some(v);
    }
    pos += 2;
    pos += 32; // server random
    if body.len() < pos + 1 {
        return;
    }
    let session_id_len = body[pos] as usize;
    pos += 1;
    if body.len() < pos + session_id_len {
        return;
    }
    pos += session_id_len;
    if body.len() < pos + 2 {
        return;
    }
    pos += 2; // cipher_suite
    if body.len() < pos + 1 {
        return;
    }
    pos += 1; // compression_method
    if body.len() < pos + 2 {
        return;
    }
    let ext_total_len = u16::from_be_bytes([body[pos], body[pos + 1]]) as usize;
    pos += 2;
    if body.len() < pos + ext_total_len {
        return;
    }
    parse_extensions(&body[pos..pos + ext_total_len], fields);
}

fn parse_extensions(mut data: &[u8], fields: &mut TlsFields) {
    while data.len() >= 4 {
        let ext_type = u16::from_be_bytes([data[0], data[1]]);
        let ext_len = u16::from_be_bytes([data[2], data[3]]) as usize;
        if data.len() < 4 + ext_len {
            return;
        }
        let ext_body = &data[4..4 + ext_len];
        match ext_type {
            EXT_SERVER_NAME => {
                if fields.sni.is_none() {
                    fields.sni = parse_sni(ext_body);
                }
            }
            EXT_ALPN => {
                if fields.alpn.is_none() {
                    fields.alpn = parse_alpn(ext_body);
                }
            }
            _ => {}
        }
        data = &data[4 + ext_len..];
    }
}

/// `server_name` extension body; only `name_type == 0` (host_name) is
/// accepted, and the first such name wins.
fn parse_sni(data: &[u8]) -> Option<String> {
    if data.len() < 2 {
        return None;
    }
    let list_len = u16::from_be_bytes([data[0], data[1]]) as usize;
    if data.len() < 2 + list_len {
        return None;
    }
    let mut rest = &data[2..2 + list_len];
    while rest.len() >= 3 {
        let name_type = rest[0];
        let name_len = u16::from_be_bytes([rest[1], rest[2]]) as usize;
        if rest.len() < 3 + name_len {
            return None;
        }
        if name_type == 0 {
            return std::str::from_utf8(&rest[3..3 + name_len])
                .ok()
                .map(str::to_string);
        }
        rest = &rest[3 + name_len..];
    }
    None
}

/// `application_layer_protocol_negotiation` extension body; the first
/// protocol in the list wins.
fn parse_alpn(data: &[u8]) -> Option<String> {
    if data.len() < 2 {
        return None;
    }
    let list_len = u16::from_be_bytes([data[0], data[1]]) as usize;
    if list_len == 0 || data.len() < 2 + list_len {
        return None;
    }
    let rest = &data[2..2 + list_len];
    if rest.is_empty() {
        return None;
    }
    let proto_len = rest[0] as usize;
    if rest.len() < 1 + proto_len {
        return None;
    }
    std::str::from_utf8(&rest[1..1 + proto_len])
        .ok()
        .map(str::to_string)
}
