//! Request-line and `Host` header scanning.

use super::HttpFields;
use httparse::{Request, EMPTY_HEADER};

/// Method tokens the design enumerates exhaustively, each including the
/// trailing space so `GET` never matches `GETFOO`.
const METHODS: &[&str] = &[
    "GET ", "POST ", "PUT ", "DELETE ", "HEAD ", "OPTIONS ", "PATCH ",
];

pub(super) fn sniff(payload: &[u8]) -> Option<HttpFields> {
    // The method prefix is checked by hand, rather than left to httparse,
    // since a request line can be split across the segment boundary
    // (continuation data with no further structure still counts as a
    // detected method) and httparse requires a complete request line to
    // report one.
    let method = METHODS
        .iter()
        .find(|m| payload.starts_with(m.as_bytes()))
        .map(|m| m.trim_end().to_string())?;

    let mut headers = [EMPTY_HEADER; 32];
    let mut req = Request::new(&mut headers);
    let host = match req.parse(payload) {
        Ok(_) => req
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case("host"))
            .and_then(|h| std::str::from_utf8(h.value).ok())
            .map(|v| v.trim().to_string()),
        Err(_) => None,
    };

    Some(HttpFields { method: Some(method), host })
}
