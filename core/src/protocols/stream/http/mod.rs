//! HTTP request-line sniffing.
//!
//! Deliberately thin compared to the teacher's `protocols::stream::http`,
//! which runs a full `httparse`-backed transaction parser over
//! reassembled, pipelining-aware streams. Spec.md §4.4 asks only for
//! request-line method detection and the `Host` header, on a single
//! packet's payload — so `httparse` is used here in probe-only mode
//! against a pending `Request`, the same way the teacher's
//! `http::parser::ConnParsable::probe` does before committing to full
//! parsing.

pub mod parser;

use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct HttpFields {
    pub method: Option<String>,
    pub host: Option<String>,
}

/// Detects an HTTP request line and `Host` header at the start of
/// `payload`. Returns `None` if `payload` doesn't begin with a recognized
/// method token.
pub fn sniff(payload: &[u8]) -> Option<HttpFields> {
    parser::sniff(payload)
}
