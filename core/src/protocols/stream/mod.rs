//! Stream-level (application-protocol) dissectors.
//!
//! Each dissector operates on a single packet's TCP payload in isolation —
//! there is no cross-packet reassembly buffer, matching the non-goal
//! of full payload reconstruction. A TLS record or HTTP request line split
//! across a segment boundary is simply not recognized, the same tradeoff
//! the teacher's `ProbeResult`-based dissectors make before a connection
//! has accumulated enough buffered data.

pub mod http;
pub mod tls;
