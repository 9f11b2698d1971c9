//! Offline PCAP/PCAP-NG triage: decodes a capture, reconstructs bidirectional
//! TCP/UDP conversations, extracts TLS and HTTP signals, and runs a
//! declarative rule engine over the result to produce triage findings.
//!
//! This is the core analysis pipeline described in the design notes; the HTTP
//! API, persistent storage, job queue, live TLS probe, and LLM explanation
//! cache that consume its output are external collaborators and are not part
//! of this crate.
//!
//! A typical driver looks like:
//!
//! ```no_run
//! use captriage_core::config::default_config;
//! use captriage_core::orchestrator::{self, NullProgressSink};
//! use captriage_core::triage;
//! use captriage_core::utils::CancellationToken;
//!
//! let config = default_config("capture.pcap");
//! let rules = triage::load_embedded_rules().unwrap();
//! let cancel = CancellationToken::new();
//! let bundle = orchestrator::analyze(&config, &rules, &mut NullProgressSink, &cancel).unwrap();
//! println!("{} flows, {} findings", bundle.flows.len(), bundle.findings.len());
//! ```

pub mod bundle;
pub mod config;
pub mod conntrack;
pub mod error;
pub mod orchestrator;
pub mod packetstream;
pub mod protocols;
pub mod reader;
pub mod stats;
pub mod triage;
pub mod utils;

pub use bundle::ResultBundle;
pub use conntrack::{FlowAgg, FlowKey};
pub use error::{CoreError, Result};
pub use triage::Finding;
