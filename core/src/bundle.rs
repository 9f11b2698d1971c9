//! JSON-serializable result types returned to collaborators .

use serde::Serialize;

use crate::conntrack::FlowAgg;
use crate::stats::Stats;
use crate::triage::Finding;

/// The primary output of a full analysis pass.
#[derive(Debug, Clone, Serialize)]
pub struct ResultBundle {
    pub flows: Vec<FlowAgg>,
    pub findings: Vec<Finding>,
    pub stats: Stats,
    /// Rule summary-template failures; informational, not fatal
    /// (`TemplateError`).
    pub rule_warnings: Vec<String>,
}

/// One packet surfaced by the packet-stream API (`PacketMeta`).
#[derive(Debug, Clone, Serialize)]
pub struct PacketMeta {
    pub index: u32,
    pub timestamp: String,
    pub protocol: String,
    pub src_ip: String,
    pub dst_ip: String,
    pub src_port: u16,
    pub dst_port: u16,
    pub length: u32,
    pub info: String,
    pub error_tags: Vec<String>,
    pub tcp_flags: TcpFlagsMeta,
    pub seq: u32,
    pub ack: u32,
    pub window: u16,
    pub stream_id: Option<u32>,
    pub sni: Option<String>,
    pub http_method: Option<String>,
    pub http_host: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TcpFlagsMeta {
    #[serde(rename = "SYN")]
    pub syn: bool,
    #[serde(rename = "ACK")]
    pub ack: bool,
    #[serde(rename = "FIN")]
    pub fin: bool,
    #[serde(rename = "RST")]
    pub rst: bool,
    #[serde(rename = "PSH")]
    pub psh: bool,
    #[serde(rename = "URG")]
    pub urg: bool,
}

impl From<crate::protocols::packet::TcpFlags> for TcpFlagsMeta {
    fn from(f: crate::protocols::packet::TcpFlags) -> Self {
        TcpFlagsMeta {
            syn: f.syn,
            ack: f.ack,
            fin: f.fin,
            rst: f.rst,
            psh: f.psh,
            urg: f.urg,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PacketPage {
    pub packets: Vec<PacketMeta>,
    pub total_count: u64,
}
