//! Rule evaluation: builds a snapshot per flow, matches rules in
//! deterministic order, and renders [`Finding`]s .

use serde::Serialize;

use crate::conntrack::{FlowAgg, FlowKey};
use crate::error::CoreError;

use super::metrics::{self, MetricSnapshot};
use super::rule::{IssueType, Rule};
use super::template;

#[derive(Debug, Clone, Serialize)]
pub struct Evidence {
    pub flow_key: FlowKey,
    /// Inclusive `[start, end]` 1-based packet range within the flow.
    pub packet_range: (u32, u32),
    pub metrics: MetricSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub rule_id: String,
    pub issue_type: String,
    pub severity: i64,
    pub title: String,
    pub summary: String,
    pub flow_key: FlowKey,
    pub evidence: Vec<Evidence>,
}

/// A rule whose template failed to render; reported as a warning, not a
/// fatal pass error (`TemplateError`).
#[derive(Debug, Clone)]
pub struct RuleWarning {
    pub rule_id: String,
    pub reason: String,
}

/// A loaded, sorted rule set ("parsed once per process, sorted
/// by id").
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Builds a rule set from already-parsed rules, sorting by id for
    /// deterministic evaluation order.
    pub fn new(mut rules: Vec<Rule>) -> Self {
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        RuleSet { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

/// Evaluates every rule against every flow.
///
/// Flows are iterated in the order given; callers must pre-sort by
/// `{protocol, src_ip, dst_ip, src_port, dst_port}` before
/// calling this — the engine itself is agnostic to flow ordering, it only
/// guarantees rules are applied in sorted-id order per flow.
pub fn evaluate(flows: &[FlowAgg], rules: &RuleSet) -> (Vec<Finding>, Vec<RuleWarning>) {
    let mut findings = Vec::new();
    let mut warnings = Vec::new();
    for flow in flows {
        let snapshot = metrics::snapshot(flow);
        for rule in rules.rules() {
            if !rule.conditions.evaluate(&snapshot) {
                continue;
            }
            let severity = rule.severity.evaluate(&snapshot);
            let summary = match template::render(&rule.id, &rule.summary, &snapshot) {
                Ok(s) => s,
                Err(CoreError::TemplateError { rule_id, reason }) => {
                    warnings.push(RuleWarning { rule_id, reason });
                    continue;
                }
                Err(_) => unreachable!("template::render only returns TemplateError"),
            };
            let packet_range = evidence_range(flow, &rule.issue_type);
            findings.push(Finding {
                rule_id: rule.id.clone(),
                issue_type: format!("{:?}", rule.issue_type),
                severity,
                title: rule.title.clone(),
                summary,
                flow_key: flow.key,
                evidence: vec![Evidence {
                    flow_key: flow.key,
                    packet_range,
                    metrics: snapshot.clone(),
                }],
            });
        }
    }
    (findings, warnings)
}

/// Computes the evidence packet range for one matched rule .
fn evidence_range(flow: &FlowAgg, issue_type: &IssueType) -> (u32, u32) {
    if flow.evidence_overflow {
        return range_or_whole(flow, &[]);
    }
    let indexes: Vec<u32> = match issue_type {
        IssueType::Retransmission => flow
            .syn_indexes
            .iter()
            .chain(flow.retransmit_indexes.iter())
            .chain(flow.dup_ack_indexes.iter())
            .copied()
            .collect(),
        IssueType::TlsHandshakeFailure => flow
            .client_hello_indexes
            .iter()
            .chain(flow.alert_indexes.iter())
            .copied()
            .collect(),
        IssueType::Latency | IssueType::Other => Vec::new(),
    };
    range_or_whole(flow, &indexes)
}

fn range_or_whole(flow: &FlowAgg, indexes: &[u32]) -> (u32, u32) {
    if let (Some(min), Some(max)) = (indexes.iter().min(), indexes.iter().max()) {
        (*min, *max)
    } else if flow.packet_count > 0 {
        (1, flow.packet_count as u32)
    } else {
        (0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conntrack::FlowKey;
    use crate::protocols::packet::TransportProtocol;
    use crate::triage::rule::{ComparisonOp, ConditionGroup, RuleValue, SeverityRule};
    use std::net::{IpAddr, Ipv4Addr};

    fn base_flow() -> FlowAgg {
        FlowAgg {
            key: FlowKey {
                protocol: TransportProtocol::Tcp,
                src_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
                dst_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
                src_port: 1234,
                dst_port: 443,
            },
            stream_id: Some(0),
            first_seen_micros: 0,
            last_seen_micros: 1_000_000,
            packet_count: 100,
            bytes_sent: 0,
            bytes_recv: 0,
            bytes_client_to_server: 0,
            bytes_server_to_client: 0,
            client_is_forward: true,
            syn_retransmits: 0,
            retransmits: 55,
            retrans_size_count: Default::default(),
            out_of_order: 0,
            dup_acks: 0,
            rst_count: 0,
            fragment_count: 0,
            mss: None,
            sni: None,
            tls_version: None,
            alpn: None,
            tls_client_hello_seen: false,
            tls_server_hello_seen: false,
            tls_alert_seen: false,
            tls_alert_code: None,
            handshake_failure_candidate: false,
            http_method: None,
            http_host: None,
            syn_time_micros: None,
            syn_ack_time_micros: None,
            ack_time_micros: None,
            rtt_ms: None,
            app_bytes: 0,
            evidence_overflow: false,
            syn_indexes: vec![1],
            retransmit_indexes: vec![20, 40],
            dup_ack_indexes: vec![],
            client_hello_indexes: vec![],
            alert_indexes: vec![],
            rst_indexes: vec![],
        }
    }

    fn retransmission_threshold_rule() -> Rule {
        Rule {
            id: "retransmission-threshold".into(),
            issue_type: IssueType::Retransmission,
            title: "Excessive retransmissions".into(),
            summary: "{{.tcp_retransmissions}} retransmissions observed".into(),
            conditions: ConditionGroup::Leaf {
                metric: "tcp_retransmissions".into(),
                op: ComparisonOp::Gt,
                value: RuleValue::Int(50),
            },
            severity: SeverityRule { base: 3, steps: vec![] },
        }
    }

    #[test]
    fn retransmission_threshold_matches_and_interpolates() {
        let flows = vec![base_flow()];
        let rules = RuleSet::new(vec![retransmission_threshold_rule()]);
        let (findings, warnings) = evaluate(&flows, &rules);
        assert!(warnings.is_empty());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].summary, "55 retransmissions observed");
        assert!(findings[0].severity >= 3);
        assert_eq!(findings[0].evidence[0].packet_range, (1, 40));
    }

    #[test]
    fn no_match_produces_no_finding() {
        let mut flow = base_flow();
        flow.retransmits = 0;
        let rules = RuleSet::new(vec![retransmission_threshold_rule()]);
        let (findings, _) = evaluate(&[flow], &rules);
        assert!(findings.is_empty());
    }

    #[test]
    fn tls_handshake_failure_evidence_spans_hello_to_alert() {
        let mut flow = base_flow();
        flow.retransmits = 0;
        flow.retransmit_indexes = vec![];
        flow.syn_indexes = vec![];
        flow.tls_client_hello_seen = true;
        flow.tls_alert_seen = true;
        flow.client_hello_indexes = vec![2];
        flow.alert_indexes = vec![9];
        let rule = Rule {
            id: "tls-handshake-failure".into(),
            issue_type: IssueType::TlsHandshakeFailure,
            title: "TLS handshake failed".into(),
            summary: "handshake failed".into(),
            conditions: ConditionGroup::Leaf {
                metric: "tls_client_hello_seen".into(),
                op: ComparisonOp::Eq,
                value: RuleValue::Bool(true),
            },
            severity: SeverityRule { base: 4, steps: vec![] },
        };
        let rules = RuleSet::new(vec![rule]);
        let (findings, _) = evaluate(&[flow], &rules);
        assert_eq!(findings[0].evidence[0].packet_range, (2, 9));
    }
}
