//! The rule-driven triage engine .
//!
//! Rules are YAML files embedded at build time via `include_str!`, parsed
//! once into a [`RuleSet`] and sorted by id — the design trades runtime
//! reloading for determinism, the same trade the teacher's own filter
//! compiler makes by parsing its DSL once per process rather than per
//! packet.

pub mod engine;
pub mod metrics;
pub mod rule;
pub mod template;

pub use engine::{evaluate, Evidence, Finding, RuleSet, RuleWarning};
pub use metrics::{MetricSnapshot, MetricValue};
pub use rule::Rule;

const EMBEDDED_RULE_YAML: &[&str] = &[
    include_str!("rules/retransmission_threshold.yaml"),
    include_str!("rules/tls_handshake_failure.yaml"),
    include_str!("rules/high_latency.yaml"),
    include_str!("rules/dup_ack_storm.yaml"),
    include_str!("rules/syn_flood_retry.yaml"),
];

/// Parses the embedded rule set. Each entry is one YAML document
/// describing a single [`Rule`] (: "one file per rule").
pub fn load_embedded_rules() -> anyhow::Result<RuleSet> {
    let mut rules = Vec::with_capacity(EMBEDDED_RULE_YAML.len());
    for yaml in EMBEDDED_RULE_YAML {
        let rule: Rule = serde_yaml::from_str(yaml)?;
        rules.push(rule);
    }
    Ok(RuleSet::new(rules))
}

/// Parses a rule set from a directory of `*.yaml` files, overriding the
/// embedded set (`AnalysisConfig::rules_path`).
pub fn load_rules_from_dir(dir: &std::path::Path) -> anyhow::Result<RuleSet> {
    let mut rules = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
            continue;
        }
        let text = std::fs::read_to_string(&path)?;
        let rule: Rule = serde_yaml::from_str(&text)?;
        rules.push(rule);
    }
    Ok(RuleSet::new(rules))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_rules_parse_and_sort_by_id() {
        let rules = load_embedded_rules().expect("embedded rules must parse");
        let ids: Vec<&str> = rules.rules().iter().map(|r| r.id.as_str()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert!(ids.contains(&"retransmission-threshold"));
        assert!(ids.contains(&"tls-handshake-failure"));
    }
}
