//! Declarative rule types, deserialized from the embedded YAML rule set
//! ("Rule format").

use serde::Deserialize;

use super::metrics::{MetricSnapshot, MetricValue};

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueType {
    Latency,
    Retransmission,
    TlsHandshakeFailure,
    /// Extension point for rule sets this crate doesn't ship itself
    /// (: "plus extensions").
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonOp {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Neq,
}

/// A leaf condition or `all`/`any` composite (`ConditionGroup`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionGroup {
    Leaf {
        metric: String,
        op: ComparisonOp,
        value: RuleValue,
    },
    All(Vec<ConditionGroup>),
    Any(Vec<ConditionGroup>),
}

/// A literal value as written in rule YAML, before it's compared against a
/// [`MetricValue`] extracted from a flow.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RuleValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl RuleValue {
    fn as_f64(&self) -> Option<f64> {
        match self {
            RuleValue::Int(i) => Some(*i as f64),
            RuleValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl ConditionGroup {
    /// Evaluates this condition tree against `snapshot`. A leaf whose
    /// metric is absent from the snapshot evaluates to `false`.
    pub fn evaluate(&self, snapshot: &MetricSnapshot) -> bool {
        match self {
            ConditionGroup::Leaf { metric, op, value } => match snapshot.get(metric) {
                Some(actual) => evaluate_leaf(actual, *op, value),
                None => false,
            },
            ConditionGroup::All(conds) => conds.iter().all(|c| c.evaluate(snapshot)),
            ConditionGroup::Any(conds) => conds.iter().any(|c| c.evaluate(snapshot)),
        }
    }
}

fn evaluate_leaf(actual: &MetricValue, op: ComparisonOp, expected: &RuleValue) -> bool {
    if let (Some(a), Some(b)) = (actual.as_f64(), expected.as_f64()) {
        return match op {
            ComparisonOp::Gt => a > b,
            ComparisonOp::Gte => a >= b,
            ComparisonOp::Lt => a < b,
            ComparisonOp::Lte => a <= b,
            ComparisonOp::Eq => a == b,
            ComparisonOp::Neq => a != b,
        };
    }
    // Bool/string: only eq/neq are meaningful.
    let equal = match (actual, expected) {
        (MetricValue::Bool(a), RuleValue::Bool(b)) => a == b,
        (MetricValue::Str(a), RuleValue::Str(b)) => a == b,
        _ => false,
    };
    match op {
        ComparisonOp::Eq => equal,
        ComparisonOp::Neq => !equal,
        _ => false,
    }
}

/// `{base, steps[]}`: final severity = `max(base, max of every step whose
/// condition holds)`, clamped to `[1,5]` .
#[derive(Debug, Clone, Deserialize)]
pub struct SeverityRule {
    pub base: i64,
    #[serde(default)]
    pub steps: Vec<SeverityStep>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeverityStep {
    pub severity: i64,
    pub when: ConditionGroup,
}

impl SeverityRule {
    pub fn evaluate(&self, snapshot: &MetricSnapshot) -> i64 {
        let mut severity = self.base;
        for step in &self.steps {
            if step.when.evaluate(snapshot) {
                severity = severity.max(step.severity);
            }
        }
        severity.clamp(1, 5)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    pub id: String,
    pub issue_type: IssueType,
    pub title: String,
    pub summary: String,
    pub conditions: ConditionGroup,
    pub severity: SeverityRule,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_with_missing_metric_is_false() {
        let snap = MetricSnapshot::new();
        let cond = ConditionGroup::Leaf {
            metric: "tcp_retransmissions".into(),
            op: ComparisonOp::Gt,
            value: RuleValue::Int(50),
        };
        assert!(!cond.evaluate(&snap));
    }

    #[test]
    fn numeric_coercion_compares_int_and_float() {
        let mut snap = MetricSnapshot::new();
        snap.insert("tcp_retransmissions".into(), MetricValue::Int(55));
        let cond = ConditionGroup::Leaf {
            metric: "tcp_retransmissions".into(),
            op: ComparisonOp::Gte,
            value: RuleValue::Float(50.0),
        };
        assert!(cond.evaluate(&snap));
    }

    #[test]
    fn severity_clamped_and_takes_max_step() {
        let rule = SeverityRule {
            base: 1,
            steps: vec![
                SeverityStep {
                    severity: 3,
                    when: ConditionGroup::Leaf {
                        metric: "tcp_retransmissions".into(),
                        op: ComparisonOp::Gt,
                        value: RuleValue::Int(10),
                    },
                },
                SeverityStep {
                    severity: 9,
                    when: ConditionGroup::Leaf {
                        metric: "tcp_retransmissions".into(),
                        op: ComparisonOp::Gt,
                        value: RuleValue::Int(1000),
                    },
                },
            ],
        };
        let mut snap = MetricSnapshot::new();
        snap.insert("tcp_retransmissions".into(), MetricValue::Int(55));
        assert_eq!(rule.evaluate(&snap), 3);

        snap.insert("tcp_retransmissions".into(), MetricValue::Int(2000));
        assert_eq!(rule.evaluate(&snap), 5); // clamped from 9
    }
}
