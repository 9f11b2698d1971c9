//! Renders a rule's `summary` template against a metric snapshot.
//!
//! Placeholders are `{{.metric_name}}`. A missing key renders as the empty
//! string; an unterminated `{{` is a [`TemplateError`].

use crate::error::CoreError;
use crate::triage::metrics::MetricSnapshot;

/// Renders `template`, substituting each `{{.name}}` with the rendered
/// form of `name`'s value in `snapshot`, or the empty string if absent.
pub fn render(rule_id: &str, template: &str, snapshot: &MetricSnapshot) -> Result<String, CoreError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    loop {
        match rest.find("{{") {
            None => {
                out.push_str(rest);
                break;
            }
            Some(start) => {
                out.push_str(&rest[..start]);
                let after_open = &rest[start + 2..];
                let end = after_open.find("}}").ok_or_else(|| CoreError::TemplateError {
                    rule_id: rule_id.to_string(),
                    reason: "unterminated {{ placeholder".to_string(),
                })?;
                let placeholder = after_open[..end].trim();
                let name = placeholder.strip_prefix('.').ok_or_else(|| CoreError::TemplateError {
                    rule_id: rule_id.to_string(),
                    reason: format!("placeholder `{placeholder}` missing leading `.`"),
                })?;
                if let Some(value) = snapshot.get(name) {
                    out.push_str(&value.render());
                }
                rest = &after_open[end + 2..];
            }
        }
    }
    Ok(out)
}
