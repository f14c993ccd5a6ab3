//! Alert Template Renderer
//!
//! Renders alarm subject and body templates with minijinja. Output is always
//! HTML-escaped since bodies end up in email.

use crate::RuleError;
use minijinja::value::ValueKind;
use minijinja::{
    escape_formatter, AutoEscape, Environment, Error, Output, State, Value as TemplateValue,
};
use models::{Device, Point, PointValue, Rule};
use serde_json::{json, Value};
use tracing::warn;

/// Renders alarm templates against point, rule and device context
pub struct TemplateRenderer {
    env: Environment<'static>,
}

impl TemplateRenderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::Html);
        env.set_formatter(format_value);

        Self { env }
    }

    /// Render `template` with `point`, `rule`, `device`, `pointTS` and
    /// `pointVal` in scope. Byte values render as a debug-formatted sequence.
    pub fn render(
        &self,
        point: &Point,
        rule: &Rule,
        device: &Device,
        template: &str,
    ) -> Result<String, RuleError> {
        let mut context = json!({
            "point": point,
            "rule": rule,
            "device": device,
            "pointTS": point.ts.timestamp(),
        });
        if let Some(value) = point_val(point.value.as_ref()) {
            context["pointVal"] = value;
        }

        self.env.render_str(template, context).map_err(|e| {
            warn!(template, error = %e, "Failed to render template");
            RuleError::Template(e)
        })
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Booleans print as `true`/`false`; everything else goes through the
/// escaping formatter.
fn format_value(out: &mut Output, state: &State, value: &TemplateValue) -> Result<(), Error> {
    if value.kind() == ValueKind::Bool {
        let literal = if value.is_true() { "true" } else { "false" };
        return out.write_str(literal).map_err(Error::from);
    }
    escape_formatter(out, state, value)
}

fn point_val(value: Option<&PointValue>) -> Option<Value> {
    match value? {
        PointValue::Int(v) => Some(json!(v)),
        PointValue::Float(v) => Some(json!(v)),
        PointValue::Str(v) => Some(json!(v)),
        PointValue::Bool(v) => Some(json!(v)),
        PointValue::Bytes(v) => Some(json!(format!("{:?}", v))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn context(value: Option<PointValue>) -> (Point, Rule, Device) {
        let point = Point {
            uniq_id: "dev-uniq".to_string(),
            attr: "temp".to_string(),
            value,
            ts: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            trace_id: "trace".to_string(),
        };
        let rule = Rule {
            id: "rule-1".to_string(),
            name: "Too hot".to_string(),
            attr: "temp".to_string(),
            expr: "pointVal > 32".to_string(),
        };
        let device = Device {
            id: "dev-1".to_string(),
            org_id: "org-1".to_string(),
            uniq_id: "dev-uniq".to_string(),
            name: "boiler".to_string(),
        };
        (point, rule, device)
    }

    fn render(value: Option<PointValue>, template: &str) -> Result<String, RuleError> {
        let (point, rule, device) = context(value);
        TemplateRenderer::new().render(&point, &rule, &device, template)
    }

    #[test]
    fn test_point_val_matrix() {
        let tmpl = "val: {{ pointVal }}";

        assert_eq!(render(Some(PointValue::Int(40)), tmpl).unwrap(), "val: 40");
        assert_eq!(render(Some(PointValue::Float(37.5)), tmpl).unwrap(), "val: 37.5");
        assert_eq!(
            render(Some(PointValue::Str("line".to_string())), tmpl).unwrap(),
            "val: line"
        );
        assert_eq!(render(Some(PointValue::Bool(true)), tmpl).unwrap(), "val: true");
        assert_eq!(
            render(Some(PointValue::Bytes(vec![0x00, 0x01, 0x02])), tmpl).unwrap(),
            "val: [0, 1, 2]"
        );
    }

    #[test]
    fn test_bool_point_val_stays_boolean() {
        let tmpl = "{% if pointVal %}on{% else %}off{% endif %} {{ pointVal }}";

        assert_eq!(render(Some(PointValue::Bool(true)), tmpl).unwrap(), "on true");
        assert_eq!(render(Some(PointValue::Bool(false)), tmpl).unwrap(), "off false");
    }

    #[test]
    fn test_rule_and_device_context() {
        let out = render(
            Some(PointValue::Int(40)),
            "{{ device.name }} ({{ point.uniqId }}): {{ rule.name }} at {{ pointTS }}",
        )
        .unwrap();

        assert_eq!(out, "boiler (dev-uniq): Too hot at 1700000000");
    }

    #[test]
    fn test_control_flow() {
        let tmpl = "{% if pointVal > 32 %}hot{% else %}ok{% endif %}";

        assert_eq!(render(Some(PointValue::Int(40)), tmpl).unwrap(), "hot");
        assert_eq!(render(Some(PointValue::Int(20)), tmpl).unwrap(), "ok");
    }

    #[test]
    fn test_html_escaped() {
        let out = render(Some(PointValue::Str("<b>".to_string())), "{{ pointVal }}").unwrap();
        assert_eq!(out, "&lt;b&gt;");
    }

    #[test]
    fn test_unclosed_control_fails() {
        assert!(matches!(
            render(Some(PointValue::Int(40)), "{{if"),
            Err(RuleError::Template(_))
        ));
        assert!(matches!(
            render(Some(PointValue::Int(40)), "{% if pointVal > 1 %}open"),
            Err(RuleError::Template(_))
        ));
    }

    #[test]
    fn test_undefined_sub_template_fails() {
        let result = render(Some(PointValue::Int(40)), r#"{% include "missing" %}"#);
        assert!(matches!(result, Err(RuleError::Template(_))));
    }

    #[test]
    fn test_render_is_idempotent() {
        let tmpl = "{{ device.name }} {{ pointVal }} {{ point.ts }}";
        let first = render(Some(PointValue::Float(1.25)), tmpl).unwrap();
        let second = render(Some(PointValue::Float(1.25)), tmpl).unwrap();

        assert_eq!(first, second);
    }
}
