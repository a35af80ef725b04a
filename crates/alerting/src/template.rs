//! Dedup Key Templates

use crate::event::NormalizedEvent;
use crate::model::AlertRule;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("placeholder pattern is valid")
});

/// Substitute `{{field}}` placeholders from the event.
///
/// `rule_id` resolves to the matching rule's id; a field the event does not
/// carry renders as the empty string.
pub fn render_dedupe_key(rule: &AlertRule, event: &NormalizedEvent) -> String {
    PLACEHOLDER
        .replace_all(&rule.dedupe_key_template, |caps: &Captures<'_>| match &caps[1] {
            "rule_id" => rule.id.to_string(),
            field => event.field(field).unwrap_or_default(),
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewRule;
    use crate::InboundEvent;
    use serde_json::json;

    fn event() -> NormalizedEvent {
        let inbound: InboundEvent = serde_json::from_value(json!({
            "triggerid": "42", "host": "ring-b", "status": "PROBLEM", "map_index": 3
        }))
        .unwrap();
        inbound.normalize("zabbix").unwrap()
    }

    fn rule(template: &str) -> AlertRule {
        let mut rule = NewRule::new("zabbix");
        rule.dedupe_key_template = template.into();
        rule.into_rule(7, "acme")
    }

    #[test]
    fn test_default_template() {
        let key = render_dedupe_key(&rule(crate::DEFAULT_DEDUPE_TEMPLATE), &event());
        assert_eq!(key, "zabbix:7:42");
    }

    #[test]
    fn test_pass_through_field_and_spacing() {
        let key = render_dedupe_key(&rule("map-{{ map_index }}/{{host}}"), &event());
        assert_eq!(key, "map-3/ring-b");
    }

    #[test]
    fn test_unresolved_placeholder_renders_empty() {
        let key = render_dedupe_key(&rule("{{triggerid}}:{{segment}}"), &event());
        assert_eq!(key, "42:");
    }

    #[test]
    fn test_literal_text_untouched() {
        assert_eq!(render_dedupe_key(&rule("static {x}"), &event()), "static {x}");
    }
}
