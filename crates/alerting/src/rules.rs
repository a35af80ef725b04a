//! Rule Selection

use crate::event::NormalizedEvent;
use crate::model::AlertRule;

impl AlertRule {
    /// Every matcher is satisfied; a field the event lacks never matches
    pub fn matches(&self, event: &NormalizedEvent) -> bool {
        self.matchers.iter().all(|(field, matcher)| {
            event
                .field(field)
                .is_some_and(|actual| matcher.accepts(&actual))
        })
    }
}

/// First enabled rule for the event's source that matches, in ascending id order
pub fn select_rule<'a>(rules: &'a [AlertRule], event: &NormalizedEvent) -> Option<&'a AlertRule> {
    rules
        .iter()
        .filter(|rule| rule.is_enabled && rule.source == event.source && rule.matches(event))
        .min_by_key(|rule| rule.id)
}
