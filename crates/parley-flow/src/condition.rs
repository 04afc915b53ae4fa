// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Condition node rules.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// Input equals the value exactly.
    Equals,
    /// Input contains the value as a substring.
    Contains,
    /// Catch-all, used only when no other rule matched.
    Default,
}

/// One branch of a condition node. The outgoing edge whose `condition`
/// equals `id` is taken when the rule is selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionRule {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: RuleKind,
    #[serde(default)]
    pub value: String,
}

impl ConditionRule {
    pub fn equals(id: impl Into<String>, value: impl Into<String>) -> Self {
        Self { id: id.into(), kind: RuleKind::Equals, value: value.into() }
    }

    pub fn contains(id: impl Into<String>, value: impl Into<String>) -> Self {
        Self { id: id.into(), kind: RuleKind::Contains, value: value.into() }
    }

    pub fn default_rule(id: impl Into<String>) -> Self {
        Self { id: id.into(), kind: RuleKind::Default, value: String::new() }
    }

    fn matches(&self, input: &str) -> bool {
        match self.kind {
            RuleKind::Equals => input == self.value,
            RuleKind::Contains => input.contains(self.value.as_str()),
            RuleKind::Default => false,
        }
    }
}

/// Selects the rule for `input`: the first matching non-default rule in list
/// order, else the first default rule, else `None`.
///
/// Input is trimmed of surrounding whitespace; comparison is case-sensitive.
pub fn select_rule<'a>(rules: &'a [ConditionRule], input: &str) -> Option<&'a ConditionRule> {
    let input = input.trim();
    rules
        .iter()
        .find(|r| r.matches(input))
        .or_else(|| rules.iter().find(|r| r.kind == RuleKind::Default))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yes_no_else() -> Vec<ConditionRule> {
        vec![
            ConditionRule::equals("A", "yes"),
            ConditionRule::contains("B", "no"),
            ConditionRule::default_rule("C"),
        ]
    }

    #[test]
    fn contains_rule_selected_for_nope() {
        let rules = yes_no_else();
        assert_eq!(select_rule(&rules, "nope").unwrap().id, "B");
    }

    #[test]
    fn equals_is_exact() {
        let rules = yes_no_else();
        assert_eq!(select_rule(&rules, "yes").unwrap().id, "A");
        assert_eq!(select_rule(&rules, "yes please").unwrap().id, "C");
        assert_eq!(select_rule(&rules, "  yes \n").unwrap().id, "A");
    }

    #[test]
    fn list_order_wins_among_matches() {
        let rules = vec![
            ConditionRule::contains("first", "a"),
            ConditionRule::contains("second", "ab"),
        ];
        assert_eq!(select_rule(&rules, "abc").unwrap().id, "first");
    }

    #[test]
    fn default_listed_first_does_not_shadow() {
        let rules = vec![
            ConditionRule::default_rule("D"),
            ConditionRule::equals("E", "ok"),
        ];
        assert_eq!(select_rule(&rules, "ok").unwrap().id, "E");
        assert_eq!(select_rule(&rules, "other").unwrap().id, "D");
    }

    #[test]
    fn no_match_without_default() {
        let rules = vec![ConditionRule::equals("A", "yes")];
        assert!(select_rule(&rules, "maybe").is_none());
    }

    #[test]
    fn rules_deserialize_from_authored_json() {
        let rules: Vec<ConditionRule> = serde_json::from_str(
            r#"[{"id":"a","type":"equals","value":"1"},{"id":"b","type":"default"}]"#,
        )
        .unwrap();
        assert_eq!(rules[1].kind, RuleKind::Default);
        assert_eq!(rules[1].value, "");
    }
}
