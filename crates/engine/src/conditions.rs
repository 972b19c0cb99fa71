//! Condition evaluation over card fields and form responses.

use std::str::FromStr;

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::ConditionError;
use crate::models::{Card, ConditionGroup, ConditionRule, Logic};

/// Comparison operators understood by rules and `card_field_value` triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    IsFilled,
    IsEmpty,
    GreaterThan,
    LessThan,
}

impl FromStr for Operator {
    type Err = ConditionError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "equals"       => Ok(Self::Equals),
            "not_equals"   => Ok(Self::NotEquals),
            "contains"     => Ok(Self::Contains),
            "is_filled"    => Ok(Self::IsFilled),
            "is_empty"     => Ok(Self::IsEmpty),
            "greater_than" => Ok(Self::GreaterThan),
            "less_than"    => Ok(Self::LessThan),
            other          => Err(ConditionError::UnknownOperator(other.to_string())),
        }
    }
}

/// Source of field values for a rule. Returns `None` for unknown keys.
pub trait FieldLookup {
    fn value(&self, key: &str) -> Option<Value>;
}

impl<F> FieldLookup for F
where
    F: Fn(&str) -> Option<Value>,
{
    fn value(&self, key: &str) -> Option<Value> {
        self(key)
    }
}

/// Looks a key up in the card's custom fields first, then in its form
/// submissions.
///
/// `form:<FormName>.<field>` addresses one form's responses explicitly; a
/// bare key falls back to the newest submission that answered it.
pub struct CardFieldLookup<'a> {
    card: &'a Card,
}

impl<'a> CardFieldLookup<'a> {
    pub fn new(card: &'a Card) -> Self {
        Self { card }
    }
}

impl FieldLookup for CardFieldLookup<'_> {
    fn value(&self, key: &str) -> Option<Value> {
        if let Some(field) = self.card.field(key) {
            return Some(field.value.clone());
        }

        if let Some((form_name, field)) = key.strip_prefix("form:").and_then(|r| r.split_once('.')) {
            return self
                .card
                .form_submissions
                .iter()
                .find(|s| s.form_name.eq_ignore_ascii_case(form_name.trim()))
                .and_then(|s| response(&s.responses, field.trim()))
                .cloned();
        }

        self.card
            .form_submissions
            .iter()
            .find_map(|s| response(&s.responses, key))
            .cloned()
    }
}

fn response<'a>(responses: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    responses.get(key).or_else(|| {
        responses
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    })
}

/// Evaluate a condition group. No group, or a group without rules, always
/// passes. A malformed rule makes the whole group fail closed.
pub fn evaluate(conditions: Option<&ConditionGroup>, lookup: &dyn FieldLookup) -> bool {
    let Some(group) = conditions else {
        return true;
    };
    match try_evaluate(group, lookup) {
        Ok(passed) => passed,
        Err(e) => {
            warn!("condition not met, malformed rule: {e}");
            false
        }
    }
}

/// Like [`evaluate`] but surfaces malformed rules.
pub fn try_evaluate(group: &ConditionGroup, lookup: &dyn FieldLookup) -> Result<bool, ConditionError> {
    if group.rules.is_empty() {
        return Ok(true);
    }
    // Every rule is checked for well-formedness, even after the outcome is known.
    let outcomes = group
        .rules
        .iter()
        .map(|rule| evaluate_rule(rule, lookup))
        .collect::<Result<Vec<bool>, _>>()?;

    Ok(match group.logic {
        Logic::And => outcomes.iter().all(|&o| o),
        Logic::Or => outcomes.iter().any(|&o| o),
    })
}

pub fn evaluate_rule(rule: &ConditionRule, lookup: &dyn FieldLookup) -> Result<bool, ConditionError> {
    if rule.field_key.trim().is_empty() {
        return Err(ConditionError::EmptyFieldKey);
    }
    let operator: Operator = rule.operator.parse()?;
    let actual = lookup.value(&rule.field_key);
    Ok(compare(operator, actual.as_ref(), &rule.value))
}

/// Apply `operator` to a (possibly missing) field value.
pub fn compare(operator: Operator, actual: Option<&Value>, expected: &Value) -> bool {
    let actual_text = actual.map(coerce).unwrap_or_default();
    let expected_text = coerce(expected);

    match operator {
        Operator::Equals => actual_text == expected_text,
        Operator::NotEquals => actual_text != expected_text,
        Operator::Contains => actual_text.contains(&expected_text),
        Operator::IsFilled => is_filled(actual),
        Operator::IsEmpty => !is_filled(actual),
        Operator::GreaterThan => actual.is_some_and(|_| order(&actual_text, &expected_text).is_gt()),
        Operator::LessThan => actual.is_some_and(|_| order(&actual_text, &expected_text).is_lt()),
    }
}

fn is_filled(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(v) => !coerce(v).trim().is_empty(),
    }
}

/// Numeric ordering when both sides parse as numbers, string ordering
/// otherwise.
fn order(actual: &str, expected: &str) -> std::cmp::Ordering {
    match (actual.trim().parse::<f64>(), expected.trim().parse::<f64>()) {
        (Ok(a), Ok(b)) => a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal),
        _ => actual.cmp(expected),
    }
}

/// String coercion used by every comparison.
pub fn coerce(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.iter().map(coerce).collect::<Vec<_>>().join(","),
        Value::Object(obj) => match obj.get("name").or_else(|| obj.get("url")) {
            Some(v) => coerce(v),
            None => value.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FormSubmission;
    use chrono::Utc;
    use serde_json::json;

    fn group(logic: Logic, rules: Vec<ConditionRule>) -> ConditionGroup {
        ConditionGroup { logic, rules }
    }

    fn no_fields(_: &str) -> Option<Value> {
        None
    }

    #[test]
    fn missing_or_empty_conditions_always_pass() {
        assert!(evaluate(None, &no_fields));
        assert!(evaluate(Some(&group(Logic::And, vec![])), &no_fields));
        assert!(evaluate(Some(&group(Logic::Or, vec![])), &no_fields));
    }

    #[test]
    fn is_filled_rejects_blank_values() {
        for blank in [Some(json!("")), Some(json!("   ")), Some(Value::Null), None] {
            assert!(!compare(Operator::IsFilled, blank.as_ref(), &Value::Null), "{blank:?}");
            assert!(compare(Operator::IsEmpty, blank.as_ref(), &Value::Null));
        }
        assert!(compare(Operator::IsFilled, Some(&json!("x")), &Value::Null));
        assert!(compare(Operator::IsFilled, Some(&json!(0)), &Value::Null));
    }

    #[test]
    fn equality_is_string_coerced() {
        assert!(compare(Operator::Equals, Some(&json!(5)), &json!("5")));
        assert!(compare(Operator::Equals, Some(&json!(true)), &json!("true")));
        assert!(compare(Operator::NotEquals, Some(&json!("pending")), &json!("approved")));
        assert!(compare(Operator::Equals, None, &json!("")));
    }

    #[test]
    fn contains_is_a_substring_test() {
        assert!(compare(Operator::Contains, Some(&json!("hello world")), &json!("lo w")));
        assert!(compare(Operator::Contains, Some(&json!(12345)), &json!(234)));
        assert!(!compare(Operator::Contains, Some(&json!("abc")), &json!("x")));
    }

    #[test]
    fn ordering_is_numeric_with_string_fallback() {
        assert!(compare(Operator::GreaterThan, Some(&json!("10")), &json!(9)));
        assert!(!compare(Operator::GreaterThan, Some(&json!("10")), &json!("9.5e1")));
        assert!(compare(Operator::LessThan, Some(&json!("apple")), &json!("banana")));
        assert!(!compare(Operator::LessThan, None, &json!(1)));
    }

    #[test]
    fn and_requires_all_or_requires_any() {
        let lookup = |key: &str| match key {
            "status" => Some(json!("pending")),
            "amount" => Some(json!(300)),
            _ => None,
        };
        let rules = vec![
            ConditionRule::new("status", "equals", "approved"),
            ConditionRule::new("amount", "greater_than", 100),
        ];
        assert!(!evaluate(Some(&group(Logic::And, rules.clone())), &lookup));
        assert!(evaluate(Some(&group(Logic::Or, rules)), &lookup));
    }

    #[test]
    fn malformed_rule_fails_closed_even_under_or() {
        let rules = vec![
            ConditionRule::new("status", "is_empty", Value::Null),
            ConditionRule::new("status", "sounds_like", "x"),
        ];
        let g = group(Logic::Or, rules);
        assert_eq!(
            try_evaluate(&g, &no_fields),
            Err(ConditionError::UnknownOperator("sounds_like".into()))
        );
        assert!(!evaluate(Some(&g), &no_fields));
    }

    #[test]
    fn card_lookup_prefers_card_fields_then_forms() {
        let mut card = Card::new("c1", "p1", "s1", "t").with_field("city", "Lisbon");
        card.form_submissions.push(FormSubmission {
            id: "sub".into(),
            card_id: "c1".into(),
            form_id: "f1".into(),
            form_name: "Intake".into(),
            responses: json!({ "city": "Porto", "Budget": "900" }).as_object().cloned().unwrap(),
            submitted_at: Utc::now(),
            submitter_email: None,
        });
        let lookup = CardFieldLookup::new(&card);

        assert_eq!(lookup.value("city"), Some(json!("Lisbon")));
        assert_eq!(lookup.value("form:intake.city"), Some(json!("Porto")));
        assert_eq!(lookup.value("budget"), Some(json!("900")));
        assert_eq!(lookup.value("form:Other.city"), None);
        assert_eq!(lookup.value("nothing"), None);
    }
}
