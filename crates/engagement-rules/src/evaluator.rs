//! Condition evaluator for engagement rules
//!
//! Pure functions over a condition and an event. String comparisons are
//! case-insensitive; a condition that cannot be applied to the event's field
//! type yields an [`EvaluationError`] which callers treat as a non-match.

use crate::error::EvaluationError;
use crate::model::{Condition, ConditionField, ConditionValue, Event, Operator, Rule};
use chrono::{NaiveTime, Timelike};
use std::borrow::Cow;
use std::cmp::Ordering;

/// An event attribute projected to the type its field is compared as
#[derive(Debug, Clone, PartialEq)]
enum FieldValue<'a> {
    Text(Cow<'a, str>),
    Number(f64),
    Bool(bool),
    Time(NaiveTime),
}

impl FieldValue<'_> {
    /// String form used by `contains` / `not_contains`
    fn as_text(&self) -> Cow<'_, str> {
        match self {
            FieldValue::Text(s) => Cow::Borrowed(s.as_ref()),
            FieldValue::Number(n) => Cow::Owned(n.to_string()),
            FieldValue::Bool(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
            FieldValue::Time(t) => Cow::Owned(t.format("%H:%M").to_string()),
        }
    }
}

fn project(field: ConditionField, event: &Event) -> FieldValue<'_> {
    match field {
        ConditionField::ContentText => FieldValue::Text(Cow::Borrowed(&event.text)),
        ConditionField::Username => FieldValue::Text(Cow::Borrowed(&event.author_username)),
        ConditionField::Sentiment => FieldValue::Text(Cow::Borrowed(event.sentiment.as_str())),
        ConditionField::FollowerCount => FieldValue::Number(event.author_follower_count as f64),
        ConditionField::CommentLength => FieldValue::Number(event.text.chars().count() as f64),
        ConditionField::IsFollowing => FieldValue::Bool(event.is_following_us),
        ConditionField::HasCommentedBefore => FieldValue::Bool(event.has_commented_before),
        ConditionField::TimeOfDay => {
            let local = event.timestamp.time();
            // Seconds are dropped so "equals 14:30" holds for the whole minute
            FieldValue::Time(NaiveTime::from_hms_opt(local.hour(), local.minute(), 0).unwrap_or(local))
        }
    }
}

/// Evaluate a single condition against an event
pub fn evaluate(condition: &Condition, event: &Event) -> Result<bool, EvaluationError> {
    let field = condition.field;
    let operator = condition.operator;
    let actual = project(field, event);

    if !operator.takes_value() {
        let FieldValue::Bool(flag) = actual else {
            return Err(EvaluationError::UnsupportedOperator { field, operator });
        };
        return Ok(if operator == Operator::IsTrue { flag } else { !flag });
    }

    let expected = condition
        .value
        .as_ref()
        .ok_or(EvaluationError::MissingValue { field, operator })?;

    match operator {
        Operator::Contains | Operator::NotContains => {
            let haystack = actual.as_text().to_lowercase();
            let needle = expected.to_string().to_lowercase();
            let found = haystack.contains(&needle);
            Ok(if operator == Operator::Contains { found } else { !found })
        }
        Operator::Equals | Operator::NotEquals => {
            let equal = equals(field, &actual, expected)?;
            Ok(if operator == Operator::Equals { equal } else { !equal })
        }
        Operator::GreaterThan | Operator::LessThan => {
            let ordering = compare(field, operator, &actual, expected)?;
            Ok(match operator {
                Operator::GreaterThan => ordering == Ordering::Greater,
                _ => ordering == Ordering::Less,
            })
        }
        Operator::IsTrue | Operator::IsFalse => unreachable!("handled above"),
    }
}

/// Evaluate a condition, logging and treating evaluation errors as a non-match
pub fn matches(condition: &Condition, event: &Event) -> bool {
    match evaluate(condition, event) {
        Ok(matched) => matched,
        Err(e) => {
            tracing::warn!("Condition on event {} treated as non-match: {}", event.id, e);
            false
        }
    }
}

/// Evaluate all of a rule's conditions in declared order (AND semantics).
///
/// A rule without conditions never matches. Stops at the first condition that
/// does not hold or cannot be evaluated.
pub fn evaluate_all(rule: &Rule, event: &Event) -> Result<bool, EvaluationError> {
    if rule.conditions.is_empty() {
        return Ok(false);
    }
    for condition in &rule.conditions {
        if !evaluate(condition, event)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Like [`evaluate_all`], with evaluation errors logged and treated as a non-match
pub fn matches_all(rule: &Rule, event: &Event) -> bool {
    match evaluate_all(rule, event) {
        Ok(matched) => matched,
        Err(e) => {
            tracing::warn!(
                "Rule '{}' skipped for event {}: {}",
                rule.name,
                event.id,
                e
            );
            false
        }
    }
}

fn equals(
    field: ConditionField,
    actual: &FieldValue<'_>,
    expected: &ConditionValue,
) -> Result<bool, EvaluationError> {
    match actual {
        FieldValue::Text(s) => Ok(s.to_lowercase() == expected.to_string().to_lowercase()),
        FieldValue::Number(n) => Ok(*n == parse_number(field, expected)?),
        FieldValue::Bool(b) => Ok(*b == parse_bool(field, expected)?),
        FieldValue::Time(t) => Ok(*t == parse_time(field, expected)?),
    }
}

fn compare(
    field: ConditionField,
    operator: Operator,
    actual: &FieldValue<'_>,
    expected: &ConditionValue,
) -> Result<Ordering, EvaluationError> {
    match actual {
        FieldValue::Number(n) => {
            let expected_n = parse_number(field, expected)?;
            n.partial_cmp(&expected_n)
                .ok_or_else(|| EvaluationError::InvalidValue {
                    field,
                    value: expected.to_string(),
                })
        }
        FieldValue::Time(t) => Ok(t.cmp(&parse_time(field, expected)?)),
        FieldValue::Text(_) | FieldValue::Bool(_) => {
            Err(EvaluationError::UnsupportedOperator { field, operator })
        }
    }
}

fn parse_number(field: ConditionField, value: &ConditionValue) -> Result<f64, EvaluationError> {
    let parsed = match value {
        ConditionValue::Number(n) => Some(*n),
        ConditionValue::Text(s) => s.trim().parse::<f64>().ok(),
    };
    parsed
        .filter(|n| n.is_finite())
        .ok_or_else(|| EvaluationError::InvalidValue {
            field,
            value: value.to_string(),
        })
}

fn parse_bool(field: ConditionField, value: &ConditionValue) -> Result<bool, EvaluationError> {
    match value {
        ConditionValue::Text(s) if s.trim().eq_ignore_ascii_case("true") => Ok(true),
        ConditionValue::Text(s) if s.trim().eq_ignore_ascii_case("false") => Ok(false),
        _ => Err(EvaluationError::InvalidValue {
            field,
            value: value.to_string(),
        }),
    }
}

/// Parse a time in HH:MM format, or a bare hour of the day
fn parse_time(field: ConditionField, value: &ConditionValue) -> Result<NaiveTime, EvaluationError> {
    let parsed = match value {
        ConditionValue::Text(s) => {
            let s = s.trim();
            NaiveTime::parse_from_str(s, "%H:%M")
                .ok()
                .or_else(|| s.parse::<u32>().ok().and_then(|h| NaiveTime::from_hms_opt(h, 0, 0)))
        }
        ConditionValue::Number(n) if n.fract() == 0.0 && *n >= 0.0 => {
            NaiveTime::from_hms_opt(*n as u32, 0, 0)
        }
        ConditionValue::Number(_) => None,
    };
    parsed.ok_or_else(|| EvaluationError::InvalidValue {
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, ActionType, RuleDraft, Sentiment};
    use crate::test_support::{at, comment};

    fn cond(field: ConditionField, operator: Operator, value: &str) -> Condition {
        Condition::new(field, operator, value)
    }

    #[test]
    fn test_contains_is_case_insensitive() {
        let event = comment("Is this still AVAILABLE?");
        let c = cond(ConditionField::ContentText, Operator::Contains, "available");
        assert!(evaluate(&c, &event).unwrap());

        let c = cond(ConditionField::ContentText, Operator::NotContains, "Available");
        assert!(!evaluate(&c, &event).unwrap());
    }

    #[test]
    fn test_username_equals() {
        let event = comment("hi");
        let c = cond(ConditionField::Username, Operator::Equals, "sarah_johnson");
        assert!(evaluate(&c, &event).unwrap());

        let c = cond(ConditionField::Username, Operator::NotEquals, "sarah_johnson");
        assert!(!evaluate(&c, &event).unwrap());
    }

    #[test]
    fn test_sentiment_equals() {
        let mut event = comment("This is terrible");
        event.sentiment = Sentiment::Negative;
        let c = cond(ConditionField::Sentiment, Operator::Equals, "Negative");
        assert!(evaluate(&c, &event).unwrap());
    }

    #[test]
    fn test_follower_count_comparisons() {
        let event = comment("hi");
        let gt = cond(ConditionField::FollowerCount, Operator::GreaterThan, "1000");
        assert!(!evaluate(&gt, &event).unwrap());

        let lt = Condition::new(ConditionField::FollowerCount, Operator::LessThan, 1000.0);
        assert!(evaluate(&lt, &event).unwrap());

        let eq = cond(ConditionField::FollowerCount, Operator::Equals, " 500 ");
        assert!(evaluate(&eq, &event).unwrap());
    }

    #[test]
    fn test_comment_length_counts_characters() {
        let event = comment("héllo");
        let c = Condition::new(ConditionField::CommentLength, Operator::Equals, 5.0);
        assert!(evaluate(&c, &event).unwrap());
    }

    #[test]
    fn test_contains_on_number_uses_string_form() {
        let event = comment("hi");
        let c = cond(ConditionField::FollowerCount, Operator::Contains, "50");
        assert!(evaluate(&c, &event).unwrap());
    }

    #[test]
    fn test_boolean_operators() {
        let event = comment("hi");
        let following = Condition::flag(ConditionField::IsFollowing, Operator::IsTrue);
        assert!(evaluate(&following, &event).unwrap());

        let returning = Condition::flag(ConditionField::HasCommentedBefore, Operator::IsFalse);
        assert!(evaluate(&returning, &event).unwrap());

        let eq = cond(ConditionField::IsFollowing, Operator::Equals, "TRUE");
        assert!(evaluate(&eq, &event).unwrap());
    }

    #[test]
    fn test_time_of_day_uses_event_local_clock() {
        let mut event = comment("hi");
        event.timestamp = at("2024-05-15T22:15:42+02:00");

        let after = cond(ConditionField::TimeOfDay, Operator::GreaterThan, "18:00");
        assert!(evaluate(&after, &event).unwrap());

        let before = Condition::new(ConditionField::TimeOfDay, Operator::LessThan, 23.0);
        assert!(evaluate(&before, &event).unwrap());

        let exact = cond(ConditionField::TimeOfDay, Operator::Equals, "22:15");
        assert!(evaluate(&exact, &event).unwrap());
    }

    #[test]
    fn test_type_mismatches() {
        let event = comment("hi");

        let text_gt = cond(ConditionField::ContentText, Operator::GreaterThan, "5");
        assert_eq!(
            evaluate(&text_gt, &event),
            Err(EvaluationError::UnsupportedOperator {
                field: ConditionField::ContentText,
                operator: Operator::GreaterThan,
            })
        );

        let text_true = Condition::flag(ConditionField::Username, Operator::IsTrue);
        assert!(evaluate(&text_true, &event).is_err());

        let bad_number = cond(ConditionField::FollowerCount, Operator::GreaterThan, "lots");
        assert!(matches!(
            evaluate(&bad_number, &event),
            Err(EvaluationError::InvalidValue { .. })
        ));

        let bad_time = cond(ConditionField::TimeOfDay, Operator::LessThan, "noon");
        assert!(evaluate(&bad_time, &event).is_err());

        let missing = Condition::flag(ConditionField::FollowerCount, Operator::Equals);
        assert!(matches!(
            evaluate(&missing, &event),
            Err(EvaluationError::MissingValue { .. })
        ));

        // Reported errors never surface through the boolean helpers
        assert!(!matches(&bad_number, &event));
    }

    #[test]
    fn test_matches_all_requires_conditions() {
        let rule = crate::model::Rule::from_draft(
            RuleDraft::new("Empty", Action::new(ActionType::Like)),
            0,
        );
        assert!(!matches_all(&rule, &comment("anything")));
        assert_eq!(evaluate_all(&rule, &comment("")), Ok(false));
    }

    #[test]
    fn test_matches_all_is_conjunction() {
        let draft = RuleDraft::new("Both", Action::new(ActionType::Like))
            .with_condition(cond(ConditionField::ContentText, Operator::Contains, "love"))
            .with_condition(Condition::flag(ConditionField::IsFollowing, Operator::IsTrue));
        let rule = crate::model::Rule::from_draft(draft, 0);

        assert!(matches_all(&rule, &comment("I love this")));
        assert!(!matches_all(&rule, &comment("I like this")));

        let mut stranger = comment("I love this");
        stranger.is_following_us = false;
        assert!(!matches_all(&rule, &stranger));
    }

    #[test]
    fn test_evaluate_all_short_circuits_before_bad_condition() {
        let draft = RuleDraft::new("Short circuit", Action::new(ActionType::Like))
            .with_condition(cond(ConditionField::ContentText, Operator::Contains, "nope"))
            .with_condition(cond(ConditionField::ContentText, Operator::LessThan, "3"));
        let rule = crate::model::Rule::from_draft(draft, 0);

        assert_eq!(evaluate_all(&rule, &comment("hello")), Ok(false));
    }
}
