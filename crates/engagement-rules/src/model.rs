//! Data models for the engagement rule engine

use crate::error::RuleError;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest UTC offset west of Greenwich a rule may declare, in minutes
const MIN_UTC_OFFSET_MINUTES: i32 = -12 * 60;
/// Largest UTC offset east of Greenwich a rule may declare, in minutes
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;
/// Longest delay a rule may schedule: 30 days
const MAX_DELAY_MINUTES: u64 = 30 * 24 * 60;

/// A complete automation rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    /// Unique identifier
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
    /// Event source the rule listens to
    #[serde(default)]
    pub platform: Platform,
    /// Kind of interaction the rule listens to
    #[serde(default)]
    pub content_type: ContentType,
    /// Ordering when several rules match the same event
    #[serde(default)]
    pub priority: Priority,
    /// All must hold for the rule to match
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// What to request once the rule matches
    pub action: Action,
    /// Optional delay before the action executes
    #[serde(default)]
    pub schedule: Option<Schedule>,
    /// Inactive rules are never evaluated
    pub active: bool,
    /// Declared timezone of the rule as a fixed offset from UTC
    #[serde(default)]
    pub utc_offset_minutes: i32,
    /// Creation order, used as the tie-break after priority
    #[serde(default)]
    pub sequence: u64,
    /// Creation timestamp (ISO 8601)
    pub created_at: String,
    /// Last modification timestamp
    pub updated_at: String,
}

/// Social platform an event comes from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Matches every platform (rules only)
    #[default]
    All,
    Instagram,
    Facebook,
    Twitter,
    LinkedIn,
}

/// Kind of interaction carried by an event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// Matches every content type (rules only)
    #[default]
    All,
    Comment,
    DirectMessage,
    Mention,
}

/// Rule priority; variants are declared from highest to lowest so the
/// derived ordering sorts High first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

/// A single predicate over an incoming event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub field: ConditionField,
    pub operator: Operator,
    /// Absent for `is_true` / `is_false`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<ConditionValue>,
}

/// Event attribute a condition looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionField {
    ContentText,
    Username,
    FollowerCount,
    CommentLength,
    IsFollowing,
    HasCommentedBefore,
    Sentiment,
    TimeOfDay,
}

/// Comparison applied between the event field and the condition value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Contains,
    NotContains,
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    IsTrue,
    IsFalse,
}

impl Operator {
    /// Boolean operators test the field itself and never carry a value
    pub fn takes_value(self) -> bool {
        !matches!(self, Operator::IsTrue | Operator::IsFalse)
    }
}

/// Right-hand side of a condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Number(f64),
    Text(String),
}

impl ConditionValue {
    fn is_blank(&self) -> bool {
        match self {
            ConditionValue::Number(_) => false,
            ConditionValue::Text(s) => s.trim().is_empty(),
        }
    }
}

impl fmt::Display for ConditionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionValue::Number(n) => write!(f, "{n}"),
            ConditionValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ConditionValue {
    fn from(s: &str) -> Self {
        ConditionValue::Text(s.to_string())
    }
}

impl From<String> for ConditionValue {
    fn from(s: String) -> Self {
        ConditionValue::Text(s)
    }
}

impl From<f64> for ConditionValue {
    fn from(n: f64) -> Self {
        ConditionValue::Number(n)
    }
}

impl Condition {
    /// Condition comparing a field against a value
    pub fn new(field: ConditionField, operator: Operator, value: impl Into<ConditionValue>) -> Self {
        Self {
            field,
            operator,
            value: Some(value.into()),
        }
    }

    /// Condition testing a boolean field (`is_true` / `is_false`)
    pub fn flag(field: ConditionField, operator: Operator) -> Self {
        Self {
            field,
            operator,
            value: None,
        }
    }
}

/// Effect requested when a rule matches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    /// Template id, tag name or assignee id depending on the type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Kinds of actions a rule can request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Reply,
    Flag,
    Like,
    Hide,
    Block,
    Tag,
    Assign,
}

impl ActionType {
    /// Whether the action carries a value (template, tag or assignee)
    pub fn requires_value(self) -> bool {
        matches!(self, ActionType::Reply | ActionType::Tag | ActionType::Assign)
    }
}

impl Action {
    /// Action without a value (flag, like, hide, block)
    pub fn new(action_type: ActionType) -> Self {
        Self {
            action_type,
            value: None,
        }
    }

    /// Action carrying a template id, tag name or assignee id
    pub fn with_value(action_type: ActionType, value: impl Into<String>) -> Self {
        Self {
            action_type,
            value: Some(value.into()),
        }
    }
}

/// Delay policy applied before an action executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Schedule {
    /// Execute as soon as the event is processed
    Instant,
    /// Execute a number of minutes after the event
    DelayMinutes { minutes: u32 },
    /// Execute a number of hours after the event
    DelayHours { hours: u32 },
    /// Execute now if inside business hours, else at the next window
    BusinessHoursOnly,
}

/// Sentiment label attached to an event by the event source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    #[default]
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn as_str(self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }
}

/// An incoming social-media interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Identifier assigned by the event source
    pub id: String,
    pub platform: Platform,
    pub content_type: ContentType,
    #[serde(default)]
    pub text: String,
    pub author_username: String,
    #[serde(default)]
    pub author_follower_count: u64,
    #[serde(default)]
    pub is_following_us: bool,
    #[serde(default)]
    pub has_commented_before: bool,
    #[serde(default)]
    pub sentiment: Sentiment,
    /// Local time of the interaction, with its UTC offset
    pub timestamp: DateTime<FixedOffset>,
}

/// Request to create a rule, or to replace a rule's editable fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDraft {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub platform: Platform,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub action: Action,
    #[serde(default)]
    pub schedule: Option<Schedule>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

fn default_active() -> bool {
    true
}

impl RuleDraft {
    /// Active draft with no conditions, matching every platform and content type
    pub fn new(name: impl Into<String>, action: Action) -> Self {
        Self {
            name: name.into(),
            description: None,
            platform: Platform::All,
            content_type: ContentType::All,
            priority: Priority::Medium,
            conditions: Vec::new(),
            action,
            schedule: None,
            active: true,
            utc_offset_minutes: 0,
        }
    }

    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    #[must_use]
    pub fn with_utc_offset_minutes(mut self, minutes: i32) -> Self {
        self.utc_offset_minutes = minutes;
        self
    }

    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Check every invariant a stored rule must satisfy
    pub fn validate(&self) -> Result<(), RuleError> {
        if self.name.trim().is_empty() {
            return Err(RuleError::validation("name", "must not be empty"));
        }

        if self.conditions.is_empty() {
            return Err(RuleError::validation(
                "conditions",
                "at least one condition is required",
            ));
        }

        for (index, condition) in self.conditions.iter().enumerate() {
            let field = format!("conditions[{index}].value");
            match (&condition.value, condition.operator.takes_value()) {
                (Some(_), false) => {
                    return Err(RuleError::validation(
                        field,
                        format!("must be empty for operator {:?}", condition.operator),
                    ));
                }
                (None, true) => {
                    return Err(RuleError::validation(
                        field,
                        format!("required for operator {:?}", condition.operator),
                    ));
                }
                (Some(value), true) if value.is_blank() => {
                    return Err(RuleError::validation(
                        field,
                        format!("must not be blank for operator {:?}", condition.operator),
                    ));
                }
                _ => {}
            }
        }

        let has_value = self
            .action
            .value
            .as_deref()
            .is_some_and(|v| !v.trim().is_empty());
        match (self.action.action_type.requires_value(), has_value) {
            (true, false) => {
                return Err(RuleError::validation(
                    "action.value",
                    format!("required for action {:?}", self.action.action_type),
                ));
            }
            (false, _) if self.action.value.is_some() => {
                return Err(RuleError::validation(
                    "action.value",
                    format!("not allowed for action {:?}", self.action.action_type),
                ));
            }
            _ => {}
        }

        match self.schedule {
            Some(Schedule::DelayMinutes { minutes: 0 }) | Some(Schedule::DelayHours { hours: 0 }) => {
                return Err(RuleError::validation(
                    "schedule",
                    "delay must be greater than zero",
                ));
            }
            Some(Schedule::DelayMinutes { minutes }) if u64::from(minutes) > MAX_DELAY_MINUTES => {
                return Err(RuleError::validation(
                    "schedule",
                    format!("delay must be at most {MAX_DELAY_MINUTES} minutes"),
                ));
            }
            Some(Schedule::DelayHours { hours }) if u64::from(hours) * 60 > MAX_DELAY_MINUTES => {
                return Err(RuleError::validation(
                    "schedule",
                    format!("delay must be at most {} hours", MAX_DELAY_MINUTES / 60),
                ));
            }
            _ => {}
        }

        if !(MIN_UTC_OFFSET_MINUTES..=MAX_UTC_OFFSET_MINUTES).contains(&self.utc_offset_minutes) {
            return Err(RuleError::validation(
                "utcOffsetMinutes",
                format!(
                    "must be between {MIN_UTC_OFFSET_MINUTES} and {MAX_UTC_OFFSET_MINUTES}"
                ),
            ));
        }

        Ok(())
    }
}

/// Optional filters for listing rules
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleFilter {
    /// Keep rules that apply to this platform (including `all` rules)
    #[serde(default)]
    pub platform: Option<Platform>,
    #[serde(default)]
    pub active: Option<bool>,
}

impl RuleFilter {
    pub fn accepts(&self, rule: &Rule) -> bool {
        if let Some(platform) = self.platform {
            if rule.platform != Platform::All && rule.platform != platform {
                return false;
            }
        }
        if let Some(active) = self.active {
            if rule.active != active {
                return false;
            }
        }
        true
    }
}

/// How often a rule has fired
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleStats {
    pub trigger_count: u64,
    pub last_triggered_at: Option<String>,
}

impl Rule {
    /// Create a new rule from a validated draft
    pub fn from_draft(draft: RuleDraft, sequence: u64) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: draft.name,
            description: draft.description,
            platform: draft.platform,
            content_type: draft.content_type,
            priority: draft.priority,
            conditions: draft.conditions,
            action: draft.action,
            schedule: draft.schedule,
            active: draft.active,
            utc_offset_minutes: draft.utc_offset_minutes,
            sequence,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Replace every editable field; id, sequence and creation time stay
    pub fn apply_draft(&mut self, draft: RuleDraft) {
        self.name = draft.name;
        self.description = draft.description;
        self.platform = draft.platform;
        self.content_type = draft.content_type;
        self.priority = draft.priority;
        self.conditions = draft.conditions;
        self.action = draft.action;
        self.schedule = draft.schedule;
        self.active = draft.active;
        self.utc_offset_minutes = draft.utc_offset_minutes;
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }

    /// Editable fields of this rule as a draft
    pub fn to_draft(&self) -> RuleDraft {
        RuleDraft {
            name: self.name.clone(),
            description: self.description.clone(),
            platform: self.platform,
            content_type: self.content_type,
            priority: self.priority,
            conditions: self.conditions.clone(),
            action: self.action.clone(),
            schedule: self.schedule,
            active: self.active,
            utc_offset_minutes: self.utc_offset_minutes,
        }
    }

    /// Whether the rule listens to the event's platform and content type
    pub fn applies_to(&self, event: &Event) -> bool {
        (self.platform == Platform::All || self.platform == event.platform)
            && (self.content_type == ContentType::All || self.content_type == event.content_type)
    }

    /// Engine ordering: priority first, then creation order
    pub fn order_key(&self) -> (Priority, u64) {
        (self.priority, self.sequence)
    }
}
