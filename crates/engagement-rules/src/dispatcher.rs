//! Action dispatcher for matched rules
//!
//! Turns a matched rule and its triggering event into a [`DispatchCommand`].
//! Performing the command (the platform API call) is left to the executor
//! that consumes it.

use crate::error::DispatchError;
use crate::model::{ActionType, Event, Rule, Schedule};
use crate::schedule::{self, BusinessHours, Timing};
use serde::{Deserialize, Serialize};

/// Effect requested from the action executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CommandAction {
    /// Reply using a message template; resolving the text is the executor's job
    Reply {
        #[serde(rename = "templateId")]
        template_id: String,
    },
    /// Queue the interaction for human review
    Flag,
    Like,
    Hide,
    Block,
    Tag {
        tag: String,
    },
    Assign {
        #[serde(rename = "assigneeId")]
        assignee_id: String,
    },
}

/// Description of one downstream effect produced by a matched rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchCommand {
    /// Rule that produced the command
    pub rule_id: String,
    pub rule_name: String,
    #[serde(flatten)]
    pub action: CommandAction,
    pub timing: Timing,
    /// Interaction the action applies to
    pub target_event: Event,
}

/// Builds dispatch commands for matched rules
#[derive(Debug, Clone, Default)]
pub struct ActionDispatcher {
    business_hours: BusinessHours,
}

impl ActionDispatcher {
    /// Create a dispatcher using the given business-hours window
    pub fn new(business_hours: BusinessHours) -> Self {
        Self { business_hours }
    }

    pub fn business_hours(&self) -> &BusinessHours {
        &self.business_hours
    }

    /// Build the command for a rule that matched `event`
    pub fn dispatch(&self, rule: &Rule, event: &Event) -> Result<DispatchCommand, DispatchError> {
        let action = command_action(rule)?;

        let timing = if action == CommandAction::Flag {
            // Flags always go straight to the review queue
            if rule.schedule.is_some_and(|s| s != Schedule::Instant) {
                tracing::debug!("Ignoring schedule of flag rule '{}'", rule.name);
            }
            Timing::Immediate
        } else {
            schedule::resolve(
                rule.schedule,
                event.timestamp,
                rule.utc_offset_minutes,
                &self.business_hours,
            )?
        };

        tracing::debug!(
            "Rule '{}' dispatching {:?} for event {} ({:?})",
            rule.name,
            action,
            event.id,
            timing
        );

        Ok(DispatchCommand {
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            action,
            timing,
            target_event: event.clone(),
        })
    }
}

fn command_action(rule: &Rule) -> Result<CommandAction, DispatchError> {
    let action_type = rule.action.action_type;
    let value = || {
        rule.action
            .value
            .clone()
            .filter(|v| !v.trim().is_empty())
            .ok_or(DispatchError::MissingActionValue(action_type))
    };

    Ok(match action_type {
        ActionType::Reply => CommandAction::Reply {
            template_id: value()?,
        },
        ActionType::Flag => CommandAction::Flag,
        ActionType::Like => CommandAction::Like,
        ActionType::Hide => CommandAction::Hide,
        ActionType::Block => CommandAction::Block,
        ActionType::Tag => CommandAction::Tag { tag: value()? },
        ActionType::Assign => CommandAction::Assign {
            assignee_id: value()?,
        },
    })
}
