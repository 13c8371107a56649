//! Core rule engine
//!
//! Runs a snapshot of rules against one event and collects the resulting
//! dispatch commands. Processing is synchronous and performs no I/O: the same
//! rules and event always produce the same commands.

use crate::dispatcher::{ActionDispatcher, DispatchCommand};
use crate::evaluator;
use crate::model::{Event, Rule};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What happens when several rules match the same event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Every matching rule fires, in priority order
    #[default]
    AllMatches,
    /// Only the highest-priority rule that dispatches successfully fires
    FirstMatchWins,
}

impl FromStr for MatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" | "all_matches" => Ok(MatchPolicy::AllMatches),
            "first" | "first_match_wins" => Ok(MatchPolicy::FirstMatchWins),
            other => Err(format!(
                "Unknown match policy '{other}', expected 'all' or 'first'"
            )),
        }
    }
}

impl fmt::Display for MatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchPolicy::AllMatches => f.write_str("all_matches"),
            MatchPolicy::FirstMatchWins => f.write_str("first_match_wins"),
        }
    }
}

/// Outcome of running one rule against one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RuleVerdict {
    /// The rule does not listen to the event's platform or content type
    NotApplicable,
    /// At least one condition does not hold
    NoMatch,
    /// All conditions hold
    Matched { command: DispatchCommand },
    /// A condition could not be evaluated or the command could not be built
    Failed { reason: String },
}

/// A rule that was skipped because of an error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleFailure {
    pub rule_id: String,
    pub rule_name: String,
    pub reason: String,
}

/// Commands produced for an event, plus the rules that failed along the way
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessReport {
    pub commands: Vec<DispatchCommand>,
    pub failures: Vec<RuleFailure>,
}

/// Matches events against rules and builds dispatch commands
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    dispatcher: ActionDispatcher,
    policy: MatchPolicy,
}

impl RuleEngine {
    /// Create a new rule engine
    pub fn new(dispatcher: ActionDispatcher, policy: MatchPolicy) -> Self {
        Self { dispatcher, policy }
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    pub fn dispatcher(&self) -> &ActionDispatcher {
        &self.dispatcher
    }

    /// Commands for every rule that fires on `event`, highest priority first
    pub fn process(&self, rules: &[Rule], event: &Event) -> Vec<DispatchCommand> {
        self.process_report(rules, event).commands
    }

    /// Like [`process`](Self::process), also reporting rules skipped because of errors.
    ///
    /// Inactive rules and rules for other platforms or content types are
    /// ignored. A failing rule never prevents the remaining rules from running.
    pub fn process_report(&self, rules: &[Rule], event: &Event) -> ProcessReport {
        let mut candidates: Vec<&Rule> = rules
            .iter()
            .filter(|rule| rule.active && rule.applies_to(event))
            .collect();
        candidates.sort_by_key(|rule| rule.order_key());

        tracing::debug!(
            "Processing event {} against {} of {} rules",
            event.id,
            candidates.len(),
            rules.len()
        );

        let mut report = ProcessReport::default();
        for rule in candidates {
            match self.evaluate_rule(rule, event) {
                RuleVerdict::Matched { command } => {
                    report.commands.push(command);
                    if self.policy == MatchPolicy::FirstMatchWins {
                        break;
                    }
                }
                RuleVerdict::Failed { reason } => {
                    tracing::warn!("Skipping rule '{}' ({}): {}", rule.name, rule.id, reason);
                    report.failures.push(RuleFailure {
                        rule_id: rule.id.clone(),
                        rule_name: rule.name.clone(),
                        reason,
                    });
                }
                RuleVerdict::NotApplicable | RuleVerdict::NoMatch => {}
            }
        }

        if !report.commands.is_empty() {
            tracing::info!(
                "Event {} triggered {} command(s)",
                event.id,
                report.commands.len()
            );
        }
        report
    }

    /// Run a single rule against an event, regardless of whether it is active
    pub fn evaluate_rule(&self, rule: &Rule, event: &Event) -> RuleVerdict {
        if !rule.applies_to(event) {
            return RuleVerdict::NotApplicable;
        }

        match evaluator::evaluate_all(rule, event) {
            Ok(false) => {
                tracing::debug!("Rule '{}' conditions not met, skipping", rule.name);
                RuleVerdict::NoMatch
            }
            Ok(true) => match self.dispatcher.dispatch(rule, event) {
                Ok(command) => RuleVerdict::Matched { command },
                Err(e) => RuleVerdict::Failed {
                    reason: e.to_string(),
                },
            },
            Err(e) => RuleVerdict::Failed {
                reason: e.to_string(),
            },
        }
    }
}
