//! Engagement rule engine
//!
//! Condition/action automation rules for incoming social-media interactions
//! (comments, direct messages, mentions). Rules are kept in a [`RuleStore`],
//! matched against events by the [`RuleEngine`] and turned into
//! [`DispatchCommand`]s for an external executor to carry out.

pub mod error;
pub mod model;
pub mod persistence;
pub mod evaluator;
pub mod schedule;
pub mod dispatcher;
pub mod store;
pub mod engine;

pub use dispatcher::{ActionDispatcher, CommandAction, DispatchCommand};
pub use engine::{MatchPolicy, ProcessReport, RuleEngine, RuleFailure, RuleVerdict};
pub use error::{DispatchError, EvaluationError, RuleError};
pub use model::*;
pub use schedule::{BusinessHours, Timing};
pub use store::{RuleEvent, RuleStore};

#[cfg(test)]
pub(crate) mod test_support;
