//! Rule store
//!
//! The authoritative collection of rules. Mutations are serialized through a
//! single write lock and, when the store is backed by a data directory,
//! written to disk before the call returns. Readers never take the lock and
//! always observe whole rules.

use crate::dispatcher::DispatchCommand;
use crate::error::RuleError;
use crate::model::{Rule, RuleDraft, RuleFilter, RuleStats};
use crate::persistence;
use dashmap::DashMap;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{broadcast, Mutex};

/// Events emitted by the rule store
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum RuleEvent {
    /// A rule was created
    Created { rule_id: String },
    /// A rule was updated
    Updated { rule_id: String },
    /// A rule was deleted
    Deleted { rule_id: String },
    /// A rule was switched on or off
    ActiveChanged { rule_id: String, active: bool },
    /// A rule produced a command
    Dispatched { command: DispatchCommand },
}

/// Store of automation rules
pub struct RuleStore {
    /// All rules, keyed by id
    rules: DashMap<String, Rule>,
    /// Trigger counters, keyed by rule id
    stats: DashMap<String, RuleStats>,
    /// Sequence number handed to the next created rule
    next_sequence: AtomicU64,
    /// Serializes create / update / delete / set_active
    write_lock: Mutex<()>,
    /// Rules file, when persistence is enabled
    data_path: Option<PathBuf>,
    /// Event broadcaster
    event_tx: broadcast::Sender<RuleEvent>,
}

impl RuleStore {
    fn with_path(data_path: Option<PathBuf>) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            rules: DashMap::new(),
            stats: DashMap::new(),
            next_sequence: AtomicU64::new(0),
            write_lock: Mutex::new(()),
            data_path,
            event_tx,
        }
    }

    /// Create a store that keeps rules in memory only
    pub fn in_memory() -> Self {
        Self::with_path(None)
    }

    /// Open a store persisted as `rules.json` inside `data_dir`
    pub async fn open(data_dir: &Path) -> Self {
        let store = Self::with_path(Some(data_dir.join("rules.json")));
        if let Some(path) = &store.data_path {
            let rules = match persistence::load_rules(path).await {
                Ok(rules) => {
                    tracing::info!("Loaded {} rules from {:?}", rules.len(), path);
                    rules
                }
                Err(RuleError::Json(e)) => {
                    tracing::warn!("Rules file {:?} is not valid JSON: {}", path, e);
                    match persistence::quarantine(path).await {
                        Ok(moved) => tracing::warn!("Moved unreadable rules file to {:?}", moved),
                        Err(e) => tracing::error!("Failed to move rules file aside: {}", e),
                    }
                    Vec::new()
                }
                Err(e) => {
                    tracing::warn!("Failed to read rules file {:?}: {}", path, e);
                    Vec::new()
                }
            };
            let next = rules.iter().map(|r| r.sequence + 1).max().unwrap_or(0);
            store.next_sequence.store(next, Ordering::SeqCst);
            for rule in rules {
                store.rules.insert(rule.id.clone(), rule);
            }
        }
        store
    }

    /// Subscribe to store events
    pub fn subscribe(&self) -> broadcast::Receiver<RuleEvent> {
        self.event_tx.subscribe()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Get rule by ID
    pub fn get(&self, id: &str) -> Option<Rule> {
        self.rules.get(id).map(|r| r.value().clone())
    }

    /// Rules accepted by `filter`, highest priority first, then oldest first
    pub fn list(&self, filter: &RuleFilter) -> Vec<Rule> {
        let mut rules: Vec<Rule> = self
            .rules
            .iter()
            .filter(|r| filter.accepts(r.value()))
            .map(|r| r.value().clone())
            .collect();
        rules.sort_by_key(Rule::order_key);
        rules
    }

    /// Owned copy of the active rules for a single engine pass
    pub fn snapshot(&self) -> Vec<Rule> {
        self.list(&RuleFilter {
            active: Some(true),
            ..RuleFilter::default()
        })
    }

    /// Create a new rule
    pub async fn create(&self, draft: RuleDraft) -> Result<Rule, RuleError> {
        draft.validate()?;

        let _guard = self.write_lock.lock().await;
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let rule = Rule::from_draft(draft, sequence);

        self.rules.insert(rule.id.clone(), rule.clone());
        if let Err(e) = self.save().await {
            self.rules.remove(&rule.id);
            return Err(e);
        }

        let _ = self.event_tx.send(RuleEvent::Created {
            rule_id: rule.id.clone(),
        });

        tracing::info!("Created rule: {} ({})", rule.name, rule.id);
        Ok(rule)
    }

    /// Replace the editable fields of a rule
    pub async fn update(&self, id: &str, draft: RuleDraft) -> Result<Rule, RuleError> {
        let _guard = self.write_lock.lock().await;
        let previous = self
            .get(id)
            .ok_or_else(|| RuleError::NotFound(id.to_string()))?;
        draft.validate()?;

        let mut rule = previous.clone();
        rule.apply_draft(draft);
        self.replace(previous, rule.clone()).await?;

        let _ = self.event_tx.send(RuleEvent::Updated {
            rule_id: id.to_string(),
        });

        tracing::info!("Updated rule: {}", id);
        Ok(rule)
    }

    /// Delete a rule
    pub async fn delete(&self, id: &str) -> Result<Rule, RuleError> {
        let _guard = self.write_lock.lock().await;
        let (_, rule) = self
            .rules
            .remove(id)
            .ok_or_else(|| RuleError::NotFound(id.to_string()))?;

        if let Err(e) = self.save().await {
            self.rules.insert(rule.id.clone(), rule);
            return Err(e);
        }
        self.stats.remove(id);

        let _ = self.event_tx.send(RuleEvent::Deleted {
            rule_id: id.to_string(),
        });

        tracing::info!("Deleted rule: {} ({})", rule.name, id);
        Ok(rule)
    }

    /// Switch a rule on or off without re-validating its other fields
    pub async fn set_active(&self, id: &str, active: bool) -> Result<Rule, RuleError> {
        let _guard = self.write_lock.lock().await;
        let previous = self
            .get(id)
            .ok_or_else(|| RuleError::NotFound(id.to_string()))?;

        let mut rule = previous.clone();
        rule.active = active;
        rule.updated_at = chrono::Utc::now().to_rfc3339();
        self.replace(previous, rule.clone()).await?;

        let _ = self.event_tx.send(RuleEvent::ActiveChanged {
            rule_id: id.to_string(),
            active,
        });

        tracing::info!(
            "{} rule: {} ({})",
            if active { "Activated" } else { "Deactivated" },
            rule.name,
            id
        );
        Ok(rule)
    }

    /// Count the commands produced by each rule and announce them
    pub fn record_dispatch(&self, commands: &[DispatchCommand]) {
        let now = chrono::Utc::now().to_rfc3339();
        for command in commands {
            {
                // Holding the rule entry keeps a concurrent delete from
                // clearing stats before this update lands
                let Some(_rule) = self.rules.get(&command.rule_id) else {
                    continue;
                };
                let mut stats = self.stats.entry(command.rule_id.clone()).or_default();
                stats.trigger_count += 1;
                stats.last_triggered_at = Some(now.clone());
            }
            let _ = self.event_tx.send(RuleEvent::Dispatched {
                command: command.clone(),
            });
        }
    }

    /// Trigger counters for a rule
    pub fn stats(&self, id: &str) -> Result<RuleStats, RuleError> {
        if !self.rules.contains_key(id) {
            return Err(RuleError::NotFound(id.to_string()));
        }
        Ok(self
            .stats
            .get(id)
            .map(|s| s.value().clone())
            .unwrap_or_default())
    }

    /// Swap in a new version of a rule, restoring the old one if saving fails
    async fn replace(&self, previous: Rule, rule: Rule) -> Result<(), RuleError> {
        self.rules.insert(rule.id.clone(), rule);
        if let Err(e) = self.save().await {
            self.rules.insert(previous.id.clone(), previous);
            return Err(e);
        }
        Ok(())
    }

    /// Save rules to disk
    async fn save(&self) -> Result<(), RuleError> {
        let Some(path) = &self.data_path else {
            return Ok(());
        };
        let mut rules: Vec<Rule> = self.rules.iter().map(|r| r.value().clone()).collect();
        rules.sort_by_key(Rule::order_key);
        persistence::save_rules(path, &rules).await?;
        tracing::debug!("Saved {} rules to {:?}", rules.len(), path);
        Ok(())
    }
}
