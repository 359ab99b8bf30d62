use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::types::{Direction, LogEntry, MigrationState, MigrationStatus};

/// A migration whose latest log entry is `up`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// Partition of the registered migrations into applied and pending.
///
/// Both halves are sorted ascending by name and together contain every
/// registered name exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationPlan {
    applied: Vec<AppliedMigration>,
    pending: Vec<String>,
    unknown: Vec<String>,
}

impl MigrationPlan {
    /// Reconcile registered names against the log.
    ///
    /// `log` must be in chronological order. The latest entry per name
    /// decides its state; names with no entries are pending.
    pub fn reconcile<'a, I>(registered: I, log: &[LogEntry]) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut latest: HashMap<&str, (Direction, DateTime<Utc>)> = HashMap::new();
        for entry in log {
            latest.insert(entry.name.as_str(), (entry.direction, entry.created_at));
        }

        let mut names: Vec<&str> = registered.into_iter().collect();
        names.sort_unstable();
        names.dedup();

        let mut plan = MigrationPlan::default();
        for name in &names {
            match latest.remove(name) {
                Some((Direction::Up, applied_at)) => plan.applied.push(AppliedMigration {
                    name: name.to_string(),
                    applied_at,
                }),
                _ => plan.pending.push(name.to_string()),
            }
        }

        plan.unknown = latest.into_keys().map(str::to_string).collect();
        plan.unknown.sort();
        plan
    }

    pub fn applied(&self) -> &[AppliedMigration] {
        &self.applied
    }

    pub fn pending(&self) -> &[String] {
        &self.pending
    }

    /// Logged names that are not registered.
    pub fn unknown(&self) -> &[String] {
        &self.unknown
    }

    /// The next `count` pending names, oldest first. `None` takes all.
    pub fn next_up(&self, count: Option<usize>) -> Vec<String> {
        let count = count.unwrap_or(self.pending.len()).min(self.pending.len());
        self.pending[..count].to_vec()
    }

    /// The next `count` applied names, newest first. `None` takes one.
    pub fn next_down(&self, count: Option<usize>) -> Vec<String> {
        let count = count.unwrap_or(1).min(self.applied.len());
        self.applied
            .iter()
            .rev()
            .take(count)
            .map(|m| m.name.clone())
            .collect()
    }

    /// Move a pending name to applied.
    pub fn mark_applied(&mut self, name: &str, applied_at: DateTime<Utc>) {
        if let Some(idx) = self.pending.iter().position(|n| n == name) {
            self.pending.remove(idx);
        }
        self.applied.retain(|m| m.name != name);

        let idx = self
            .applied
            .binary_search_by(|m| m.name.as_str().cmp(name))
            .unwrap_or_else(|i| i);
        self.applied.insert(
            idx,
            AppliedMigration {
                name: name.to_string(),
                applied_at,
            },
        );
    }

    /// Move an applied name back to pending.
    pub fn mark_reverted(&mut self, name: &str) {
        self.applied.retain(|m| m.name != name);
        if let Err(idx) = self.pending.binary_search_by(|n| n.as_str().cmp(name)) {
            self.pending.insert(idx, name.to_string());
        }
    }

    /// Applied migrations first, then pending, each ascending by name.
    pub fn status(&self) -> Vec<MigrationStatus> {
        let applied = self.applied.iter().map(|m| MigrationStatus {
            name: m.name.clone(),
            state: MigrationState::Applied,
            applied_at: Some(m.applied_at),
        });
        let pending = self.pending.iter().map(|name| MigrationStatus {
            name: name.clone(),
            state: MigrationState::Pending,
            applied_at: None,
        });
        applied.chain(pending).collect()
    }
}
