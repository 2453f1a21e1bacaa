//! Durable snapshot storage seam.
//!
//! The engine only needs get/put/append with last-write-wins per project
//! code. Mutual exclusion per code is provided by [`crate::locks`], not by
//! the store.

use crate::types::{AuditEntry, ProjectSnapshot, SnapshotSummary};
use anyhow::Result;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

/// Storage for accepted snapshots and the change audit trail.
pub trait SnapshotStore: Send + Sync {
    /// Current snapshot for a project code, if one was ever committed.
    fn get(&self, project_code: &str) -> Result<Option<ProjectSnapshot>>;

    /// Replace the snapshot for `snapshot.project_code` wholesale.
    fn put(&self, snapshot: &ProjectSnapshot) -> Result<()>;

    /// Append committed changes to a project's audit trail.
    fn append(&self, project_code: &str, entries: &[AuditEntry]) -> Result<()>;

    /// Audit trail of one project, oldest first.
    fn history(&self, project_code: &str) -> Result<Vec<AuditEntry>>;

    /// All stored snapshots, ordered by project code.
    fn list(&self) -> Result<Vec<SnapshotSummary>>;

    /// Replace the snapshot and append its changes as one unit.
    ///
    /// Stores that support transactions should override this.
    fn commit(&self, snapshot: &ProjectSnapshot, entries: &[AuditEntry]) -> Result<()> {
        self.put(snapshot)?;
        self.append(&snapshot.project_code, entries)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    snapshots: BTreeMap<String, ProjectSnapshot>,
    history: HashMap<String, Vec<AuditEntry>>,
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }
}

impl SnapshotStore for MemoryStore {
    fn get(&self, project_code: &str) -> Result<Option<ProjectSnapshot>> {
        Ok(self.with_state(|s| s.snapshots.get(project_code).cloned()))
    }

    fn put(&self, snapshot: &ProjectSnapshot) -> Result<()> {
        self.with_state(|s| {
            s.snapshots
                .insert(snapshot.project_code.clone(), snapshot.clone())
        });
        Ok(())
    }

    fn append(&self, project_code: &str, entries: &[AuditEntry]) -> Result<()> {
        self.with_state(|s| {
            s.history
                .entry(project_code.to_string())
                .or_default()
                .extend_from_slice(entries)
        });
        Ok(())
    }

    fn history(&self, project_code: &str) -> Result<Vec<AuditEntry>> {
        Ok(self.with_state(|s| s.history.get(project_code).cloned().unwrap_or_default()))
    }

    fn list(&self) -> Result<Vec<SnapshotSummary>> {
        Ok(self.with_state(|s| s.snapshots.values().map(summarize).collect()))
    }

    fn commit(&self, snapshot: &ProjectSnapshot, entries: &[AuditEntry]) -> Result<()> {
        self.with_state(|s| {
            s.snapshots
                .insert(snapshot.project_code.clone(), snapshot.clone());
            s.history
                .entry(snapshot.project_code.clone())
                .or_default()
                .extend_from_slice(entries);
        });
        Ok(())
    }
}

impl<S: SnapshotStore + ?Sized> SnapshotStore for std::sync::Arc<S> {
    fn get(&self, project_code: &str) -> Result<Option<ProjectSnapshot>> {
        (**self).get(project_code)
    }

    fn put(&self, snapshot: &ProjectSnapshot) -> Result<()> {
        (**self).put(snapshot)
    }

    fn append(&self, project_code: &str, entries: &[AuditEntry]) -> Result<()> {
        (**self).append(project_code, entries)
    }

    fn history(&self, project_code: &str) -> Result<Vec<AuditEntry>> {
        (**self).history(project_code)
    }

    fn list(&self) -> Result<Vec<SnapshotSummary>> {
        (**self).list()
    }

    fn commit(&self, snapshot: &ProjectSnapshot, entries: &[AuditEntry]) -> Result<()> {
        (**self).commit(snapshot, entries)
    }
}

pub(crate) fn summarize(snapshot: &ProjectSnapshot) -> SnapshotSummary {
    SnapshotSummary {
        project_code: snapshot.project_code.clone(),
        project_name: snapshot.project_name.clone(),
        revision: snapshot.revision,
        milestone_count: snapshot.milestones.len(),
        committed_at: snapshot.committed_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Status;
    use chrono::{NaiveDate, Utc};

    fn snapshot(code: &str, revision: u64) -> ProjectSnapshot {
        ProjectSnapshot {
            project_code: code.into(),
            project_name: format!("Project {}", code),
            revision,
            as_of: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            start_date: None,
            target_completion: None,
            completion: 0.0,
            status: Status::NotStarted,
            committed_at: Utc::now(),
            milestones: Vec::new(),
        }
    }

    #[test]
    fn put_is_last_write_wins() {
        let store = MemoryStore::new();
        store.put(&snapshot("A-P1", 1)).unwrap();
        store.put(&snapshot("A-P1", 2)).unwrap();
        assert_eq!(store.get("A-P1").unwrap().unwrap().revision, 2);
        assert!(store.get("B-P1").unwrap().is_none());
    }

    #[test]
    fn list_is_ordered_by_code() {
        let store = MemoryStore::new();
        store.put(&snapshot("Z-P1", 1)).unwrap();
        store.put(&snapshot("A-P1", 3)).unwrap();
        let codes: Vec<_> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|s| s.project_code)
            .collect();
        assert_eq!(codes, vec!["A-P1", "Z-P1"]);
    }

    #[test]
    fn history_is_empty_for_unknown_project() {
        let store = MemoryStore::new();
        assert!(store.history("nope").unwrap().is_empty());
    }
}
