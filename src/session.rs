//! One end-to-end import attempt.
//!
//! A session walks Parsing, Classifying, Deriving and Diffing in one call to
//! [`ImportSession::prepare`], then waits in `AwaitingReasons` until every
//! pending change of a project is justified. Each project commits on its own;
//! nothing is written to the store before a project commits.

use crate::classify::classify_tree;
use crate::codes::ChangeIds;
use crate::diff::{ChangeSummary, DiffSettings, detect_changes};
use crate::error::{ImportError, ImportResult, UnjustifiedChange};
use crate::input::RawTask;
use crate::locks::ProjectLocks;
use crate::outline::OutlineTree;
use crate::status::{MilestoneHealth, derive_milestone, derive_project};
use crate::store::SnapshotStore;
use crate::types::{AuditEntry, ChangeRecord, Project, ProjectSnapshot};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Parsing,
    Classifying,
    Deriving,
    Diffing,
    AwaitingReasons,
    Committed,
    Rejected,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Parsing => "parsing",
            SessionState::Classifying => "classifying",
            SessionState::Deriving => "deriving",
            SessionState::Diffing => "diffing",
            SessionState::AwaitingReasons => "awaiting_reasons",
            SessionState::Committed => "committed",
            SessionState::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Committed | SessionState::Rejected)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where one project's diff stands within its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DiffState {
    Pending,
    Committed { revision: u64 },
    /// The stored snapshot moved after diffing; the project must be re-imported.
    Conflicted,
}

/// A derived project together with its changes against the stored snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectDiff {
    pub project: Project,
    /// Snapshot revision the diff was computed against (0 = none).
    pub baseline_revision: u64,
    pub changes: Vec<ChangeRecord>,
    pub state: DiffState,
}

impl ProjectDiff {
    pub fn code(&self) -> &str {
        &self.project.code
    }

    pub fn is_pending(&self) -> bool {
        self.state == DiffState::Pending
    }

    pub fn health(&self) -> MilestoneHealth {
        MilestoneHealth::of(&self.project.milestones)
    }

    pub fn summary(&self) -> ChangeSummary {
        ChangeSummary::of(&self.changes)
    }

    pub fn unjustified(&self) -> Vec<UnjustifiedChange> {
        self.changes
            .iter()
            .filter(|c| !c.is_justified())
            .map(|c| UnjustifiedChange {
                change_id: c.id.clone(),
                project_code: c.project_code.clone(),
                milestone: c.milestone.clone(),
                kind: c.kind,
            })
            .collect()
    }

    fn to_snapshot(&self, as_of: NaiveDate, committed_at: DateTime<Utc>) -> ProjectSnapshot {
        ProjectSnapshot {
            project_code: self.project.code.clone(),
            project_name: self.project.name.clone(),
            revision: self.baseline_revision + 1,
            as_of,
            start_date: self.project.start_date,
            target_completion: self.project.target_completion,
            completion: self.project.completion,
            status: self.project.status,
            committed_at,
            milestones: self.project.milestones.clone(),
        }
    }
}

/// Result of committing one project.
#[derive(Debug, Clone, Serialize)]
pub struct CommittedProject {
    pub project_code: String,
    pub project_name: String,
    pub revision: u64,
    pub committed_at: DateTime<Utc>,
    pub changes: Vec<ChangeRecord>,
}

#[derive(Debug)]
pub struct ImportSession {
    id: String,
    as_of: NaiveDate,
    state: SessionState,
    projects: Vec<ProjectDiff>,
}

impl ImportSession {
    /// Parse, classify, derive and diff `tasks` against the current snapshots.
    ///
    /// Fails with the structural error when the export is malformed or holds
    /// no project; such a session is rejected and never stored.
    pub fn prepare(
        id: impl Into<String>,
        tasks: Vec<RawTask>,
        as_of: NaiveDate,
        store: &dyn SnapshotStore,
        locks: &ProjectLocks,
        settings: &DiffSettings,
    ) -> ImportResult<Self> {
        let mut session = Self {
            id: id.into(),
            as_of,
            state: SessionState::Parsing,
            projects: Vec::new(),
        };

        match session.run_pipeline(tasks, store, locks, settings) {
            Ok(()) => Ok(session),
            Err(e) => {
                session.transition(SessionState::Rejected);
                warn!(session = %session.id, "Import rejected: {}", e);
                Err(e)
            }
        }
    }

    fn run_pipeline(
        &mut self,
        tasks: Vec<RawTask>,
        store: &dyn SnapshotStore,
        locks: &ProjectLocks,
        settings: &DiffSettings,
    ) -> ImportResult<()> {
        let task_count = tasks.len();
        let tree = OutlineTree::build(tasks)?;
        if tree.roots().is_empty() {
            return Err(ImportError::EmptyImport);
        }
        debug!(session = %self.id, tasks = task_count, projects = tree.roots().len(), "Outline built");

        self.transition(SessionState::Classifying);
        let classified = classify_tree(&tree)?;

        self.transition(SessionState::Deriving);
        let projects: Vec<Project> = classified
            .iter()
            .map(|c| {
                let milestones = c
                    .milestones
                    .iter()
                    .filter_map(|&id| derive_milestone(tree.node(id), &c.code, self.as_of))
                    .collect();
                derive_project(tree.node(c.root), &c.code, milestones)
            })
            .collect();

        self.transition(SessionState::Diffing);
        let detected_at = Utc::now();
        let mut ids = ChangeIds::new();
        for project in projects {
            let prior = locks
                .with_lock(&project.code, || store.get(&project.code))
                .map_err(ImportError::storage)?;
            let baseline_revision = prior.as_ref().map_or(0, |s| s.revision);
            let changes = detect_changes(
                &project.code,
                prior.as_ref().map(|s| s.milestones.as_slice()),
                &project.milestones,
                settings,
                &mut ids,
                detected_at,
            );
            debug!(
                session = %self.id,
                project = %project.code,
                baseline_revision,
                changes = changes.len(),
                "Project diffed"
            );
            self.projects.push(ProjectDiff {
                project,
                baseline_revision,
                changes,
                state: DiffState::Pending,
            });
        }

        self.transition(SessionState::AwaitingReasons);
        Ok(())
    }

    fn transition(&mut self, next: SessionState) {
        debug!(session = %self.id, from = %self.state, to = %next, "Session state change");
        self.state = next;
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn set_id(&mut self, id: String) {
        self.id = id;
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn projects(&self) -> &[ProjectDiff] {
        &self.projects
    }

    /// Changes of every project still awaiting commit.
    pub fn pending_changes(&self) -> Vec<ChangeRecord> {
        self.projects
            .iter()
            .filter(|p| p.is_pending())
            .flat_map(|p| p.changes.iter().cloned())
            .collect()
    }

    /// Changes of pending projects that still lack a reason.
    pub fn unjustified(&self) -> Vec<UnjustifiedChange> {
        self.projects
            .iter()
            .filter(|p| p.is_pending())
            .flat_map(|p| p.unjustified())
            .collect()
    }

    fn expect_state(&self, expected: SessionState) -> ImportResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ImportError::InvalidState {
                session: self.id.clone(),
                state: self.state.to_string(),
                expected: expected.to_string(),
            })
        }
    }

    /// Attach a reason, and optionally an impact note, to a pending change.
    ///
    /// Without an explicit impact, date shifts get their suggested impact text.
    /// Justifying an already justified change replaces its reason.
    pub fn justify(
        &mut self,
        change_id: &str,
        reason: &str,
        impact: Option<&str>,
    ) -> ImportResult<()> {
        self.expect_state(SessionState::AwaitingReasons)?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ImportError::EmptyReason {
                change_id: change_id.to_string(),
            });
        }

        let change = self
            .projects
            .iter_mut()
            .filter(|p| p.is_pending())
            .flat_map(|p| p.changes.iter_mut())
            .find(|c| c.id == change_id)
            .ok_or_else(|| ImportError::ChangeNotFound(change_id.to_string()))?;

        change.reason = Some(reason.to_string());
        change.impact = impact
            .map(str::trim)
            .filter(|i| !i.is_empty())
            .map(str::to_string)
            .or_else(|| change.shift.map(|s| s.impact_text()));
        debug!(session = %self.id, change = %change_id, "Change justified");
        Ok(())
    }

    /// Commit one pending project.
    ///
    /// The snapshot revision is re-read under the project-code lock; if it
    /// moved since diffing the project is marked conflicted and dropped from
    /// the session. Refusal for missing reasons leaves everything untouched.
    pub fn commit_project(
        &mut self,
        project_code: &str,
        store: &dyn SnapshotStore,
        locks: &ProjectLocks,
    ) -> ImportResult<CommittedProject> {
        self.expect_state(SessionState::AwaitingReasons)?;
        let as_of = self.as_of;
        let session_id = self.id.clone();

        let diff = self
            .projects
            .iter_mut()
            .find(|p| p.is_pending() && p.code() == project_code)
            .ok_or_else(|| ImportError::ProjectNotFound(project_code.to_string()))?;

        let unjustified = diff.unjustified();
        if !unjustified.is_empty() {
            return Err(ImportError::UnjustifiedChanges(unjustified));
        }

        let committed_at = Utc::now();
        let snapshot = diff.to_snapshot(as_of, committed_at);
        let entries: Vec<AuditEntry> = diff
            .changes
            .iter()
            .map(|change| AuditEntry {
                revision: snapshot.revision,
                committed_at,
                change: change.clone(),
            })
            .collect();

        let outcome = locks.with_lock(project_code, || {
            let found = store
                .get(project_code)
                .map_err(ImportError::storage)?
                .map_or(0, |s| s.revision);
            if found != diff.baseline_revision {
                return Err(ImportError::ConcurrentModification {
                    project_code: project_code.to_string(),
                    expected: diff.baseline_revision,
                    found,
                });
            }
            store
                .commit(&snapshot, &entries)
                .map_err(ImportError::storage)
        });

        match outcome {
            Ok(()) => {
                diff.state = DiffState::Committed {
                    revision: snapshot.revision,
                };
                info!(
                    session = %session_id,
                    project = %project_code,
                    revision = snapshot.revision,
                    changes = entries.len(),
                    "Project committed"
                );
            }
            Err(e @ ImportError::ConcurrentModification { .. }) => {
                diff.state = DiffState::Conflicted;
                warn!(session = %session_id, project = %project_code, "{}", e);
                self.settle();
                return Err(e);
            }
            Err(e) => return Err(e),
        }

        let committed = CommittedProject {
            project_code: project_code.to_string(),
            project_name: snapshot.project_name,
            revision: snapshot.revision,
            committed_at,
            changes: entries.into_iter().map(|e| e.change).collect(),
        };
        self.settle();
        Ok(committed)
    }

    /// Commit every pending project, collecting per-project failures.
    pub fn commit_all(
        &mut self,
        store: &dyn SnapshotStore,
        locks: &ProjectLocks,
    ) -> ImportResult<(Vec<CommittedProject>, Vec<(String, ImportError)>)> {
        self.expect_state(SessionState::AwaitingReasons)?;
        let pending: Vec<String> = self
            .projects
            .iter()
            .filter(|p| p.is_pending())
            .map(|p| p.code().to_string())
            .collect();

        let mut committed = Vec::new();
        let mut failed = Vec::new();
        for code in pending {
            match self.commit_project(&code, store, locks) {
                Ok(project) => committed.push(project),
                Err(e) => failed.push((code, e)),
            }
        }
        Ok((committed, failed))
    }

    /// Give up on the session. Nothing pending is written.
    pub fn abandon(&mut self) -> ImportResult<()> {
        self.expect_state(SessionState::AwaitingReasons)?;
        info!(session = %self.id, "Session abandoned");
        self.transition(SessionState::Rejected);
        Ok(())
    }

    /// Move to `Committed` once no project is pending.
    fn settle(&mut self) {
        if self.state == SessionState::AwaitingReasons && !self.projects.iter().any(|p| p.is_pending())
        {
            if self
                .projects
                .iter()
                .any(|p| matches!(p.state, DiffState::Committed { .. }))
            {
                self.transition(SessionState::Committed);
            } else {
                self.transition(SessionState::Rejected);
            }
        }
    }
}
