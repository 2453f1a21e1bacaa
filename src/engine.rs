//! Engine façade: owns the store, the per-project locks and open sessions.

use crate::codes::session_handle;
use crate::diff::DiffSettings;
use crate::error::{ErrorReport, ImportError, ImportResult};
use crate::input::{RawTask, load_tasks, parse_tasks};
use crate::locks::ProjectLocks;
use crate::session::{CommittedProject, ImportSession, ProjectDiff, SessionState};
use crate::store::SnapshotStore;
use crate::types::ChangeRecord;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

const HANDLE_WORDS: u8 = 2;
const HANDLE_ATTEMPTS: usize = 16;

/// A project that could not be committed, with the reason.
#[derive(Debug, Serialize)]
pub struct ProjectFailure {
    pub project_code: String,
    pub error: ErrorReport,
}

/// Outcome of [`ImportEngine::commit`].
#[derive(Debug, Serialize)]
pub struct CommittedResult {
    pub session: String,
    pub state: SessionState,
    pub committed: Vec<CommittedProject>,
    pub failed: Vec<ProjectFailure>,
}

impl CommittedResult {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

type SharedSession = Arc<Mutex<ImportSession>>;

pub struct ImportEngine<S: SnapshotStore> {
    store: S,
    locks: ProjectLocks,
    settings: DiffSettings,
    sessions: Mutex<HashMap<String, SharedSession>>,
}

impl<S: SnapshotStore> ImportEngine<S> {
    pub fn new(store: S) -> Self {
        Self::with_settings(store, DiffSettings::default())
    }

    pub fn with_settings(store: S, settings: DiffSettings) -> Self {
        Self {
            store,
            locks: ProjectLocks::new(),
            settings,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &DiffSettings {
        &self.settings
    }

    /// Start a session from raw task records. Returns the session handle.
    pub fn begin(&self, tasks: Vec<RawTask>, as_of: NaiveDate) -> ImportResult<String> {
        let provisional = free_handle(&self.sessions_map());
        let session = ImportSession::prepare(
            provisional,
            tasks,
            as_of,
            &self.store,
            &self.locks,
            &self.settings,
        )?;
        info!(
            %as_of,
            projects = session.projects().len(),
            pending = session.pending_changes().len(),
            "Import session prepared"
        );
        Ok(self.register(session))
    }

    /// Start a session from a JSON or YAML schedule document.
    pub fn begin_document(&self, content: &str, as_of: NaiveDate) -> ImportResult<String> {
        let tasks = parse_tasks(content).map_err(|e| ImportError::UnreadableInput(format!("{:#}", e)))?;
        self.begin(tasks, as_of)
    }

    /// Start a session from a schedule file, gzip-compressed or not.
    pub fn begin_file(&self, path: &Path, as_of: NaiveDate) -> ImportResult<String> {
        let tasks = load_tasks(path).map_err(|e| ImportError::UnreadableInput(format!("{:#}", e)))?;
        self.begin(tasks, as_of)
    }

    /// Changes of the session's projects that are still awaiting commit.
    pub fn pending_changes(&self, handle: &str) -> ImportResult<Vec<ChangeRecord>> {
        self.with_session(handle, |s| Ok(s.pending_changes()))
    }

    pub fn justify(&self, handle: &str, change_id: &str, reason: &str) -> ImportResult<()> {
        self.with_session(handle, |s| s.justify(change_id, reason, None))
    }

    pub fn justify_with_impact(
        &self,
        handle: &str,
        change_id: &str,
        reason: &str,
        impact: &str,
    ) -> ImportResult<()> {
        self.with_session(handle, |s| s.justify(change_id, reason, Some(impact)))
    }

    /// Commit every pending project of the session.
    ///
    /// Succeeds when at least one project committed or nothing was pending.
    /// When nothing could be committed, the unjustified changes of all
    /// projects are returned together, or the first concurrency conflict.
    pub fn commit(&self, handle: &str) -> ImportResult<CommittedResult> {
        self.with_session(handle, |s| {
            let (committed, failed) = s.commit_all(&self.store, &self.locks)?;

            if committed.is_empty() && !failed.is_empty() {
                let mut unjustified = Vec::new();
                let mut conflict = None;
                let mut other = None;
                for (_, err) in failed {
                    match err {
                        ImportError::UnjustifiedChanges(changes) => unjustified.extend(changes),
                        e @ ImportError::ConcurrentModification { .. } => {
                            conflict.get_or_insert(e);
                        }
                        e => {
                            other.get_or_insert(e);
                        }
                    }
                }
                if !unjustified.is_empty() {
                    return Err(ImportError::UnjustifiedChanges(unjustified));
                }
                return Err(conflict.or(other).unwrap_or(ImportError::EmptyImport));
            }

            Ok(CommittedResult {
                session: handle.to_string(),
                state: s.state(),
                committed,
                failed: failed
                    .into_iter()
                    .map(|(project_code, err)| ProjectFailure {
                        project_code,
                        error: err.report(),
                    })
                    .collect(),
            })
        })
    }

    /// Commit one project of a multi-project session.
    pub fn commit_project(&self, handle: &str, project_code: &str) -> ImportResult<CommittedProject> {
        self.with_session(handle, |s| s.commit_project(project_code, &self.store, &self.locks))
    }

    /// Abandon the session. The store is not touched.
    pub fn abandon(&self, handle: &str) -> ImportResult<()> {
        self.with_session(handle, |s| s.abandon())
    }

    pub fn session_state(&self, handle: &str) -> ImportResult<SessionState> {
        self.with_session(handle, |s| Ok(s.state()))
    }

    /// Per-project diffs of the session, committed ones included.
    pub fn projects(&self, handle: &str) -> ImportResult<Vec<ProjectDiff>> {
        self.with_session(handle, |s| Ok(s.projects().to_vec()))
    }

    /// Drop sessions that reached a terminal state. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let mut sessions = self.sessions_map();
        let before = sessions.len();
        sessions.retain(|_, session| {
            !session
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .state()
                .is_terminal()
        });
        let removed = before - sessions.len();
        if removed > 0 {
            debug!(removed, "Pruned finished sessions");
        }
        removed
    }

    fn sessions_map(&self) -> std::sync::MutexGuard<'_, HashMap<String, SharedSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn session(&self, handle: &str) -> ImportResult<SharedSession> {
        self.sessions_map()
            .get(handle)
            .cloned()
            .ok_or_else(|| ImportError::SessionNotFound(handle.to_string()))
    }

    fn with_session<T>(
        &self,
        handle: &str,
        f: impl FnOnce(&mut ImportSession) -> ImportResult<T>,
    ) -> ImportResult<T> {
        let session = self.session(handle)?;
        let mut guard = session.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Store a prepared session, renaming it if another session took its
    /// handle while it was being prepared.
    fn register(&self, mut session: ImportSession) -> String {
        let mut sessions = self.sessions_map();
        if sessions.contains_key(session.id()) {
            let handle = free_handle(&sessions);
            debug!(taken = %session.id(), session = %handle, "Session handle reassigned");
            session.set_id(handle);
        }
        let handle = session.id().to_string();
        info!(session = %handle, "Import session opened");
        sessions.insert(handle.clone(), Arc::new(Mutex::new(session)));
        handle
    }
}

/// A handle not present in `sessions`.
fn free_handle(sessions: &HashMap<String, SharedSession>) -> String {
    for _ in 0..HANDLE_ATTEMPTS {
        let handle = session_handle(HANDLE_WORDS);
        if !sessions.contains_key(&handle) {
            return handle;
        }
    }
    let base = session_handle(HANDLE_WORDS);
    (2..)
        .map(|n| format!("{}-{}", base, n))
        .find(|h| !sessions.contains_key(h))
        .unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    const DOCUMENT: &str = r#"
tasks:
  - { id: 1, name: Substation Upgrade, outline_level: 1, code: SUB-7 }
  - { id: 2, name: Construction, outline_level: 2 }
  - { id: 3, name: Energize, outline_level: 3, milestone: true, finish: 2025-06-30 }
"#;

    #[test]
    fn begin_document_opens_session() {
        let engine = ImportEngine::new(MemoryStore::new());
        let handle = engine.begin_document(DOCUMENT, date(2025, 1, 1)).unwrap();

        assert_eq!(engine.session_state(&handle).unwrap(), SessionState::AwaitingReasons);
        let changes = engine.pending_changes(&handle).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].project_code, "SUB-7");
    }

    #[test]
    fn unreadable_document_is_rejected() {
        let engine = ImportEngine::new(MemoryStore::new());
        let err = engine.begin_document("tasks: {", date(2025, 1, 1)).unwrap_err();
        assert!(matches!(err, ImportError::UnreadableInput(_)));
    }

    #[test]
    fn unknown_handle_is_reported() {
        let engine = ImportEngine::new(MemoryStore::new());
        assert_eq!(
            engine.pending_changes("no-such").unwrap_err(),
            ImportError::SessionNotFound("no-such".into())
        );
    }

    #[test]
    fn commit_without_reasons_returns_unjustified() {
        let engine = ImportEngine::new(MemoryStore::new());
        let handle = engine.begin_document(DOCUMENT, date(2025, 1, 1)).unwrap();

        let err = engine.commit(&handle).unwrap_err();
        assert!(matches!(err, ImportError::UnjustifiedChanges(ref c) if c.len() == 1));
        assert_eq!(engine.session_state(&handle).unwrap(), SessionState::AwaitingReasons);
    }

    #[test]
    fn prune_drops_only_finished_sessions() {
        let engine = ImportEngine::new(MemoryStore::new());
        let open = engine.begin_document(DOCUMENT, date(2025, 1, 1)).unwrap();
        let done = engine.begin_document(DOCUMENT, date(2025, 1, 1)).unwrap();
        assert_ne!(open, done);
        engine.abandon(&done).unwrap();

        assert_eq!(engine.prune(), 1);
        assert!(engine.session_state(&open).is_ok());
        assert!(engine.session_state(&done).is_err());
    }

    #[test]
    fn registering_a_taken_handle_keeps_the_open_session() {
        let engine = ImportEngine::new(MemoryStore::new());
        let first = engine.begin_document(DOCUMENT, date(2025, 1, 1)).unwrap();
        let change = engine.pending_changes(&first).unwrap().remove(0);
        engine.justify(&first, &change.id, "Baseline").unwrap();

        let clash = ImportSession::prepare(
            first.clone(),
            parse_tasks(DOCUMENT).unwrap(),
            date(2025, 1, 1),
            engine.store(),
            &engine.locks,
            engine.settings(),
        )
        .unwrap();
        let second = engine.register(clash);

        assert_ne!(second, first);
        assert!(engine.with_session(&first, |s| Ok(s.unjustified().is_empty())).unwrap());
        assert_eq!(engine.pending_changes(&second).unwrap().len(), 1);
    }
}
