//! End-to-end tests for import sessions.
//!
//! Each test drives the engine the way a caller would: begin with raw task
//! records, inspect pending changes, justify them, and commit.

use chrono::NaiveDate;
use schedule_import::db::Database;
use schedule_import::engine::ImportEngine;
use schedule_import::error::{HierarchyIssue, ImportError};
use schedule_import::input::RawTask;
use schedule_import::session::SessionState;
use schedule_import::store::{MemoryStore, SnapshotStore};
use schedule_import::types::{ChangeKind, ChangeValue, Status};
use std::sync::Arc;
use std::thread;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn as_of() -> NaiveDate {
    date(2025, 4, 1)
}

/// Grid program with a phase holding a gate milestone, a commissioning
/// milestone, and an ordinary task.
fn grid_program(gate: NaiveDate) -> Vec<RawTask> {
    vec![
        RawTask::new("1", "Grid Modernization Program", 1)
            .with_start(date(2025, 1, 6))
            .with_finish(date(2025, 12, 19)),
        RawTask::new("2", "Engineering", 2),
        RawTask::new("3", "Design Gate", 3).flagged().with_finish(gate),
        RawTask::new("4", "Commissioning", 3)
            .with_duration(0.0)
            .with_finish(date(2025, 11, 3)),
        RawTask::new("5", "Field Survey", 3)
            .with_duration(16.0)
            .with_finish(date(2025, 2, 14)),
    ]
}

fn justify_all<S: SnapshotStore>(engine: &ImportEngine<S>, handle: &str, reason: &str) {
    for change in engine.pending_changes(handle).expect("pending changes") {
        engine.justify(handle, &change.id, reason).expect("justify");
    }
}

/// Import and commit `tasks` as a baseline.
fn baseline<S: SnapshotStore>(engine: &ImportEngine<S>, tasks: Vec<RawTask>) {
    let handle = engine.begin(tasks, as_of()).expect("begin");
    justify_all(engine, &handle, "Initial baseline");
    engine.commit(&handle).expect("commit");
}

mod scenario_tests {
    use super::*;

    #[test]
    fn single_flagged_leaf_becomes_one_not_started_milestone() {
        let engine = ImportEngine::new(MemoryStore::new());
        let handle = engine
            .begin(
                vec![
                    RawTask::new("1", "Outage Program", 1),
                    RawTask::new("2", "Execution", 2),
                    RawTask::new("3", "Breaker Swap", 3)
                        .flagged()
                        .with_duration(0.0)
                        .with_finish(date(2025, 6, 1)),
                ],
                as_of(),
            )
            .expect("begin");

        let projects = engine.projects(&handle).expect("projects");
        assert_eq!(projects.len(), 1);
        let milestones = &projects[0].project.milestones;
        assert_eq!(milestones.len(), 1);
        assert_eq!(milestones[0].name, "Breaker Swap");
        assert_eq!(milestones[0].status, Status::NotStarted);
        assert_eq!(milestones[0].percent_complete, 0.0);
    }

    #[test]
    fn overdue_half_done_milestone_is_delayed() {
        let engine = ImportEngine::new(MemoryStore::new());
        let handle = engine
            .begin(
                vec![
                    RawTask::new("1", "Outage Program", 1),
                    RawTask::new("2", "Execution", 2),
                    RawTask::new("3", "Breaker Swap", 3)
                        .flagged()
                        .with_percent(50.0)
                        .with_finish(date(2025, 3, 20)),
                ],
                as_of(),
            )
            .expect("begin");

        let projects = engine.projects(&handle).expect("projects");
        assert_eq!(projects[0].project.milestones[0].status, Status::Delayed);
    }

    #[test]
    fn five_day_shift_needs_reason_then_updates_snapshot() {
        let engine = ImportEngine::new(MemoryStore::new());
        baseline(&engine, grid_program(date(2025, 5, 9)));

        let handle = engine.begin(grid_program(date(2025, 5, 14)), as_of()).expect("begin");
        let changes = engine.pending_changes(&handle).expect("pending");
        assert_eq!(changes.len(), 1);
        let change = &changes[0];
        assert_eq!(change.kind, ChangeKind::DateShift);
        assert_eq!(change.milestone, "Design Gate");
        assert_eq!(change.shift.map(|s| s.days), Some(5));

        let err = engine.commit(&handle).unwrap_err();
        assert!(matches!(err, ImportError::UnjustifiedChanges(ref c) if c.len() == 1));
        let stored = engine.store().get("GMP-P1").unwrap().unwrap();
        assert_eq!(stored.milestone("Design Gate").unwrap().target_date, date(2025, 5, 9));

        engine.justify(&handle, &change.id, "Crane availability").expect("justify");
        let result = engine.commit(&handle).expect("commit");
        assert_eq!(result.committed.len(), 1);
        assert_eq!(result.committed[0].revision, 2);

        let stored = engine.store().get("GMP-P1").unwrap().unwrap();
        assert_eq!(stored.milestone("Design Gate").unwrap().target_date, date(2025, 5, 14));
    }

    #[test]
    fn missing_milestone_is_removed_from_snapshot() {
        let engine = ImportEngine::new(MemoryStore::new());
        baseline(&engine, grid_program(date(2025, 5, 9)));

        let mut tasks = grid_program(date(2025, 5, 9));
        tasks.retain(|t| t.name != "Commissioning");
        let handle = engine.begin(tasks, as_of()).expect("begin");

        let changes = engine.pending_changes(&handle).expect("pending");
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::Removed);
        assert_eq!(changes[0].milestone, "Commissioning");
        assert_eq!(changes[0].old_value, Some(ChangeValue::Date(date(2025, 11, 3))));

        justify_all(&engine, &handle, "Descoped");
        engine.commit(&handle).expect("commit");

        let stored = engine.store().get("GMP-P1").unwrap().unwrap();
        assert!(stored.milestone("Commissioning").is_none());
        assert_eq!(stored.milestones.len(), 1);
    }
}

mod property_tests {
    use super::*;

    #[test]
    fn first_import_is_all_added() {
        let engine = ImportEngine::new(MemoryStore::new());
        let handle = engine.begin(grid_program(date(2025, 5, 9)), as_of()).expect("begin");

        let changes = engine.pending_changes(&handle).expect("pending");
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().all(|c| c.kind == ChangeKind::Added));
    }

    #[test]
    fn unchanged_reimport_has_no_changes() {
        let engine = ImportEngine::new(MemoryStore::new());
        baseline(&engine, grid_program(date(2025, 5, 9)));

        let handle = engine.begin(grid_program(date(2025, 5, 9)), as_of()).expect("begin");
        assert!(engine.pending_changes(&handle).expect("pending").is_empty());

        let result = engine.commit(&handle).expect("commit");
        assert_eq!(result.committed[0].changes.len(), 0);
        assert_eq!(engine.session_state(&handle).unwrap(), SessionState::Committed);
    }

    #[test]
    fn refused_commit_leaves_store_untouched() {
        let engine = ImportEngine::new(MemoryStore::new());
        let handle = engine.begin(grid_program(date(2025, 5, 9)), as_of()).expect("begin");

        assert!(engine.commit(&handle).is_err());
        assert!(engine.store().list().unwrap().is_empty());
        assert!(engine.store().history("GMP-P1").unwrap().is_empty());
        assert_eq!(engine.session_state(&handle).unwrap(), SessionState::AwaitingReasons);
    }

    #[test]
    fn abandon_is_a_no_op_on_the_store() {
        let engine = ImportEngine::new(MemoryStore::new());
        baseline(&engine, grid_program(date(2025, 5, 9)));

        let handle = engine.begin(grid_program(date(2025, 6, 30)), as_of()).expect("begin");
        justify_all(&engine, &handle, "Slip");
        engine.abandon(&handle).expect("abandon");

        assert_eq!(engine.session_state(&handle).unwrap(), SessionState::Rejected);
        let stored = engine.store().get("GMP-P1").unwrap().unwrap();
        assert_eq!(stored.revision, 1);
        assert_eq!(stored.milestone("Design Gate").unwrap().target_date, date(2025, 5, 9));
    }

    #[test]
    fn malformed_hierarchy_names_offending_task() {
        let engine = ImportEngine::new(MemoryStore::new());
        let err = engine
            .begin(
                vec![
                    RawTask::new("1", "Outage Program", 1),
                    RawTask::new("7", "Orphan", 3).flagged(),
                ],
                as_of(),
            )
            .unwrap_err();

        match err {
            ImportError::MalformedHierarchy {
                task_id,
                level,
                issue,
                ..
            } => {
                assert_eq!(task_id, "7");
                assert_eq!(level, 3);
                assert_eq!(issue, HierarchyIssue::LevelSkipped { previous: 1 });
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(engine.store().list().unwrap().is_empty());
    }

    #[test]
    fn export_without_projects_is_empty_import() {
        let engine = ImportEngine::new(MemoryStore::new());
        assert_eq!(engine.begin(Vec::new(), as_of()).unwrap_err(), ImportError::EmptyImport);
    }

    #[test]
    fn audit_trail_keeps_reasons() {
        let engine = ImportEngine::new(MemoryStore::new());
        baseline(&engine, grid_program(date(2025, 5, 9)));

        let handle = engine.begin(grid_program(date(2025, 7, 1)), as_of()).expect("begin");
        let change = engine.pending_changes(&handle).unwrap().remove(0);
        engine
            .justify_with_impact(&handle, &change.id, "Transformer lead time", "Pushes energization")
            .expect("justify");
        engine.commit(&handle).expect("commit");

        let history = engine.store().history("GMP-P1").unwrap();
        assert_eq!(history.len(), 3);
        let last = history.last().unwrap();
        assert_eq!(last.revision, 2);
        assert_eq!(last.change.reason.as_deref(), Some("Transformer lead time"));
        assert_eq!(last.change.impact.as_deref(), Some("Pushes energization"));
    }
}

mod multi_project_tests {
    use super::*;

    fn two_projects() -> Vec<RawTask> {
        let mut tasks = grid_program(date(2025, 5, 9));
        tasks.extend([
            RawTask::new("10", "Asset Base Cleanup", 1),
            RawTask::new("11", "Records", 2),
            RawTask::new("12", "Register Closed", 3)
                .flagged()
                .with_finish(date(2025, 9, 30)),
        ]);
        tasks
    }

    #[test]
    fn each_project_commits_independently() {
        let engine = ImportEngine::new(MemoryStore::new());
        let handle = engine.begin(two_projects(), as_of()).expect("begin");

        for change in engine.pending_changes(&handle).unwrap() {
            if change.project_code == "GMP-P1" {
                engine.justify(&handle, &change.id, "Baseline").unwrap();
            }
        }

        let result = engine.commit(&handle).expect("commit");
        assert_eq!(result.committed.len(), 1);
        assert_eq!(result.committed[0].project_code, "GMP-P1");
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].project_code, "ABC-P1");
        assert_eq!(result.state, SessionState::AwaitingReasons);

        assert!(engine.store().get("GMP-P1").unwrap().is_some());
        assert!(engine.store().get("ABC-P1").unwrap().is_none());

        justify_all(&engine, &handle, "Baseline");
        let second = engine.commit_project(&handle, "ABC-P1").expect("commit project");
        assert_eq!(second.revision, 1);
        assert_eq!(engine.session_state(&handle).unwrap(), SessionState::Committed);
    }

    #[test]
    fn duplicate_supplied_codes_reject_the_import() {
        let engine = ImportEngine::new(MemoryStore::new());
        let err = engine
            .begin(
                vec![
                    RawTask::new("1", "North Feeder", 1).with_code("FDR-1"),
                    RawTask::new("2", "South Feeder", 1).with_code("FDR-1"),
                ],
                as_of(),
            )
            .unwrap_err();
        assert_eq!(
            err,
            ImportError::DuplicateProjectCode {
                code: "FDR-1".into()
            }
        );
    }

    #[test]
    fn derived_and_supplied_codes_never_share_a_snapshot() {
        let engine = ImportEngine::new(MemoryStore::new());
        let handle = engine
            .begin(
                vec![
                    RawTask::new("1", "Grid Modernization Program", 1),
                    RawTask::new("2", "Engineering", 2),
                    RawTask::new("3", "Gate A", 3).flagged().with_finish(date(2025, 6, 2)),
                    RawTask::new("4", "Other", 1).with_code("GMP-P1"),
                    RawTask::new("5", "Engineering", 2),
                    RawTask::new("6", "Gate B", 3).flagged().with_finish(date(2025, 7, 1)),
                ],
                as_of(),
            )
            .expect("begin");

        let codes: Vec<_> = engine
            .projects(&handle)
            .unwrap()
            .iter()
            .map(|p| p.code().to_string())
            .collect();
        assert_eq!(codes, vec!["GMP-P2", "GMP-P1"]);

        justify_all(&engine, &handle, "Baseline");
        let result = engine.commit(&handle).expect("commit");
        assert_eq!(result.committed.len(), 2);
        assert!(result.failed.is_empty());
        let stored = engine.store().get("GMP-P1").unwrap().unwrap();
        assert!(stored.milestone("Gate B").is_some());
        assert!(stored.milestone("Gate A").is_none());
    }
}

mod concurrency_tests {
    use super::*;

    #[test]
    fn stale_session_is_refused() {
        let engine = ImportEngine::new(MemoryStore::new());
        baseline(&engine, grid_program(date(2025, 5, 9)));

        let stale = engine.begin(grid_program(date(2025, 5, 20)), as_of()).expect("begin");
        let fresh = engine.begin(grid_program(date(2025, 6, 2)), as_of()).expect("begin");
        justify_all(&engine, &stale, "First view");
        justify_all(&engine, &fresh, "Second view");

        engine.commit(&fresh).expect("commit fresh");
        let err = engine.commit(&stale).unwrap_err();
        assert_eq!(
            err,
            ImportError::ConcurrentModification {
                project_code: "GMP-P1".into(),
                expected: 1,
                found: 2,
            }
        );

        let stored = engine.store().get("GMP-P1").unwrap().unwrap();
        assert_eq!(stored.revision, 2);
        assert_eq!(stored.milestone("Design Gate").unwrap().target_date, date(2025, 6, 2));
    }

    #[test]
    fn racing_commits_for_one_code_never_lose_updates() {
        let engine = Arc::new(ImportEngine::new(MemoryStore::new()));
        let handles: Vec<String> = (0..6)
            .map(|i| {
                let handle = engine
                    .begin(grid_program(date(2025, 5, 1 + i)), as_of())
                    .expect("begin");
                justify_all(engine.as_ref(), &handle, "Racing baseline");
                handle
            })
            .collect();

        let workers: Vec<_> = handles
            .into_iter()
            .map(|handle| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || engine.commit(&handle).is_ok())
            })
            .collect();
        let successes = workers
            .into_iter()
            .map(|w| w.join().unwrap())
            .filter(|ok| *ok)
            .count();

        // Every session diffed against "no snapshot"; only one may win.
        assert_eq!(successes, 1);
        let stored = engine.store().get("GMP-P1").unwrap().unwrap();
        assert_eq!(stored.revision, 1);
        assert_eq!(engine.store().history("GMP-P1").unwrap().len(), 2);
    }
}

mod sqlite_tests {
    use super::*;

    #[test]
    fn engine_over_sqlite_tracks_revisions() {
        let engine = ImportEngine::new(Database::open_in_memory().expect("db"));
        baseline(&engine, grid_program(date(2025, 5, 9)));

        let handle = engine.begin(grid_program(date(2025, 5, 30)), as_of()).expect("begin");
        justify_all(&engine, &handle, "Supplier delay");
        engine.commit(&handle).expect("commit");

        let list = engine.store().list().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].revision, 2);

        let history = engine.store().history("GMP-P1").unwrap();
        let shift = history.last().unwrap();
        assert_eq!(shift.change.kind, ChangeKind::DateShift);
        assert_eq!(shift.change.impact.as_deref(), Some("Moderate 21 day delay"));
    }
}
