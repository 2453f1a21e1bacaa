//! Snapshot persistence and the `SnapshotStore` implementation.

use super::audit::{insert_entries, load_history};
use super::{Database, date_from_sql, date_to_sql, opt_date_from_sql, time_from_ms, unknown_value};
use crate::store::SnapshotStore;
use crate::types::{AuditEntry, Milestone, ProjectSnapshot, SnapshotSummary, Status};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};

fn parse_status(column: usize, raw: &str) -> rusqlite::Result<Status> {
    Status::from_str(raw).ok_or_else(|| unknown_value(column, raw))
}

fn parse_milestone_row(project_code: &str, row: &Row) -> rusqlite::Result<Milestone> {
    let name: String = row.get(0)?;
    let target: String = row.get(1)?;
    let actual: Option<String> = row.get(2)?;
    let percent_complete: f64 = row.get(3)?;
    let status: String = row.get(4)?;
    let notes: Option<String> = row.get(5)?;

    Ok(Milestone {
        project_code: project_code.to_string(),
        name,
        target_date: date_from_sql(1, &target)?,
        actual_completion_date: opt_date_from_sql(2, actual)?,
        percent_complete,
        status: parse_status(4, &status)?,
        notes,
    })
}

fn load_snapshot(conn: &Connection, project_code: &str) -> Result<Option<ProjectSnapshot>> {
    let header = conn
        .query_row(
            "SELECT project_name, revision, as_of, start_date, target_completion,
                    completion, status, committed_at
             FROM snapshots WHERE project_code = ?1",
            params![project_code],
            |row| {
                let as_of: String = row.get(2)?;
                let status: String = row.get(6)?;
                let revision: i64 = row.get(1)?;
                Ok(ProjectSnapshot {
                    project_code: project_code.to_string(),
                    project_name: row.get(0)?,
                    revision: revision as u64,
                    as_of: date_from_sql(2, &as_of)?,
                    start_date: opt_date_from_sql(3, row.get(3)?)?,
                    target_completion: opt_date_from_sql(4, row.get(4)?)?,
                    completion: row.get(5)?,
                    status: parse_status(6, &status)?,
                    committed_at: time_from_ms(row.get(7)?),
                    milestones: Vec::new(),
                })
            },
        )
        .optional()?;

    let Some(mut snapshot) = header else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT name, target_date, actual_completion_date, percent_complete, status, notes
         FROM snapshot_milestones
         WHERE project_code = ?1
         ORDER BY position",
    )?;
    snapshot.milestones = stmt
        .query_map(params![project_code], |row| parse_milestone_row(project_code, row))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(Some(snapshot))
}

fn write_snapshot(conn: &Connection, snapshot: &ProjectSnapshot) -> Result<()> {
    conn.execute(
        "INSERT INTO snapshots
            (project_code, project_name, revision, as_of, start_date, target_completion,
             completion, status, committed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(project_code) DO UPDATE SET
            project_name = excluded.project_name,
            revision = excluded.revision,
            as_of = excluded.as_of,
            start_date = excluded.start_date,
            target_completion = excluded.target_completion,
            completion = excluded.completion,
            status = excluded.status,
            committed_at = excluded.committed_at",
        params![
            &snapshot.project_code,
            &snapshot.project_name,
            snapshot.revision as i64,
            date_to_sql(snapshot.as_of),
            snapshot.start_date.map(date_to_sql),
            snapshot.target_completion.map(date_to_sql),
            snapshot.completion,
            snapshot.status.as_str(),
            snapshot.committed_at.timestamp_millis(),
        ],
    )?;

    // Replaced wholesale, never merged
    conn.execute(
        "DELETE FROM snapshot_milestones WHERE project_code = ?1",
        params![&snapshot.project_code],
    )?;

    let mut stmt = conn.prepare(
        "INSERT INTO snapshot_milestones
            (project_code, position, name, target_date, actual_completion_date,
             percent_complete, status, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;
    for (position, milestone) in snapshot.milestones.iter().enumerate() {
        stmt.execute(params![
            &snapshot.project_code,
            position as i64,
            &milestone.name,
            date_to_sql(milestone.target_date),
            milestone.actual_completion_date.map(date_to_sql),
            milestone.percent_complete,
            milestone.status.as_str(),
            &milestone.notes,
        ])?;
    }

    Ok(())
}

impl SnapshotStore for Database {
    fn get(&self, project_code: &str) -> Result<Option<ProjectSnapshot>> {
        self.with_conn(|conn| load_snapshot(conn, project_code))
    }

    fn put(&self, snapshot: &ProjectSnapshot) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            write_snapshot(&tx, snapshot)?;
            tx.commit()?;
            Ok(())
        })
    }

    fn append(&self, project_code: &str, entries: &[AuditEntry]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            insert_entries(&tx, project_code, entries)?;
            tx.commit()?;
            Ok(())
        })
    }

    fn history(&self, project_code: &str) -> Result<Vec<AuditEntry>> {
        self.with_conn(|conn| load_history(conn, project_code))
    }

    fn list(&self) -> Result<Vec<SnapshotSummary>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT s.project_code, s.project_name, s.revision, s.committed_at,
                        (SELECT COUNT(*) FROM snapshot_milestones m
                         WHERE m.project_code = s.project_code)
                 FROM snapshots s
                 ORDER BY s.project_code",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    let revision: i64 = row.get(2)?;
                    let count: i64 = row.get(4)?;
                    Ok(SnapshotSummary {
                        project_code: row.get(0)?,
                        project_name: row.get(1)?,
                        revision: revision as u64,
                        milestone_count: count as usize,
                        committed_at: time_from_ms(row.get(3)?),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    fn commit(&self, snapshot: &ProjectSnapshot, entries: &[AuditEntry]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            write_snapshot(&tx, snapshot)?;
            insert_entries(&tx, &snapshot.project_code, entries)?;
            tx.commit()?;
            Ok(())
        })
    }
}
