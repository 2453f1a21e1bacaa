//! Append-only change log.

use super::{time_from_ms, unknown_value};
use crate::diff::DiffSettings;
use crate::types::{
    AuditEntry, ChangeKind, ChangeRecord, ChangeValue, ScheduleShift, ShiftDirection,
    ShiftSeverity,
};
use anyhow::Result;
use rusqlite::{Connection, Row, params};

pub(crate) fn insert_entries(conn: &Connection, project_code: &str, entries: &[AuditEntry]) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO change_log
            (project_code, revision, change_id, milestone, kind, old_value, new_value,
             shift_days, shift_severity, reason, impact, detected_at, committed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
    )?;

    for entry in entries {
        let change = &entry.change;
        stmt.execute(params![
            project_code,
            entry.revision as i64,
            &change.id,
            &change.milestone,
            change.kind.as_str(),
            change.old_value.map(|v| v.to_string()),
            change.new_value.map(|v| v.to_string()),
            change.shift.map(|s| s.days),
            change.shift.map(|s| s.severity.as_str()),
            change.reason.as_deref().unwrap_or_default(),
            &change.impact,
            change.detected_at.timestamp_millis(),
            entry.committed_at.timestamp_millis(),
        ])?;
    }

    Ok(())
}

fn parse_value(column: usize, kind: ChangeKind, raw: Option<String>) -> rusqlite::Result<Option<ChangeValue>> {
    raw.map(|s| ChangeValue::parse(kind, &s).ok_or_else(|| unknown_value(column, &s)))
        .transpose()
}

fn parse_shift(days: Option<i64>, severity: Option<String>) -> Option<ScheduleShift> {
    let days = days?;
    let severity = severity
        .as_deref()
        .and_then(ShiftSeverity::from_str)
        .unwrap_or_else(|| DiffSettings::default().shift_from_days(days).severity);
    Some(ScheduleShift {
        days,
        direction: if days > 0 {
            ShiftDirection::Delay
        } else {
            ShiftDirection::Acceleration
        },
        severity,
    })
}

fn parse_entry_row(project_code: &str, row: &Row) -> rusqlite::Result<AuditEntry> {
    let revision: i64 = row.get(0)?;
    let kind_str: String = row.get(3)?;
    let kind = ChangeKind::from_str(&kind_str).ok_or_else(|| unknown_value(3, &kind_str))?;
    let reason: String = row.get(8)?;

    Ok(AuditEntry {
        revision: revision as u64,
        committed_at: time_from_ms(row.get(11)?),
        change: ChangeRecord {
            id: row.get(1)?,
            project_code: project_code.to_string(),
            milestone: row.get(2)?,
            kind,
            old_value: parse_value(4, kind, row.get(4)?)?,
            new_value: parse_value(5, kind, row.get(5)?)?,
            shift: parse_shift(row.get(6)?, row.get(7)?),
            reason: Some(reason),
            impact: row.get(9)?,
            detected_at: time_from_ms(row.get(10)?),
        },
    })
}

pub(crate) fn load_history(conn: &Connection, project_code: &str) -> Result<Vec<AuditEntry>> {
    let mut stmt = conn.prepare(
        "SELECT revision, change_id, milestone, kind, old_value, new_value,
                shift_days, shift_severity, reason, impact, detected_at, committed_at
         FROM change_log
         WHERE project_code = ?1
         ORDER BY committed_at, id",
    )?;
    let entries = stmt
        .query_map(params![project_code], |row| parse_entry_row(project_code, row))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entries)
}
