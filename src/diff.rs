//! Change detection between an import and the stored snapshot.
//!
//! Milestones are matched by (project code, name). Only the target date and
//! the status are compared; notes, percentages, and completion dates may
//! change silently.

use crate::codes::ChangeIds;
use crate::config::ImportConfig;
use crate::types::{
    ChangeKind, ChangeRecord, ChangeValue, Milestone, ScheduleShift, ShiftDirection,
    ShiftSeverity,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Thresholds for bucketing date shifts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffSettings {
    /// Shifts shorter than this many days are minor.
    pub minor_shift_days: i64,
    /// Shifts shorter than this many days are moderate; longer are significant.
    pub moderate_shift_days: i64,
}

impl Default for DiffSettings {
    fn default() -> Self {
        Self {
            minor_shift_days: 7,
            moderate_shift_days: 30,
        }
    }
}

impl From<&ImportConfig> for DiffSettings {
    fn from(config: &ImportConfig) -> Self {
        Self {
            minor_shift_days: config.minor_shift_days,
            moderate_shift_days: config.moderate_shift_days,
        }
    }
}

impl DiffSettings {
    /// Classify a move from `old` to `new`.
    pub fn shift(&self, old: NaiveDate, new: NaiveDate) -> ScheduleShift {
        let days = (new - old).num_days();
        let direction = if days > 0 {
            ShiftDirection::Delay
        } else {
            ShiftDirection::Acceleration
        };
        let magnitude = days.abs();
        let severity = if magnitude < self.minor_shift_days {
            ShiftSeverity::Minor
        } else if magnitude < self.moderate_shift_days {
            ShiftSeverity::Moderate
        } else {
            ShiftSeverity::Significant
        };
        ScheduleShift {
            days,
            direction,
            severity,
        }
    }

    /// Rebuild a shift from a stored day count.
    pub fn shift_from_days(&self, days: i64) -> ScheduleShift {
        let origin = NaiveDate::default();
        self.shift(origin, origin + chrono::Duration::days(days))
    }
}

/// Compare one project's new milestones with its prior snapshot.
///
/// Records come out in import order (ADDED, DATE_SHIFT, STATUS_CHANGE per
/// milestone), followed by REMOVED records in snapshot order. No prior
/// snapshot means every milestone is ADDED.
pub fn detect_changes(
    project_code: &str,
    prior: Option<&[Milestone]>,
    current: &[Milestone],
    settings: &DiffSettings,
    ids: &mut ChangeIds,
    detected_at: DateTime<Utc>,
) -> Vec<ChangeRecord> {
    let prior = prior.unwrap_or(&[]);
    let by_name: HashMap<&str, &Milestone> = prior.iter().map(|m| (m.name.as_str(), m)).collect();

    let mut record = |milestone: &str,
                      kind: ChangeKind,
                      old_value: Option<ChangeValue>,
                      new_value: Option<ChangeValue>,
                      shift: Option<ScheduleShift>| ChangeRecord {
        id: ids.next(project_code, milestone, kind),
        project_code: project_code.to_string(),
        milestone: milestone.to_string(),
        kind,
        old_value,
        new_value,
        shift,
        reason: None,
        impact: None,
        detected_at,
    };

    let mut changes = Vec::new();
    for milestone in current {
        let Some(old) = by_name.get(milestone.name.as_str()) else {
            changes.push(record(
                &milestone.name,
                ChangeKind::Added,
                None,
                Some(ChangeValue::Date(milestone.target_date)),
                None,
            ));
            continue;
        };

        if old.target_date != milestone.target_date {
            changes.push(record(
                &milestone.name,
                ChangeKind::DateShift,
                Some(ChangeValue::Date(old.target_date)),
                Some(ChangeValue::Date(milestone.target_date)),
                Some(settings.shift(old.target_date, milestone.target_date)),
            ));
        }
        if old.status != milestone.status {
            changes.push(record(
                &milestone.name,
                ChangeKind::StatusChange,
                Some(ChangeValue::Status(old.status)),
                Some(ChangeValue::Status(milestone.status)),
                None,
            ));
        }
    }

    let present: HashSet<&str> = current.iter().map(|m| m.name.as_str()).collect();
    for old in prior.iter().filter(|m| !present.contains(m.name.as_str())) {
        changes.push(record(
            &old.name,
            ChangeKind::Removed,
            Some(ChangeValue::Date(old.target_date)),
            None,
            None,
        ));
    }

    changes
}

/// Per-kind counts of a change list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    pub added: usize,
    pub removed: usize,
    pub date_shifts: usize,
    pub status_changes: usize,
}

impl ChangeSummary {
    pub fn of<'a>(changes: impl IntoIterator<Item = &'a ChangeRecord>) -> Self {
        let mut summary = Self::default();
        for change in changes {
            match change.kind {
                ChangeKind::Added => summary.added += 1,
                ChangeKind::Removed => summary.removed += 1,
                ChangeKind::DateShift => summary.date_shifts += 1,
                ChangeKind::StatusChange => summary.status_changes += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.added + self.removed + self.date_shifts + self.status_changes
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}
