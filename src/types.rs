//! Core types for the schedule import engine.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status shared by milestones and projects.
///
/// Projects never derive `Delayed`; a project-level delay is a fact about its
/// milestones and is reported from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    NotStarted,
    InProgress,
    Completed,
    Delayed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::NotStarted => "NOT_STARTED",
            Status::InProgress => "IN_PROGRESS",
            Status::Completed => "COMPLETED",
            Status::Delayed => "DELAYED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "NOT_STARTED" => Some(Status::NotStarted),
            "IN_PROGRESS" => Some(Status::InProgress),
            "COMPLETED" => Some(Status::Completed),
            "DELAYED" => Some(Status::Delayed),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A milestone of one project, derived from a classified outline node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub project_code: String,
    pub name: String,
    pub target_date: NaiveDate,
    /// Set if and only if `status` is `Completed`.
    pub actual_completion_date: Option<NaiveDate>,
    /// Unrounded percentage in [0, 100].
    pub percent_complete: f64,
    pub status: Status,
    pub notes: Option<String>,
}

/// A level-1 outline entry reinterpreted as a tracked project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub code: String,
    pub name: String,
    pub start_date: Option<NaiveDate>,
    pub target_completion: Option<NaiveDate>,
    /// Mean of the milestones' percentages, unrounded.
    pub completion: f64,
    pub status: Status,
    pub milestones: Vec<Milestone>,
}

/// Kind of divergence between an import and the stored snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    DateShift,
    StatusChange,
    Added,
    Removed,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::DateShift => "DATE_SHIFT",
            ChangeKind::StatusChange => "STATUS_CHANGE",
            ChangeKind::Added => "ADDED",
            ChangeKind::Removed => "REMOVED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().replace('-', "_").as_str() {
            "DATE_SHIFT" => Some(ChangeKind::DateShift),
            "STATUS_CHANGE" => Some(ChangeKind::StatusChange),
            "ADDED" => Some(ChangeKind::Added),
            "REMOVED" => Some(ChangeKind::Removed),
            _ => None,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Old or new side of a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ChangeValue {
    Date(NaiveDate),
    Status(Status),
}

impl ChangeValue {
    /// Parse a stored value back into the shape implied by the change kind.
    pub fn parse(kind: ChangeKind, raw: &str) -> Option<Self> {
        match kind {
            ChangeKind::StatusChange => Status::from_str(raw).map(ChangeValue::Status),
            _ => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .map(ChangeValue::Date),
        }
    }
}

impl fmt::Display for ChangeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            ChangeValue::Status(s) => write!(f, "{}", s),
        }
    }
}

/// Direction of a target date shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShiftDirection {
    Delay,
    Acceleration,
}

/// Size bucket of a target date shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftSeverity {
    Minor,
    Moderate,
    Significant,
}

impl ShiftSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShiftSeverity::Minor => "minor",
            ShiftSeverity::Moderate => "moderate",
            ShiftSeverity::Significant => "significant",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "minor" => Some(ShiftSeverity::Minor),
            "moderate" => Some(ShiftSeverity::Moderate),
            "significant" => Some(ShiftSeverity::Significant),
            _ => None,
        }
    }
}

/// Schedule impact of a DATE_SHIFT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleShift {
    /// New date minus old date, in days.
    pub days: i64,
    pub direction: ShiftDirection,
    pub severity: ShiftSeverity,
}

impl ScheduleShift {
    /// Suggested impact text, e.g. "Moderate 12 day delay".
    pub fn impact_text(&self) -> String {
        let severity = match self.severity {
            ShiftSeverity::Minor => "Minor",
            ShiftSeverity::Moderate => "Moderate",
            ShiftSeverity::Significant => "Significant",
        };
        let direction = match self.direction {
            ShiftDirection::Delay => "delay",
            ShiftDirection::Acceleration => "acceleration",
        };
        format!("{} {} day {}", severity, self.days.abs(), direction)
    }
}

/// One detected divergence for one milestone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Session-unique identifier used to attach a reason.
    pub id: String,
    pub project_code: String,
    pub milestone: String,
    pub kind: ChangeKind,
    pub old_value: Option<ChangeValue>,
    pub new_value: Option<ChangeValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shift: Option<ScheduleShift>,
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impact: Option<String>,
    pub detected_at: DateTime<Utc>,
}

impl ChangeRecord {
    /// True once a non-blank reason is attached.
    pub fn is_justified(&self) -> bool {
        self.reason.as_deref().is_some_and(|r| !r.trim().is_empty())
    }
}

/// The accepted milestone state of one project after its latest commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub project_code: String,
    pub project_name: String,
    /// Starts at 1 and increases by one per commit.
    pub revision: u64,
    pub as_of: NaiveDate,
    pub start_date: Option<NaiveDate>,
    pub target_completion: Option<NaiveDate>,
    pub completion: f64,
    pub status: Status,
    pub committed_at: DateTime<Utc>,
    pub milestones: Vec<Milestone>,
}

impl ProjectSnapshot {
    pub fn milestone(&self, name: &str) -> Option<&Milestone> {
        self.milestones.iter().find(|m| m.name == name)
    }
}

/// Listing row for stored snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub project_code: String,
    pub project_name: String,
    pub revision: u64,
    pub milestone_count: usize,
    pub committed_at: DateTime<Utc>,
}

/// A committed change in the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub revision: u64,
    pub committed_at: DateTime<Utc>,
    #[serde(flatten)]
    pub change: ChangeRecord,
}
