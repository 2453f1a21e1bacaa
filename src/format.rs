//! Output formatting for markdown and JSON.
//!
//! Percentages are rounded to whole numbers here and nowhere else.

use crate::diff::ChangeSummary;
use crate::engine::CommittedResult;
use crate::session::{DiffState, ProjectDiff};
use crate::status::{MilestoneHealth, round_percent};
use crate::types::{AuditEntry, ChangeRecord, ProjectSnapshot, SnapshotSummary, Status};
use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    #[default]
    Markdown,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "markdown" | "md" => Some(OutputFormat::Markdown),
            _ => None,
        }
    }
}

/// Presentation view of one project in a session.
#[derive(Debug, Serialize)]
pub struct ProjectReport<'a> {
    pub code: &'a str,
    pub name: &'a str,
    pub status: Status,
    /// Whole-number completion percentage.
    pub completion: u8,
    pub baseline_revision: u64,
    pub state: DiffState,
    pub health: MilestoneHealth,
    pub summary: ChangeSummary,
    pub changes: &'a [ChangeRecord],
}

impl<'a> From<&'a ProjectDiff> for ProjectReport<'a> {
    fn from(diff: &'a ProjectDiff) -> Self {
        Self {
            code: &diff.project.code,
            name: &diff.project.name,
            status: diff.project.status,
            completion: round_percent(diff.project.completion),
            baseline_revision: diff.baseline_revision,
            state: diff.state,
            health: diff.health(),
            summary: diff.summary(),
            changes: &diff.changes,
        }
    }
}

#[derive(Debug, Serialize)]
struct SessionReport<'a> {
    session: &'a str,
    as_of: NaiveDate,
    projects: Vec<ProjectReport<'a>>,
}

#[derive(Debug, Serialize)]
struct MilestoneView<'a> {
    name: &'a str,
    target_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    actual_completion_date: Option<NaiveDate>,
    percent_complete: u8,
    status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct SnapshotReport<'a> {
    project_code: &'a str,
    project_name: &'a str,
    revision: u64,
    as_of: NaiveDate,
    start_date: Option<NaiveDate>,
    target_completion: Option<NaiveDate>,
    completion: u8,
    status: Status,
    committed_at: String,
    health: MilestoneHealth,
    milestones: Vec<MilestoneView<'a>>,
}

impl<'a> From<&'a ProjectSnapshot> for SnapshotReport<'a> {
    fn from(snapshot: &'a ProjectSnapshot) -> Self {
        Self {
            project_code: &snapshot.project_code,
            project_name: &snapshot.project_name,
            revision: snapshot.revision,
            as_of: snapshot.as_of,
            start_date: snapshot.start_date,
            target_completion: snapshot.target_completion,
            completion: round_percent(snapshot.completion),
            status: snapshot.status,
            committed_at: snapshot.committed_at.to_rfc3339(),
            health: MilestoneHealth::of(&snapshot.milestones),
            milestones: snapshot
                .milestones
                .iter()
                .map(|m| MilestoneView {
                    name: &m.name,
                    target_date: m.target_date,
                    actual_completion_date: m.actual_completion_date,
                    percent_complete: round_percent(m.percent_complete),
                    status: m.status,
                    notes: m.notes.as_deref(),
                })
                .collect(),
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Render the projects of an open session with their pending changes.
pub fn render_session(
    format: OutputFormat,
    session: &str,
    as_of: NaiveDate,
    diffs: &[ProjectDiff],
) -> Result<String> {
    match format {
        OutputFormat::Json => to_json(&SessionReport {
            session,
            as_of,
            projects: diffs.iter().map(ProjectReport::from).collect(),
        }),
        OutputFormat::Markdown => Ok(format_session_markdown(session, as_of, diffs)),
    }
}

pub fn render_commit(format: OutputFormat, result: &CommittedResult) -> Result<String> {
    match format {
        OutputFormat::Json => to_json(result),
        OutputFormat::Markdown => Ok(format_commit_markdown(result)),
    }
}

pub fn render_snapshot(format: OutputFormat, snapshot: &ProjectSnapshot) -> Result<String> {
    match format {
        OutputFormat::Json => to_json(&SnapshotReport::from(snapshot)),
        OutputFormat::Markdown => Ok(format_snapshot_markdown(snapshot)),
    }
}

pub fn render_history(format: OutputFormat, project_code: &str, entries: &[AuditEntry]) -> Result<String> {
    match format {
        OutputFormat::Json => to_json(&entries),
        OutputFormat::Markdown => Ok(format_history_markdown(project_code, entries)),
    }
}

pub fn render_projects(format: OutputFormat, projects: &[SnapshotSummary]) -> Result<String> {
    match format {
        OutputFormat::Json => to_json(&projects),
        OutputFormat::Markdown => Ok(format_projects_markdown(projects)),
    }
}

fn format_health(health: &MilestoneHealth) -> String {
    format!(
        "{} completed, {} in progress, {} not started, {} delayed",
        health.completed, health.in_progress, health.not_started, health.delayed
    )
}

fn format_value(value: Option<impl std::fmt::Display>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn format_change_line(change: &ChangeRecord) -> String {
    let mut line = format!(
        "- `{}` **{}** {}: {} -> {}",
        change.id,
        change.kind,
        change.milestone,
        format_value(change.old_value),
        format_value(change.new_value),
    );
    if let Some(shift) = change.shift {
        line.push_str(&format!(" ({})", shift.impact_text()));
    }
    match change.reason.as_deref().filter(|r| !r.trim().is_empty()) {
        Some(reason) => line.push_str(&format!("\n  - reason: {}", reason)),
        None => line.push_str("\n  - reason: _required_"),
    }
    if let Some(ref impact) = change.impact {
        line.push_str(&format!("\n  - impact: {}", impact));
    }
    line.push('\n');
    line
}

/// Format an open session as markdown.
pub fn format_session_markdown(session: &str, as_of: NaiveDate, diffs: &[ProjectDiff]) -> String {
    let mut md = String::new();

    md.push_str(&format!("# Import `{}` (as of {})\n\n", session, as_of));

    for diff in diffs {
        let report = ProjectReport::from(diff);
        md.push_str(&format!("## {} `{}`\n", report.name, report.code));
        md.push_str(&format!(
            "- **status**: {} ({}% complete)\n",
            report.status, report.completion
        ));
        md.push_str(&format!("- **milestones**: {}\n", format_health(&report.health)));
        match report.baseline_revision {
            0 => md.push_str("- **baseline**: none (first import)\n"),
            revision => md.push_str(&format!("- **baseline**: revision {}\n", revision)),
        }
        match report.state {
            DiffState::Pending => {}
            DiffState::Committed { revision } => {
                md.push_str(&format!("- **committed**: revision {}\n", revision))
            }
            DiffState::Conflicted => {
                md.push_str("- **conflicted**: snapshot changed since diffing; re-import\n")
            }
        }

        if report.changes.is_empty() {
            md.push_str("\nNo changes.\n\n");
            continue;
        }

        let summary = report.summary;
        md.push_str(&format!(
            "\n### Changes ({}: {} added, {} removed, {} date shifts, {} status changes)\n\n",
            summary.total(),
            summary.added,
            summary.removed,
            summary.date_shifts,
            summary.status_changes
        ));
        for change in report.changes {
            md.push_str(&format_change_line(change));
        }
        md.push('\n');
    }

    md
}

/// Format a commit result as markdown.
pub fn format_commit_markdown(result: &CommittedResult) -> String {
    let mut md = String::new();

    md.push_str(&format!("# Commit `{}` ({})\n\n", result.session, result.state));

    for project in &result.committed {
        md.push_str(&format!(
            "- committed {} `{}` at revision {} ({} changes)\n",
            project.project_name,
            project.project_code,
            project.revision,
            project.changes.len()
        ));
    }
    for failure in &result.failed {
        md.push_str(&format!(
            "- **not committed** `{}`: {}\n",
            failure.project_code, failure.error.message
        ));
    }
    if result.committed.is_empty() && result.failed.is_empty() {
        md.push_str("Nothing to commit.\n");
    }

    md
}

/// Format a stored snapshot as markdown.
pub fn format_snapshot_markdown(snapshot: &ProjectSnapshot) -> String {
    let mut md = String::new();

    md.push_str(&format!(
        "# {} `{}`\n",
        snapshot.project_name, snapshot.project_code
    ));
    md.push_str(&format!(
        "- **revision**: {} (committed {})\n",
        snapshot.revision,
        snapshot.committed_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    md.push_str(&format!("- **as of**: {}\n", snapshot.as_of));
    md.push_str(&format!(
        "- **status**: {} ({}% complete)\n",
        snapshot.status,
        round_percent(snapshot.completion)
    ));
    if let Some(start) = snapshot.start_date {
        md.push_str(&format!("- **start**: {}\n", start));
    }
    if let Some(target) = snapshot.target_completion {
        md.push_str(&format!("- **target completion**: {}\n", target));
    }
    md.push_str(&format!(
        "- **milestones**: {}\n",
        format_health(&MilestoneHealth::of(&snapshot.milestones))
    ));

    if !snapshot.milestones.is_empty() {
        md.push_str("\n| Milestone | Target | Status | % | Completed |\n");
        md.push_str("|---|---|---|---|---|\n");
        for m in &snapshot.milestones {
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                m.name,
                m.target_date,
                m.status,
                round_percent(m.percent_complete),
                format_value(m.actual_completion_date)
            ));
        }
    }

    md
}

/// Format a project's audit trail as markdown, grouped by revision.
pub fn format_history_markdown(project_code: &str, entries: &[AuditEntry]) -> String {
    let mut md = String::new();

    md.push_str(&format!("# History `{}` ({} changes)\n", project_code, entries.len()));

    let mut current = None;
    for entry in entries {
        if current != Some(entry.revision) {
            current = Some(entry.revision);
            md.push_str(&format!(
                "\n## Revision {} ({})\n\n",
                entry.revision,
                entry.committed_at.format("%Y-%m-%d %H:%M:%S UTC")
            ));
        }
        md.push_str(&format_change_line(&entry.change));
    }

    md
}

/// Format the stored project list as markdown.
pub fn format_projects_markdown(projects: &[SnapshotSummary]) -> String {
    let mut md = String::new();

    md.push_str(&format!("# Projects ({})\n\n", projects.len()));
    for project in projects {
        md.push_str(&format!(
            "- `{}` {} (revision {}, {} milestones, committed {})\n",
            project.project_code,
            project.project_name,
            project.revision,
            project.milestone_count,
            project.committed_at.format("%Y-%m-%d")
        ));
    }

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChangeKind, ChangeValue, Milestone, ScheduleShift, ShiftDirection, ShiftSeverity};
    use chrono::{TimeZone, Utc};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn snapshot() -> ProjectSnapshot {
        ProjectSnapshot {
            project_code: "GMP-P1".into(),
            project_name: "Grid Modernization Program".into(),
            revision: 3,
            as_of: date(2025, 4, 1),
            start_date: Some(date(2025, 1, 6)),
            target_completion: None,
            completion: 66.666,
            status: Status::InProgress,
            committed_at: Utc.with_ymd_and_hms(2025, 4, 1, 9, 30, 0).unwrap(),
            milestones: vec![Milestone {
                project_code: "GMP-P1".into(),
                name: "Design Review".into(),
                target_date: date(2025, 3, 14),
                actual_completion_date: None,
                percent_complete: 33.4,
                status: Status::Delayed,
                notes: None,
            }],
        }
    }

    #[test]
    fn default_format_is_markdown() {
        assert_eq!(OutputFormat::default(), OutputFormat::Markdown);
        assert_eq!(OutputFormat::from_str("MD"), Some(OutputFormat::Markdown));
        assert_eq!(OutputFormat::from_str("xml"), None);
    }

    #[test]
    fn snapshot_markdown_rounds_percentages() {
        let md = format_snapshot_markdown(&snapshot());
        assert!(md.contains("IN_PROGRESS (67% complete)"));
        assert!(md.contains("| Design Review | 2025-03-14 | DELAYED | 33 | - |"));
        assert!(md.contains("1 delayed"));
    }

    #[test]
    fn snapshot_json_rounds_percentages() {
        let json = render_snapshot(OutputFormat::Json, &snapshot()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["completion"], 67);
        assert_eq!(value["milestones"][0]["percent_complete"], 33);
        assert_eq!(value["health"]["delayed"], 1);
    }

    #[test]
    fn history_groups_by_revision() {
        let change = ChangeRecord {
            id: "CHG-GMP-P1-DESIGN-REVIEW-DATE-SHIFT".into(),
            project_code: "GMP-P1".into(),
            milestone: "Design Review".into(),
            kind: ChangeKind::DateShift,
            old_value: Some(ChangeValue::Date(date(2025, 3, 9))),
            new_value: Some(ChangeValue::Date(date(2025, 3, 14))),
            shift: Some(ScheduleShift {
                days: 5,
                direction: ShiftDirection::Delay,
                severity: ShiftSeverity::Minor,
            }),
            reason: Some("Permit delay".into()),
            impact: None,
            detected_at: Utc.with_ymd_and_hms(2025, 4, 1, 9, 0, 0).unwrap(),
        };
        let entry = |revision| AuditEntry {
            revision,
            committed_at: Utc.with_ymd_and_hms(2025, 4, 1, 9, 30, 0).unwrap(),
            change: change.clone(),
        };

        let md = format_history_markdown("GMP-P1", &[entry(2), entry(2), entry(3)]);
        assert_eq!(md.matches("## Revision").count(), 2);
        assert!(md.contains("2025-03-09 -> 2025-03-14 (Minor 5 day delay)"));
        assert!(md.contains("reason: Permit delay"));
    }
}
