//! Import subcommand for schedule-import
//!
//! Reads a schedule export, reports the changes against the stored
//! snapshots, applies reasons from a reasons file, and commits.

use crate::engine::ImportEngine;
use crate::error::ImportResult;
use crate::input::parse_date;
use crate::store::SnapshotStore;
use crate::types::{ChangeKind, ChangeRecord};
use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use clap::Args;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Arguments for the import subcommand
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Path to the schedule export (JSON or YAML, optionally gzipped)
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Date used to decide whether unfinished milestones are delayed
    #[arg(long, value_name = "DATE", value_parser = parse_as_of)]
    pub as_of: NaiveDate,

    /// YAML or JSON file with reasons for the detected changes
    ///
    /// Each entry names a change by `change` id, or by `project` and
    /// `milestone` with an optional `kind`, and gives a `reason` and an
    /// optional `impact`.
    #[arg(long, value_name = "FILE")]
    pub reasons: Option<PathBuf>,

    /// Report changes without committing anything
    #[arg(long)]
    pub dry_run: bool,
}

fn parse_as_of(raw: &str) -> std::result::Result<NaiveDate, String> {
    parse_date(raw).ok_or_else(|| format!("unrecognized date: {}", raw))
}

/// One reason supplied by the caller.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReasonEntry {
    #[serde(default)]
    pub change: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub milestone: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    pub reason: String,
    #[serde(default)]
    pub impact: Option<String>,
}

impl ReasonEntry {
    /// Whether this entry addresses `change`.
    pub fn matches(&self, change: &ChangeRecord) -> bool {
        if let Some(ref id) = self.change {
            return id == &change.id;
        }
        let (Some(project), Some(milestone)) = (&self.project, &self.milestone) else {
            return false;
        };
        if project != &change.project_code || milestone.trim() != change.milestone {
            return false;
        }
        match self.kind.as_deref() {
            None => true,
            Some(kind) => ChangeKind::from_str(kind) == Some(change.kind),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ReasonsDocument {
    Wrapped { reasons: Vec<ReasonEntry> },
    Bare(Vec<ReasonEntry>),
}

/// Parse a reasons document: a list of entries or `{ reasons: [...] }`.
pub fn parse_reasons(content: &str) -> Result<Vec<ReasonEntry>> {
    let value: Value = serde_yaml::from_str(content).context("reasons file is not valid YAML or JSON")?;
    let document: ReasonsDocument =
        serde_json::from_value(value).map_err(|e| anyhow!("invalid reasons document: {}", e))?;
    Ok(match document {
        ReasonsDocument::Wrapped { reasons } => reasons,
        ReasonsDocument::Bare(reasons) => reasons,
    })
}

pub fn load_reasons(path: &Path) -> Result<Vec<ReasonEntry>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read reasons file {}", path.display()))?;
    parse_reasons(&content)
}

/// Justify every pending change that a reason entry addresses.
///
/// The first matching entry wins. Returns how many changes were justified.
pub fn apply_reasons<S: SnapshotStore>(
    engine: &ImportEngine<S>,
    handle: &str,
    reasons: &[ReasonEntry],
) -> ImportResult<usize> {
    let mut applied = 0;
    let mut used = vec![false; reasons.len()];

    for change in engine.pending_changes(handle)? {
        let Some(index) = reasons.iter().position(|r| r.matches(&change)) else {
            continue;
        };
        let entry = &reasons[index];
        match entry.impact.as_deref() {
            Some(impact) => engine.justify_with_impact(handle, &change.id, &entry.reason, impact)?,
            None => engine.justify(handle, &change.id, &entry.reason)?,
        }
        debug!(change = %change.id, "Applied reason");
        used[index] = true;
        applied += 1;
    }

    for (entry, _) in reasons.iter().zip(&used).filter(|(_, used)| !**used) {
        warn!(
            change = entry.change.as_deref().unwrap_or("-"),
            project = entry.project.as_deref().unwrap_or("-"),
            milestone = entry.milestone.as_deref().unwrap_or("-"),
            "Reason does not match any pending change"
        );
    }

    Ok(applied)
}
