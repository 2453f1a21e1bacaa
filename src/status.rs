//! Status derivation for milestones and projects.
//!
//! Derivation is a pure function of the node's fields and the caller's
//! as-of date. Percentages stay unrounded here; rounding happens only when
//! values are rendered.

use crate::outline::OutlineNode;
use crate::types::{Milestone, Project, Status};
use chrono::NaiveDate;
use serde::Serialize;

/// Four-state mapping of a percentage, without delay detection.
pub fn status_for_percent(percent: f64) -> Status {
    if percent >= 100.0 {
        Status::Completed
    } else if percent > 0.0 {
        Status::InProgress
    } else {
        Status::NotStarted
    }
}

/// Milestone status: the percentage mapping, overridden to `Delayed` when an
/// unfinished milestone's target date is strictly before `as_of`.
pub fn milestone_status(percent: f64, target: NaiveDate, as_of: NaiveDate) -> Status {
    match status_for_percent(percent) {
        Status::NotStarted | Status::InProgress if target < as_of => Status::Delayed,
        status => status,
    }
}

/// Build a milestone from a classified node. Returns `None` when the node
/// has no target date.
pub fn derive_milestone(node: &OutlineNode, project_code: &str, as_of: NaiveDate) -> Option<Milestone> {
    let target_date = node.finish?;
    let status = milestone_status(node.percent_complete, target_date, as_of);
    let actual_completion_date = match status {
        Status::Completed => Some(node.actual_finish.unwrap_or(target_date)),
        _ => None,
    };

    Some(Milestone {
        project_code: project_code.to_string(),
        name: node.name.trim().to_string(),
        target_date,
        actual_completion_date,
        percent_complete: node.percent_complete,
        status,
        notes: node.notes.clone().filter(|n| !n.trim().is_empty()),
    })
}

/// Arithmetic mean of milestone percentages; 0 without milestones.
pub fn project_completion(milestones: &[Milestone]) -> f64 {
    if milestones.is_empty() {
        return 0.0;
    }
    milestones.iter().map(|m| m.percent_complete).sum::<f64>() / milestones.len() as f64
}

/// Build a project from its root node and derived milestones.
pub fn derive_project(root: &OutlineNode, code: &str, milestones: Vec<Milestone>) -> Project {
    let completion = project_completion(&milestones);
    Project {
        code: code.to_string(),
        name: root.name.trim().to_string(),
        start_date: root.start,
        target_completion: root.finish,
        completion,
        status: status_for_percent(completion),
        milestones,
    }
}

/// Round a percentage for display.
pub fn round_percent(percent: f64) -> u8 {
    percent.clamp(0.0, 100.0).round() as u8
}

/// Per-status milestone counts for one project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MilestoneHealth {
    pub completed: usize,
    pub in_progress: usize,
    pub not_started: usize,
    pub delayed: usize,
}

impl MilestoneHealth {
    pub fn of(milestones: &[Milestone]) -> Self {
        let mut health = Self::default();
        for milestone in milestones {
            match milestone.status {
                Status::Completed => health.completed += 1,
                Status::InProgress => health.in_progress += 1,
                Status::NotStarted => health.not_started += 1,
                Status::Delayed => health.delayed += 1,
            }
        }
        health
    }

    pub fn total(&self) -> usize {
        self.completed + self.in_progress + self.not_started + self.delayed
    }
}
