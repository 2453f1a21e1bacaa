//! Node classification.
//!
//! Every outline node is labelled Project, Phase, Milestone, or Ordinary
//! Task from its own fields and whether it has children. Phases and ordinary
//! tasks are structural and never leave this module.

use crate::codes::{CodeAssignment, ProjectCodes};
use crate::error::{ImportError, ImportResult};
use crate::outline::{NodeId, OutlineNode, OutlineTree};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Project,
    Phase,
    Milestone,
    OrdinaryTask,
}

/// Classify one node.
///
/// Level 1 is always a Project. Any other node with children is a Phase,
/// as is every level-2 node. Leaves at level 3 and deeper are Milestones
/// when flagged or of zero duration, otherwise Ordinary Tasks.
pub fn classify(node: &OutlineNode) -> NodeKind {
    match node.level {
        1 => NodeKind::Project,
        _ if node.has_children() => NodeKind::Phase,
        2 => NodeKind::Phase,
        _ if node.milestone_flag || node.duration == Some(0.0) => NodeKind::Milestone,
        _ => NodeKind::OrdinaryTask,
    }
}

/// A project root with its milestone nodes in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedProject {
    pub code: String,
    pub root: NodeId,
    pub milestones: Vec<NodeId>,
}

/// Classify the whole tree and group milestones under their projects.
///
/// Milestone candidates without a name or target date degrade to ordinary
/// tasks. A repeated milestone name within one project keeps its first
/// occurrence.
pub fn classify_tree(tree: &OutlineTree) -> ImportResult<Vec<ClassifiedProject>> {
    let mut codes = ProjectCodes::reserving(
        tree.roots().iter().map(|&root| tree.node(root).code.as_deref()),
    );
    let mut projects = Vec::with_capacity(tree.roots().len());

    for &root in tree.roots() {
        let node = tree.node(root);
        let code = match codes.assign(node.code.as_deref(), &node.name) {
            CodeAssignment::Assigned(code) => code,
            CodeAssignment::DuplicateSupplied(code) => {
                return Err(ImportError::DuplicateProjectCode { code });
            }
        };

        let mut seen = HashSet::new();
        let mut milestones = Vec::new();
        for id in tree.descendants(root) {
            let candidate = tree.node(id);
            match classify(candidate) {
                NodeKind::Milestone => {}
                kind => {
                    debug!(task_id = %candidate.id, ?kind, "Skipping non-milestone node");
                    continue;
                }
            }
            let name = candidate.name.trim();
            if name.is_empty() || candidate.finish.is_none() {
                warn!(
                    task_id = %candidate.id,
                    project = %code,
                    "Milestone candidate lacks a name or target date; treating as ordinary task"
                );
                continue;
            }
            if !seen.insert(name.to_string()) {
                warn!(
                    task_id = %candidate.id,
                    project = %code,
                    milestone = %name,
                    "Duplicate milestone name within project; keeping first occurrence"
                );
                continue;
            }
            milestones.push(id);
        }

        debug!(project = %code, milestones = milestones.len(), "Classified project");
        projects.push(ClassifiedProject {
            code,
            root,
            milestones,
        });
    }

    Ok(projects)
}
