//! Outline tree reconstruction.
//!
//! A node's parent is the nearest preceding entry whose outline level is
//! exactly one less. The level may rise by at most one between consecutive
//! entries, and the first entry must be at level 1.

use crate::error::{HierarchyIssue, ImportError, ImportResult};
use crate::input::RawTask;
use chrono::NaiveDate;

/// Index of a node within its [`OutlineTree`].
pub type NodeId = usize;

/// One task or summary entry, linked into the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlineNode {
    pub id: String,
    pub name: String,
    pub level: u32,
    pub start: Option<NaiveDate>,
    pub finish: Option<NaiveDate>,
    pub actual_finish: Option<NaiveDate>,
    pub duration: Option<f64>,
    pub percent_complete: f64,
    pub milestone_flag: bool,
    pub notes: Option<String>,
    pub code: Option<String>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl OutlineNode {
    fn from_raw(task: RawTask, parent: Option<NodeId>) -> Self {
        Self {
            id: task.id,
            name: task.name,
            level: task.outline_level,
            start: task.start,
            finish: task.finish,
            actual_finish: task.actual_finish,
            duration: task.duration,
            percent_complete: task.percent_complete,
            milestone_flag: task.milestone,
            notes: task.notes,
            code: task.code,
            parent,
            children: Vec::new(),
        }
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

/// Forest of outline nodes in document order.
#[derive(Debug, Clone, Default)]
pub struct OutlineTree {
    nodes: Vec<OutlineNode>,
    roots: Vec<NodeId>,
}

impl OutlineTree {
    /// Reconstruct parent/child edges from an ordered export.
    pub fn build(tasks: Vec<RawTask>) -> ImportResult<Self> {
        let mut tree = OutlineTree {
            nodes: Vec::with_capacity(tasks.len()),
            roots: Vec::new(),
        };
        // open[i] is the most recent node at level i + 1 on the current path.
        let mut open: Vec<NodeId> = Vec::new();

        for (position, task) in tasks.into_iter().enumerate() {
            let level = task.outline_level;
            let issue = if level == 0 {
                Some(HierarchyIssue::ZeroLevel)
            } else if position == 0 && level != 1 {
                Some(HierarchyIssue::FirstNotTopLevel)
            } else if level as usize > open.len() + 1 {
                Some(HierarchyIssue::LevelSkipped {
                    previous: open.len() as u32,
                })
            } else {
                None
            };
            if let Some(issue) = issue {
                return Err(ImportError::MalformedHierarchy {
                    task_id: task.id,
                    position,
                    level,
                    issue,
                });
            }

            let depth = level as usize - 1;
            open.truncate(depth);
            let parent = open.last().copied();
            let id = tree.nodes.len();
            tree.nodes.push(OutlineNode::from_raw(task, parent));
            match parent {
                Some(p) => tree.nodes[p].children.push(id),
                None => tree.roots.push(id),
            }
            open.push(id);
        }

        Ok(tree)
    }

    pub fn node(&self, id: NodeId) -> &OutlineNode {
        &self.nodes[id]
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All descendants of `id` in document (pre-)order, excluding `id`.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[id].children.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.nodes[next].children.iter().rev().copied());
        }
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &OutlineNode)> {
        self.nodes.iter().enumerate()
    }
}
