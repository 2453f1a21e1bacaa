//! Structured error types for import sessions.

use crate::types::ChangeKind;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Structural failures (fatal to the session)
    MalformedHierarchy,
    EmptyImport,
    UnreadableInput,
    DuplicateProjectCode,

    // Recoverable
    UnjustifiedChanges,
    EmptyReason,
    ConcurrentModification,

    // Caller errors
    SessionNotFound,
    ChangeNotFound,
    ProjectNotFound,
    InvalidState,

    // Internal errors
    StorageError,
}

/// Why an outline sequence could not be turned into a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum HierarchyIssue {
    /// The first entry is not at level 1.
    FirstNotTopLevel,
    /// Outline levels start at 1.
    ZeroLevel,
    /// The level increased by more than one over the previous entry.
    LevelSkipped { previous: u32 },
}

impl fmt::Display for HierarchyIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HierarchyIssue::FirstNotTopLevel => write!(f, "first entry must be at outline level 1"),
            HierarchyIssue::ZeroLevel => write!(f, "outline level must be at least 1"),
            HierarchyIssue::LevelSkipped { previous } => {
                write!(f, "level rises more than one above previous level {}", previous)
            }
        }
    }
}

/// A change that still lacks a reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnjustifiedChange {
    pub change_id: String,
    pub project_code: String,
    pub milestone: String,
    pub kind: ChangeKind,
}

/// Failures surfaced by the import engine.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ImportError {
    #[error("malformed hierarchy at task {task_id} (entry {position}, level {level}): {issue}")]
    MalformedHierarchy {
        task_id: String,
        /// Zero-based position in the export.
        position: usize,
        level: u32,
        issue: HierarchyIssue,
    },

    #[error("import contains no project-level (outline level 1) tasks")]
    EmptyImport,

    #[error("unreadable input: {0}")]
    UnreadableInput(String),

    #[error("project code {code} is supplied by more than one top-level task")]
    DuplicateProjectCode { code: String },

    #[error("{} change(s) still need a reason", .0.len())]
    UnjustifiedChanges(Vec<UnjustifiedChange>),

    #[error("reason for change {change_id} must not be empty")]
    EmptyReason { change_id: String },

    #[error(
        "snapshot for {project_code} moved from revision {expected} to {found} since it was diffed"
    )]
    ConcurrentModification {
        project_code: String,
        /// Revision the diff was computed against (0 = no snapshot).
        expected: u64,
        found: u64,
    },

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("change not found: {0}")]
    ChangeNotFound(String),

    #[error("project {0} is not pending in this session")]
    ProjectNotFound(String),

    #[error("session {session} is {state}; expected {expected}")]
    InvalidState {
        session: String,
        state: String,
        expected: String,
    },

    #[error("storage error: {0}")]
    Storage(String),
}

impl ImportError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ImportError::MalformedHierarchy { .. } => ErrorCode::MalformedHierarchy,
            ImportError::EmptyImport => ErrorCode::EmptyImport,
            ImportError::UnreadableInput(_) => ErrorCode::UnreadableInput,
            ImportError::DuplicateProjectCode { .. } => ErrorCode::DuplicateProjectCode,
            ImportError::UnjustifiedChanges(_) => ErrorCode::UnjustifiedChanges,
            ImportError::EmptyReason { .. } => ErrorCode::EmptyReason,
            ImportError::ConcurrentModification { .. } => ErrorCode::ConcurrentModification,
            ImportError::SessionNotFound(_) => ErrorCode::SessionNotFound,
            ImportError::ChangeNotFound(_) => ErrorCode::ChangeNotFound,
            ImportError::ProjectNotFound(_) => ErrorCode::ProjectNotFound,
            ImportError::InvalidState { .. } => ErrorCode::InvalidState,
            ImportError::Storage(_) => ErrorCode::StorageError,
        }
    }

    /// Whether the session survives this error and the call can be retried.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ImportError::UnjustifiedChanges(_)
                | ImportError::EmptyReason { .. }
                | ImportError::ChangeNotFound(_)
        )
    }

    pub fn storage(err: impl fmt::Display) -> Self {
        ImportError::Storage(err.to_string())
    }

    /// Structured form for machine-readable output.
    pub fn report(&self) -> ErrorReport {
        let report = ErrorReport::new(self.code(), self.to_string());
        match self {
            ImportError::MalformedHierarchy {
                task_id, level, ..
            } => report
                .with_field(task_id.clone())
                .with_details(format!("outline level {}", level)),
            ImportError::UnjustifiedChanges(pending) => report.with_details(
                pending
                    .iter()
                    .map(|c| c.change_id.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
            ImportError::EmptyReason { change_id } => report.with_field(change_id.clone()),
            ImportError::ConcurrentModification { project_code, .. }
            | ImportError::DuplicateProjectCode { code: project_code } => {
                report.with_field(project_code.clone())
            }
            _ => report,
        }
    }
}

/// Serializable error body.
#[derive(Debug, Serialize)]
pub struct ErrorReport {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorReport {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: None,
            details: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Result type for engine operations.
pub type ImportResult<T> = std::result::Result<T, ImportError>;
