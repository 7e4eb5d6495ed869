// src/errors.rs

//! Crate-wide error type and helpers.

use thiserror::Error;

use crate::model::{ApprovalId, ProjectId, TaskId};
use crate::types::{TaskAction, TaskStatus};

/// Coarse classification of a [`WorkflowError`].
///
/// Guard and lookup failures are returned to the caller before anything is
/// written; conflicts mean a concurrent writer won the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Guard,
    NotFound,
    Conflict,
    Config,
    Internal,
}

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("task {task} cannot {action} while {status}")]
    InvalidTransition {
        task: TaskId,
        status: TaskStatus,
        action: TaskAction,
    },

    #[error("task {task} has unfinished dependencies: {blocking:?}")]
    DependenciesNotMet { task: TaskId, blocking: Vec<TaskId> },

    #[error("cannot resolve approvers for flow node {node}: {reason}")]
    ApproverUnresolved { node: usize, reason: String },

    #[error("user '{user}' has no pending review on approval {approval}")]
    ReviewerNotPending { approval: ApprovalId, user: String },

    #[error("approval {0} is no longer pending")]
    ApprovalClosed(ApprovalId),

    #[error("unknown review outcome '{code}' for task {task}")]
    UnknownOutcome { task: TaskId, code: String },

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Task code '{code}' not found in project {project}")]
    TaskCodeNotFound { project: ProjectId, code: String },

    #[error("Project not found: {0}")]
    ProjectNotFound(ProjectId),

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Approval not found: {0}")]
    ApprovalNotFound(ApprovalId),

    #[error("Approval flow not found: {0}")]
    FlowNotFound(String),

    #[error("Concurrent update conflict: {0}")]
    Conflict(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Cycle detected in task dependencies: {0}")]
    DagCycle(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::InvalidTransition { .. }
            | WorkflowError::DependenciesNotMet { .. }
            | WorkflowError::ApproverUnresolved { .. }
            | WorkflowError::ReviewerNotPending { .. }
            | WorkflowError::ApprovalClosed(_)
            | WorkflowError::UnknownOutcome { .. } => ErrorKind::Guard,

            WorkflowError::TaskNotFound(_)
            | WorkflowError::TaskCodeNotFound { .. }
            | WorkflowError::ProjectNotFound(_)
            | WorkflowError::TemplateNotFound(_)
            | WorkflowError::ApprovalNotFound(_)
            | WorkflowError::FlowNotFound(_) => ErrorKind::NotFound,

            WorkflowError::Conflict(_) => ErrorKind::Conflict,

            WorkflowError::ConfigError(_)
            | WorkflowError::DagCycle(_)
            | WorkflowError::TomlError(_) => ErrorKind::Config,

            WorkflowError::IoError(_) | WorkflowError::Other(_) => ErrorKind::Internal,
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, WorkflowError>;
