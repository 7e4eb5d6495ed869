// src/types.rs

//! Closed enums shared across the engine.
//!
//! Statuses, dependency types, approver types and review outcomes are all
//! matched exhaustively; unknown strings are rejected at parse time.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a project task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Unassigned,
    Pending,
    InProgress,
    Reviewing,
    Completed,
    Rejected,
    Confirmed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Unassigned => "unassigned",
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Reviewing => "reviewing",
            TaskStatus::Completed => "completed",
            TaskStatus::Rejected => "rejected",
            TaskStatus::Confirmed => "confirmed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Work is finished: clears FS-style dependency edges.
    pub fn is_done(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Confirmed)
    }

    /// Work has begun at some point: clears SS dependency edges.
    pub fn has_started(self) -> bool {
        matches!(
            self,
            TaskStatus::InProgress
                | TaskStatus::Reviewing
                | TaskStatus::Rejected
                | TaskStatus::Completed
                | TaskStatus::Confirmed
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "unassigned" => Ok(TaskStatus::Unassigned),
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "reviewing" => Ok(TaskStatus::Reviewing),
            "completed" => Ok(TaskStatus::Completed),
            "rejected" => Ok(TaskStatus::Rejected),
            "confirmed" => Ok(TaskStatus::Confirmed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(format!("invalid task status: {other}")),
        }
    }
}

/// Dependency type between two tasks.
///
/// Only `FS` and `SS` have dedicated semantics; `FF` and `SF` are accepted
/// and scheduled like `FS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DependencyType {
    #[default]
    #[serde(rename = "FS", alias = "fs")]
    FinishToStart,
    #[serde(rename = "SS", alias = "ss")]
    StartToStart,
    #[serde(rename = "FF", alias = "ff")]
    FinishToFinish,
    #[serde(rename = "SF", alias = "sf")]
    StartToFinish,
}

impl DependencyType {
    pub fn as_str(self) -> &'static str {
        match self {
            DependencyType::FinishToStart => "FS",
            DependencyType::StartToStart => "SS",
            DependencyType::FinishToFinish => "FF",
            DependencyType::StartToFinish => "SF",
        }
    }

    /// Whether a predecessor in `status` lets the dependent start.
    pub fn is_cleared_by(self, status: TaskStatus) -> bool {
        match self {
            DependencyType::StartToStart => status.has_started(),
            DependencyType::FinishToStart
            | DependencyType::FinishToFinish
            | DependencyType::StartToFinish => status.is_done(),
        }
    }
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DependencyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "FS" | "" => Ok(DependencyType::FinishToStart),
            "SS" => Ok(DependencyType::StartToStart),
            "FF" => Ok(DependencyType::FinishToFinish),
            "SF" => Ok(DependencyType::StartToFinish),
            other => Err(format!(
                "invalid dependency type: {other} (expected FS, SS, FF or SF)"
            )),
        }
    }
}

/// Level of a template/project task in the milestone tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Milestone,
    #[default]
    Task,
    Subtask,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Milestone => "milestone",
            TaskKind::Task => "task",
            TaskKind::Subtask => "subtask",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a whole approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Canceled,
}

/// Status of a single reviewer row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewerStatus {
    Pending,
    Approved,
    Rejected,
    Canceled,
}

impl ReviewerStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ReviewerStatus::Pending)
    }
}

/// How the approvers of an `approve` flow node are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApproverType {
    Designated,
    SelfSelect,
    Submitter,
    Supervisor,
    DeptLeader,
    Role,
}

/// Decision policy for a node with several reviewers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MultiApprove {
    /// Every reviewer at the node must approve.
    #[default]
    All,
}

/// What a review outcome code does to the reviewed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutcomeAction {
    /// Review passed; the task completes.
    Pass,
    /// Review failed; the task is rejected and `target` is rolled back.
    FailRollback {
        target: String,
        #[serde(default)]
        cascade: bool,
    },
    /// Review failed; the task goes back to rework without a rollback.
    Reject,
}

/// Every action recorded in the task action log.
///
/// [`TaskAction::target`] is the transition table: it returns the status an
/// action moves a task to, or `None` when the action is illegal from `from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskAction {
    Create,
    Assign,
    Start,
    Resume,
    ChainActivate,
    Complete,
    AutoApprove,
    SubmitForReview,
    ReviewPass,
    ReviewRollback,
    ReviewReject,
    ApprovalApproved,
    ApprovalConfirmed,
    ApprovalRejected,
    Rollback,
    CascadeReset,
    Cancel,
}

impl TaskAction {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskAction::Create => "create",
            TaskAction::Assign => "assign",
            TaskAction::Start => "start",
            TaskAction::Resume => "resume",
            TaskAction::ChainActivate => "chain_activate",
            TaskAction::Complete => "complete",
            TaskAction::AutoApprove => "auto_approve",
            TaskAction::SubmitForReview => "submit_for_review",
            TaskAction::ReviewPass => "review_pass",
            TaskAction::ReviewRollback => "review_rollback",
            TaskAction::ReviewReject => "review_reject",
            TaskAction::ApprovalApproved => "approval_approved",
            TaskAction::ApprovalConfirmed => "approval_confirmed",
            TaskAction::ApprovalRejected => "approval_rejected",
            TaskAction::Rollback => "rollback",
            TaskAction::CascadeReset => "cascade_reset",
            TaskAction::Cancel => "cancel",
        }
    }

    pub fn target(self, from: TaskStatus) -> Option<TaskStatus> {
        use TaskStatus::*;

        match (self, from) {
            (TaskAction::Create, _) => None,
            (TaskAction::Assign, Unassigned | Pending) => Some(Pending),
            (TaskAction::Start | TaskAction::ChainActivate, Pending) => Some(InProgress),
            (TaskAction::Resume, Rejected) => Some(InProgress),
            (TaskAction::Complete | TaskAction::AutoApprove, InProgress) => Some(Completed),
            (TaskAction::SubmitForReview, InProgress) => Some(Reviewing),
            (TaskAction::ReviewPass | TaskAction::ApprovalApproved, Reviewing) => Some(Completed),
            (TaskAction::ApprovalConfirmed, Reviewing) => Some(Confirmed),
            (TaskAction::ReviewRollback, Reviewing) => Some(Rejected),
            (TaskAction::ReviewReject | TaskAction::ApprovalRejected, Reviewing) => {
                Some(InProgress)
            }
            (TaskAction::Rollback, _) => Some(InProgress),
            (TaskAction::CascadeReset, Completed | InProgress | Reviewing) => Some(Pending),
            (TaskAction::Cancel, Cancelled | Completed | Confirmed) => None,
            (TaskAction::Cancel, _) => Some(Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
