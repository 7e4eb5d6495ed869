// src/model/task.rs

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{ProjectId, TaskId, UserId};
use crate::types::{DependencyType, OutcomeAction, TaskAction, TaskKind, TaskStatus};

/// A project instantiated from a template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub template_id: Option<String>,
    pub start_date: NaiveDate,
    pub skip_weekends: bool,
    pub created_at: DateTime<Utc>,
}

/// A review outcome code configured on a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewOutcome {
    pub code: String,
    #[serde(flatten)]
    pub action: OutcomeAction,
}

/// One project task row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub project_id: ProjectId,
    /// Template task code; unique within a project.
    pub code: String,
    pub name: String,
    pub kind: TaskKind,
    pub phase: Option<String>,
    pub parent_id: Option<TaskId>,
    pub status: TaskStatus,
    pub assignee: Option<UserId>,
    pub default_role: Option<String>,
    pub requires_approval: bool,
    /// Approval flow code used when the task is submitted for review.
    pub approval_type: Option<String>,
    pub outcomes: Vec<ReviewOutcome>,
    pub planned_start: Option<NaiveDate>,
    pub planned_end: Option<NaiveDate>,
    pub actual_start: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Creation/display order within the phase.
    pub sequence: u32,
    /// Percentage, 0..=100.
    pub progress: u8,
    /// Id in the external task tracker, once created.
    pub external_id: Option<String>,
    /// Optimistic concurrency token; bumped by every successful save.
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn outcome(&self, code: &str) -> Option<&ReviewOutcome> {
        self.outcomes.iter().find(|o| o.code == code)
    }
}

/// Insert payload for a task; the store assigns `id` and `version`.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub project_id: ProjectId,
    pub code: String,
    pub name: String,
    pub kind: TaskKind,
    pub phase: Option<String>,
    pub parent_id: Option<TaskId>,
    pub status: TaskStatus,
    pub assignee: Option<UserId>,
    pub default_role: Option<String>,
    pub requires_approval: bool,
    pub approval_type: Option<String>,
    pub outcomes: Vec<ReviewOutcome>,
    pub planned_start: Option<NaiveDate>,
    pub planned_end: Option<NaiveDate>,
    pub sequence: u32,
}

impl NewTask {
    pub fn into_task(self, id: TaskId, now: DateTime<Utc>) -> Task {
        Task {
            id,
            project_id: self.project_id,
            code: self.code,
            name: self.name,
            kind: self.kind,
            phase: self.phase,
            parent_id: self.parent_id,
            status: self.status,
            assignee: self.assignee,
            default_role: self.default_role,
            requires_approval: self.requires_approval,
            approval_type: self.approval_type,
            outcomes: self.outcomes,
            planned_start: self.planned_start,
            planned_end: self.planned_end,
            actual_start: None,
            completed_at: None,
            sequence: self.sequence,
            progress: 0,
            external_id: None,
            version: 0,
            updated_at: now,
        }
    }
}

/// Edge `task` depends on `depends_on`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDependency {
    pub task_id: TaskId,
    pub depends_on: TaskId,
    pub dep_type: DependencyType,
    pub lag_days: i32,
}

/// Append-only audit row written by every transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskActionLog {
    /// Assigned by the store; strictly increasing.
    pub id: u64,
    pub task_id: TaskId,
    pub action: TaskAction,
    pub from_status: Option<TaskStatus>,
    pub to_status: TaskStatus,
    pub actor: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Maps `(project, phase, role)` to the user filling that role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRoleAssignment {
    pub project_id: ProjectId,
    pub phase: String,
    pub role_code: String,
    pub user: UserId,
}
