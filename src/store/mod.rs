// src/store/mod.rs

//! Transactional store abstraction.
//!
//! The engine only talks to a [`Store`]. Every method is one atomic unit
//! against the backing store; the in-memory [`MemoryStore`] serialises them
//! under a single lock, a relational backend would map each to one
//! transaction.
//!
//! Rows that the engine updates conditionally (`Task`, `ApprovalRequest`)
//! carry a `version`: `save_*` succeeds only when the caller's copy is still
//! current and returns [`WorkflowError::Conflict`](crate::errors::WorkflowError::Conflict)
//! otherwise.

use std::fmt::Debug;

use chrono::{DateTime, NaiveDate, Utc};

use crate::errors::Result;
use crate::model::{
    ApprovalId, ApprovalRequest, ApprovalReviewer, FlowSchema, NewApproval, NewReviewer, NewTask,
    Project, ProjectId, ProjectRoleAssignment, ProjectTemplate, ReviewerId, Task, TaskActionLog,
    TaskDependency, TaskId, UserId,
};
use crate::types::ReviewerStatus;

pub mod memory;

pub use memory::MemoryStore;

pub trait Store: Send + Sync + Debug {
    // Projects, templates and approval definitions.
    fn insert_project(
        &self,
        name: &str,
        template_id: Option<&str>,
        start_date: NaiveDate,
        skip_weekends: bool,
    ) -> Result<Project>;
    fn project(&self, id: ProjectId) -> Result<Option<Project>>;
    fn put_template(&self, template: ProjectTemplate) -> Result<()>;
    fn template(&self, id: &str) -> Result<Option<ProjectTemplate>>;
    fn put_flow(&self, code: &str, flow: FlowSchema) -> Result<()>;
    fn flow(&self, code: &str) -> Result<Option<FlowSchema>>;

    // Tasks.
    fn insert_task(&self, task: NewTask) -> Result<Task>;
    fn task(&self, id: TaskId) -> Result<Option<Task>>;
    fn task_by_code(&self, project: ProjectId, code: &str) -> Result<Option<Task>>;
    /// All tasks of a project ordered by `(sequence, id)`.
    fn project_tasks(&self, project: ProjectId) -> Result<Vec<Task>>;
    /// Tasks of one phase ordered by `(sequence, id)`.
    fn phase_tasks(&self, project: ProjectId, phase: &str) -> Result<Vec<Task>>;
    /// Conditional update: stored version must equal `task.version`.
    /// Returns the saved row with its bumped version. `external_id` is
    /// owned by [`Store::set_external_id`] and kept as stored.
    fn save_task(&self, task: &Task) -> Result<Task>;
    /// Record the external tracker id of a task. Leaves `version` alone, so
    /// it never races a status transition.
    fn set_external_id(&self, task: TaskId, external_id: &str) -> Result<()>;

    // Dependency edges.
    fn insert_dependency(&self, dep: TaskDependency) -> Result<()>;
    /// Edges where `task` is the dependent side.
    fn dependencies_of(&self, task: TaskId) -> Result<Vec<TaskDependency>>;
    /// Edges where `task` is the predecessor.
    fn dependents_of(&self, task: TaskId) -> Result<Vec<TaskDependency>>;

    // Action log.
    fn append_log(&self, entry: TaskActionLog) -> Result<TaskActionLog>;
    /// Log rows of a task in append order.
    fn task_logs(&self, task: TaskId) -> Result<Vec<TaskActionLog>>;

    // Phase roles.
    fn upsert_role_assignment(&self, assignment: ProjectRoleAssignment) -> Result<()>;
    fn role_assignee(&self, project: ProjectId, phase: &str, role: &str) -> Result<Option<UserId>>;

    // Approvals.
    /// Creates the request and its first reviewer set atomically.
    fn insert_approval(
        &self,
        approval: NewApproval,
        reviewers: Vec<NewReviewer>,
    ) -> Result<ApprovalRequest>;
    fn approval(&self, id: ApprovalId) -> Result<Option<ApprovalRequest>>;
    /// The `pending` approval of a task, if any.
    fn open_approval_for_task(&self, task: TaskId) -> Result<Option<ApprovalRequest>>;
    /// Conditional update of status/finished_at; `current_node` may not
    /// decrease.
    fn save_approval(&self, approval: &ApprovalRequest) -> Result<ApprovalRequest>;
    fn reviewers(&self, approval: ApprovalId) -> Result<Vec<ApprovalReviewer>>;
    /// Record a reviewer's decision. Fails with `Conflict` if the row was
    /// already decided.
    fn decide_reviewer(
        &self,
        reviewer: ReviewerId,
        status: ReviewerStatus,
        comment: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<ApprovalReviewer>;
    /// Move `current_node` from `expected_node` to `next_node` and insert
    /// that node's reviewers in one step.
    fn advance_approval(
        &self,
        id: ApprovalId,
        expected_node: usize,
        next_node: usize,
        reviewers: Vec<NewReviewer>,
    ) -> Result<ApprovalRequest>;
}
