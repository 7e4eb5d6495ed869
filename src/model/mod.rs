// src/model/mod.rs

//! Rows the engine reads and writes through the [`Store`](crate::store::Store).
//!
//! - [`task`] holds projects, tasks, dependency edges, the action log and
//!   phase role assignments.
//! - [`approval`] holds flow schemas, approval requests and reviewer rows.
//! - [`template`] holds project templates keyed by task code.

pub mod approval;
pub mod task;
pub mod template;

pub use approval::{
    ApprovalRequest, ApprovalReviewer, ApproveNode, FlowNode, FlowSchema, NewApproval, NewReviewer,
};
pub use task::{
    NewTask, Project, ProjectRoleAssignment, ReviewOutcome, Task, TaskActionLog, TaskDependency,
};
pub use template::{ProjectTemplate, TemplateTask, TemplateTaskDependency};

pub type TaskId = u64;
pub type ProjectId = u64;
pub type ApprovalId = u64;
pub type ReviewerId = u64;
pub type UserId = String;

/// Who performed an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    User(UserId),
    /// The engine itself (chain activation, auto-approval, cascades).
    System,
}

impl Actor {
    pub fn user(id: impl Into<UserId>) -> Self {
        Actor::User(id.into())
    }

    /// Name recorded in the action log; `System` maps to the configured
    /// system identity.
    pub fn label(&self, system_actor: &str) -> String {
        match self {
            Actor::User(id) => id.clone(),
            Actor::System => system_actor.to_string(),
        }
    }
}
