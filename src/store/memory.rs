// src/store/memory.rs

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::anyhow;
use chrono::{DateTime, NaiveDate, Utc};

use super::Store;
use crate::errors::{Result, WorkflowError};
use crate::model::{
    ApprovalId, ApprovalRequest, ApprovalReviewer, FlowSchema, NewApproval, NewReviewer, NewTask,
    Project, ProjectId, ProjectRoleAssignment, ProjectTemplate, ReviewerId, Task, TaskActionLog,
    TaskDependency, TaskId, UserId,
};
use crate::types::{ApprovalStatus, ReviewerStatus};

#[derive(Debug, Default)]
struct Tables {
    next_id: u64,
    projects: BTreeMap<ProjectId, Project>,
    templates: HashMap<String, ProjectTemplate>,
    flows: HashMap<String, FlowSchema>,
    tasks: BTreeMap<TaskId, Task>,
    dependencies: Vec<TaskDependency>,
    logs: Vec<TaskActionLog>,
    roles: Vec<ProjectRoleAssignment>,
    approvals: BTreeMap<ApprovalId, ApprovalRequest>,
    reviewers: BTreeMap<ReviewerId, ApprovalReviewer>,
}

impl Tables {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn insert_reviewers(&mut self, approval: ApprovalId, reviewers: Vec<NewReviewer>) {
        for r in reviewers {
            let id = self.allocate_id();
            self.reviewers.insert(
                id,
                ApprovalReviewer {
                    id,
                    approval_id: approval,
                    user: r.user,
                    node_index: r.node_index,
                    sequence: r.sequence,
                    status: ReviewerStatus::Pending,
                    comment: None,
                    decided_at: None,
                },
            );
        }
    }
}

/// In-process [`Store`] backed by maps under one mutex.
///
/// Cloning shares the same tables, so a clone can be handed to the outbox
/// worker while the engine keeps the original.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| WorkflowError::Other(anyhow!("memory store lock poisoned")))
    }
}

fn sorted_by_sequence(mut tasks: Vec<Task>) -> Vec<Task> {
    tasks.sort_by(|a, b| a.sequence.cmp(&b.sequence).then_with(|| a.id.cmp(&b.id)));
    tasks
}

impl Store for MemoryStore {
    fn insert_project(
        &self,
        name: &str,
        template_id: Option<&str>,
        start_date: NaiveDate,
        skip_weekends: bool,
    ) -> Result<Project> {
        let mut tables = self.lock()?;
        let id = tables.allocate_id();
        let project = Project {
            id,
            name: name.to_string(),
            template_id: template_id.map(str::to_string),
            start_date,
            skip_weekends,
            created_at: Utc::now(),
        };
        tables.projects.insert(id, project.clone());
        Ok(project)
    }

    fn project(&self, id: ProjectId) -> Result<Option<Project>> {
        Ok(self.lock()?.projects.get(&id).cloned())
    }

    fn put_template(&self, template: ProjectTemplate) -> Result<()> {
        self.lock()?.templates.insert(template.id.clone(), template);
        Ok(())
    }

    fn template(&self, id: &str) -> Result<Option<ProjectTemplate>> {
        Ok(self.lock()?.templates.get(id).cloned())
    }

    fn put_flow(&self, code: &str, flow: FlowSchema) -> Result<()> {
        self.lock()?.flows.insert(code.to_string(), flow);
        Ok(())
    }

    fn flow(&self, code: &str) -> Result<Option<FlowSchema>> {
        Ok(self.lock()?.flows.get(code).cloned())
    }

    fn insert_task(&self, task: NewTask) -> Result<Task> {
        let mut tables = self.lock()?;
        if !tables.projects.contains_key(&task.project_id) {
            return Err(WorkflowError::ProjectNotFound(task.project_id));
        }
        let id = tables.allocate_id();
        let task = task.into_task(id, Utc::now());
        tables.tasks.insert(id, task.clone());
        Ok(task)
    }

    fn task(&self, id: TaskId) -> Result<Option<Task>> {
        Ok(self.lock()?.tasks.get(&id).cloned())
    }

    fn task_by_code(&self, project: ProjectId, code: &str) -> Result<Option<Task>> {
        Ok(self
            .lock()?
            .tasks
            .values()
            .find(|t| t.project_id == project && t.code == code)
            .cloned())
    }

    fn project_tasks(&self, project: ProjectId) -> Result<Vec<Task>> {
        let tasks = self
            .lock()?
            .tasks
            .values()
            .filter(|t| t.project_id == project)
            .cloned()
            .collect();
        Ok(sorted_by_sequence(tasks))
    }

    fn phase_tasks(&self, project: ProjectId, phase: &str) -> Result<Vec<Task>> {
        let tasks = self
            .lock()?
            .tasks
            .values()
            .filter(|t| t.project_id == project && t.phase.as_deref() == Some(phase))
            .cloned()
            .collect();
        Ok(sorted_by_sequence(tasks))
    }

    fn save_task(&self, task: &Task) -> Result<Task> {
        let mut tables = self.lock()?;
        let stored = tables
            .tasks
            .get_mut(&task.id)
            .ok_or(WorkflowError::TaskNotFound(task.id))?;

        if stored.version != task.version {
            return Err(WorkflowError::Conflict(format!(
                "task {} is at version {}, update was based on {}",
                task.id, stored.version, task.version
            )));
        }

        let mut saved = task.clone();
        saved.external_id = stored.external_id.take();
        saved.version += 1;
        saved.updated_at = Utc::now();
        *stored = saved.clone();
        Ok(saved)
    }

    fn set_external_id(&self, task: TaskId, external_id: &str) -> Result<()> {
        let mut tables = self.lock()?;
        let stored = tables
            .tasks
            .get_mut(&task)
            .ok_or(WorkflowError::TaskNotFound(task))?;
        stored.external_id = Some(external_id.to_string());
        Ok(())
    }

    fn insert_dependency(&self, dep: TaskDependency) -> Result<()> {
        let mut tables = self.lock()?;
        for id in [dep.task_id, dep.depends_on] {
            if !tables.tasks.contains_key(&id) {
                return Err(WorkflowError::TaskNotFound(id));
            }
        }
        tables.dependencies.push(dep);
        Ok(())
    }

    fn dependencies_of(&self, task: TaskId) -> Result<Vec<TaskDependency>> {
        Ok(self
            .lock()?
            .dependencies
            .iter()
            .filter(|d| d.task_id == task)
            .cloned()
            .collect())
    }

    fn dependents_of(&self, task: TaskId) -> Result<Vec<TaskDependency>> {
        Ok(self
            .lock()?
            .dependencies
            .iter()
            .filter(|d| d.depends_on == task)
            .cloned()
            .collect())
    }

    fn append_log(&self, mut entry: TaskActionLog) -> Result<TaskActionLog> {
        let mut tables = self.lock()?;
        entry.id = tables.allocate_id();
        tables.logs.push(entry.clone());
        Ok(entry)
    }

    fn task_logs(&self, task: TaskId) -> Result<Vec<TaskActionLog>> {
        Ok(self
            .lock()?
            .logs
            .iter()
            .filter(|l| l.task_id == task)
            .cloned()
            .collect())
    }

    fn upsert_role_assignment(&self, assignment: ProjectRoleAssignment) -> Result<()> {
        let mut tables = self.lock()?;
        match tables.roles.iter_mut().find(|r| {
            r.project_id == assignment.project_id
                && r.phase == assignment.phase
                && r.role_code == assignment.role_code
        }) {
            Some(existing) => existing.user = assignment.user,
            None => tables.roles.push(assignment),
        }
        Ok(())
    }

    fn role_assignee(&self, project: ProjectId, phase: &str, role: &str) -> Result<Option<UserId>> {
        Ok(self
            .lock()?
            .roles
            .iter()
            .find(|r| r.project_id == project && r.phase == phase && r.role_code == role)
            .map(|r| r.user.clone()))
    }

    fn insert_approval(
        &self,
        approval: NewApproval,
        reviewers: Vec<NewReviewer>,
    ) -> Result<ApprovalRequest> {
        let mut tables = self.lock()?;
        let id = tables.allocate_id();
        let request = ApprovalRequest {
            id,
            task_id: approval.task_id,
            project_id: approval.project_id,
            flow_code: approval.flow_code,
            flow_snapshot: approval.flow_snapshot,
            status: ApprovalStatus::Pending,
            current_node: approval.current_node,
            submitter: approval.submitter,
            selections: approval.selections,
            version: 0,
            created_at: Utc::now(),
            finished_at: None,
        };
        tables.approvals.insert(id, request.clone());
        tables.insert_reviewers(id, reviewers);
        Ok(request)
    }

    fn approval(&self, id: ApprovalId) -> Result<Option<ApprovalRequest>> {
        Ok(self.lock()?.approvals.get(&id).cloned())
    }

    fn open_approval_for_task(&self, task: TaskId) -> Result<Option<ApprovalRequest>> {
        Ok(self
            .lock()?
            .approvals
            .values()
            .find(|a| a.task_id == task && a.status == ApprovalStatus::Pending)
            .cloned())
    }

    fn save_approval(&self, approval: &ApprovalRequest) -> Result<ApprovalRequest> {
        let mut tables = self.lock()?;
        let stored = tables
            .approvals
            .get_mut(&approval.id)
            .ok_or(WorkflowError::ApprovalNotFound(approval.id))?;

        if stored.version != approval.version {
            return Err(WorkflowError::Conflict(format!(
                "approval {} is at version {}, update was based on {}",
                approval.id, stored.version, approval.version
            )));
        }
        if approval.current_node < stored.current_node {
            return Err(WorkflowError::Conflict(format!(
                "approval {} cannot move back from node {} to {}",
                approval.id, stored.current_node, approval.current_node
            )));
        }

        let mut saved = approval.clone();
        saved.version += 1;
        *stored = saved.clone();
        Ok(saved)
    }

    fn reviewers(&self, approval: ApprovalId) -> Result<Vec<ApprovalReviewer>> {
        Ok(self
            .lock()?
            .reviewers
            .values()
            .filter(|r| r.approval_id == approval)
            .cloned()
            .collect())
    }

    fn decide_reviewer(
        &self,
        reviewer: ReviewerId,
        status: ReviewerStatus,
        comment: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<ApprovalReviewer> {
        let mut tables = self.lock()?;
        let row = tables
            .reviewers
            .get_mut(&reviewer)
            .ok_or_else(|| WorkflowError::Other(anyhow!("reviewer row {reviewer} not found")))?;

        if row.decided_at.is_some() {
            return Err(WorkflowError::Conflict(format!(
                "reviewer row {reviewer} was already decided"
            )));
        }

        row.status = status;
        row.comment = comment;
        row.decided_at = Some(at);
        Ok(row.clone())
    }

    fn advance_approval(
        &self,
        id: ApprovalId,
        expected_node: usize,
        next_node: usize,
        reviewers: Vec<NewReviewer>,
    ) -> Result<ApprovalRequest> {
        let mut tables = self.lock()?;
        let request = tables
            .approvals
            .get_mut(&id)
            .ok_or(WorkflowError::ApprovalNotFound(id))?;

        if request.status != ApprovalStatus::Pending || request.current_node != expected_node {
            return Err(WorkflowError::Conflict(format!(
                "approval {id} moved on before advancing from node {expected_node}"
            )));
        }
        if next_node <= expected_node {
            return Err(WorkflowError::Conflict(format!(
                "approval {id} cannot advance from node {expected_node} to {next_node}"
            )));
        }

        request.current_node = next_node;
        request.version += 1;
        let advanced = request.clone();
        tables.insert_reviewers(id, reviewers);
        Ok(advanced)
    }
}
