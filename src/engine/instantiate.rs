// src/engine/instantiate.rs

//! Project instantiation from a template, and phase role assignment.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use chrono::{NaiveDate, Utc};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::validate_template;
use crate::dag::CalendarCalculator;
use crate::engine::Engine;
use crate::errors::{Result, WorkflowError};
use crate::events::EngineEvent;
use crate::model::{
    Actor, NewTask, Project, ProjectId, ProjectRoleAssignment, Task, TaskActionLog,
    TaskDependency, TaskId, TemplateTask, UserId,
};
use crate::types::{TaskAction, TaskKind, TaskStatus};

/// A role holder for one phase, written `phase:role=user`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseRole {
    pub phase: String,
    pub role_code: String,
    pub user: UserId,
}

impl FromStr for PhaseRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (scope, user) = s
            .split_once('=')
            .ok_or_else(|| format!("invalid role '{s}' (expected phase:role=user)"))?;
        let (phase, role) = scope
            .split_once(':')
            .ok_or_else(|| format!("invalid role '{s}' (expected phase:role=user)"))?;

        let (phase, role, user) = (phase.trim(), role.trim(), user.trim());
        if phase.is_empty() || role.is_empty() || user.is_empty() {
            return Err(format!("invalid role '{s}': phase, role and user must be non-empty"));
        }

        Ok(Self {
            phase: phase.to_string(),
            role_code: role.to_string(),
            user: user.to_string(),
        })
    }
}

/// A freshly created project and its tasks in sequence order.
#[derive(Debug, Clone)]
pub struct InstantiatedProject {
    pub project: Project,
    pub tasks: Vec<Task>,
}

impl Engine {
    /// Create a project from a registered template.
    ///
    /// Planned dates come from the calendar. Tasks are created milestones
    /// first, then tasks, then subtasks, so a parent row always exists
    /// before its children. A task whose phase role has a holder starts
    /// `pending` with that assignee; the rest start `unassigned`.
    pub fn instantiate_from_template(
        &self,
        template_id: &str,
        start_date: NaiveDate,
        skip_weekends: bool,
        roles: &[PhaseRole],
    ) -> Result<InstantiatedProject> {
        let template = self
            .store
            .template(template_id)?
            .ok_or_else(|| WorkflowError::TemplateNotFound(template_id.to_string()))?;
        validate_template(&template)?;
        let windows = CalendarCalculator::new(&template, start_date, skip_weekends).compute()?;

        let project = self.store.insert_project(
            &template.name,
            Some(template.id.as_str()),
            start_date,
            skip_weekends,
        )?;
        for role in roles {
            self.store.upsert_role_assignment(ProjectRoleAssignment {
                project_id: project.id,
                phase: role.phase.clone(),
                role_code: role.role_code.clone(),
                user: role.user.clone(),
            })?;
        }

        let mut ids: HashMap<&str, TaskId> = HashMap::new();
        for kind in [TaskKind::Milestone, TaskKind::Task, TaskKind::Subtask] {
            for tt in template.tasks.iter().filter(|t| t.kind == kind) {
                let parent_id = match &tt.parent_code {
                    Some(code) => Some(*ids.get(code.as_str()).ok_or_else(|| {
                        WorkflowError::ConfigError(format!(
                            "parent '{code}' of '{}' does not exist yet",
                            tt.code
                        ))
                    })?),
                    None => None,
                };
                let assignee = self.default_assignee(project.id, tt)?;
                let window = windows.get(&tt.code);

                let task = self.store.insert_task(NewTask {
                    project_id: project.id,
                    code: tt.code.clone(),
                    name: tt.name.clone(),
                    kind: tt.kind,
                    phase: tt.phase.clone(),
                    parent_id,
                    status: if assignee.is_some() {
                        TaskStatus::Pending
                    } else {
                        TaskStatus::Unassigned
                    },
                    assignee,
                    default_role: tt.default_role.clone(),
                    requires_approval: tt.requires_approval,
                    approval_type: tt.approval_type.clone(),
                    outcomes: tt.outcomes.clone(),
                    planned_start: window.map(|w| w.start),
                    planned_end: window.map(|w| w.end),
                    sequence: tt.sequence,
                })?;

                self.log_creation(&task)?;
                self.announce_assignment(&task);
                ids.insert(tt.code.as_str(), task.id);
            }
        }

        for dep in &template.dependencies {
            let (Some(&task_id), Some(&depends_on)) = (
                ids.get(dep.task_code.as_str()),
                ids.get(dep.depends_on_code.as_str()),
            ) else {
                return Err(WorkflowError::ConfigError(format!(
                    "dependency {} -> {} references a task that was not created",
                    dep.task_code, dep.depends_on_code
                )));
            };
            self.store.insert_dependency(TaskDependency {
                task_id,
                depends_on,
                dep_type: dep.dep_type,
                lag_days: dep.lag_days,
            })?;
        }

        let tasks = self.store.project_tasks(project.id)?;
        info!(
            project_id = project.id,
            template = %template.id,
            tasks = tasks.len(),
            dependencies = template.dependencies.len(),
            "project instantiated"
        );
        Ok(InstantiatedProject { project, tasks })
    }

    /// Record role holders for `phase` and hand them the phase's
    /// unassigned or pending tasks that carry those roles.
    pub fn assign_phase_roles(
        &self,
        project: ProjectId,
        phase: &str,
        assignments: &BTreeMap<String, UserId>,
        actor: &Actor,
    ) -> Result<Vec<Task>> {
        self.store
            .project(project)?
            .ok_or(WorkflowError::ProjectNotFound(project))?;

        for (role_code, user) in assignments {
            self.store.upsert_role_assignment(ProjectRoleAssignment {
                project_id: project,
                phase: phase.to_string(),
                role_code: role_code.clone(),
                user: user.clone(),
            })?;
        }

        let mut assigned = Vec::new();
        for task in self.store.phase_tasks(project, phase)? {
            let Some(user) = task
                .default_role
                .as_deref()
                .and_then(|role| assignments.get(role))
            else {
                continue;
            };
            if !matches!(task.status, TaskStatus::Unassigned | TaskStatus::Pending)
                || task.assignee.as_ref() == Some(user)
            {
                continue;
            }

            match self.assign_task(task.id, user, actor) {
                Ok(task) => assigned.push(task),
                Err(err) => warn!(task_id = task.id, error = %err, "phase role assignment failed"),
            }
        }

        debug!(project, %phase, assigned = assigned.len(), "phase roles applied");
        Ok(assigned)
    }

    fn default_assignee(&self, project: ProjectId, task: &TemplateTask) -> Result<Option<UserId>> {
        match (&task.phase, &task.default_role) {
            (Some(phase), Some(role)) => self.store.role_assignee(project, phase, role),
            _ => Ok(None),
        }
    }

    fn log_creation(&self, task: &Task) -> Result<()> {
        self.store.append_log(TaskActionLog {
            id: 0,
            task_id: task.id,
            action: TaskAction::Create,
            from_status: None,
            to_status: task.status,
            actor: self.actor_label(&Actor::System),
            payload: json!({ "code": task.code, "assignee": task.assignee }),
            timestamp: Utc::now(),
        })?;
        self.events.publish(EngineEvent::TaskChanged {
            project_id: task.project_id,
            task_id: task.id,
            action: TaskAction::Create,
            from: None,
            to: task.status,
        });
        Ok(())
    }
}
