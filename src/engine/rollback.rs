// src/engine/rollback.rs

//! Rollback cascader.
//!
//! The target goes back to `in_progress` with its progress cleared. With
//! `cascade`, every task of the target's phase with a higher sequence that
//! is `completed`, `in_progress` or `reviewing` goes back to `pending`. The
//! cascade follows sequence order only; dependency edges are not walked.

use serde_json::json;
use tracing::{info, warn};

use crate::engine::Engine;
use crate::errors::Result;
use crate::model::{Actor, Task, TaskId};
use crate::types::{TaskAction, TaskStatus};

const CASCADE_STATUSES: [TaskStatus; 3] = [
    TaskStatus::Completed,
    TaskStatus::InProgress,
    TaskStatus::Reviewing,
];

/// What a rollback touched.
#[derive(Debug, Clone)]
pub struct RollbackReport {
    pub target: Task,
    /// Tasks reset to `pending` by the cascade, in sequence order.
    pub reset: Vec<Task>,
    /// Cascade candidates whose reset failed; logged and skipped.
    pub failed: Vec<TaskId>,
}

fn clear_progress(task: &mut Task) {
    task.progress = 0;
    task.completed_at = None;
}

impl Engine {
    /// Roll back the task coded `target_code` in the project of
    /// `triggering`.
    pub fn rollback_task(
        &self,
        triggering: TaskId,
        target_code: &str,
        cascade: bool,
        actor: &Actor,
    ) -> Result<RollbackReport> {
        let trigger = self.task(triggering)?;
        let target = self.task_by_code(trigger.project_id, target_code)?;

        let payload = json!({ "triggered_by": triggering, "cascade": cascade });
        let target = self.transition(target, TaskAction::Rollback, actor, payload, clear_progress)?;
        self.cancel_open_approval_logged(target.id, actor);

        let mut report = RollbackReport {
            target,
            reset: Vec::new(),
            failed: Vec::new(),
        };
        if cascade {
            self.cascade_reset(&mut report, triggering);
        }

        info!(
            triggering,
            target = report.target.id,
            cascade,
            reset = report.reset.len(),
            failed = report.failed.len(),
            "rollback finished"
        );
        Ok(report)
    }

    fn cascade_reset(&self, report: &mut RollbackReport, triggering: TaskId) {
        let target_id = report.target.id;
        let target_sequence = report.target.sequence;

        let siblings = match self.phase_siblings(&report.target) {
            Ok(tasks) => tasks,
            Err(err) => {
                warn!(task_id = target_id, error = %err, "cascade: cannot load phase tasks");
                return;
            }
        };

        let candidates = siblings.into_iter().filter(|t| {
            t.id != target_id
                && t.sequence > target_sequence
                && CASCADE_STATUSES.contains(&t.status)
        });

        for task in candidates {
            let task_id = task.id;
            match self.reset_for_cascade(task, triggering, target_id) {
                Ok(task) => report.reset.push(task),
                Err(err) => {
                    warn!(task_id, error = %err, "cascade: reset failed; continuing");
                    report.failed.push(task_id);
                }
            }
        }
    }

    /// The open approval is only canceled once the reset is saved.
    fn reset_for_cascade(&self, task: Task, triggering: TaskId, target: TaskId) -> Result<Task> {
        let payload = json!({ "triggered_by": triggering, "rollback_target": target });
        let task = self.transition(
            task,
            TaskAction::CascadeReset,
            &Actor::System,
            payload,
            clear_progress,
        )?;
        self.cancel_open_approval_logged(task.id, &Actor::System);
        Ok(task)
    }

    fn phase_siblings(&self, target: &Task) -> Result<Vec<Task>> {
        match &target.phase {
            Some(phase) => self.store.phase_tasks(target.project_id, phase),
            None => Ok(self
                .store
                .project_tasks(target.project_id)?
                .into_iter()
                .filter(|t| t.phase.is_none())
                .collect()),
        }
    }
}
