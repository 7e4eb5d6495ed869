// src/engine/machine.rs

//! Task state machine.
//!
//! Every status change goes through [`Engine::transition`], which:
//! - checks the move against [`TaskAction::target`],
//! - writes the row with a version check,
//! - appends a [`TaskActionLog`] row,
//! - publishes an [`EngineEvent::TaskChanged`].
//!
//! Guards run before anything is written, so a rejected action leaves the
//! task untouched. Completion (direct, review pass, auto-approval or final
//! approval) always ends in [`Engine::check_and_start_dependent_tasks`].

use std::collections::{BTreeMap, VecDeque};

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::dag::DependencyResolver;
use crate::engine::routing::{Channel, RoutingDecision, COMPLETE_EVENT, TASK_DOMAIN};
use crate::engine::Engine;
use crate::errors::{ErrorKind, Result, WorkflowError};
use crate::events::EngineEvent;
use crate::model::{Actor, Task, TaskActionLog, TaskId, UserId};
use crate::outbox::OutboxMessage;
use crate::types::{OutcomeAction, TaskAction, TaskStatus};

/// Attempts at a transition that keeps losing a version race before the
/// conflict is reported.
const CONFLICT_ATTEMPTS: u32 = 3;

impl Engine {
    /// Set the assignee of an unassigned or pending task.
    pub fn assign_task(&self, task_id: TaskId, assignee: &str, actor: &Actor) -> Result<Task> {
        let task = self.task(task_id)?;
        let payload = json!({ "assignee": assignee, "previous": task.assignee });
        let assignee = assignee.to_string();

        let task = self.transition(task, TaskAction::Assign, actor, payload, |t| {
            t.assignee = Some(assignee);
        })?;

        self.announce_assignment(&task);
        Ok(task)
    }

    /// Start a pending task whose dependencies are all cleared.
    pub fn start_task(&self, task_id: TaskId, actor: &Actor) -> Result<Task> {
        let task = self.task(task_id)?;
        self.guard(&task, TaskAction::Start)?;
        DependencyResolver::new(self.store.as_ref()).check_dependencies_completed(task_id)?;

        let now = Utc::now();
        let task = self.transition(task, TaskAction::Start, actor, json!({}), |t| {
            t.actual_start = Some(now);
        })?;

        self.announce_start(&task);
        // SS followers clear as soon as this task has started.
        self.check_and_start_dependent_tasks(task.id);
        Ok(task)
    }

    /// Complete an in-progress task.
    ///
    /// Tasks without `requires_approval` complete directly. Otherwise the
    /// routing policy (if any) may auto-approve; failing that the task goes
    /// to `reviewing`, through its approval flow when `approval_type` is set.
    pub fn complete_task(&self, task_id: TaskId, actor: &Actor) -> Result<Task> {
        self.complete_task_with(task_id, BTreeMap::new(), actor)
    }

    /// Like [`Engine::complete_task`], with approver choices for
    /// `self_select` flow nodes keyed by node index.
    pub fn complete_task_with(
        &self,
        task_id: TaskId,
        selections: BTreeMap<usize, Vec<UserId>>,
        actor: &Actor,
    ) -> Result<Task> {
        let task = self.task(task_id)?;

        if !task.requires_approval {
            return self.finish(task, TaskAction::Complete, actor, json!({}));
        }

        self.guard(&task, TaskAction::SubmitForReview)?;

        if let Some(decision) = self.route_completion(&task) {
            if decision.channel == Channel::Automatic {
                let payload = json!({
                    "rule_id": decision.rule_id,
                    "reason": decision.reason,
                    "requested_by": self.actor_label(actor),
                });
                return self.finish(task, TaskAction::AutoApprove, &Actor::System, payload);
            }
        }

        match task.approval_type.clone() {
            Some(flow_code) => self.submit_for_approval(task, &flow_code, selections, actor),
            None => self.transition(task, TaskAction::SubmitForReview, actor, json!({}), |_| {}),
        }
    }

    /// Settle a task in review with one of its outcome codes.
    ///
    /// Outcomes configured on the task win; `pass` and `reject` are always
    /// available otherwise. A `fail_rollback` outcome rejects the task first
    /// and then rolls back its target.
    pub fn submit_review(
        &self,
        task_id: TaskId,
        outcome_code: &str,
        comment: Option<&str>,
        actor: &Actor,
    ) -> Result<Task> {
        let task = self.task(task_id)?;
        if task.status != TaskStatus::Reviewing {
            let action = TaskAction::ReviewPass;
            debug!(task_id, status = %task.status, %action, "review on a task not in review");
            return Err(WorkflowError::InvalidTransition {
                task: task_id,
                status: task.status,
                action,
            });
        }

        let outcome = resolve_outcome(&task, outcome_code)?;
        let payload = json!({ "outcome": outcome_code, "comment": comment });

        match outcome {
            OutcomeAction::Pass => {
                let task = self.finish(task, TaskAction::ReviewPass, actor, payload)?;
                self.cancel_open_approval_logged(task_id, actor);
                Ok(task)
            }
            OutcomeAction::Reject => {
                let task =
                    self.transition(task, TaskAction::ReviewReject, actor, payload, |_| {})?;
                self.cancel_open_approval_logged(task_id, actor);
                Ok(task)
            }
            OutcomeAction::FailRollback { target, cascade } => {
                self.task_by_code(task.project_id, &target)?;
                let rejected =
                    self.transition(task, TaskAction::ReviewRollback, actor, payload, |_| {})?;
                self.cancel_open_approval_logged(task_id, actor);
                self.rollback_task(rejected.id, &target, cascade, actor)?;
                self.task(rejected.id)
            }
        }
    }

    /// Put a rejected task back to work.
    pub fn resume_task(&self, task_id: TaskId, actor: &Actor) -> Result<Task> {
        let task = self.task(task_id)?;
        self.transition(task, TaskAction::Resume, actor, json!({}), |_| {})
    }

    /// Cancel a task that is not finished yet, along with its open approval.
    pub fn cancel_task(&self, task_id: TaskId, reason: Option<&str>, actor: &Actor) -> Result<Task> {
        let task = self.task(task_id)?;
        let task =
            self.transition(task, TaskAction::Cancel, actor, json!({ "reason": reason }), |_| {})?;
        self.cancel_open_approval_logged(task_id, actor);
        Ok(task)
    }

    /// Action log of a task, oldest first.
    pub fn get_task_history(&self, task_id: TaskId) -> Result<Vec<TaskActionLog>> {
        self.task(task_id)?;
        self.store.task_logs(task_id)
    }

    /// Move every follower that became ready because `changed` moved.
    ///
    /// Each activated follower is itself re-checked, so a chain of ready
    /// tasks advances one hop at a time in the same call. Failures on one
    /// follower are logged and do not stop the others. A follower whose save
    /// loses a version race is re-read and activated if it is still pending
    /// and cleared.
    pub fn check_and_start_dependent_tasks(&self, changed: TaskId) -> Vec<Task> {
        let resolver = DependencyResolver::new(self.store.as_ref());
        let mut worklist = VecDeque::from([changed]);
        let mut activated = Vec::new();

        while let Some(id) = worklist.pop_front() {
            let ready = match resolver.ready_dependents(id) {
                Ok(ready) => ready,
                Err(err) => {
                    warn!(task_id = id, error = %err, "chain activation: cannot load dependents");
                    continue;
                }
            };

            for follower in ready {
                let follower_id = follower.id;
                match self.activate_follower(follower, id, &resolver) {
                    Ok(Some(task)) => {
                        self.announce_start(&task);
                        worklist.push_back(task.id);
                        activated.push(task);
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!(task_id = follower_id, error = %err, "chain activation failed");
                    }
                }
            }
        }

        activated
    }

    /// `Ok(None)` when a re-read shows the follower is no longer pending or
    /// no longer cleared.
    fn activate_follower(
        &self,
        mut follower: Task,
        trigger: TaskId,
        resolver: &DependencyResolver<'_>,
    ) -> Result<Option<Task>> {
        let follower_id = follower.id;
        let mut attempt = 1;

        loop {
            let now = Utc::now();
            match self.transition(
                follower,
                TaskAction::ChainActivate,
                &Actor::System,
                json!({ "trigger": trigger }),
                |t| t.actual_start = Some(now),
            ) {
                Ok(task) => return Ok(Some(task)),
                Err(err) if err.kind() == ErrorKind::Conflict && attempt < CONFLICT_ATTEMPTS => {
                    debug!(task_id = follower_id, attempt, "chain activation raced; re-reading");
                    attempt += 1;
                    follower = self.task(follower_id)?;
                    if follower.status != TaskStatus::Pending
                        || !resolver.blocking_predecessors(follower_id)?.is_empty()
                    {
                        debug!(task_id = follower_id, status = %follower.status, "follower no longer ready");
                        return Ok(None);
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// [`Engine::transition`] that re-reads the task and tries again while
    /// the save loses a version race. Used where an earlier step has already
    /// committed, so a lost race must not strand the task.
    pub(crate) fn transition_latest(
        &self,
        task: Task,
        action: TaskAction,
        actor: &Actor,
        payload: Value,
        mutate: impl Fn(&mut Task),
    ) -> Result<Task> {
        let task_id = task.id;
        let mut task = task;
        let mut attempt = 1;

        loop {
            match self.transition(task, action, actor, payload.clone(), &mutate) {
                Err(err) if err.kind() == ErrorKind::Conflict && attempt < CONFLICT_ATTEMPTS => {
                    debug!(task_id, %action, attempt, "transition raced; re-reading");
                    attempt += 1;
                    task = self.task(task_id)?;
                }
                other => return other,
            }
        }
    }

    /// Apply `action` to `task`: guard, write, log, publish.
    pub(crate) fn transition(
        &self,
        mut task: Task,
        action: TaskAction,
        actor: &Actor,
        payload: Value,
        mutate: impl FnOnce(&mut Task),
    ) -> Result<Task> {
        let from = task.status;
        let to = self.guard(&task, action)?;

        task.status = to;
        mutate(&mut task);
        let saved = self.store.save_task(&task)?;

        let actor = self.actor_label(actor);
        self.store.append_log(TaskActionLog {
            id: 0,
            task_id: saved.id,
            action,
            from_status: Some(from),
            to_status: to,
            actor: actor.clone(),
            payload,
            timestamp: Utc::now(),
        })?;

        info!(
            task_id = saved.id,
            code = %saved.code,
            %action,
            %from,
            %to,
            %actor,
            "task transition"
        );
        self.events.publish(EngineEvent::TaskChanged {
            project_id: saved.project_id,
            task_id: saved.id,
            action,
            from: Some(from),
            to,
        });

        Ok(saved)
    }

    /// Completion in any of its forms: progress, timestamp, external record
    /// and chain activation.
    pub(crate) fn finish(
        &self,
        task: Task,
        action: TaskAction,
        actor: &Actor,
        payload: Value,
    ) -> Result<Task> {
        let now = Utc::now();
        let task = self.transition_latest(task, action, actor, payload, |t| {
            t.progress = 100;
            t.completed_at = Some(now);
        })?;

        self.outbox
            .enqueue(OutboxMessage::CompleteExternalTask { task_id: task.id });
        self.check_and_start_dependent_tasks(task.id);
        Ok(task)
    }

    fn guard(&self, task: &Task, action: TaskAction) -> Result<TaskStatus> {
        action.target(task.status).ok_or_else(|| {
            debug!(task_id = task.id, status = %task.status, %action, "transition refused");
            WorkflowError::InvalidTransition {
                task: task.id,
                status: task.status,
                action,
            }
        })
    }

    fn route_completion(&self, task: &Task) -> Option<RoutingDecision> {
        let policy = self.routing.as_ref()?;
        let context = json!({
            "task_id": task.id,
            "project_id": task.project_id,
            "code": task.code,
            "phase": task.phase,
            "approval_type": task.approval_type,
            "assignee": task.assignee,
        });

        match policy.evaluate(TASK_DOMAIN, COMPLETE_EVENT, &context) {
            Ok(decision) => {
                debug!(
                    task_id = task.id,
                    channel = ?decision.channel,
                    rule_id = ?decision.rule_id,
                    "routing decision"
                );
                Some(decision)
            }
            Err(err) => {
                warn!(task_id = task.id, error = %err, "routing policy failed; routing to review");
                None
            }
        }
    }

    pub(crate) fn announce_assignment(&self, task: &Task) {
        let Some(user) = &task.assignee else {
            return;
        };

        if task.external_id.is_none() {
            self.outbox.enqueue(OutboxMessage::CreateExternalTask {
                task_id: task.id,
                summary: task.name.clone(),
                description: format!("{} ({})", task.name, task.code),
                assignee: user.clone(),
            });
        }
        self.outbox.enqueue(OutboxMessage::Notify {
            user: user.clone(),
            payload: json!({
                "kind": "task_assigned",
                "task_id": task.id,
                "project_id": task.project_id,
                "code": task.code,
                "name": task.name,
                "planned_end": task.planned_end,
            }),
        });
    }

    fn announce_start(&self, task: &Task) {
        self.outbox.enqueue(OutboxMessage::ProcurementControl {
            project_id: task.project_id,
            task_id: task.id,
            code: task.code.clone(),
        });
    }
}

fn resolve_outcome(task: &Task, code: &str) -> Result<OutcomeAction> {
    if let Some(outcome) = task.outcome(code) {
        return Ok(outcome.action.clone());
    }
    match code {
        "pass" => Ok(OutcomeAction::Pass),
        "reject" => Ok(OutcomeAction::Reject),
        _ => Err(WorkflowError::UnknownOutcome {
            task: task.id,
            code: code.to_string(),
        }),
    }
}
