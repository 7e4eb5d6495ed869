// src/engine/approval.rs

//! Approval router.
//!
//! A request runs over a frozen copy of its flow. Only `approve` nodes have
//! reviewers; `current_node` always points at one of them while the request
//! is pending and only ever moves forward.
//!
//! - A node is done when all of its reviewers approved; the next `approve`
//!   node is then materialised together with the `current_node` move.
//! - After the last node the request is `approved` and the task completes
//!   (or is confirmed, with `confirm_on_approve`).
//! - Any single reject closes the whole request and sends the task back to
//!   `in_progress`.

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::errors::{ErrorKind, Result, WorkflowError};
use crate::events::EngineEvent;
use crate::model::{
    Actor, ApprovalId, ApprovalRequest, ApprovalReviewer, ApproveNode, FlowNode, NewApproval,
    NewReviewer, Task, TaskId, UserId,
};
use crate::outbox::OutboxMessage;
use crate::types::{ApprovalStatus, ApproverType, ReviewerStatus, TaskAction};

/// Approvers of one `approve` node, deduplicated in listed order.
pub fn resolve_approvers(
    node_index: usize,
    node: &ApproveNode,
    submitter: &str,
    selections: &BTreeMap<usize, Vec<UserId>>,
) -> Result<Vec<UserId>> {
    let candidates = match node.approver {
        ApproverType::Designated => node.approvers.clone(),
        ApproverType::SelfSelect => selections.get(&node_index).cloned().unwrap_or_default(),
        ApproverType::Submitter => vec![submitter.to_string()],
        // No org chart here: only an explicit list can resolve these.
        ApproverType::Supervisor | ApproverType::DeptLeader | ApproverType::Role => {
            node.approvers.clone()
        }
    };

    let mut seen = HashSet::new();
    let approvers: Vec<UserId> = candidates
        .into_iter()
        .filter(|u| !u.trim().is_empty() && seen.insert(u.clone()))
        .collect();

    if approvers.is_empty() {
        let reason = match node.approver {
            ApproverType::Designated => "node lists no designated approvers",
            ApproverType::SelfSelect => "submitter selected no approvers for this node",
            ApproverType::Submitter => "submitter is unknown",
            ApproverType::Supervisor | ApproverType::DeptLeader | ApproverType::Role => {
                "no explicit approvers listed and org-chart lookup is unavailable"
            }
        };
        return Err(WorkflowError::ApproverUnresolved {
            node: node_index,
            reason: reason.to_string(),
        });
    }

    Ok(approvers)
}

fn reviewer_rows(node_index: usize, users: Vec<UserId>) -> Vec<NewReviewer> {
    users
        .into_iter()
        .enumerate()
        .map(|(i, user)| NewReviewer {
            user,
            node_index,
            sequence: i as u32 + 1,
        })
        .collect()
}

impl Engine {
    /// Send `task` into review under the approval flow `flow_code`.
    ///
    /// Every approve node is resolved before the task moves, so a
    /// submission either fails untouched or can run to its last node. A flow
    /// without approve nodes is approved on the spot.
    pub(crate) fn submit_for_approval(
        &self,
        task: Task,
        flow_code: &str,
        selections: BTreeMap<usize, Vec<UserId>>,
        actor: &Actor,
    ) -> Result<Task> {
        let flow = self
            .store
            .flow(flow_code)?
            .ok_or_else(|| WorkflowError::FlowNotFound(flow_code.to_string()))?;
        let submitter = self.actor_label(actor);

        let mut first: Option<(usize, Vec<NewReviewer>)> = None;
        for (idx, node) in flow.nodes.iter().enumerate() {
            if let FlowNode::Approve(approve) = node {
                let users = resolve_approvers(idx, approve, &submitter, &selections)?;
                if first.is_none() {
                    first = Some((idx, reviewer_rows(idx, users)));
                }
            }
        }

        let task = self.transition(
            task,
            TaskAction::SubmitForReview,
            actor,
            json!({ "flow": flow_code }),
            |_| {},
        )?;

        let auto_approve = first.is_none();
        let (current_node, reviewers) = first.unwrap_or_default();
        let request = self.store.insert_approval(
            NewApproval {
                task_id: task.id,
                project_id: task.project_id,
                flow_code: flow_code.to_string(),
                flow_snapshot: flow,
                current_node,
                submitter,
                selections,
            },
            reviewers.clone(),
        )?;
        info!(
            approval_id = request.id,
            task_id = task.id,
            flow = %flow_code,
            node = current_node,
            reviewers = reviewers.len(),
            "approval requested"
        );
        self.publish_approval(&request);

        if auto_approve {
            self.close_approved(request, &Actor::System)?;
            return self.task(task.id);
        }

        for reviewer in &reviewers {
            self.notify_reviewer(&request, &task, &reviewer.user);
        }
        Ok(task)
    }

    /// Record `user`'s approval at the current node of `approval_id`.
    pub fn approve(
        &self,
        approval_id: ApprovalId,
        user: &str,
        comment: Option<&str>,
    ) -> Result<ApprovalRequest> {
        let request = self.open_approval(approval_id)?;
        let reviewer = self.pending_reviewer(&request, user)?;
        self.store.decide_reviewer(
            reviewer.id,
            ReviewerStatus::Approved,
            comment.map(str::to_string),
            Utc::now(),
        )?;
        info!(approval_id, node = request.current_node, %user, "reviewer approved");

        let waiting = self
            .store
            .reviewers(approval_id)?
            .iter()
            .filter(|r| r.node_index == request.current_node)
            .any(|r| r.status == ReviewerStatus::Pending);
        if waiting {
            debug!(approval_id, node = request.current_node, "node still has pending reviewers");
            return self.approval(approval_id);
        }

        let next = request
            .flow_snapshot
            .next_approve_node(request.current_node + 1)
            .map(|(idx, node)| (idx, node.clone()));

        let Some((next_node, node)) = next else {
            return self.close_approved(request, &Actor::user(user));
        };

        let users = resolve_approvers(next_node, &node, &request.submitter, &request.selections)?;
        let reviewers = reviewer_rows(next_node, users);

        match self
            .store
            .advance_approval(approval_id, request.current_node, next_node, reviewers.clone())
        {
            Ok(advanced) => {
                info!(
                    approval_id,
                    from = request.current_node,
                    to = next_node,
                    "approval advanced"
                );
                self.publish_approval(&advanced);
                if let Ok(task) = self.task(advanced.task_id) {
                    for reviewer in &reviewers {
                        self.notify_reviewer(&advanced, &task, &reviewer.user);
                    }
                }
                Ok(advanced)
            }
            Err(err) if err.kind() == ErrorKind::Conflict => {
                debug!(approval_id, "approval already advanced by a concurrent decision");
                self.approval(approval_id)
            }
            Err(err) => Err(err),
        }
    }

    /// Record `user`'s rejection. Closes the whole request.
    pub fn reject(
        &self,
        approval_id: ApprovalId,
        user: &str,
        comment: Option<&str>,
    ) -> Result<ApprovalRequest> {
        let request = self.open_approval(approval_id)?;
        let reviewer = self.pending_reviewer(&request, user)?;
        let now = Utc::now();
        self.store.decide_reviewer(
            reviewer.id,
            ReviewerStatus::Rejected,
            comment.map(str::to_string),
            now,
        )?;

        let mut closed = request;
        closed.status = ApprovalStatus::Rejected;
        closed.finished_at = Some(now);
        let closed = self.store.save_approval(&closed)?;
        self.cancel_pending_reviewers(closed.id);
        info!(approval_id, node = closed.current_node, %user, "approval rejected");
        self.publish_approval(&closed);

        let task = self.task(closed.task_id)?;
        self.transition_latest(
            task,
            TaskAction::ApprovalRejected,
            &Actor::user(user),
            json!({ "approval_id": closed.id, "comment": comment }),
            |_| {},
        )?;

        self.notify_submitter(&closed, "rejected", user);
        Ok(closed)
    }

    pub fn approval(&self, approval_id: ApprovalId) -> Result<ApprovalRequest> {
        self.store
            .approval(approval_id)?
            .ok_or(WorkflowError::ApprovalNotFound(approval_id))
    }

    /// The pending approval request of a task, if it has one.
    pub fn open_approval_for(&self, task_id: TaskId) -> Result<Option<ApprovalRequest>> {
        self.task(task_id)?;
        self.store.open_approval_for_task(task_id)
    }

    /// Reviewer rows of a request ordered by node, then sequence.
    pub fn reviewers_of(&self, approval_id: ApprovalId) -> Result<Vec<ApprovalReviewer>> {
        self.approval(approval_id)?;
        let mut rows = self.store.reviewers(approval_id)?;
        rows.sort_by_key(|r| (r.node_index, r.sequence));
        Ok(rows)
    }

    /// Cancel the pending request of `task_id` and its undecided reviewers.
    pub(crate) fn cancel_open_approval(
        &self,
        task_id: TaskId,
        actor: &Actor,
    ) -> Result<Option<ApprovalRequest>> {
        let Some(mut request) = self.store.open_approval_for_task(task_id)? else {
            return Ok(None);
        };

        request.status = ApprovalStatus::Canceled;
        request.finished_at = Some(Utc::now());
        let request = self.store.save_approval(&request)?;
        self.cancel_pending_reviewers(request.id);

        info!(
            approval_id = request.id,
            task_id,
            actor = %self.actor_label(actor),
            "approval canceled"
        );
        self.publish_approval(&request);
        Ok(Some(request))
    }

    /// [`Engine::cancel_open_approval`] for callers whose task transition
    /// has already committed: a failure is logged, not returned.
    pub(crate) fn cancel_open_approval_logged(&self, task_id: TaskId, actor: &Actor) {
        if let Err(err) = self.cancel_open_approval(task_id, actor) {
            warn!(task_id, error = %err, "cannot cancel open approval");
        }
    }

    fn close_approved(&self, request: ApprovalRequest, actor: &Actor) -> Result<ApprovalRequest> {
        let mut request = request;
        request.status = ApprovalStatus::Approved;
        request.finished_at = Some(Utc::now());
        let request = self.store.save_approval(&request)?;
        info!(approval_id = request.id, task_id = request.task_id, "approval approved");
        self.publish_approval(&request);

        let action = if request.flow_snapshot.confirm_on_approve {
            TaskAction::ApprovalConfirmed
        } else {
            TaskAction::ApprovalApproved
        };
        let task = self.task(request.task_id)?;
        self.finish(task, action, actor, json!({ "approval_id": request.id }))?;

        self.notify_submitter(&request, "approved", &self.actor_label(actor));
        Ok(request)
    }

    fn open_approval(&self, approval_id: ApprovalId) -> Result<ApprovalRequest> {
        let request = self.approval(approval_id)?;
        if request.status != ApprovalStatus::Pending {
            debug!(approval_id, status = ?request.status, "decision on a closed approval");
            return Err(WorkflowError::ApprovalClosed(approval_id));
        }
        Ok(request)
    }

    fn pending_reviewer(&self, request: &ApprovalRequest, user: &str) -> Result<ApprovalReviewer> {
        self.store
            .reviewers(request.id)?
            .into_iter()
            .find(|r| {
                r.node_index == request.current_node
                    && r.user == user
                    && r.status == ReviewerStatus::Pending
            })
            .ok_or_else(|| WorkflowError::ReviewerNotPending {
                approval: request.id,
                user: user.to_string(),
            })
    }

    fn cancel_pending_reviewers(&self, approval_id: ApprovalId) {
        let rows = match self.store.reviewers(approval_id) {
            Ok(rows) => rows,
            Err(err) => {
                warn!(approval_id, error = %err, "cannot load reviewers to cancel");
                return;
            }
        };

        let now = Utc::now();
        for row in rows.into_iter().filter(|r| r.status == ReviewerStatus::Pending) {
            match self
                .store
                .decide_reviewer(row.id, ReviewerStatus::Canceled, None, now)
            {
                Ok(_) => {}
                Err(err) if err.kind() == ErrorKind::Conflict => {
                    debug!(approval_id, reviewer = row.id, "reviewer decided concurrently");
                }
                Err(err) => {
                    warn!(approval_id, reviewer = row.id, error = %err, "cannot cancel reviewer");
                }
            }
        }
    }

    fn publish_approval(&self, request: &ApprovalRequest) {
        self.events.publish(EngineEvent::ApprovalChanged {
            approval_id: request.id,
            task_id: request.task_id,
            status: request.status,
            current_node: request.current_node,
        });
    }

    fn notify_reviewer(&self, request: &ApprovalRequest, task: &Task, user: &str) {
        self.outbox.enqueue(OutboxMessage::Notify {
            user: user.to_string(),
            payload: json!({
                "kind": "approval_requested",
                "approval_id": request.id,
                "task_id": task.id,
                "code": task.code,
                "name": task.name,
                "node": request.current_node,
                "submitter": request.submitter,
            }),
        });
    }

    fn notify_submitter(&self, request: &ApprovalRequest, result: &str, decided_by: &str) {
        self.outbox.enqueue(OutboxMessage::Notify {
            user: request.submitter.clone(),
            payload: json!({
                "kind": "approval_result",
                "approval_id": request.id,
                "task_id": request.task_id,
                "result": result,
                "decided_by": decided_by,
            }),
        });
    }
}
