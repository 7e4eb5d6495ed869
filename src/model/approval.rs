// src/model/approval.rs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{ApprovalId, ProjectId, ReviewerId, TaskId, UserId};
use crate::types::{ApprovalStatus, ApproverType, MultiApprove, ReviewerStatus};

/// An approval definition: an ordered pipeline of flow nodes.
///
/// In TOML:
///
/// ```toml
/// [approval.design_review]
/// confirm_on_approve = false
///
/// [[approval.design_review.node]]
/// type = "submit"
///
/// [[approval.design_review.node]]
/// type = "approve"
/// approver = "designated"
/// approvers = ["alice", "bob"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlowSchema {
    /// Move the task to `confirmed` instead of `completed` once approved.
    #[serde(default)]
    pub confirm_on_approve: bool,

    #[serde(default, rename = "node")]
    pub nodes: Vec<FlowNode>,
}

impl FlowSchema {
    /// First `approve` node at or after `from`.
    pub fn next_approve_node(&self, from: usize) -> Option<(usize, &ApproveNode)> {
        self.nodes
            .iter()
            .enumerate()
            .skip(from)
            .find_map(|(idx, node)| match node {
                FlowNode::Approve(approve) => Some((idx, approve)),
                FlowNode::Submit { .. } | FlowNode::End { .. } => None,
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowNode {
    Submit {
        #[serde(default)]
        name: String,
    },
    Approve(ApproveNode),
    End {
        #[serde(default)]
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveNode {
    #[serde(default)]
    pub name: String,
    pub approver: ApproverType,
    /// Explicit approver ids; required for `designated`, used as the
    /// fallback for org-chart based types.
    #[serde(default)]
    pub approvers: Vec<UserId>,
    #[serde(default)]
    pub multi_approve: MultiApprove,
}

/// A running approval for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: ApprovalId,
    pub task_id: TaskId,
    pub project_id: ProjectId,
    pub flow_code: String,
    /// Frozen copy of the flow taken at submission.
    pub flow_snapshot: FlowSchema,
    pub status: ApprovalStatus,
    /// Index into `flow_snapshot.nodes`; never decreases.
    pub current_node: usize,
    pub submitter: UserId,
    /// Approvers chosen by the submitter for `self_select` nodes.
    pub selections: BTreeMap<usize, Vec<UserId>>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// One approver at one node of a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalReviewer {
    pub id: ReviewerId,
    pub approval_id: ApprovalId,
    pub user: UserId,
    pub node_index: usize,
    pub sequence: u32,
    pub status: ReviewerStatus,
    pub comment: Option<String>,
    /// Set once; the row is immutable afterwards.
    pub decided_at: Option<DateTime<Utc>>,
}

/// Insert payload for a reviewer row.
#[derive(Debug, Clone)]
pub struct NewReviewer {
    pub user: UserId,
    pub node_index: usize,
    pub sequence: u32,
}

/// Insert payload for an approval request; the store assigns `id`,
/// `version` and `created_at`, and starts it `pending`.
#[derive(Debug, Clone)]
pub struct NewApproval {
    pub task_id: TaskId,
    pub project_id: ProjectId,
    pub flow_code: String,
    pub flow_snapshot: FlowSchema,
    pub current_node: usize,
    pub submitter: UserId,
    pub selections: BTreeMap<usize, Vec<UserId>>,
}
