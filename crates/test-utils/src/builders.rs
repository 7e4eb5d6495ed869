#![allow(dead_code)]

use plmflow::model::{
    ApproveNode, FlowNode, FlowSchema, ProjectTemplate, ReviewOutcome, TemplateTask,
    TemplateTaskDependency,
};
use plmflow::types::{ApproverType, DependencyType, MultiApprove, OutcomeAction, TaskKind};

/// Builder for `ProjectTemplate` to simplify test setup.
///
/// Tasks added without an explicit sequence get their 1-based insertion
/// position.
pub struct TemplateBuilder {
    template: ProjectTemplate,
}

impl TemplateBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            template: ProjectTemplate {
                id: id.to_string(),
                name: id.to_string(),
                tasks: Vec::new(),
                dependencies: Vec::new(),
            },
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.template.name = name.to_string();
        self
    }

    pub fn with_task(mut self, mut task: TemplateTask) -> Self {
        if task.sequence == 0 {
            task.sequence = self.template.tasks.len() as u32 + 1;
        }
        self.template.tasks.push(task);
        self
    }

    pub fn depends(mut self, task: &str, on: &str, dep_type: DependencyType, lag_days: i32) -> Self {
        self.template.dependencies.push(TemplateTaskDependency {
            task_code: task.to_string(),
            depends_on_code: on.to_string(),
            dep_type,
            lag_days,
        });
        self
    }

    /// Finish-to-start edge without lag.
    pub fn after(self, task: &str, on: &str) -> Self {
        self.depends(task, on, DependencyType::FinishToStart, 0)
    }

    pub fn build(self) -> ProjectTemplate {
        self.template
    }
}

/// Builder for `TemplateTask`.
pub struct TemplateTaskBuilder {
    task: TemplateTask,
}

impl TemplateTaskBuilder {
    pub fn new(code: &str) -> Self {
        Self {
            task: TemplateTask {
                code: code.to_string(),
                name: code.to_string(),
                kind: TaskKind::Task,
                parent_code: None,
                phase: None,
                estimated_days: 0,
                default_role: None,
                requires_approval: false,
                approval_type: None,
                outcomes: Vec::new(),
                sequence: 0,
            },
        }
    }

    pub fn milestone(code: &str) -> Self {
        Self::new(code).kind(TaskKind::Milestone)
    }

    pub fn subtask(code: &str) -> Self {
        Self::new(code).kind(TaskKind::Subtask)
    }

    pub fn kind(mut self, kind: TaskKind) -> Self {
        self.task.kind = kind;
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.task.name = name.to_string();
        self
    }

    pub fn parent(mut self, code: &str) -> Self {
        self.task.parent_code = Some(code.to_string());
        self
    }

    pub fn phase(mut self, phase: &str) -> Self {
        self.task.phase = Some(phase.to_string());
        self
    }

    pub fn days(mut self, days: u32) -> Self {
        self.task.estimated_days = days;
        self
    }

    pub fn role(mut self, role: &str) -> Self {
        self.task.default_role = Some(role.to_string());
        self
    }

    /// Review without an approval flow.
    pub fn reviewed(mut self) -> Self {
        self.task.requires_approval = true;
        self
    }

    /// Review through the approval flow `flow`.
    pub fn approval(mut self, flow: &str) -> Self {
        self.task.requires_approval = true;
        self.task.approval_type = Some(flow.to_string());
        self
    }

    pub fn outcome(mut self, code: &str, action: OutcomeAction) -> Self {
        self.task.outcomes.push(ReviewOutcome {
            code: code.to_string(),
            action,
        });
        self
    }

    pub fn sequence(mut self, sequence: u32) -> Self {
        self.task.sequence = sequence;
        self
    }

    pub fn build(self) -> TemplateTask {
        self.task
    }
}

/// Builder for `FlowSchema`.
pub struct FlowBuilder {
    flow: FlowSchema,
}

impl FlowBuilder {
    pub fn new() -> Self {
        Self {
            flow: FlowSchema {
                confirm_on_approve: false,
                nodes: Vec::new(),
            },
        }
    }

    pub fn submit(mut self) -> Self {
        self.flow.nodes.push(FlowNode::Submit {
            name: "submit".to_string(),
        });
        self
    }

    pub fn approve(mut self, approver: ApproverType, approvers: &[&str]) -> Self {
        let index = self.flow.nodes.len();
        self.flow.nodes.push(FlowNode::Approve(ApproveNode {
            name: format!("approve-{index}"),
            approver,
            approvers: approvers.iter().map(|s| s.to_string()).collect(),
            multi_approve: MultiApprove::All,
        }));
        self
    }

    pub fn designated(self, approvers: &[&str]) -> Self {
        self.approve(ApproverType::Designated, approvers)
    }

    pub fn end(mut self) -> Self {
        self.flow.nodes.push(FlowNode::End {
            name: "end".to_string(),
        });
        self
    }

    pub fn confirm_on_approve(mut self) -> Self {
        self.flow.confirm_on_approve = true;
        self
    }

    pub fn build(self) -> FlowSchema {
        self.flow
    }
}

impl Default for FlowBuilder {
    fn default() -> Self {
        Self::new()
    }
}
