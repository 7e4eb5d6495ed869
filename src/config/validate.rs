// src/config/validate.rs

use std::collections::{BTreeMap, HashSet};

use tracing::warn;

use crate::config::model::{ConfigFile, RawConfigFile, TemplateConfig};
use crate::dag::TemplateGraph;
use crate::errors::{Result, WorkflowError};
use crate::model::{FlowNode, FlowSchema, ProjectTemplate, TemplateTask, TemplateTaskDependency};
use crate::types::{ApproverType, OutcomeAction, TaskKind};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::WorkflowError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;

        let mut templates = BTreeMap::new();
        for (id, cfg) in &raw.template {
            let template = template_from_config(id, cfg);
            validate_template(&template)?;
            validate_flow_references(&template, &raw.approval)?;
            templates.insert(id.clone(), template);
        }

        Ok(ConfigFile::new_unchecked(
            raw.engine,
            raw.outbox,
            raw.approval,
            templates,
        ))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_content(cfg)?;
    validate_engine_config(cfg)?;
    validate_outbox_config(cfg)?;
    for (code, flow) in &cfg.approval {
        validate_flow(code, flow)?;
    }
    Ok(())
}

fn ensure_has_content(cfg: &RawConfigFile) -> Result<()> {
    if cfg.template.is_empty() && cfg.approval.is_empty() {
        return Err(WorkflowError::ConfigError(
            "config must contain at least one [template.<id>] or [approval.<code>] section"
                .to_string(),
        ));
    }
    Ok(())
}

fn validate_engine_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.engine.system_actor.trim().is_empty() {
        return Err(WorkflowError::ConfigError(
            "[engine].system_actor must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_outbox_config(cfg: &RawConfigFile) -> Result<()> {
    let outbox = &cfg.outbox;

    if outbox.queue_length == 0 {
        return Err(WorkflowError::ConfigError(
            "[outbox].queue_length must be >= 1 (got 0)".to_string(),
        ));
    }
    if outbox.max_attempts == 0 {
        return Err(WorkflowError::ConfigError(
            "[outbox].max_attempts must be >= 1 (got 0)".to_string(),
        ));
    }
    if outbox.max_backoff_ms < outbox.initial_backoff_ms {
        return Err(WorkflowError::ConfigError(format!(
            "[outbox].max_backoff_ms ({}) must be >= initial_backoff_ms ({})",
            outbox.max_backoff_ms, outbox.initial_backoff_ms
        )));
    }
    Ok(())
}

fn validate_flow(code: &str, flow: &FlowSchema) -> Result<()> {
    let mut has_approve = false;

    for (idx, node) in flow.nodes.iter().enumerate() {
        let FlowNode::Approve(approve) = node else {
            continue;
        };
        has_approve = true;

        if approve.approver == ApproverType::Designated && approve.approvers.is_empty() {
            return Err(WorkflowError::ConfigError(format!(
                "approval '{code}' node {idx} uses designated approvers but lists none"
            )));
        }
    }

    if !has_approve {
        warn!(flow = %code, "approval flow has no approve node; submissions auto-approve");
    }
    Ok(())
}

fn validate_flow_references(
    template: &ProjectTemplate,
    flows: &BTreeMap<String, FlowSchema>,
) -> Result<()> {
    for task in &template.tasks {
        if let Some(flow) = &task.approval_type {
            if !flows.contains_key(flow) {
                return Err(WorkflowError::ConfigError(format!(
                    "template '{}' task '{}' references unknown approval_type '{}'",
                    template.id, task.code, flow
                )));
            }
        }
    }
    Ok(())
}

/// Structural checks on a template: parents, kinds, dependency references,
/// rollback targets and cycles.
pub fn validate_template(template: &ProjectTemplate) -> Result<()> {
    let codes: HashSet<&str> = template.tasks.iter().map(|t| t.code.as_str()).collect();

    for task in &template.tasks {
        validate_parent(template, task)?;

        for outcome in &task.outcomes {
            if let OutcomeAction::FailRollback { target, .. } = &outcome.action {
                if !codes.contains(target.as_str()) {
                    return Err(WorkflowError::ConfigError(format!(
                        "template '{}' task '{}' outcome '{}' rolls back to unknown task '{}'",
                        template.id, task.code, outcome.code, target
                    )));
                }
            }
        }
    }

    for dep in &template.dependencies {
        if !codes.contains(dep.depends_on_code.as_str()) {
            return Err(WorkflowError::ConfigError(format!(
                "template '{}' task '{}' has unknown dependency '{}'",
                template.id, dep.task_code, dep.depends_on_code
            )));
        }
        if dep.task_code == dep.depends_on_code {
            return Err(WorkflowError::ConfigError(format!(
                "template '{}' task '{}' cannot depend on itself",
                template.id, dep.task_code
            )));
        }
    }

    TemplateGraph::from_template(template).ensure_acyclic()
}

fn validate_parent(template: &ProjectTemplate, task: &TemplateTask) -> Result<()> {
    let Some(parent_code) = &task.parent_code else {
        return Ok(());
    };

    let parent = template.task(parent_code).ok_or_else(|| {
        WorkflowError::ConfigError(format!(
            "template '{}' task '{}' has unknown parent '{}'",
            template.id, task.code, parent_code
        ))
    })?;

    let allowed = match task.kind {
        TaskKind::Milestone => false,
        TaskKind::Task => parent.kind == TaskKind::Milestone,
        TaskKind::Subtask => matches!(parent.kind, TaskKind::Milestone | TaskKind::Task),
    };

    if !allowed {
        return Err(WorkflowError::ConfigError(format!(
            "template '{}': a {} ('{}') cannot have a {} parent ('{}')",
            template.id, task.kind, task.code, parent.kind, parent.code
        )));
    }
    Ok(())
}

/// Convert a `[template.<id>]` section into a [`ProjectTemplate`].
fn template_from_config(id: &str, cfg: &TemplateConfig) -> ProjectTemplate {
    let mut tasks = Vec::with_capacity(cfg.task.len());
    let mut dependencies = Vec::new();

    for (position, (code, tc)) in cfg.task.iter().enumerate() {
        tasks.push(TemplateTask {
            code: code.clone(),
            name: tc.name.clone().unwrap_or_else(|| code.clone()),
            kind: tc.kind,
            parent_code: tc.parent.clone(),
            phase: tc.phase.clone(),
            estimated_days: tc.estimated_days,
            default_role: tc.default_role.clone(),
            requires_approval: tc.requires_approval,
            approval_type: tc.approval_type.clone(),
            outcomes: tc.outcomes.clone(),
            sequence: tc.sequence.unwrap_or(position as u32 + 1),
        });

        for dep in &tc.depends_on {
            dependencies.push(TemplateTaskDependency {
                task_code: code.clone(),
                depends_on_code: dep.code.clone(),
                dep_type: dep.dep_type,
                lag_days: dep.lag_days,
            });
        }
    }

    tasks.sort_by(|a, b| a.sequence.cmp(&b.sequence).then_with(|| a.code.cmp(&b.code)));

    ProjectTemplate {
        id: id.to_string(),
        name: cfg.name.clone(),
        tasks,
        dependencies,
    }
}
