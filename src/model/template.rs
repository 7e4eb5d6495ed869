// src/model/template.rs

use serde::{Deserialize, Serialize};

use crate::model::ReviewOutcome;
use crate::types::{DependencyType, TaskKind};

/// A validated project template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectTemplate {
    pub id: String,
    pub name: String,
    /// Ordered by `sequence`.
    pub tasks: Vec<TemplateTask>,
    pub dependencies: Vec<TemplateTaskDependency>,
}

impl ProjectTemplate {
    pub fn task(&self, code: &str) -> Option<&TemplateTask> {
        self.tasks.iter().find(|t| t.code == code)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateTask {
    pub code: String,
    pub name: String,
    pub kind: TaskKind,
    pub parent_code: Option<String>,
    pub phase: Option<String>,
    pub estimated_days: u32,
    pub default_role: Option<String>,
    pub requires_approval: bool,
    pub approval_type: Option<String>,
    pub outcomes: Vec<ReviewOutcome>,
    pub sequence: u32,
}

/// Edge `task_code` depends on `depends_on_code`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateTaskDependency {
    pub task_code: String,
    pub depends_on_code: String,
    pub dep_type: DependencyType,
    pub lag_days: i32,
}
