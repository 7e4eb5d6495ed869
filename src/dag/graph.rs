// src/dag/graph.rs

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::errors::{Result, WorkflowError};
use crate::model::{ProjectTemplate, TemplateTaskDependency};

/// Incoming edges of one template task.
#[derive(Debug, Clone, Default)]
struct TemplateNode {
    deps: Vec<TemplateTaskDependency>,
}

/// Dependency adjacency of a template, keyed by task code.
///
/// Edges pointing at codes that are not tasks of the template are dropped
/// with the rest of the graph left intact; config validation reports them.
#[derive(Debug, Clone)]
pub struct TemplateGraph {
    nodes: HashMap<String, TemplateNode>,
}

impl TemplateGraph {
    pub fn from_template(template: &ProjectTemplate) -> Self {
        let mut nodes: HashMap<String, TemplateNode> = template
            .tasks
            .iter()
            .map(|t| (t.code.clone(), TemplateNode::default()))
            .collect();

        for dep in &template.dependencies {
            if !nodes.contains_key(&dep.depends_on_code) {
                continue;
            }
            if let Some(node) = nodes.get_mut(&dep.task_code) {
                node.deps.push(dep.clone());
            }
        }

        Self { nodes }
    }

    /// Return all task codes.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    pub fn contains(&self, code: &str) -> bool {
        self.nodes.contains_key(code)
    }

    /// Incoming edges of a task (the tasks it waits for).
    pub fn dependencies_of(&self, code: &str) -> &[TemplateTaskDependency] {
        self.nodes
            .get(code)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Fails with [`WorkflowError::DagCycle`] if the edges form a cycle.
    pub fn ensure_acyclic(&self) -> Result<()> {
        // Edge direction: predecessor -> dependent.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

        for code in self.nodes.keys() {
            graph.add_node(code.as_str());
        }
        for (code, node) in &self.nodes {
            for dep in &node.deps {
                graph.add_edge(dep.depends_on_code.as_str(), code.as_str(), ());
            }
        }

        match toposort(&graph, None) {
            Ok(_order) => Ok(()),
            Err(cycle) => Err(WorkflowError::DagCycle(format!(
                "cycle detected in template dependencies involving task '{}'",
                cycle.node_id()
            ))),
        }
    }
}
