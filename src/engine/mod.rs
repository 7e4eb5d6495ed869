// src/engine/mod.rs

//! Task workflow engine.
//!
//! [`Engine`] is the single entry point for task actions. Its operations are
//! split by concern:
//! - [`machine`]: the task state machine (assign, start, complete, review,
//!   resume, cancel) and dependency chain activation.
//! - [`approval`]: approver resolution and multi-node approval requests.
//! - [`rollback`]: rollback of a target task with an optional same-phase
//!   cascade.
//! - [`instantiate`]: project creation from a template and phase roles.
//! - [`routing`]: the optional auto-approval policy contract.
//!
//! Every operation is synchronous against the [`Store`]. External side
//! effects go through the [`OutboxHandle`] and live updates through the
//! [`EventHub`]; neither can fail an operation.

use std::sync::Arc;

use tracing::debug;

use crate::config::{ConfigFile, EngineSettings};
use crate::errors::{Result, WorkflowError};
use crate::events::EventHub;
use crate::model::{Actor, ProjectId, Task, TaskId};
use crate::outbox::OutboxHandle;
use crate::store::Store;

pub mod approval;
pub mod instantiate;
pub mod machine;
pub mod rollback;
pub mod routing;

pub use instantiate::{InstantiatedProject, PhaseRole};
pub use rollback::RollbackReport;
pub use routing::{Channel, RoutingDecision, RoutingPolicy};

#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn Store>,
    outbox: OutboxHandle,
    events: EventHub,
    routing: Option<Arc<dyn RoutingPolicy>>,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(
        store: Arc<dyn Store>,
        outbox: OutboxHandle,
        events: EventHub,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            outbox,
            events,
            routing: None,
            settings,
        }
    }

    /// Consult `policy` before sending a task into review.
    pub fn with_routing_policy(mut self, policy: Arc<dyn RoutingPolicy>) -> Self {
        self.routing = Some(policy);
        self
    }

    /// Make every template and approval flow of `cfg` available to the
    /// engine.
    pub fn register_definitions(&self, cfg: &ConfigFile) -> Result<()> {
        for (code, flow) in &cfg.flows {
            self.store.put_flow(code, flow.clone())?;
        }
        for template in cfg.templates.values() {
            self.store.put_template(template.clone())?;
        }
        debug!(
            flows = cfg.flows.len(),
            templates = cfg.templates.len(),
            "registered definitions"
        );
        Ok(())
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn events(&self) -> &EventHub {
        &self.events
    }

    pub fn task(&self, id: TaskId) -> Result<Task> {
        self.store.task(id)?.ok_or(WorkflowError::TaskNotFound(id))
    }

    pub fn task_by_code(&self, project: ProjectId, code: &str) -> Result<Task> {
        self.store
            .task_by_code(project, code)?
            .ok_or_else(|| WorkflowError::TaskCodeNotFound {
                project,
                code: code.to_string(),
            })
    }

    /// Tasks of a project ordered by sequence.
    pub fn project_tasks(&self, project: ProjectId) -> Result<Vec<Task>> {
        self.store
            .project(project)?
            .ok_or(WorkflowError::ProjectNotFound(project))?;
        self.store.project_tasks(project)
    }

    fn actor_label(&self, actor: &Actor) -> String {
        actor.label(&self.settings.system_actor)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("store", &self.store)
            .field("routing", &self.routing.is_some())
            .field("settings", &self.settings)
            .finish()
    }
}
