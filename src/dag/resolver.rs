// src/dag/resolver.rs

//! Dependency satisfaction for project tasks.
//!
//! This is read-only: it answers "may this task start?" and "which
//! followers of this task are ready?". Moving the ready followers is done by
//! the engine, which owns transitions and logging.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::errors::{Result, WorkflowError};
use crate::model::{Task, TaskId};
use crate::store::Store;
use crate::types::TaskStatus;

pub struct DependencyResolver<'a> {
    store: &'a dyn Store,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Predecessors of `task` whose edge is not cleared yet.
    ///
    /// A predecessor row that cannot be found counts as blocking.
    pub fn blocking_predecessors(&self, task: TaskId) -> Result<Vec<TaskId>> {
        let mut blocking = Vec::new();

        for dep in self.store.dependencies_of(task)? {
            match self.store.task(dep.depends_on)? {
                Some(pred) if dep.dep_type.is_cleared_by(pred.status) => {}
                Some(pred) => {
                    debug!(
                        task,
                        predecessor = pred.id,
                        dep_type = %dep.dep_type,
                        status = %pred.status,
                        "dependency not cleared"
                    );
                    blocking.push(pred.id);
                }
                None => {
                    warn!(
                        task,
                        predecessor = dep.depends_on,
                        "dependency points at a missing task"
                    );
                    blocking.push(dep.depends_on);
                }
            }
        }

        Ok(blocking)
    }

    /// Fails fast with [`WorkflowError::DependenciesNotMet`] unless every
    /// incoming edge of `task` is cleared.
    pub fn check_dependencies_completed(&self, task: TaskId) -> Result<()> {
        let blocking = self.blocking_predecessors(task)?;
        if blocking.is_empty() {
            Ok(())
        } else {
            Err(WorkflowError::DependenciesNotMet { task, blocking })
        }
    }

    /// Followers of `changed` that are `pending` and have all of their
    /// dependencies cleared, not just the edge to `changed`.
    pub fn ready_dependents(&self, changed: TaskId) -> Result<Vec<Task>> {
        let follower_ids: BTreeSet<TaskId> = self
            .store
            .dependents_of(changed)?
            .into_iter()
            .map(|d| d.task_id)
            .collect();

        let mut ready = Vec::new();
        for id in follower_ids {
            let Some(follower) = self.store.task(id)? else {
                warn!(task = id, "dependent task missing from store");
                continue;
            };
            if follower.status != TaskStatus::Pending {
                continue;
            }
            if self.blocking_predecessors(id)?.is_empty() {
                ready.push(follower);
            }
        }

        Ok(ready)
    }
}
