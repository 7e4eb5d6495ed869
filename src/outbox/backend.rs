// src/outbox/backend.rs

//! Pluggable backends for outbound side effects.
//!
//! The outbox worker talks to these traits instead of concrete clients, so
//! tests can swap in recording fakes.
//!
//! - [`ExternalTaskTracker`] mirrors project tasks into an external tracker.
//! - [`NotificationSink`] delivers chat/notification messages.
//! - [`ProcurementControl`] is told whenever a task starts.
//!
//! [`LoggingBackend`] implements all three by only logging; it is what the
//! binary runs with when no external system is wired in.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

use crate::model::{ProjectId, TaskId};

/// Boxed future returned by backend calls.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

pub trait ExternalTaskTracker: Send + Sync {
    /// Create a task record and return its external id.
    fn create_task<'a>(
        &'a self,
        summary: &'a str,
        description: &'a str,
        assignee: &'a str,
    ) -> BackendFuture<'a, String>;

    fn complete_task<'a>(&'a self, external_id: &'a str) -> BackendFuture<'a, ()>;
}

pub trait NotificationSink: Send + Sync {
    fn notify<'a>(&'a self, user: &'a str, payload: &'a serde_json::Value)
    -> BackendFuture<'a, ()>;
}

pub trait ProcurementControl: Send + Sync {
    fn task_started<'a>(
        &'a self,
        project: ProjectId,
        task: TaskId,
        code: &'a str,
    ) -> BackendFuture<'a, ()>;
}

/// The set of backends an outbox worker delivers to.
#[derive(Clone)]
pub struct Integrations {
    pub tracker: Arc<dyn ExternalTaskTracker>,
    pub notifier: Arc<dyn NotificationSink>,
    pub procurement: Arc<dyn ProcurementControl>,
}

impl Integrations {
    /// Every backend is a [`LoggingBackend`].
    pub fn logging_only() -> Self {
        let backend = Arc::new(LoggingBackend::default());
        Self {
            tracker: backend.clone(),
            notifier: backend.clone(),
            procurement: backend,
        }
    }
}

#[derive(Debug, Default)]
pub struct LoggingBackend {
    next_id: AtomicU64,
}

impl ExternalTaskTracker for LoggingBackend {
    fn create_task<'a>(
        &'a self,
        summary: &'a str,
        _description: &'a str,
        assignee: &'a str,
    ) -> BackendFuture<'a, String> {
        Box::pin(async move {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
            info!(%summary, %assignee, id, "tracker: create task (logging backend)");
            Ok(format!("local-{id}"))
        })
    }

    fn complete_task<'a>(&'a self, external_id: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            info!(%external_id, "tracker: complete task (logging backend)");
            Ok(())
        })
    }
}

impl NotificationSink for LoggingBackend {
    fn notify<'a>(
        &'a self,
        user: &'a str,
        payload: &'a serde_json::Value,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            info!(%user, %payload, "notify (logging backend)");
            Ok(())
        })
    }
}

impl ProcurementControl for LoggingBackend {
    fn task_started<'a>(
        &'a self,
        project: ProjectId,
        task: TaskId,
        code: &'a str,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            info!(project, task, %code, "procurement control: task started (logging backend)");
            Ok(())
        })
    }
}
