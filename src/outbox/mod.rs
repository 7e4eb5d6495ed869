// src/outbox/mod.rs

//! Outbound side effects.
//!
//! Engine operations never call external systems directly. They enqueue an
//! [`OutboxMessage`] on an [`OutboxHandle`] and return; a background worker
//! ([`worker`]) delivers each message to the configured [`backend`]s with a
//! bounded retry/backoff policy. Delivery outcomes are only logged.
//!
//! Lifecycle:
//! - [`Outbox::spawn`] starts the worker (requires a Tokio runtime).
//! - [`Outbox::handle`] hands out cheap, cloneable enqueue handles.
//! - [`Outbox::shutdown`] stops accepting messages, waits until everything
//!   already queued has been delivered (or has exhausted its retries), and
//!   returns.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, warn};

use crate::config::OutboxSettings;
use crate::model::{ProjectId, TaskId, UserId};
use crate::store::Store;

pub mod backend;
pub mod worker;

pub use backend::{
    BackendFuture, ExternalTaskTracker, Integrations, LoggingBackend, NotificationSink,
    ProcurementControl,
};

/// A side effect waiting for delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboxMessage {
    /// Mirror a newly assigned task into the external tracker; the returned
    /// external id is written back onto the task row.
    CreateExternalTask {
        task_id: TaskId,
        summary: String,
        description: String,
        assignee: UserId,
    },
    /// Close the task's external record, if it has one.
    CompleteExternalTask { task_id: TaskId },
    Notify {
        user: UserId,
        payload: serde_json::Value,
    },
    /// A task has started.
    ProcurementControl {
        project_id: ProjectId,
        task_id: TaskId,
        code: String,
    },
}

impl OutboxMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            OutboxMessage::CreateExternalTask { .. } => "create_external_task",
            OutboxMessage::CompleteExternalTask { .. } => "complete_external_task",
            OutboxMessage::Notify { .. } => "notify",
            OutboxMessage::ProcurementControl { .. } => "procurement_control",
        }
    }
}

/// Exponential backoff: `initial`, `2 * initial`, ... capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total delivery attempts, including the first (>= 1).
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &OutboxSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
        }
    }

    /// Delay after failed attempt number `attempt` (1-based).
    pub fn delay_before_retry(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&OutboxSettings::default())
    }
}

/// Owner of the worker task.
pub struct Outbox {
    tx: mpsc::Sender<OutboxMessage>,
    shutdown_tx: oneshot::Sender<()>,
    worker: tokio::task::JoinHandle<()>,
}

impl Outbox {
    pub fn spawn(
        settings: &OutboxSettings,
        integrations: Integrations,
        store: Arc<dyn Store>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(settings.queue_length.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let worker = worker::spawn_worker(
            rx,
            shutdown_rx,
            integrations,
            store,
            RetryPolicy::from_settings(settings),
        );

        Self {
            tx,
            shutdown_tx,
            worker,
        }
    }

    pub fn handle(&self) -> OutboxHandle {
        OutboxHandle {
            tx: self.tx.clone(),
        }
    }

    /// Close the queue and wait for the worker to drain it.
    pub async fn shutdown(self) {
        let Outbox {
            tx,
            shutdown_tx,
            worker,
        } = self;
        drop(tx);
        let _ = shutdown_tx.send(());

        if let Err(err) = worker.await {
            error!(error = %err, "outbox worker panicked");
        }
    }
}

/// Enqueue side of the outbox. Enqueueing never blocks.
#[derive(Debug, Clone)]
pub struct OutboxHandle {
    tx: mpsc::Sender<OutboxMessage>,
}

impl OutboxHandle {
    /// A handle with no worker behind it; every message is dropped with a
    /// warning. Used when side effects are deliberately disabled.
    pub fn disconnected() -> Self {
        let (tx, _rx) = mpsc::channel(1);
        Self { tx }
    }

    pub fn enqueue(&self, msg: OutboxMessage) {
        let kind = msg.kind();
        match self.tx.try_send(msg) {
            Ok(()) => debug!(kind, "outbox message queued"),
            Err(TrySendError::Full(msg)) => {
                error!(kind, ?msg, "outbox queue full; dropping message")
            }
            Err(TrySendError::Closed(msg)) => {
                warn!(kind, ?msg, "outbox closed; dropping message")
            }
        }
    }
}
