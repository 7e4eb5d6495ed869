// src/outbox/worker.rs

//! Background loop that delivers outbox messages.

use std::sync::Arc;

use anyhow::{Context, anyhow};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::model::TaskId;
use crate::outbox::backend::Integrations;
use crate::outbox::{OutboxMessage, RetryPolicy};
use crate::store::Store;

/// Spawn the delivery loop.
///
/// Messages are delivered one at a time in enqueue order, each with its own
/// retry budget. When `shutdown_rx` fires (or its sender is dropped) the
/// queue is closed to new messages and the loop exits after delivering
/// everything already queued.
pub fn spawn_worker(
    mut rx: mpsc::Receiver<OutboxMessage>,
    mut shutdown_rx: oneshot::Receiver<()>,
    integrations: Integrations,
    store: Arc<dyn Store>,
    policy: RetryPolicy,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!("outbox worker started");
        let mut closing = false;

        loop {
            tokio::select! {
                biased;
                msg = rx.recv() => match msg {
                    Some(msg) => deliver_with_retry(&msg, &integrations, store.as_ref(), &policy).await,
                    None => break,
                },
                _ = &mut shutdown_rx, if !closing => {
                    debug!("outbox shutdown requested; draining queued messages");
                    closing = true;
                    rx.close();
                }
            }
        }

        info!("outbox worker finished (queue drained)");
    })
}

async fn deliver_with_retry(
    msg: &OutboxMessage,
    integrations: &Integrations,
    store: &dyn Store,
    policy: &RetryPolicy,
) {
    let mut attempt = 1;

    loop {
        match deliver(msg, integrations, store).await {
            Ok(()) => {
                debug!(kind = msg.kind(), attempt, "outbox message delivered");
                return;
            }
            Err(err) if attempt < policy.max_attempts => {
                let delay = policy.delay_before_retry(attempt);
                warn!(
                    kind = msg.kind(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "outbox delivery failed; retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                error!(
                    kind = msg.kind(),
                    attempts = attempt,
                    error = %err,
                    "outbox delivery failed; giving up"
                );
                return;
            }
        }
    }
}

async fn deliver(
    msg: &OutboxMessage,
    integrations: &Integrations,
    store: &dyn Store,
) -> anyhow::Result<()> {
    match msg {
        OutboxMessage::CreateExternalTask {
            task_id,
            summary,
            description,
            assignee,
        } => {
            let external_id = integrations
                .tracker
                .create_task(summary, description, assignee)
                .await
                .context("creating external task")?;
            record_external_id(store, *task_id, &external_id)
        }
        OutboxMessage::CompleteExternalTask { task_id } => {
            let task = store
                .task(*task_id)?
                .ok_or_else(|| anyhow!("task {task_id} disappeared"))?;
            match task.external_id {
                Some(external_id) => integrations
                    .tracker
                    .complete_task(&external_id)
                    .await
                    .context("completing external task"),
                None => {
                    debug!(task = task_id, "no external task record; nothing to complete");
                    Ok(())
                }
            }
        }
        OutboxMessage::Notify { user, payload } => integrations
            .notifier
            .notify(user, payload)
            .await
            .context("sending notification"),
        OutboxMessage::ProcurementControl {
            project_id,
            task_id,
            code,
        } => integrations
            .procurement
            .task_started(*project_id, *task_id, code)
            .await
            .context("procurement control hook"),
    }
}

fn record_external_id(store: &dyn Store, task_id: TaskId, external_id: &str) -> anyhow::Result<()> {
    store
        .set_external_id(task_id, external_id)
        .with_context(|| format!("recording external id {external_id} on task {task_id}"))?;
    debug!(task = task_id, %external_id, "recorded external task id");
    Ok(())
}
