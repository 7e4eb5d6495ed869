// tests/outbox.rs

mod common;
use crate::common::{
    date, engine_with_outbox, init_tracing, instantiate, memory_store, role, task_by_code,
    with_timeout, FlowBuilder, RecordingIntegrations, RecordingTracker, TemplateBuilder,
    TemplateTaskBuilder, TestResult,
};

use std::time::Duration;

use serde_json::json;

use plmflow::config::OutboxSettings;
use plmflow::engine::{Engine, InstantiatedProject};
use plmflow::model::Actor;
use plmflow::outbox::{Outbox, OutboxHandle, OutboxMessage, RetryPolicy};

fn fast_settings(max_attempts: u32) -> OutboxSettings {
    OutboxSettings {
        queue_length: 64,
        max_attempts,
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
    }
}

/// An engine whose outbox delivers to `recs`. Messages are only delivered
/// when the test yields to the runtime.
fn wired(recs: &RecordingIntegrations, settings: &OutboxSettings) -> (Engine, Outbox) {
    init_tracing();
    let store = memory_store();
    let outbox = Outbox::spawn(settings, recs.integrations(), store.clone());
    let engine = engine_with_outbox(store, outbox.handle());
    (engine, outbox)
}

/// `A` then `B` (FS), both held by alice.
fn two_tasks(engine: &Engine) -> InstantiatedProject {
    let template = TemplateBuilder::new("pair")
        .with_task(TemplateTaskBuilder::new("A").name("Draft spec").phase("p").role("eng").build())
        .with_task(TemplateTaskBuilder::new("B").name("Review spec").phase("p").role("eng").build())
        .after("B", "A")
        .build();
    instantiate(engine, template, &[], date(2024, 1, 1), &[role("p:eng=alice")])
}

#[tokio::test]
async fn external_records_follow_the_task_lifecycle() -> TestResult {
    let recs = RecordingIntegrations::new();
    let (engine, outbox) = wired(&recs, &fast_settings(3));
    let project = two_tasks(&engine);
    let a = task_by_code(&engine, &project, "A");
    let alice = Actor::user("alice");

    engine.start_task(a.id, &alice)?;
    engine.complete_task(a.id, &alice)?;

    with_timeout(outbox.shutdown()).await;

    assert_eq!(
        recs.tracker.created(),
        vec![
            ("Draft spec".to_string(), "alice".to_string()),
            ("Review spec".to_string(), "alice".to_string()),
        ]
    );
    assert_eq!(
        task_by_code(&engine, &project, "A").external_id.as_deref(),
        Some("ext-1")
    );
    assert_eq!(
        task_by_code(&engine, &project, "B").external_id.as_deref(),
        Some("ext-2")
    );
    assert_eq!(recs.tracker.completed(), vec!["ext-1".to_string()]);
    assert_eq!(recs.procurement.started_codes(), vec!["A", "B"]);
    assert_eq!(recs.notifier.recipients("task_assigned"), vec!["alice", "alice"]);
    Ok(())
}

#[tokio::test]
async fn failed_deliveries_are_retried() -> TestResult {
    let recs = RecordingIntegrations::with_tracker(RecordingTracker::failing(2));
    let (engine, outbox) = wired(&recs, &fast_settings(3));
    let template = TemplateBuilder::new("one")
        .with_task(TemplateTaskBuilder::new("A").phase("p").role("eng").build())
        .build();
    let project = instantiate(&engine, template, &[], date(2024, 1, 1), &[role("p:eng=alice")]);

    with_timeout(outbox.shutdown()).await;

    assert_eq!(recs.tracker.attempts(), 3);
    assert_eq!(recs.tracker.created().len(), 1);
    assert_eq!(
        task_by_code(&engine, &project, "A").external_id.as_deref(),
        Some("ext-1")
    );
    Ok(())
}

#[tokio::test]
async fn exhausted_retries_drop_the_message_and_move_on() -> TestResult {
    let recs = RecordingIntegrations::with_tracker(RecordingTracker::failing(10));
    let (engine, outbox) = wired(&recs, &fast_settings(2));
    let template = TemplateBuilder::new("one")
        .with_task(TemplateTaskBuilder::new("A").phase("p").role("eng").build())
        .build();
    let project = instantiate(&engine, template, &[], date(2024, 1, 1), &[role("p:eng=alice")]);

    with_timeout(outbox.shutdown()).await;

    assert_eq!(recs.tracker.attempts(), 2);
    assert!(recs.tracker.created().is_empty());
    assert_eq!(task_by_code(&engine, &project, "A").external_id, None);
    // The notification queued after it is still delivered.
    assert_eq!(recs.notifier.recipients("task_assigned"), vec!["alice"]);
    Ok(())
}

#[tokio::test]
async fn approval_participants_are_notified() -> TestResult {
    let recs = RecordingIntegrations::new();
    let (engine, outbox) = wired(&recs, &fast_settings(3));
    let template = TemplateBuilder::new("review")
        .with_task(
            TemplateTaskBuilder::new("DOC")
                .phase("p")
                .role("eng")
                .approval("review")
                .build(),
        )
        .build();
    let flow = FlowBuilder::new().designated(&["r1", "r2"]).build();
    let project = instantiate(
        &engine,
        template,
        &[("review", flow)],
        date(2024, 1, 1),
        &[role("p:eng=alice")],
    );
    let doc = task_by_code(&engine, &project, "DOC");
    let alice = Actor::user("alice");

    engine.start_task(doc.id, &alice)?;
    engine.complete_task(doc.id, &alice)?;
    let approval = engine.open_approval_for(doc.id)?.unwrap();
    engine.approve(approval.id, "r1", None)?;
    engine.approve(approval.id, "r2", None)?;

    with_timeout(outbox.shutdown()).await;

    assert_eq!(recs.notifier.recipients("approval_requested"), vec!["r1", "r2"]);
    assert_eq!(recs.notifier.recipients("approval_result"), vec!["alice"]);
    let result = recs
        .notifier
        .sent()
        .into_iter()
        .find(|(_, p)| p["kind"] == "approval_result")
        .map(|(_, p)| p)
        .unwrap();
    assert_eq!(result["result"], "approved");
    assert_eq!(result["decided_by"], "r2");
    Ok(())
}

#[tokio::test]
async fn shutdown_drains_everything_already_queued() {
    init_tracing();
    let recs = RecordingIntegrations::new();
    let outbox = Outbox::spawn(&fast_settings(1), recs.integrations(), memory_store());
    let handle = outbox.handle();

    for i in 0..20 {
        handle.enqueue(OutboxMessage::Notify {
            user: format!("user-{i}"),
            payload: json!({ "kind": "ping", "n": i }),
        });
    }
    with_timeout(outbox.shutdown()).await;

    let sent = recs.notifier.sent();
    assert_eq!(sent.len(), 20);
    assert!(sent.iter().enumerate().all(|(i, (_, p))| p["n"] == i));

    // After shutdown the handle only logs.
    handle.enqueue(OutboxMessage::CompleteExternalTask { task_id: 1 });
}

#[tokio::test]
async fn full_queue_drops_new_messages() {
    init_tracing();
    let recs = RecordingIntegrations::new();
    let settings = OutboxSettings {
        queue_length: 1,
        ..fast_settings(1)
    };
    let outbox = Outbox::spawn(&settings, recs.integrations(), memory_store());
    let handle = outbox.handle();

    // Nothing is delivered until the test yields, so only the first fits.
    for user in ["first", "second", "third"] {
        handle.enqueue(OutboxMessage::Notify {
            user: user.to_string(),
            payload: json!({ "kind": "ping" }),
        });
    }
    with_timeout(outbox.shutdown()).await;

    assert_eq!(recs.notifier.recipients("ping"), vec!["first"]);
}

#[tokio::test]
async fn completion_without_external_record_is_a_no_op() -> TestResult {
    // The only create call fails, so the task never gets an external id.
    let recs = RecordingIntegrations::with_tracker(RecordingTracker::failing(1));
    let (engine, outbox) = wired(&recs, &fast_settings(1));
    let template = TemplateBuilder::new("bare")
        .with_task(TemplateTaskBuilder::new("A").build())
        .build();
    let project = instantiate(&engine, template, &[], date(2024, 1, 1), &[]);
    let a = task_by_code(&engine, &project, "A");
    let alice = Actor::user("alice");

    engine.assign_task(a.id, "alice", &alice)?;
    engine.start_task(a.id, &alice)?;
    engine.complete_task(a.id, &alice)?;
    with_timeout(outbox.shutdown()).await;

    assert_eq!(recs.tracker.attempts(), 1);
    assert!(recs.tracker.completed().is_empty());
    assert_eq!(engine.task(a.id)?.external_id, None);
    Ok(())
}

#[test]
fn disconnected_handle_swallows_messages() {
    init_tracing();
    let handle = OutboxHandle::disconnected();
    handle.enqueue(OutboxMessage::Notify {
        user: "nobody".to_string(),
        payload: json!({}),
    });
}

#[test]
fn backoff_doubles_up_to_the_cap() {
    let policy = RetryPolicy::default();

    assert_eq!(policy.max_attempts, 3);
    assert_eq!(policy.delay_before_retry(1), Duration::from_millis(200));
    assert_eq!(policy.delay_before_retry(2), Duration::from_millis(400));
    assert_eq!(policy.delay_before_retry(3), Duration::from_millis(800));
    assert_eq!(policy.delay_before_retry(6), Duration::from_millis(5_000));
    assert_eq!(policy.delay_before_retry(500), Duration::from_millis(5_000));
}

#[test]
fn at_least_one_attempt_is_always_made() {
    let policy = RetryPolicy::from_settings(&OutboxSettings {
        max_attempts: 0,
        ..OutboxSettings::default()
    });

    assert_eq!(policy.max_attempts, 1);
}
