// tests/rollback.rs

mod common;
use crate::common::{
    date, engine_with_outbox, init_tracing, instantiate, role, task_by_code, test_engine,
    FlowBuilder, RacingStore, TemplateBuilder, TemplateTaskBuilder, TestResult,
};

use plmflow::engine::{Engine, InstantiatedProject};
use plmflow::errors::WorkflowError;
use plmflow::model::{Actor, ProjectTemplate};
use plmflow::outbox::OutboxHandle;
use plmflow::types::{ApprovalStatus, OutcomeAction, ReviewerStatus, TaskAction, TaskStatus};

fn alice() -> Actor {
    Actor::user("alice")
}

fn in_p(code: &str, sequence: u32) -> TemplateTaskBuilder {
    TemplateTaskBuilder::new(code)
        .phase("P")
        .role("eng")
        .days(1)
        .sequence(sequence)
}

fn fail_to_w(cascade: bool) -> OutcomeAction {
    OutcomeAction::FailRollback {
        target: "W".to_string(),
        cascade,
    }
}

/// Phase P holds V(1) U(2) W(3) Y(4) X(5) Z(7); Q(6) lives in phase q.
/// X is reviewed and its `fail` outcome rolls back to W.
fn phase_template(cascade: bool) -> ProjectTemplate {
    TemplateBuilder::new("rollback")
        .with_task(in_p("V", 1).build())
        .with_task(in_p("U", 2).build())
        .with_task(in_p("W", 3).build())
        .with_task(in_p("Y", 4).approval("review").build())
        .with_task(
            in_p("X", 5)
                .reviewed()
                .outcome("fail", fail_to_w(cascade))
                .build(),
        )
        .with_task(
            TemplateTaskBuilder::new("Q")
                .phase("q")
                .role("eng")
                .days(1)
                .sequence(6)
                .build(),
        )
        .with_task(in_p("Z", 7).build())
        .build()
}

fn setup(cascade: bool) -> (Engine, InstantiatedProject) {
    setup_on(test_engine(), cascade)
}

fn setup_on(engine: Engine, cascade: bool) -> (Engine, InstantiatedProject) {
    init_tracing();
    let project = instantiate(
        &engine,
        phase_template(cascade),
        &[("review", FlowBuilder::new().designated(&["r1"]).build())],
        date(2024, 1, 1),
        &[role("P:eng=alice"), role("q:eng=alice")],
    );
    (engine, project)
}

fn id(engine: &Engine, project: &InstantiatedProject, code: &str) -> u64 {
    task_by_code(engine, project, code).id
}

fn complete(engine: &Engine, project: &InstantiatedProject, code: &str) -> TestResult {
    let task = id(engine, project, code);
    engine.start_task(task, &alice())?;
    engine.complete_task(task, &alice())?;
    Ok(())
}

/// V, U, W and Q completed; Y in progress; X in review; Z pending.
fn drive_to_review(engine: &Engine, project: &InstantiatedProject) -> TestResult {
    for code in ["V", "U", "W", "Q"] {
        complete(engine, project, code)?;
    }
    engine.start_task(id(engine, project, "Y"), &alice())?;
    complete(engine, project, "X")?;
    assert_eq!(task_by_code(engine, project, "X").status, TaskStatus::Reviewing);
    Ok(())
}

#[test]
fn failed_review_rolls_back_and_cascades_within_the_phase() -> TestResult {
    let (engine, project) = setup(true);
    drive_to_review(&engine, &project)?;
    let x = id(&engine, &project, "X");

    let rita = Actor::user("rita");
    let rejected = engine.submit_review(x, "fail", Some("tolerance out of range"), &rita)?;
    assert_eq!(rejected.status, TaskStatus::Rejected);

    let w = task_by_code(&engine, &project, "W");
    assert_eq!(w.status, TaskStatus::InProgress);
    assert_eq!(w.progress, 0);
    assert!(w.completed_at.is_none());

    let y = task_by_code(&engine, &project, "Y");
    assert_eq!(y.status, TaskStatus::Pending);
    assert_eq!(y.progress, 0);

    // Lower sequence, other phase, and untouched statuses stay as they were.
    assert_eq!(task_by_code(&engine, &project, "V").status, TaskStatus::Completed);
    assert_eq!(task_by_code(&engine, &project, "U").status, TaskStatus::Completed);
    assert_eq!(task_by_code(&engine, &project, "Q").status, TaskStatus::Completed);
    assert_eq!(task_by_code(&engine, &project, "Z").status, TaskStatus::Pending);
    assert_eq!(task_by_code(&engine, &project, "X").status, TaskStatus::Rejected);
    Ok(())
}

#[test]
fn rollback_and_cascade_are_logged() -> TestResult {
    let (engine, project) = setup(true);
    drive_to_review(&engine, &project)?;
    let x = id(&engine, &project, "X");

    engine.submit_review(x, "fail", None, &Actor::user("rita"))?;

    let x_last = engine.get_task_history(x)?.pop().unwrap();
    assert_eq!(x_last.action, TaskAction::ReviewRollback);
    assert_eq!(x_last.payload["outcome"], "fail");

    let w_last = engine.get_task_history(id(&engine, &project, "W"))?.pop().unwrap();
    assert_eq!(w_last.action, TaskAction::Rollback);
    assert_eq!(w_last.actor, "rita");
    assert_eq!(w_last.from_status, Some(TaskStatus::Completed));
    assert_eq!(w_last.payload["triggered_by"], x);
    assert_eq!(w_last.payload["cascade"], true);

    let y_last = engine.get_task_history(id(&engine, &project, "Y"))?.pop().unwrap();
    assert_eq!(y_last.action, TaskAction::CascadeReset);
    assert_eq!(y_last.actor, "system");
    Ok(())
}

#[test]
fn rollback_without_cascade_resets_only_the_target() -> TestResult {
    let (engine, project) = setup(false);
    drive_to_review(&engine, &project)?;
    let x = id(&engine, &project, "X");

    engine.submit_review(x, "fail", None, &alice())?;

    assert_eq!(task_by_code(&engine, &project, "W").status, TaskStatus::InProgress);
    assert_eq!(task_by_code(&engine, &project, "Y").status, TaskStatus::InProgress);
    Ok(())
}

#[test]
fn direct_rollback_reports_what_it_reset() -> TestResult {
    let (engine, project) = setup(true);
    drive_to_review(&engine, &project)?;
    let x = id(&engine, &project, "X");

    let report = engine.rollback_task(x, "W", true, &alice())?;

    assert_eq!(report.target.code, "W");
    assert_eq!(report.target.status, TaskStatus::InProgress);
    let reset: Vec<&str> = report.reset.iter().map(|t| t.code.as_str()).collect();
    assert_eq!(reset, vec!["Y", "X"]);
    assert!(report.failed.is_empty());
    assert!(report.reset.iter().all(|t| t.status == TaskStatus::Pending));
    Ok(())
}

#[test]
fn a_failed_reset_is_reported_and_the_cascade_goes_on() -> TestResult {
    let store = RacingStore::new();
    let (engine, project) =
        setup_on(engine_with_outbox(store.clone(), OutboxHandle::disconnected()), true);
    drive_to_review(&engine, &project)?;
    let x = id(&engine, &project, "X");
    let y = id(&engine, &project, "Y");
    engine.complete_task(y, &alice())?;
    let approval = engine.open_approval_for(y)?.expect("Y is under approval");

    // Y is saved by someone else right after the cascade lists the phase.
    store.race_on(y, 1);
    let report = engine.rollback_task(x, "W", true, &alice())?;

    assert_eq!(report.target.status, TaskStatus::InProgress);
    assert_eq!(report.failed, vec![y]);
    let reset: Vec<&str> = report.reset.iter().map(|t| t.code.as_str()).collect();
    assert_eq!(reset, vec!["X"]);

    // Y keeps its status and its approval, since its reset never landed.
    assert_eq!(task_by_code(&engine, &project, "Y").status, TaskStatus::Reviewing);
    assert_eq!(engine.approval(approval.id)?.status, ApprovalStatus::Pending);
    assert_eq!(task_by_code(&engine, &project, "X").status, TaskStatus::Pending);
    Ok(())
}

#[test]
fn cascade_cancels_open_approvals_of_reset_tasks() -> TestResult {
    let (engine, project) = setup(true);
    drive_to_review(&engine, &project)?;
    let y = id(&engine, &project, "Y");
    engine.complete_task(y, &alice())?;
    let approval = engine.open_approval_for(y)?.expect("Y is under approval");

    engine.submit_review(id(&engine, &project, "X"), "fail", None, &alice())?;

    assert_eq!(engine.task(y)?.status, TaskStatus::Pending);
    assert!(engine.open_approval_for(y)?.is_none());
    assert_eq!(engine.approval(approval.id)?.status, ApprovalStatus::Canceled);
    assert!(engine
        .reviewers_of(approval.id)?
        .iter()
        .all(|r| r.status == ReviewerStatus::Canceled));
    assert!(matches!(
        engine.approve(approval.id, "r1", None),
        Err(WorkflowError::ApprovalClosed(_))
    ));
    Ok(())
}

#[test]
fn unknown_rollback_target_changes_nothing() -> TestResult {
    let (engine, project) = setup(true);
    drive_to_review(&engine, &project)?;
    let x = id(&engine, &project, "X");
    let before = engine.get_task_history(x)?.len();

    let err = engine.rollback_task(x, "NOPE", true, &alice()).unwrap_err();

    assert!(matches!(err, WorkflowError::TaskCodeNotFound { ref code, .. } if code == "NOPE"));
    assert_eq!(engine.get_task_history(x)?.len(), before);
    assert_eq!(task_by_code(&engine, &project, "Y").status, TaskStatus::InProgress);
    Ok(())
}

#[test]
fn rejected_task_can_be_resumed() -> TestResult {
    let (engine, project) = setup(true);
    drive_to_review(&engine, &project)?;
    let x = id(&engine, &project, "X");
    engine.submit_review(x, "fail", None, &alice())?;

    let resumed = engine.resume_task(x, &alice())?;
    assert_eq!(resumed.status, TaskStatus::InProgress);

    assert!(matches!(
        engine.resume_task(x, &alice()),
        Err(WorkflowError::InvalidTransition {
            status: TaskStatus::InProgress,
            ..
        })
    ));
    Ok(())
}

#[test]
fn phaseless_target_cascades_over_phaseless_tasks() -> TestResult {
    init_tracing();
    let template = TemplateBuilder::new("flat")
        .with_task(TemplateTaskBuilder::new("A").days(1).build())
        .with_task(TemplateTaskBuilder::new("B").days(1).build())
        .with_task(TemplateTaskBuilder::new("C").phase("other").days(1).build())
        .build();
    let engine = test_engine();
    let project = instantiate(&engine, template, &[], date(2024, 1, 1), &[]);

    for code in ["A", "B", "C"] {
        let task = id(&engine, &project, code);
        engine.assign_task(task, "alice", &alice())?;
        engine.start_task(task, &alice())?;
        engine.complete_task(task, &alice())?;
    }

    let a = id(&engine, &project, "A");
    let report = engine.rollback_task(a, "A", true, &alice())?;

    let reset: Vec<&str> = report.reset.iter().map(|t| t.code.as_str()).collect();
    assert_eq!(reset, vec!["B"]);
    assert_eq!(task_by_code(&engine, &project, "C").status, TaskStatus::Completed);
    Ok(())
}
