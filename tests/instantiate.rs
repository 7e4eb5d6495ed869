// tests/instantiate.rs

mod common;
use crate::common::{
    date, ids_by_code, init_tracing, instantiate, role, task_by_code, test_engine,
    TemplateBuilder, TemplateTaskBuilder, TestResult,
};

use std::collections::BTreeMap;

use plmflow::engine::PhaseRole;
use plmflow::errors::{ErrorKind, WorkflowError};
use plmflow::events::EngineEvent;
use plmflow::model::Actor;
use plmflow::types::{DependencyType, TaskAction, TaskKind, TaskStatus};

#[test]
fn parents_are_created_before_their_children() -> TestResult {
    init_tracing();
    // Listed children first; creation order must not depend on it.
    let template = TemplateBuilder::new("tree")
        .with_task(TemplateTaskBuilder::subtask("S").parent("T").build())
        .with_task(TemplateTaskBuilder::new("T").parent("M").build())
        .with_task(TemplateTaskBuilder::milestone("M").build())
        .build();
    let engine = test_engine();

    let project = instantiate(&engine, template, &[], date(2024, 1, 1), &[]);

    let m = task_by_code(&engine, &project, "M");
    let t = task_by_code(&engine, &project, "T");
    let s = task_by_code(&engine, &project, "S");
    assert_eq!(m.kind, TaskKind::Milestone);
    assert_eq!(m.parent_id, None);
    assert_eq!(t.parent_id, Some(m.id));
    assert_eq!(s.parent_id, Some(t.id));
    assert!(m.id < t.id && t.id < s.id);

    // Reported in sequence order, not creation order.
    let codes: Vec<&str> = project.tasks.iter().map(|t| t.code.as_str()).collect();
    assert_eq!(codes, vec!["S", "T", "M"]);
    Ok(())
}

#[test]
fn phase_role_holders_become_assignees() -> TestResult {
    init_tracing();
    let template = TemplateBuilder::new("roles")
        .with_task(TemplateTaskBuilder::new("A").phase("design").role("eng").build())
        .with_task(TemplateTaskBuilder::new("B").phase("design").role("qa").build())
        .with_task(TemplateTaskBuilder::new("C").phase("build").role("eng").build())
        .with_task(TemplateTaskBuilder::new("D").build())
        .build();
    let engine = test_engine();

    let project = instantiate(
        &engine,
        template,
        &[],
        date(2024, 1, 1),
        &[role("design:eng=alice")],
    );

    let a = task_by_code(&engine, &project, "A");
    assert_eq!(a.status, TaskStatus::Pending);
    assert_eq!(a.assignee.as_deref(), Some("alice"));
    for code in ["B", "C", "D"] {
        let task = task_by_code(&engine, &project, code);
        assert_eq!(task.status, TaskStatus::Unassigned, "{code}");
        assert_eq!(task.assignee, None, "{code}");
    }
    Ok(())
}

#[test]
fn planned_dates_and_edges_come_from_the_template() -> TestResult {
    init_tracing();
    let template = TemplateBuilder::new("plan")
        .with_task(TemplateTaskBuilder::new("A").days(2).build())
        .with_task(TemplateTaskBuilder::new("B").days(3).build())
        .depends("B", "A", DependencyType::StartToStart, 1)
        .build();
    let engine = test_engine();

    let project = instantiate(&engine, template, &[], date(2024, 1, 1), &[]);
    let ids = ids_by_code(&project);

    let a = task_by_code(&engine, &project, "A");
    let b = task_by_code(&engine, &project, "B");
    assert_eq!(a.planned_start, Some(date(2024, 1, 1)));
    assert_eq!(a.planned_end, Some(date(2024, 1, 3)));
    assert_eq!(b.planned_start, Some(date(2024, 1, 2)));
    assert_eq!(b.planned_end, Some(date(2024, 1, 5)));

    let edges = engine.store().dependencies_of(ids["B"])?;
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].depends_on, ids["A"]);
    assert_eq!(edges[0].dep_type, DependencyType::StartToStart);
    assert_eq!(edges[0].lag_days, 1);
    assert!(engine.store().dependencies_of(ids["A"])?.is_empty());

    assert_eq!(project.project.start_date, date(2024, 1, 1));
    assert_eq!(project.project.template_id.as_deref(), Some("plan"));
    assert!(!project.project.skip_weekends);
    Ok(())
}

#[test]
fn creation_is_logged_and_published() -> TestResult {
    init_tracing();
    let template = TemplateBuilder::new("log")
        .with_task(TemplateTaskBuilder::new("A").phase("p").role("eng").build())
        .with_task(TemplateTaskBuilder::new("B").build())
        .build();
    let engine = test_engine();
    let mut rx = engine.events().subscribe();

    let project = instantiate(&engine, template, &[], date(2024, 1, 1), &[role("p:eng=alice")]);

    let a = task_by_code(&engine, &project, "A");
    let history = engine.get_task_history(a.id)?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action, TaskAction::Create);
    assert_eq!(history[0].from_status, None);
    assert_eq!(history[0].to_status, TaskStatus::Pending);
    assert_eq!(history[0].actor, "system");
    assert_eq!(history[0].payload["assignee"], "alice");

    let mut created = 0;
    while let Ok(event) = rx.try_recv() {
        if let EngineEvent::TaskChanged {
            action: TaskAction::Create,
            from: None,
            ..
        } = event
        {
            created += 1;
        }
    }
    assert_eq!(created, 2);
    Ok(())
}

#[test]
fn unknown_template_is_not_found() {
    let engine = test_engine();

    let err = engine
        .instantiate_from_template("missing", date(2024, 1, 1), false, &[])
        .unwrap_err();

    assert!(matches!(err, WorkflowError::TemplateNotFound(ref id) if id == "missing"));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn invalid_stored_template_is_rejected_before_anything_is_created() -> TestResult {
    init_tracing();
    let template = TemplateBuilder::new("loop")
        .with_task(TemplateTaskBuilder::new("A").build())
        .with_task(TemplateTaskBuilder::new("B").build())
        .after("A", "B")
        .after("B", "A")
        .build();
    let engine = test_engine();
    engine.store().put_template(template)?;

    let err = engine
        .instantiate_from_template("loop", date(2024, 1, 1), false, &[])
        .unwrap_err();

    assert!(matches!(err, WorkflowError::DagCycle(_)));
    assert!(engine.store().project(1)?.is_none());
    Ok(())
}

#[test]
fn assigning_phase_roles_hands_out_open_tasks() -> TestResult {
    init_tracing();
    let template = TemplateBuilder::new("phase")
        .with_task(TemplateTaskBuilder::new("A").phase("p").role("eng").build())
        .with_task(TemplateTaskBuilder::new("B").phase("p").role("qa").build())
        .with_task(TemplateTaskBuilder::new("D").phase("p").role("eng").build())
        .with_task(TemplateTaskBuilder::new("E").phase("other").role("eng").build())
        .after("D", "A")
        .build();
    let engine = test_engine();
    let project = instantiate(&engine, template, &[], date(2024, 1, 1), &[role("p:eng=alice")]);
    let alice = Actor::user("alice");
    let a = task_by_code(&engine, &project, "A");
    engine.start_task(a.id, &alice)?;

    let assignments = BTreeMap::from([
        ("eng".to_string(), "bob".to_string()),
        ("qa".to_string(), "quinn".to_string()),
    ]);
    let lead = Actor::user("lead");
    let assigned = engine.assign_phase_roles(project.project.id, "p", &assignments, &lead)?;

    let codes: Vec<&str> = assigned.iter().map(|t| t.code.as_str()).collect();
    assert_eq!(codes, vec!["B", "D"]);

    let b = task_by_code(&engine, &project, "B");
    assert_eq!(b.status, TaskStatus::Pending);
    assert_eq!(b.assignee.as_deref(), Some("quinn"));
    assert_eq!(task_by_code(&engine, &project, "D").assignee.as_deref(), Some("bob"));

    // Started work keeps its assignee; other phases are untouched.
    assert_eq!(task_by_code(&engine, &project, "A").assignee.as_deref(), Some("alice"));
    assert_eq!(task_by_code(&engine, &project, "E").status, TaskStatus::Unassigned);

    assert_eq!(
        engine.store().role_assignee(project.project.id, "p", "eng")?.as_deref(),
        Some("bob")
    );

    let again = engine.assign_phase_roles(project.project.id, "p", &assignments, &lead)?;
    assert!(again.is_empty());
    Ok(())
}

#[test]
fn assigning_roles_in_an_unknown_project_fails() {
    let engine = test_engine();

    let err = engine
        .assign_phase_roles(77, "p", &BTreeMap::new(), &Actor::user("lead"))
        .unwrap_err();

    assert!(matches!(err, WorkflowError::ProjectNotFound(77)));
}

#[test]
fn phase_roles_parse_from_phase_role_user() {
    let parsed: PhaseRole = " design : eng = alice ".parse().unwrap();
    assert_eq!(
        parsed,
        PhaseRole {
            phase: "design".to_string(),
            role_code: "eng".to_string(),
            user: "alice".to_string(),
        }
    );

    for bad in ["design-eng=alice", "design:eng", "design:=alice", ":eng=alice", "p:eng= "] {
        assert!(bad.parse::<PhaseRole>().is_err(), "{bad} should not parse");
    }
}
