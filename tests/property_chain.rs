// tests/property_chain.rs

mod common;
use crate::common::{date, instantiate, role, test_engine, TemplateBuilder, TemplateTaskBuilder};

use std::collections::{BTreeSet, HashMap};

use proptest::prelude::*;

use plmflow::engine::Engine;
use plmflow::errors::WorkflowError;
use plmflow::model::{Actor, Task, TaskId};
use plmflow::types::{DependencyType, TaskStatus};

fn started(status: TaskStatus) -> bool {
    !matches!(status, TaskStatus::Pending | TaskStatus::Unassigned)
}

fn done(status: TaskStatus) -> bool {
    matches!(status, TaskStatus::Completed | TaskStatus::Confirmed)
}

/// Whether every edge into `task` is cleared in `statuses`.
fn cleared(engine: &Engine, task: &Task, statuses: &HashMap<TaskId, TaskStatus>) -> bool {
    engine
        .store()
        .dependencies_of(task.id)
        .unwrap()
        .iter()
        .all(|dep| {
            let pred = statuses[&dep.depends_on];
            match dep.dep_type {
                DependencyType::StartToStart => started(pred),
                _ => done(pred),
            }
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn started_tasks_always_have_cleared_dependencies(
        n in 2usize..8,
        raw_edges in proptest::collection::vec((0usize..8, 0usize..8, any::<bool>()), 0..16),
        picks in proptest::collection::vec(any::<u16>(), 64),
    ) {
        // Edges only point from lower to higher index, so the graph is a DAG.
        let mut edges = BTreeSet::new();
        for (a, b, ss) in raw_edges {
            let (a, b) = (a % n, b % n);
            if a != b {
                edges.insert((a.min(b), a.max(b), ss));
            }
        }
        let mut seen = BTreeSet::new();

        let mut builder = TemplateBuilder::new("random");
        for i in 0..n {
            builder = builder.with_task(
                TemplateTaskBuilder::new(&format!("T{i}")).phase("p").role("eng").days(1).build(),
            );
        }
        for (pred, succ, ss) in edges {
            if !seen.insert((pred, succ)) {
                continue;
            }
            let dep_type = if ss { DependencyType::StartToStart } else { DependencyType::FinishToStart };
            builder = builder.depends(&format!("T{succ}"), &format!("T{pred}"), dep_type, 0);
        }

        let engine = test_engine();
        let project = instantiate(&engine, builder.build(), &[], date(2024, 1, 1), &[role("p:eng=alice")]);
        let alice = Actor::user("alice");

        for step in 0..(4 * n) {
            let tasks = engine.project_tasks(project.project.id).unwrap();
            let statuses: HashMap<TaskId, TaskStatus> = tasks.iter().map(|t| (t.id, t.status)).collect();

            for task in &tasks {
                if started(task.status) {
                    prop_assert!(cleared(&engine, task, &statuses), "{} started too early", task.code);
                }
            }

            if tasks.iter().all(|t| done(t.status)) {
                break;
            }

            let pick = picks[step % picks.len()] as usize;

            // A pending task that is not ready must be refused untouched.
            let blocked: Vec<&Task> = tasks
                .iter()
                .filter(|t| t.status == TaskStatus::Pending && !cleared(&engine, t, &statuses))
                .collect();
            if let Some(task) = blocked.get(pick % blocked.len().max(1)) {
                let refused = engine.start_task(task.id, &alice);
                prop_assert!(
                    matches!(refused, Err(WorkflowError::DependenciesNotMet { .. })),
                    "expected DependenciesNotMet"
                );
                prop_assert_eq!(engine.task(task.id).unwrap().status, TaskStatus::Pending);
            }

            let actionable: Vec<&Task> = tasks
                .iter()
                .filter(|t| {
                    t.status == TaskStatus::InProgress
                        || (t.status == TaskStatus::Pending && cleared(&engine, t, &statuses))
                })
                .collect();
            prop_assert!(!actionable.is_empty(), "no task can make progress");

            let task = actionable[pick % actionable.len()];
            if task.status == TaskStatus::InProgress {
                engine.complete_task(task.id, &alice).unwrap();
            } else {
                engine.start_task(task.id, &alice).unwrap();
            }
        }

        let tasks = engine.project_tasks(project.project.id).unwrap();
        prop_assert!(tasks.iter().all(|t| t.status == TaskStatus::Completed));
    }
}
