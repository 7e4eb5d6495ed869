#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use plmflow::config::EngineSettings;
use plmflow::engine::{Engine, InstantiatedProject, PhaseRole};
use plmflow::events::EventHub;
use plmflow::model::{FlowSchema, ProjectTemplate, Task, TaskId};
use plmflow::outbox::OutboxHandle;
use plmflow::store::{MemoryStore, Store};

/// An engine over a fresh `MemoryStore` whose outbox drops everything.
pub fn test_engine() -> Engine {
    engine_with_outbox(memory_store(), OutboxHandle::disconnected())
}

pub fn memory_store() -> Arc<dyn Store> {
    Arc::new(MemoryStore::new())
}

/// An engine over `store` whose side effects go to `outbox`. The same
/// store is usually handed to the outbox worker.
pub fn engine_with_outbox(store: Arc<dyn Store>, outbox: OutboxHandle) -> Engine {
    Engine::new(store, outbox, EventHub::new(64), EngineSettings::default())
}

/// Register `template` and `flows`, then instantiate it starting on
/// `start` without weekend skipping.
pub fn instantiate(
    engine: &Engine,
    template: ProjectTemplate,
    flows: &[(&str, FlowSchema)],
    start: NaiveDate,
    roles: &[PhaseRole],
) -> InstantiatedProject {
    for (code, flow) in flows {
        engine
            .store()
            .put_flow(code, flow.clone())
            .expect("register flow");
    }
    let id = template.id.clone();
    engine.store().put_template(template).expect("register template");
    engine
        .instantiate_from_template(&id, start, false, roles)
        .expect("instantiate template")
}

/// Task ids of an instantiated project keyed by code.
pub fn ids_by_code(project: &InstantiatedProject) -> BTreeMap<String, TaskId> {
    project
        .tasks
        .iter()
        .map(|t| (t.code.clone(), t.id))
        .collect()
}

/// Current row of the task coded `code`.
pub fn task_by_code(engine: &Engine, project: &InstantiatedProject, code: &str) -> Task {
    engine
        .task_by_code(project.project.id, code)
        .expect("task code exists")
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn role(text: &str) -> PhaseRole {
    text.parse().expect("valid phase role")
}
