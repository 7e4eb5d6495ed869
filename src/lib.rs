// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod events;
pub mod logging;
pub mod model;
pub mod outbox;
pub mod store;
pub mod types;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::dag::{CalendarCalculator, TaskWindow};
use crate::engine::{Engine, InstantiatedProject};
use crate::errors::WorkflowError;
use crate::events::EventHub;
use crate::model::ProjectTemplate;
use crate::outbox::{Integrations, Outbox};
use crate::store::{MemoryStore, Store};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - store, outbox worker and event hub
/// - the engine
///
/// and then instantiates the requested template once.
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)?;
    let template = cfg
        .templates
        .get(&args.template)
        .ok_or_else(|| WorkflowError::TemplateNotFound(args.template.clone()))?;

    if args.dry_run {
        let windows =
            CalendarCalculator::new(template, args.start, args.skip_weekends).compute()?;
        print_dry_run(template, &windows);
        return Ok(());
    }

    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let outbox = Outbox::spawn(&cfg.outbox, Integrations::logging_only(), store.clone());
    let events = EventHub::new(cfg.engine.event_capacity);

    let engine = Engine::new(store, outbox.handle(), events, cfg.engine.clone());
    engine.register_definitions(&cfg)?;

    let created = engine.instantiate_from_template(
        &args.template,
        args.start,
        args.skip_weekends,
        &args.roles,
    )?;
    print_project(&created);

    drop(engine);
    info!("waiting for outbox to drain");
    outbox.shutdown().await;
    Ok(())
}

/// Dry-run output: the calendar of every template task.
fn print_dry_run(template: &ProjectTemplate, windows: &BTreeMap<String, TaskWindow>) {
    println!("plmflow dry-run: template '{}' ({})", template.id, template.name);
    println!();

    for task in &template.tasks {
        let Some(window) = windows.get(&task.code) else {
            continue;
        };
        println!(
            "  {:<16} {:<9} {} -> {}  ({}d)",
            task.code,
            task.kind.as_str(),
            window.start,
            window.end,
            task.estimated_days
        );
        if let Some(parent) = &task.parent_code {
            println!("      parent: {parent}");
        }
        for dep in template.dependencies.iter().filter(|d| d.task_code == task.code) {
            println!(
                "      after: {} {} lag {}",
                dep.depends_on_code, dep.dep_type, dep.lag_days
            );
        }
    }

    debug!("dry-run complete (nothing created)");
}

fn print_project(created: &InstantiatedProject) {
    println!(
        "project {} '{}' starting {}",
        created.project.id, created.project.name, created.project.start_date
    );
    println!();

    for task in &created.tasks {
        let dates = match (task.planned_start, task.planned_end) {
            (Some(start), Some(end)) => format!("{start} -> {end}"),
            _ => "-".to_string(),
        };
        let parent = task
            .parent_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  #{:<4} {:<16} {:<9} parent {:<5} {}  {:<10} {}",
            task.id,
            task.code,
            task.kind.as_str(),
            parent,
            dates,
            task.status.as_str(),
            task.assignee.as_deref().unwrap_or("-")
        );
    }
}
