// src/dag/mod.rs

//! Dependency graph handling.
//!
//! - [`graph`] holds the dependency adjacency of a template, keyed by code.
//! - [`calendar`] computes planned dates from that graph.
//! - [`resolver`] decides whether project tasks may start and which
//!   followers are ready after a task moves.

pub mod calendar;
pub mod graph;
pub mod resolver;

pub use calendar::{add_work_days, CalendarCalculator, TaskWindow};
pub use graph::TemplateGraph;
pub use resolver::DependencyResolver;
