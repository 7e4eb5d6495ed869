// src/config/mod.rs

//! Configuration loading and validation for plmflow.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate references, kinds and dependency cycles (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, parse_and_validate};
pub use model::{
    ConfigFile, DependsOnConfig, EngineSettings, OutboxSettings, RawConfigFile, TemplateConfig,
    TemplateTaskConfig,
};
pub use validate::validate_template;
