// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::model::{FlowSchema, ProjectTemplate, ReviewOutcome};
use crate::types::{DependencyType, TaskKind};

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [engine]
/// system_actor = "system"
///
/// [outbox]
/// max_attempts = 3
///
/// [approval.design_review]
/// [[approval.design_review.node]]
/// type = "approve"
/// approver = "designated"
/// approvers = ["alice"]
///
/// [template.npd]
/// name = "New product development"
///
/// [template.npd.task.EVT]
/// kind = "milestone"
/// phase = "evt"
///
/// [template.npd.task.EVT-BUILD]
/// parent = "EVT"
/// phase = "evt"
/// estimated_days = 3
/// default_role = "pm"
/// depends_on = [{ code = "EVT-PLAN", type = "FS", lag_days = 1 }]
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub outbox: OutboxSettings,

    /// Approval flows from `[approval.<code>]`.
    #[serde(default)]
    pub approval: BTreeMap<String, FlowSchema>,

    /// Project templates from `[template.<id>]`.
    #[serde(default)]
    pub template: BTreeMap<String, TemplateConfig>,
}

/// Validated configuration. Only produced by `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub engine: EngineSettings,
    pub outbox: OutboxSettings,
    pub flows: BTreeMap<String, FlowSchema>,
    pub templates: BTreeMap<String, ProjectTemplate>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        engine: EngineSettings,
        outbox: OutboxSettings,
        flows: BTreeMap<String, FlowSchema>,
        templates: BTreeMap<String, ProjectTemplate>,
    ) -> Self {
        Self {
            engine,
            outbox,
            flows,
            templates,
        }
    }
}

/// `[engine]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSettings {
    /// Actor name recorded for transitions the engine makes on its own.
    #[serde(default = "default_system_actor")]
    pub system_actor: String,

    /// Buffer size of the live event hub.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_system_actor() -> String {
    "system".to_string()
}

fn default_event_capacity() -> usize {
    256
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            system_actor: default_system_actor(),
            event_capacity: default_event_capacity(),
        }
    }
}

/// `[outbox]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct OutboxSettings {
    /// Messages that may wait for delivery before new ones are dropped.
    #[serde(default = "default_queue_length")]
    pub queue_length: usize,

    /// Delivery attempts per message, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_queue_length() -> usize {
    64
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

impl Default for OutboxSettings {
    fn default() -> Self {
        Self {
            queue_length: default_queue_length(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// `[template.<id>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateConfig {
    pub name: String,

    /// Keys are task codes.
    #[serde(default)]
    pub task: BTreeMap<String, TemplateTaskConfig>,
}

/// `[template.<id>.task.<code>]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TemplateTaskConfig {
    /// Display name; defaults to the code.
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub kind: TaskKind,

    /// Code of the parent milestone or task.
    #[serde(default)]
    pub parent: Option<String>,

    #[serde(default)]
    pub phase: Option<String>,

    #[serde(default)]
    pub estimated_days: u32,

    /// Role whose phase assignee gets this task.
    #[serde(default)]
    pub default_role: Option<String>,

    #[serde(default)]
    pub requires_approval: bool,

    /// Code of an `[approval.<code>]` flow.
    #[serde(default)]
    pub approval_type: Option<String>,

    /// Order within the phase; defaults to the position of the code in
    /// sorted order, starting at 1.
    #[serde(default)]
    pub sequence: Option<u32>,

    #[serde(default)]
    pub depends_on: Vec<DependsOnConfig>,

    /// Review outcome codes, e.g.
    /// `outcome = [{ code = "redo", kind = "fail_rollback", target = "T1", cascade = true }]`.
    #[serde(default, rename = "outcome")]
    pub outcomes: Vec<ReviewOutcome>,
}

/// One entry of `depends_on`.
#[derive(Debug, Clone, Deserialize)]
pub struct DependsOnConfig {
    pub code: String,

    #[serde(default, rename = "type")]
    pub dep_type: DependencyType,

    #[serde(default)]
    pub lag_days: i32,
}
